//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Scavenger: finalises delayed deletes at a fixed interval

mod scavenger;

pub use scavenger::spawn_scavenger_task;
