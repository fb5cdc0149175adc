//! Cache Entry Module
//!
//! Defines a single cache entry and the record format used to store it
//! inside a block region.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{CacheError, Result};

// == Record Layout ==
// u32 total | i64 expire | u32 key_len | key | u32 flags | u32 data_len | data
// | u64 cas | u8 blocked | i64 blocked_until   (all big-endian)
const RECORD_OVERHEAD: usize = 4 + 8 + 4 + 4 + 4 + 8 + 1 + 8;

/// Relative expiry times larger than this are absolute epoch seconds.
pub const THIRTY_DAYS_SECS: i64 = 60 * 60 * 24 * 30;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The key the entry is stored under
    pub key: String,
    /// Opaque client flags
    pub flags: u32,
    /// Absolute expiry in epoch seconds, 0 = never
    pub expire: i64,
    /// The stored payload
    pub data: Bytes,
    /// Version stamp for compare-and-swap
    pub cas_token: u64,
    /// True for the placeholder left behind by a delayed delete
    pub blocked: bool,
    /// Epoch second at which a blocked entry is physically removed
    pub blocked_until: i64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new unversioned entry. The coordinator assigns the CAS token.
    pub fn new(key: impl Into<String>, flags: u32, expire: i64, data: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            flags,
            expire,
            data: data.into(),
            cas_token: 0,
            blocked: false,
            blocked_until: 0,
        }
    }

    /// Creates the zero-length placeholder that hides a key until `blocked_until`.
    pub fn placeholder(key: impl Into<String>, blocked_until: i64) -> Self {
        Self {
            key: key.into(),
            flags: 0,
            expire: 0,
            data: Bytes::new(),
            cas_token: 0,
            blocked: true,
            blocked_until,
        }
    }

    /// Returns true if the entry carries an expiry that has passed.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expire != 0 && self.expire <= now
    }

    /// Returns true while the delete window of a placeholder is still open.
    pub fn is_blocked_at(&self, now: i64) -> bool {
        self.blocked && now < self.blocked_until
    }

    /// A live entry is visible to clients: not a placeholder and not expired.
    ///
    /// Placeholders whose window has elapsed are already logically deleted,
    /// so any blocked entry is treated as absent.
    pub fn is_live_at(&self, now: i64) -> bool {
        !self.blocked && !self.is_expired_at(now)
    }

    // == Payload Transformations ==
    /// Returns a copy with `suffix` appended to the payload.
    pub fn appended(&self, suffix: &[u8]) -> Self {
        let mut data = Vec::with_capacity(self.data.len() + suffix.len());
        data.extend_from_slice(&self.data);
        data.extend_from_slice(suffix);
        self.with_data(data)
    }

    /// Returns a copy with `prefix` prepended to the payload.
    pub fn prepended(&self, prefix: &[u8]) -> Self {
        let mut data = Vec::with_capacity(self.data.len() + prefix.len());
        data.extend_from_slice(prefix);
        data.extend_from_slice(&self.data);
        self.with_data(data)
    }

    /// Applies `delta` to a decimal payload.
    ///
    /// Increments wrap at `u64::MAX`; decrements stop at zero. Returns None
    /// when the payload is not a non-negative decimal integer.
    pub fn with_delta(&self, delta: i64) -> Option<(u64, Self)> {
        let text = std::str::from_utf8(&self.data).ok()?;
        let current: u64 = text.trim().parse().ok()?;

        let value = if delta >= 0 {
            current.wrapping_add(delta as u64)
        } else {
            current.saturating_sub(delta.unsigned_abs())
        };

        Some((value, self.with_data(value.to_string().into_bytes())))
    }

    fn with_data(&self, data: Vec<u8>) -> Self {
        Self {
            key: self.key.clone(),
            flags: self.flags,
            expire: self.expire,
            data: Bytes::from(data),
            cas_token: self.cas_token,
            blocked: false,
            blocked_until: 0,
        }
    }

    // == Codec ==
    /// Number of bytes `encode` produces for this entry.
    pub fn encoded_len(&self) -> usize {
        RECORD_OVERHEAD + self.key.len() + self.data.len()
    }

    /// Writes the record into `buf`, which must hold at least `encoded_len` bytes.
    pub fn encode_into(&self, mut buf: impl BufMut) {
        buf.put_u32(self.encoded_len() as u32);
        buf.put_i64(self.expire);
        buf.put_u32(self.key.len() as u32);
        buf.put_slice(self.key.as_bytes());
        buf.put_u32(self.flags);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.put_u64(self.cas_token);
        buf.put_u8(u8::from(self.blocked));
        buf.put_i64(self.blocked_until);
    }

    /// Encodes the record into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decodes a record written by `encode`. Trailing bytes past the
    /// recorded total (block padding) are ignored.
    pub fn decode(record: &[u8]) -> Result<Self> {
        if record.len() < RECORD_OVERHEAD {
            return Err(corrupt(format!("record of {} bytes is truncated", record.len())));
        }

        let mut buf = record;
        let total = buf.get_u32() as usize;
        if total < RECORD_OVERHEAD || total > record.len() {
            return Err(corrupt(format!(
                "record length {} does not fit {} bytes",
                total,
                record.len()
            )));
        }
        // Only the recorded span is parsed from here on.
        let mut buf = &record[4..total];

        let expire = buf.get_i64();
        let key_len = buf.get_u32() as usize;
        if buf.remaining() < key_len + 4 + 4 {
            return Err(corrupt(format!("key length {} overruns record", key_len)));
        }
        let key = String::from_utf8(buf[..key_len].to_vec())
            .map_err(|_| corrupt("key is not valid UTF-8".to_string()))?;
        buf.advance(key_len);

        let flags = buf.get_u32();
        let data_len = buf.get_u32() as usize;
        if buf.remaining() != data_len + 8 + 1 + 8 {
            return Err(corrupt(format!("data length {} overruns record", data_len)));
        }
        let data = Bytes::copy_from_slice(&buf[..data_len]);
        buf.advance(data_len);

        let cas_token = buf.get_u64();
        let blocked = match buf.get_u8() {
            0 => false,
            1 => true,
            other => return Err(corrupt(format!("invalid blocked flag {}", other))),
        };
        let blocked_until = buf.get_i64();

        Ok(Self {
            key,
            flags,
            expire,
            data,
            cas_token,
            blocked,
            blocked_until,
        })
    }
}

fn corrupt(msg: String) -> CacheError {
    CacheError::Corruption(msg)
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_time_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Converts a memcached `exptime` into an absolute expiry.
///
/// 0 never expires, values up to thirty days are relative to `now`, larger
/// values are already absolute. Negative values expire immediately.
pub fn expiry_from_exptime(exptime: i64, now: i64) -> i64 {
    match exptime {
        0 => 0,
        e if e < 0 => 1,
        e if e <= THIRTY_DAYS_SECS => now + e,
        e => e,
    }
}
