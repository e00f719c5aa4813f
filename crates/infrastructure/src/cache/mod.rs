//! Content-addressed, TTL-bound caching with integrity checks.
//!
//! Entries carry a checksum over their canonicalized data; a mismatch on
//! read is the detection mechanism for lost updates and corruption. An
//! entry is replaced, never mutated, on refresh.

pub mod checksum;
pub mod files;
pub mod keys;
pub mod validation;

pub use checksum::{checksum, short_hash, validate_data};
pub use files::{cache_file_name, cleanup_older_than, dir_size, safe_file_name};
pub use keys::{
    league_key, match_key, matches_pattern, parse_key, search_key, season_key, url_key,
    CachePrefix, ParsedKey,
};
pub use validation::{is_expired, should_refresh, validate_entry, EntryValidation};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use harvester_core::HarvesterResult;

/// One cached value with its integrity and bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    /// Time-to-live in milliseconds.
    pub ttl_ms: u64,
    pub checksum: String,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Serialized size in bytes at write time.
    pub size: usize,
}

impl<T: Serialize> CacheEntry<T> {
    /// Seal a value into an entry, stamping checksum and size.
    pub fn new(data: T, ttl: Duration) -> HarvesterResult<Self> {
        let value = serde_json::to_value(&data)?;
        validate_data(&value)?;
        let digest = checksum(&value)?;
        let size = value.to_string().len();
        let now = Utc::now();

        Ok(Self {
            data,
            timestamp: now,
            ttl_ms: ttl.as_millis() as u64,
            checksum: digest,
            access_count: 0,
            last_accessed: now,
            size,
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Record a read.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Derived listing/eviction view, always in sync with the entry.
    pub fn metadata(&self, key: &str, tags: Vec<String>) -> CacheMetadata {
        CacheMetadata {
            key: key.to_string(),
            created: self.timestamp,
            expires: self.timestamp + chrono::Duration::milliseconds(self.ttl_ms as i64),
            size: self.size,
            checksum: self.checksum.clone(),
            tags,
        }
    }
}

/// Listing/eviction view of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub key: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub size: usize,
    pub checksum: String,
    pub tags: Vec<String>,
}
