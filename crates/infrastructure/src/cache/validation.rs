//! Entry-level validity checks: expiry, data shape, and checksum match.

use chrono::Utc;
use serde::Serialize;

use super::{checksum, validate_data, CacheEntry};

/// Outcome of a full entry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryValidation {
    pub is_valid: bool,
    pub reason: Option<String>,
    pub should_refresh: bool,
}

impl EntryValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
            should_refresh: false,
        }
    }

    fn invalid(reason: &str) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.to_string()),
            should_refresh: true,
        }
    }
}

/// An entry is expired once its age reaches its TTL.
pub fn is_expired<T>(entry: &CacheEntry<T>) -> bool {
    let age = Utc::now() - entry.timestamp;
    age >= chrono::Duration::milliseconds(entry.ttl_ms as i64)
}

/// Check order is fixed: expiry, then data validity, then checksum. The
/// first failure wins and always requests a refresh.
pub fn validate_entry<T: Serialize>(entry: &CacheEntry<T>) -> EntryValidation {
    if is_expired(entry) {
        return EntryValidation::invalid("Entry has expired");
    }

    let value = match serde_json::to_value(&entry.data) {
        Ok(value) => value,
        Err(_) => return EntryValidation::invalid("Data validation failed"),
    };
    if validate_data(&value).is_err() {
        return EntryValidation::invalid("Data validation failed");
    }

    match checksum(&value) {
        Ok(digest) if digest == entry.checksum => EntryValidation::valid(),
        _ => EntryValidation::invalid("Checksum mismatch - data may be corrupted"),
    }
}

/// Proactive refresh ahead of hard expiry: true once the elapsed fraction
/// of the TTL reaches `threshold`.
pub fn should_refresh<T>(entry: &CacheEntry<T>, threshold: f64) -> bool {
    if entry.ttl_ms == 0 {
        return true;
    }
    let elapsed_ms = (Utc::now() - entry.timestamp).num_milliseconds().max(0) as f64;
    elapsed_ms / entry.ttl_ms as f64 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_fresh_entry_is_valid() {
        let entry = CacheEntry::new(json!({"score": 2}), Duration::from_secs(60)).unwrap();
        assert!(!is_expired(&entry));
        let result = validate_entry(&entry);
        assert!(result.is_valid);
        assert!(result.reason.is_none());
        assert!(!result.should_refresh);
    }

    #[test]
    fn test_expired_entry_reports_expiry_first() {
        let mut entry = CacheEntry::new(json!({"score": 2}), Duration::from_millis(10)).unwrap();
        // corrupt it as well: expiry must still win the check order
        entry.checksum = "deadbeef".to_string();
        entry.timestamp = Utc::now() - chrono::Duration::seconds(5);
        assert!(is_expired(&entry));

        let result = validate_entry(&entry);
        assert_eq!(result.reason.as_deref(), Some("Entry has expired"));
        assert!(result.should_refresh);
    }

    #[test]
    fn test_zero_age_boundary() {
        // age >= ttl with ttl 0 means instantly expired
        let entry = CacheEntry::new(json!(1), Duration::ZERO).unwrap();
        assert!(is_expired(&entry));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut entry = CacheEntry::new(json!({"score": 2}), Duration::from_secs(60)).unwrap();
        entry.data = json!({"score": 3});

        let result = validate_entry(&entry);
        assert!(!result.is_valid);
        assert_eq!(
            result.reason.as_deref(),
            Some("Checksum mismatch - data may be corrupted")
        );
        assert!(result.should_refresh);
    }

    #[test]
    fn test_null_data_fails_validation() {
        let mut entry = CacheEntry::new(json!({"score": 2}), Duration::from_secs(60)).unwrap();
        entry.data = serde_json::Value::Null;

        let result = validate_entry(&entry);
        assert_eq!(result.reason.as_deref(), Some("Data validation failed"));
    }

    #[test]
    fn test_should_refresh_threshold() {
        let mut entry = CacheEntry::new(json!(1), Duration::from_secs(100)).unwrap();
        // 90 of 100 seconds elapsed
        entry.timestamp = Utc::now() - chrono::Duration::seconds(90);
        assert!(should_refresh(&entry, 0.8));
        assert!(!should_refresh(&entry, 0.95));
    }
}
