//! Timeout Policy Module
//!
//! Decides on read whether a stored entry is stale. Staleness is about
//! freshness only; capacity is handled separately by pruning.

use chrono::{DateTime, Duration, Utc};

use crate::storage::BlobInfo;

// == Timeout Policy ==
/// Pluggable staleness predicate consulted by `get`.
pub trait TimeoutPolicy: Send + Sync {
    /// Returns true if `entry` must be refreshed or evicted at `now`.
    fn is_timed_out(&self, entry: &BlobInfo, now: DateTime<Utc>) -> bool;
}

impl<F> TimeoutPolicy for F
where
    F: Fn(&BlobInfo, DateTime<Utc>) -> bool + Send + Sync,
{
    fn is_timed_out(&self, entry: &BlobInfo, now: DateTime<Utc>) -> bool {
        self(entry, now)
    }
}

/// Boundary: an entry is timed out once `timeout` has fully elapsed.
fn elapsed(since: Option<DateTime<Utc>>, timeout: Duration, now: DateTime<Utc>) -> bool {
    match since {
        Some(since) => now.signed_duration_since(since) >= timeout,
        None => false,
    }
}

// == Last Modified ==
/// Stale once the entry has not been written for `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastModifiedTimeout {
    timeout: Duration,
}

impl LastModifiedTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TimeoutPolicy for LastModifiedTimeout {
    fn is_timed_out(&self, entry: &BlobInfo, now: DateTime<Utc>) -> bool {
        elapsed(entry.last_modified, self.timeout, now)
    }
}

// == Last Accessed ==
/// Stale once the entry has not been read for `timeout`.
///
/// Falls back to the last-modified time when the storage does not track
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastAccessedTimeout {
    timeout: Duration,
}

impl LastAccessedTimeout {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl TimeoutPolicy for LastAccessedTimeout {
    fn is_timed_out(&self, entry: &BlobInfo, now: DateTime<Utc>) -> bool {
        elapsed(entry.last_accessed.or(entry.last_modified), self.timeout, now)
    }
}

// == Never ==
/// Entries never go stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverTimeout;

impl TimeoutPolicy for NeverTimeout {
    fn is_timed_out(&self, _entry: &BlobInfo, _now: DateTime<Utc>) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(modified: Option<DateTime<Utc>>, accessed: Option<DateTime<Utc>>) -> BlobInfo {
        BlobInfo {
            name: "a.bin".to_string(),
            size: 1,
            last_modified: modified,
            last_accessed: accessed,
        }
    }

    #[test]
    fn test_last_modified_timeout() {
        let now = Utc::now();
        let policy = LastModifiedTimeout::new(Duration::seconds(60));

        assert!(!policy.is_timed_out(&blob(Some(now - Duration::seconds(59)), None), now));
        assert!(policy.is_timed_out(&blob(Some(now - Duration::seconds(61)), None), now));
    }

    #[test]
    fn test_boundary_is_timed_out() {
        let now = Utc::now();
        let policy = LastModifiedTimeout::new(Duration::seconds(60));
        assert!(policy.is_timed_out(&blob(Some(now - Duration::seconds(60)), None), now));
    }

    #[test]
    fn test_last_modified_ignores_access() {
        let now = Utc::now();
        let policy = LastModifiedTimeout::new(Duration::seconds(60));
        let entry = blob(Some(now - Duration::seconds(120)), Some(now));
        assert!(policy.is_timed_out(&entry, now));
    }

    #[test]
    fn test_last_accessed_timeout() {
        let now = Utc::now();
        let policy = LastAccessedTimeout::new(Duration::seconds(60));

        let recently_read = blob(Some(now - Duration::seconds(120)), Some(now));
        assert!(!policy.is_timed_out(&recently_read, now));

        let idle = blob(Some(now - Duration::seconds(300)), Some(now - Duration::seconds(90)));
        assert!(policy.is_timed_out(&idle, now));
    }

    #[test]
    fn test_last_accessed_falls_back_to_modified() {
        let now = Utc::now();
        let policy = LastAccessedTimeout::new(Duration::seconds(60));
        assert!(policy.is_timed_out(&blob(Some(now - Duration::seconds(90)), None), now));
        assert!(!policy.is_timed_out(&blob(Some(now), None), now));
    }

    #[test]
    fn test_missing_timestamps_never_time_out() {
        let now = Utc::now();
        let entry = blob(None, None);
        assert!(!LastModifiedTimeout::new(Duration::zero()).is_timed_out(&entry, now));
        assert!(!LastAccessedTimeout::new(Duration::zero()).is_timed_out(&entry, now));
    }

    #[test]
    fn test_huge_timeout_never_elapses() {
        let now = Utc::now();
        let policy = LastModifiedTimeout::new(Duration::seconds(10_000_000_000_000));
        assert!(!policy.is_timed_out(&blob(Some(now - Duration::days(365)), None), now));

        let policy = LastAccessedTimeout::new(Duration::seconds(10_000_000_000_000));
        assert!(!policy.is_timed_out(&blob(Some(now), Some(now)), now));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |entry: &BlobInfo, _now: DateTime<Utc>| entry.size > 10;
        let now = Utc::now();
        assert!(!policy.is_timed_out(&blob(None, None), now));
        assert!(!NeverTimeout.is_timed_out(&blob(None, None), now));
    }
}
