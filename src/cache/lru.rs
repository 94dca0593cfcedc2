//! LRU Ordering Module
//!
//! Orders stored blobs from least to most recently used, using the best
//! recency facet every candidate supports.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::storage::BlobInfo;

// == Recency Facet ==
/// Which timestamp drives the eviction order for one prune pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencyFacet {
    /// All candidates track access time
    LastAccessed,
    /// All candidates track modification time
    LastModified,
    /// Deterministic fallback: lexicographic blob name
    Name,
}

impl RecencyFacet {
    // == Selection ==
    /// Picks the best facet shared by every blob.
    ///
    /// Choosing one facet per pass keeps the ordering total even when the
    /// storage reports timestamps for some blobs only.
    pub fn best_for(blobs: &[BlobInfo]) -> Self {
        if blobs.iter().all(|b| b.last_accessed.is_some()) {
            RecencyFacet::LastAccessed
        } else if blobs.iter().all(|b| b.last_modified.is_some()) {
            RecencyFacet::LastModified
        } else {
            RecencyFacet::Name
        }
    }

    /// The timestamp this facet reads from a blob.
    pub fn timestamp(self, blob: &BlobInfo) -> Option<DateTime<Utc>> {
        match self {
            RecencyFacet::LastAccessed => blob.last_accessed,
            RecencyFacet::LastModified => blob.last_modified,
            RecencyFacet::Name => None,
        }
    }

    /// Oldest-first comparison, ties broken by name.
    pub fn compare(self, a: &BlobInfo, b: &BlobInfo) -> Ordering {
        self.timestamp(a)
            .cmp(&self.timestamp(b))
            .then_with(|| a.name.cmp(&b.name))
    }
}

// == Oldest First ==
/// Sorts blobs least recently used first.
pub fn oldest_first(mut blobs: Vec<BlobInfo>) -> Vec<BlobInfo> {
    let facet = RecencyFacet::best_for(&blobs);
    blobs.sort_by(|a, b| facet.compare(a, b));
    blobs
}

// == Last Used ==
/// Most precise "last used" time a blob offers.
pub fn last_used(blob: &BlobInfo) -> Option<DateTime<Utc>> {
    blob.last_accessed.or(blob.last_modified)
}
