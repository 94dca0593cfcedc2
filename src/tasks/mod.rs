//! Background Tasks Module
//!
//! Contains background tasks that keep a cache maintained while the host
//! application runs. The cache engine never schedules work on its own.
//!
//! # Tasks
//! - Refresh: refreshes every entry, then prunes, at a configured interval

mod refresh;

pub use refresh::spawn_refresh_task;
