//! Application constants
//!
//! Centralized location for pipeline constants that are not configurable.

/// Separator placed between an item's text fields before a DLP scan.
///
/// The scanner sees one string per item; the redacted output is split on the
/// same separator and mapped back to fields by position.
pub const REDACTION_FIELD_DELIMITER: &str = "\n\u{241E}\n";

/// Default provider page size
pub const DEFAULT_PAGE_SIZE: u32 = 250;

/// Default number of items per DLP scan request
pub const DEFAULT_DLP_BATCH_SIZE: usize = 50;

/// Early-exit bound for the conflict sweep, in seconds.
///
/// Only limits how far forward the sweep looks; it never widens what counts
/// as an overlap.
pub const DEFAULT_CONFLICT_SLACK_SECS: i64 = 3600;

/// Maximum number of secondary calendars probed when the primary is empty
pub const DEFAULT_CALENDAR_FALLBACK_LIMIT: usize = 5;

/// Calendar id used for the first listing attempt
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// Prefix of per-connection sync lock keys
pub const SYNC_LOCK_PREFIX: &str = "sync";

/// Build the lock key guarding one connection's sync cycle
pub fn sync_lock_key(connection_id: &str) -> String {
    format!("{SYNC_LOCK_PREFIX}:{connection_id}")
}
