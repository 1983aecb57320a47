//! Conditional request helper

use chrono::{DateTime, Utc};
use docbase_core::Timestamp;

/// True if a conditional read may answer "not modified"
///
/// Holds only when the caller supplied a timestamp strictly newer than the
/// resource's last modification. An equal timestamp is still answered in full.
pub fn is_not_modified(if_modified_since: Option<Timestamp>, last_modified: Timestamp) -> bool {
    match if_modified_since {
        Some(since) => since > last_modified,
        None => false,
    }
}

/// [`is_not_modified`] for a caller date already parsed into UTC
pub fn is_not_modified_since(if_modified_since: Option<&DateTime<Utc>>, last_modified: Timestamp) -> bool {
    is_not_modified(if_modified_since.map(Timestamp::from_datetime), last_modified)
}
