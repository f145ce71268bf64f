//! Commit message trailers.
//!
//! With a change summary the persisted message is
//! `"<message>\n\nUser-ID: <author_id>\n\nTrack-Changes: <json>"`; without one
//! it is the message alone.

#![allow(clippy::result_large_err)]

use crate::errors::{Result, StoreContext};
use stemvault_core::diff::TrackChanges;

const USER_ID_TRAILER: &str = "\n\nUser-ID: ";
const TRACK_CHANGES_TRAILER: &str = "\n\nTrack-Changes: ";

pub fn encode(message: &str, author_id: &str, changes: Option<&TrackChanges>) -> Result<String> {
    match changes {
        None => Ok(message.to_string()),
        Some(changes) => {
            let json =
                serde_json::to_string(changes).store_op("encode_message")?;
            Ok(format!(
                "{}{}{}{}{}",
                message, USER_ID_TRAILER, author_id, TRACK_CHANGES_TRAILER, json
            ))
        }
    }
}

/// Track changes carried in the trailer. `None` when there is no trailer or
/// it does not decode.
pub fn decode_changes(persisted: &str) -> Option<TrackChanges> {
    let (_, json) = persisted.rsplit_once(TRACK_CHANGES_TRAILER)?;
    match serde_json::from_str(json.trim()) {
        Ok(changes) => Some(changes),
        Err(e) => {
            tracing::debug!(error = %e, "Undecodable Track-Changes trailer");
            None
        }
    }
}

/// The prose part of a persisted message
pub fn subject(persisted: &str) -> &str {
    match persisted.rfind(USER_ID_TRAILER) {
        Some(idx) if persisted[idx..].contains(TRACK_CHANGES_TRAILER) => &persisted[..idx],
        _ => persisted,
    }
}
