use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of the last row of a page in `(sort_value DESC, id DESC)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub id: u64,
    pub sort_value: DateTime<Utc>,
}

/// base64(JSON) token handed to clients.
pub fn encode_cursor(cursor: &Cursor) -> String {
    // Serializing a plain struct of an integer and a timestamp cannot fail
    let json = serde_json::to_vec(cursor).unwrap_or_default();
    STANDARD.encode(json)
}

/// Malformed or foreign tokens decode to `None` so paging restarts from the top.
pub fn decode_cursor(token: &str) -> Option<Cursor> {
    // An unescaped '+' in a query string arrives as a space
    let token = token.trim().replace(' ', "+");
    if token.is_empty() {
        return None;
    }

    let bytes = match STANDARD.decode(&token) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring cursor with invalid encoding");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(cursor) => Some(cursor),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring cursor with invalid payload");
            None
        }
    }
}
