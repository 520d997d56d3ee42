use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{Offer, Request, User};

pub const KEY_CURRENT_USER: &str = "currentUser";
pub const KEY_USER_REQUESTS: &str = "userRequests";
pub const KEY_OFFERS: &str = "offers";
pub const KEY_BOOKING_COMPLETED: &str = "bookingCompleted";
pub const KEY_HAS_VIEWED_OFFERS: &str = "hasViewedOffers";

/// Every key the session mirror writes. Loaders read exactly this set.
pub const PERSISTED_KEYS: [&str; 5] = [
    KEY_CURRENT_USER,
    KEY_USER_REQUESTS,
    KEY_OFFERS,
    KEY_BOOKING_COMPLETED,
    KEY_HAS_VIEWED_OFFERS,
];

/// Persistable view of the session. The storage layout is a flat key→JSON
/// mapping, one key per field, with no schema version and no migrations of
/// the payloads themselves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_user: Option<User>,
    pub requests: Vec<Request>,
    pub offers: Vec<Offer>,
    pub booking_completed: bool,
    pub has_viewed_offers: bool,
}

impl SessionSnapshot {
    /// Serializes each field to its storage key. Fails only if a field cannot
    /// be encoded, which the caller treats as a skipped flush.
    pub fn to_entries(&self) -> Result<Vec<(String, String)>, serde_json::Error> {
        Ok(vec![
            (KEY_CURRENT_USER.to_string(), serde_json::to_string(&self.current_user)?),
            (KEY_USER_REQUESTS.to_string(), serde_json::to_string(&self.requests)?),
            (KEY_OFFERS.to_string(), serde_json::to_string(&self.offers)?),
            (KEY_BOOKING_COMPLETED.to_string(), serde_json::to_string(&self.booking_completed)?),
            (KEY_HAS_VIEWED_OFFERS.to_string(), serde_json::to_string(&self.has_viewed_offers)?),
        ])
    }

    /// Rebuilds a snapshot from whatever keys storage returned. Absent keys
    /// keep their defaults; a malformed value is logged and skipped without
    /// discarding the other keys.
    pub fn from_entries(entries: &[(String, String)]) -> Self {
        let mut snapshot = Self::default();
        for (key, value) in entries {
            let result: Result<(), serde_json::Error> = match key.as_str() {
                KEY_CURRENT_USER => {
                    serde_json::from_str(value).map(|parsed| snapshot.current_user = parsed)
                }
                KEY_USER_REQUESTS => {
                    serde_json::from_str(value).map(|parsed| snapshot.requests = parsed)
                }
                KEY_OFFERS => serde_json::from_str(value).map(|parsed| snapshot.offers = parsed),
                KEY_BOOKING_COMPLETED => {
                    serde_json::from_str(value).map(|parsed| snapshot.booking_completed = parsed)
                }
                KEY_HAS_VIEWED_OFFERS => {
                    serde_json::from_str(value).map(|parsed| snapshot.has_viewed_offers = parsed)
                }
                other => {
                    warn!(key = other, "ignoring unknown persisted key");
                    Ok(())
                }
            };
            if let Err(error) = result {
                warn!(key = key.as_str(), %error, "skipping malformed persisted value");
            }
        }
        snapshot
    }
}
