use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    OffersReceived,
    Accepted,
    Completed,
}

/// A trip ask posted by a user. Requests are never physically deleted; a full
/// session reset is the only way they disappear.
///
/// Timestamps serialize as millisecond integers so the persisted layout stays
/// a flat key→JSON mirror of the in-memory fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub user_id: String,
    pub user_name: String,
    pub from: String,
    pub to: String,
    pub status: RequestStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Request {
    /// A settled request no longer takes offers and is hidden from providers.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, RequestStatus::Accepted | RequestStatus::Completed)
    }
}
