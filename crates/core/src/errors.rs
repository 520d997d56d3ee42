use thiserror::Error;

use crate::domain::{OfferId, RequestId};

/// Command failures surfaced by the booking store. Every variant is
/// recoverable: the command logs, returns the error, and leaves state
/// untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no user session: command requires a logged-in user")]
    MissingSession,
    #[error("request not found: {0}")]
    RequestNotFound(RequestId),
    #[error("offer not found: {0}")]
    OfferNotFound(OfferId),
}
