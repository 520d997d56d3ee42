pub mod config;
pub mod domain;
pub mod errors;
pub mod store;

pub use domain::offer::{Offer, OfferId, OfferStatus, ProviderId};
pub use domain::request::{Request, RequestId, RequestStatus};
pub use domain::user::User;
pub use errors::StoreError;
pub use store::{BookingStore, SessionSnapshot, PERSISTED_KEYS};
