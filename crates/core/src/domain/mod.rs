pub mod offer;
pub mod request;
pub mod user;

pub use offer::{Offer, OfferId, OfferStatus, ProviderId};
pub use request::{Request, RequestId, RequestStatus};
pub use user::User;
