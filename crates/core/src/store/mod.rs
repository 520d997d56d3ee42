//! In-memory session store for the booking flow: one user session, its trip
//! requests, and the provider offers bid against them.
//!
//! The store is constructed once at session start and shared by reference with
//! every consumer; screens re-read after a change notification rather than
//! holding live views. All mutations are synchronous; the only asynchronous
//! collaborator is the persistence side channel, which subscribes to the
//! revision channel and mirrors snapshots out of band.

pub mod snapshot;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::{
    Offer, OfferId, OfferStatus, ProviderId, Request, RequestId, RequestStatus, User,
};
use crate::errors::StoreError;

pub use snapshot::{SessionSnapshot, PERSISTED_KEYS};

#[derive(Clone, Debug)]
struct SessionState {
    current_role: Option<String>,
    current_user: Option<User>,
    requests: Vec<Request>,
    offers: Vec<Offer>,
    booking_completed: bool,
    has_viewed_offers: bool,
    loading: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            current_role: None,
            current_user: None,
            requests: Vec::new(),
            offers: Vec::new(),
            booking_completed: false,
            has_viewed_offers: false,
            loading: true,
        }
    }

    /// Most recent non-completed request of the current user. Equal timestamps
    /// keep insertion order, so the earlier of two ties wins.
    fn active_request(&self) -> Option<&Request> {
        let user = self.current_user.as_ref()?;
        let mut candidates: Vec<&Request> = self
            .requests
            .iter()
            .filter(|request| {
                request.user_id == user.user_id && request.status != RequestStatus::Completed
            })
            .collect();
        candidates.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        candidates.first().copied()
    }
}

pub struct BookingStore {
    state: Mutex<SessionState>,
    revision: watch::Sender<u64>,
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: Mutex::new(SessionState::new()), revision }
    }

    /// Change feed for consumers. The value is an opaque revision counter;
    /// subscribers re-read whatever state they care about when it moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ---- commands -------------------------------------------------------

    pub fn login_user(&self, user_id: &str, user_name: &str) {
        self.update(|state| {
            state.current_user = Some(User::new(user_id, user_name));
        });
        info!(user_id, "user logged in");
    }

    pub fn logout_user(&self) {
        self.update(|state| {
            state.current_user = None;
            state.current_role = None;
        });
    }

    /// The role is free-form; screens decide what the strings mean.
    pub fn select_role(&self, role: &str) {
        self.update(|state| {
            state.current_role = Some(role.to_string());
        });
    }

    pub fn create_request(&self, name: &str, from: &str, to: &str) -> Result<Request, StoreError> {
        self.try_update(|state| {
            let Some(user) = state.current_user.as_ref() else {
                warn!("create_request refused: no user logged in");
                return Err(StoreError::MissingSession);
            };
            let request = Request {
                id: RequestId::generate(),
                user_id: user.user_id.clone(),
                user_name: name.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                status: RequestStatus::Pending,
                timestamp: Utc::now(),
            };
            state.requests.push(request.clone());
            state.booking_completed = false;
            state.has_viewed_offers = false;
            info!(request_id = %request.id.0, from, to, "request created");
            Ok(request)
        })
    }

    /// Records a provider bid. A second submission for the same
    /// (request, provider name) pair replaces the first in place, keeping its
    /// id and provider id and returning the offer to pending.
    pub fn submit_offer(
        &self,
        request_id: &RequestId,
        provider_name: &str,
        amount: &str,
    ) -> Result<Offer, StoreError> {
        self.try_update(|state| {
            if !state.requests.iter().any(|request| request.id == *request_id) {
                warn!(request_id = %request_id.0, "submit_offer refused: request not found");
                return Err(StoreError::RequestNotFound(request_id.clone()));
            }

            let amount = parse_amount(amount);
            let now = Utc::now();
            let offer = match state.offers.iter_mut().find(|offer| {
                offer.request_id == *request_id && offer.provider_name == provider_name
            }) {
                Some(existing) => {
                    existing.amount = amount;
                    existing.status = OfferStatus::Pending;
                    existing.timestamp = now;
                    existing.clone()
                }
                None => {
                    let offer = Offer {
                        id: OfferId::generate(),
                        request_id: request_id.clone(),
                        provider_id: ProviderId::generate(),
                        provider_name: provider_name.to_string(),
                        amount,
                        status: OfferStatus::Pending,
                        timestamp: now,
                    };
                    state.offers.push(offer.clone());
                    offer
                }
            };

            if let Some(request) =
                state.requests.iter_mut().find(|request| request.id == *request_id)
            {
                request.status = RequestStatus::OffersReceived;
            }

            info!(
                offer_id = %offer.id.0,
                request_id = %request_id.0,
                provider = provider_name,
                amount,
                "offer submitted"
            );
            Ok(offer)
        })
    }

    /// Accepting settles the whole request: the offer and request both become
    /// accepted, the session records the completed booking, and sibling
    /// pending offers are rejected so a booked request takes no further bids.
    pub fn accept_offer(&self, offer_id: &OfferId) -> Result<Offer, StoreError> {
        self.try_update(|state| {
            let Some(position) = state.offers.iter().position(|offer| offer.id == *offer_id)
            else {
                warn!(offer_id = %offer_id.0, "accept_offer refused: offer not found");
                return Err(StoreError::OfferNotFound(offer_id.clone()));
            };
            let request_id = state.offers[position].request_id.clone();

            for offer in &mut state.offers {
                if offer.request_id != request_id {
                    continue;
                }
                if offer.id == *offer_id {
                    offer.status = OfferStatus::Accepted;
                } else if offer.status == OfferStatus::Pending {
                    offer.status = OfferStatus::Rejected;
                }
            }
            if let Some(request) =
                state.requests.iter_mut().find(|request| request.id == request_id)
            {
                request.status = RequestStatus::Accepted;
            }
            state.booking_completed = true;

            info!(offer_id = %offer_id.0, request_id = %request_id.0, "offer accepted");
            Ok(state.offers[position].clone())
        })
    }

    /// Rejecting an offer reverts its request to pending only when no other
    /// pending offer remains, reopening the request for new bids.
    pub fn reject_offer(&self, offer_id: &OfferId) -> Result<Offer, StoreError> {
        self.try_update(|state| {
            let Some(position) = state.offers.iter().position(|offer| offer.id == *offer_id)
            else {
                warn!(offer_id = %offer_id.0, "reject_offer refused: offer not found");
                return Err(StoreError::OfferNotFound(offer_id.clone()));
            };
            state.offers[position].status = OfferStatus::Rejected;
            let request_id = state.offers[position].request_id.clone();

            let still_pending = state
                .offers
                .iter()
                .any(|offer| offer.request_id == request_id && offer.status == OfferStatus::Pending);
            if !still_pending {
                if let Some(request) =
                    state.requests.iter_mut().find(|request| request.id == request_id)
                {
                    request.status = RequestStatus::Pending;
                }
            }

            info!(offer_id = %offer_id.0, request_id = %request_id.0, "offer rejected");
            Ok(state.offers[position].clone())
        })
    }

    pub fn mark_offers_viewed(&self) {
        self.update(|state| {
            state.has_viewed_offers = true;
        });
    }

    /// Clears every state field. Wiping the persisted mirror is the session
    /// facade's job; the store only owns memory.
    pub fn reset_session(&self) {
        self.update(|state| {
            state.current_role = None;
            state.current_user = None;
            state.requests.clear();
            state.offers.clear();
            state.booking_completed = false;
            state.has_viewed_offers = false;
        });
        info!("session state reset");
    }

    /// Installs persisted state at startup. The role is session-local and is
    /// never persisted, so hydration leaves it alone.
    pub fn hydrate(&self, snapshot: SessionSnapshot) {
        self.update(|state| {
            state.current_user = snapshot.current_user;
            state.requests = snapshot.requests;
            state.offers = snapshot.offers;
            state.booking_completed = snapshot.booking_completed;
            state.has_viewed_offers = snapshot.has_viewed_offers;
        });
    }

    /// Flips the loading flag once hydration has finished; screens hold their
    /// first render until this point.
    pub fn mark_loaded(&self) {
        self.update(|state| {
            state.loading = false;
        });
    }

    // ---- queries --------------------------------------------------------

    pub fn current_user(&self) -> Option<User> {
        self.read(|state| state.current_user.clone())
    }

    pub fn current_role(&self) -> Option<String> {
        self.read(|state| state.current_role.clone())
    }

    pub fn booking_completed(&self) -> bool {
        self.read(|state| state.booking_completed)
    }

    pub fn has_viewed_offers(&self) -> bool {
        self.read(|state| state.has_viewed_offers)
    }

    pub fn is_loading(&self) -> bool {
        self.read(|state| state.loading)
    }

    pub fn request_by_id(&self, request_id: &RequestId) -> Option<Request> {
        self.read(|state| {
            state.requests.iter().find(|request| request.id == *request_id).cloned()
        })
    }

    /// Offers bid against a request, cheapest first, optionally narrowed to
    /// one status.
    pub fn offers_for_request(
        &self,
        request_id: &RequestId,
        status: Option<OfferStatus>,
    ) -> Vec<Offer> {
        self.read(|state| {
            let mut offers: Vec<Offer> = state
                .offers
                .iter()
                .filter(|offer| offer.request_id == *request_id)
                .filter(|offer| status.map_or(true, |wanted| offer.status == wanted))
                .cloned()
                .collect();
            offers.sort_by(|a, b| a.amount.total_cmp(&b.amount));
            offers
        })
    }

    pub fn current_user_requests(&self) -> Vec<Request> {
        self.read(|state| {
            let Some(user) = state.current_user.as_ref() else {
                return Vec::new();
            };
            state
                .requests
                .iter()
                .filter(|request| request.user_id == user.user_id)
                .cloned()
                .collect()
        })
    }

    pub fn current_user_active_request(&self) -> Option<Request> {
        self.read(|state| state.active_request().cloned())
    }

    /// Requests providers may still bid on: anything not yet settled.
    pub fn available_requests(&self) -> Vec<Request> {
        self.read(|state| {
            state.requests.iter().filter(|request| !request.is_settled()).cloned().collect()
        })
    }

    pub fn accepted_offers_for_provider(&self, provider_name: &str) -> Vec<Offer> {
        self.read(|state| {
            state
                .offers
                .iter()
                .filter(|offer| {
                    offer.provider_name == provider_name && offer.status == OfferStatus::Accepted
                })
                .cloned()
                .collect()
        })
    }

    pub fn has_rejected_offer(&self, request_id: &RequestId, provider_name: &str) -> bool {
        self.read(|state| {
            state.offers.iter().any(|offer| {
                offer.request_id == *request_id
                    && offer.provider_name == provider_name
                    && offer.status == OfferStatus::Rejected
            })
        })
    }

    /// Gate for the rider's offer list: a logged-in user with an active
    /// request that has at least one pending offer, and no booking completed
    /// yet this session.
    pub fn should_show_offers(&self) -> bool {
        self.read(|state| {
            if state.booking_completed {
                return false;
            }
            let Some(active) = state.active_request() else {
                return false;
            };
            state.offers.iter().any(|offer| {
                offer.request_id == active.id && offer.status == OfferStatus::Pending
            })
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.read(|state| SessionSnapshot {
            current_user: state.current_user.clone(),
            requests: state.requests.clone(),
            offers: state.offers.clone(),
            booking_completed: state.booking_completed,
            has_viewed_offers: state.has_viewed_offers,
        })
    }

    // ---- plumbing -------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, op: impl FnOnce(&mut SessionState)) {
        {
            let mut state = self.lock();
            op(&mut state);
        }
        self.bump();
    }

    fn try_update<T>(
        &self,
        op: impl FnOnce(&mut SessionState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = {
            let mut state = self.lock();
            op(&mut state)
        };
        if result.is_ok() {
            self.bump();
        }
        result
    }

    fn read<T>(&self, op: impl FnOnce(&SessionState) -> T) -> T {
        let state = self.lock();
        op(&state)
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Amounts arrive as raw form input and are stored without validation.
/// Unparseable or non-finite input falls back to 0.0 since the JSON mirror
/// cannot carry NaN or infinities.
fn parse_amount(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            warn!(raw, "offer amount did not parse as a finite number, storing 0.0");
            0.0
        }
    }
}
