use std::time::Duration;

use farebid_core::config::{ConfigOverrides, LoadOptions};
use farebid_core::domain::{OfferStatus, RequestStatus};
use farebid_db::Session;

fn options_for(dir: &tempfile::TempDir) -> LoadOptions {
    let url = format!("sqlite://{}/session.db?mode=rwc", dir.path().display());
    LoadOptions {
        overrides: ConfigOverrides {
            database_url: Some(url),
            debounce_ms: Some(50),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }
}

/// Real-time wait long enough for the 50 ms debounce window to fire and the
/// flush to land.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn booking_survives_a_session_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    let session = Session::start(options_for(&dir)).await.expect("start");
    let store = &session.store;
    assert!(!store.is_loading());

    store.login_user("u-1", "Asha");
    let request = store.create_request("Asha", "X", "Y").expect("create");
    let offer = store.submit_offer(&request.id, "Bob", "100").expect("offer");
    store.accept_offer(&offer.id).expect("accept");
    settle().await;
    session.shutdown();

    let reloaded = Session::start(options_for(&dir)).await.expect("restart");
    let store = &reloaded.store;
    assert_eq!(store.current_user().expect("user").user_name, "Asha");
    assert!(store.booking_completed());

    let request = store.request_by_id(&request.id).expect("request");
    assert_eq!(request.status, RequestStatus::Accepted);
    assert_eq!(request.from, "X");
    assert_eq!(request.to, "Y");

    let offers = store.offers_for_request(&request.id, Some(OfferStatus::Accepted));
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].amount, 100.0);
    assert_eq!(offers[0].provider_name, "Bob");

    // The role is session-local and never persisted.
    assert!(store.current_role().is_none());
    reloaded.shutdown();
}

#[tokio::test]
async fn reset_wipes_memory_and_storage() {
    let dir = tempfile::tempdir().expect("tempdir");

    let session = Session::start(options_for(&dir)).await.expect("start");
    session.store.login_user("u-1", "Asha");
    session.store.create_request("Asha", "A", "B").expect("create");
    settle().await;

    session.reset().await;
    settle().await;
    session.shutdown();
    assert!(session.store.current_user().is_none());

    let reloaded = Session::start(options_for(&dir)).await.expect("restart");
    assert!(reloaded.store.current_user().is_none());
    assert!(reloaded.store.available_requests().is_empty());
    assert!(!reloaded.store.booking_completed());
    reloaded.shutdown();
}

#[tokio::test]
async fn starting_over_an_empty_database_yields_a_fresh_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::start(options_for(&dir)).await.expect("start");

    assert!(!session.store.is_loading());
    assert!(session.store.current_user().is_none());
    assert!(!session.store.should_show_offers());
    session.shutdown();
}
