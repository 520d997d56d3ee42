use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use farebid_core::store::BookingStore;

use crate::kv::KeyValueStore;

/// Mirrors the store into storage after each change, coalescing bursts.
///
/// The task watches the store's revision feed. A change arms a quiet-window
/// timer; any further change before the timer fires replaces the pending
/// write rather than stacking another. Flush failures are logged and dropped,
/// never retried — the in-memory store stays authoritative.
pub fn spawn_persister(
    store: Arc<BookingStore>,
    kv: Arc<dyn KeyValueStore>,
    debounce: Duration,
) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        loop {
            if changes.changed().await.is_err() {
                break;
            }
            loop {
                tokio::select! {
                    () = sleep(debounce) => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            flush(store.as_ref(), kv.as_ref()).await;
        }
    })
}

async fn flush(store: &BookingStore, kv: &dyn KeyValueStore) {
    let entries = match store.snapshot().to_entries() {
        Ok(entries) => entries,
        Err(error) => {
            warn!(
                event_name = "session.persist.encode_failed",
                %error,
                "skipping session flush"
            );
            return;
        }
    };
    match kv.write_all(&entries).await {
        Ok(()) => debug!(
            event_name = "session.persist.flushed",
            entries = entries.len(),
            "session state flushed"
        ),
        Err(error) => warn!(
            event_name = "session.persist.write_failed",
            %error,
            "session flush failed, in-memory state unaffected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use farebid_core::store::{snapshot::KEY_CURRENT_USER, BookingStore};
    use tokio::time::sleep;

    use super::spawn_persister;
    use crate::kv::{InMemoryKeyValueStore, KeyValueStore};

    #[tokio::test(start_paused = true)]
    async fn rapid_mutations_coalesce_into_one_flush() {
        let store = Arc::new(BookingStore::new());
        store.mark_loaded();
        let kv = Arc::new(InMemoryKeyValueStore::default());
        let handle = spawn_persister(store.clone(), kv.clone(), Duration::from_millis(500));

        store.login_user("u-1", "Asha");
        sleep(Duration::from_millis(200)).await;
        let request = store.create_request("Asha", "A", "B").expect("create");
        sleep(Duration::from_millis(200)).await;
        store.submit_offer(&request.id, "Bob", "100").expect("offer");

        sleep(Duration::from_millis(700)).await;
        assert_eq!(kv.write_count(), 1);

        store.mark_offers_viewed();
        sleep(Duration::from_millis(700)).await;
        assert_eq!(kv.write_count(), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn flushed_entries_hold_the_serialized_fields() {
        let store = Arc::new(BookingStore::new());
        store.mark_loaded();
        let kv = Arc::new(InMemoryKeyValueStore::default());
        let handle = spawn_persister(store.clone(), kv.clone(), Duration::from_millis(100));

        store.login_user("u-1", "Asha");
        sleep(Duration::from_millis(200)).await;

        let entries = kv.read_all(&[KEY_CURRENT_USER]).await.expect("read");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.contains("\"userName\":\"Asha\""));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn no_mutations_means_no_writes() {
        let store = Arc::new(BookingStore::new());
        let kv = Arc::new(InMemoryKeyValueStore::default());
        let handle = spawn_persister(store.clone(), kv.clone(), Duration::from_millis(100));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(kv.write_count(), 0);

        handle.abort();
    }
}
