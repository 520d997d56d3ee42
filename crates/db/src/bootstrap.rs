use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use farebid_core::config::{AppConfig, ConfigError, LoadOptions, LogFormat, LoggingConfig};
use farebid_core::store::{BookingStore, SessionSnapshot, PERSISTED_KEYS};

use crate::connection::connect;
use crate::kv::{KeyValueStore, SqliteKeyValueStore};
use crate::migrations;
use crate::persister::spawn_persister;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// The wired-up session: the store consumers talk to, plus the storage it
/// mirrors into. Screens receive `store` by reference and never touch the
/// rest.
pub struct Session {
    pub config: AppConfig,
    pub store: Arc<BookingStore>,
    kv: Arc<dyn KeyValueStore>,
    persister: JoinHandle<()>,
}

impl Session {
    /// Loads config, opens storage, hydrates the store from whatever was
    /// persisted, and spawns the debounced mirror task. A storage read
    /// failure degrades to an empty session rather than refusing to start.
    pub async fn start(options: LoadOptions) -> Result<Self, SessionError> {
        let config = AppConfig::load(options)?;

        let pool = connect(&config.database).await.map_err(SessionError::DatabaseConnect)?;
        migrations::run_pending(&pool).await.map_err(SessionError::Migration)?;

        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool));
        let store = Arc::new(BookingStore::new());

        let entries = match kv.read_all(&PERSISTED_KEYS).await {
            Ok(entries) => entries,
            Err(error) => {
                warn!(
                    event_name = "session.load.read_failed",
                    %error,
                    "could not read persisted session, starting empty"
                );
                Vec::new()
            }
        };
        store.hydrate(SessionSnapshot::from_entries(&entries));
        store.mark_loaded();
        info!(
            event_name = "session.load.complete",
            restored_keys = entries.len(),
            "session state loaded"
        );

        let persister = spawn_persister(
            store.clone(),
            kv.clone(),
            Duration::from_millis(config.persistence.debounce_ms),
        );

        Ok(Self { config, store, kv, persister })
    }

    /// Full reset: in-memory state first, then a best-effort wipe of the
    /// persisted mirror. A failed wipe is logged and otherwise ignored.
    pub async fn reset(&self) {
        self.store.reset_session();
        if let Err(error) = self.kv.clear().await {
            warn!(
                event_name = "session.reset.clear_failed",
                %error,
                "could not clear persisted session"
            );
        }
    }

    /// Stops the mirror task. Pending debounced writes are dropped, matching
    /// the fire-and-forget persistence contract.
    pub fn shutdown(&self) {
        self.persister.abort();
    }
}

/// Installs the global tracing subscriber. Safe to call more than once; later
/// calls are ignored, which keeps test setups simple.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // try_init fails when a subscriber is already installed; keep it.
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
