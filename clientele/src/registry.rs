//! ClientRegistry - main entry point for the UI shell
//!
//! Wires the durable store, audit log, preference snapshot, registration
//! coordinator and search engine together and implements `ClientRegistryApi`.
//!
//! Runtime: store writes and search computations run on tokio blocking
//! threads. Called outside any runtime (as a foreign binding would), the
//! registry uses the global fallback runtime.

use crate::audit::{AuditLog, SqliteAuditLog};
use crate::clients::{ClientStore, SqliteClientStore};
use crate::config::RegistryConfig;
use crate::coordinator::RegistrationCoordinator;
use crate::feed::watch_stream;
use crate::interface::{
    AuditEntry, ClientRegistryApi, Listing, Operation, PreferenceSnapshot, RegistrationOutcome,
    RegistryEvent, SearchState, StorageError, StoreKind,
};
use crate::preferences::{InMemoryPreferences, JsonPreferenceFile, PreferenceStore};
use crate::runtime::runtime_handle;
use crate::search::SearchEngine;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{error, info};

/// Client registry with live search
///
/// Concurrency Model:
/// - Each SQLite database uses an r2d2 connection pool
/// - Client writes are serialized; the live listing is published in commit order
/// - Search runs in the background with latest-wins publication
pub struct ClientRegistry {
    config: RegistryConfig,
    clients: Arc<dyn ClientStore>,
    coordinator: RegistrationCoordinator,
    search: SearchEngine,
    events: broadcast::Sender<RegistryEvent>,
}

impl ClientRegistry {
    /// Open the stores described by `config`.
    /// Without a data directory everything lives in memory.
    pub fn open(config: RegistryConfig) -> Result<Self, StorageError> {
        let (clients, audit, preferences): (
            Arc<dyn ClientStore>,
            Arc<dyn AuditLog>,
            Arc<dyn PreferenceStore>,
        ) = match (config.clients_path(), config.audit_path(), config.preferences_path()) {
            (Some(clients_path), Some(audit_path), Some(preferences_path)) => (
                Arc::new(SqliteClientStore::open(clients_path, config.pool_size)?),
                Arc::new(SqliteAuditLog::open(audit_path, config.pool_size)?),
                Arc::new(JsonPreferenceFile::new(preferences_path)),
            ),
            _ => (
                Arc::new(SqliteClientStore::open_in_memory()?),
                Arc::new(SqliteAuditLog::open_in_memory()?),
                Arc::new(InMemoryPreferences::default()),
            ),
        };

        info!(
            data_dir = ?config.data_dir,
            clients = clients.listing().len(),
            "client registry opened"
        );
        Ok(Self::with_stores(config, clients, audit, preferences))
    }

    /// Registry over in-memory stores
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open(RegistryConfig::in_memory())
    }

    /// Registry over caller-supplied stores
    pub fn with_stores(
        config: RegistryConfig,
        clients: Arc<dyn ClientStore>,
        audit: Arc<dyn AuditLog>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let coordinator =
            RegistrationCoordinator::new(Arc::clone(&clients), audit, preferences, events.clone());
        let search =
            SearchEngine::spawn(clients.subscribe(), config.filter_delay(), runtime_handle());

        Self {
            config,
            clients,
            coordinator,
            search,
            events,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn last_saved_at_millis(&self) -> i64 {
        self.coordinator.last_saved_at_millis()
    }

    /// Search state as a stream: the current state first, then each change
    pub fn search_updates(&self) -> impl Stream<Item = SearchState> {
        watch_stream(self.search.subscribe())
    }

    /// Full listing as a stream: the current listing first, then each change
    pub fn listing_updates(&self) -> impl Stream<Item = Listing> {
        watch_stream(self.clients.subscribe())
    }
}

#[async_trait::async_trait]
impl ClientRegistryApi for ClientRegistry {
    // ─────────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────────

    async fn register(&self, name: String, email: String, phone: String) -> RegistrationOutcome {
        self.coordinator.register(&name, &email, &phone).await
    }

    fn set_search_term(&self, term: String) {
        self.search.set_term(term);
    }

    fn clear_search_term(&self) {
        self.search.clear_term();
    }

    fn last_used_email(&self) -> String {
        self.coordinator.last_used_email()
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let clients = Arc::clone(&self.clients);
        let result = runtime_handle()
            .spawn_blocking(move || clients.clear_all())
            .await
            .unwrap_or_else(|join_error| {
                Err(StorageError::new(StoreKind::Clients, join_error.to_string()))
            });

        match &result {
            Ok(()) => {
                info!("client registry cleared");
                let _ = self.events.send(RegistryEvent::Cleared);
            }
            Err(err) => {
                error!(store = %err.store, error = %err, "clear failed");
                let _ = self.events.send(RegistryEvent::Failed {
                    operation: Operation::ClearAll,
                    error: err.clone().into(),
                });
            }
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    fn listing(&self) -> Listing {
        self.clients.listing()
    }

    fn search_state(&self) -> SearchState {
        self.search.state()
    }

    fn recent_audit(&self, limit: usize) -> (Vec<AuditEntry>, Option<StorageError>) {
        self.coordinator.recent_audit(limit)
    }

    fn preference_snapshot(&self) -> PreferenceSnapshot {
        self.coordinator.preference_snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Outbound feeds
    // ─────────────────────────────────────────────────────────────────────────────

    fn subscribe_search(&self) -> watch::Receiver<SearchState> {
        self.search.subscribe()
    }

    fn subscribe_in_progress(&self) -> watch::Receiver<bool> {
        self.coordinator.subscribe_in_progress()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}
