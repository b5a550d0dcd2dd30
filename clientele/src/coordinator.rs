//! Registration coordinator
//!
//! Validates input, writes to the durable store, then mirrors the write into
//! the audit log and the preference snapshot. Only the durable store decides
//! success. Auxiliary failures are logged and published on the event channel,
//! each independently of the other.
//!
//! A registration runs as its own task: once started it completes (insert,
//! audit entry, preference update, event) even if the caller stops polling.

use crate::audit::AuditLog;
use crate::clients::ClientStore;
use crate::contact::ContactIssues;
use crate::interface::{
    AuditEntry, ClientId, ClientRecord, Operation, PreferenceSnapshot, RegistrationOutcome,
    RegistryError, RegistryEvent, StorageError, StoreKind,
};
use crate::models::NewClient;
use crate::preferences::PreferenceStore;
use crate::runtime::runtime_handle;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

pub struct RegistrationCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    clients: Arc<dyn ClientStore>,
    audit: Arc<dyn AuditLog>,
    preferences: Arc<dyn PreferenceStore>,
    in_flight: Mutex<usize>,
    in_progress_tx: watch::Sender<bool>,
    events: broadcast::Sender<RegistryEvent>,
    /// Client behind the stored preference snapshot; older ids never overwrite it
    preference_owner: Mutex<Option<ClientId>>,
}

/// Counts one registration as in flight for as long as it lives
struct InFlightGuard {
    inner: Arc<CoordinatorInner>,
}

impl InFlightGuard {
    fn enter(inner: Arc<CoordinatorInner>) -> Self {
        {
            let mut count = inner.in_flight.lock();
            *count += 1;
            inner
                .in_progress_tx
                .send_if_modified(|busy| !std::mem::replace(busy, true));
        }
        Self { inner }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.inner.in_flight.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner
                .in_progress_tx
                .send_if_modified(|busy| std::mem::replace(busy, false));
        }
    }
}

impl RegistrationCoordinator {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        audit: Arc<dyn AuditLog>,
        preferences: Arc<dyn PreferenceStore>,
        events: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        let (in_progress_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CoordinatorInner {
                clients,
                audit,
                preferences,
                in_flight: Mutex::new(0),
                in_progress_tx,
                events,
                preference_owner: Mutex::new(None),
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────────

    /// Register a client.
    ///
    /// Fields are trimmed and must be non-blank (checked name, email, phone).
    /// A validation failure performs no I/O.
    pub async fn register(&self, name: &str, email: &str, phone: &str) -> RegistrationOutcome {
        let in_flight = InFlightGuard::enter(Arc::clone(&self.inner));
        let inner = Arc::clone(&self.inner);
        let (name, email, phone) = (name.to_string(), email.to_string(), phone.to_string());

        let handle = runtime_handle().spawn(async move {
            let _in_flight = in_flight;
            inner.register(&name, &email, &phone).await
        });

        handle.await.unwrap_or_else(|join_error| {
            error!(error = %join_error, "registration task failed");
            RegistrationOutcome::failed(StorageError::new(
                StoreKind::Clients,
                join_error.to_string(),
            ))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Auxiliary reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Last-used preferences; the unset defaults when unreadable
    pub fn preference_snapshot(&self) -> PreferenceSnapshot {
        match self.inner.preferences.try_get() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(store = %err.store, error = %err, "preference read failed, using defaults");
                self.inner.emit_failure(Operation::PreferenceRead, err.into());
                PreferenceSnapshot::default()
            }
        }
    }

    pub fn last_used_email(&self) -> String {
        self.preference_snapshot().last_email
    }

    pub fn last_saved_at_millis(&self) -> i64 {
        self.preference_snapshot().last_saved_at_millis
    }

    /// Newest audit entries; on failure an empty list plus the error
    pub fn recent_audit(&self, limit: usize) -> (Vec<AuditEntry>, Option<StorageError>) {
        let (entries, failure) = self.inner.audit.recent(limit);
        if let Some(err) = &failure {
            self.inner.emit_failure(Operation::AuditRead, err.clone().into());
        }
        (entries, failure)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Feeds
    // ─────────────────────────────────────────────────────────────────────────────

    /// `true` while at least one registration is running
    pub fn subscribe_in_progress(&self) -> watch::Receiver<bool> {
        self.inner.in_progress_tx.subscribe()
    }

    pub fn is_in_progress(&self) -> bool {
        *self.inner.in_progress_tx.borrow()
    }
}

impl CoordinatorInner {
    async fn register(
        self: &Arc<Self>,
        name: &str,
        email: &str,
        phone: &str,
    ) -> RegistrationOutcome {
        let started = Instant::now();

        let client = match NewClient::from_input(name, email, phone) {
            Ok(client) => client,
            Err(err) => {
                debug!(field = %err.field, "registration rejected");
                self.emit_failure(Operation::Register, err.clone().into());
                return RegistrationOutcome::failed(err);
            }
        };

        let issues = ContactIssues::check(&client.email, &client.phone);
        if !issues.is_clean() {
            debug!(
                email_malformed = issues.email_malformed,
                phone_malformed = issues.phone_malformed,
                "contact details look unusual"
            );
        }

        let record = match self.insert(client).await {
            Ok(record) => record,
            Err(err) => {
                error!(store = %err.store, error = %err, "registration failed");
                self.emit_failure(Operation::Register, err.clone().into());
                return RegistrationOutcome::failed(err);
            }
        };

        self.mirror(&record).await;

        info!(
            client_id = record.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "client registered"
        );
        let _ = self.events.send(RegistryEvent::Registered {
            id: record.id,
            email: record.email.clone(),
        });

        RegistrationOutcome::registered(record.id)
    }

    async fn insert(&self, client: NewClient) -> Result<ClientRecord, StorageError> {
        let clients = Arc::clone(&self.clients);
        runtime_handle()
            .spawn_blocking(move || clients.insert(&client))
            .await
            .unwrap_or_else(|join_error| {
                Err(StorageError::new(StoreKind::Clients, join_error.to_string()))
            })
    }

    /// Best-effort writes to the audit log and the preference snapshot
    async fn mirror(self: &Arc<Self>, record: &ClientRecord) {
        let inner = Arc::clone(self);
        let id = record.id;
        let event = format!("Insert client id={} email={}", record.id, record.email);
        let email = record.email.clone();

        let handle = runtime_handle().spawn_blocking(move || {
            let appended = inner.audit.append(&event);
            let stored = inner.store_preferences(id, &email);
            (appended, stored)
        });

        match handle.await {
            Ok((appended, stored)) => {
                if let Err(err) = appended {
                    warn!(
                        client_id = id,
                        store = %err.store,
                        error = %err,
                        "audit append failed"
                    );
                    self.emit_failure(Operation::AuditAppend, err.into());
                }
                if let Err(err) = stored {
                    warn!(
                        client_id = id,
                        store = %err.store,
                        error = %err,
                        "preference write failed"
                    );
                    self.emit_failure(Operation::PreferenceWrite, err.into());
                }
            }
            Err(join_error) => {
                warn!(client_id = id, error = %join_error, "auxiliary writes aborted");
                let message = join_error.to_string();
                self.emit_failure(
                    Operation::AuditAppend,
                    StorageError::new(StoreKind::Audit, message.clone()).into(),
                );
                self.emit_failure(
                    Operation::PreferenceWrite,
                    StorageError::new(StoreKind::Preferences, message).into(),
                );
            }
        }
    }

    /// Write the snapshot for client `id` unless a newer client already owns it.
    /// Ids follow commit order, so the snapshot always tracks the newest commit.
    fn store_preferences(&self, id: ClientId, email: &str) -> Result<(), StorageError> {
        let mut owner = self.preference_owner.lock();
        if matches!(*owner, Some(newest) if newest > id) {
            debug!(client_id = id, "preference write skipped for older registration");
            return Ok(());
        }
        self.preferences.set(email, Utc::now().timestamp_millis())?;
        *owner = Some(id);
        Ok(())
    }

    fn emit_failure(&self, operation: Operation, error: RegistryError) {
        // No subscribers is fine
        let _ = self.events.send(RegistryEvent::Failed { operation, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SqliteAuditLog;
    use crate::clients::SqliteClientStore;
    use crate::interface::{Field, Listing, ValidationError};
    use crate::preferences::InMemoryPreferences;
    use std::time::Duration;

    struct FailingClients;

    impl ClientStore for FailingClients {
        fn insert(&self, _client: &NewClient) -> Result<ClientRecord, StorageError> {
            Err(StorageError::new(StoreKind::Clients, "disk I/O error"))
        }
        fn clear_all(&self) -> Result<(), StorageError> {
            Err(StorageError::new(StoreKind::Clients, "disk I/O error"))
        }
        fn listing(&self) -> Listing {
            Listing::from(Vec::new())
        }
        fn subscribe(&self) -> watch::Receiver<Listing> {
            watch::channel(Listing::from(Vec::new())).1
        }
    }

    struct SlowClients {
        inner: SqliteClientStore,
        delay: Duration,
    }

    impl ClientStore for SlowClients {
        fn insert(&self, client: &NewClient) -> Result<ClientRecord, StorageError> {
            std::thread::sleep(self.delay);
            self.inner.insert(client)
        }
        fn clear_all(&self) -> Result<(), StorageError> {
            self.inner.clear_all()
        }
        fn listing(&self) -> Listing {
            self.inner.listing()
        }
        fn subscribe(&self) -> watch::Receiver<Listing> {
            self.inner.subscribe()
        }
    }

    struct FailingAudit;

    impl AuditLog for FailingAudit {
        fn append(&self, _event: &str) -> Result<AuditEntry, StorageError> {
            Err(StorageError::new(StoreKind::Audit, "audit database is locked"))
        }
        fn try_recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
            Err(StorageError::new(StoreKind::Audit, "audit database is locked"))
        }
    }

    /// Audit log that stalls on events mentioning `slow_email`
    struct StallingAudit {
        inner: SqliteAuditLog,
        slow_email: &'static str,
        delay: Duration,
    }

    impl AuditLog for StallingAudit {
        fn append(&self, event: &str) -> Result<AuditEntry, StorageError> {
            if event.contains(self.slow_email) {
                std::thread::sleep(self.delay);
            }
            self.inner.append(event)
        }
        fn try_recent(&self, limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
            self.inner.try_recent(limit)
        }
    }

    struct PanickingAudit;

    impl AuditLog for PanickingAudit {
        fn append(&self, _event: &str) -> Result<AuditEntry, StorageError> {
            panic!("audit backend crashed");
        }
        fn try_recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct FailingPreferences;

    impl PreferenceStore for FailingPreferences {
        fn set(&self, _last_email: &str, _at_millis: i64) -> Result<(), StorageError> {
            Err(StorageError::new(StoreKind::Preferences, "read-only file system"))
        }
        fn try_get(&self) -> Result<PreferenceSnapshot, StorageError> {
            Err(StorageError::new(StoreKind::Preferences, "read-only file system"))
        }
    }

    struct Fixture {
        coordinator: RegistrationCoordinator,
        clients: Arc<SqliteClientStore>,
        audit: Arc<SqliteAuditLog>,
        preferences: Arc<InMemoryPreferences>,
        events: broadcast::Receiver<RegistryEvent>,
    }

    fn fixture() -> Fixture {
        let clients = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let audit = Arc::new(SqliteAuditLog::open_in_memory().unwrap());
        let preferences = Arc::new(InMemoryPreferences::default());
        let (events_tx, events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            clients.clone(),
            audit.clone(),
            preferences.clone(),
            events_tx,
        );
        Fixture {
            coordinator,
            clients,
            audit,
            preferences,
            events,
        }
    }

    #[tokio::test]
    async fn test_register_writes_all_three_stores() {
        let mut fx = fixture();

        let outcome = fx
            .coordinator
            .register("Juan Pérez", "juan@correo.com", "912345678")
            .await;

        assert!(outcome.success);
        let id = outcome.id.unwrap();
        assert_eq!(fx.clients.listing()[0].id, id);

        let entries = fx.audit.try_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, format!("Insert client id={id} email=juan@correo.com"));

        let prefs = fx.preferences.get();
        assert_eq!(prefs.last_email, "juan@correo.com");
        assert!(prefs.last_saved_at_millis > 0);
        assert_eq!(fx.coordinator.last_used_email(), "juan@correo.com");

        assert_eq!(
            fx.events.recv().await.unwrap(),
            RegistryEvent::Registered { id, email: "juan@correo.com".to_string() }
        );
    }

    #[tokio::test]
    async fn test_register_trims_input() {
        let fx = fixture();

        let outcome = fx
            .coordinator
            .register("  María López ", " maria@correo.com ", " 987654321 ")
            .await;

        assert!(outcome.success);
        let record = fx.clients.listing()[0].clone();
        assert_eq!(record.name, "María López");
        assert_eq!(record.email, "maria@correo.com");
        assert_eq!(fx.coordinator.last_used_email(), "maria@correo.com");
    }

    #[tokio::test]
    async fn test_blank_field_fails_validation_without_io() {
        let mut fx = fixture();

        let outcome = fx.coordinator.register("", "x@y.com", "123").await;

        assert!(!outcome.success);
        assert_eq!(
            outcome.error,
            Some(RegistryError::Validation(ValidationError { field: Field::Name }))
        );
        assert!(fx.clients.listing().is_empty());
        assert_eq!(fx.audit.count().unwrap(), 0);
        assert_eq!(fx.preferences.get(), PreferenceSnapshot::default());
        assert!(matches!(
            fx.events.recv().await.unwrap(),
            RegistryEvent::Failed { operation: Operation::Register, .. }
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_registration() {
        let clients = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let preferences = Arc::new(InMemoryPreferences::default());
        let (events_tx, mut events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            clients.clone(),
            Arc::new(FailingAudit),
            preferences.clone(),
            events_tx,
        );

        let outcome = coordinator.register("Juan Pérez", "juan@correo.com", "912345678").await;

        assert!(outcome.success);
        assert_eq!(clients.listing().len(), 1);
        assert_eq!(preferences.get().last_email, "juan@correo.com");

        match events.recv().await.unwrap() {
            RegistryEvent::Failed { operation, error } => {
                assert_eq!(operation, Operation::AuditAppend);
                assert!(matches!(
                    error,
                    RegistryError::Storage(StorageError { store: StoreKind::Audit, .. })
                ));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Registered { .. }));

        let (entries, failure) = coordinator.recent_audit(10);
        assert!(entries.is_empty());
        assert!(failure.is_some());
    }

    #[tokio::test]
    async fn test_preference_failure_does_not_block_audit() {
        let clients = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let audit = Arc::new(SqliteAuditLog::open_in_memory().unwrap());
        let (events_tx, _events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            clients.clone(),
            audit.clone(),
            Arc::new(FailingPreferences),
            events_tx,
        );

        let outcome = coordinator.register("Juan Pérez", "juan@correo.com", "912345678").await;

        assert!(outcome.success);
        assert_eq!(audit.count().unwrap(), 1);
        assert_eq!(coordinator.last_used_email(), "");
        assert_eq!(coordinator.last_saved_at_millis(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_skips_side_effects() {
        let audit = Arc::new(SqliteAuditLog::open_in_memory().unwrap());
        let preferences = Arc::new(InMemoryPreferences::default());
        let (events_tx, _events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            Arc::new(FailingClients),
            audit.clone(),
            preferences.clone(),
            events_tx,
        );

        let outcome = coordinator.register("Juan Pérez", "juan@correo.com", "912345678").await;

        assert!(!outcome.success);
        assert_eq!(outcome.id, None);
        assert!(matches!(
            outcome.error,
            Some(RegistryError::Storage(StorageError { store: StoreKind::Clients, .. }))
        ));
        assert_eq!(audit.count().unwrap(), 0);
        assert_eq!(preferences.get(), PreferenceSnapshot::default());
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn test_in_progress_flag_tracks_registration() {
        let clients = Arc::new(SlowClients {
            inner: SqliteClientStore::open_in_memory().unwrap(),
            delay: Duration::from_millis(100),
        });
        let (events_tx, _events) = broadcast::channel(16);
        let coordinator = Arc::new(RegistrationCoordinator::new(
            clients,
            Arc::new(SqliteAuditLog::open_in_memory().unwrap()),
            Arc::new(InMemoryPreferences::default()),
            events_tx,
        ));
        let mut in_progress = coordinator.subscribe_in_progress();
        assert!(!*in_progress.borrow_and_update());

        let task = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator.register("Juan Pérez", "juan@correo.com", "912345678").await
            })
        };

        in_progress.changed().await.unwrap();
        assert!(*in_progress.borrow_and_update());

        let outcome = task.await.unwrap();
        assert!(outcome.success);
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn test_concurrent_registrations_get_distinct_ids() {
        let fx = fixture();
        let coordinator = Arc::new(fx.coordinator);

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator
                        .register(&format!("Client {i}"), &format!("c{i}@correo.com"), "900000000")
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().into_result().unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_eq!(fx.clients.listing().len(), 10);
        assert_eq!(fx.audit.count().unwrap(), 10);
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn test_abandoned_register_call_still_completes() {
        let clients = Arc::new(SlowClients {
            inner: SqliteClientStore::open_in_memory().unwrap(),
            delay: Duration::from_millis(100),
        });
        let audit = Arc::new(SqliteAuditLog::open_in_memory().unwrap());
        let preferences = Arc::new(InMemoryPreferences::default());
        let (events_tx, mut events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            clients.clone(),
            audit.clone(),
            preferences.clone(),
            events_tx,
        );

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            coordinator.register("Juan Pérez", "juan@correo.com", "912345678"),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(clients.listing().len(), 1);
        assert_eq!(audit.count().unwrap(), 1);
        assert_eq!(preferences.get().last_email, "juan@correo.com");
        assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Registered { .. }));
        assert!(!coordinator.is_in_progress());
    }

    #[tokio::test]
    async fn test_older_registration_never_overwrites_newer_preferences() {
        let clients = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let preferences = Arc::new(InMemoryPreferences::default());
        let (events_tx, _events) = broadcast::channel(16);
        let coordinator = Arc::new(RegistrationCoordinator::new(
            clients.clone(),
            Arc::new(StallingAudit {
                inner: SqliteAuditLog::open_in_memory().unwrap(),
                slow_email: "a@x.com",
                delay: Duration::from_millis(400),
            }),
            preferences.clone(),
            events_tx,
        ));

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.register("A", "a@x.com", "911111111").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = coordinator.register("B", "b@x.com", "922222222").await;
        let first = first.await.unwrap();

        assert!(first.id.unwrap() < second.id.unwrap());
        assert_eq!(clients.listing()[0].email, "b@x.com");
        assert_eq!(preferences.get().last_email, "b@x.com");
    }

    #[tokio::test]
    async fn test_panicking_audit_is_reported_on_event_channel() {
        let clients = Arc::new(SqliteClientStore::open_in_memory().unwrap());
        let (events_tx, mut events) = broadcast::channel(16);
        let coordinator = RegistrationCoordinator::new(
            clients.clone(),
            Arc::new(PanickingAudit),
            Arc::new(InMemoryPreferences::default()),
            events_tx,
        );

        let outcome = coordinator.register("Juan Pérez", "juan@correo.com", "912345678").await;

        assert!(outcome.success);
        assert_eq!(clients.listing().len(), 1);
        let mut failed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RegistryEvent::Failed { operation, .. } = event {
                failed.push(operation);
            }
        }
        assert_eq!(failed, vec![Operation::AuditAppend, Operation::PreferenceWrite]);
    }
}
