//! Public types shared with the mobile shell
//!
//! Everything the UI layer touches lives here: client records, the search
//! state feed, registration outcomes, registry events and the error taxonomy,
//! plus the `ClientRegistryApi` service trait implemented by `ClientRegistry`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Store-assigned client identifier
pub type ClientId = i64;

/// A registered client, as persisted by the durable store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Immutable snapshot of the full client listing, newest id first
pub type Listing = Arc<[ClientRecord]>;

/// One row of the audit log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub event: String,
    pub timestamp_millis: i64,
}

/// Last-used registration data kept for pre-filling the form.
/// The unset state is `""` / `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceSnapshot {
    pub last_email: String,
    pub last_saved_at_millis: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEARCH STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the search engine currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    /// Blank term, showing the full listing
    Idle,
    /// A computation for the current term is outstanding
    Filtering,
    /// Results reflect the current term against the latest listing
    Filtered,
}

/// Published state of the search/filter engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    pub term: String,
    pub is_searching: bool,
    pub filtered_results: Listing,
}

impl SearchState {
    /// Idle state over the given listing
    pub fn idle(listing: Listing) -> Self {
        Self {
            term: String::new(),
            is_searching: false,
            filtered_results: listing,
        }
    }

    pub fn phase(&self) -> SearchPhase {
        if self.term.trim().is_empty() {
            SearchPhase::Idle
        } else if self.is_searching {
            SearchPhase::Filtering
        } else {
            SearchPhase::Filtered
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Registration form field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Email,
    Phone,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Field::Name => "name",
            Field::Email => "email",
            Field::Phone => "phone",
        };
        f.write_str(label)
    }
}

/// Caller-supplied data failed a precondition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} is required")]
pub struct ValidationError {
    pub field: Field,
}

/// Which persistent store an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Clients,
    Audit,
    Preferences,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StoreKind::Clients => "clients",
            StoreKind::Audit => "audit",
            StoreKind::Preferences => "preferences",
        };
        f.write_str(label)
    }
}

/// An underlying persistence operation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{store} storage error: {message}")]
pub struct StorageError {
    pub store: StoreKind,
    pub message: String,
}

impl StorageError {
    pub fn new(store: StoreKind, message: impl Into<String>) -> Self {
        Self {
            store,
            message: message.into(),
        }
    }
}

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES & EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a `register` call.
///
/// `success` is decided by the durable store alone; auxiliary store failures
/// never show up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub id: Option<ClientId>,
    pub error: Option<RegistryError>,
}

impl RegistrationOutcome {
    pub fn registered(id: ClientId) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<RegistryError>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<ClientId, RegistryError> {
        match (self.id, self.error) {
            (_, Some(error)) => Err(error),
            (Some(id), None) => Ok(id),
            (None, None) => Err(StorageError::new(
                StoreKind::Clients,
                "registration finished without an id",
            )
            .into()),
        }
    }
}

/// Operation that produced a `RegistryEvent::Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Register,
    AuditAppend,
    AuditRead,
    PreferenceWrite,
    PreferenceRead,
    ClearAll,
}

/// Observability feed for the UI and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { id: ClientId, email: String },
    Cleared,
    Failed { operation: Operation, error: RegistryError },
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// The primary interface the UI shell uses to talk to the registry.
/// Implemented by `ClientRegistry`.
#[async_trait::async_trait]
pub trait ClientRegistryApi: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────────

    /// Validate and register a client. Never fails on auxiliary store errors.
    async fn register(&self, name: String, email: String, phone: String) -> RegistrationOutcome;

    /// Replace the search term. Latest term wins.
    fn set_search_term(&self, term: String);

    /// Return to the unfiltered listing
    fn clear_search_term(&self);

    /// Last email used in a successful registration, or `""`
    fn last_used_email(&self) -> String;

    /// Remove every client record (administrative reset)
    async fn clear_all(&self) -> Result<(), StorageError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Current full listing, newest first
    fn listing(&self) -> Listing;

    /// Current search state
    fn search_state(&self) -> SearchState;

    /// Newest audit entries. A read failure yields an empty list plus the error.
    fn recent_audit(&self, limit: usize) -> (Vec<AuditEntry>, Option<StorageError>);

    /// Last-used preferences; defaults when unset or unreadable
    fn preference_snapshot(&self) -> PreferenceSnapshot;

    // ─────────────────────────────────────────────────────────────────────────────
    // Outbound feeds
    // ─────────────────────────────────────────────────────────────────────────────

    fn subscribe_search(&self) -> watch::Receiver<SearchState>;

    fn subscribe_in_progress(&self) -> watch::Receiver<bool>;

    fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message_names_field() {
        let err = ValidationError { field: Field::Name };
        assert_eq!(err.to_string(), "name is required");

        let err: RegistryError = ValidationError { field: Field::Phone }.into();
        assert_eq!(err.to_string(), "phone is required");
    }

    #[test]
    fn test_storage_error_message_names_store() {
        let err = StorageError::new(StoreKind::Audit, "disk full");
        assert_eq!(err.to_string(), "audit storage error: disk full");
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(RegistrationOutcome::registered(7).into_result(), Ok(7));

        let failed = RegistrationOutcome::failed(ValidationError { field: Field::Email });
        assert!(!failed.success);
        assert!(matches!(failed.into_result(), Err(RegistryError::Validation(_))));
    }

    #[test]
    fn test_search_phase() {
        let mut state = SearchState::idle(Arc::from(Vec::new()));
        assert_eq!(state.phase(), SearchPhase::Idle);

        state.term = "juan".to_string();
        state.is_searching = true;
        assert_eq!(state.phase(), SearchPhase::Filtering);

        state.is_searching = false;
        assert_eq!(state.phase(), SearchPhase::Filtered);
    }
}
