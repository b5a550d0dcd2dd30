//! Tokio runtime plumbing shared by the coordinator, search engine and registry
//!
//! Cancellation: background work is tied to a `CancellationToken`. Owners hold a
//! `DropGuard`, so dropping the owner (or a future that holds the guard) cancels
//! whatever is still running.

use once_cell::sync::Lazy;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Global fallback Tokio runtime for when registry calls happen outside any runtime.
/// Shared across all registries and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("clientele-fallback")
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// Current runtime if available, otherwise the global fallback
pub fn runtime_handle() -> Handle {
    Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
}

/// RAII guard that cancels a token when dropped.
pub struct DropGuard {
    token: CancellationToken,
}

impl DropGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
