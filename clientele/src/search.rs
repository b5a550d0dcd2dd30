//! Search/filter engine over the live client listing
//!
//! The engine holds the current search term and republishes the filtered view
//! whenever the term or the listing changes. Only the most recent computation
//! may publish.
//!
//! Latest-wins: every term or listing change bumps `generation` while holding
//! the write side of the state channel. A computation publishes only if the
//! generation it was started with is still current, checked under the same
//! lock. Superseded computations are also cancelled through their
//! `CancellationToken` so they stop early.

use crate::interface::{ClientRecord, Listing, SearchState};
use crate::runtime::DropGuard;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Records scanned between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Predicate
// ─────────────────────────────────────────────────────────────────────────────

/// Case-insensitive substring match on name, email or phone.
/// `needle` must already be lowercase.
fn record_matches(record: &ClientRecord, needle: &str) -> bool {
    record.name.to_lowercase().contains(needle)
        || record.email.to_lowercase().contains(needle)
        || record.phone.to_lowercase().contains(needle)
}

/// Filter a listing by `term`, preserving listing order.
/// A blank term matches every record.
pub fn filter_clients(listing: &[ClientRecord], term: &str) -> Vec<ClientRecord> {
    if term.trim().is_empty() {
        return listing.to_vec();
    }
    let needle = term.to_lowercase();
    listing
        .iter()
        .filter(|record| record_matches(record, &needle))
        .cloned()
        .collect()
}

/// Like `filter_clients`, but gives up and returns `None` once `token` is cancelled
pub fn filter_clients_interruptible(
    listing: &[ClientRecord],
    term: &str,
    token: &CancellationToken,
) -> Option<Vec<ClientRecord>> {
    if term.trim().is_empty() {
        return Some(listing.to_vec());
    }
    let needle = term.to_lowercase();
    let mut results = Vec::new();
    for chunk in listing.chunks(CANCEL_CHECK_INTERVAL) {
        if token.is_cancelled() {
            return None;
        }
        results.extend(chunk.iter().filter(|record| record_matches(record, &needle)).cloned());
    }
    if token.is_cancelled() {
        return None;
    }
    Some(results)
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Live search state over a listing feed.
///
/// Dropping the engine stops its background listener and cancels any
/// computation still running.
pub struct SearchEngine {
    inner: Arc<EngineInner>,
    _shutdown: DropGuard,
}

struct EngineInner {
    listing: watch::Receiver<Listing>,
    state_tx: watch::Sender<SearchState>,
    generation: AtomicU64,
    /// Newest launched computation and its cancellation token
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    filter_delay: Duration,
    shutdown: CancellationToken,
    runtime: Handle,
}

impl SearchEngine {
    /// Start an engine over `listing_rx`, initially Idle over its current listing
    pub fn spawn(
        mut listing_rx: watch::Receiver<Listing>,
        filter_delay: Duration,
        runtime: Handle,
    ) -> Self {
        let initial = listing_rx.borrow_and_update().clone();
        let (state_tx, _) = watch::channel(SearchState::idle(initial));
        let shutdown = CancellationToken::new();

        let inner = Arc::new(EngineInner {
            listing: listing_rx.clone(),
            state_tx,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            filter_delay,
            shutdown: shutdown.clone(),
            runtime: runtime.clone(),
        });

        let listener = Arc::clone(&inner);
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = listener.shutdown.cancelled() => break,
                    changed = listing_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        listener.refresh();
                    }
                }
            }
            debug!("search listener stopped");
        });

        Self {
            inner,
            _shutdown: DropGuard::new(shutdown),
        }
    }

    /// Replace the search term. Setting the current term again is a no-op.
    pub fn set_term(&self, term: impl Into<String>) {
        self.inner.set_term(term.into());
    }

    pub fn clear_term(&self) {
        self.inner.set_term(String::new());
    }

    pub fn state(&self) -> SearchState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn term(&self) -> String {
        self.inner.state_tx.borrow().term.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.inner.state_tx.subscribe()
    }
}

impl EngineInner {
    fn set_term(self: &Arc<Self>, term: String) {
        let mut launch = None;
        self.state_tx.send_if_modified(|state| {
            if state.term == term {
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.term = term.clone();
            if term.trim().is_empty() {
                state.is_searching = false;
                state.filtered_results = self.listing.borrow().clone();
                launch = Some((generation, None));
            } else {
                state.is_searching = true;
                launch = Some((generation, Some(term.clone())));
            }
            true
        });

        match launch {
            Some((generation, Some(term))) => self.launch(generation, term),
            Some((generation, None)) => {
                self.supersede(generation, None);
            }
            None => {}
        }
    }

    /// The listing changed: recompute for the current term
    fn refresh(self: &Arc<Self>) {
        let mut launch = None;
        self.state_tx.send_if_modified(|state| {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if state.term.trim().is_empty() {
                state.filtered_results = self.listing.borrow().clone();
                state.is_searching = false;
            } else {
                state.is_searching = true;
                launch = Some((generation, state.term.clone()));
            }
            true
        });

        if let Some((generation, term)) = launch {
            self.launch(generation, term);
        }
    }

    /// Record `generation` as the newest computation, cancelling the one it replaces.
    /// Returns false if a newer computation is already registered.
    fn supersede(&self, generation: u64, next: Option<CancellationToken>) -> bool {
        let mut in_flight = self.in_flight.lock();
        if matches!(&*in_flight, Some((current, _)) if *current > generation) {
            return false;
        }
        let replaced = std::mem::replace(&mut *in_flight, next.map(|token| (generation, token)));
        if let Some((_, previous)) = replaced {
            previous.cancel();
        }
        true
    }

    fn launch(self: &Arc<Self>, generation: u64, term: String) {
        let token = self.shutdown.child_token();
        if !self.supersede(generation, Some(token.clone())) {
            return;
        }

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            inner.compute(generation, term, token).await;
        });
    }

    async fn compute(&self, generation: u64, term: String, token: CancellationToken) {
        if !self.filter_delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.filter_delay) => {}
            }
        }

        let listing = self.listing.borrow().clone();
        let blocking_token = token.clone();
        let handle = self.runtime.spawn_blocking(move || {
            filter_clients_interruptible(&listing, &term, &blocking_token)
        });

        match handle.await {
            Ok(Some(results)) => {
                let count = results.len();
                if self.publish(generation, Listing::from(results)) {
                    debug!(generation, count, "search results published");
                }
            }
            Ok(None) => debug!(generation, "search superseded"),
            Err(join_error) => {
                warn!(generation, error = %join_error, "search computation failed");
                self.state_tx.send_if_modified(|state| {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return false;
                    }
                    state.is_searching = false;
                    true
                });
            }
        }
    }

    fn publish(&self, generation: u64, results: Listing) -> bool {
        self.state_tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            state.filtered_results = results;
            state.is_searching = false;
            true
        })
    }
}
