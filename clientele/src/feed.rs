//! Stream adapters for the registry's `watch` feeds

use futures::stream::{self, Stream};
use tokio::sync::watch;

/// Turn a `watch` receiver into a stream that yields the current value first,
/// then one item per observed change. Ends when the sender is dropped.
///
/// Intermediate values may be coalesced if the consumer falls behind.
pub fn watch_stream<T>(rx: watch::Receiver<T>) -> impl Stream<Item = T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
}
