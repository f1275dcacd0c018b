//! Broadcast fan-in across a dynamic set of child streams.
//!
//! A [`StreamGroup`] owns one multicast output channel and a growing set of
//! source subscriptions. Every source gets a forwarding task that copies its
//! items into the output in arrival order; sources can be added at any time
//! and only contribute items emitted after they were added.

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default output channel capacity.
pub const DEFAULT_GROUP_CAPACITY: usize = 1024;

/// Multicast merge of a mutable set of broadcast sources.
pub struct StreamGroup<T> {
    name: String,
    sender: broadcast::Sender<T>,
    cancel_token: CancellationToken,
    sources: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> StreamGroup<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_GROUP_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            sender,
            cancel_token: CancellationToken::new(),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the merged output.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Add a source. Ignored once the group is closed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(&self, mut source: broadcast::Receiver<T>) {
        if self.cancel_token.is_cancelled() {
            debug!(group = %self.name, "Ignoring source added to a closed stream group");
            return;
        }

        let sender = self.sender.clone();
        let cancel_token = self.cancel_token.clone();
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => break,

                    item = source.recv() => match item {
                        Ok(item) => {
                            // No subscribers is not an error.
                            let _ = sender.send(item);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(group = %name, skipped, "Stream group source lagged, items dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        let mut sources = self.sources.lock();
        sources.retain(|h| !h.is_finished());
        sources.push(handle);
    }

    /// Number of sources still forwarding.
    pub fn active_sources(&self) -> usize {
        let mut sources = self.sources.lock();
        sources.retain(|h| !h.is_finished());
        sources.len()
    }

    /// Stop forwarding from every source. Items already forwarded stay
    /// delivered; nothing further is accepted.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }
}

impl<T> Drop for StreamGroup<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(rx: &mut broadcast::Receiver<u32>) -> Option<u32> {
        timeout(Duration::from_secs(1), rx.recv()).await.ok()?.ok()
    }

    #[tokio::test]
    async fn test_merges_sources_in_arrival_order() {
        let group = StreamGroup::new("test");
        let (a_tx, _) = broadcast::channel(16);
        let (b_tx, _) = broadcast::channel(16);
        group.add(a_tx.subscribe());
        group.add(b_tx.subscribe());
        let mut out = group.subscribe();

        a_tx.send(1).unwrap();
        assert_eq!(next(&mut out).await, Some(1));
        b_tx.send(2).unwrap();
        assert_eq!(next(&mut out).await, Some(2));
        a_tx.send(3).unwrap();
        assert_eq!(next(&mut out).await, Some(3));
    }

    #[tokio::test]
    async fn test_late_source_does_not_replay() {
        let group = StreamGroup::new("test");
        let (tx, _keep) = broadcast::channel(16);
        tx.send(1).unwrap();

        let mut out = group.subscribe();
        group.add(tx.subscribe());
        tx.send(2).unwrap();

        assert_eq!(next(&mut out).await, Some(2));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_each_item_once() {
        let group = StreamGroup::new("test");
        let (tx, _) = broadcast::channel(16);
        group.add(tx.subscribe());
        let mut first = group.subscribe();
        let mut second = group.subscribe();

        tx.send(7).unwrap();
        assert_eq!(next(&mut first).await, Some(7));
        assert_eq!(next(&mut second).await, Some(7));
        assert!(first.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_stops_forwarding() {
        let group = StreamGroup::new("test");
        let (tx, _) = broadcast::channel(16);
        group.add(tx.subscribe());
        let mut out = group.subscribe();

        group.close();
        tokio::task::yield_now().await;
        let _ = tx.send(1);
        assert_eq!(next(&mut out).await, None);

        group.add(tx.subscribe());
        assert_eq!(group.active_sources(), 0);
    }
}
