//! The transformed data stream and the background workers around it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::DataPoint;
use crate::transform::{DatumTransformer, TransformerSchema};

/// Three-stage payload transform: privacy, data format, custom.
#[derive(Clone)]
pub(crate) struct DataPipeline {
    privacy: Option<Arc<TransformerSchema>>,
    format: Option<Arc<TransformerSchema>>,
    custom: DatumTransformer,
}

impl DataPipeline {
    pub fn new(
        privacy: Option<Arc<TransformerSchema>>,
        format: Option<Arc<TransformerSchema>>,
        custom: DatumTransformer,
    ) -> Self {
        Self {
            privacy,
            format,
            custom,
        }
    }

    /// Transform the payload. The envelope passes through untouched.
    pub fn apply(&self, point: DataPoint) -> DataPoint {
        point.map_body(|datum| {
            let datum = match &self.privacy {
                Some(schema) => schema.transform(datum),
                None => datum,
            };
            let datum = match &self.format {
                Some(schema) => schema.transform(datum),
                None => datum,
            };
            (self.custom)(datum)
        })
    }

    /// Forward every raw data point, transformed, into `output`.
    ///
    /// On cancellation the points already buffered in `raw` are still
    /// delivered; nothing after that is accepted.
    pub fn spawn(
        self,
        mut raw: broadcast::Receiver<DataPoint>,
        output: broadcast::Sender<DataPoint>,
    ) -> Worker {
        Worker::spawn(move |token| async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        while let Ok(point) = raw.try_recv() {
                            let _ = output.send(self.apply(point));
                        }
                        break;
                    }

                    item = raw.recv() => match item {
                        Ok(point) => {
                            let _ = output.send(self.apply(point));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Data pipeline lagged behind the executor stream");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}

/// Count every item of `data` into `counter`, exactly once per item.
pub(crate) fn spawn_counter(
    mut data: broadcast::Receiver<DataPoint>,
    counter: Arc<AtomicU64>,
) -> Worker {
    Worker::spawn(move |token| async move {
        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    while data.try_recv().is_ok() {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    break;
                }

                item = data.recv() => match item {
                    Ok(_) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        counter.fetch_add(skipped, Ordering::Relaxed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    })
}

/// A cancellable background task. Cancelled when dropped.
pub(crate) struct Worker {
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(f(cancel_token.clone()));
        Self {
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Cancel and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task failed");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
