//! Data managers: consumers that persist or upload the transformed data
//! stream.
//!
//! A data manager is looked up by the deployment's data endpoint type.
//! [`attach`] initializes a manager and drives it from a data stream until
//! the stream closes or the returned [`Attachment`] is detached.

mod console;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{DataPoint, StudyDeployment};
use crate::error::{Error, Result};

pub use console::{CONSOLE_ENDPOINT, ConsoleDataManager};

/// Consumer of the transformed data stream.
#[async_trait]
pub trait DataManager: Send + Sync {
    /// Data endpoint type this manager serves.
    fn endpoint_type(&self) -> &str;

    /// Prepare for a deployment. Called before any data is delivered.
    async fn initialize(&self, deployment: &StudyDeployment) -> Result<()>;

    /// Handle one data point.
    async fn on_data(&self, data_point: DataPoint) -> Result<()>;

    /// Handle a stream or delivery error.
    async fn on_error(&self, error: &Error);

    /// The data stream has ended.
    async fn on_done(&self);

    /// Release resources. Must be idempotent.
    async fn close(&self) -> Result<()>;
}

/// Registry of data managers keyed by endpoint type.
#[derive(Default)]
pub struct DataManagerRegistry {
    managers: HashMap<String, Arc<dyn DataManager>>,
}

impl DataManagerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the console data manager.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ConsoleDataManager::new()));
        registry
    }

    /// Register a manager under its endpoint type, replacing any previous one.
    pub fn register(&mut self, manager: Arc<dyn DataManager>) {
        self.managers
            .insert(manager.endpoint_type().to_ascii_uppercase(), manager);
    }

    /// Look up a manager by endpoint type (case insensitive).
    pub fn lookup(&self, endpoint_type: &str) -> Option<Arc<dyn DataManager>> {
        self.managers
            .get(&endpoint_type.to_ascii_uppercase())
            .cloned()
    }

    /// Registered endpoint types.
    pub fn endpoint_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.managers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// A running delivery from a data stream into a data manager.
pub struct Attachment {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Attachment {
    /// Stop delivering. A data point already being delivered completes.
    pub fn detach(&self) {
        self.cancel_token.cancel();
    }

    /// Detach and wait for the pump to finish.
    pub async fn finish(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Data manager pump task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Initialize `manager` for `deployment` and deliver every item of `data`
/// to it.
pub async fn attach(
    manager: Arc<dyn DataManager>,
    deployment: &StudyDeployment,
    mut data: broadcast::Receiver<DataPoint>,
) -> Result<Attachment> {
    manager.initialize(deployment).await?;

    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!(endpoint = %manager.endpoint_type(), "Data manager detached");
                    break;
                }

                item = data.recv() => match item {
                    Ok(data_point) => {
                        if let Err(e) = manager.on_data(data_point).await {
                            manager.on_error(&e).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(endpoint = %manager.endpoint_type(), skipped, "Data manager lagged behind the data stream");
                        let error = Error::DataManager(format!("{} data points dropped", skipped));
                        manager.on_error(&error).await;
                    }
                    Err(RecvError::Closed) => {
                        manager.on_done().await;
                        break;
                    }
                }
            }
        }
    });

    Ok(Attachment {
        cancel_token,
        handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataFormat, Datum};
    use crate::test_utils::{RecordingDataManager, wait_until};

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = DataManagerRegistry::with_defaults();
        assert!(registry.lookup("print").is_some());
        assert!(registry.lookup("FILE").is_none());
        assert_eq!(registry.endpoint_types(), vec!["PRINT"]);
    }

    #[tokio::test]
    async fn test_attach_delivers_and_detaches() {
        let manager = Arc::new(RecordingDataManager::new("MEMORY"));
        let (tx, rx) = broadcast::channel(16);
        let deployment = StudyDeployment::new("d-1");

        let attachment = attach(manager.clone(), &deployment, rx).await.unwrap();
        assert_eq!(manager.initialized(), 1);

        tx.send(DataPoint::from_datum(Datum::new(DataFormat::carp("a"))))
            .unwrap();
        tx.send(DataPoint::from_datum(Datum::new(DataFormat::carp("b"))))
            .unwrap();
        assert!(wait_until(|| manager.received().len() == 2).await);

        attachment.finish().await;
        let _ = tx.send(DataPoint::from_datum(Datum::new(DataFormat::carp("c"))));
        tokio::task::yield_now().await;
        assert_eq!(manager.received().len(), 2);
    }

    #[tokio::test]
    async fn test_closed_stream_calls_on_done() {
        let manager = Arc::new(RecordingDataManager::new("MEMORY"));
        let (tx, rx) = broadcast::channel::<DataPoint>(16);
        let deployment = StudyDeployment::new("d-1");

        let _attachment = attach(manager.clone(), &deployment, rx).await.unwrap();
        drop(tx);
        assert!(wait_until(|| manager.done()).await);
    }
}
