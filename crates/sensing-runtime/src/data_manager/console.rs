//! Data manager printing data points as JSON lines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::DataManager;
use crate::domain::{DataPoint, StudyDeployment};
use crate::error::{Error, Result};

/// Endpoint type served by [`ConsoleDataManager`].
pub const CONSOLE_ENDPOINT: &str = "PRINT";

/// Writes every data point to stdout as one JSON line, stamped with the
/// deployment and user it belongs to.
#[derive(Debug, Default)]
pub struct ConsoleDataManager {
    written: AtomicU64,
    closed: AtomicBool,
    deployment: Mutex<Option<(String, Option<String>)>>,
}

impl ConsoleDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data points written so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DataManager for ConsoleDataManager {
    fn endpoint_type(&self) -> &str {
        CONSOLE_ENDPOINT
    }

    async fn initialize(&self, deployment: &StudyDeployment) -> Result<()> {
        *self.deployment.lock() = Some((
            deployment.study_deployment_id.clone(),
            deployment.user_id.clone(),
        ));
        self.closed.store(false, Ordering::Release);
        info!(
            study_deployment_id = %deployment.study_deployment_id,
            "Console data manager initialized"
        );
        Ok(())
    }

    async fn on_data(&self, data_point: DataPoint) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::DataManager("console data manager is closed".to_string()));
        }
        let stamp = self.deployment.lock().clone();
        let data_point = match stamp {
            Some((study_deployment_id, user_id)) => {
                data_point.with_deployment(study_deployment_id, user_id)
            }
            None => data_point,
        };
        let line = serde_json::to_string(&data_point)?;
        println!("{}", line);
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn on_error(&self, error: &Error) {
        warn!(error = %error, "Console data manager error");
    }

    async fn on_done(&self) {
        info!(written = self.written(), "Console data manager stream done");
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(written = self.written(), "Console data manager closed");
        }
        Ok(())
    }
}
