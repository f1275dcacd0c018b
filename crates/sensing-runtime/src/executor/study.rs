//! Study executor: root of the executor tree, one task executor per task.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{Executor, ExecutorCore, ExecutorState, FanOut, TaskExecutor};
use crate::data_manager::{DataManager, DataManagerRegistry};
use crate::domain::{DataPoint, StudyDeployment};
use crate::error::Result;
use crate::sampling::SamplingPackageRegistry;

/// Executes a [`StudyDeployment`].
pub struct StudyExecutor {
    core: ExecutorCore<TaskExecutor>,
    deployment: Arc<RwLock<StudyDeployment>>,
    packages: Arc<SamplingPackageRegistry>,
    data_managers: Arc<DataManagerRegistry>,
    data_manager: OnceLock<Option<Arc<dyn DataManager>>>,
    capacity: usize,
}

impl StudyExecutor {
    pub fn new(
        deployment: Arc<RwLock<StudyDeployment>>,
        packages: Arc<SamplingPackageRegistry>,
        data_managers: Arc<DataManagerRegistry>,
        capacity: usize,
    ) -> Self {
        let name = deployment.read().study_deployment_id.clone();
        Self {
            core: ExecutorCore::new(name, capacity),
            deployment,
            packages,
            data_managers,
            data_manager: OnceLock::new(),
            capacity,
        }
    }

    /// Move from `Created` to `Initialized`.
    pub fn initialize(&self) -> Result<()> {
        self.core.transition(ExecutorState::Initialized)
    }

    /// The task executors created by `start`, in task order.
    pub fn executors(&self) -> Vec<Arc<TaskExecutor>> {
        self.core.children()
    }

    /// The deployment this executor runs.
    pub fn deployment(&self) -> Arc<RwLock<StudyDeployment>> {
        Arc::clone(&self.deployment)
    }

    /// Data manager for the deployment's endpoint type.
    ///
    /// Looked up on first use and cached. A missing manager is reported once.
    pub fn data_manager(&self) -> Option<Arc<dyn DataManager>> {
        self.data_manager
            .get_or_init(|| {
                let endpoint_type = self.deployment.read().data_endpoint.endpoint_type.clone();
                let manager = self.data_managers.lookup(&endpoint_type);
                if manager.is_none() {
                    warn!(
                        executor = %self.name(),
                        endpoint_type = %endpoint_type,
                        "No data manager registered for endpoint type, data will not be stored"
                    );
                }
                manager
            })
            .clone()
    }

    /// Push the deployment's current measure configuration to every task
    /// executor.
    pub async fn reconfigure(&self) {
        let tasks = self.deployment.read().tasks.clone();
        for (executor, task) in self.core.children().iter().zip(tasks.iter()) {
            executor.reconfigure(task).await;
        }
    }
}

#[async_trait]
impl Executor for StudyExecutor {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn state(&self) -> ExecutorState {
        self.core.state()
    }

    fn events(&self) -> broadcast::Receiver<DataPoint> {
        self.core.events()
    }

    async fn start(&self) -> Result<()> {
        self.core.transition(ExecutorState::Resumed)?;

        let tasks = self.deployment.read().tasks.clone();
        for task in tasks {
            let executor = Arc::new(TaskExecutor::new(
                task,
                Arc::clone(&self.packages),
                self.capacity,
            ));
            self.core.attach(Arc::clone(&executor));
            executor.initialize()?;
            executor.start().await?;
        }

        info!(executor = %self.name(), tasks = self.core.children().len(), "Study executor started");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.core.ensure(ExecutorState::Paused)?;
        self.core.propagate(FanOut::Pause, self.core.children()).await;
        self.core.transition(ExecutorState::Paused)
    }

    async fn resume(&self) -> Result<()> {
        self.core.ensure(ExecutorState::Resumed)?;
        self.core.propagate(FanOut::Resume, self.core.children()).await;
        self.core.transition(ExecutorState::Resumed)
    }

    async fn stop(&self) -> Result<()> {
        if !self.core.stop().await? {
            return Ok(());
        }
        if let Some(manager) = self.data_manager() {
            if let Err(e) = manager.close().await {
                warn!(executor = %self.name(), error = %e, "Failed to close data manager");
            }
        }
        info!(executor = %self.name(), "Study executor stopped");
        Ok(())
    }
}
