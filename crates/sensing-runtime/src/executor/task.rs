//! Task executor: runs one probe per enabled measure of a task.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Executor, ExecutorCore, ExecutorState, FanOut};
use crate::domain::{DataPoint, Measure, Task};
use crate::error::Result;
use crate::probe::Probe;
use crate::sampling::SamplingPackageRegistry;

/// Executes a [`Task`]: one probe per enabled measure whose type has a
/// registered factory.
pub struct TaskExecutor {
    core: ExecutorCore<dyn Probe>,
    task: RwLock<Task>,
    packages: Arc<SamplingPackageRegistry>,
    /// Index into `task.measures` of each probe, parallel to the children.
    bindings: Mutex<Vec<usize>>,
}

impl TaskExecutor {
    pub fn new(task: Task, packages: Arc<SamplingPackageRegistry>, capacity: usize) -> Self {
        Self {
            core: ExecutorCore::new(task.name.clone(), capacity),
            task: RwLock::new(task),
            packages,
            bindings: Mutex::new(Vec::new()),
        }
    }

    /// Move from `Created` to `Initialized`.
    pub fn initialize(&self) -> Result<()> {
        self.core.transition(ExecutorState::Initialized)
    }

    /// Snapshot of the task this executor runs.
    pub fn task(&self) -> Task {
        self.task.read().clone()
    }

    /// The probes created so far, in measure declaration order.
    pub fn probes(&self) -> Vec<Arc<dyn Probe>> {
        self.core.children()
    }

    /// Probes paired with the measure currently configuring them.
    fn bound_probes(&self) -> Vec<(Measure, Arc<dyn Probe>)> {
        let task = self.task.read();
        let bindings = self.bindings.lock().clone();
        bindings
            .into_iter()
            .zip(self.core.children())
            .filter_map(|(index, probe)| task.measures.get(index).map(|m| (m.clone(), probe)))
            .collect()
    }

    /// Push an updated version of the task's measures to the live probes.
    ///
    /// Each probe receives its updated measure. A probe whose measure became
    /// disabled is paused. A paused probe whose measure became enabled is
    /// resumed, but only while this executor is resumed. Measures that had
    /// no probe at start do not get one here.
    pub async fn reconfigure(&self, task: &Task) {
        if self.state() == ExecutorState::Stopped {
            debug!(executor = %self.name(), "Ignoring reconfigure of stopped task executor");
            return;
        }
        *self.task.write() = task.clone();

        let running = self.state() == ExecutorState::Resumed;
        for (measure, probe) in self.bound_probes() {
            let enabled = measure.enabled;
            if let Err(e) = probe.update(measure).await {
                warn!(executor = %self.name(), probe = %probe.name(), error = %e, "Failed to update probe");
                continue;
            }

            let result = match probe.state() {
                ExecutorState::Resumed if !enabled => probe.pause().await,
                ExecutorState::Paused if enabled && running => probe.resume().await,
                _ => Ok(()),
            };
            if let Err(e) = result {
                warn!(executor = %self.name(), probe = %probe.name(), error = %e, "Failed to apply probe reconfiguration");
            }
        }
    }
}

#[async_trait]
impl Executor for TaskExecutor {
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

        let measures = self.task.read().measures.clone();
        for (index, measure) in measures.into_iter().enumerate() {
            if !measure.enabled {
                debug!(executor = %self.name(), measure_type = %measure.measure_type, "Skipping disabled measure");
                continue;
            }
            let Some(probe) = self.packages.create(&measure) else {
                warn!(
                    executor = %self.name(),
                    measure_type = %measure.measure_type,
                    "No probe factory registered for measure type, skipping"
                );
                continue;
            };

            self.core.attach(Arc::clone(&probe));
            self.bindings.lock().push(index);

            let measure_name = measure.display_name().to_string();
            if let Err(e) = probe.initialize(measure).await {
                warn!(executor = %self.name(), measure = %measure_name, error = %e, "Failed to initialize probe");
                continue;
            }
            if let Err(e) = probe.start().await {
                warn!(executor = %self.name(), measure = %measure_name, error = %e, "Failed to start probe");
            }
        }

        info!(executor = %self.name(), probes = self.core.children().len(), "Task executor started");
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.core.ensure(ExecutorState::Paused)?;
        self.core.propagate(FanOut::Pause, self.core.children()).await;
        self.core.transition(ExecutorState::Paused)
    }

    async fn resume(&self) -> Result<()> {
        self.core.ensure(ExecutorState::Resumed)?;
        let targets = self
            .bound_probes()
            .into_iter()
            .filter(|(measure, _)| measure.enabled)
            .map(|(_, probe)| probe)
            .collect();
        self.core.propagate(FanOut::Resume, targets).await;
        self.core.transition(ExecutorState::Resumed)
    }

    async fn stop(&self) -> Result<()> {
        if self.core.stop().await? {
            info!(executor = %self.name(), "Task executor stopped");
        }
        Ok(())
    }
}
