//! Shared test fixtures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::data_manager::DataManager;
use crate::domain::{DataPoint, Datum, Measure, StudyDeployment};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorState};
use crate::platform::Permission;
use crate::probe::{Probe, StreamProbe};
use crate::sampling::SamplingPackage;

/// Poll `condition` until it holds or a second has passed.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Ordered record of `"<probe>:<call>"` entries shared by recording probes.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().iter().any(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn count_suffix(&self, suffix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.ends_with(suffix)).count()
    }
}

/// A broadcast-fed probe recording every lifecycle call.
pub struct RecordingProbe {
    inner: StreamProbe,
    log: CallLog,
    fail_resume: bool,
}

impl RecordingProbe {
    fn record(&self, call: &str) {
        self.log.record(format!("{}:{}", self.inner.name(), call));
    }
}

#[async_trait]
impl Executor for RecordingProbe {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state(&self) -> ExecutorState {
        self.inner.state()
    }

    fn events(&self) -> broadcast::Receiver<DataPoint> {
        self.inner.events()
    }

    async fn start(&self) -> Result<()> {
        self.record("start");
        self.inner.start().await
    }

    async fn pause(&self) -> Result<()> {
        self.record("pause");
        self.inner.pause().await
    }

    async fn resume(&self) -> Result<()> {
        self.record("resume");
        if self.fail_resume {
            return Err(Error::probe(self.name(), "resume failed"));
        }
        self.inner.resume().await
    }

    async fn stop(&self) -> Result<()> {
        if self.inner.state() != ExecutorState::Stopped {
            self.record("stop");
        }
        self.inner.stop().await
    }
}

#[async_trait]
impl Probe for RecordingProbe {
    fn measure(&self) -> Option<Measure> {
        self.inner.measure()
    }

    async fn initialize(&self, measure: Measure) -> Result<()> {
        self.record("initialize");
        self.inner.initialize(measure).await
    }

    async fn update(&self, measure: Measure) -> Result<()> {
        self.record("update");
        self.inner.update(measure).await
    }
}

/// Sampling package creating [`RecordingProbe`]s fed from per-type
/// broadcast sources.
pub struct RecordingPackage {
    name: String,
    types: Vec<String>,
    permissions: Vec<Permission>,
    sources: HashMap<String, broadcast::Sender<Datum>>,
    failing: HashSet<String>,
    log: CallLog,
}

impl RecordingPackage {
    pub fn new(name: &str, types: &[&str]) -> Self {
        let sources = types
            .iter()
            .map(|t| (t.to_string(), broadcast::channel(64).0))
            .collect();
        Self {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            permissions: Vec::new(),
            sources,
            failing: HashSet::new(),
            log: CallLog::default(),
        }
    }

    pub fn with_permissions(mut self, permissions: &[Permission]) -> Self {
        self.permissions = permissions.to_vec();
        self
    }

    /// Probes of this type fail to resume.
    pub fn with_failing(mut self, measure_type: &str) -> Self {
        self.failing.insert(measure_type.to_string());
        self
    }

    /// Source feeding every probe of the given type.
    pub fn source(&self, measure_type: &str) -> broadcast::Sender<Datum> {
        self.sources[measure_type].clone()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl SamplingPackage for RecordingPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn permissions(&self) -> Vec<Permission> {
        self.permissions.clone()
    }

    fn create(&self, measure_type: &str) -> Option<Arc<dyn Probe>> {
        let source = self.sources.get(measure_type)?.clone();
        Some(Arc::new(RecordingProbe {
            inner: StreamProbe::from_broadcast(measure_type, source),
            log: self.log.clone(),
            fail_resume: self.failing.contains(measure_type),
        }))
    }
}

/// Data manager keeping everything it receives.
pub struct RecordingDataManager {
    endpoint_type: String,
    initialized: AtomicUsize,
    closed: AtomicUsize,
    done: AtomicBool,
    received: Mutex<Vec<DataPoint>>,
}

impl RecordingDataManager {
    pub fn new(endpoint_type: &str) -> Self {
        Self {
            endpoint_type: endpoint_type.to_string(),
            initialized: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            done: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<DataPoint> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl DataManager for RecordingDataManager {
    fn endpoint_type(&self) -> &str {
        &self.endpoint_type
    }

    async fn initialize(&self, _deployment: &StudyDeployment) -> Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_data(&self, data_point: DataPoint) -> Result<()> {
        self.received.lock().push(data_point);
        Ok(())
    }

    async fn on_error(&self, _error: &Error) {}

    async fn on_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
