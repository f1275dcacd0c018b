//! Study deployment controller.
//!
//! The controller owns the executor tree of one deployment, composes its raw
//! data stream with the privacy, data format and custom transforms, feeds the
//! result to the deployment's data manager, and throttles sampling according
//! to battery readings (power-awareness).

mod config;
mod pipeline;
mod state;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::SensingContext;
use crate::data_manager::{self, Attachment, DataManager};
use crate::domain::{BATTERY_TYPE, BatteryDatum, DataPoint, Measure, StudyDeployment};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorState, StudyExecutor};
use crate::platform::DeviceInfo;
use crate::probe::Probe;
use crate::sampling::{PowerAwarenessState, SamplingSchema};
use crate::transform::{DatumTransformer, TransformerSchema, identity};

pub use config::ControllerConfig;
pub use state::StudyDeploymentControllerState;

use pipeline::{DataPipeline, Worker, spawn_counter};

/// Runs one study deployment on this device.
///
/// Lifecycle calls are expected from a single control task; concurrent
/// `pause`/`resume` calls are not supported.
pub struct StudyDeploymentController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    context: SensingContext,
    config: ControllerConfig,
    deployment: Arc<RwLock<StudyDeployment>>,
    executor: StudyExecutor,
    sampling_schema: SamplingSchema,
    transformer: DatumTransformer,
    data_manager: Option<Arc<dyn DataManager>>,

    state: Mutex<StudyDeploymentControllerState>,
    state_tx: broadcast::Sender<StudyDeploymentControllerState>,
    data_tx: broadcast::Sender<DataPoint>,
    sampling_size: Arc<AtomicU64>,
    power_state: Mutex<PowerAwarenessState>,
    device_info: Mutex<Option<DeviceInfo>>,

    attachment: Mutex<Option<Attachment>>,
    pipeline: Mutex<Option<Worker>>,
    counter: Mutex<Option<Worker>>,
    power: Mutex<Option<Worker>>,
    battery_probe: Mutex<Option<Arc<dyn Probe>>>,
}

/// Builder for [`StudyDeploymentController`].
pub struct StudyDeploymentControllerBuilder {
    deployment: StudyDeployment,
    context: Option<SensingContext>,
    config: ControllerConfig,
    sampling_schema: Option<SamplingSchema>,
    transformer: Option<DatumTransformer>,
}

impl StudyDeploymentControllerBuilder {
    pub fn context(mut self, context: SensingContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sampling schema applied at initialize, instead of the configured
    /// preset.
    pub fn sampling_schema(mut self, schema: SamplingSchema) -> Self {
        self.sampling_schema = Some(schema);
        self
    }

    /// Custom transform, the last stage of the data pipeline.
    pub fn transformer(mut self, transformer: DatumTransformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn build(self) -> Result<StudyDeploymentController> {
        self.deployment.validate()?;

        let context = self.context.unwrap_or_default();
        let capacity = self.config.channel_capacity.max(1);
        let sampling_schema = self
            .sampling_schema
            .unwrap_or_else(|| context.packages.preset(self.config.sampling_schema));

        let deployment = Arc::new(RwLock::new(self.deployment));
        let executor = StudyExecutor::new(
            Arc::clone(&deployment),
            Arc::clone(&context.packages),
            Arc::clone(&context.data_managers),
            capacity,
        );
        // Looked up once; a missing manager is reported by the executor.
        let data_manager = executor.data_manager();

        let (state_tx, _) = broadcast::channel(16);
        let (data_tx, _) = broadcast::channel(capacity);

        let controller = StudyDeploymentController {
            inner: Arc::new(ControllerInner {
                context,
                config: self.config,
                deployment,
                executor,
                sampling_schema,
                transformer: self.transformer.unwrap_or_else(identity),
                data_manager,
                state: Mutex::new(StudyDeploymentControllerState::Unknown),
                state_tx,
                data_tx,
                sampling_size: Arc::new(AtomicU64::new(0)),
                power_state: Mutex::new(PowerAwarenessState::default()),
                device_info: Mutex::new(None),
                attachment: Mutex::new(None),
                pipeline: Mutex::new(None),
                counter: Mutex::new(None),
                power: Mutex::new(None),
                battery_probe: Mutex::new(None),
            }),
        };
        controller
            .inner
            .set_state(StudyDeploymentControllerState::Created)?;
        Ok(controller)
    }
}

impl StudyDeploymentController {
    pub fn builder(deployment: StudyDeployment) -> StudyDeploymentControllerBuilder {
        StudyDeploymentControllerBuilder {
            deployment,
            context: None,
            config: ControllerConfig::default(),
            sampling_schema: None,
            transformer: None,
        }
    }

    /// Controller with the default configuration.
    pub fn new(deployment: StudyDeployment, context: SensingContext) -> Result<Self> {
        Self::builder(deployment).context(context).build()
    }

    pub fn state(&self) -> StudyDeploymentControllerState {
        *self.inner.state.lock()
    }

    /// Subscribe to controller state changes.
    pub fn state_events(&self) -> broadcast::Receiver<StudyDeploymentControllerState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to the transformed data stream.
    ///
    /// Every subscriber sees the same transformed items; the transforms run
    /// once per item whatever the number of subscribers.
    pub fn data(&self) -> broadcast::Receiver<DataPoint> {
        self.inner.data_tx.subscribe()
    }

    /// Number of data points observed on the transformed stream.
    pub fn sampling_size(&self) -> u64 {
        self.inner.sampling_size.load(Ordering::Relaxed)
    }

    pub fn power_awareness_state(&self) -> PowerAwarenessState {
        *self.inner.power_state.lock()
    }

    /// Override the power-awareness state without adapting the deployment.
    pub fn set_power_awareness_state(&self, state: PowerAwarenessState) {
        *self.inner.power_state.lock() = state;
    }

    /// Feed a battery reading to the power-awareness machine.
    ///
    /// Returns the new state when the reading caused a transition.
    pub async fn handle_battery_reading(
        &self,
        reading: BatteryDatum,
    ) -> Option<PowerAwarenessState> {
        self.inner.handle_battery_reading(reading).await
    }

    /// Device identity, available after initialize.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.inner.device_info.lock().clone()
    }

    /// Snapshot of the deployment, including sampling adaptations.
    pub fn deployment(&self) -> StudyDeployment {
        self.inner.deployment.read().clone()
    }

    pub fn executor(&self) -> &StudyExecutor {
        &self.inner.executor
    }

    pub fn data_manager(&self) -> Option<Arc<dyn DataManager>> {
        self.inner.data_manager.clone()
    }

    /// Prepare the deployment for sensing.
    ///
    /// Requires the controller to be `Created` and the executor tree not yet
    /// initialized.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        self.state()
            .transition_to(StudyDeploymentControllerState::Initialized)?;
        if inner.executor.state() != ExecutorState::Created {
            return Err(Error::precondition(format!(
                "study executor must be {} to initialize, found {}",
                ExecutorState::Created,
                inner.executor.state()
            )));
        }

        let device_resolver = Arc::clone(&inner.context.device_info);
        device_resolver.init().await?;
        let device = device_resolver.device_info().await?;
        info!(platform = %device.platform, device_id = %device.device_id, "Device info resolved");
        *inner.device_info.lock() = Some(device);

        inner.resolve_user_id();
        inner.request_permissions().await;

        {
            let mut deployment = inner.deployment.write();
            inner.sampling_schema.adapt(&mut deployment, true);
            // Second pass settles the markers left by the first.
            inner.sampling_schema.adapt(&mut deployment, true);
        }

        inner.start_pipeline();
        inner.attach_data_manager().await;
        inner.executor.initialize()?;

        if inner.config.power_aware {
            self.enable_power_awareness().await;
        }
        *inner.counter.lock() = Some(spawn_counter(
            inner.data_tx.subscribe(),
            Arc::clone(&inner.sampling_size),
        ));

        inner.set_state(StudyDeploymentControllerState::Initialized)
    }

    /// Start sensing, or resume after a pause.
    pub async fn resume(&self) -> Result<()> {
        let state = self.state();
        state.transition_to(StudyDeploymentControllerState::Resumed)?;

        if state == StudyDeploymentControllerState::Initialized {
            self.inner.executor.start().await?;
        } else {
            self.inner.executor.resume().await?;
            self.inner.attach_data_manager().await;
        }
        self.inner.set_state(StudyDeploymentControllerState::Resumed)
    }

    /// Pause sensing and close the data manager.
    pub async fn pause(&self) -> Result<()> {
        self.state()
            .transition_to(StudyDeploymentControllerState::Paused)?;

        self.inner.executor.pause().await?;
        self.inner.close_data_manager().await;
        self.inner.set_state(StudyDeploymentControllerState::Paused)
    }

    /// Stop sensing for good. Stopping twice is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let state = self.state();
        if state == StudyDeploymentControllerState::Stopped {
            debug!("Controller already stopped");
            return Ok(());
        }
        state.transition_to(StudyDeploymentControllerState::Stopped)?;

        self.inner.disable_power_awareness().await;
        self.inner.close_data_manager().await;
        // An initialized but never started tree has nothing to stop.
        if self.inner.executor.state().is_live() {
            self.inner.executor.stop().await?;
        }

        let pipeline = self.inner.pipeline.lock().take();
        if let Some(worker) = pipeline {
            worker.shutdown().await;
        }
        let counter = self.inner.counter.lock().take();
        if let Some(worker) = counter {
            worker.shutdown().await;
        }

        info!(sampling_size = self.sampling_size(), "Study deployment stopped");
        self.inner.set_state(StudyDeploymentControllerState::Stopped)
    }

    /// Start the private battery probe feeding the power-awareness machine.
    async fn enable_power_awareness(&self) {
        let inner = &self.inner;
        let measure = Measure::new(BATTERY_TYPE);
        let Some(probe) = inner.context.packages.create(&measure) else {
            warn!("No battery probe available, power-awareness follows explicit readings only");
            return;
        };

        let mut readings = probe.events();
        if let Err(e) = probe.initialize(measure).await {
            warn!(error = %e, "Failed to initialize battery probe");
            return;
        }

        let weak = Arc::downgrade(inner);
        let worker = Worker::spawn(move |token| async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    item = readings.recv() => match item {
                        Ok(point) => {
                            let Some(reading) = BatteryDatum::from_datum(&point.body) else {
                                continue;
                            };
                            let Some(inner) = weak.upgrade() else { break };
                            inner.handle_battery_reading(reading).await;
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });
        *inner.power.lock() = Some(worker);

        if let Err(e) = probe.start().await {
            warn!(error = %e, "Failed to start battery probe");
        }
        *inner.battery_probe.lock() = Some(probe);
        debug!("Power-awareness enabled");
    }
}

impl ControllerInner {
    fn set_state(&self, target: StudyDeploymentControllerState) -> Result<()> {
        {
            let mut state = self.state.lock();
            *state = state.transition_to(target)?;
        }
        info!(
            study_deployment_id = %self.executor.name(),
            state = %target,
            "Controller state changed"
        );
        let _ = self.state_tx.send(target);
        Ok(())
    }

    fn resolve_user_id(&self) {
        let mut deployment = self.deployment.write();
        if deployment.user_id.is_none() {
            let user_id = self
                .config
                .user_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            debug!(user_id = %user_id, "Assigned user id to deployment");
            deployment.user_id = Some(user_id);
        }
    }

    async fn request_permissions(&self) {
        let required = self.context.packages.permissions();
        if required.is_empty() {
            return;
        }
        let statuses = self
            .context
            .permissions
            .request_permissions(&required)
            .await;
        for permission in &required {
            match statuses.get(permission) {
                Some(status) if status.is_granted() => {}
                status => warn!(
                    permission = %permission,
                    status = ?status,
                    "Permission not granted, dependent probes may fail"
                ),
            }
        }
    }

    fn lookup_schema(&self, name: &str, stage: &str) -> Option<Arc<TransformerSchema>> {
        let schema = self.context.transformers.lookup(name);
        if schema.is_none() {
            warn!(schema = %name, stage, "Transformer schema not found, stage passes data unchanged");
        }
        schema
    }

    /// Subscribe the transform pipeline to the executor stream.
    fn start_pipeline(&self) {
        let data_format = self.deployment.read().data_format().to_string();
        let pipeline = DataPipeline::new(
            self.lookup_schema(&self.config.privacy_schema, "privacy"),
            self.lookup_schema(&data_format, "data format"),
            Arc::clone(&self.transformer),
        );
        let worker = pipeline.spawn(self.executor.events(), self.data_tx.clone());
        *self.pipeline.lock() = Some(worker);
    }

    async fn attach_data_manager(&self) {
        let Some(manager) = self.data_manager.clone() else {
            return;
        };
        let deployment = self.deployment.read().clone();
        match data_manager::attach(manager, &deployment, self.data_tx.subscribe()).await {
            Ok(attachment) => {
                let previous = self.attachment.lock().replace(attachment);
                if let Some(previous) = previous {
                    previous.detach();
                }
            }
            Err(e) => warn!(error = %e, "Failed to initialize data manager"),
        }
    }

    async fn close_data_manager(&self) {
        let attachment = self.attachment.lock().take();
        if let Some(attachment) = attachment {
            attachment.finish().await;
        }
        if let Some(manager) = &self.data_manager {
            if let Err(e) = manager.close().await {
                warn!(error = %e, "Failed to close data manager");
            }
        }
    }

    async fn disable_power_awareness(&self) {
        let worker = self.power.lock().take();
        if let Some(worker) = worker {
            worker.shutdown().await;
        }
        let probe = self.battery_probe.lock().take();
        if let Some(probe) = probe {
            if let Err(e) = probe.stop().await {
                warn!(error = %e, "Failed to stop battery probe");
            }
        }
    }

    async fn handle_battery_reading(&self, reading: BatteryDatum) -> Option<PowerAwarenessState> {
        if !reading.is_discharging() {
            return None;
        }

        let (from, to) = {
            let mut state = self.power_state.lock();
            let from = *state;
            let to = from.adapt(reading.battery_level);
            if to == from {
                return None;
            }
            *state = to;
            (from, to)
        };
        info!(
            from = %from,
            to = %to,
            battery_level = reading.battery_level,
            "Power-awareness state changed"
        );

        let schema = to.schema(&self.context.packages);
        schema.adapt(&mut self.deployment.write(), true);
        self.executor.reconfigure().await;
        Some(to)
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.get_mut().take() {
            attachment.detach();
        }
    }
}
