//! End-to-end tests for the sensing runtime.
//!
//! Probes are fed from in-memory broadcast sources so every test controls
//! exactly which data enters the executor tree.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use sensing_runtime::data_manager::DataManagerRegistry;
use sensing_runtime::domain::{DataFormat, DataPoint, Datum, Measure, StudyDeployment, Task};
use sensing_runtime::error::{Error, Result};
use sensing_runtime::executor::{Executor, ExecutorState, StudyExecutor};
use sensing_runtime::probe::{Probe, StreamProbe};
use sensing_runtime::sampling::{PowerAwarenessState, SamplingPackage, SamplingPackageRegistry};
use sensing_runtime::transform::{DatumTransformer, TransformerSchema};
use sensing_runtime::{
    ControllerConfig, SensingContext, StudyDeploymentController, StudyDeploymentControllerState,
};

/// Package creating broadcast-fed probes for a fixed set of measure types.
struct SourcePackage {
    sources: HashMap<String, broadcast::Sender<Datum>>,
    created: Arc<Mutex<Vec<String>>>,
}

impl SourcePackage {
    fn new(types: &[&str]) -> Self {
        Self {
            sources: types
                .iter()
                .map(|t| (t.to_string(), broadcast::channel(64).0))
                .collect(),
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn source(&self, measure_type: &str) -> broadcast::Sender<Datum> {
        self.sources[measure_type].clone()
    }
}

impl SamplingPackage for SourcePackage {
    fn name(&self) -> &str {
        "sources"
    }

    fn data_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.sources.keys().cloned().collect();
        types.sort();
        types
    }

    fn create(&self, measure_type: &str) -> Option<Arc<dyn Probe>> {
        let source = self.sources.get(measure_type)?.clone();
        self.created.lock().push(measure_type.to_string());
        Some(Arc::new(StreamProbe::from_broadcast(measure_type, source)))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sensing_runtime=debug")
        .with_test_writer()
        .try_init();
}

fn light(lux: i64) -> Datum {
    Datum::new(DataFormat::carp("light")).with_field("lux", json!(lux))
}

async fn recv(rx: &mut broadcast::Receiver<DataPoint>) -> DataPoint {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for data")
        .expect("data stream closed")
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Task A: one enabled measure with a factory and one disabled measure.
/// Task B: one enabled measure without a factory.
fn two_task_deployment() -> StudyDeployment {
    StudyDeployment::new("two-tasks")
        .with_task(
            Task::new("A")
                .with_measure(Measure::new("light"))
                .with_measure(Measure::new("memory").with_enabled(false)),
        )
        .with_task(Task::new("B").with_measure(Measure::new("gps")))
}

fn study_executor(deployment: StudyDeployment, package: SourcePackage) -> StudyExecutor {
    let mut packages = SamplingPackageRegistry::new();
    packages.register(Arc::new(package));
    StudyExecutor::new(
        Arc::new(parking_lot::RwLock::new(deployment)),
        Arc::new(packages),
        Arc::new(DataManagerRegistry::with_defaults()),
        256,
    )
}

fn controller(
    deployment: StudyDeployment,
    package: SourcePackage,
    transformer: Option<DatumTransformer>,
) -> StudyDeploymentController {
    let context = SensingContext::builder()
        .package(Arc::new(package))
        .data_managers(DataManagerRegistry::new())
        .build();
    let config = ControllerConfig {
        power_aware: false,
        ..Default::default()
    };
    let mut builder = StudyDeploymentController::builder(deployment)
        .context(context)
        .config(config);
    if let Some(transformer) = transformer {
        builder = builder.transformer(transformer);
    }
    builder.build().expect("valid deployment")
}

mod executor_tree {
    use super::*;

    #[tokio::test]
    async fn test_two_task_scenario_yields_one_live_probe() {
        init_tracing();
        let package = SourcePackage::new(&["light", "memory"]);
        let created = Arc::clone(&package.created);
        let executor = study_executor(two_task_deployment(), package);

        executor.initialize().unwrap();
        executor.start().await.unwrap();

        let tasks = executor.executors();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name(), "A");
        assert_eq!(tasks[1].name(), "B");

        let live: Vec<_> = tasks.iter().flat_map(|t| t.probes()).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].name(), "light");
        assert_eq!(live[0].state(), ExecutorState::Resumed);
        assert_eq!(*created.lock(), vec!["light"]);
    }

    #[tokio::test]
    async fn test_probe_per_enabled_registered_measure_in_order() {
        let package = SourcePackage::new(&["a", "b", "c"]);
        let deployment = StudyDeployment::new("ordered").with_task(
            Task::new("t")
                .with_measure(Measure::new("c"))
                .with_measure(Measure::new("x"))
                .with_measure(Measure::new("a"))
                .with_measure(Measure::new("b").with_enabled(false))
                .with_measure(Measure::new("b")),
        );
        let executor = study_executor(deployment, package);
        executor.initialize().unwrap();
        executor.start().await.unwrap();

        let names: Vec<String> = executor.executors()[0]
            .probes()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_stop_before_start_fails_and_double_stop_is_noop() {
        let executor = study_executor(two_task_deployment(), SourcePackage::new(&["light"]));
        let error = executor.stop().await.unwrap_err();
        assert!(error.is_precondition());
        assert!(matches!(error, Error::InvalidStateTransition { .. }));

        executor.initialize().unwrap();
        executor.start().await.unwrap();
        executor.stop().await.unwrap();
        executor.stop().await.unwrap();
        assert_eq!(executor.state(), ExecutorState::Stopped);
        assert!(executor
            .executors()
            .iter()
            .flat_map(|t| t.probes())
            .all(|p| p.state() == ExecutorState::Stopped));
    }

    #[tokio::test]
    async fn test_stop_after_initialize_before_start_fails() {
        let executor = study_executor(two_task_deployment(), SourcePackage::new(&["light"]));
        executor.initialize().unwrap();

        let error = executor.stop().await.unwrap_err();
        assert!(error.is_precondition());
        assert_eq!(executor.state(), ExecutorState::Initialized);

        executor.start().await.unwrap();
        executor.stop().await.unwrap();
        assert_eq!(executor.state(), ExecutorState::Stopped);
    }

    #[tokio::test]
    async fn test_late_subscriber_only_misses_earlier_items() {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let executor = study_executor(two_task_deployment(), package);
        let mut early = executor.events();
        executor.initialize().unwrap();
        executor.start().await.unwrap();

        source.send(light(1)).unwrap();
        assert_eq!(recv(&mut early).await.body.field("lux"), Some(&json!(1)));

        let mut late = executor.events();
        source.send(light(2)).unwrap();
        assert_eq!(recv(&mut early).await.body.field("lux"), Some(&json!(2)));
        assert_eq!(recv(&mut late).await.body.field("lux"), Some(&json!(2)));
        assert!(late.try_recv().is_err());
    }
}

mod controller_tests {
    use super::*;
    use StudyDeploymentControllerState as S;

    #[tokio::test]
    async fn test_identity_pipeline_emits_points_unchanged() {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let controller = controller(two_task_deployment(), package, None);
        let mut raw = controller.executor().events();
        let mut data = controller.data();

        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();
        source.send(light(42)).unwrap();

        let before = recv(&mut raw).await;
        let after = recv(&mut data).await;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_custom_stage_changes_payload_only() -> Result<()> {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let double: DatumTransformer = Arc::new(|datum: Datum| {
            let lux = datum.field("lux").and_then(|v| v.as_i64()).unwrap_or(0);
            datum.with_field("lux", json!(lux * 2))
        });
        let controller = controller(two_task_deployment(), package, Some(double));
        let mut raw = controller.executor().events();
        let mut data = controller.data();

        controller.initialize().await?;
        controller.resume().await?;
        source.send(light(21)).unwrap();

        let before = recv(&mut raw).await;
        let after = recv(&mut data).await;
        assert_eq!(after.id, before.id);
        assert_eq!(after.timestamp(), before.timestamp());
        assert_eq!(after.body.field("lux"), Some(&json!(42)));
        Ok(())
    }

    #[tokio::test]
    async fn test_format_stage_uses_deployment_data_format() {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let mut deployment = two_task_deployment();
        deployment.data_endpoint.data_format = "tagged".to_string();

        let tag: DatumTransformer =
            Arc::new(|datum: Datum| datum.with_field("format", json!("tagged")));
        let context = SensingContext::builder()
            .package(Arc::new(package))
            .transformer_schema(TransformerSchema::new("tagged").with("light", tag))
            .build();
        let controller = StudyDeploymentController::builder(deployment)
            .context(context)
            .config(ControllerConfig {
                power_aware: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        let mut data = controller.data();

        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();
        source.send(light(1)).unwrap();

        assert_eq!(recv(&mut data).await.body.field("format"), Some(&json!("tagged")));
        controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_sampling_size_counts_each_item_once() {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let controller = controller(two_task_deployment(), package, None);
        let mut subscribers: Vec<_> = (0..3).map(|_| controller.data()).collect();

        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();
        for lux in 0..10 {
            source.send(light(lux)).unwrap();
        }

        for rx in subscribers.iter_mut() {
            for _ in 0..10 {
                recv(rx).await;
            }
        }
        assert!(eventually(|| controller.sampling_size() == 10).await);
        controller.stop().await.unwrap();
        assert_eq!(controller.sampling_size(), 10);
    }

    #[tokio::test]
    async fn test_controller_state_transitions() {
        let controller = controller(two_task_deployment(), SourcePackage::new(&["light"]), None);
        let mut events = controller.state_events();
        assert_eq!(controller.state(), S::Created);

        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();
        controller.pause().await.unwrap();
        controller.resume().await.unwrap();
        controller.stop().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(state) = events.try_recv() {
            seen.push(state);
        }
        assert_eq!(seen, vec![S::Initialized, S::Resumed, S::Paused, S::Resumed, S::Stopped]);

        assert!(controller.resume().await.is_err());
        assert!(controller.pause().await.is_err());
        assert!(controller.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_pause_stops_data_and_resume_restores_it() {
        let package = SourcePackage::new(&["light"]);
        let source = package.source("light");
        let controller = controller(two_task_deployment(), package, None);
        let mut data = controller.data();

        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();
        controller.pause().await.unwrap();
        assert!(eventually(|| source.receiver_count() == 0).await);

        controller.resume().await.unwrap();
        source.send(light(5)).unwrap();
        assert_eq!(recv(&mut data).await.body.field("lux"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_power_override_and_discharging_readings() {
        use sensing_runtime::domain::{BatteryDatum, BatteryStatus};

        let controller = controller(two_task_deployment(), SourcePackage::new(&["light"]), None);
        controller.initialize().await.unwrap();
        controller.resume().await.unwrap();

        controller.set_power_awareness_state(PowerAwarenessState::Light);
        let reading = BatteryDatum::new(80, BatteryStatus::Discharging);
        assert_eq!(
            controller.handle_battery_reading(reading).await,
            Some(PowerAwarenessState::Normal)
        );
        assert_eq!(controller.handle_battery_reading(reading).await, None);

        let charging = BatteryDatum::new(1, BatteryStatus::Charging);
        assert_eq!(controller.handle_battery_reading(charging).await, None);
        assert_eq!(controller.power_awareness_state(), PowerAwarenessState::Normal);
    }
}
