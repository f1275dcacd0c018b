//! On-device sensing runtime.
//!
//! A [`StudyDeploymentController`] runs a [`StudyDeployment`] through an
//! executor tree (study → tasks → probes), transforms the collected data and
//! hands it to a [`DataManager`]. Battery readings throttle sampling through
//! the [`PowerAwarenessState`] machine.

pub mod context;
pub mod controller;
pub mod data_manager;
pub mod domain;
pub mod error;
pub mod executor;
pub mod platform;
pub mod probe;
pub mod sampling;
pub mod transform;

#[cfg(test)]
pub(crate) mod test_utils;

pub use context::SensingContext;
pub use controller::{ControllerConfig, StudyDeploymentController, StudyDeploymentControllerState};
pub use data_manager::{DataManager, DataManagerRegistry};
pub use domain::{DataPoint, Datum, Measure, StudyDeployment, Task};
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorState, StudyExecutor, TaskExecutor};
pub use probe::{Probe, StreamProbe};
pub use sampling::{PowerAwarenessState, SamplingPackage, SamplingPackageRegistry, SamplingSchema};
