//! Domain model of a sensing study deployment.

pub mod data;
pub mod deployment;

pub use data::{
    BATTERY_TYPE, BatteryDatum, BatteryStatus, CARP_NAMESPACE, DataFormat, DataPoint,
    DataPointHeader, Datum,
};
pub use deployment::{DataEndpoint, Measure, StudyDeployment, Task, Trigger};
