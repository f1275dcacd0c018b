//! Simulated device sampling package: a draining battery and the host's
//! memory usage.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sysinfo::System;

use sensing_runtime::domain::{
    BATTERY_TYPE, BatteryDatum, BatteryStatus, DataFormat, Datum, Measure,
};
use sensing_runtime::probe::{INTERVAL_KEY, Probe, StreamProbe};
use sensing_runtime::sampling::{SamplingPackage, SamplingSchema, SamplingSchemaType};

pub const MEMORY_TYPE: &str = "memory";

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Battery level at start, in percent.
    pub battery_start: i32,
    /// Percent drained per battery reading.
    pub battery_drain: i32,
    pub battery_interval_ms: u64,
    pub memory_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            battery_start: 100,
            battery_drain: 1,
            battery_interval_ms: 1000,
            memory_interval_ms: 5000,
        }
    }
}

/// Sampling package for the simulated device.
pub struct DevicePackage {
    config: SimulationConfig,
    battery_level: Arc<AtomicI32>,
}

impl DevicePackage {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            battery_level: Arc::new(AtomicI32::new(config.battery_start.clamp(0, 100))),
            config,
        }
    }

    fn battery_probe(&self) -> StreamProbe {
        let level = Arc::clone(&self.battery_level);
        let drain = self.config.battery_drain.max(0);
        StreamProbe::periodic(
            BATTERY_TYPE,
            Duration::from_millis(self.config.battery_interval_ms),
            move |_measure: &Measure| {
                let current = level
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |l| Some((l - drain).max(0)))
                    .unwrap_or(0);
                let current = (current - drain).max(0);
                let status = if current > 0 {
                    BatteryStatus::Discharging
                } else {
                    BatteryStatus::Unknown
                };
                Some(BatteryDatum::new(current, status).to_datum())
            },
        )
    }

    fn memory_probe(&self) -> StreamProbe {
        StreamProbe::periodic(
            MEMORY_TYPE,
            Duration::from_millis(self.config.memory_interval_ms),
            |_measure: &Measure| {
                let mut system = System::new();
                system.refresh_memory();
                Some(
                    Datum::new(DataFormat::carp(MEMORY_TYPE))
                        .with_field("free_physical_memory", json!(system.available_memory()))
                        .with_field("free_virtual_memory", json!(system.free_swap()))
                        .with_field("total_physical_memory", json!(system.total_memory())),
                )
            },
        )
    }

    /// Memory sampling stretched by `factor`.
    fn memory_schema(&self, schema_type: SamplingSchemaType, factor: u64) -> SamplingSchema {
        SamplingSchema::empty(schema_type).with_measure(
            Measure::new(MEMORY_TYPE)
                .with_config(INTERVAL_KEY, json!(self.config.memory_interval_ms * factor)),
        )
    }
}

impl SamplingPackage for DevicePackage {
    fn name(&self) -> &str {
        "device"
    }

    fn data_types(&self) -> Vec<String> {
        vec![BATTERY_TYPE.to_string(), MEMORY_TYPE.to_string()]
    }

    fn create(&self, measure_type: &str) -> Option<Arc<dyn Probe>> {
        match measure_type {
            BATTERY_TYPE => Some(Arc::new(self.battery_probe())),
            MEMORY_TYPE => Some(Arc::new(self.memory_probe())),
            _ => None,
        }
    }

    fn minimum(&self) -> SamplingSchema {
        self.memory_schema(SamplingSchemaType::Minimum, 6)
    }

    fn light(&self) -> SamplingSchema {
        self.memory_schema(SamplingSchemaType::Light, 2)
    }
}
