//! Study deployment model: tasks, measures, triggers and the data endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Default data format identifier used when a deployment does not name one.
pub const DEFAULT_DATA_FORMAT: &str = "carp";

/// Default data endpoint type (console output).
pub const DEFAULT_ENDPOINT_TYPE: &str = "PRINT";

/// Snapshot of the adaptable part of a measure, kept so a sampling schema
/// can restore the measure to its pre-adaptation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MeasureSnapshot {
    enabled: bool,
    configuration: Map<String, Value>,
}

/// A typed, named, enable-flagged configuration unit consumed by exactly one
/// probe factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// Measure type, the key used to look up a probe factory.
    #[serde(rename = "type")]
    pub measure_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Probe-specific parameters (e.g. `interval_ms`).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,
    #[serde(skip)]
    stored: Option<MeasureSnapshot>,
}

fn default_enabled() -> bool {
    true
}

impl Measure {
    /// Create an enabled measure of the given type.
    pub fn new(measure_type: impl Into<String>) -> Self {
        Self {
            measure_type: measure_type.into(),
            name: None,
            enabled: true,
            configuration: Map::new(),
            stored: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Add a configuration entry.
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }

    /// Display name, falling back to the measure type.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.measure_type)
    }

    /// Read an unsigned integer configuration value.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.configuration.get(key).and_then(Value::as_u64)
    }

    /// Whether a snapshot from a previous adaptation is held.
    pub fn has_stored_configuration(&self) -> bool {
        self.stored.is_some()
    }

    /// Adapt this measure to an override coming from a sampling schema.
    ///
    /// The first adaptation stores a snapshot of the current configuration;
    /// later adaptations keep that original snapshot.
    pub fn adapt(&mut self, other: &Measure) {
        if self.stored.is_none() {
            self.stored = Some(MeasureSnapshot {
                enabled: self.enabled,
                configuration: self.configuration.clone(),
            });
        }
        self.enabled = other.enabled;
        for (key, value) in &other.configuration {
            self.configuration.insert(key.clone(), value.clone());
        }
    }

    /// Restore the configuration stored by the first adaptation, if any.
    /// The snapshot is retained.
    pub fn restore(&mut self) {
        if let Some(stored) = &self.stored {
            self.enabled = stored.enabled;
            self.configuration = stored.configuration.clone();
        }
    }
}

/// A trigger descriptor. Carried as part of the protocol; trigger
/// execution lives outside this runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub configuration: Map<String, Value>,
}

/// A named group of measures executed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measures: Vec::new(),
            triggers: Vec::new(),
        }
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Where collected data goes and in which format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEndpoint {
    /// Endpoint type, the key used to look up a data manager.
    #[serde(rename = "type")]
    pub endpoint_type: String,
    /// Data format identifier, the key used to look up a format transformer.
    #[serde(default = "default_data_format")]
    pub data_format: String,
}

fn default_data_format() -> String {
    DEFAULT_DATA_FORMAT.to_string()
}

impl Default for DataEndpoint {
    fn default() -> Self {
        Self {
            endpoint_type: DEFAULT_ENDPOINT_TYPE.to_string(),
            data_format: default_data_format(),
        }
    }
}

/// A protocol instance deployed on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDeployment {
    pub study_deployment_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_role_name: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub data_endpoint: DataEndpoint,
}

impl StudyDeployment {
    pub fn new(study_deployment_id: impl Into<String>) -> Self {
        let id = study_deployment_id.into();
        Self {
            name: id.clone(),
            study_deployment_id: id,
            user_id: None,
            device_role_name: None,
            tasks: Vec::new(),
            data_endpoint: DataEndpoint::default(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_data_endpoint(mut self, data_endpoint: DataEndpoint) -> Self {
        self.data_endpoint = data_endpoint;
        self
    }

    /// Parse a deployment from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let deployment: Self = serde_json::from_str(json)?;
        deployment.validate()?;
        Ok(deployment)
    }

    /// Minimal structural checks the runtime relies on.
    pub fn validate(&self) -> Result<()> {
        if self.study_deployment_id.trim().is_empty() {
            return Err(Error::precondition("study deployment id must not be empty"));
        }
        Ok(())
    }

    /// Data format identifier of the data endpoint.
    pub fn data_format(&self) -> &str {
        &self.data_endpoint.data_format
    }

    /// Every measure across all tasks, in declaration order.
    pub fn measures(&self) -> impl Iterator<Item = &Measure> {
        self.tasks.iter().flat_map(|task| task.measures.iter())
    }

    /// Mutable access to every measure across all tasks.
    pub fn measures_mut(&mut self) -> impl Iterator<Item = &mut Measure> {
        self.tasks.iter_mut().flat_map(|task| task.measures.iter_mut())
    }

    /// Find a task by name.
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }
}
