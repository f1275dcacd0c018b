//! Sampling schemas: named bundles of measure overrides.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Measure, StudyDeployment};
use crate::error::Error;

/// Kind of sampling schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingSchemaType {
    None,
    Minimum,
    Light,
    #[default]
    Normal,
    Custom,
}

impl SamplingSchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimum => "minimum",
            Self::Light => "light",
            Self::Normal => "normal",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for SamplingSchemaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "minimum" => Ok(Self::Minimum),
            "light" => Ok(Self::Light),
            "normal" => Ok(Self::Normal),
            "custom" => Ok(Self::Custom),
            other => Err(Error::config(format!("unknown sampling schema: {}", other))),
        }
    }
}

impl std::fmt::Display for SamplingSchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Measure overrides keyed by measure type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSchema {
    #[serde(rename = "type")]
    pub schema_type: SamplingSchemaType,
    pub name: String,
    #[serde(default)]
    pub measures: BTreeMap<String, Measure>,
    /// Whether this schema participates in power-aware throttling.
    #[serde(default)]
    pub power_aware: bool,
}

impl SamplingSchema {
    pub fn new(schema_type: SamplingSchemaType, name: impl Into<String>) -> Self {
        Self {
            schema_type,
            name: name.into(),
            measures: BTreeMap::new(),
            power_aware: false,
        }
    }

    /// A schema with no overrides of the given kind.
    pub fn empty(schema_type: SamplingSchemaType) -> Self {
        Self::new(schema_type, schema_type.as_str())
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.add_measure(measure);
        self
    }

    pub fn with_power_aware(mut self, power_aware: bool) -> Self {
        self.power_aware = power_aware;
        self
    }

    /// Add or replace the override for a measure type.
    pub fn add_measure(&mut self, measure: Measure) {
        self.measures.insert(measure.measure_type.clone(), measure);
    }

    /// Merge another schema's overrides into this one. Existing overrides
    /// win over incoming ones.
    pub fn merge(&mut self, other: SamplingSchema) {
        for (measure_type, measure) in other.measures {
            self.measures.entry(measure_type).or_insert(measure);
        }
        self.power_aware |= other.power_aware;
    }

    /// Adapt every measure of `deployment` to this schema, in place.
    ///
    /// With `restore`, each measure first returns to the configuration it
    /// had before its first adaptation, so measures this schema does not
    /// mention lose overrides left by an earlier schema.
    pub fn adapt(&self, deployment: &mut StudyDeployment, restore: bool) {
        for measure in deployment.measures_mut() {
            if restore {
                measure.restore();
            }
            if let Some(over) = self.measures.get(&measure.measure_type) {
                measure.adapt(over);
            }
        }
    }
}
