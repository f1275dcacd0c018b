//! Collected data: datums and the data point envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Namespace of the data types produced by the runtime itself.
pub const CARP_NAMESPACE: &str = "dk.cachet.carp";

/// Data type name of battery readings.
pub const BATTERY_TYPE: &str = "battery";

/// Qualified name of a data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFormat {
    pub namespace: String,
    pub name: String,
}

impl DataFormat {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A data type in the CARP namespace.
    pub fn carp(name: impl Into<String>) -> Self {
        Self::new(CARP_NAMESPACE, name)
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A single unit of collected data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub format: DataFormat,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Datum {
    pub fn new(format: DataFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            format,
            data: Map::new(),
        }
    }

    /// Add a field to the payload.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Data type name (without namespace).
    pub fn data_type(&self) -> &str {
        &self.format.name
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Envelope metadata of a data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_deployment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub data_format: DataFormat,
    pub created: DateTime<Utc>,
}

/// Delivery envelope wrapping a datum with identity and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub id: Uuid,
    pub header: DataPointHeader,
    pub body: Datum,
}

impl DataPoint {
    /// Wrap a datum in a fresh envelope.
    pub fn from_datum(datum: Datum) -> Self {
        Self {
            id: Uuid::new_v4(),
            header: DataPointHeader {
                study_deployment_id: None,
                user_id: None,
                data_format: datum.format.clone(),
                created: Utc::now(),
            },
            body: datum,
        }
    }

    pub fn with_deployment(
        mut self,
        study_deployment_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        self.header.study_deployment_id = Some(study_deployment_id.into());
        self.header.user_id = user_id;
        self
    }

    /// Envelope timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.header.created
    }

    /// Replace the payload, leaving the envelope untouched.
    pub fn map_body(mut self, f: impl FnOnce(Datum) -> Datum) -> Self {
        self.body = f(self.body);
        self
    }
}

/// Charging state reported with a battery reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryStatus {
    Full,
    Charging,
    Discharging,
    #[default]
    Unknown,
}

impl BatteryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Charging => "charging",
            Self::Discharging => "discharging",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "full" => Self::Full,
            "charging" => Self::Charging,
            "discharging" => Self::Discharging,
            _ => Self::Unknown,
        }
    }
}

/// A battery reading decoded from a `battery` datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryDatum {
    /// Battery level in percent (0..=100).
    pub battery_level: i32,
    pub battery_status: BatteryStatus,
}

impl BatteryDatum {
    pub fn new(battery_level: i32, battery_status: BatteryStatus) -> Self {
        Self {
            battery_level,
            battery_status,
        }
    }

    /// Decode from a datum; `None` unless it is a battery datum with a level.
    pub fn from_datum(datum: &Datum) -> Option<Self> {
        if datum.data_type() != BATTERY_TYPE {
            return None;
        }
        let level = datum.field("battery_level")?.as_i64()?;
        let status = datum
            .field("battery_status")
            .and_then(Value::as_str)
            .map(BatteryStatus::parse)
            .unwrap_or_default();
        Some(Self::new(level.clamp(0, 100) as i32, status))
    }

    /// Encode as a datum.
    pub fn to_datum(&self) -> Datum {
        Datum::new(DataFormat::carp(BATTERY_TYPE))
            .with_field("battery_level", Value::from(self.battery_level))
            .with_field("battery_status", Value::from(self.battery_status.as_str()))
    }

    pub fn is_discharging(&self) -> bool {
        self.battery_status == BatteryStatus::Discharging
    }
}
