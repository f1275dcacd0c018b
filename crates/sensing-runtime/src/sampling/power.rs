//! Power-awareness: battery-driven sampling schema throttling.
//!
//! ```text
//! level <10          -> None
//! 10 <= level <= 30  -> Minimum
//! 30 < level <= 50   -> Light
//! level > 50         -> Normal
//! ```
//!
//! The machine moves at most one band per reading. A reading that crosses
//! several band boundaries moves one band and relies on the next reading to
//! continue.

use serde::{Deserialize, Serialize};

use super::package::SamplingPackageRegistry;
use super::schema::{SamplingSchema, SamplingSchemaType};

/// Lower bound of the `Minimum` band.
pub const LEVEL_1: i32 = 10;
/// Upper bound of the `Minimum` band.
pub const LEVEL_2: i32 = 30;
/// Upper bound of the `Light` band.
pub const LEVEL_3: i32 = 50;

/// Power-awareness state, each demanding one sampling schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAwarenessState {
    None,
    Minimum,
    Light,
    #[default]
    Normal,
}

impl PowerAwarenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimum => "minimum",
            Self::Light => "light",
            Self::Normal => "normal",
        }
    }

    /// One-step transition for a battery reading.
    pub fn adapt(self, level: i32) -> Self {
        match self {
            Self::None if level > LEVEL_1 => Self::Minimum,
            Self::None => Self::None,
            Self::Minimum if level < LEVEL_1 => Self::None,
            Self::Minimum if level > LEVEL_2 => Self::Light,
            Self::Minimum => Self::Minimum,
            Self::Light if level < LEVEL_2 => Self::Minimum,
            Self::Light if level > LEVEL_3 => Self::Normal,
            Self::Light => Self::Light,
            Self::Normal if level < LEVEL_3 => Self::Light,
            Self::Normal => Self::Normal,
        }
    }

    /// The band a battery level belongs to.
    pub fn for_level(level: i32) -> Self {
        if level < LEVEL_1 {
            Self::None
        } else if level <= LEVEL_2 {
            Self::Minimum
        } else if level <= LEVEL_3 {
            Self::Light
        } else {
            Self::Normal
        }
    }

    pub fn schema_type(&self) -> SamplingSchemaType {
        match self {
            Self::None => SamplingSchemaType::None,
            Self::Minimum => SamplingSchemaType::Minimum,
            Self::Light => SamplingSchemaType::Light,
            Self::Normal => SamplingSchemaType::Normal,
        }
    }

    /// The schema this state wants applied, from the package presets.
    pub fn schema(&self, packages: &SamplingPackageRegistry) -> SamplingSchema {
        packages.preset(self.schema_type())
    }
}

impl std::fmt::Display for PowerAwarenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
