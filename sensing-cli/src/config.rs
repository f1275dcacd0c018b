use std::path::Path;

use serde::{Deserialize, Serialize};

use sensing_runtime::ControllerConfig;

use crate::demo::SimulationConfig;
use crate::error::Result;

/// Default log filter when neither the config file nor `RUST_LOG` set one.
pub const DEFAULT_LOG_FILTER: &str = "sensing_runtime=info,sensing=info";

/// Application configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `tracing` filter directives.
    pub log_filter: Option<String>,
    /// Default run duration in seconds; runs until Ctrl-C when unset.
    pub duration_secs: Option<u64>,
    pub controller: ControllerConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Load from `path`, or use the defaults when no path is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
