//! Controller configuration.

use serde::{Deserialize, Serialize};

use crate::executor::group::DEFAULT_GROUP_CAPACITY;
use crate::sampling::SamplingSchemaType;
use crate::transform::CARP_SCHEMA;

/// Configuration of a [`StudyDeploymentController`](super::StudyDeploymentController).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Name of the transformer schema used as the privacy stage.
    pub privacy_schema: String,
    /// Whether battery readings throttle sampling.
    pub power_aware: bool,
    /// User id used when the deployment carries none.
    pub user_id: Option<String>,
    /// Sampling schema preset applied at initialize.
    pub sampling_schema: SamplingSchemaType,
    /// Capacity of every broadcast channel in the pipeline.
    pub channel_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            privacy_schema: CARP_SCHEMA.to_string(),
            power_aware: true,
            user_id: None,
            sampling_schema: SamplingSchemaType::Normal,
            channel_capacity: DEFAULT_GROUP_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"privacy_schema": "privacy", "sampling_schema": "light"}"#)
                .unwrap();
        assert_eq!(config.privacy_schema, "privacy");
        assert_eq!(config.sampling_schema, SamplingSchemaType::Light);
        assert!(config.power_aware);
        assert_eq!(config.channel_capacity, DEFAULT_GROUP_CAPACITY);
    }
}
