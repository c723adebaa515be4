use crate::config::model::RuntimeConfig;
use crate::error::{Result, RotavaultError};

/// Render the resolved configuration, defaults and inheritance applied.
pub fn dump_config(cfg: &RuntimeConfig) -> Result<String> {
    serde_yaml::to_string(cfg)
        .map_err(|e| RotavaultError::message(format!("encode config: {}", e)))
}
