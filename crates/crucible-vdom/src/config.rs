//! Reconciler configuration

use crate::error::{VdomError, VdomResult};
use serde::{Deserialize, Serialize};

/// Tunables for [`Reconciler`](crate::Reconciler) and the keyed differ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Run [`Document::check_integrity`](crate::Document::check_integrity)
    /// after every update
    pub verify_integrity: bool,
    /// Suffix appended to a key that is inserted or removed twice in one pass
    pub duplicate_key_suffix: String,
    /// Log every applied patch at debug level
    pub trace_patches: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            verify_integrity: false,
            duplicate_key_suffix: "_dup".to_string(),
            trace_patches: false,
        }
    }
}

impl ReconcileConfig {
    /// Parse a configuration from TOML; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> VdomResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| VdomError::config(e.to_string()))?;
        if config.duplicate_key_suffix.is_empty() {
            return Err(VdomError::config("duplicate_key_suffix must not be empty"));
        }
        Ok(config)
    }

    /// Configuration for debugging sessions: integrity checks and patch tracing
    pub fn strict() -> Self {
        Self {
            verify_integrity: true,
            trace_patches: true,
            ..Self::default()
        }
    }
}
