//! Typed configuration for `takt.yaml` project files.
//!
//! The core reads a small set of runtime knobs; everything else in the file
//! (application sections, HAL backend settings) is preserved untouched so
//! outer layers can deserialize their own sections from the same document.
//!
//! # Example takt.yaml
//!
//! ```yaml
//! name: delta-picker
//! log_level: trace
//!
//! # Bytes of stack prefaulted before the periodic loop starts
//! prefault_stack_kib: 512
//! ```

use crate::core::tlog::{set_log_level, LogLevel};
use crate::error::{Result, TaktError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_prefault_kib() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Core runtime configuration from takt.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Project name
    pub name: Option<String>,

    /// Minimum severity reaching the log sink: trace, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Stack bytes prefaulted by the executor before entering the loop
    #[serde(default = "default_prefault_kib")]
    pub prefault_stack_kib: usize,

    /// Extra configuration for outer layers (kept verbatim)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            log_level: default_log_level(),
            prefault_stack_kib: default_prefault_kib(),
            extra: HashMap::new(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<CoreConfig> {
        let text = std::fs::read_to_string(path)?;
        let config: CoreConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if LogLevel::parse(&self.log_level).is_none() {
            return Err(TaktError::config(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Install the configured log level.
    pub fn apply(&self) {
        if let Some(level) = LogLevel::parse(&self.log_level) {
            set_log_level(level);
        }
    }

    /// Stack prefault size in bytes.
    pub fn prefault_stack_bytes(&self) -> usize {
        self.prefault_stack_kib * 1024
    }
}
