//! Configuration file support
//!
//! A TOML file groups the engine, profiling and input-policy knobs. Every
//! section and field is optional; CLI flags override file values.
//!
//! ```toml
//! [engine]
//! rare_period = 97
//! cold_latency_us = 1
//! percentile = 95.0
//! dispatch = "static"
//!
//! [profile]
//! enabled = true
//! path = "/tmp/cpu.pprof"
//! frequency = 1000
//!
//! [input]
//! policy = "strict"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::EngineConfig;
use crate::params::DecodePolicy;
use crate::profile::ProfileConfig;

/// Input handling settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// What to do with malformed request bytes
    pub policy: DecodePolicy,
}

/// Complete runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub profile: ProfileConfig,
    pub input: InputConfig,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("Invalid configuration TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In config file {}", path.display()))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .map_err(|e| anyhow::anyhow!("[engine] {}", e))?;
        self.profile
            .validate()
            .map_err(|e| anyhow::anyhow!("[profile] {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Dispatch;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = Config::from_toml(
            r#"
            [engine]
            rare_period = 50
            dispatch = "dynamic"

            [input]
            policy = "lenient"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.rare_period, 50);
        assert_eq!(config.engine.dispatch, Dispatch::Dynamic);
        assert_eq!(config.engine.cold_latency_us, 1);
        assert_eq!(config.input.policy, DecodePolicy::Lenient);
        assert_eq!(config.profile, ProfileConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Config::from_toml("[engine]\nrare_period = 1\n").unwrap_err();
        assert!(format!("{:#}", err).contains("rare_period"));

        let err = Config::from_toml("[profile]\nfrequency = 0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("frequency"));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(Config::from_toml("[engine\n").is_err());
        assert!(Config::from_toml("[engine]\nrare_period = \"often\"\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[profile]\nenabled = false\npath = \"/tmp/x.pprof\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.profile.enabled);
        assert_eq!(config.profile.path, Path::new("/tmp/x.pprof"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::from_file(Path::new("/nonexistent/pgoload.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pgoload.toml"));
    }
}
