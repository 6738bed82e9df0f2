//! Configuration for the matching engine
//!
//! Supports:
//! - TOML config file at XDG locations
//! - Environment variable overrides (DMR__*)
//! - Coded defaults matching the production tuning

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Per-field weights of the composite score. Must sum to 1.0 so the
/// composite stays an affine combination in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub floor: f64,
    pub room: f64,
    pub name: f64,
    pub device_type: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            floor: 0.15,
            room: 0.40,
            name: 0.30,
            device_type: 0.15,
        }
    }
}

/// Inclusion thresholds for the filter stages. They gate inclusion only;
/// component scores always reflect the raw similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub floor: f64,
    pub room: f64,
    pub name: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            floor: 0.70,
            room: 0.70,
            name: 0.45,
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub weights: Weights,
    pub thresholds: Thresholds,
    /// Results are truncated to the best K.
    pub top_k: usize,
    /// Minimum score separation between rank 1 and rank 2 below which the
    /// outcome is flagged ambiguous.
    pub disambiguation_gap: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            thresholds: Thresholds::default(),
            top_k: 100,
            disambiguation_gap: 0.08,
        }
    }
}

impl MatcherConfig {
    /// Load configuration with layered sources: coded defaults, then an
    /// optional TOML file, then `DMR__*` environment overrides
    /// (e.g. `DMR__WEIGHTS__ROOM=0.5`).
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(override_path)?;

        let defaults = MatcherConfig::default();
        let config = Config::builder()
            .set_default("weights.floor", defaults.weights.floor)?
            .set_default("weights.room", defaults.weights.room)?
            .set_default("weights.name", defaults.weights.name)?
            .set_default("weights.device_type", defaults.weights.device_type)?
            .set_default("thresholds.floor", defaults.thresholds.floor)?
            .set_default("thresholds.room", defaults.thresholds.room)?
            .set_default("thresholds.name", defaults.thresholds.name)?
            .set_default("top_k", defaults.top_k as i64)?
            .set_default("disambiguation_gap", defaults.disambiguation_gap)?
            .add_source(
                File::from(config_path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("DMR")
                    .try_parsing(true)
                    .separator("__"),
            )
            .build()?;

        let cfg: MatcherConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        let sum = w.floor + w.room + w.name + w.device_type;
        if (sum - 1.0).abs() > 1e-6 {
            bail!("component weights must sum to 1.0, got {sum}");
        }
        for (label, value) in [
            ("weights.floor", w.floor),
            ("weights.room", w.room),
            ("weights.name", w.name),
            ("weights.device_type", w.device_type),
            ("thresholds.floor", self.thresholds.floor),
            ("thresholds.room", self.thresholds.room),
            ("thresholds.name", self.thresholds.name),
            ("disambiguation_gap", self.disambiguation_gap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{label} must be in [0, 1], got {value}");
            }
        }
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        Ok(())
    }
}

fn resolve_config_path(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        let expanded = expand_path(path)?;
        if expanded.is_dir() {
            return Ok(expanded.join("config.toml"));
        }
        return Ok(expanded);
    }

    Ok(default_config_dir()?.join("config.toml"))
}

/// Write a commented starter config file with the default tuning.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = MatcherConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config")?;

    let content = format!(
        "# dmr matcher configuration\n\
        # File: {}\n\
        #\n\
        # Environment variables:\n\
        #   DMR__* - Override any value (e.g., DMR__WEIGHTS__ROOM=0.5)\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> Result<PathBuf> {
    // Check XDG_CONFIG_HOME first
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    // Use platform-specific config directory
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    // Fallback to ~/.config
    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MatcherConfig::default();
        assert_eq!(config.top_k, 100);
        assert_eq!(config.disambiguation_gap, 0.08);
        assert_eq!(config.weights.room, 0.40);
        assert_eq!(config.thresholds.name, 0.45);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = MatcherConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[weights]"));
        assert!(toml.contains("[thresholds]"));
    }

    #[test]
    fn test_validate_rejects_bad_weight_sum() {
        let config = MatcherConfig {
            weights: Weights {
                floor: 0.5,
                room: 0.5,
                name: 0.5,
                device_type: 0.5,
            },
            ..MatcherConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_gap() {
        let config = MatcherConfig {
            disambiguation_gap: 1.5,
            ..MatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let config = MatcherConfig {
            top_k: 0,
            ..MatcherConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "top_k = 10\n\n[weights]\nfloor = 0.1\nroom = 0.5\nname = 0.3\ndevice_type = 0.1\n",
        )
        .unwrap();

        let config = MatcherConfig::load(Some(&path)).unwrap();
        assert_eq!(config.top_k, 10);
        assert_eq!(config.weights.room, 0.5);
        // Unspecified values keep their defaults.
        assert_eq!(config.thresholds.room, 0.70);
    }

    #[test]
    fn test_write_default_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default_config(&path).unwrap();

        let loaded = MatcherConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, MatcherConfig::default());
    }
}
