use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const APP_PASSWORD_ENV: &str = "TRIPMATCH_APP_PASSWORD";

/// Knobs of the matching heuristics. The defaults are the values the
/// dashboards have always used; they are configuration, not tuned results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    pub initial_radius_m: f64,
    pub radius_multiplier: f64,
    pub max_radius_m: f64,
    pub max_refinement_attempts: u32,
    /// Allowed |matched - odometer| as a fraction of the odometer distance.
    pub relative_tolerance: f64,
    /// A gap longer than this between two samples makes the matcher split.
    pub gap_split_threshold_sec: i64,
    /// Spacing used to synthesize timestamps for samples that lack one.
    pub fallback_sample_spacing_sec: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        MatchPolicy {
            initial_radius_m: 20.,
            radius_multiplier: 1.5,
            max_radius_m: 100.,
            max_refinement_attempts: 3,
            relative_tolerance: 0.05,
            gap_split_threshold_sec: 300,
            fallback_sample_spacing_sec: 60,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_sec: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            base_url: "http://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            timeout_sec: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackend {
    Local { root: String },
    Drive { access_token: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub samples_file: String,
    pub sequences_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Local {
                root: ".".to_string(),
            },
            samples_file: "samples.csv".to_string(),
            sequences_file: "sequences.json".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub policy: MatchPolicy,
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub app_password: Option<String>,
    pub log_dir: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_json(&content)?;
        if let Ok(password) = std::env::var(APP_PASSWORD_ENV) {
            config.app_password = Some(password);
        }
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(content)?;
        config.policy.validate()?;
        Ok(config)
    }
}

impl MatchPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.initial_radius_m.is_nan() || self.initial_radius_m <= 0. {
            bail!("initial_radius_m must be positive");
        }
        if self.radius_multiplier.is_nan() || self.radius_multiplier < 1. {
            bail!("radius_multiplier must be at least 1");
        }
        if self.max_radius_m.is_nan() || self.max_radius_m < self.initial_radius_m {
            bail!("max_radius_m must not be smaller than initial_radius_m");
        }
        if self.relative_tolerance.is_nan() || self.relative_tolerance < 0. {
            bail!("relative_tolerance must not be negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.policy.gap_split_threshold_sec, 300);
        assert_eq!(config.policy.fallback_sample_spacing_sec, 60);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_json(
            r#"{
                "policy": { "relative_tolerance": 0.1 },
                "storage": { "backend": { "kind": "drive", "access_token": "t" } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.policy.relative_tolerance, 0.1);
        assert_eq!(config.policy.max_radius_m, 100.);
        assert_eq!(
            config.storage.backend,
            StorageBackend::Drive {
                access_token: "t".to_string()
            }
        );
        assert_eq!(config.storage.samples_file, "samples.csv");
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        assert!(Config::from_json(r#"{ "policy": { "radius_multiplier": 0.5 } }"#).is_err());
    }

    #[test]
    fn rejects_nan() {
        assert!(MatchPolicy::default().validate().is_ok());
        let policies = [
            MatchPolicy {
                initial_radius_m: f64::NAN,
                ..MatchPolicy::default()
            },
            MatchPolicy {
                radius_multiplier: f64::NAN,
                ..MatchPolicy::default()
            },
            MatchPolicy {
                max_radius_m: f64::NAN,
                ..MatchPolicy::default()
            },
            MatchPolicy {
                relative_tolerance: f64::NAN,
                ..MatchPolicy::default()
            },
        ];
        for policy in policies {
            assert!(policy.validate().is_err(), "{policy:?}");
        }
    }
}
