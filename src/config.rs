//! Service configuration
//!
//! Loaded once at process start from an optional YAML file; every field has
//! a default so the service can come up with no file at all. The size table
//! and guarantee defaults are read-only after load.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Resource limits for one size label
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SizeLimits {
    /// CPU limit in whole cores
    pub cpu: u64,
    /// Memory limit in MiB
    pub mem: u64,
}

/// A shared volume mounted into every dispatched workload
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SharedVolume {
    /// Volume name
    pub name: String,
    /// Backing PersistentVolumeClaim name
    pub claim_name: String,
    /// Mount path inside the workload container
    pub mount_path: String,
    /// Mount read-only
    #[serde(default)]
    pub read_only: bool,
}

/// Dispatcher configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Per-user namespaces are named `<prefix>-<escaped user>`
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Size table: label to CPU/memory limits
    #[serde(default = "default_sizes")]
    pub sizes: BTreeMap<String, SizeLimits>,

    /// The smallest tier; its guarantees come from `cpu_guarantee` and
    /// `mem_guarantee` instead of the oversubscription ratio
    #[serde(default = "default_size_label")]
    pub default_size: String,

    /// Oversubscription ratio: guarantee = floor(limit / ratio) for every
    /// tier except `default_size`
    #[serde(default = "default_size_ratio")]
    pub size_ratio: u64,

    /// CPU guarantee in whole cores for the smallest tier
    #[serde(default)]
    pub cpu_guarantee: u64,

    /// Memory guarantee in MiB for the smallest tier
    #[serde(default = "default_mem_guarantee")]
    pub mem_guarantee: u64,

    /// Extra environment entries injected into every workload
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,

    /// Shared volumes mounted into every workload
    #[serde(default)]
    pub volumes: Vec<SharedVolume>,

    /// Propagated to the workload as the DEBUG environment variable
    #[serde(default)]
    pub debug: bool,
}

fn default_namespace_prefix() -> String {
    "nublado".to_string()
}

fn default_size_label() -> String {
    "tiny".to_string()
}

fn default_size_ratio() -> u64 {
    4
}

fn default_mem_guarantee() -> u64 {
    512
}

fn default_sizes() -> BTreeMap<String, SizeLimits> {
    BTreeMap::from([
        ("tiny".to_string(), SizeLimits { cpu: 1, mem: 1536 }),
        ("small".to_string(), SizeLimits { cpu: 2, mem: 3072 }),
        ("medium".to_string(), SizeLimits { cpu: 4, mem: 6144 }),
        ("large".to_string(), SizeLimits { cpu: 8, mem: 12288 }),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
            sizes: default_sizes(),
            default_size: default_size_label(),
            size_ratio: default_size_ratio(),
            cpu_guarantee: 0,
            mem_guarantee: default_mem_guarantee(),
            extra_env: BTreeMap::new(),
            volumes: Vec::new(),
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, or defaults if no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read {}: {e}", path.display()))
                })?;
                serde_yaml::from_str(&raw)
                    .map_err(|e| Error::config(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants
    pub fn validate(&self) -> Result<()> {
        if self.size_ratio == 0 {
            return Err(Error::config("size_ratio must be at least 1"));
        }
        let smallest = self.sizes.get(&self.default_size).ok_or_else(|| {
            Error::config(format!(
                "default_size '{}' is not in the size table",
                self.default_size
            ))
        })?;
        if self.cpu_guarantee > smallest.cpu || self.mem_guarantee > smallest.mem {
            return Err(Error::config(format!(
                "guarantees for '{}' exceed its limits",
                self.default_size
            )));
        }
        Ok(())
    }

    /// The namespace owned by the given (escaped) user
    pub fn namespace_for(&self, escaped_user: &str) -> String {
        format!("{}-{}", self.namespace_prefix, escaped_user)
    }

    /// Size labels accepted in job requests, for validation messages
    pub fn size_labels(&self) -> Vec<&str> {
        self.sizes.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_size, "tiny");
        assert!(config.sizes.contains_key("tiny"));
    }

    #[test]
    fn namespace_is_prefix_plus_user() {
        let config = Config::default();
        assert_eq!(config.namespace_for("gregor-samsa"), "nublado-gregor-samsa");
    }

    #[test]
    fn rejects_unknown_default_size() {
        let config = Config {
            default_size: "colossal".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_guarantee_above_limit() {
        let config = Config {
            mem_guarantee: 1_000_000,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_zero_ratio() {
        let config = Config {
            size_ratio: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn parses_yaml_size_table() {
        let yaml = r#"
namespace_prefix: lab
sizes:
  tiny: { cpu: 1, mem: 1024 }
  small: { cpu: 2, mem: 4096 }
size_ratio: 4
mem_guarantee: 256
volumes:
  - name: home
    claim_name: home-pvc
    mount_path: /home
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sizes["small"], SizeLimits { cpu: 2, mem: 4096 });
        assert_eq!(config.volumes.len(), 1);
        assert!(!config.volumes[0].read_only);
    }
}
