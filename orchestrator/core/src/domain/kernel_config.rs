// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Kernel Configuration Types
//
// Defines the configuration schema for the orchestration kernel:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Pipeline and graph execution policy
// - Broadcast default timeout
// - Recursion guard limits (depth, loop window, allow/block lists)

use crate::domain::chain::ChainOptions;
use crate::domain::graph::GraphOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "conductor/v1";
pub const KIND: &str = "KernelConfig";

/// Top-level Kubernetes-style kernel configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfigManifest {
    /// API version (must be "conductor/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "KernelConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: KernelConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Kernel configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfigSpec {
    #[serde(default)]
    pub chain: ChainOptions,

    #[serde(default)]
    pub graph: GraphOptions,

    #[serde(default)]
    pub broadcast: BroadcastSettings,

    #[serde(default)]
    pub subagent: SubAgentSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastSettings {
    /// Per-call timeout for groups that do not set their own
    #[serde(default, with = "humantime_serde")]
    pub default_timeout: Option<Duration>,
}

/// Recursion guard limits.
///
/// The loop heuristic (3 hits within the last 10 calls) and the default depth
/// of 5 are tunable defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSettings {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Per-invocation timeout (None disables it)
    #[serde(default = "default_subagent_timeout", with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// When set, only these agent ids may be invoked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_agents: Option<Vec<String>>,

    #[serde(default)]
    pub blocked_agents: Vec<String>,

    /// Number of most recent history entries inspected for repeats
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// Occurrences within the window that count as a loop
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,
}

impl Default for SubAgentSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            timeout: default_subagent_timeout(),
            allowed_agents: None,
            blocked_agents: Vec::new(),
            loop_window: default_loop_window(),
            loop_threshold: default_loop_threshold(),
        }
    }
}

fn default_max_depth() -> u32 {
    5
}

fn default_subagent_timeout() -> Option<Duration> {
    Some(Duration::from_secs(30))
}

fn default_loop_window() -> usize {
    10
}

fn default_loop_threshold() -> usize {
    3
}

impl Default for KernelConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "conductor".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: KernelConfigSpec::default(),
        }
    }
}

impl KernelConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONDUCTOR_CONFIG_PATH environment variable
    /// 2. ./conductor-config.yaml (working directory)
    /// 3. ~/.conductor/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONDUCTOR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./conductor-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".conductor").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must load; no silent fallback
        if let Some(path) = explicit_path {
            tracing::info!("Loading kernel configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load kernel config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            config.validate()?;
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading kernel configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No kernel configuration file found. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CONDUCTOR_MAX_DEPTH") {
            match val.parse::<u32>() {
                Ok(depth) => {
                    tracing::info!("Environment override: CONDUCTOR_MAX_DEPTH={}", depth);
                    self.spec.subagent.max_depth = depth;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CONDUCTOR_MAX_DEPTH: '{}'. Expected an integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("CONDUCTOR_SUBAGENT_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(&val) {
                Ok(timeout) => {
                    tracing::info!("Environment override: CONDUCTOR_SUBAGENT_TIMEOUT={}", val);
                    self.spec.subagent.timeout = Some(timeout);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CONDUCTOR_SUBAGENT_TIMEOUT: '{}'. Expected a duration like '30s'. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("CONDUCTOR_GRAPH_PARALLEL") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: CONDUCTOR_GRAPH_PARALLEL=true");
                    self.spec.graph.parallel = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: CONDUCTOR_GRAPH_PARALLEL=false");
                    self.spec.graph.parallel = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CONDUCTOR_GRAPH_PARALLEL: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let subagent = &self.spec.subagent;
        if subagent.loop_threshold == 0 {
            anyhow::bail!("spec.subagent.loop_threshold must be at least 1");
        }

        if subagent.loop_window < subagent.loop_threshold {
            anyhow::bail!(
                "spec.subagent.loop_window ({}) must not be smaller than loop_threshold ({})",
                subagent.loop_window,
                subagent.loop_threshold
            );
        }

        if let Some(allowed) = &subagent.allowed_agents {
            if let Some(both) = allowed.iter().find(|id| subagent.blocked_agents.contains(*id)) {
                tracing::warn!(
                    agent_id = %both,
                    "Agent is both allowed and blocked; the block list wins"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = KernelConfigManifest::default();
        assert_eq!(manifest.api_version, "conductor/v1");
        assert_eq!(manifest.kind, "KernelConfig");
        assert!(manifest.spec.chain.stop_on_error);
        assert!(!manifest.spec.graph.stop_on_error);
        assert!(manifest.spec.graph.parallel);
        assert_eq!(manifest.spec.subagent.max_depth, 5);
        assert_eq!(manifest.spec.subagent.loop_window, 10);
        assert_eq!(manifest.spec.subagent.loop_threshold, 3);
        assert_eq!(manifest.spec.subagent.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_humantime_durations() {
        let yaml = r#"
apiVersion: conductor/v1
kind: KernelConfig
metadata:
  name: research-kernel
spec:
  chain:
    stop_on_error: false
    step_timeout: 500ms
  graph:
    stop_on_error: true
    node_timeout: 2s
  broadcast:
    default_timeout: 1m
  subagent:
    max_depth: 3
    timeout: 10s
    allowed_agents: [shell, web]
    blocked_agents: [git]
"#;
        let manifest = KernelConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());

        let spec = &manifest.spec;
        assert!(!spec.chain.stop_on_error);
        assert_eq!(spec.chain.step_timeout, Some(Duration::from_millis(500)));
        assert!(spec.graph.stop_on_error);
        assert!(spec.graph.parallel);
        assert_eq!(spec.graph.node_timeout, Some(Duration::from_secs(2)));
        assert_eq!(spec.broadcast.default_timeout, Some(Duration::from_secs(60)));
        assert_eq!(spec.subagent.max_depth, 3);
        assert_eq!(spec.subagent.timeout, Some(Duration::from_secs(10)));
        assert_eq!(
            spec.subagent.allowed_agents,
            Some(vec!["shell".to_string(), "web".to_string()])
        );
        assert_eq!(spec.subagent.blocked_agents, vec!["git".to_string()]);
        // Unset fields keep their defaults
        assert_eq!(spec.subagent.loop_window, 10);
    }

    #[test]
    fn test_missing_spec_uses_defaults() {
        let yaml = "apiVersion: conductor/v1\nkind: KernelConfig\nmetadata:\n  name: bare\n";
        let manifest = KernelConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.subagent.max_depth, 5);
        assert!(manifest.spec.chain.step_timeout.is_none());
    }

    #[test]
    fn test_validation() {
        let mut manifest = KernelConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.subagent.loop_threshold = 0;
        assert!(manifest.validate().is_err());

        manifest.spec.subagent.loop_threshold = 4;
        manifest.spec.subagent.loop_window = 3;
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("loop_window"));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conductor-config.yaml");

        let mut manifest = KernelConfigManifest::default();
        manifest.spec.subagent.blocked_agents = vec!["rm-rf".to_string()];
        manifest.spec.graph.node_timeout = Some(Duration::from_secs(5));
        manifest.to_yaml_file(&path).unwrap();

        let loaded = KernelConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.subagent.blocked_agents, vec!["rm-rf".to_string()]);
        assert_eq!(loaded.spec.graph.node_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = KernelConfigManifest::load_or_default(Some(dir.path().join("absent.yaml")));
        assert!(result.is_err());
    }
}
