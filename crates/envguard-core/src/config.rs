//! Configuration management for envguard
//!
//! Configuration files:
//! - ~/.config/envguard/config.yaml - Global settings
//! - .envguard.yaml next to the schema - Project settings (wins when present)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths::Paths;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Schema file used when none is given on the command line
    #[serde(default = "default_schema")]
    pub schema: PathBuf,

    /// Per-call timeout for external resolver commands (seconds)
    #[serde(default = "default_resolver_timeout_secs")]
    pub resolver_timeout_secs: u64,

    /// Upper bound on fields resolved at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Token printed in place of every sensitive value
    #[serde(default = "default_mask")]
    pub mask: String,

    /// Longest public value printed before truncation
    #[serde(default = "default_max_value_width")]
    pub max_value_width: usize,

    /// Let a present process environment variable win over a literal default
    #[serde(default)]
    pub process_env_overrides: bool,

    /// Extra resolver kinds backed by a command prefix
    /// (e.g. `op: [op, read]` makes `op(op://vault/item)` run `op read op://vault/item`)
    #[serde(default)]
    pub resolvers: BTreeMap<String, Vec<String>>,
}

fn default_schema() -> PathBuf {
    PathBuf::from(".env.schema")
}

fn default_resolver_timeout_secs() -> u64 {
    10
}

fn default_max_concurrency() -> usize {
    8
}

fn default_mask() -> String {
    "********".to_string()
}

fn default_max_value_width() -> usize {
    80
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            resolver_timeout_secs: default_resolver_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            mask: default_mask(),
            max_value_width: default_max_value_width(),
            process_env_overrides: false,
            resolvers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration for a schema: project file first, then global
    pub fn load(schema: &Path) -> Result<Self> {
        let project = Paths::project_config(schema);
        if project.exists() {
            return Self::load_from(&project);
        }
        Self::load_from(&Paths::new().global_config())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config: Self = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            Ok(config.normalized())
        } else {
            Ok(Self::default())
        }
    }

    // Zero values would stall resolution or print nothing for masks.
    fn normalized(mut self) -> Self {
        if self.max_concurrency == 0 {
            self.max_concurrency = 1;
        }
        if self.resolver_timeout_secs == 0 {
            self.resolver_timeout_secs = default_resolver_timeout_secs();
        }
        if self.mask.is_empty() {
            self.mask = default_mask();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mask, "********");
        assert_eq!(config.resolver_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "resolver_timeout_secs: 3\nmask: \"[hidden]\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.resolver_timeout_secs, 3);
        assert_eq!(config.mask, "[hidden]");
        assert_eq!(config.max_concurrency, 8);
        assert!(!config.process_env_overrides);
    }

    #[test]
    fn test_project_file_wins() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join(".env.schema");
        std::fs::write(dir.path().join(".envguard.yaml"), "max_concurrency: 2\n").unwrap();

        let config = Config::load(&schema).unwrap();
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_resolver_aliases() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "resolvers:\n  op: [op, read]\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.resolvers["op"], vec!["op".to_string(), "read".to_string()]);
    }

    #[test]
    fn test_zero_values_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_concurrency: 0\nresolver_timeout_secs: 0\nmask: \"\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.resolver_timeout_secs, 10);
        assert_eq!(config.mask, "********");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_concurrency: [not, a, number]\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
