//! Standard paths used by envguard

use std::path::{Path, PathBuf};

/// Name of the project-level config file, looked up next to the schema
pub const PROJECT_CONFIG_FILE: &str = ".envguard.yaml";

/// Standard envguard paths
pub struct Paths {
    /// Config directory (~/.config/envguard)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("envguard");

        Self { config }
    }

    /// Global config file (~/.config/envguard/config.yaml)
    pub fn global_config(&self) -> PathBuf {
        self.config.join("config.yaml")
    }

    /// Project config file living in the same directory as the schema
    pub fn project_config(schema: &Path) -> PathBuf {
        schema_dir(schema).join(PROJECT_CONFIG_FILE)
    }

    /// Overlay file for a named environment, e.g. `.env.prod`
    pub fn overlay(schema: &Path, env_name: &str) -> PathBuf {
        schema_dir(schema).join(format!(".env.{}", env_name))
    }
}

/// Directory holding the schema; `.` for a bare file name
pub fn schema_dir(schema: &Path) -> PathBuf {
    match schema.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
