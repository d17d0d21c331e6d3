//! Configuration loaded from `.multiedit/config.toml`
//!
//! Layers, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `~/.multiedit/config.toml` (user)
//! 3. `<workspace>/.multiedit/config.toml`
//! 4. Command-line flags (applied by the CLI)
//!
//! Each layer only overrides the keys it sets.
//!
//! ```toml
//! [search]
//! context_lines = 2        # fallback for both sides
//! context_before = 1       # overrides context_lines above matches
//! context_after = 3        # overrides context_lines below matches
//! max_results = 10000      # 0 = unlimited
//! include = ["*.rs"]
//! exclude = ["target/**"]
//! follow_symlinks = false
//! max_file_size = 10485760
//!
//! [incremental_updates]
//! enabled = false
//! debounce_delay = 300     # milliseconds
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::excerpt::MAX_CONTEXT_LINES;
use crate::models::{FileScope, SearchOptions};

/// Directory holding the configuration file, in the workspace and in `$HOME`
pub const CONFIG_DIR: &str = ".multiedit";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchConfig {
    pub context_lines: usize,
    pub context_before: Option<usize>,
    pub context_after: Option<usize>,
    pub max_results: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    pub max_file_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            context_lines: 2,
            context_before: None,
            context_after: None,
            max_results: 10_000,
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            max_file_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncrementalConfig {
    pub enabled: bool,
    /// Milliseconds
    pub debounce_delay: u64,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_delay: 300,
        }
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub search: SearchConfig,
    pub incremental_updates: IncrementalConfig,
}

/// `[search]` as written in one file; unset keys fall through
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchLayer {
    context_lines: Option<usize>,
    context_before: Option<usize>,
    context_after: Option<usize>,
    max_results: Option<usize>,
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    follow_symlinks: Option<bool>,
    max_file_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct IncrementalLayer {
    enabled: Option<bool>,
    debounce_delay: Option<u64>,
}

impl Config {
    /// Load defaults, then the user file, then the workspace file
    pub fn load(workspace: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        match dirs::home_dir() {
            Some(home) => paths.push(home.join(CONFIG_DIR).join(CONFIG_FILE)),
            None => log::debug!("Could not determine home directory"),
        }
        paths.push(workspace.join(CONFIG_DIR).join(CONFIG_FILE));

        Self::load_layers(&paths)
    }

    /// Apply config files in order; missing files are skipped
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut config = Config::default();
        for path in paths {
            config.merge_file(path)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            log::debug!("No config found at {}", path.display());
            return Ok(());
        }

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let toml_value: toml::Value = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if let Some(table) = toml_value.get("search") {
            let layer: SearchLayer = table
                .clone()
                .try_into()
                .with_context(|| format!("Failed to parse [search] section of {}", path.display()))?;
            self.merge_search(layer);
        }

        if let Some(table) = toml_value.get("incremental_updates") {
            let layer: IncrementalLayer = table.clone().try_into().with_context(|| {
                format!(
                    "Failed to parse [incremental_updates] section of {}",
                    path.display()
                )
            })?;
            if let Some(enabled) = layer.enabled {
                self.incremental_updates.enabled = enabled;
            }
            if let Some(delay) = layer.debounce_delay {
                self.incremental_updates.debounce_delay = delay;
            }
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(())
    }

    fn merge_search(&mut self, layer: SearchLayer) {
        let search = &mut self.search;
        if let Some(v) = layer.context_lines {
            search.context_lines = v;
        }
        if layer.context_before.is_some() {
            search.context_before = layer.context_before;
        }
        if layer.context_after.is_some() {
            search.context_after = layer.context_after;
        }
        if let Some(v) = layer.max_results {
            search.max_results = v;
        }
        if let Some(v) = layer.include {
            search.include = v;
        }
        if let Some(v) = layer.exclude {
            search.exclude = v;
        }
        if let Some(v) = layer.follow_symlinks {
            search.follow_symlinks = v;
        }
        if let Some(v) = layer.max_file_size {
            search.max_file_size = v;
        }
    }

    /// Context above and below matches, after `context_lines` fallback
    pub fn effective_context(&self) -> (usize, usize) {
        let lines = self.search.context_lines;
        (
            self.search.context_before.unwrap_or(lines),
            self.search.context_after.unwrap_or(lines),
        )
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.incremental_updates.debounce_delay)
    }

    pub fn validate(&self) -> Result<()> {
        let (before, after) = self.effective_context();
        if before > MAX_CONTEXT_LINES || after > MAX_CONTEXT_LINES {
            anyhow::bail!(
                "Context of {}/{} lines exceeds the maximum of {}",
                before,
                after,
                MAX_CONTEXT_LINES
            );
        }
        if self.incremental_updates.debounce_delay == 0 {
            anyhow::bail!("incremental_updates.debounce_delay must be greater than 0");
        }
        Ok(())
    }

    /// Search options for a query with this configuration's defaults
    pub fn search_options(&self, query: impl Into<String>) -> SearchOptions {
        let (context_before, context_after) = self.effective_context();
        SearchOptions {
            context_before,
            context_after,
            max_results: self.search.max_results,
            ..SearchOptions::new(query)
        }
    }

    pub fn file_scope(&self, root: impl Into<PathBuf>) -> FileScope {
        FileScope {
            include: self.search.include.clone(),
            exclude: self.search.exclude.clone(),
            follow_symlinks: self.search.follow_symlinks,
            max_file_size: self.search.max_file_size,
            ..FileScope::new(root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.effective_context(), (2, 2));
        assert_eq!(config.search.max_results, 10_000);
        assert!(!config.incremental_updates.enabled);
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_missing_files_use_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load_layers(&[temp.path().join("nope.toml")]).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_before_after_override_context_lines() {
        let temp = TempDir::new().unwrap();
        let path = write(
            temp.path(),
            "config.toml",
            r#"
[search]
context_lines = 4
context_after = 1
            "#,
        );

        let config = Config::load_layers(&[path]).unwrap();
        assert_eq!(config.effective_context(), (4, 1));
    }

    #[test]
    fn test_later_layers_win_per_key() {
        let temp = TempDir::new().unwrap();
        let user = write(
            temp.path(),
            "user.toml",
            r#"
[search]
max_results = 50
exclude = ["target/**"]

[incremental_updates]
enabled = true
            "#,
        );
        let workspace = write(
            temp.path(),
            "workspace.toml",
            r#"
[search]
max_results = 100

[incremental_updates]
debounce_delay = 1000
            "#,
        );

        let config = Config::load_layers(&[user, workspace]).unwrap();
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.search.exclude, vec!["target/**".to_string()]);
        assert!(config.incremental_updates.enabled);
        assert_eq!(config.incremental_updates.debounce_delay, 1000);
    }

    #[test]
    fn test_unparsable_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "config.toml", "[search\ncontext_lines = ");
        let err = Config::load_layers(&[path.clone()]).unwrap_err();
        assert!(format!("{:#}", err).contains(&path.display().to_string()));

        let typo = write(temp.path(), "typo.toml", "[search]\ncontext_line = 3\n");
        assert!(Config::load_layers(&[typo]).is_err());
    }

    #[test]
    fn test_excessive_context_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "config.toml", "[search]\ncontext_before = 10001\n");
        assert!(Config::load_layers(&[path]).is_err());
    }

    #[test]
    fn test_search_options_and_scope() {
        let mut config = Config::default();
        config.search.context_before = Some(0);
        config.search.include = vec!["*.md".to_string()];

        let options = config.search_options("needle");
        assert_eq!(options.query, "needle");
        assert_eq!((options.context_before, options.context_after), (0, 2));

        let scope = config.file_scope("docs");
        assert_eq!(scope.root, PathBuf::from("docs"));
        assert_eq!(scope.include, vec!["*.md".to_string()]);
    }
}
