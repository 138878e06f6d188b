/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! `wikimark.toml` configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use wikimark_macro::DEFAULT_MAX_SWEEPS;

use crate::directory::{DirectoryLookup, StaticDirectory, TimeoutLookup};
use crate::error::{CoreError, Result};

/// File name looked up under `$HOME/.config`.
pub const CONFIG_FILE_NAME: &str = "wikimark.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Wiki base URL. Informational only.
    pub base_url: Option<String>,
    /// Sweep ceiling for macro expansion.
    pub max_sweeps: usize,
    /// Root directory for `Include:` template paths.
    pub templates_dir: Option<PathBuf>,
    /// Timeout for a single directory lookup.
    pub lookup_timeout_ms: u64,
    /// Person name to account id.
    pub users: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            max_sweeps: DEFAULT_MAX_SWEEPS,
            templates_dir: None,
            lookup_timeout_ms: 2000,
            users: BTreeMap::new(),
        }
    }
}

impl Config {
    /// `$HOME/.config/wikimark.toml`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join(CONFIG_FILE_NAME))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(source: &str, path: &Path) -> Result<Self> {
        toml::from_str(source).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content, path)
    }

    /// Load the explicitly given file, or the default file if it exists.
    ///
    /// An explicit path must exist; a missing default file yields
    /// [`Config::default`].
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "loading configuration");
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "loading default configuration");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Bound `lookup` by the configured timeout if it can block.
    pub fn bound_lookup(&self, lookup: Arc<dyn DirectoryLookup>) -> Arc<dyn DirectoryLookup> {
        TimeoutLookup::bounded(lookup, self.lookup_timeout())
    }

    /// The directory of configured users.
    pub fn directory(&self) -> Arc<dyn DirectoryLookup> {
        self.bound_lookup(Arc::new(StaticDirectory::from(self.users.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Identity, LookupError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
base_url = "https://wiki.example.com"
max_sweeps = 8
templates_dir = "templates"
lookup_timeout_ms = 100

[users]
alice = "42"
"#,
            Path::new("wikimark.toml"),
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://wiki.example.com"));
        assert_eq!(config.max_sweeps, 8);
        assert_eq!(config.templates_dir, Some(PathBuf::from("templates")));
        assert_eq!(config.lookup_timeout(), Duration::from_millis(100));
        assert_eq!(config.users.get("alice").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("", Path::new("wikimark.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_sweeps, DEFAULT_MAX_SWEEPS);
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::from_toml("max_sweeps = \"many\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Config::from_toml("colour = \"red\"", Path::new("c.toml")).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Config::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wikimark.toml");
        std::fs::write(&path, "[users]\nbob = \"7\"\n").unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        let directory = config.directory();
        let identity = directory.lookup("bob").unwrap().unwrap();
        assert_eq!(identity.account_id, "7");
        assert!(!directory.is_blocking());
    }

    #[test]
    fn test_bound_lookup_applies_configured_timeout() {
        let config = Config::from_toml("lookup_timeout_ms = 10", Path::new("c.toml")).unwrap();
        let slow = |_: &str| -> std::result::Result<Option<Identity>, LookupError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(None)
        };
        let bounded = config.bound_lookup(Arc::new(slow));
        assert!(bounded.lookup("anyone").is_err());
    }
}
