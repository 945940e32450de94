//! Front-end configuration read from `pgport.toml`.
//!
//! ```toml
//! output = "output.sql"
//! format = "text"
//!
//! [debug]
//! enabled = true
//! tree = "debug/tree.txt"
//! ptree = "debug/tree.psql.txt"
//! ignore_whitespace = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConvertError, ConvertResult};

/// File looked up in the working directory.
pub const LOCAL_CONFIG: &str = "pgport.toml";

/// How the converted tree is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Compact token rendering.
    #[default]
    Text,
    /// JSON tree.
    Json,
    /// Tree notation.
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub debug: DebugConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output.sql"),
            format: OutputFormat::Text,
            debug: DebugConfig::default(),
        }
    }
}

/// Tree dumps written before and after conversion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    /// Dump of the input tree.
    pub tree: PathBuf,
    /// Dump of the converted tree.
    pub ptree: PathBuf,
    pub ignore_whitespace: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tree: PathBuf::from("debug/tree.txt"),
            ptree: PathBuf::from("debug/tree.psql.txt"),
            ignore_whitespace: true,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml(content: &str) -> ConvertResult<Self> {
        toml::from_str(content).map_err(|e| ConvertError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> ConvertResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the first configuration found.
    ///
    /// An explicit path must exist. Otherwise `./pgport.toml` and then
    /// `<config dir>/pgport/config.toml` are tried; with neither present
    /// the defaults apply.
    pub fn load(explicit: Option<&Path>) -> ConvertResult<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConvertError::Config(format!(
                    "{} not found",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        for path in Self::search_paths() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("pgport").join("config.toml"));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output, PathBuf::from("output.sql"));
        assert!(config.debug.ignore_whitespace);
    }

    #[test]
    fn test_partial_document() {
        let config = Config::from_toml(
            r#"
            format = "json"

            [debug]
            enabled = true
            ptree = "out/after.txt"
            "#,
        )
        .unwrap();
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.output, PathBuf::from("output.sql"));
        assert!(config.debug.enabled);
        assert_eq!(config.debug.tree, PathBuf::from("debug/tree.txt"));
        assert_eq!(config.debug.ptree, PathBuf::from("out/after.txt"));
    }

    #[test]
    fn test_unknown_format_is_config_error() {
        let err = Config::from_toml(r#"format = "yaml""#).unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
    }

    #[test]
    fn test_missing_explicit_path() {
        let err = Config::load(Some(Path::new("definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let path = std::env::temp_dir().join(format!("pgport-config-{}.toml", std::process::id()));
        fs::write(&path, "output = \"converted.sql\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.output, PathBuf::from("converted.sql"));
    }
}
