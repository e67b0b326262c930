//! Configuration for quill.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. a TOML file (`--config`, or `quill.toml` in the platform config dir),
//! 3. environment variables prefixed with `QUILL_` (`QUILL_DATABASE_URL`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use quill_asyncutils::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default maximum payload of one round trip: 16 MiB.
pub const DEFAULT_MAX_PACKET_SIZE: u64 = 16 * 1024 * 1024;
pub const ENV_PREFIX: &str = "QUILL_";
const FILE_NAME: &str = "quill.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection string of the remote store, credentials included.
    pub database_url: String,
    /// The tracked directory. Must be absolute.
    pub root: PathBuf,
    /// Local index database; without one every run hashes every file.
    pub index: Option<PathBuf>,
    /// Largest payload the remote store accepts in one round trip, in bytes.
    pub max_packet_size: u64,
    /// Substrings that exclude a path from tracking.
    pub ignore: Vec<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            root: PathBuf::new(),
            index: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            ignore: [".git", ".hg", ".svn", ".idea", ".vscode", ".DS_Store"].map(String::from).to_vec(),
            reconnect_attempts: quill_asyncutils::RECONNECT_ATTEMPTS,
            reconnect_delay_secs: quill_asyncutils::RECONNECT_DELAY.as_secs(),
        }
    }
}

impl Config {
    /// Load from every source. A missing file is not an error; an explicit
    /// `path` that does not exist is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Invalid(format!("config file {} does not exist", path.display())));
                }
                figment = figment.merge(Toml::file(path));
            },
            None => {
                if let Some(path) = default_path() {
                    tracing::debug!(path = %path.display(), "looking for config file");
                    figment = figment.merge(Toml::file(path));
                }
            },
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("database_url must be set".to_string()));
        }
        if !self.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!("root must be an absolute path, got {:?}", self.root)));
        }
        if self.max_packet_size == 0 {
            exn::bail!(ErrorKind::Invalid("max_packet_size must not be zero".to_string()));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.reconnect_attempts, Duration::from_secs(self.reconnect_delay_secs))
    }
}

/// `quill.toml` in the platform's config directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "quill").map(|dirs| dirs.config_dir().join(FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults_fill_the_gaps() {
        let config = from_toml(
            r#"
                database_url = "sqlite:///srv/quill/notes.db"
                root = "/home/me/notes"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
        assert_eq!(config.index, None);
        assert!(config.ignore.iter().any(|p| p == ".git"));
        assert_eq!(config.reconnect_policy(), RetryPolicy::RECONNECT);
    }

    #[test]
    fn test_everything_overridden() {
        let config = from_toml(
            r#"
                database_url = "sqlite::memory:"
                root = "/notes"
                index = "/var/lib/quill/index.db"
                max_packet_size = 1024
                ignore = [".trash"]
                reconnect_attempts = 1
                reconnect_delay_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.index.as_deref(), Some(Path::new("/var/lib/quill/index.db")));
        assert_eq!(config.ignore, [".trash"]);
        assert_eq!(config.reconnect_policy().attempts(), 1);
    }

    #[rstest]
    #[case("root = \"/notes\"", "database_url must be set")]
    #[case("database_url = \"sqlite::memory:\"\nroot = \"notes\"", "root must be an absolute path")]
    #[case("database_url = \"x\"\nroot = \"/notes\"\nmax_packet_size = 0", "max_packet_size must not be zero")]
    fn test_invalid(#[case] toml: &str, #[case] message: &str) {
        let err = from_toml(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(m) if m.starts_with(message)), "{err:?}");
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quill.toml");
        std::fs::write(&path, "max_packet_size = \"lots\"").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/quill.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
