use crate::error::{Error, Result};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_ROOT: &str = "/run/corral";

/// Runtime-wide settings handed to the sandbox engine on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Directory holding per-pod state.
    pub root: PathBuf,
    /// Signal used to stop a container, e.g. `SIGTERM`.
    pub stop_signal: String,
    /// Bundle used when the caller does not name one.
    pub default_bundle: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            stop_signal: "SIGKILL".to_string(),
            default_bundle: None,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.stop_signal()?;
        Ok(config)
    }

    pub fn stop_signal(&self) -> Result<Signal> {
        Signal::from_str(&self.stop_signal).map_err(|_| {
            Error::InvalidConfig(format!("unknown stop signal '{}'", self.stop_signal))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_to_empty_file() {
        let config = RuntimeConfig::from_toml("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.stop_signal().unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn parses_all_fields() {
        let config = RuntimeConfig::from_toml(
            r#"
            root = "/tmp/corral"
            stop_signal = "SIGTERM"
            default_bundle = "/srv/bundle"
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/corral"));
        assert_eq!(config.stop_signal().unwrap(), Signal::SIGTERM);
        assert_eq!(config.default_bundle, Some(PathBuf::from("/srv/bundle")));
    }

    #[test]
    fn rejects_unknown_keys_and_signals() {
        assert!(matches!(
            RuntimeConfig::from_toml("cpus = 2"),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_toml("stop_signal = \"SIGNOPE\""),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "root = \"/var/lib/corral\"").unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.root, PathBuf::from("/var/lib/corral"));
    }

    #[test]
    fn load_missing_file_is_invalid_config() {
        let err = RuntimeConfig::load("/nonexistent/corral.toml").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
