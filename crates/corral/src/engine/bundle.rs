use corral_core::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Deserialize)]
struct BundleConfig {
    process: ProcessConfig,
}

/// The subset of an OCI bundle's `process` object the local engine honours.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessConfig {
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn load(bundle: &Path) -> Result<Self> {
        let path = bundle.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| Error::InvalidBundle {
            path: bundle.to_path_buf(),
            reason: format!("cannot read {CONFIG_FILE}: {e}"),
        })?;
        Self::parse(&contents).map_err(|reason| Error::InvalidBundle {
            path: bundle.to_path_buf(),
            reason,
        })
    }

    fn parse(contents: &str) -> std::result::Result<Self, String> {
        let config: BundleConfig =
            serde_json::from_str(contents).map_err(|e| format!("invalid {CONFIG_FILE}: {e}"))?;
        if config.process.args.is_empty() {
            return Err("process.args must not be empty".to_string());
        }
        Ok(config.process)
    }

    /// Working directory for the process. Relative paths resolve against the
    /// bundle, which is also the default.
    pub fn working_dir(&self, bundle: &Path) -> PathBuf {
        match &self.cwd {
            Some(cwd) => bundle.join(cwd),
            None => bundle.to_path_buf(),
        }
    }

    /// `KEY=VALUE` entries split into pairs; malformed entries are skipped.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().filter_map(|entry| entry.split_once('='))
    }
}
