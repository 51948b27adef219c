use std::path::{Path, PathBuf};

use crate::logging::LogFormat;

pub const ENV_WORKSPACE: &str = "CENTERDESK_WORKSPACE";
pub const ENV_STORAGE_DIR: &str = "CENTERDESK_STORAGE_DIR";
pub const ENV_LOG: &str = "CENTERDESK_LOG";
pub const ENV_LOG_FORMAT: &str = "CENTERDESK_LOG_FORMAT";

const DEFAULT_LOG_LEVEL: &str = "info";
const STORAGE_SUBDIR: &str = "storage";

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
    /// Overrides `<workspace>/storage` for uploaded files.
    pub storage_dir: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            storage_dir: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            storage_dir: non_empty(ENV_STORAGE_DIR).map(PathBuf::from),
            log_level: non_empty(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: non_empty(ENV_LOG_FORMAT)
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(LogFormat::Compact),
        }
    }

    pub fn storage_root(&self, workspace: &Path) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| workspace.join(STORAGE_SUBDIR))
    }
}
