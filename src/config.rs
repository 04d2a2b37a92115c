//! Service configuration.
//!
//! What to watch lives in a YAML file (`config.yml` by default, or the path in
//! `PR_WATCH_CONFIG`). Secrets and deployment details come from the
//! environment. A missing or malformed file is fatal at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::github::DEFAULT_REQUEST_TIMEOUT;
use crate::types::RepoId;

pub const CONFIG_PATH_ENV: &str = "PR_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";
pub const POLL_INTERVAL_ENV: &str = "PR_WATCH_POLL_INTERVAL_SECS";

/// Default interval between reconciliation cycles (2 minutes).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATE_DIR: &str = "state";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("github.repo is required in the config file")]
    MissingRepository,

    #[error("invalid github.repo: {0}")]
    InvalidRepository(#[from] crate::types::ids::ParseRepoIdError),

    #[error("{0} must be set")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

// ─── File Configuration ───────────────────────────────────────────────────────

/// A team whose owned paths make a PR interesting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TeamInterest {
    pub name: String,
    /// Path, within the watched repository, of a YAML file listing owned globs.
    pub ownership_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InterestsConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub teams: Vec<TeamInterest>,
}

/// Which notifications are sent, and to whom.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub email_to: Option<String>,
    #[serde(default = "enabled")]
    pub on_new_pr: bool,
    #[serde(default = "enabled")]
    pub on_code_change: bool,
    #[serde(default = "enabled")]
    pub on_merge: bool,
}

fn enabled() -> bool {
    true
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_to: None,
            on_new_pr: true,
            on_code_change: true,
            on_merge: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawGitHub {
    repo: Option<String>,
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    github: RawGitHub,
    #[serde(default)]
    interests: InterestsConfig,
    #[serde(default)]
    notifications: NotificationSettings,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// The validated contents of the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub repo: RepoId,
    /// Ref ownership files are read from. `None` means the repository default.
    pub default_branch: Option<String>,
    pub interests: InterestsConfig,
    pub notifications: NotificationSettings,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl WatchConfig {
    /// Loads the file named by `PR_WATCH_CONFIG`, or `config.yml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let config = Self::load_from(Path::new(&path))?;
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(content)?;

        let repo = raw
            .github
            .repo
            .filter(|r| !r.trim().is_empty())
            .ok_or(ConfigError::MissingRepository)?
            .parse::<RepoId>()?;

        let poll_interval = match raw.poll_interval_secs {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    name: "poll_interval_secs",
                    value: "0".into(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            repo,
            default_branch: raw.github.default_branch,
            interests: raw.interests,
            notifications: raw.notifications,
            poll_interval,
            request_timeout: raw
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    /// Applies `PR_WATCH_POLL_INTERVAL_SECS`, read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(POLL_INTERVAL_ENV) {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.poll_interval = Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: POLL_INTERVAL_ENV,
                        value,
                    });
                }
            }
        }
        Ok(self)
    }
}

// ─── Environment Settings ─────────────────────────────────────────────────────

/// Deployment settings read from the environment.
#[derive(Clone)]
pub struct Settings {
    pub github_token: String,
    /// Shared secret for webhook signatures. Verification is skipped without it.
    pub webhook_secret: Option<String>,
    /// Directory holding the store snapshot.
    pub state_dir: PathBuf,
    /// JSON-lines file notifications are appended to. Logged only if unset.
    pub outbox_path: Option<PathBuf>,
    pub listen_addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let github_token = non_empty("GITHUB_TOKEN").ok_or(ConfigError::MissingEnv("GITHUB_TOKEN"))?;

        let listen_raw =
            non_empty("PR_WATCH_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into());
        let listen_addr = listen_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                name: "PR_WATCH_LISTEN_ADDR",
                value: listen_raw.clone(),
            })?;

        Ok(Self {
            github_token,
            webhook_secret: non_empty("WEBHOOK_SECRET"),
            state_dir: non_empty("PR_WATCH_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            outbox_path: non_empty("PR_WATCH_OUTBOX").map(PathBuf::from),
            listen_addr,
        })
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("webhook_secret_set", &self.webhook_secret.is_some())
            .field("state_dir", &self.state_dir)
            .field("outbox_path", &self.outbox_path)
            .field("listen_addr", &self.listen_addr)
            .finish_non_exhaustive()
    }
}
