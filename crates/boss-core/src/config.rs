use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "ecs-boss.yaml";
pub const DEFAULT_TASK_FILE: &str = "task-def.json";
pub const DEFAULT_SERVICE_FILE: &str = "service.json";

// ---------------------------------------------------------------------------
// StabilizeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizeConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl StabilizeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> ecs_client::RetryPolicy {
        ecs_client::RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Project settings from `ecs-boss.yaml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default = "default_task_file")]
    pub task_file: PathBuf,
    #[serde(default = "default_service_file")]
    pub service_file: PathBuf,
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub stabilize: StabilizeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_task_file() -> PathBuf {
    PathBuf::from(DEFAULT_TASK_FILE)
}

fn default_service_file() -> PathBuf {
    PathBuf::from(DEFAULT_SERVICE_FILE)
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: None,
            cluster: None,
            task_family: None,
            service_name: None,
            task_file: default_task_file(),
            service_file: default_service_file(),
            build_context: default_build_context(),
            build_args: None,
            region: None,
            stabilize: StabilizeConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load `ecs-boss.yaml` from `root`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(&data)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn task_path(&self, root: &Path) -> PathBuf {
        root.join(&self.task_file)
    }

    pub fn service_path(&self, root: &Path) -> PathBuf {
        root.join(&self.service_file)
    }

    pub fn build_context_path(&self, root: &Path) -> PathBuf {
        root.join(&self.build_context)
    }

    /// Extra `docker build` arguments, split on whitespace.
    pub fn build_arg_list(&self) -> Vec<String> {
        split_build_args(self.build_args.as_deref().unwrap_or_default())
    }
}

pub fn split_build_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
