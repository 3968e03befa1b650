//! Launch settings YAML schema definitions

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// ROS node/entity names: letter or underscore first, then word characters
static ROBOT_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Root launch settings; every field defaults to the stock simulation setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Entity name used when spawning the model
    pub robot_name: String,

    /// Package holding the model and the bridge configuration
    pub package: String,

    /// Template path relative to the package share directory
    pub model_file: String,

    /// Bridge configuration path relative to the package share directory
    pub bridge_config: String,

    /// Topic the spawner reads the description from
    pub description_topic: String,

    pub use_sim_time: bool,

    pub simulator: SimulatorSettings,

    pub spawn: SpawnSettings,

    pub executor: ExecutorSettings,

    /// Template argument overrides (`xacro:arg`)
    pub xacro_args: IndexMap<String, String>,

    /// Command used to start launch files and nodes
    pub ros2_command: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            robot_name: "differential_drive_robot".to_string(),
            package: "mobile_robot".to_string(),
            model_file: "model/robot.xacro".to_string(),
            bridge_config: "parameters/bridge_parameters.yaml".to_string(),
            description_topic: "robot_description".to_string(),
            use_sim_time: true,
            simulator: SimulatorSettings::default(),
            spawn: SpawnSettings::default(),
            executor: ExecutorSettings::default(),
            xacro_args: IndexMap::new(),
            ros2_command: "ros2".to_string(),
        }
    }
}

/// Simulator bootstrap settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub package: String,
    pub launch_file: String,
    pub world: String,
    /// Simulator console verbosity, 0 to 4
    pub verbosity: u8,
    /// Start the simulation unpaused (`-r`)
    pub run_on_start: bool,
    /// Shut the whole launch down when the simulator exits
    pub shutdown_on_exit: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            package: "ros_gz_sim".to_string(),
            launch_file: "gz_sim.launch.py".to_string(),
            world: "empty.sdf".to_string(),
            verbosity: 4,
            run_on_start: true,
            shutdown_on_exit: true,
        }
    }
}

impl SimulatorSettings {
    /// The `gz_args` launch argument, e.g. `-r -v4 empty.sdf`
    pub fn gz_args(&self) -> String {
        let mut parts = Vec::new();
        if self.run_on_start {
            parts.push("-r".to_string());
        }
        parts.push(format!("-v{}", self.verbosity));
        parts.push(self.world.clone());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for a process that may fail while its
/// dependencies settle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Executor timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Grace period between SIGTERM and SIGKILL
    pub shutdown_timeout_ms: u64,
    /// Uptime after which a process counts as healthy
    pub healthy_after_ms: u64,
    /// Dependency polling interval
    pub poll_interval_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5000,
            healthy_after_ms: 2000,
            poll_interval_ms: 100,
        }
    }
}

impl LaunchSettings {
    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, SettingsError> {
        let settings: LaunchSettings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !ROBOT_NAME_PATTERN.is_match(&self.robot_name) {
            return Err(SettingsError::Validation(format!(
                "robot_name '{}' must start with a letter or underscore and contain only letters, digits and underscores",
                self.robot_name
            )));
        }

        for (field, value) in [
            ("package", &self.package),
            ("model_file", &self.model_file),
            ("bridge_config", &self.bridge_config),
            ("description_topic", &self.description_topic),
            ("simulator.package", &self.simulator.package),
            ("simulator.launch_file", &self.simulator.launch_file),
            ("simulator.world", &self.simulator.world),
            ("ros2_command", &self.ros2_command),
        ] {
            if value.trim().is_empty() {
                return Err(SettingsError::Validation(format!(
                    "'{}' must not be empty",
                    field
                )));
            }
        }

        for (field, value) in [
            ("model_file", &self.model_file),
            ("bridge_config", &self.bridge_config),
        ] {
            if Path::new(value).is_absolute() {
                return Err(SettingsError::Validation(format!(
                    "'{}' must be relative to the package share directory, got '{}'",
                    field, value
                )));
            }
        }

        if self.simulator.verbosity > 4 {
            return Err(SettingsError::Validation(format!(
                "simulator.verbosity must be between 0 and 4, got {}",
                self.simulator.verbosity
            )));
        }

        let retry = &self.spawn.retry;
        if retry.max_attempts == 0 {
            return Err(SettingsError::Validation(
                "spawn.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(SettingsError::Validation(format!(
                "spawn.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                retry.initial_backoff_ms, retry.max_backoff_ms
            )));
        }

        if self.executor.poll_interval_ms == 0 {
            return Err(SettingsError::Validation(
                "executor.poll_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
