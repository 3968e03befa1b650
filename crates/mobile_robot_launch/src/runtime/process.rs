//! Managed process abstraction

use crate::plan::LaunchDescriptor;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Process is pending start
    Pending,
    /// Process is starting
    Starting,
    /// Process is running
    Running,
    /// Process has stopped with exit code
    Stopped(Option<i32>),
    /// Process failed to start
    Failed,
}

impl ProcessStatus {
    /// Check if process is running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running | ProcessStatus::Starting)
    }

    /// Check if process has stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, ProcessStatus::Stopped(_) | ProcessStatus::Failed)
    }
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Descriptor name (for logging)
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessConfig {
    /// Invocation of `descriptor` through the `ros2` command line.
    ///
    /// Node parameters are written to `<params_dir>/<name>.yaml` and passed
    /// with `--params-file`.
    pub fn from_descriptor(
        descriptor: &LaunchDescriptor,
        ros2: &str,
        params_dir: &Path,
    ) -> io::Result<Self> {
        let params_file = if descriptor.parameters.is_empty() {
            None
        } else {
            let yaml = descriptor.params_file_yaml().map_err(io::Error::other)?;
            let path = params_dir.join(format!("{}.yaml", descriptor.name));
            std::fs::write(&path, yaml)?;
            log::debug!("[{}] Parameters written to {}", descriptor.name, path.display());
            Some(path)
        };

        let (program, args) = descriptor.command(ros2, params_file.as_deref());
        Ok(Self {
            name: descriptor.name.clone(),
            program,
            args,
        })
    }

    /// Command line for logging, with long arguments shortened
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.len() > 120 || arg.contains('\n') {
                let key = arg.split(":=").next().unwrap_or_default();
                parts.push(format!("{}:=<{} bytes>", key, arg.len()));
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Event emitted by a managed process
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Process started
    Started { pid: u32 },
    /// Process output line (stdout or stderr)
    Output { line: String, is_stderr: bool },
    /// Process exited
    Exited { code: Option<i32> },
    /// Process failed to start
    Failed { error: String },
}

type EventSender = mpsc::UnboundedSender<(String, ProcessEvent)>;

/// A managed child process
pub struct ManagedProcess {
    pub config: ProcessConfig,
    pub status: ProcessStatus,
    /// Process ID (if running)
    pub pid: Option<u32>,
    pub started_at: Option<Instant>,
    /// Number of starts after the first one
    pub restart_count: u32,
    child: Option<Child>,
    event_tx: Option<EventSender>,
}

impl ManagedProcess {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            status: ProcessStatus::Pending,
            pid: None,
            started_at: None,
            restart_count: 0,
            child: None,
            event_tx: None,
        }
    }

    /// Set the event sender for this process
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Total number of start attempts so far
    pub fn attempts(&self) -> u32 {
        match self.status {
            ProcessStatus::Pending => 0,
            _ => self.restart_count + 1,
        }
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send((self.config.name.clone(), event));
        }
    }

    /// Start the process; starting a stopped process counts as a restart
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        if self.status.is_running() {
            return Err(ProcessError::AlreadyRunning(self.config.name.clone()));
        }
        if self.status.is_stopped() {
            self.restart_count += 1;
        }

        self.status = ProcessStatus::Starting;
        log::info!(
            "[{}] Starting: {}",
            self.config.name,
            self.config.display_command()
        );

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id().unwrap_or(0);
                self.pid = Some(pid);
                self.status = ProcessStatus::Running;
                self.started_at = Some(Instant::now());
                self.emit(ProcessEvent::Started { pid });

                if let Some(tx) = &self.event_tx {
                    if let Some(stdout) = child.stdout.take() {
                        forward_lines(stdout, self.config.name.clone(), false, tx.clone());
                    }
                    if let Some(stderr) = child.stderr.take() {
                        forward_lines(stderr, self.config.name.clone(), true, tx.clone());
                    }
                }

                self.child = Some(child);
                Ok(())
            }
            Err(e) => {
                self.status = ProcessStatus::Failed;
                let error = format!("Failed to spawn process: {}", e);
                log::error!("[{}] {}", self.config.name, error);
                self.emit(ProcessEvent::Failed { error });

                Err(ProcessError::SpawnFailed {
                    name: self.config.name.clone(),
                    source: e,
                })
            }
        }
    }

    /// Stop the process gracefully (SIGTERM, then SIGKILL after timeout)
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.take() else {
            return Err(ProcessError::NotRunning(self.config.name.clone()));
        };

        log::info!("[{}] Stopping process...", self.config.name);

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                signal(pid, nix::sys::signal::Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let code = status.code();
                self.status = ProcessStatus::Stopped(code);
                log::info!("[{}] Process exited with code: {:?}", self.config.name, code);
                self.emit(ProcessEvent::Exited { code });
            }
            Ok(Err(e)) => {
                log::error!("[{}] Error waiting for process: {}", self.config.name, e);
                self.status = ProcessStatus::Stopped(None);
            }
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.config.name
                );
                if let Err(e) = child.kill().await {
                    log::error!("[{}] Failed to kill process: {}", self.config.name, e);
                }
                self.status = ProcessStatus::Stopped(None);
                self.emit(ProcessEvent::Exited { code: None });
            }
        }

        self.pid = None;
        Ok(())
    }

    /// Check if the process is still running
    pub async fn check_status(&mut self) -> ProcessStatus {
        if let Some(child) = &mut self.child {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code();
                    self.status = ProcessStatus::Stopped(code);
                    self.pid = None;
                    self.child = None;
                    self.emit(ProcessEvent::Exited { code });
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!(
                        "[{}] Error checking process status: {}",
                        self.config.name,
                        e
                    );
                }
            }
        }

        self.status
    }

    /// Running for at least `threshold`
    pub fn is_healthy(&self, threshold: Duration) -> bool {
        self.status == ProcessStatus::Running && self.uptime().is_some_and(|t| t >= threshold)
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Option<Duration> {
        match self.status {
            ProcessStatus::Running => self.started_at.map(|t| t.elapsed()),
            _ => None,
        }
    }
}

fn forward_lines<R>(stream: R, name: String, is_stderr: bool, tx: EventSender)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx.send((name.clone(), ProcessEvent::Output { line, is_stderr }));
        }
    });
}

#[cfg(unix)]
fn signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if let Ok(raw) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(raw), signal);
    }
}

/// Errors that can occur with managed processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn process '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process '{0}' is not running")]
    NotRunning(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(program: &str, args: &[&str]) -> ProcessConfig {
        ProcessConfig {
            name: "test".to_string(),
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_config_from_descriptor() {
        let dir = tempfile::TempDir::new().unwrap();
        let descriptor = LaunchDescriptor::node("spawn", "ros_gz_sim", "create")
            .with_arguments(["-name", "bot1"]);
        let config = ProcessConfig::from_descriptor(&descriptor, "ros2", dir.path()).unwrap();
        assert_eq!(config.name, "spawn");
        assert_eq!(config.program, "ros2");
        assert_eq!(config.args, vec!["run", "ros_gz_sim", "create", "-name", "bot1"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_large_parameters_go_through_params_file() {
        let dir = tempfile::TempDir::new().unwrap();
        // Larger than the 128 KiB limit on a single argument
        let description = format!(
            "<robot name=\"bot1\">{}</robot>",
            "<link name=\"l\"/>".repeat(10_000)
        );
        let descriptor = LaunchDescriptor::node(
            "robot_state_publisher",
            "robot_state_publisher",
            "robot_state_publisher",
        )
        .with_parameter("robot_description", description.as_str())
        .with_parameter("use_sim_time", true);

        let config = ProcessConfig::from_descriptor(&descriptor, "ros2", dir.path()).unwrap();
        let params_file = dir.path().join("robot_state_publisher.yaml");
        assert_eq!(
            config.args[3..],
            [
                "--ros-args".to_string(),
                "--params-file".to_string(),
                params_file.display().to_string(),
            ]
        );
        assert!(config.args.iter().all(|arg| arg.len() < 4096));

        let yaml = std::fs::read_to_string(&params_file).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            doc["/**"]["ros__parameters"]["robot_description"].as_str(),
            Some(description.as_str())
        );
    }

    #[test]
    fn test_display_command_shortens_long_values() {
        let long = format!("robot_description:={}", "x".repeat(500));
        let config = config("ros2", &["run", "pkg", "exe", "-p", &long]);
        assert_eq!(
            config.display_command(),
            "ros2 run pkg exe -p robot_description:=<519 bytes>"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_lifecycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut process = ManagedProcess::new(config("sleep", &["30"])).with_event_sender(tx);
        assert_eq!(process.attempts(), 0);

        process.start().await.unwrap();
        assert_eq!(process.check_status().await, ProcessStatus::Running);
        assert!(matches!(
            process.start().await,
            Err(ProcessError::AlreadyRunning(_))
        ));
        assert!(process.is_healthy(Duration::ZERO));
        assert!(!process.is_healthy(Duration::from_secs(3600)));

        process.stop(Duration::from_secs(5)).await.unwrap();
        assert!(process.status.is_stopped());
        assert!(matches!(
            process.stop(Duration::from_secs(1)).await,
            Err(ProcessError::NotRunning(_))
        ));

        let (_, event) = rx.recv().await.unwrap();
        assert!(matches!(event, ProcessEvent::Started { .. }));

        process.start().await.unwrap();
        assert_eq!(process.restart_count, 1);
        assert_eq!(process.attempts(), 2);
        process.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut process = ManagedProcess::new(config("/nonexistent/ros2", &[]));
        assert!(matches!(
            process.start().await,
            Err(ProcessError::SpawnFailed { .. })
        ));
        assert_eq!(process.status, ProcessStatus::Failed);
    }
}
