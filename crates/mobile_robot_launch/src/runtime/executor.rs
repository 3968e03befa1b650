//! Launch executor: starts the plan in dependency order and supervises it

use crate::config::ExecutorSettings;
use crate::plan::{
    DependencyCondition, DependencyGraph, GraphError, LaunchDescriptor, LaunchPlan, OnExit,
};
use crate::runtime::process::{
    ManagedProcess, ProcessConfig, ProcessError, ProcessEvent, ProcessStatus,
};
use indexmap::IndexMap;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

/// Launch executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Program used to run launch files and nodes
    pub ros2_command: String,
    /// Grace period between SIGTERM and SIGKILL
    pub shutdown_timeout: Duration,
    /// Uptime after which a process satisfies a `healthy` dependency
    pub healthy_after: Duration,
    /// Interval between dependency and status checks
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from_settings(&ExecutorSettings::default(), "ros2")
    }
}

impl ExecutorConfig {
    pub fn from_settings(settings: &ExecutorSettings, ros2_command: &str) -> Self {
        Self {
            ros2_command: ros2_command.to_string(),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
            healthy_after: Duration::from_millis(settings.healthy_after_ms),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }
}

/// Launch executor state
pub struct Executor {
    config: ExecutorConfig,
    /// Descriptors keyed by name, in execution order
    descriptors: IndexMap<String, LaunchDescriptor>,
    /// Managed processes, in execution order
    processes: IndexMap<String, ManagedProcess>,
    /// Restarts waiting for their backoff to elapse
    pending_retries: IndexMap<String, Instant>,
    event_rx: mpsc::UnboundedReceiver<(String, ProcessEvent)>,
    /// Node parameter files, removed on shutdown
    params_dir: Option<TempDir>,
}

impl Executor {
    /// Create an executor for `plan`; no process is started yet
    pub fn new(plan: &LaunchPlan, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        let graph = DependencyGraph::build(&plan.descriptors)?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let params_dir = tempfile::Builder::new()
            .prefix("mobile_robot_launch-")
            .tempdir()
            .map_err(ExecutorError::ParamsDir)?;

        let mut descriptors = IndexMap::new();
        let mut processes = IndexMap::new();
        for &index in graph.execution_order() {
            let descriptor = &plan.descriptors[index];
            let process_config =
                ProcessConfig::from_descriptor(descriptor, &config.ros2_command, params_dir.path())
                    .map_err(|source| ExecutorError::ParamsFile {
                        node: descriptor.name.clone(),
                        source,
                    })?;
            let process = ManagedProcess::new(process_config).with_event_sender(event_tx.clone());

            processes.insert(descriptor.name.clone(), process);
            descriptors.insert(descriptor.name.clone(), descriptor.clone());
        }

        Ok(Self {
            config,
            descriptors,
            processes,
            pending_retries: IndexMap::new(),
            event_rx,
            params_dir: Some(params_dir),
        })
    }

    /// Start every process in execution order, waiting for each dependency
    /// to reach its condition first
    pub async fn launch(&mut self, shutdown_rx: watch::Receiver<()>) -> Result<(), ExecutorError> {
        log::info!("Launching {} processes...", self.processes.len());

        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names {
            if shutdown_rx.has_changed().unwrap_or(false) {
                log::info!("Shutdown requested, aborting launch");
                return Err(ExecutorError::Aborted);
            }

            let dependencies = self
                .descriptors
                .get(&name)
                .map(|d| d.depends_on.clone())
                .unwrap_or_default();
            for dep in dependencies {
                self.wait_for(&name, &dep.target, dep.condition, &shutdown_rx)
                    .await?;
            }

            if let Some(process) = self.processes.get_mut(&name) {
                process
                    .start()
                    .await
                    .map_err(|source| ExecutorError::ProcessFailed {
                        node: name.clone(),
                        source,
                    })?;
            }
        }

        log::info!("All processes launched");
        Ok(())
    }

    async fn wait_for(
        &mut self,
        node: &str,
        dependency: &str,
        condition: DependencyCondition,
        shutdown_rx: &watch::Receiver<()>,
    ) -> Result<(), ExecutorError> {
        let healthy_after = self.config.healthy_after;
        let mut logged = false;

        loop {
            let process = self.processes.get_mut(dependency).ok_or_else(|| {
                ExecutorError::Graph(GraphError::UnknownDependency {
                    node: node.to_string(),
                    dependency: dependency.to_string(),
                })
            })?;

            let status = process.check_status().await;
            let satisfied = match condition {
                DependencyCondition::Started => status.is_running(),
                DependencyCondition::Healthy => process.is_healthy(healthy_after),
            };
            if satisfied {
                return Ok(());
            }
            if status.is_stopped() {
                return Err(ExecutorError::DependencyFailed {
                    node: node.to_string(),
                    dependency: dependency.to_string(),
                });
            }
            if shutdown_rx.has_changed().unwrap_or(false) {
                return Err(ExecutorError::Aborted);
            }

            if !logged {
                log::debug!("[{}] Waiting for '{}' to be {}", node, dependency, condition);
                logged = true;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Supervise until a shutdown signal, the exit of a process whose exit
    /// shuts the launch down, or the exit of every process
    pub async fn wait(&mut self, mut shutdown_rx: watch::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    log::info!("Shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => {
                    let Some((name, event)) = event else { continue };
                    if self.handle_event(&name, event) {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.start_due_retries().await;

                    let mut all_stopped = self.pending_retries.is_empty();
                    for process in self.processes.values_mut() {
                        if process.check_status().await.is_running() {
                            all_stopped = false;
                        }
                    }
                    if all_stopped {
                        log::info!("All processes have stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Log an event; returns true when the launch should shut down
    fn handle_event(&mut self, name: &str, event: ProcessEvent) -> bool {
        match event {
            ProcessEvent::Output { line, is_stderr } => {
                if is_stderr {
                    log::warn!("[{}] {}", name, line);
                } else {
                    log::info!("[{}] {}", name, line);
                }
            }
            ProcessEvent::Started { pid } => {
                log::info!("[{}] Process started with PID: {}", name, pid);
            }
            ProcessEvent::Failed { error } => {
                log::error!("[{}] Process failed: {}", name, error);
            }
            ProcessEvent::Exited { code } => {
                log::info!("[{}] Process exited with code: {:?}", name, code);

                let on_exit = self.descriptors.get(name).map(|d| d.on_exit);
                if on_exit == Some(OnExit::Shutdown) {
                    log::info!("[{}] Exit shuts down the launch", name);
                    return true;
                }
                if code != Some(0) {
                    self.schedule_retry(name);
                }
            }
        }
        false
    }

    fn schedule_retry(&mut self, name: &str) {
        let Some(policy) = self.descriptors.get(name).and_then(|d| d.retry) else {
            return;
        };
        let attempts = self.processes.get(name).map_or(0, ManagedProcess::attempts);

        if attempts >= policy.max_attempts {
            log::error!("[{}] Giving up after {} attempts", name, attempts);
            return;
        }

        let delay = policy.delay(attempts);
        log::warn!(
            "[{}] Attempt {}/{} failed, retrying in {}ms",
            name,
            attempts,
            policy.max_attempts,
            delay.as_millis()
        );
        self.pending_retries
            .insert(name.to_string(), Instant::now() + delay);
    }

    async fn start_due_retries(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .pending_retries
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            self.pending_retries.shift_remove(&name);
            if let Some(process) = self.processes.get_mut(&name) {
                if let Err(e) = process.start().await {
                    log::error!("[{}] Restart failed: {}", name, e);
                }
            }
        }
    }

    /// Shutdown all processes in reverse execution order
    pub async fn shutdown(&mut self) {
        log::info!("Shutting down all processes...");
        self.pending_retries.clear();

        let names: Vec<String> = self.processes.keys().cloned().collect();
        for name in names.into_iter().rev() {
            if let Some(process) = self.processes.get_mut(&name) {
                if process.check_status().await.is_running() {
                    if let Err(e) = process.stop(self.config.shutdown_timeout).await {
                        log::error!("[{}] Error stopping process: {}", name, e);
                    }
                }
            }
        }

        // Drain events emitted while stopping
        while let Ok((name, event)) = self.event_rx.try_recv() {
            if let ProcessEvent::Output { line, .. } = event {
                log::info!("[{}] {}", name, line);
            }
        }

        if let Some(dir) = self.params_dir.take() {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                log::warn!("Failed to remove parameters directory {}: {}", path, e);
            }
        }

        log::info!("All processes shut down");
    }

    /// Get process status summary, in execution order
    pub fn status(&self) -> Vec<(&str, ProcessStatus)> {
        self.processes
            .iter()
            .map(|(name, proc)| (name.as_str(), proc.status))
            .collect()
    }
}

/// Errors that can occur in the executor
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Dependency error: {0}")]
    Graph(#[from] GraphError),

    #[error("Process failed for '{node}': {source}")]
    ProcessFailed {
        node: String,
        #[source]
        source: ProcessError,
    },

    #[error("Dependency '{dependency}' stopped before '{node}' could start")]
    DependencyFailed { node: String, dependency: String },

    #[error("Launch aborted by shutdown request")]
    Aborted,

    #[error("Failed to create parameters directory: {0}")]
    ParamsDir(#[source] std::io::Error),

    #[error("Failed to write parameters file for '{node}': {source}")]
    ParamsFile {
        node: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{LaunchSettings, RetryPolicy};
    use crate::description::{PackageMap, ResolvedDescription, RobotSummary};
    use crate::plan::{PlanBuilder, BRIDGE, PUBLISHER, SIMULATOR, SPAWN};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ros2");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stand-in for `ros2`: `create` exits with `spawn_code`, everything else
    /// runs until stopped, or exits at once when `others_exit` is set
    fn fake_ros2(dir: &Path, spawn_code: i32, others_exit: bool) -> PathBuf {
        let rest = if others_exit { "exit 0" } else { "exec sleep 30" };
        script(
            dir,
            &format!(
                "case \"$3\" in\n  create) exit {} ;;\nesac\n{}",
                spawn_code, rest
            ),
        )
    }

    fn plan(dir: &Path, retry: RetryPolicy) -> LaunchPlan {
        plan_with_description(dir, retry, "<robot name=\"bot1\"/>")
    }

    fn plan_with_description(dir: &Path, retry: RetryPolicy, xml: &str) -> LaunchPlan {
        fs::create_dir_all(dir.join("share/parameters")).unwrap();
        fs::write(dir.join("share/parameters/bridge_parameters.yaml"), "[]\n").unwrap();
        let map = PackageMap::new().with_package("mobile_robot", dir.join("share"));

        let mut settings = LaunchSettings::default();
        settings.spawn.retry = retry;

        let description = ResolvedDescription {
            package: "mobile_robot".to_string(),
            source: PathBuf::from("model/robot.xacro"),
            xml: xml.to_string(),
            summary: RobotSummary::from_xml(xml).unwrap(),
        };
        PlanBuilder::new(&settings, &map)
            .build_with(description)
            .unwrap()
    }

    fn config(ros2: &Path) -> ExecutorConfig {
        ExecutorConfig {
            ros2_command: ros2.display().to_string(),
            shutdown_timeout: Duration::from_secs(2),
            healthy_after: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_launch_in_execution_order() {
        let dir = TempDir::new().unwrap();
        let ros2 = fake_ros2(dir.path(), 0, false);
        let plan = plan(dir.path(), RetryPolicy::default());

        let mut executor = Executor::new(&plan, config(&ros2)).unwrap();
        let names: Vec<_> = executor.status().iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec![SIMULATOR, PUBLISHER, SPAWN, BRIDGE]);

        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        executor.launch(shutdown_rx).await.unwrap();

        for (name, status) in executor.status() {
            if name != SPAWN {
                assert_eq!(status, ProcessStatus::Running, "{}", name);
            }
        }

        executor.shutdown().await;
        assert!(executor.status().iter().all(|(_, s)| s.is_stopped()));
    }

    #[tokio::test]
    async fn test_dependency_failure_stops_launch() {
        let dir = TempDir::new().unwrap();
        let ros2 = fake_ros2(dir.path(), 0, true);
        let plan = plan(dir.path(), RetryPolicy::default());

        let mut executor = Executor::new(&plan, config(&ros2)).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        let result = executor.launch(shutdown_rx).await;

        assert!(matches!(
            result,
            Err(ExecutorError::DependencyFailed { ref node, .. }) if node == SPAWN
        ));
        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_spawn_is_retried_then_abandoned() {
        let dir = TempDir::new().unwrap();
        let ros2 = fake_ros2(dir.path(), 1, false);
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
        };
        let plan = plan(dir.path(), retry);

        let mut executor = Executor::new(&plan, config(&ros2)).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        executor.launch(shutdown_rx.clone()).await.unwrap();

        let supervise = executor.wait(shutdown_rx);
        let stop = async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let _ = shutdown_tx.send(());
        };
        tokio::join!(supervise, stop);

        let spawn = &executor.processes[SPAWN];
        assert_eq!(spawn.attempts(), 3);
        assert_eq!(spawn.status, ProcessStatus::Stopped(Some(1)));

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_simulator_exit_shuts_down_launch() {
        let dir = TempDir::new().unwrap();
        // `ros2 launch` (the simulator) quits after a second, nodes keep running
        let ros2 = script(
            dir.path(),
            "case \"$1\" in\n  launch) sleep 1; exit 0 ;;\nesac\n\
             case \"$3\" in\n  create) exit 0 ;;\nesac\nexec sleep 30",
        );
        let plan = plan(dir.path(), RetryPolicy::default());

        let mut executor = Executor::new(&plan, config(&ros2)).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        executor.launch(shutdown_rx.clone()).await.unwrap();
        assert!(executor.processes[BRIDGE].status.is_running());

        let supervised =
            tokio::time::timeout(Duration::from_secs(10), executor.wait(shutdown_rx)).await;
        assert!(supervised.is_ok(), "wait() did not return after the simulator exited");
        assert_eq!(
            executor.processes[SIMULATOR].status,
            ProcessStatus::Stopped(Some(0))
        );

        executor.shutdown().await;
        assert!(executor.status().iter().all(|(_, s)| s.is_stopped()));
    }

    #[tokio::test]
    async fn test_large_description_reaches_publisher() {
        let dir = TempDir::new().unwrap();
        let ros2 = fake_ros2(dir.path(), 0, false);
        let links: String = (0..8000)
            .map(|i| format!("<link name=\"link_{}\"/>", i))
            .collect();
        let xml = format!("<robot name=\"bot1\">{}</robot>", links);
        assert!(xml.len() > 160 * 1024);
        let plan = plan_with_description(dir.path(), RetryPolicy::default(), &xml);

        let mut executor = Executor::new(&plan, config(&ros2)).unwrap();
        let params_dir = executor
            .params_dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap();
        let params = fs::read_to_string(params_dir.join("robot_state_publisher.yaml")).unwrap();
        assert!(params.contains("link_7999"));

        let (_shutdown_tx, shutdown_rx) = watch::channel(());
        executor.launch(shutdown_rx).await.unwrap();
        assert!(executor.processes[PUBLISHER].status.is_running());

        executor.shutdown().await;
        assert!(!params_dir.exists());
    }
}
