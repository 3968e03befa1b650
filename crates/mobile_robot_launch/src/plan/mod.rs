//! Launch plan: descriptors, dependency graph and builder

mod builder;
mod descriptor;
mod graph;

pub use builder::*;
pub use descriptor::*;
pub use graph::*;

use crate::description::{DescriptionError, RobotSummary};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Descriptor names
pub const SIMULATOR: &str = "simulator";
pub const SPAWN: &str = "spawn";
pub const PUBLISHER: &str = "robot_state_publisher";
pub const BRIDGE: &str = "bridge";

/// Parameter values longer than this are elided in the text rendering
const DISPLAY_VALUE_LIMIT: usize = 80;

/// The complete launch plan, immutable once built
#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    /// Descriptors in declared order
    pub descriptors: Vec<LaunchDescriptor>,
    /// Descriptor names in dependency order
    pub execution_order: Vec<String>,
    pub bridge_config: PathBuf,
    /// Template the robot description was expanded from
    pub source: PathBuf,
    pub robot: RobotSummary,
}

impl LaunchPlan {
    pub fn descriptor(&self, name: &str) -> Option<&LaunchDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Descriptors in dependency order
    pub fn in_execution_order(&self) -> impl Iterator<Item = &LaunchDescriptor> {
        self.execution_order
            .iter()
            .filter_map(|name| self.descriptor(name))
    }

    /// The embedded robot description
    pub fn robot_description(&self) -> Option<&str> {
        self.descriptor(PUBLISHER)
            .and_then(|d| d.parameters.get("robot_description"))
            .and_then(ParamValue::as_text)
    }
}

/// Errors that can occur while building a plan
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Description(#[from] DescriptionError),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid dependency graph: {0}")]
    Graph(#[from] GraphError),
}

impl PlanError {
    /// A package, description file or bridge configuration is missing
    pub fn is_resource_not_found(&self) -> bool {
        match self {
            PlanError::ResourceNotFound(_) => true,
            PlanError::Description(e) => e.is_resource_not_found(),
            PlanError::Graph(_) => false,
        }
    }
}

/// Display the launch plan in a human-readable format
impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;

        writeln!(f, "Robot: {}", self.robot.name)?;
        writeln!(f, "  Source: {}", self.source.display())?;
        writeln!(
            f,
            "  Links: {}, joints: {}, plugins: {}, sensors: {}",
            self.robot.links.len(),
            self.robot.joints.len(),
            self.robot.plugins.len(),
            self.robot.sensors.len()
        )?;
        writeln!(f, "Bridge config: {}", self.bridge_config.display())?;
        writeln!(f)?;

        writeln!(f, "Descriptors (in declared order):")?;
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            writeln!(f)?;
            let kind = match descriptor.kind {
                DescriptorKind::IncludeLaunch => "include",
                DescriptorKind::Node => "node",
            };
            writeln!(f, "  {}. {} [{}]", i + 1, descriptor.name, kind)?;
            writeln!(
                f,
                "     Executable: {}/{}",
                descriptor.package, descriptor.executable
            )?;

            if !descriptor.arguments.is_empty() {
                writeln!(f, "     Arguments: {}", descriptor.arguments.join(" "))?;
            }
            if !descriptor.launch_arguments.is_empty() {
                writeln!(f, "     Launch arguments:")?;
                for (key, value) in &descriptor.launch_arguments {
                    writeln!(f, "       {}:={}", key, value)?;
                }
            }
            if !descriptor.parameters.is_empty() {
                writeln!(f, "     Parameters:")?;
                for (key, value) in &descriptor.parameters {
                    writeln!(f, "       {}: {}", key, abbreviate(&value.as_str()))?;
                }
            }
            if !descriptor.depends_on.is_empty() {
                let deps: Vec<String> = descriptor
                    .depends_on
                    .iter()
                    .map(|d| format!("{} ({})", d.target, d.condition))
                    .collect();
                writeln!(f, "     Depends on: {}", deps.join(", "))?;
            }
            if let Some(retry) = &descriptor.retry {
                writeln!(
                    f,
                    "     Retry: {} attempts, backoff {}ms..{}ms",
                    retry.max_attempts, retry.initial_backoff_ms, retry.max_backoff_ms
                )?;
            }
            if descriptor.on_exit == OnExit::Shutdown {
                writeln!(f, "     On exit: shutdown")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Execution order: {}", self.execution_order.join(" -> "))?;

        Ok(())
    }
}

fn abbreviate(value: &str) -> String {
    if value.len() <= DISPLAY_VALUE_LIMIT && !value.contains('\n') {
        return value.to_string();
    }
    format!("<{} bytes, {} lines>", value.len(), value.lines().count())
}
