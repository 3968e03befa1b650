//! Mobile Robot Launch
//!
//! Expands a xacro robot description and plans the Gazebo launch of a
//! simulated differential-drive robot.
//!
//! # Overview
//!
//! The crate allows you to:
//! - Locate a package's share directory through an injected [`PackageLocator`]
//! - Expand a xacro template (properties, args, macros, conditionals,
//!   includes) into a plain URDF document
//! - Build the launch plan: simulator bootstrap, model spawner, state
//!   publisher and transport bridge, with explicit dependency edges
//! - Start the plan through the `ros2` CLI in dependency order
//!
//! # Example
//!
//! ```no_run
//! use mobile_robot_launch::{AmentIndex, LaunchSettings, PlanBuilder};
//!
//! let settings = LaunchSettings::default();
//! let index = AmentIndex::from_env();
//! let plan = PlanBuilder::new(&settings, &index).build()?;
//! println!("{}", plan);
//! # Ok::<(), mobile_robot_launch::PlanError>(())
//! ```

pub mod cli;
pub mod config;
pub mod description;
pub mod plan;
pub mod runtime;

pub use cli::{LaunchArgs, PlanFormat};
pub use config::{
    ExecutorSettings, LaunchSettings, RetryPolicy, SettingsError, SimulatorSettings, SpawnSettings,
};
pub use description::{
    AmentIndex, DescriptionError, DescriptionResolver, LayeredLocator, PackageLocator,
    PackageMap, ResolvedDescription, RobotSummary, TemplateError,
};
pub use plan::{
    Dependency, DependencyCondition, DependencyGraph, DescriptorKind, GraphError, LaunchDescriptor,
    LaunchPlan, OnExit, ParamValue, PlanBuilder, PlanError,
};
pub use runtime::{
    Executor, ExecutorConfig, ExecutorError, ManagedProcess, ProcessConfig, ProcessError,
    ProcessEvent, ProcessStatus,
};
