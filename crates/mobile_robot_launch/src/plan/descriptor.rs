//! Launch descriptor definitions

use crate::config::RetryPolicy;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Node parameter values can be booleans, numbers or strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::String(s) => s.clone(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    /// Include another launch description (`ros2 launch`)
    IncludeLaunch,
    /// Run a single node executable (`ros2 run`)
    Node,
}

/// What happens to the rest of the plan when this process exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExit {
    #[default]
    Continue,
    Shutdown,
}

/// Condition for a dependency to be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCondition {
    /// Process has started
    Started,
    /// Process has been running for a while
    Healthy,
}

impl fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyCondition::Started => f.write_str("started"),
            DependencyCondition::Healthy => f.write_str("healthy"),
        }
    }
}

/// Edge from a descriptor to one it waits on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub target: String,
    pub condition: DependencyCondition,
}

/// One external process invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchDescriptor {
    pub name: String,
    pub kind: DescriptorKind,
    pub package: String,
    /// Node executable, or launch file name for includes
    pub executable: String,
    /// Command-line arguments, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    /// Launch arguments of an included launch file, in order
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub launch_arguments: IndexMap<String, String>,
    /// Node parameters, in order
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ParamValue>,
    pub on_exit: OnExit,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl LaunchDescriptor {
    /// A node descriptor (`ros2 run <package> <executable>`)
    pub fn node(
        name: impl Into<String>,
        package: impl Into<String>,
        executable: impl Into<String>,
    ) -> Self {
        Self::new(name, DescriptorKind::Node, package, executable)
    }

    /// An included launch file (`ros2 launch <package> <launch_file>`)
    pub fn include(
        name: impl Into<String>,
        package: impl Into<String>,
        launch_file: impl Into<String>,
    ) -> Self {
        Self::new(name, DescriptorKind::IncludeLaunch, package, launch_file)
    }

    fn new(
        name: impl Into<String>,
        kind: DescriptorKind,
        package: impl Into<String>,
        executable: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            package: package.into(),
            executable: executable.into(),
            arguments: Vec::new(),
            launch_arguments: IndexMap::new(),
            parameters: IndexMap::new(),
            on_exit: OnExit::default(),
            depends_on: Vec::new(),
            retry: None,
        }
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    pub fn with_launch_argument(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.launch_arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_on_exit(mut self, on_exit: OnExit) -> Self {
        self.on_exit = on_exit;
        self
    }

    pub fn depends_on(mut self, target: impl Into<String>, condition: DependencyCondition) -> Self {
        self.depends_on.push(Dependency {
            target: target.into(),
            condition,
        });
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Value of the argument following `flag`, e.g. `-name` in `-name bot1`
    pub fn argument_value(&self, flag: &str) -> Option<&str> {
        self.arguments
            .iter()
            .position(|arg| arg == flag)
            .and_then(|i| self.arguments.get(i + 1))
            .map(String::as_str)
    }

    /// ROS 2 parameters file carrying the node parameters, applied to
    /// whatever name the node ends up with
    pub fn params_file_yaml(&self) -> Result<String, serde_yaml::Error> {
        let mut section = IndexMap::new();
        section.insert("ros__parameters", &self.parameters);
        let mut root = IndexMap::new();
        root.insert("/**", section);
        serde_yaml::to_string(&root)
    }

    /// Program and argument vector that start this descriptor through `ros2`.
    ///
    /// Node parameters travel only through `params_file`, which must hold
    /// [`Self::params_file_yaml`]. Values such as a whole robot description
    /// do not fit a single command-line argument.
    pub fn command(&self, ros2: &str, params_file: Option<&Path>) -> (String, Vec<String>) {
        let mut args = Vec::new();

        match self.kind {
            DescriptorKind::IncludeLaunch => {
                args.push("launch".to_string());
                args.push(self.package.clone());
                args.push(self.executable.clone());
                args.extend(
                    self.launch_arguments
                        .iter()
                        .map(|(key, value)| format!("{}:={}", key, value)),
                );
            }
            DescriptorKind::Node => {
                args.push("run".to_string());
                args.push(self.package.clone());
                args.push(self.executable.clone());
                args.extend(self.arguments.iter().cloned());
                if let Some(path) = params_file {
                    args.push("--ros-args".to_string());
                    args.push("--params-file".to_string());
                    args.push(path.display().to_string());
                }
            }
        }

        (ros2.to_string(), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_command() {
        let descriptor = LaunchDescriptor::include("simulator", "ros_gz_sim", "gz_sim.launch.py")
            .with_launch_argument("gz_args", "-r -v4 empty.sdf")
            .with_launch_argument("on_exit_shutdown", "true")
            .with_on_exit(OnExit::Shutdown);

        let (program, args) = descriptor.command("ros2", None);
        assert_eq!(program, "ros2");
        assert_eq!(
            args,
            vec![
                "launch",
                "ros_gz_sim",
                "gz_sim.launch.py",
                "gz_args:=-r -v4 empty.sdf",
                "on_exit_shutdown:=true",
            ]
        );
    }

    fn publisher(description: &str) -> LaunchDescriptor {
        LaunchDescriptor::node(
            "robot_state_publisher",
            "robot_state_publisher",
            "robot_state_publisher",
        )
        .with_parameter("robot_description", description)
        .with_parameter("use_sim_time", true)
    }

    #[test]
    fn test_node_command_reads_params_file() {
        let descriptor = publisher("<robot name=\"bot1\"/>");

        let (_, args) = descriptor.command("ros2", Some(Path::new("/tmp/params.yaml")));
        assert_eq!(
            args,
            vec![
                "run",
                "robot_state_publisher",
                "robot_state_publisher",
                "--ros-args",
                "--params-file",
                "/tmp/params.yaml",
            ]
        );

        let (_, args) = descriptor.command("ros2", None);
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_params_file_keeps_text_verbatim() {
        // YAML-significant sequences must survive unchanged
        let description = "<robot name=\"bot1\">\n  <link name=\"a: b # c\"/>\n</robot>";
        let yaml = publisher(description).params_file_yaml().unwrap();

        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let params = &doc["/**"]["ros__parameters"];
        assert_eq!(params["robot_description"].as_str(), Some(description));
        assert_eq!(params["use_sim_time"].as_bool(), Some(true));
    }

    #[test]
    fn test_argument_value() {
        let descriptor = LaunchDescriptor::node("spawn", "ros_gz_sim", "create")
            .with_arguments(["-name", "bot1", "-topic", "robot_description"]);
        assert_eq!(descriptor.argument_value("-name"), Some("bot1"));
        assert_eq!(descriptor.argument_value("-topic"), Some("robot_description"));
        assert_eq!(descriptor.argument_value("-file"), None);
    }
}
