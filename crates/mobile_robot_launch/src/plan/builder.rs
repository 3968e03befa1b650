//! Launch plan builder

use crate::config::LaunchSettings;
use crate::description::{DescriptionResolver, PackageLocator, ResolvedDescription};
use crate::plan::descriptor::{DependencyCondition, LaunchDescriptor, OnExit};
use crate::plan::graph::DependencyGraph;
use crate::plan::{LaunchPlan, PlanError, BRIDGE, PUBLISHER, SIMULATOR, SPAWN};
use std::path::PathBuf;

/// Assembles the four-descriptor simulation plan from settings and a
/// resolved robot description
pub struct PlanBuilder<'a> {
    settings: &'a LaunchSettings,
    locator: &'a dyn PackageLocator,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(settings: &'a LaunchSettings, locator: &'a dyn PackageLocator) -> Self {
        Self { settings, locator }
    }

    /// Resolver for the robot description, with the configured template args
    pub fn resolver(&self) -> DescriptionResolver<'a> {
        DescriptionResolver::new(self.locator).with_args(self.settings.xacro_args.clone())
    }

    /// Resolve the configured model and build the plan
    pub fn build(&self) -> Result<LaunchPlan, PlanError> {
        let description = self
            .resolver()
            .resolve(&self.settings.package, &self.settings.model_file)?;
        self.build_with(description)
    }

    /// Build the plan around an already resolved description
    pub fn build_with(&self, description: ResolvedDescription) -> Result<LaunchPlan, PlanError> {
        let bridge_config = self.bridge_config_path()?;
        let settings = self.settings;

        if description.robot_name() != settings.robot_name {
            log::debug!(
                "Spawning entity '{}' from description of robot '{}'",
                settings.robot_name,
                description.robot_name()
            );
        }

        let simulator = LaunchDescriptor::include(
            SIMULATOR,
            &settings.simulator.package,
            &settings.simulator.launch_file,
        )
        .with_launch_argument("gz_args", settings.simulator.gz_args())
        .with_launch_argument(
            "on_exit_shutdown",
            settings.simulator.shutdown_on_exit.to_string(),
        )
        .with_on_exit(if settings.simulator.shutdown_on_exit {
            OnExit::Shutdown
        } else {
            OnExit::Continue
        });

        // The spawner reads the description from the publisher's topic
        let spawn = LaunchDescriptor::node(SPAWN, &settings.simulator.package, "create")
            .with_arguments([
                "-name",
                settings.robot_name.as_str(),
                "-topic",
                settings.description_topic.as_str(),
            ])
            .depends_on(SIMULATOR, DependencyCondition::Started)
            .depends_on(PUBLISHER, DependencyCondition::Healthy)
            .with_retry(settings.spawn.retry);

        let publisher =
            LaunchDescriptor::node(PUBLISHER, "robot_state_publisher", "robot_state_publisher")
                .with_parameter("robot_description", description.xml.clone())
                .with_parameter("use_sim_time", settings.use_sim_time);

        let bridge = LaunchDescriptor::node(BRIDGE, "ros_gz_bridge", "parameter_bridge")
            .with_arguments([
                "--ros-args".to_string(),
                "-p".to_string(),
                format!("config_file:={}", bridge_config.display()),
            ]);

        let descriptors = vec![simulator, spawn, publisher, bridge];
        let graph = DependencyGraph::build(&descriptors)?;
        let execution_order = graph.launch_order().map(str::to_string).collect();

        Ok(LaunchPlan {
            descriptors,
            execution_order,
            bridge_config,
            robot: description.summary,
            source: description.source,
        })
    }

    /// Bridge configuration path; must exist on disk
    pub fn bridge_config_path(&self) -> Result<PathBuf, PlanError> {
        let share_dir = self.locator.share_dir(&self.settings.package).ok_or_else(|| {
            PlanError::ResourceNotFound(format!("package '{}'", self.settings.package))
        })?;

        let path = share_dir.join(&self.settings.bridge_config);
        if !path.exists() {
            return Err(PlanError::ResourceNotFound(format!(
                "bridge configuration {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{PackageMap, RobotSummary};
    use crate::plan::descriptor::{DescriptorKind, ParamValue};
    use std::fs;
    use tempfile::TempDir;

    fn package_tree() -> (TempDir, PackageMap) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("parameters")).unwrap();
        fs::write(
            dir.path().join("parameters/bridge_parameters.yaml"),
            "- ros_topic_name: clock\n",
        )
        .unwrap();
        let map = PackageMap::new().with_package("mobile_robot", dir.path());
        (dir, map)
    }

    fn description(xml: &str) -> ResolvedDescription {
        ResolvedDescription {
            package: "mobile_robot".to_string(),
            source: PathBuf::from("model/robot.xacro"),
            xml: xml.to_string(),
            summary: RobotSummary::from_xml(xml).unwrap(),
        }
    }

    #[test]
    fn test_build_with_description() {
        let (dir, map) = package_tree();
        let settings = LaunchSettings::default();
        let xml = "<?xml version=\"1.0\"?>\n<robot name=\"bot1\">\n  <link name=\"base_link\"/>\n</robot>";

        let plan = PlanBuilder::new(&settings, &map)
            .build_with(description(xml))
            .unwrap();

        let names: Vec<_> = plan.descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![SIMULATOR, SPAWN, PUBLISHER, BRIDGE]);
        assert_eq!(plan.execution_order, vec![SIMULATOR, PUBLISHER, SPAWN, BRIDGE]);

        let simulator = &plan.descriptors[0];
        assert_eq!(simulator.kind, DescriptorKind::IncludeLaunch);
        assert_eq!(simulator.launch_arguments["gz_args"], "-r -v4 empty.sdf");
        assert_eq!(simulator.launch_arguments["on_exit_shutdown"], "true");
        assert_eq!(simulator.on_exit, OnExit::Shutdown);

        let spawn = &plan.descriptors[1];
        assert_eq!(spawn.argument_value("-name"), Some("differential_drive_robot"));
        assert_eq!(spawn.argument_value("-topic"), Some("robot_description"));
        assert_eq!(spawn.retry, Some(settings.spawn.retry));

        let publisher = &plan.descriptors[2];
        assert_eq!(
            publisher.parameters["robot_description"],
            ParamValue::String(xml.to_string())
        );
        assert_eq!(publisher.parameters["use_sim_time"], ParamValue::Bool(true));

        let bridge = &plan.descriptors[3];
        let expected = format!(
            "config_file:={}",
            dir.path().join("parameters/bridge_parameters.yaml").display()
        );
        assert_eq!(bridge.arguments, vec!["--ros-args", "-p", expected.as_str()]);
    }

    #[test]
    fn test_missing_bridge_config() {
        let dir = TempDir::new().unwrap();
        let map = PackageMap::new().with_package("mobile_robot", dir.path());
        let settings = LaunchSettings::default();

        let err = PlanBuilder::new(&settings, &map)
            .build_with(description("<robot name=\"bot1\"/>"))
            .unwrap_err();
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn test_settings_drive_descriptors() {
        let (_dir, map) = package_tree();
        let mut settings = LaunchSettings::default();
        settings.robot_name = "bot1".to_string();
        settings.use_sim_time = false;
        settings.simulator.shutdown_on_exit = false;
        settings.simulator.world = "warehouse.sdf".to_string();

        let plan = PlanBuilder::new(&settings, &map)
            .build_with(description("<robot name=\"bot1\"/>"))
            .unwrap();

        let simulator = plan.descriptor(SIMULATOR).unwrap();
        assert_eq!(simulator.on_exit, OnExit::Continue);
        assert_eq!(simulator.launch_arguments["gz_args"], "-r -v4 warehouse.sdf");
        assert_eq!(simulator.launch_arguments["on_exit_shutdown"], "false");
        assert_eq!(
            plan.descriptor(SPAWN).unwrap().argument_value("-name"),
            Some("bot1")
        );
        assert_eq!(
            plan.descriptor(PUBLISHER).unwrap().parameters["use_sim_time"],
            ParamValue::Bool(false)
        );
    }
}
