//! Command-line interface for mobile_robot_launch

use crate::config::LaunchSettings;
use crate::description::{AmentIndex, LayeredLocator, PackageMap};
use argh::FromArgs;
use std::path::PathBuf;
use std::str::FromStr;

/// Expand the robot description and launch the Gazebo simulation
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to a launch settings YAML file (defaults are used when omitted)
    #[argh(option, short = 'c')]
    pub config: Option<String>,

    /// override robot description arguments (format: key:=value)
    #[argh(option, short = 'a', from_str_fn(parse_arg_override))]
    pub arg: Vec<(String, String)>,

    /// use this share directory for a package (format: package=path)
    #[argh(option, from_str_fn(parse_share_override))]
    pub share: Vec<(String, PathBuf)>,

    /// entity name for the spawned robot
    #[argh(option)]
    pub robot_name: Option<String>,

    /// simulator world file
    #[argh(option)]
    pub world: Option<String>,

    /// show the launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// launch plan format for --dry-run (text, yaml, json)
    #[argh(option, default = "PlanFormat::Text")]
    pub format: PlanFormat,

    /// print the expanded robot description and exit
    #[argh(switch)]
    pub emit_description: bool,

    /// resolve the description and plan, then exit
    #[argh(switch)]
    pub validate: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Output format of the dry-run plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Text,
    Yaml,
    Json,
}

impl FromStr for PlanFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(PlanFormat::Text),
            "yaml" => Ok(PlanFormat::Yaml),
            "json" => Ok(PlanFormat::Json),
            _ => Err(format!(
                "Invalid format '{}'. Expected 'text', 'yaml' or 'json'",
                s
            )),
        }
    }
}

/// Parse argument override in format "key:=value"
fn parse_arg_override(s: &str) -> Result<(String, String), String> {
    match s.split_once(":=") {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!(
            "Invalid argument format '{}'. Expected 'key:=value'",
            s
        )),
    }
}

/// Parse share directory override in format "package=path"
fn parse_share_override(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((package, path)) if !package.is_empty() && !path.is_empty() => {
            Ok((package.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!(
            "Invalid share format '{}'. Expected 'package=path'",
            s
        )),
    }
}

impl LaunchArgs {
    /// Load the settings file (or defaults) and apply command-line overrides
    pub fn settings(&self) -> Result<LaunchSettings, crate::config::SettingsError> {
        let mut settings = match &self.config {
            Some(path) => LaunchSettings::from_file(path)?,
            None => LaunchSettings::default(),
        };
        self.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply command-line overrides on top of `settings`
    pub fn apply(&self, settings: &mut LaunchSettings) {
        if let Some(name) = &self.robot_name {
            settings.robot_name = name.clone();
        }
        if let Some(world) = &self.world {
            settings.simulator.world = world.clone();
        }
        settings.xacro_args.extend(self.arg.iter().cloned());
    }

    /// Package locator: `--share` overrides first, then `AMENT_PREFIX_PATH`
    pub fn locator(&self) -> LayeredLocator {
        let mut shares = PackageMap::new();
        for (package, path) in &self.share {
            shares.insert(package.clone(), path.clone());
        }
        LayeredLocator::new()
            .with_layer(shares)
            .with_layer(AmentIndex::from_env())
    }
}
