//! Structural summary of an expanded robot description

use crate::description::error::TemplateError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parent: String,
    pub child: String,
}

/// A `<gazebo>` simulator plugin
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Link the sensor is attached to, when declared under `<gazebo reference>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Links, joints, plugins and sensors of a URDF document, in document order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotSummary {
    pub name: String,
    pub links: Vec<String>,
    pub joints: Vec<JointSummary>,
    pub plugins: Vec<PluginSummary>,
    pub sensors: Vec<SensorSummary>,
}

impl RobotSummary {
    /// Summarize URDF text. The root must be a named `<robot>`.
    pub fn from_xml(xml: &str) -> Result<Self, TemplateError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc.root_element();

        if root.tag_name().name() != "robot" {
            return Err(TemplateError::NotARobot(root.tag_name().name().to_string()));
        }
        let name = root
            .attribute("name")
            .ok_or_else(|| TemplateError::MissingAttribute {
                element: "robot".to_string(),
                attribute: "name".to_string(),
            })?
            .to_string();

        let mut summary = Self {
            name,
            links: Vec::new(),
            joints: Vec::new(),
            plugins: Vec::new(),
            sensors: Vec::new(),
        };

        for child in root.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "link" => {
                    if let Some(name) = child.attribute("name") {
                        summary.links.push(name.to_string());
                    }
                }
                "joint" => summary.joints.push(JointSummary {
                    name: child.attribute("name").unwrap_or_default().to_string(),
                    kind: child.attribute("type").unwrap_or_default().to_string(),
                    parent: child_link(child, "parent"),
                    child: child_link(child, "child"),
                }),
                "gazebo" => summary.collect_gazebo(child),
                _ => {}
            }
        }

        Ok(summary)
    }

    fn collect_gazebo(&mut self, gazebo: roxmltree::Node) {
        let reference = gazebo.attribute("reference").map(str::to_string);

        for node in gazebo.descendants().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "plugin" => self.plugins.push(PluginSummary {
                    name: node.attribute("name").unwrap_or_default().to_string(),
                    filename: node.attribute("filename").unwrap_or_default().to_string(),
                }),
                "sensor" => self.sensors.push(SensorSummary {
                    name: node.attribute("name").unwrap_or_default().to_string(),
                    kind: node.attribute("type").unwrap_or_default().to_string(),
                    reference: reference.clone(),
                }),
                _ => {}
            }
        }
    }

    /// The link that is never a joint child
    pub fn root_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| !self.joints.iter().any(|j| &j.child == *link))
            .map(String::as_str)
    }
}

fn child_link(joint: roxmltree::Node, tag: &str) -> String {
    joint
        .children()
        .find(|n| n.has_tag_name(tag))
        .and_then(|n| n.attribute("link"))
        .unwrap_or_default()
        .to_string()
}
