//! Description resolver: package + relative path to concrete URDF text

use crate::description::error::{DescriptionError, TemplateError};
use crate::description::expand::Expander;
use crate::description::package::PackageLocator;
use crate::description::parser::parse_template;
use crate::description::substitution::SubstitutionContext;
use crate::description::summary::RobotSummary;
use crate::description::writer::to_xml_string;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// A fully expanded robot description, held in memory only
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDescription {
    pub package: String,
    /// Template file the text was produced from
    pub source: PathBuf,
    pub xml: String,
    pub summary: RobotSummary,
}

impl ResolvedDescription {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn robot_name(&self) -> &str {
        &self.summary.name
    }
}

/// Resolves templated descriptions through an injected [`PackageLocator`].
///
/// The output depends only on the file tree, the argument overrides and the
/// locator, so resolving twice yields identical text.
pub struct DescriptionResolver<'a> {
    locator: &'a dyn PackageLocator,
    args: IndexMap<String, String>,
}

impl<'a> DescriptionResolver<'a> {
    pub fn new(locator: &'a dyn PackageLocator) -> Self {
        Self {
            locator,
            args: IndexMap::new(),
        }
    }

    /// Override a template argument (`xacro:arg`)
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: IndexMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Share directory of `package`
    pub fn locate(&self, package: &str) -> Result<PathBuf, DescriptionError> {
        self.locator
            .share_dir(package)
            .ok_or_else(|| DescriptionError::ResourceNotFound(format!("package '{}'", package)))
    }

    /// Resolve `relative_path` inside the share directory of `package`
    pub fn resolve(
        &self,
        package: &str,
        relative_path: impl AsRef<Path>,
    ) -> Result<ResolvedDescription, DescriptionError> {
        let share_dir = self.locate(package)?;
        let source = share_dir.join(relative_path.as_ref());

        let mut resolved = self.process_file(&source)?;
        resolved.package = package.to_string();
        Ok(resolved)
    }

    /// Expand a template file given by path
    pub fn process_file(&self, path: &Path) -> Result<ResolvedDescription, DescriptionError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DescriptionError::ResourceNotFound(format!("{} ({})", path.display(), e))
        })?;

        log::debug!("Expanding robot description {}", path.display());

        let (xml, summary) =
            self.expand(&content, path)
                .map_err(|source| DescriptionError::MalformedTemplate {
                    file: path.to_path_buf(),
                    source,
                })?;

        log::info!(
            "Resolved description '{}' from {} ({} links, {} joints)",
            summary.name,
            path.display(),
            summary.links.len(),
            summary.joints.len()
        );

        Ok(ResolvedDescription {
            package: String::new(),
            source: path.to_path_buf(),
            xml,
            summary,
        })
    }

    fn expand(&self, content: &str, path: &Path) -> Result<(String, RobotSummary), TemplateError> {
        let document = parse_template(content)?;
        if document.root.name != "robot" {
            return Err(TemplateError::NotARobot(document.root.name));
        }

        let substitutions = SubstitutionContext::new(self.locator).with_args(self.args.clone());
        let root = Expander::new(substitutions).expand(&document, path)?;

        let xml = to_xml_string(&root)?;
        let summary = RobotSummary::from_xml(&xml)?;
        Ok((xml, summary))
    }
}
