//! Error types for description resolution

use crate::description::expr::ExprError;
use crate::description::substitution::SubstitutionError;
use std::path::PathBuf;

/// Fatal resolution failures; both abort the launch before any process starts
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Malformed template '{}': {source}", file.display())]
    MalformedTemplate {
        file: PathBuf,
        #[source]
        source: TemplateError,
    },
}

impl DescriptionError {
    pub fn is_resource_not_found(&self) -> bool {
        matches!(self, DescriptionError::ResourceNotFound(_))
    }

    pub fn is_malformed_template(&self) -> bool {
        matches!(self, DescriptionError::MalformedTemplate { .. })
    }
}

/// Why a template could not be expanded
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Missing required attribute '{attribute}' on element '<{element}>'")]
    MissingAttribute { element: String, attribute: String },

    #[error("Root element '<{0}>' cannot be a xacro directive")]
    InvalidRoot(String),

    #[error("Invalid property scope '{0}' (expected 'parent' or 'global')")]
    InvalidPropertyScope(String),

    #[error("Invalid params for macro '{name}': '{params}'")]
    InvalidMacroParams { name: String, params: String },

    #[error("Undefined property: {0}")]
    UndefinedProperty(String),

    #[error("Circular property definition: {}", .0.join(" -> "))]
    CyclicProperty(Vec<String>),

    #[error("Cannot evaluate '${{{expression}}}': {source}")]
    Expression {
        expression: String,
        #[source]
        source: ExprError,
    },

    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    #[error("Undefined macro: xacro:{0}")]
    UndefinedMacro(String),

    #[error("Macro '{macro_name}' is missing parameter '{param}'")]
    MissingMacroParam { macro_name: String, param: String },

    #[error("Macro '{macro_name}' has no parameter '{param}'")]
    UnknownMacroParam { macro_name: String, param: String },

    #[error("Macro '{macro_name}' expects a block for '{param}'")]
    MissingBlock { macro_name: String, param: String },

    #[error("Property '{0}' is not a block")]
    NotABlock(String),

    #[error("Value '{0}' is not a boolean")]
    InvalidBoolean(String),

    #[error("Macro nesting exceeded {limit} levels in '{macro_name}'")]
    RecursionLimit { macro_name: String, limit: usize },

    #[error("Cyclic include: {}", format_chain(.0))]
    CyclicInclude(Vec<PathBuf>),

    #[error("Cannot include '{filename}': {source}")]
    MissingInclude {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("In included file '{}': {source}", file.display())]
    Include {
        file: PathBuf,
        #[source]
        source: Box<TemplateError>,
    },

    #[error("Expected a <robot> root element, found <{0}>")]
    NotARobot(String),

    #[error("Failed to write document: {0}")]
    Write(String),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
