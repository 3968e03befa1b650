//! Macro AST for xacro templates
//!
//! The parser lowers XML into these nodes; the expander walks them. Attribute
//! values and text are kept raw here and evaluated during expansion.

use std::rc::Rc;

/// XML namespace URIs that mark xacro directives
pub const XACRO_NAMESPACES: &[&str] = &[
    "http://www.ros.org/wiki/xacro",
    "http://ros.org/wiki/xacro",
    "http://wiki.ros.org/xacro",
];

pub fn is_xacro_namespace(uri: &str) -> bool {
    XACRO_NAMESPACES.iter().any(|ns| *ns == uri)
}

/// A parsed template file
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    /// Root element (never a directive)
    pub root: ElementNode,
    /// Non-xacro namespace declarations of the root, as (prefix, uri)
    pub namespaces: Vec<(Option<String>, String)>,
}

/// Plain XML element carried through to the output
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    /// Qualified name (`prefix:local` or `local`)
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Where a property definition lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyScope {
    #[default]
    Local,
    Parent,
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(ElementNode),
    Text(String),
    /// `xacro:property`; `value: None` makes it a block property
    Property {
        name: String,
        value: Option<String>,
        block: Vec<Node>,
        scope: PropertyScope,
    },
    /// `xacro:arg`
    Arg {
        name: String,
        default: Option<String>,
    },
    /// `xacro:macro`
    Macro(Rc<MacroDef>),
    /// `<xacro:NAME .../>` invoking a macro
    Call {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<Node>,
    },
    /// `xacro:if` (`negate: false`) and `xacro:unless` (`negate: true`)
    Conditional {
        condition: String,
        negate: bool,
        body: Vec<Node>,
    },
    /// `xacro:include`
    Include { filename: String },
    /// `xacro:insert_block`
    InsertBlock { name: String },
}

impl Node {
    pub fn is_element(&self) -> bool {
        !matches!(self, Node::Text(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<MacroParam>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: String,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// Attribute parameter
    Value(ParamDefault),
    /// `*name`: the next element child of the call
    Block,
    /// `**name`: the children of the next element child of the call
    BlockContents,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamDefault {
    Required,
    /// `name:=value`
    Value(String),
    /// `name:=^` or `name:=^|fallback`: taken from the caller's scope
    Inherit { fallback: Option<String> },
}

impl MacroParam {
    /// Parse one token of a `params` attribute
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(name) = token.strip_prefix("**") {
            return is_identifier(name).then(|| Self {
                name: name.to_string(),
                kind: ParamKind::BlockContents,
            });
        }
        if let Some(name) = token.strip_prefix('*') {
            return is_identifier(name).then(|| Self {
                name: name.to_string(),
                kind: ParamKind::Block,
            });
        }

        let (name, default) = match token.split_once(":=") {
            Some((name, default)) => (name, Some(default)),
            None => (token, None),
        };
        if !is_identifier(name) {
            return None;
        }

        let default = match default {
            None => ParamDefault::Required,
            Some("^") => ParamDefault::Inherit { fallback: None },
            Some(value) => match value.strip_prefix("^|") {
                Some(fallback) => ParamDefault::Inherit {
                    fallback: Some(fallback.to_string()),
                },
                None => ParamDefault::Value(value.to_string()),
            },
        };

        Some(Self {
            name: name.to_string(),
            kind: ParamKind::Value(default),
        })
    }
}

/// ASCII identifier: letter or underscore, then letters, digits, underscores
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
