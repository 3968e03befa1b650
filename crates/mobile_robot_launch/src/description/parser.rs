//! Template parser: XML text to macro AST

use crate::description::ast::{
    is_xacro_namespace, ElementNode, MacroDef, MacroParam, Node, PropertyScope, TemplateDocument,
};
use crate::description::error::TemplateError;
use std::rc::Rc;

/// Parse template text into a [`TemplateDocument`]
pub fn parse_template(content: &str) -> Result<TemplateDocument, TemplateError> {
    let doc = roxmltree::Document::parse(content)?;
    let root = doc.root_element();

    if is_xacro(root) {
        return Err(TemplateError::InvalidRoot(qualified_name(root)));
    }

    Ok(TemplateDocument {
        root: ElementNode {
            name: qualified_name(root),
            attributes: plain_attributes(root),
            children: parse_children(root)?,
        },
        namespaces: declared_namespaces(root),
    })
}

/// Non-xacro namespaces `node` declares beyond those already in scope at the
/// nearest enclosing element that reaches the output
fn declared_namespaces(node: roxmltree::Node) -> Vec<(Option<String>, String)> {
    let inherited: Vec<(Option<&str>, &str)> = node
        .ancestors()
        .skip(1)
        .find(|ancestor| ancestor.is_element() && !is_xacro(*ancestor))
        .map(|ancestor| {
            ancestor
                .namespaces()
                .map(|ns| (ns.name(), ns.uri()))
                .collect()
        })
        .unwrap_or_default();

    node.namespaces()
        .filter(|ns| !is_xacro_namespace(ns.uri()) && ns.name() != Some("xml"))
        .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
        .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
        .collect()
}

fn namespace_attribute(prefix: Option<String>, uri: String) -> (String, String) {
    match prefix {
        Some(prefix) => (format!("xmlns:{}", prefix), uri),
        None => ("xmlns".to_string(), uri),
    }
}

fn is_xacro(node: roxmltree::Node) -> bool {
    node.tag_name().namespace().is_some_and(is_xacro_namespace)
}

fn qualified_name(node: roxmltree::Node) -> String {
    let local = node.tag_name().name();
    match node
        .tag_name()
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
    {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
        _ => local.to_string(),
    }
}

fn required_attr(node: roxmltree::Node, name: &str) -> Result<String, TemplateError> {
    node.attribute(name)
        .map(str::to_string)
        .ok_or_else(|| TemplateError::MissingAttribute {
            element: qualified_name(node),
            attribute: name.to_string(),
        })
}

/// Attributes in document order, minus anything in the xacro namespace
fn plain_attributes(node: roxmltree::Node) -> Vec<(String, String)> {
    node.attributes()
        .filter(|attr| !attr.namespace().is_some_and(is_xacro_namespace))
        .map(|attr| {
            let name = match attr.namespace().and_then(|uri| node.lookup_prefix(uri)) {
                Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, attr.name()),
                _ => attr.name().to_string(),
            };
            (name, attr.value().to_string())
        })
        .collect()
}

/// A nested plain element; its own namespace declarations come first
fn parse_element(node: roxmltree::Node) -> Result<ElementNode, TemplateError> {
    let mut attributes: Vec<_> = declared_namespaces(node)
        .into_iter()
        .map(|(prefix, uri)| namespace_attribute(prefix, uri))
        .collect();
    attributes.extend(plain_attributes(node));

    Ok(ElementNode {
        name: qualified_name(node),
        attributes,
        children: parse_children(node)?,
    })
}

fn parse_children(node: roxmltree::Node) -> Result<Vec<Node>, TemplateError> {
    let mut children = Vec::new();

    for child in node.children() {
        if child.is_element() {
            children.push(parse_node(child)?);
        } else if child.is_text() {
            // Whitespace-only text is layout, not content
            if let Some(text) = child.text().filter(|t| !t.trim().is_empty()) {
                children.push(Node::Text(text.to_string()));
            }
        }
        // Comments and processing instructions are dropped
    }

    Ok(children)
}

fn parse_node(node: roxmltree::Node) -> Result<Node, TemplateError> {
    if !is_xacro(node) {
        return Ok(Node::Element(parse_element(node)?));
    }

    let directive = node.tag_name().name();
    let parsed = match directive {
        "property" => {
            let scope = match node.attribute("scope") {
                None => PropertyScope::Local,
                Some("parent") => PropertyScope::Parent,
                Some("global") => PropertyScope::Global,
                Some(other) => return Err(TemplateError::InvalidPropertyScope(other.to_string())),
            };
            let value = node.attribute("value").map(str::to_string);
            let block = if value.is_none() {
                parse_children(node)?
            } else {
                Vec::new()
            };
            Node::Property {
                name: required_attr(node, "name")?,
                value,
                block,
                scope,
            }
        }
        "arg" => Node::Arg {
            name: required_attr(node, "name")?,
            default: node.attribute("default").map(str::to_string),
        },
        "macro" => {
            let name = required_attr(node, "name")?;
            let params_attr = node.attribute("params").unwrap_or_default();
            let params = params_attr
                .split_whitespace()
                .map(MacroParam::parse)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| TemplateError::InvalidMacroParams {
                    name: name.clone(),
                    params: params_attr.to_string(),
                })?;
            Node::Macro(Rc::new(MacroDef {
                name,
                params,
                body: parse_children(node)?,
            }))
        }
        "if" | "unless" => Node::Conditional {
            condition: required_attr(node, "value")?,
            negate: directive == "unless",
            body: parse_children(node)?,
        },
        "include" => Node::Include {
            filename: required_attr(node, "filename")?,
        },
        "insert_block" => Node::InsertBlock {
            name: required_attr(node, "name")?,
        },
        _ => Node::Call {
            name: directive.to_string(),
            attributes: node
                .attributes()
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect(),
            children: parse_children(node)?,
        },
    };

    Ok(parsed)
}
