//! Macro expansion: template AST to a plain element tree

use crate::description::ast::{
    MacroDef, Node, ParamDefault, ParamKind, PropertyScope, TemplateDocument,
};
use crate::description::error::TemplateError;
use crate::description::expr::{self, ExprError, Value};
use crate::description::parser::parse_template;
use crate::description::substitution::{split_segments, Segment, SubstitutionContext};
use crate::description::writer::{XmlContent, XmlElement};
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Maximum nesting of macro calls
const MAX_MACRO_DEPTH: usize = 100;

#[derive(Debug, Clone)]
enum PropValue {
    Value(Value),
    Lazy(Rc<LazyProperty>),
    Block(Vec<Node>),
}

/// Property text evaluated on first use, seeing only the frames up to and
/// including the one it was defined in
#[derive(Debug)]
struct LazyProperty {
    raw: String,
    frame: usize,
    value: OnceCell<Value>,
}

#[derive(Debug, Default)]
struct Frame {
    properties: HashMap<String, PropValue>,
    macros: HashMap<String, Rc<MacroDef>>,
}

/// Expands a parsed template into plain XML.
///
/// Properties and macros live in a stack of frames: the bottom frame is the
/// global scope, each macro call pushes a frame that sees everything its
/// caller sees. Included files expand into the scope of the include site.
pub struct Expander<'a> {
    substitutions: SubstitutionContext<'a>,
    scopes: Vec<Frame>,
    /// Files being expanded, outermost first; the last one is current
    include_stack: Vec<PathBuf>,
    /// Namespace declarations for the output root, including those of
    /// included files
    namespaces: Vec<(Option<String>, String)>,
    /// Lazy properties currently being evaluated
    resolving: RefCell<Vec<(String, Rc<LazyProperty>)>>,
    depth: usize,
}

impl<'a> Expander<'a> {
    pub fn new(substitutions: SubstitutionContext<'a>) -> Self {
        Self {
            substitutions,
            scopes: vec![Frame::default()],
            include_stack: Vec::new(),
            namespaces: Vec::new(),
            resolving: RefCell::new(Vec::new()),
            depth: 0,
        }
    }

    /// Expand `document`, which was read from `file`.
    ///
    /// Root attributes are evaluated after the children so they can refer to
    /// properties defined anywhere in the document.
    pub fn expand(
        &mut self,
        document: &TemplateDocument,
        file: &Path,
    ) -> Result<XmlElement, TemplateError> {
        self.include_stack = vec![canonical(file)];
        self.namespaces = document.namespaces.clone();

        let mut children = Vec::new();
        self.expand_nodes(&document.root.children, &mut children)?;

        let mut attributes = self.eval_attributes(&document.root.attributes)?;
        for (prefix, uri) in &self.namespaces {
            let key = match prefix {
                Some(prefix) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            attributes.push((key, uri.clone()));
        }

        Ok(XmlElement {
            name: document.root.name.clone(),
            attributes,
            children,
        })
    }

    fn current_file(&self) -> &Path {
        self.include_stack
            .last()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    fn expand_nodes(
        &mut self,
        nodes: &[Node],
        out: &mut Vec<XmlContent>,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            self.expand_node(node, out)?;
        }
        Ok(())
    }

    fn expand_node(&mut self, node: &Node, out: &mut Vec<XmlContent>) -> Result<(), TemplateError> {
        match node {
            Node::Element(element) => {
                let attributes = self.eval_attributes(&element.attributes)?;
                let mut children = Vec::new();
                self.expand_nodes(&element.children, &mut children)?;
                out.push(XmlContent::Element(XmlElement {
                    name: element.name.clone(),
                    attributes,
                    children,
                }));
            }
            Node::Text(text) => {
                let text = self.eval_text(text)?;
                if !text.trim().is_empty() {
                    out.push(XmlContent::Text(text));
                }
            }
            Node::Property {
                name,
                value,
                block,
                scope,
            } => {
                let value = match (value, scope) {
                    (None, _) => PropValue::Block(block.clone()),
                    (Some(raw), PropertyScope::Local) if raw.contains('$') => {
                        PropValue::Lazy(Rc::new(LazyProperty {
                            raw: raw.clone(),
                            frame: self.top(),
                            value: OnceCell::new(),
                        }))
                    }
                    (Some(raw), _) => PropValue::Value(self.eval_value(raw)?),
                };
                self.define(name, value, *scope);
            }
            Node::Arg { name, default } => {
                if let Some(default) = default {
                    let default = self.eval_text(default)?;
                    self.substitutions.declare_arg(name, default);
                }
            }
            Node::Macro(def) => {
                if let Some(frame) = self.scopes.last_mut() {
                    frame.macros.insert(def.name.clone(), Rc::clone(def));
                }
            }
            Node::Call {
                name,
                attributes,
                children,
            } => self.call_macro(name, attributes, children, out)?,
            Node::Conditional {
                condition,
                negate,
                body,
            } => {
                let value = self.eval_value(condition)?;
                let truth = value
                    .as_bool()
                    .ok_or_else(|| TemplateError::InvalidBoolean(value.to_string()))?;
                if truth != *negate {
                    self.expand_nodes(body, out)?;
                }
            }
            Node::Include { filename } => self.include(filename, out)?,
            Node::InsertBlock { name } => {
                let block = match self.lookup_property(name) {
                    Some(PropValue::Block(nodes)) => nodes.clone(),
                    Some(PropValue::Value(_) | PropValue::Lazy(_)) => {
                        return Err(TemplateError::NotABlock(name.clone()))
                    }
                    None => return Err(TemplateError::UndefinedProperty(name.clone())),
                };
                self.expand_nodes(&block, out)?;
            }
        }
        Ok(())
    }

    fn top(&self) -> usize {
        self.scopes.len() - 1
    }

    fn define(&mut self, name: &str, value: PropValue, scope: PropertyScope) {
        let index = match scope {
            PropertyScope::Local => self.top(),
            PropertyScope::Parent => self.scopes.len().saturating_sub(2),
            PropertyScope::Global => 0,
        };
        self.scopes[index].properties.insert(name.to_string(), value);
    }

    fn lookup_property(&self, name: &str) -> Option<&PropValue> {
        self.lookup_property_in(name, self.top())
    }

    fn lookup_property_in(&self, name: &str, limit: usize) -> Option<&PropValue> {
        self.scopes[..=limit]
            .iter()
            .rev()
            .find_map(|frame| frame.properties.get(name))
    }

    /// Value of property `name` as seen from frame `limit`
    fn property_value(&self, name: &str, limit: usize) -> Result<Option<Value>, TemplateError> {
        match self.lookup_property_in(name, limit) {
            Some(PropValue::Value(value)) => Ok(Some(value.clone())),
            Some(PropValue::Lazy(lazy)) => self.force(name, lazy).map(Some),
            Some(PropValue::Block(_)) | None => Ok(None),
        }
    }

    fn force(&self, name: &str, lazy: &Rc<LazyProperty>) -> Result<Value, TemplateError> {
        if let Some(value) = lazy.value.get() {
            return Ok(value.clone());
        }

        if self
            .resolving
            .borrow()
            .iter()
            .any(|(_, pending)| Rc::ptr_eq(pending, lazy))
        {
            let mut chain: Vec<String> = self
                .resolving
                .borrow()
                .iter()
                .map(|(pending, _)| pending.clone())
                .collect();
            chain.push(name.to_string());
            return Err(TemplateError::CyclicProperty(chain));
        }

        self.resolving
            .borrow_mut()
            .push((name.to_string(), Rc::clone(lazy)));
        let result = self.eval_value_in(&lazy.raw, lazy.frame);
        self.resolving.borrow_mut().pop();

        let value = result?;
        Ok(lazy.value.get_or_init(|| value).clone())
    }

    fn lookup_macro(&self, name: &str) -> Option<Rc<MacroDef>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.macros.get(name))
            .cloned()
    }

    fn call_macro(
        &mut self,
        name: &str,
        attributes: &[(String, String)],
        children: &[Node],
        out: &mut Vec<XmlContent>,
    ) -> Result<(), TemplateError> {
        let def = self
            .lookup_macro(name)
            .ok_or_else(|| TemplateError::UndefinedMacro(name.to_string()))?;

        if self.depth >= MAX_MACRO_DEPTH {
            return Err(TemplateError::RecursionLimit {
                macro_name: name.to_string(),
                limit: MAX_MACRO_DEPTH,
            });
        }

        if let Some((param, _)) = attributes
            .iter()
            .find(|(key, _)| !def.params.iter().any(|p| &p.name == key))
        {
            return Err(TemplateError::UnknownMacroParam {
                macro_name: name.to_string(),
                param: param.clone(),
            });
        }

        // Parameters are evaluated in the caller's scope
        let mut frame = Frame::default();
        let mut blocks = children.iter().filter(|child| child.is_element());

        for param in &def.params {
            let value = match &param.kind {
                ParamKind::Value(default) => {
                    let given = attributes
                        .iter()
                        .find(|(key, _)| key == &param.name)
                        .map(|(_, value)| value);
                    match (given, default) {
                        (Some(raw), _) => PropValue::Value(self.eval_value(raw)?),
                        (None, ParamDefault::Value(raw)) => PropValue::Value(self.eval_value(raw)?),
                        (None, ParamDefault::Inherit { fallback }) => {
                            match (self.lookup_property(&param.name), fallback) {
                                (Some(inherited), _) => inherited.clone(),
                                (None, Some(raw)) => PropValue::Value(self.eval_value(raw)?),
                                (None, None) => return Err(missing_param(name, &param.name)),
                            }
                        }
                        (None, ParamDefault::Required) => {
                            return Err(missing_param(name, &param.name))
                        }
                    }
                }
                ParamKind::Block => match blocks.next() {
                    Some(node) => PropValue::Block(vec![node.clone()]),
                    None => return Err(missing_block(name, &param.name)),
                },
                ParamKind::BlockContents => match blocks.next() {
                    Some(Node::Element(element)) => PropValue::Block(element.children.clone()),
                    _ => return Err(missing_block(name, &param.name)),
                },
            };
            frame.properties.insert(param.name.clone(), value);
        }

        self.scopes.push(frame);
        self.depth += 1;
        let result = self.expand_nodes(&def.body, out);
        self.depth -= 1;
        self.scopes.pop();

        result
    }

    fn include(&mut self, filename: &str, out: &mut Vec<XmlContent>) -> Result<(), TemplateError> {
        let filename = self.eval_text(filename)?;
        let mut path = PathBuf::from(&filename);
        if path.is_relative() {
            if let Some(dir) = self.current_file().parent() {
                path = dir.join(path);
            }
        }

        let content = std::fs::read_to_string(&path).map_err(|source| {
            TemplateError::MissingInclude {
                filename: filename.clone(),
                source,
            }
        })?;

        let path = canonical(&path);
        if self.include_stack.contains(&path) {
            let mut chain = self.include_stack.clone();
            chain.push(path);
            return Err(TemplateError::CyclicInclude(chain));
        }

        log::debug!("Including {}", path.display());

        self.include_stack.push(path.clone());
        let result = parse_template(&content).and_then(|document| {
            self.hoist_namespaces(&document.namespaces);
            self.expand_nodes(&document.root.children, out)
        });
        self.include_stack.pop();

        result.map_err(|source| match source {
            // Keep the innermost file as the reported location
            TemplateError::CyclicInclude(_) | TemplateError::Include { .. } => source,
            source => TemplateError::Include {
                file: path,
                source: Box::new(source),
            },
        })
    }

    /// Declare an included root's namespaces on the output root; the first
    /// binding of a prefix wins
    fn hoist_namespaces(&mut self, namespaces: &[(Option<String>, String)]) {
        for (prefix, uri) in namespaces {
            if !self.namespaces.iter().any(|(known, _)| known == prefix) {
                self.namespaces.push((prefix.clone(), uri.clone()));
            }
        }
    }

    fn eval_attributes(
        &self,
        attributes: &[(String, String)],
    ) -> Result<Vec<(String, String)>, TemplateError> {
        attributes
            .iter()
            .map(|(key, raw)| Ok((key.clone(), self.eval_text(raw)?)))
            .collect()
    }

    /// Substitute every `${...}` and `$(...)` in `text`
    fn eval_text(&self, text: &str) -> Result<String, TemplateError> {
        self.eval_text_in(text, self.top())
    }

    fn eval_text_in(&self, text: &str, limit: usize) -> Result<String, TemplateError> {
        let mut result = String::new();
        for segment in split_segments(text)? {
            match segment {
                Segment::Literal(literal) => result.push_str(&literal),
                Segment::Expression(expression) => {
                    result.push_str(&self.eval_expression(&expression, limit)?.to_string())
                }
                Segment::Extension(body) => result.push_str(
                    &self
                        .substitutions
                        .resolve_extension(&body, self.current_file())?,
                ),
            }
        }
        Ok(result)
    }

    /// Like [`Self::eval_text`], but a lone `${...}` keeps its typed value
    fn eval_value(&self, text: &str) -> Result<Value, TemplateError> {
        self.eval_value_in(text, self.top())
    }

    fn eval_value_in(&self, text: &str, limit: usize) -> Result<Value, TemplateError> {
        let segments = split_segments(text)?;
        if let [Segment::Expression(expression)] = segments.as_slice() {
            return self.eval_expression(expression, limit);
        }
        Ok(Value::from_literal(&self.eval_text_in(text, limit)?))
    }

    fn eval_expression(&self, expression: &str, limit: usize) -> Result<Value, TemplateError> {
        // The first failure of a lazy property wins over the expression's own error
        let failure = RefCell::new(None);
        let lookup = |name: &str| match self.property_value(name, limit) {
            Ok(value) => value,
            Err(err) => {
                let mut slot = failure.borrow_mut();
                if slot.is_none() {
                    *slot = Some(err);
                }
                None
            }
        };

        let result = expr::evaluate(expression, &lookup);
        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        result.map_err(|source| match source {
            ExprError::UndefinedName(name) => TemplateError::UndefinedProperty(name),
            source => TemplateError::Expression {
                expression: expression.to_string(),
                source,
            },
        })
    }
}

fn missing_param(macro_name: &str, param: &str) -> TemplateError {
    TemplateError::MissingMacroParam {
        macro_name: macro_name.to_string(),
        param: param.to_string(),
    }
}

fn missing_block(macro_name: &str, param: &str) -> TemplateError {
    TemplateError::MissingBlock {
        macro_name: macro_name.to_string(),
        param: param.to_string(),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::package::PackageMap;
    use crate::description::writer::to_xml_string;
    use std::fs;
    use tempfile::TempDir;

    const XACRO_NS: &str = r#"xmlns:xacro="http://www.ros.org/wiki/xacro""#;

    fn expand_with(body: &str, args: &[(&str, &str)]) -> Result<XmlElement, TemplateError> {
        let locator = PackageMap::new().with_package("mobile_robot", "/opt/share/mobile_robot");
        let mut substitutions = SubstitutionContext::new(&locator);
        for (name, value) in args {
            substitutions.args.insert(name.to_string(), value.to_string());
        }

        let document = parse_template(&format!(
            r#"<robot {} name="${{robot_name}}">{}</robot>"#,
            XACRO_NS, body
        ))?;
        let file = Path::new("/opt/share/mobile_robot/model/robot.xacro");
        Expander::new(substitutions).expand(&document, file)
    }

    fn expand(body: &str) -> XmlElement {
        expand_with(body, &[]).unwrap()
    }

    fn first<'e>(element: &'e XmlElement, name: &str) -> &'e XmlElement {
        element
            .elements()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("no <{}> in output", name))
    }

    #[test]
    fn test_root_attributes_see_later_properties() {
        let robot = expand(r#"<xacro:property name="robot_name" value="bot1"/>"#);
        assert_eq!(robot.attribute("name"), Some("bot1"));
        assert!(robot.children.is_empty());
    }

    #[test]
    fn test_properties_and_expressions() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <xacro:property name="radius" value="0.1"/>
            <xacro:property name="diameter" value="${radius * 2}"/>
            <link name="wheel"><cylinder radius="${radius}" length="${diameter}"/></link>
            <joint name="j" type="${'contin' + 'uous'}"/>
            "#,
        );

        let link = first(&robot, "link");
        let cylinder = first(link, "cylinder");
        assert_eq!(cylinder.attribute("radius"), Some("0.1"));
        assert_eq!(cylinder.attribute("length"), Some("0.2"));
        assert_eq!(first(&robot, "joint").attribute("type"), Some("continuous"));
    }

    #[test]
    fn test_macro_with_defaults_and_blocks() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <xacro:macro name="wheel" params="prefix reflect:=1 *origin">
              <joint name="${prefix}_wheel_joint" type="continuous">
                <xacro:insert_block name="origin"/>
                <axis xyz="0 ${reflect} 0"/>
              </joint>
            </xacro:macro>
            <xacro:wheel prefix="left"><origin xyz="0 0.2 0"/></xacro:wheel>
            <xacro:wheel prefix="right" reflect="-1"><origin xyz="0 -0.2 0"/></xacro:wheel>
            "#,
        );

        let joints: Vec<_> = robot.elements().collect();
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[0].attribute("name"), Some("left_wheel_joint"));
        assert_eq!(first(joints[0], "origin").attribute("xyz"), Some("0 0.2 0"));
        assert_eq!(first(joints[0], "axis").attribute("xyz"), Some("0 1 0"));
        assert_eq!(joints[1].attribute("name"), Some("right_wheel_joint"));
        assert_eq!(first(joints[1], "axis").attribute("xyz"), Some("0 -1 0"));
    }

    #[test]
    fn test_block_contents_param() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <xacro:macro name="wrap" params="**content">
              <gazebo><xacro:insert_block name="content"/></gazebo>
            </xacro:macro>
            <xacro:wrap><items><a/><b/></items></xacro:wrap>
            "#,
        );

        let gazebo = first(&robot, "gazebo");
        let names: Vec<_> = gazebo.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_macro_param_errors() {
        let missing = expand_with(
            r#"<xacro:macro name="m" params="a"/><xacro:m/>"#,
            &[],
        );
        assert!(matches!(missing, Err(TemplateError::MissingMacroParam { .. })));

        let unknown = expand_with(
            r#"<xacro:macro name="m" params="a"/><xacro:m a="1" b="2"/>"#,
            &[],
        );
        assert!(matches!(unknown, Err(TemplateError::UnknownMacroParam { .. })));

        let block = expand_with(
            r#"<xacro:macro name="m" params="*origin"/><xacro:m/>"#,
            &[],
        );
        assert!(matches!(block, Err(TemplateError::MissingBlock { .. })));

        let undefined = expand_with(r#"<xacro:nothing/>"#, &[]);
        assert!(matches!(undefined, Err(TemplateError::UndefinedMacro(name)) if name == "nothing"));
    }

    #[test]
    fn test_inherited_params() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <xacro:property name="mass" value="2.5"/>
            <xacro:macro name="body" params="mass:=^ size:=^|0.3">
              <inertial mass="${mass}" size="${size}"/>
            </xacro:macro>
            <xacro:body/>
            "#,
        );
        let inertial = first(&robot, "inertial");
        assert_eq!(inertial.attribute("mass"), Some("2.5"));
        assert_eq!(inertial.attribute("size"), Some("0.3"));
    }

    #[test]
    fn test_recursive_macro_is_bounded() {
        let result = expand_with(
            r#"<xacro:macro name="loop" params=""><xacro:loop/></xacro:macro><xacro:loop/>"#,
            &[],
        );
        assert!(matches!(
            result,
            Err(TemplateError::RecursionLimit { limit: MAX_MACRO_DEPTH, .. })
        ));
    }

    #[test]
    fn test_property_scopes() {
        let robot = expand(
            r#"
            <xacro:macro name="setter" params="">
              <xacro:property name="robot_name" value="from_macro" scope="parent"/>
              <xacro:property name="hidden" value="local"/>
            </xacro:macro>
            <xacro:setter/>
            <link name="${robot_name}"/>
            "#,
        );
        assert_eq!(robot.attribute("name"), Some("from_macro"));
        assert_eq!(first(&robot, "link").attribute("name"), Some("from_macro"));

        let leaked = expand_with(
            r#"<xacro:macro name="m" params=""><xacro:property name="hidden" value="x"/></xacro:macro>
               <xacro:m/><link name="${hidden}"/>"#,
            &[("robot_name", "unused")],
        );
        assert!(matches!(leaked, Err(TemplateError::UndefinedProperty(name)) if name == "hidden"));
    }

    #[test]
    fn test_properties_resolve_on_use() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="${prefix}_bot"/>
            <xacro:property name="diameter" value="${radius * 2}"/>
            <xacro:property name="unused" value="${never_defined}"/>
            <xacro:property name="radius" value="0.25"/>
            <xacro:property name="prefix" value="front"/>
            <wheel size="${diameter}"/>
            "#,
        );
        assert_eq!(robot.attribute("name"), Some("front_bot"));
        assert_eq!(first(&robot, "wheel").attribute("size"), Some("0.5"));
    }

    #[test]
    fn test_macro_local_property_sees_its_frame() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <xacro:property name="offset" value="1"/>
            <xacro:macro name="m" params="base">
              <xacro:property name="shifted" value="${base + offset}"/>
              <xacro:property name="offset" value="10"/>
              <item value="${shifted}"/>
            </xacro:macro>
            <xacro:m base="5"/>
            "#,
        );
        assert_eq!(first(&robot, "item").attribute("value"), Some("15"));
    }

    #[test]
    fn test_cyclic_properties() {
        let result = expand_with(
            r#"<xacro:property name="a" value="${b + 1}"/>
               <xacro:property name="b" value="${a + 1}"/>
               <link name="${a}"/>"#,
            &[("robot_name", "x")],
        );
        match result {
            Err(TemplateError::CyclicProperty(chain)) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected cyclic property, got {:?}", other),
        }

        let result = expand_with(
            r#"<xacro:property name="a" value="${a}"/><link name="${a}"/>"#,
            &[("robot_name", "x")],
        );
        assert!(matches!(result, Err(TemplateError::CyclicProperty(_))));
    }

    #[test]
    fn test_conditionals_and_args() {
        let body = r#"
            <xacro:arg name="use_lidar" default="false"/>
            <xacro:property name="robot_name" value="$(arg robot)"/>
            <xacro:if value="$(arg use_lidar)"><link name="lidar"/></xacro:if>
            <xacro:unless value="$(arg use_lidar)"><link name="no_lidar"/></xacro:unless>
            <xacro:if value="${1 > 2}"><link name="never"/></xacro:if>
        "#;

        let robot = expand_with(body, &[("robot", "bot1")]).unwrap();
        assert_eq!(robot.attribute("name"), Some("bot1"));
        let links: Vec<_> = robot.elements().filter_map(|e| e.attribute("name")).collect();
        assert_eq!(links, vec!["no_lidar"]);

        let robot = expand_with(body, &[("robot", "bot1"), ("use_lidar", "true")]).unwrap();
        let links: Vec<_> = robot.elements().filter_map(|e| e.attribute("name")).collect();
        assert_eq!(links, vec!["lidar"]);

        let invalid = expand_with(
            r#"<xacro:if value="maybe"><link/></xacro:if>"#,
            &[("robot_name", "x")],
        );
        assert!(matches!(invalid, Err(TemplateError::InvalidBoolean(_))));
    }

    #[test]
    fn test_find_and_escapes() {
        let robot = expand(
            r#"
            <xacro:property name="robot_name" value="bot"/>
            <mesh filename="$(find mobile_robot)/meshes/base.stl"/>
            <note text="$${literal} and $$(literal)"/>
            "#,
        );
        assert_eq!(
            first(&robot, "mesh").attribute("filename"),
            Some("/opt/share/mobile_robot/meshes/base.stl")
        );
        assert_eq!(
            first(&robot, "note").attribute("text"),
            Some("${literal} and $(literal)")
        );
    }

    #[test]
    fn test_undefined_property() {
        let result = expand_with(r#"<link name="${nope}"/>"#, &[("robot_name", "x")]);
        assert!(matches!(result, Err(TemplateError::UndefinedProperty(name)) if name == "nope"));
    }

    #[test]
    fn test_includes_relative_to_including_file() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("model");
        fs::create_dir_all(model.join("parts")).unwrap();

        fs::write(
            model.join("robot.xacro"),
            format!(
                r#"<robot {} name="${{robot_name}}">
                     <xacro:include filename="parts/wheel.xacro"/>
                     <xacro:wheel prefix="left"/>
                   </robot>"#,
                XACRO_NS
            ),
        )
        .unwrap();
        fs::write(
            model.join("parts").join("wheel.xacro"),
            format!(
                r#"<robot {}>
                     <xacro:property name="robot_name" value="included"/>
                     <xacro:macro name="wheel" params="prefix">
                       <link name="${{prefix}}_wheel" dir="$(dirname)"/>
                     </xacro:macro>
                   </robot>"#,
                XACRO_NS
            ),
        )
        .unwrap();

        let locator = PackageMap::new();
        let path = model.join("robot.xacro");
        let document = parse_template(&fs::read_to_string(&path).unwrap()).unwrap();
        let robot = Expander::new(SubstitutionContext::new(&locator))
            .expand(&document, &path)
            .unwrap();

        assert_eq!(robot.attribute("name"), Some("included"));
        let link = first(&robot, "link");
        assert_eq!(link.attribute("name"), Some("left_wheel"));
        // $(dirname) is evaluated where the macro is expanded
        assert_eq!(
            link.attribute("dir"),
            Some(canonical(&model).to_string_lossy().as_ref())
        );

        let xml = to_xml_string(&robot).unwrap();
        assert!(!xml.contains("xacro"));
    }

    #[test]
    fn test_included_root_namespaces_are_hoisted() {
        let dir = TempDir::new().unwrap();
        let robot_path = dir.path().join("robot.xacro");
        fs::write(
            &robot_path,
            format!(
                r#"<robot {} name="bot"><xacro:include filename="gz.xacro"/></robot>"#,
                XACRO_NS
            ),
        )
        .unwrap();
        fs::write(
            dir.path().join("gz.xacro"),
            format!(
                r#"<robot {} xmlns:gz="http://gazebosim.org/schema">
                     <gazebo><gz:plugin gz:name="diff_drive"/></gazebo>
                   </robot>"#,
                XACRO_NS
            ),
        )
        .unwrap();

        let locator = PackageMap::new();
        let document = parse_template(&fs::read_to_string(&robot_path).unwrap()).unwrap();
        let robot = Expander::new(SubstitutionContext::new(&locator))
            .expand(&document, &robot_path)
            .unwrap();

        assert_eq!(robot.attribute("xmlns:gz"), Some("http://gazebosim.org/schema"));
        let xml = to_xml_string(&robot).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let plugin = doc
            .descendants()
            .find(|n| n.has_tag_name(("http://gazebosim.org/schema", "plugin")))
            .unwrap();
        assert_eq!(
            plugin.attribute(("http://gazebosim.org/schema", "name")),
            Some("diff_drive")
        );
    }

    #[test]
    fn test_include_errors() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.xacro");
        let b = dir.path().join("b.xacro");
        fs::write(
            &a,
            format!(r#"<robot {}><xacro:include filename="b.xacro"/></robot>"#, XACRO_NS),
        )
        .unwrap();
        fs::write(
            &b,
            format!(r#"<robot {}><xacro:include filename="a.xacro"/></robot>"#, XACRO_NS),
        )
        .unwrap();

        let locator = PackageMap::new();
        let document = parse_template(&fs::read_to_string(&a).unwrap()).unwrap();
        let result = Expander::new(SubstitutionContext::new(&locator)).expand(&document, &a);
        match result {
            Err(TemplateError::CyclicInclude(chain)) => assert_eq!(chain.len(), 3),
            other => panic!("expected cyclic include, got {:?}", other),
        }

        let document = parse_template(&format!(
            r#"<robot {}><xacro:include filename="missing.xacro"/></robot>"#,
            XACRO_NS
        ))
        .unwrap();
        let result = Expander::new(SubstitutionContext::new(&locator)).expand(&document, &a);
        assert!(matches!(result, Err(TemplateError::MissingInclude { .. })));
    }
}
