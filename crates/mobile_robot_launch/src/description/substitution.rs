//! Substitution engine for `$(arg)`, `$(find)` and `$(dirname)` patterns

use crate::description::package::PackageLocator;
use indexmap::IndexMap;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Regex for the body of an extension: `type value` or `type`
static EXTENSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)(?:\s+(\S.*))?$").unwrap());

/// A piece of template text
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text, escapes already applied
    Literal(String),
    /// Body of a `${...}` expression
    Expression(String),
    /// Body of a `$(...)` extension
    Extension(String),
}

/// Split template text into literal, expression and extension segments.
///
/// `$${` and `$$(` produce a literal `${` and `$(`.
pub fn split_segments(input: &str) -> Result<Vec<Segment>, SubstitutionError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        literal.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(stripped) = after.strip_prefix("${") {
            literal.push_str("${");
            rest = stripped;
            continue;
        }
        if let Some(stripped) = after.strip_prefix("$(") {
            literal.push_str("$(");
            rest = stripped;
            continue;
        }

        let (open, close) = match after.chars().next() {
            Some('{') => ('{', '}'),
            Some('(') => ('(', ')'),
            _ => {
                literal.push('$');
                rest = after;
                continue;
            }
        };

        let body = &after[1..];
        let end = find_closing(body, open, close)
            .ok_or_else(|| SubstitutionError::Unterminated(input.to_string()))?;

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let inner = body[..end].to_string();
        segments.push(if open == '{' {
            Segment::Expression(inner)
        } else {
            Segment::Extension(inner)
        });
        rest = &body[end + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

/// Byte offset of the bracket closing an already opened one, skipping quoted text
fn find_closing(body: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            c if c == open => depth += 1,
            c if c == close => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    None
}

/// Substitution context containing all available variables
pub struct SubstitutionContext<'a> {
    /// Template arguments (overrides first, then declared defaults)
    pub args: IndexMap<String, String>,
    locator: &'a dyn PackageLocator,
}

impl<'a> SubstitutionContext<'a> {
    /// Create a new substitution context
    pub fn new(locator: &'a dyn PackageLocator) -> Self {
        Self {
            args: IndexMap::new(),
            locator,
        }
    }

    /// Add multiple arguments
    pub fn with_args(mut self, args: IndexMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    /// Declare an argument default; an existing value is kept
    pub fn declare_arg(&mut self, name: &str, default: String) {
        self.args.entry(name.to_string()).or_insert(default);
    }

    /// Resolve the body of a `$(...)` extension.
    ///
    /// `current_file` is the template the extension appears in.
    pub fn resolve_extension(
        &self,
        body: &str,
        current_file: &Path,
    ) -> Result<String, SubstitutionError> {
        let caps = EXTENSION_PATTERN
            .captures(body.trim())
            .ok_or_else(|| SubstitutionError::InvalidPattern(body.to_string()))?;

        let kind = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

        match kind {
            "arg" => self.resolve_arg(value),
            "find" => self.resolve_find(value),
            "dirname" => Ok(current_file
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default()),
            _ => Err(SubstitutionError::UnknownType(kind.to_string())),
        }
    }

    /// Resolve an argument reference
    fn resolve_arg(&self, name: &str) -> Result<String, SubstitutionError> {
        if name.is_empty() {
            return Err(SubstitutionError::InvalidPattern("arg".to_string()));
        }
        self.args
            .get(name)
            .cloned()
            .ok_or_else(|| SubstitutionError::UndefinedArg(name.to_string()))
    }

    /// Resolve a package share directory
    fn resolve_find(&self, package: &str) -> Result<String, SubstitutionError> {
        self.locator
            .share_dir(package)
            .map(|dir| dir.to_string_lossy().into_owned())
            .ok_or_else(|| SubstitutionError::PackageNotFound(package.to_string()))
    }
}

/// Errors that can occur during substitution
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Unknown substitution type: {0}")]
    UnknownType(String),

    #[error("Undefined argument: {0}")]
    UndefinedArg(String),

    #[error("Package '{0}' not found")]
    PackageNotFound(String),

    #[error("Invalid substitution pattern: {0}")]
    InvalidPattern(String),

    #[error("Unterminated substitution in: {0}")]
    Unterminated(String),
}
