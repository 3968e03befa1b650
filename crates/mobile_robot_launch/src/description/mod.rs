//! Robot description resolution: xacro templates to plain URDF

mod ast;
mod error;
mod expand;
pub mod expr;
mod package;
mod parser;
mod resolver;
mod substitution;
mod summary;
mod writer;

pub use ast::*;
pub use error::*;
pub use expand::Expander;
pub use package::*;
pub use parser::parse_template;
pub use resolver::*;
pub use substitution::*;
pub use summary::*;
pub use writer::*;
