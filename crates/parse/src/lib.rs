pub mod ast;
mod loader;
mod parser;

pub use ast::*;
pub use loader::{LoadError, SourceLoader};
pub use parser::{parse_program, ParseError, MAX_INCLUDE_DEPTH};
