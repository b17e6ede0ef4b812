//! Configuration engine: parsing, namespaces, scope navigation and macro
//! expansion.

pub mod expand;
pub mod namespace;
pub mod parser;
pub mod scope;
pub mod statement;

pub use namespace::SpaceId;
pub use parser::ParseError;
pub use scope::Engine;
pub use statement::{EvalCell, EvalState, Statement, ValueStatement};
