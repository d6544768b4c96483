//! YAML programs: schema, parsing, dependency ordering and execution.

pub mod executor;
pub mod parser;
pub mod resolver;
pub mod types;
