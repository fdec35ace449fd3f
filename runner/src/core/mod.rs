//! Deterministic, pure logic shared by the lab interpreter.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod command;
pub mod expr;
pub mod json;
pub mod lint;
pub mod machine;
pub mod path_query;
pub mod template;
pub mod topology;
pub mod types;
pub mod validator;
pub mod vars;
pub mod world;
