//! A small constraint and unification language for mock schemas.
//!
//! Schemas are written in a CUE-like syntax: structs and lists, definitions
//! (`#Name`) that close the structs they describe, open lists (`[...T]`),
//! pattern constraints (`[string]: T`), disjunctions with defaults
//! (`*x | y`), bounds (`>=0`), references and simple arithmetic.
//!
//! # Example
//!
//! ```
//! use contramock_lang::{Path, Value};
//!
//! let schema = Value::compile("greeting: { name: string, text: \"hello \" + name }", None).unwrap();
//! let filled = schema.fill_path(
//!     &Path::parse("greeting.name").unwrap(),
//!     &Value::from_json(&serde_json::json!("world")).unwrap(),
//! );
//! let text: String = filled.lookup_str("greeting.text").unwrap().decode().unwrap();
//! assert_eq!(text, "hello world");
//! ```
//!
//! # Modules
//!
//! - [`token`] and [`parser`] turn source text into the [`ast`].
//! - [`kind`] holds the scalar lattice; [`ops`] and [`builtins`] compute on
//!   concrete scalars.
//! - [`value`] is the entry point: an immutable [`Value`] that materialises
//!   an evaluation graph for every query.
//! - [`encode`] bridges host data (through `serde_json`) and syntax.

pub mod ast;
pub mod builtins;
pub mod encode;
pub mod error;
mod graph;
pub mod kind;
pub mod ops;
pub mod parser;
pub mod path;
pub mod span;
pub mod token;
pub mod value;

pub use error::{ErrorKind, EvalError, EvalErrors};
pub use kind::Kind;
pub use parser::{parse_expr, parse_file};
pub use path::{Path, Selector};
pub use span::Span;
pub use value::{Syntax, Value};
