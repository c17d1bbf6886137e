//! Contract-based mocks.
//!
//! A mock is described by a schema in which every function is one or more
//! overloads: argument constraints, an optional call quota and return
//! expressions that may refer to the arguments. Calling a mock unifies the
//! arguments with each overload in turn and returns the values of the first
//! one that stays consistent.
//!
//! # Example
//!
//! ```
//! use contramock::{Mock, TypeRegistry};
//!
//! let schema = r#"
//! funcs: Greet: #MockFunction & {
//!     args: [string]
//!     returns: ["hello " + args[0]]
//! }
//! "#;
//! let mut mock = Mock::new(&TypeRegistry::new(), schema).unwrap();
//! let greeting: String = mock.exec1("Greet", ("world",)).unwrap();
//! assert_eq!(greeting, "hello world");
//! ```
//!
//! # Modules
//!
//! - [`base`] is the built-in schema (`#MockFunction`, `#Error`).
//! - [`registry`] turns host types into definitions.
//! - [`mock`] compiles a schema; [`resolve`] picks an overload per call and
//!   [`ledger`] counts the attempts.
//! - [`exec`] is the typed call surface.

pub mod base;
pub mod error;
pub mod exec;
pub mod ledger;
pub mod mock;
pub mod registry;
pub mod resolve;
pub mod vars;

pub use contramock_lang::Value;
pub use error::{FailureCause, MockError, OverloadFailure, ResolveError};
pub use exec::{IntoArgs, MockedError};
pub use ledger::CallLedger;
pub use mock::{FunctionSchema, Mock, Overload};
pub use registry::TypeRegistry;
pub use vars::Vars;
