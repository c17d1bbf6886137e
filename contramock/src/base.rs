//! The built-in schema every mock is compiled against.
//!
//! It reserves two top-level fields: `funcs`, where each regular field is a
//! function (one `#MockFunction` or a list of overloads), and `vars`, which
//! receives injected variables.

use contramock_lang::Value;

/// Top-level field holding the declared functions.
pub const FUNCS: &str = "funcs";
/// Top-level field holding injected variables.
pub const VARS: &str = "vars";
/// Argument constraints of an overload.
pub const ARGS: &str = "args";
/// Return expressions of an overload.
pub const RETURNS: &str = "returns";
/// Call quota of an overload.
pub const MAX_CALLS: &str = "maxCalls";

/// `maxCalls` value meaning the overload may be called any number of times.
pub const UNBOUNDED: u64 = u64::MAX;

/// Source text of the built-in schema.
pub const BASE_SCHEMA: &str = r#"
#Error: {
	Error: string
}

#MockFunction: {
	args:     [..._]
	maxCalls: uint | *18446744073709551615
	returns:  [..._]
}

vars: [string]: _
funcs: [string]: #MockFunction | [...#MockFunction]
"#;

/// Compile the built-in schema.
///
/// # Panics
///
/// Panics if the built-in schema fails to compile, which is a bug in this crate.
pub fn base_schema() -> Value {
    match Value::compile(BASE_SCHEMA, None) {
        Ok(value) => value,
        Err(errors) => panic!("bug: built-in schema failed to compile ({errors}); please report this"),
    }
}
