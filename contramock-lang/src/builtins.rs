//! Predeclared identifiers and package functions.
//!
//! Type identifiers (`string`, `uint8`, ...) resolve to lattice
//! constraints. Functions operate on concrete arguments exported to JSON,
//! and always produce a scalar.

use serde_json::Value as Json;

use crate::error::EvalError;
use crate::kind::{Bound, BoundOp, Constraint, Kind, Scalar, Val};

/// A callable builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Len,
    ListContains,
    ListSum,
    ListMax,
    ListMin,
    StringsContains,
    StringsHasPrefix,
    StringsHasSuffix,
    StringsToUpper,
    StringsToLower,
    StringsJoin,
}

impl Builtin {
    /// The qualified name, for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::ListContains => "list.Contains",
            Builtin::ListSum => "list.Sum",
            Builtin::ListMax => "list.Max",
            Builtin::ListMin => "list.Min",
            Builtin::StringsContains => "strings.Contains",
            Builtin::StringsHasPrefix => "strings.HasPrefix",
            Builtin::StringsHasSuffix => "strings.HasSuffix",
            Builtin::StringsToUpper => "strings.ToUpper",
            Builtin::StringsToLower => "strings.ToLower",
            Builtin::StringsJoin => "strings.Join",
        }
    }

    fn arity(self) -> usize {
        match self {
            Builtin::Len
            | Builtin::ListSum
            | Builtin::ListMax
            | Builtin::ListMin
            | Builtin::StringsToUpper
            | Builtin::StringsToLower => 1,
            _ => 2,
        }
    }
}

/// Packages that may be imported.
pub fn is_package(name: &str) -> bool {
    matches!(name, "list" | "strings")
}

/// Look up `package.Member`.
pub fn member(package: &str, name: &str) -> Option<Builtin> {
    Some(match (package, name) {
        ("list", "Contains") => Builtin::ListContains,
        ("list", "Sum") => Builtin::ListSum,
        ("list", "Max") => Builtin::ListMax,
        ("list", "Min") => Builtin::ListMin,
        ("strings", "Contains") => Builtin::StringsContains,
        ("strings", "HasPrefix") => Builtin::StringsHasPrefix,
        ("strings", "HasSuffix") => Builtin::StringsHasSuffix,
        ("strings", "ToUpper") => Builtin::StringsToUpper,
        ("strings", "ToLower") => Builtin::StringsToLower,
        ("strings", "Join") => Builtin::StringsJoin,
        _ => return None,
    })
}

/// Unqualified builtin functions.
pub fn function(name: &str) -> Option<Builtin> {
    match name {
        "len" => Some(Builtin::Len),
        _ => None,
    }
}

fn int_range(min: i128, max: i128) -> Val {
    Val::Constraint(Constraint {
        kinds: Kind::INT,
        bounds: vec![
            Bound {
                op: BoundOp::GreaterEqual,
                value: Scalar::Int(min),
            },
            Bound {
                op: BoundOp::LessEqual,
                value: Scalar::Int(max),
            },
        ],
    })
}

/// The constraint a predeclared type identifier stands for.
pub fn type_constraint(name: &str) -> Option<Val> {
    let val = match name {
        "string" => Val::kind(Kind::STRING),
        "bool" => Val::kind(Kind::BOOL),
        "int" => Val::kind(Kind::INT),
        "float" => Val::kind(Kind::FLOAT),
        "number" => Val::kind(Kind::NUMBER),
        "uint" => Val::Constraint(Constraint {
            kinds: Kind::INT,
            bounds: vec![Bound {
                op: BoundOp::GreaterEqual,
                value: Scalar::Int(0),
            }],
        }),
        "int8" => int_range(i8::MIN.into(), i8::MAX.into()),
        "int16" => int_range(i16::MIN.into(), i16::MAX.into()),
        "int32" => int_range(i32::MIN.into(), i32::MAX.into()),
        "int64" => int_range(i64::MIN.into(), i64::MAX.into()),
        "uint8" => int_range(0, u8::MAX.into()),
        "uint16" => int_range(0, u16::MAX.into()),
        "uint32" => int_range(0, u32::MAX.into()),
        "uint64" => int_range(0, u64::MAX.into()),
        _ => return None,
    };
    Some(val)
}

fn arg_error(builtin: Builtin, message: impl std::fmt::Display) -> EvalError {
    EvalError::conflict(format!("{}: {message}", builtin.name()))
}

fn string_arg(builtin: Builtin, value: &Json) -> Result<&str, EvalError> {
    value
        .as_str()
        .ok_or_else(|| arg_error(builtin, format!("expected string argument, found {value}")))
}

fn list_arg(builtin: Builtin, value: &Json) -> Result<&[Json], EvalError> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| arg_error(builtin, format!("expected list argument, found {value}")))
}

fn numbers(builtin: Builtin, value: &Json) -> Result<Vec<Scalar>, EvalError> {
    list_arg(builtin, value)?
        .iter()
        .map(|item| {
            json_number(item)
                .ok_or_else(|| arg_error(builtin, format!("expected number, found {item}")))
        })
        .collect()
}

fn json_number(value: &Json) -> Option<Scalar> {
    if let Some(i) = value.as_i64() {
        Some(Scalar::Int(i.into()))
    } else if let Some(u) = value.as_u64() {
        Some(Scalar::Int(u.into()))
    } else {
        value
            .as_f64()
            .map(|f| Scalar::Float(ordered_float::OrderedFloat(f)))
    }
}

/// Call a builtin with concrete arguments.
pub fn call(builtin: Builtin, args: &[Json]) -> Result<Scalar, EvalError> {
    if args.len() != builtin.arity() {
        return Err(arg_error(
            builtin,
            format!("expected {} arguments, found {}", builtin.arity(), args.len()),
        ));
    }

    match builtin {
        Builtin::Len => {
            let len = match &args[0] {
                Json::String(s) => s.len(),
                Json::Array(items) => items.len(),
                Json::Object(fields) => fields.len(),
                other => return Err(arg_error(builtin, format!("invalid argument {other}"))),
            };
            Ok(Scalar::Int(len as i128))
        }
        Builtin::ListContains => Ok(Scalar::Bool(list_arg(builtin, &args[0])?.contains(&args[1]))),
        Builtin::ListSum => {
            numbers(builtin, &args[0])?
                .into_iter()
                .try_fold(Scalar::Int(0), |acc, n| {
                    crate::ops::binary(crate::ast::BinaryOp::Add, acc, n)
                })
        }
        Builtin::ListMax | Builtin::ListMin => {
            let items = numbers(builtin, &args[0])?;
            let want = if builtin == Builtin::ListMax {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Less
            };
            items
                .into_iter()
                .reduce(|best, n| if n.compare(&best) == Some(want) { n } else { best })
                .ok_or_else(|| arg_error(builtin, "empty list"))
        }
        Builtin::StringsContains => Ok(Scalar::Bool(
            string_arg(builtin, &args[0])?.contains(string_arg(builtin, &args[1])?),
        )),
        Builtin::StringsHasPrefix => Ok(Scalar::Bool(
            string_arg(builtin, &args[0])?.starts_with(string_arg(builtin, &args[1])?),
        )),
        Builtin::StringsHasSuffix => Ok(Scalar::Bool(
            string_arg(builtin, &args[0])?.ends_with(string_arg(builtin, &args[1])?),
        )),
        Builtin::StringsToUpper => Ok(Scalar::Str(string_arg(builtin, &args[0])?.to_uppercase())),
        Builtin::StringsToLower => Ok(Scalar::Str(string_arg(builtin, &args[0])?.to_lowercase())),
        Builtin::StringsJoin => {
            let parts = list_arg(builtin, &args[0])?
                .iter()
                .map(|item| string_arg(builtin, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Scalar::Str(parts.join(string_arg(builtin, &args[1])?)))
        }
    }
}
