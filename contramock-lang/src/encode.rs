//! Conversion between host values (via `serde_json`) and schema syntax.

use serde_json::{Number, Value as Json};

use crate::ast::{BinaryOp, Decl, Expr, Label, ListLit, StructLit};
use crate::error::{ErrorKind, EvalError};
use crate::graph::MAX_DEPTH;
use crate::kind::Scalar;

/// Encode a concrete JSON value as an expression.
///
/// Fails with a `Cycle` error when the value nests deeper than the
/// evaluator can export.
pub fn json_to_expr(value: &Json) -> Result<Expr, EvalError> {
    encode(value, Encoding::Concrete, 0)
}

/// Encode the *shape* of a JSON value: concrete leaves become their types.
///
/// Used to register host types from their default value. `null` becomes
/// `*null | _` so optional fields accept any value but default to null.
pub fn shape_of(value: &Json) -> Result<Expr, EvalError> {
    encode(value, Encoding::Shape, 0)
}

#[derive(Clone, Copy)]
enum Encoding {
    Concrete,
    Shape,
}

fn encode(value: &Json, encoding: Encoding, depth: usize) -> Result<Expr, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::new(
            ErrorKind::Cycle,
            format!("value nested deeper than {MAX_DEPTH} levels"),
        ));
    }
    Ok(match (encoding, value) {
        (_, Json::Object(fields)) if !fields.is_empty() => Expr::Struct(StructLit {
            decls: fields
                .iter()
                .map(|(name, value)| {
                    Ok(Decl::Field {
                        label: Label::Regular(name.clone()),
                        optional: false,
                        value: encode(value, encoding, depth + 1)?,
                    })
                })
                .collect::<Result<_, EvalError>>()?,
        }),

        (Encoding::Concrete, Json::Null) => Expr::Null,
        (Encoding::Concrete, Json::Bool(b)) => Expr::Bool(*b),
        (Encoding::Concrete, Json::Number(n)) => number_expr(n),
        (Encoding::Concrete, Json::String(s)) => Expr::String(s.clone()),
        (Encoding::Concrete, Json::Array(items)) => Expr::List(ListLit {
            elems: items
                .iter()
                .map(|item| encode(item, encoding, depth + 1))
                .collect::<Result<_, EvalError>>()?,
            tail: None,
        }),
        (Encoding::Concrete, Json::Object(_)) => Expr::Struct(StructLit { decls: Vec::new() }),

        (Encoding::Shape, Json::Null) => Expr::Binary(
            BinaryOp::Disjoin,
            Box::new(Expr::Default(Box::new(Expr::Null))),
            Box::new(Expr::Top),
        ),
        (Encoding::Shape, Json::Bool(_)) => Expr::Ident("bool".into()),
        (Encoding::Shape, Json::Number(n)) if n.is_f64() => Expr::Ident("number".into()),
        (Encoding::Shape, Json::Number(_)) => Expr::Ident("int".into()),
        (Encoding::Shape, Json::String(_)) => Expr::Ident("string".into()),
        (Encoding::Shape, Json::Array(_)) => Expr::List(ListLit {
            elems: Vec::new(),
            tail: Some(Box::new(Expr::Top)),
        }),
        (Encoding::Shape, Json::Object(_)) => Expr::Struct(StructLit {
            decls: vec![Decl::Ellipsis],
        }),
    })
}

fn number_expr(n: &Number) -> Expr {
    if let Some(i) = n.as_i64() {
        Expr::Int(i.into())
    } else if let Some(u) = n.as_u64() {
        Expr::Int(u.into())
    } else {
        Expr::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Export a concrete scalar to JSON.
pub fn scalar_to_json(scalar: &Scalar) -> Result<Json, EvalError> {
    Ok(match scalar {
        Scalar::Null => Json::Null,
        Scalar::Bool(b) => Json::Bool(*b),
        Scalar::Int(i) => {
            if let Ok(small) = i64::try_from(*i) {
                Json::from(small)
            } else if let Ok(big) = u64::try_from(*i) {
                Json::from(big)
            } else {
                return Err(EvalError::decode(format!("integer {i} does not fit in 64 bits")));
            }
        }
        Scalar::Float(x) => Number::from_f64(x.0)
            .map(Json::Number)
            .ok_or_else(|| EvalError::decode(format!("cannot export non-finite float {}", x.0)))?,
        Scalar::Str(s) => Json::String(s.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_to_expr_struct() {
        let expr = json_to_expr(&json!({"Value": "a"})).unwrap();
        assert_eq!(
            expr,
            Expr::field(Label::Regular("Value".into()), Expr::String("a".into()))
        );
    }

    #[test]
    fn test_json_to_expr_list_is_closed() {
        let Expr::List(list) = json_to_expr(&json!([1, 2])).unwrap() else {
            panic!("expected list");
        };
        assert_eq!(list.elems, vec![Expr::Int(1), Expr::Int(2)]);
        assert!(list.tail.is_none());
    }

    #[test]
    fn test_large_unsigned() {
        assert_eq!(json_to_expr(&json!(u64::MAX)).unwrap(), Expr::Int(u64::MAX.into()));
    }

    #[test]
    fn test_shape_of_leaves() {
        assert_eq!(shape_of(&json!("")).unwrap(), Expr::Ident("string".into()));
        assert_eq!(shape_of(&json!(0)).unwrap(), Expr::Ident("int".into()));
        assert_eq!(shape_of(&json!(0.0)).unwrap(), Expr::Ident("number".into()));
        assert_eq!(shape_of(&json!(false)).unwrap(), Expr::Ident("bool".into()));
    }

    #[test]
    fn test_shape_of_null_defaults() {
        let Expr::Binary(BinaryOp::Disjoin, lhs, rhs) = shape_of(&json!(null)).unwrap() else {
            panic!("expected disjunction");
        };
        assert_eq!(*lhs, Expr::Default(Box::new(Expr::Null)));
        assert_eq!(*rhs, Expr::Top);
    }

    #[test]
    fn test_shape_of_empty_map_is_open() {
        assert_eq!(
            shape_of(&json!({})).unwrap(),
            Expr::Struct(StructLit {
                decls: vec![Decl::Ellipsis]
            })
        );
    }

    fn nested_list(depth: usize) -> Json {
        let mut value = json!(1);
        for _ in 0..depth {
            value = Json::Array(vec![value]);
        }
        value
    }

    #[test]
    fn test_json_to_expr_depth_limit() {
        assert!(json_to_expr(&nested_list(MAX_DEPTH)).is_ok());

        let error = json_to_expr(&nested_list(2000)).unwrap_err();
        assert_eq!(error.kind, ErrorKind::Cycle);
        assert!(error.message.contains("nested deeper"), "{}", error.message);
    }

    #[test]
    fn test_shape_of_depth_limit() {
        let mut value = json!({"Leaf": ""});
        for _ in 0..300 {
            value = json!({ "Inner": value });
        }
        assert_eq!(shape_of(&value).unwrap_err().kind, ErrorKind::Cycle);
    }

    #[test]
    fn test_scalar_to_json_range() {
        assert_eq!(scalar_to_json(&Scalar::Int(u64::MAX.into())).unwrap(), json!(u64::MAX));
        assert!(scalar_to_json(&Scalar::Int(i128::MAX)).is_err());
    }
}
