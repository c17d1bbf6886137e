//! Arithmetic, comparison and logical operators on concrete scalars.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::EvalError;
use crate::kind::Scalar;

fn invalid(op: &str, operand: &Scalar) -> EvalError {
    EvalError::conflict(format!(
        "invalid operation {op}{operand} (operator not defined on {})",
        operand.kind()
    ))
}

fn mismatched(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> EvalError {
    EvalError::conflict(format!(
        "invalid operation {lhs} {} {rhs} (mismatched types {} and {})",
        op.symbol(),
        lhs.kind(),
        rhs.kind()
    ))
}

fn float(value: f64) -> Scalar {
    Scalar::Float(OrderedFloat(value))
}

/// Apply a value-producing unary operator.
pub fn unary(op: UnaryOp, operand: Scalar) -> Result<Scalar, EvalError> {
    match (op, &operand) {
        (UnaryOp::Not, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
        (UnaryOp::Neg, Scalar::Int(i)) => i
            .checked_neg()
            .map(Scalar::Int)
            .ok_or_else(|| EvalError::conflict("integer overflow")),
        (UnaryOp::Neg, Scalar::Float(x)) => Ok(float(-x.0)),
        (UnaryOp::Plus, Scalar::Int(_) | Scalar::Float(_)) => Ok(operand),
        (UnaryOp::Not, _) => Err(invalid("!", &operand)),
        (UnaryOp::Neg, _) => Err(invalid("-", &operand)),
        (UnaryOp::Plus, _) => Err(invalid("+", &operand)),
        _ => Err(EvalError::conflict(format!(
            "bound {op:?} cannot be applied as a value operator"
        ))),
    }
}

/// Apply a value-producing binary operator.
///
/// Unification and disjunction are handled by the evaluator; passing them
/// here is an error.
pub fn binary(op: BinaryOp, lhs: Scalar, rhs: Scalar) -> Result<Scalar, EvalError> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = equals(op, &lhs, &rhs)?;
            Ok(Scalar::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = lhs
                .compare(&rhs)
                .ok_or_else(|| mismatched(op, &lhs, &rhs))?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Scalar::Bool(result))
        }
        BinaryOp::And | BinaryOp::Or => match (&lhs, &rhs) {
            (Scalar::Bool(a), Scalar::Bool(b)) => Ok(Scalar::Bool(if op == BinaryOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatched(op, &lhs, &rhs)),
        },
        BinaryOp::Add => match (&lhs, &rhs) {
            (Scalar::Str(a), Scalar::Str(b)) => Ok(Scalar::Str(format!("{a}{b}"))),
            _ => arithmetic(op, &lhs, &rhs, i128::checked_add, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(op, &lhs, &rhs, i128::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, &lhs, &rhs, i128::checked_mul, |a, b| a * b),
        BinaryOp::Div => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatched(op, &lhs, &rhs)),
            };
            if b == 0.0 {
                return Err(EvalError::conflict("division by zero"));
            }
            Ok(float(a / b))
        }
        BinaryOp::Unify | BinaryOp::Disjoin => Err(EvalError::conflict(format!(
            "operator {} is not a value operator",
            op.symbol()
        ))),
    }
}

fn equals(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Scalar::Null, _) | (_, Scalar::Null) => Ok(lhs == rhs),
        _ if lhs.kind() == rhs.kind() || (lhs.as_f64().is_some() && rhs.as_f64().is_some()) => {
            Ok(lhs.loosely_equals(rhs))
        }
        _ => Err(mismatched(op, lhs, rhs)),
    }
}

fn arithmetic(
    op: BinaryOp,
    lhs: &Scalar,
    rhs: &Scalar,
    int_op: fn(i128, i128) -> Option<i128>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Scalar, EvalError> {
    match (lhs, rhs) {
        (Scalar::Int(a), Scalar::Int(b)) => int_op(*a, *b)
            .map(Scalar::Int)
            .ok_or_else(|| EvalError::conflict("integer overflow")),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(float(float_op(a, b))),
            _ => Err(mismatched(op, lhs, rhs)),
        },
    }
}
