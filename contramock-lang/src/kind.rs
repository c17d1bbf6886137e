//! The scalar value lattice.
//!
//! Every vertex of an evaluation carries a [`Val`]: either a concrete
//! [`Scalar`] atom, a [`Constraint`] (a set of admissible kinds plus
//! bounds), or bottom. Struct and list shape is part of the kind set so
//! that `{}` and `[]` conflict with each other and with atoms.

use std::fmt;

use bitflags::bitflags;
use ordered_float::OrderedFloat;

use crate::ast::UnaryOp;
use crate::error::EvalError;

bitflags! {
    /// The set of kinds a value may still take.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Kind: u8 {
        const NULL = 1 << 0;
        const BOOL = 1 << 1;
        const INT = 1 << 2;
        const FLOAT = 1 << 3;
        const STRING = 1 << 4;
        const STRUCT = 1 << 5;
        const LIST = 1 << 6;

        const NUMBER = Self::INT.bits() | Self::FLOAT.bits();
        const SCALAR = Self::NULL.bits()
            | Self::BOOL.bits()
            | Self::NUMBER.bits()
            | Self::STRING.bits();
        const TOP = Self::SCALAR.bits() | Self::STRUCT.bits() | Self::LIST.bits();
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Kind::TOP {
            return f.write_str("_");
        }
        if self.is_empty() {
            return f.write_str("_|_");
        }
        let mut names = Vec::new();
        if self.contains(Kind::NUMBER) {
            names.push("number");
        } else if self.contains(Kind::INT) {
            names.push("int");
        } else if self.contains(Kind::FLOAT) {
            names.push("float");
        }
        for (kind, name) in [
            (Kind::NULL, "null"),
            (Kind::BOOL, "bool"),
            (Kind::STRING, "string"),
            (Kind::STRUCT, "struct"),
            (Kind::LIST, "list"),
        ] {
            if self.contains(kind) {
                names.push(name);
            }
        }
        f.write_str(&names.join("|"))
    }
}

/// A concrete scalar value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i128),
    Float(OrderedFloat<f64>),
    Str(String),
}

impl Scalar {
    /// The kind of this scalar.
    pub fn kind(&self) -> Kind {
        match self {
            Scalar::Null => Kind::NULL,
            Scalar::Bool(_) => Kind::BOOL,
            Scalar::Int(_) => Kind::INT,
            Scalar::Float(_) => Kind::FLOAT,
            Scalar::Str(_) => Kind::STRING,
        }
    }

    /// The numeric value, for ints and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(f.0),
            _ => None,
        }
    }

    /// Equality with numeric promotion (`1 == 1.0`).
    pub fn loosely_equals(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Int(_), Scalar::Float(_)) | (Scalar::Float(_), Scalar::Int(_)) => {
                self.as_f64() == other.as_f64()
            }
            _ => self == other,
        }
    }

    /// Ordering between comparable scalars (numbers with numbers, strings with strings).
    pub fn compare(&self, other: &Scalar) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{}", x.0),
            Scalar::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// A bound constraint such as `!=""` or `>=0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub op: BoundOp,
    pub value: Scalar,
}

/// The comparison of a [`Bound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundOp {
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BoundOp {
    /// Map a unary operator onto a bound, if it is one.
    pub fn from_unary(op: UnaryOp) -> Option<BoundOp> {
        Some(match op {
            UnaryOp::NotEqual => BoundOp::NotEqual,
            UnaryOp::Less => BoundOp::Less,
            UnaryOp::LessEqual => BoundOp::LessEqual,
            UnaryOp::Greater => BoundOp::Greater,
            UnaryOp::GreaterEqual => BoundOp::GreaterEqual,
            UnaryOp::Not | UnaryOp::Neg | UnaryOp::Plus => return None,
        })
    }

    fn symbol(self) -> &'static str {
        match self {
            BoundOp::NotEqual => "!=",
            BoundOp::Less => "<",
            BoundOp::LessEqual => "<=",
            BoundOp::Greater => ">",
            BoundOp::GreaterEqual => ">=",
        }
    }
}

impl Bound {
    /// Kinds a value must have to satisfy this bound at all.
    pub fn kinds(&self) -> Kind {
        match self.op {
            BoundOp::NotEqual => Kind::TOP,
            _ if self.value.kind() == Kind::STRING => Kind::STRING,
            _ => Kind::NUMBER,
        }
    }

    /// Whether a concrete scalar satisfies this bound.
    pub fn admits(&self, value: &Scalar) -> bool {
        use std::cmp::Ordering::*;

        if self.op == BoundOp::NotEqual {
            return !value.loosely_equals(&self.value);
        }
        match value.compare(&self.value) {
            Some(ordering) => match self.op {
                BoundOp::Less => ordering == Less,
                BoundOp::LessEqual => ordering != Greater,
                BoundOp::Greater => ordering == Greater,
                BoundOp::GreaterEqual => ordering != Less,
                BoundOp::NotEqual => unreachable!("handled above"),
            },
            None => false,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.value)
    }
}

/// A non-concrete constraint: admissible kinds plus bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub kinds: Kind,
    pub bounds: Vec<Bound>,
}

impl Constraint {
    /// Constraint admitting exactly the given kinds.
    pub fn of(kinds: Kind) -> Self {
        Self {
            kinds,
            bounds: Vec::new(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.kinds != Kind::TOP || self.bounds.is_empty() {
            parts.push(self.kinds.to_string());
        }
        parts.extend(self.bounds.iter().map(|b| b.to_string()));
        f.write_str(&parts.join(" & "))
    }
}

/// The lattice value of a vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Atom(Scalar),
    Constraint(Constraint),
    Bottom(EvalError),
}

impl Val {
    /// `_`, the top of the lattice.
    pub fn top() -> Val {
        Val::Constraint(Constraint::of(Kind::TOP))
    }

    /// A kind constraint.
    pub fn kind(kinds: Kind) -> Val {
        Val::Constraint(Constraint::of(kinds))
    }

    /// The kinds this value may still take.
    pub fn kinds(&self) -> Kind {
        match self {
            Val::Atom(scalar) => scalar.kind(),
            Val::Constraint(c) => c.kinds,
            Val::Bottom(_) => Kind::empty(),
        }
    }

    /// Whether this value is bottom.
    pub fn is_bottom(&self) -> bool {
        matches!(self, Val::Bottom(_))
    }

    /// Unify two lattice values.
    pub fn meet(self, other: Val) -> Val {
        match (self, other) {
            (Val::Bottom(e), _) | (_, Val::Bottom(e)) => Val::Bottom(e),
            (Val::Atom(a), Val::Atom(b)) => {
                if a == b || (a.kind() == b.kind() && a.loosely_equals(&b)) {
                    Val::Atom(a)
                } else {
                    Val::Bottom(EvalError::conflict(format!(
                        "conflicting values {a} and {b}"
                    )))
                }
            }
            (Val::Atom(a), Val::Constraint(c)) | (Val::Constraint(c), Val::Atom(a)) => {
                if !c.kinds.intersects(a.kind()) {
                    return Val::Bottom(EvalError::conflict(format!(
                        "conflicting values {a} and {} (mismatched types {} and {})",
                        c,
                        a.kind(),
                        c.kinds
                    )));
                }
                if let Some(bound) = c.bounds.iter().find(|b| !b.admits(&a)) {
                    return Val::Bottom(EvalError::conflict(format!(
                        "invalid value {a} (out of bound {bound})"
                    )));
                }
                Val::Atom(a)
            }
            (Val::Constraint(a), Val::Constraint(b)) => {
                let kinds = a.kinds & b.kinds;
                if kinds.is_empty() {
                    return Val::Bottom(EvalError::conflict(format!(
                        "conflicting values {a} and {b} (mismatched types {} and {})",
                        a.kinds, b.kinds
                    )));
                }
                let mut bounds = a.bounds;
                for bound in b.bounds {
                    if !bounds.contains(&bound) {
                        bounds.push(bound);
                    }
                }
                Val::Constraint(Constraint { kinds, bounds })
            }
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Atom(scalar) => write!(f, "{scalar}"),
            Val::Constraint(c) => write!(f, "{c}"),
            Val::Bottom(e) => write!(f, "_|_ ({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str) -> Val {
        Val::Atom(Scalar::Str(s.to_string()))
    }

    fn bound(op: BoundOp, value: Scalar) -> Val {
        let b = Bound { op, value };
        Val::Constraint(Constraint {
            kinds: b.kinds(),
            bounds: vec![b],
        })
    }

    #[test]
    fn test_equal_atoms_meet() {
        assert_eq!(string("a").meet(string("a")), string("a"));
    }

    #[test]
    fn test_different_atoms_conflict() {
        assert!(string("a").meet(string("b")).is_bottom());
    }

    #[test]
    fn test_kind_admits_atom() {
        assert_eq!(Val::kind(Kind::STRING).meet(string("a")), string("a"));
        assert!(Val::kind(Kind::INT).meet(string("a")).is_bottom());
    }

    #[test]
    fn test_number_includes_int() {
        let v = Val::kind(Kind::NUMBER).meet(Val::Atom(Scalar::Int(3)));
        assert_eq!(v, Val::Atom(Scalar::Int(3)));
    }

    #[test]
    fn test_not_equal_bound() {
        let not_empty = bound(BoundOp::NotEqual, Scalar::Str(String::new()));
        assert_eq!(not_empty.clone().meet(string("foo")), string("foo"));
        assert!(not_empty.meet(string("")).is_bottom());
    }

    #[test]
    fn test_numeric_bounds() {
        let non_negative = bound(BoundOp::GreaterEqual, Scalar::Int(0));
        assert!(non_negative.clone().meet(Val::Atom(Scalar::Int(-1))).is_bottom());
        assert_eq!(
            non_negative.meet(Val::Atom(Scalar::Int(1))),
            Val::Atom(Scalar::Int(1))
        );
    }

    #[test]
    fn test_struct_and_list_conflict() {
        assert!(Val::kind(Kind::STRUCT).meet(Val::kind(Kind::LIST)).is_bottom());
    }

    #[test]
    fn test_top_is_identity() {
        assert_eq!(Val::top().meet(Val::kind(Kind::BOOL)), Val::kind(Kind::BOOL));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Kind::NUMBER.to_string(), "number");
        assert_eq!((Kind::STRING | Kind::NULL).to_string(), "null|string");
        assert_eq!(Kind::TOP.to_string(), "_");
    }
}
