//! Abstract syntax tree for schema source.
//!
//! The tree is plain data: host values are encoded into it directly (see
//! [`crate::encode`]) and the evaluator borrows nodes from it for the
//! lifetime of one evaluation.

use std::fmt;

/// A parsed schema file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    /// Optional package clause.
    pub package: Option<String>,
    /// Imported builtin packages, e.g. `"list"`.
    pub imports: Vec<String>,
    /// The top-level declarations, as an implicit struct.
    pub body: Expr,
}

/// The label of a struct field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// A regular field, `name` or `"quoted name"`.
    Regular(String),
    /// A definition, `#Name`.
    Definition(String),
    /// A hidden field, `_name`.
    Hidden(String),
}

impl Label {
    /// Classify an identifier by its sigil.
    pub fn from_ident(ident: &str) -> Label {
        if let Some(name) = ident.strip_prefix('#') {
            Label::Definition(name.to_string())
        } else if ident.len() > 1 && ident.starts_with('_') {
            Label::Hidden(ident.to_string())
        } else {
            Label::Regular(ident.to_string())
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Regular(name) | Label::Hidden(name) => f.write_str(name),
            Label::Definition(name) => write!(f, "#{name}"),
        }
    }
}

/// A declaration inside a struct literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `label: value` or `label?: value`.
    Field {
        label: Label,
        optional: bool,
        value: Expr,
    },
    /// `[constraint]: value`, applied to every matching regular field.
    Pattern { label: Expr, value: Expr },
    /// `...`, leaves the struct open.
    Ellipsis,
    /// An embedded expression unified into the enclosing struct.
    Embed(Expr),
}

/// A struct literal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructLit {
    pub decls: Vec<Decl>,
}

impl StructLit {
    /// Whether this literal declares a (possibly optional) field with the label.
    pub fn declares(&self, label: &Label) -> bool {
        self.decls
            .iter()
            .any(|decl| matches!(decl, Decl::Field { label: l, .. } if l == label))
    }
}

/// A list literal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListLit {
    /// Explicit elements.
    pub elems: Vec<Expr>,
    /// The element constraint of an open list, `...T`.
    pub tail: Option<Box<Expr>>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `!x`
    Not,
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `!=x`
    NotEqual,
    /// `<x`
    Less,
    /// `<=x`
    LessEqual,
    /// `>x`
    Greater,
    /// `>=x`
    GreaterEqual,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `&` unification.
    Unify,
    /// `|` disjunction.
    Disjoin,
    /// `||`
    Or,
    /// `&&`
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Disjoin => 1,
            BinaryOp::Unify => 2,
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 5,
            BinaryOp::Add | BinaryOp::Sub => 6,
            BinaryOp::Mul | BinaryOp::Div => 7,
        }
    }

    /// The operator as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Unify => "&",
            BinaryOp::Disjoin => "|",
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `_`
    Top,
    /// `_|_`
    Bottom,
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    String(String),
    /// A reference by name, including definitions such as `#MockFunction`.
    Ident(String),
    Struct(StructLit),
    List(ListLit),
    /// `base.label`
    Select(Box<Expr>, Label),
    /// `base[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `func(args...)`
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `*x`, a default inside a disjunction.
    Default(Box<Expr>),
}

impl Expr {
    /// Build `{label: value}`.
    pub fn field(label: Label, value: Expr) -> Expr {
        Expr::Struct(StructLit {
            decls: vec![Decl::Field {
                label,
                optional: false,
                value,
            }],
        })
    }

    /// Whether this expression is a reference chain (`a`, `a.b`, `a[0]`).
    pub fn is_reference(&self) -> bool {
        match self {
            Expr::Ident(name) => name != "_",
            Expr::Select(base, _) => base.is_reference(),
            Expr::Index(base, _) => base.is_reference(),
            _ => false,
        }
    }
}
