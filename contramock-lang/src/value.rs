//! The public value API.
//!
//! A [`Value`] is an immutable recipe (the sources it was compiled from,
//! the fills applied to it) plus the path it denotes. Nothing is evaluated
//! until a query such as [`Value::validate`] or [`Value::to_json`] runs, at
//! which point a fresh vertex graph is materialised for the recipe. Deriving
//! a value (`lookup`, `fill_path`, `unify`) shares the underlying sources,
//! so values behave as persistent data.

use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::trace;

use crate::ast::{Expr, File};
use crate::encode::{json_to_expr, shape_of};
use crate::error::{EvalError, EvalErrors};
use crate::graph::{Graph, Input};
use crate::kind::Kind;
use crate::parser::{parse_expr, parse_file};
use crate::path::{Path, Selector};

/// The syntax a value was built from.
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Expr(Expr),
    File(File),
}

#[derive(Debug, Clone)]
enum Source {
    File(Rc<File>),
    Expr(Rc<Expr>),
}

#[derive(Debug, Clone)]
struct Fill {
    path: Path,
    expr: Result<Rc<Expr>, EvalError>,
}

#[derive(Debug, Default)]
struct Recipe {
    sources: Vec<Source>,
    fills: Vec<Fill>,
}

/// A (lazily evaluated) schema value at some path.
#[derive(Debug, Clone)]
pub struct Value {
    recipe: Rc<Recipe>,
    path: Path,
}

impl Value {
    fn from_source(source: Source) -> Self {
        Value {
            recipe: Rc::new(Recipe {
                sources: vec![source],
                fills: Vec::new(),
            }),
            path: Path::root(),
        }
    }

    /// Compile schema file text, unified with `scope` when given.
    ///
    /// Hard errors anywhere in the result fail compilation; values that are
    /// merely not concrete yet are accepted.
    pub fn compile(source: &str, scope: Option<&Value>) -> Result<Value, EvalErrors> {
        let file = parse_file(source)?;
        Self::scoped(Self::from_source(Source::File(Rc::new(file))), scope)
    }

    /// Compile a single expression, unified with `scope` when given.
    pub fn compile_expr(source: &str, scope: Option<&Value>) -> Result<Value, EvalErrors> {
        let expr = parse_expr(source)?;
        Self::scoped(Self::from_expr(expr), scope)
    }

    fn scoped(value: Value, scope: Option<&Value>) -> Result<Value, EvalErrors> {
        let value = match scope {
            Some(scope) => scope.unify(&value),
            None => value,
        };
        value.validate(false)?;
        Ok(value)
    }

    /// A value for an already built expression.
    pub fn from_expr(expr: Expr) -> Value {
        Self::from_source(Source::Expr(Rc::new(expr)))
    }

    /// A concrete value for JSON data.
    pub fn from_json(json: &Json) -> Result<Value, EvalError> {
        Ok(Self::from_expr(json_to_expr(json)?))
    }

    /// Encode a host value.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, EvalError> {
        let json = serde_json::to_value(value)
            .map_err(|e| EvalError::decode(format!("cannot encode value: {e}")))?;
        Self::from_json(&json)
    }

    /// Encode the shape of a host type, derived from its default value.
    pub fn encode_type<T: Serialize + Default>() -> Result<Value, EvalError> {
        let json = serde_json::to_value(T::default())
            .map_err(|e| EvalError::decode(format!("cannot encode type: {e}")))?;
        Ok(Self::from_expr(shape_of(&json)?))
    }

    /// The syntax of this value.
    ///
    /// A value compiled from a single source reports that source; anything
    /// else is exported and re-encoded, so it must be concrete.
    pub fn syntax(&self) -> Result<Syntax, EvalError> {
        if let Some(source) = self.single_source() {
            return Ok(match source {
                Source::File(file) => Syntax::File(File::clone(file)),
                Source::Expr(expr) => Syntax::Expr(Expr::clone(expr)),
            });
        }
        Ok(Syntax::Expr(json_to_expr(&self.to_json()?)?))
    }

    fn single_source(&self) -> Option<&Source> {
        match self.recipe.sources.as_slice() {
            [source] if self.path.is_root() && self.recipe.fills.is_empty() => Some(source),
            _ => None,
        }
    }

    /// The path of this value from the root of its recipe.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unify two values.
    ///
    /// Two root values combine their sources; otherwise `other` is filled
    /// in at this value's path.
    pub fn unify(&self, other: &Value) -> Value {
        if self.path.is_root() && other.path.is_root() {
            let mut sources = self.recipe.sources.clone();
            sources.extend(other.recipe.sources.iter().cloned());
            let mut fills = self.recipe.fills.clone();
            fills.extend(other.recipe.fills.iter().cloned());
            return Value {
                recipe: Rc::new(Recipe { sources, fills }),
                path: Path::root(),
            };
        }
        self.fill_path(&Path::root(), other)
    }

    /// The value at `path` relative to this one.
    pub fn lookup(&self, path: &Path) -> Value {
        Value {
            recipe: Rc::clone(&self.recipe),
            path: self.path.join(path),
        }
    }

    /// Parse `path` and look it up.
    pub fn lookup_str(&self, path: &str) -> Result<Value, EvalError> {
        Ok(self.lookup(&Path::parse(path)?))
    }

    /// Whether the path of this value resolves.
    pub fn exists(&self) -> bool {
        self.with_graph(|graph| graph.lookup(&self.path).is_ok())
    }

    /// The kinds this value may still take (empty when it is an error).
    pub fn kind(&self) -> Kind {
        self.with_graph(|graph| match graph.lookup(&self.path) {
            Ok(vertex) => graph.kind(vertex),
            Err(_) => Kind::empty(),
        })
    }

    /// The fields of a struct value, in declaration order.
    pub fn fields(&self) -> Result<Vec<(Selector, Value)>, EvalError> {
        let selectors = self.with_graph(|graph| {
            let vertex = graph.lookup(&self.path)?;
            graph.fields(vertex)
        })?;
        Ok(selectors
            .into_iter()
            .map(|selector| {
                let value = self.lookup(&Path::new(vec![selector.clone()]));
                (selector, value)
            })
            .collect())
    }

    /// The number of elements of a list value.
    pub fn len(&self) -> Result<usize, EvalError> {
        self.with_graph(|graph| {
            let vertex = graph.lookup(&self.path)?;
            graph.list_len(vertex)
        })
    }

    /// The elements of a list value.
    pub fn elements(&self) -> Result<Vec<Value>, EvalError> {
        let len = self.len()?;
        Ok((0..len)
            .map(|index| self.lookup(&Path::new(vec![Selector::Index(index)])))
            .collect())
    }

    /// Unify `value` into the field at `path`, relative to this value.
    pub fn fill_path(&self, path: &Path, value: &Value) -> Value {
        let expr = match value.single_source() {
            Some(Source::Expr(expr)) => Ok(Rc::clone(expr)),
            _ => value
                .to_json()
                .and_then(|json| json_to_expr(&json))
                .map(Rc::new),
        };
        let mut fills = self.recipe.fills.clone();
        fills.push(Fill {
            path: self.path.join(path),
            expr,
        });
        Value {
            recipe: Rc::new(Recipe {
                sources: self.recipe.sources.clone(),
                fills,
            }),
            path: self.path.clone(),
        }
    }

    /// Check this value for errors.
    ///
    /// With `concrete`, every regular field must also have a concrete value;
    /// definitions and hidden fields are exempt.
    pub fn validate(&self, concrete: bool) -> Result<(), EvalErrors> {
        let errors = self.with_graph(|graph| match graph.lookup(&self.path) {
            Ok(vertex) => graph.validate(vertex, concrete),
            Err(error) => vec![error.at(self.path.to_string())],
        });
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EvalErrors(errors))
        }
    }

    /// The error this value evaluates to, if any.
    pub fn err(&self) -> Option<EvalError> {
        self.with_graph(|graph| match graph.lookup(&self.path) {
            Ok(vertex) => graph.error(vertex),
            Err(error) => Some(error.at(self.path.to_string())),
        })
    }

    /// Whether this value is concretely `null`.
    pub fn is_null(&self) -> bool {
        matches!(self.to_json(), Ok(Json::Null))
    }

    /// The value as an unsigned 64-bit integer.
    pub fn to_u64(&self) -> Result<u64, EvalError> {
        let json = self.to_json()?;
        json.as_u64().ok_or_else(|| {
            EvalError::decode(format!("cannot use value {json} as uint64")).at(self.path.to_string())
        })
    }

    /// Export a concrete value as JSON.
    pub fn to_json(&self) -> Result<Json, EvalError> {
        self.with_graph(|graph| {
            let vertex = graph.lookup(&self.path)?;
            graph.export(vertex)
        })
        .map_err(|error| error.at(self.path.to_string()))
    }

    /// Decode a concrete value into a host type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EvalError> {
        let json = self.to_json()?;
        serde_json::from_value(json).map_err(|e| {
            EvalError::decode(format!("cannot decode value: {e}")).at(self.path.to_string())
        })
    }

    fn with_graph<R>(&self, query: impl FnOnce(&mut Graph<'_>) -> R) -> R {
        let inputs = self.recipe.sources.iter().map(|source| match source {
            Source::File(file) => Input::File(file),
            Source::Expr(expr) => Input::Expr(expr),
        });
        let fills = self
            .recipe
            .fills
            .iter()
            .map(|fill| (&fill.path, fill.expr.as_ref().map(|expr| &**expr)));
        trace!(
            path = %self.path,
            sources = self.recipe.sources.len(),
            fills = self.recipe.fills.len(),
            "materialising value graph"
        );
        let mut graph = Graph::new(inputs, fills);
        query(&mut graph)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(error) => write!(f, "_|_ // {error}"),
        }
    }
}
