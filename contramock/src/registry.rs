//! Host type registration.
//!
//! A [`TypeRegistry`] owns the compile scope shared by the mocks created
//! from it: the built-in schema plus one definition per registered type.
//! Registration only ever adds to the scope. A mock takes a snapshot of the
//! scope when it is created, so later registrations are visible to later
//! mocks only.

use contramock_lang::ast::{Expr, Label};
use contramock_lang::{parse_expr, Syntax, Value};
use serde::Serialize;
use tracing::debug;

use crate::base::base_schema;
use crate::error::MockError;

/// Definitions available to mock schemas.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    scope: Value,
    names: Vec<String>,
}

impl TypeRegistry {
    /// A registry holding only the built-in schema.
    pub fn new() -> Self {
        Self {
            scope: base_schema(),
            names: Vec::new(),
        }
    }

    /// Register `T` as the definition `#name`.
    ///
    /// The definition is the shape of `T::default()`: strings become
    /// `string`, integers `int`, floats `number`, `None` becomes
    /// `*null | _`, sequences `[..._]`, and structs a struct of their
    /// field shapes.
    ///
    /// # Panics
    ///
    /// Panics if the encoded shape is not an expression, which is a bug in
    /// this crate.
    pub fn register<T: Serialize + Default>(&mut self, name: &str) -> Result<&mut Self, MockError> {
        let shape = Value::encode_type::<T>().map_err(|error| MockError::Encode {
            what: format!("type {name}"),
            message: error.to_string(),
        })?;
        let expr = match shape.syntax() {
            Ok(Syntax::Expr(expr)) => expr,
            Ok(Syntax::File(_)) => {
                panic!("bug: shape of type {name} is not an expression; please report this")
            }
            Err(error) => return Err(MockError::Compile(error.into())),
        };
        self.define(name, expr)
    }

    /// Register a definition `#name` written in schema syntax, e.g.
    /// `{ Name: string, Age: int & >=0 }`.
    pub fn register_schema(&mut self, name: &str, source: &str) -> Result<&mut Self, MockError> {
        let expr = parse_expr(source).map_err(|error| MockError::Compile(error.into()))?;
        self.define(name, expr)
    }

    fn define(&mut self, name: &str, expr: Expr) -> Result<&mut Self, MockError> {
        let definition = Value::from_expr(Expr::field(Label::Definition(name.to_string()), expr));
        let scope = self.scope.unify(&definition);
        scope.validate(false).map_err(MockError::Compile)?;

        self.scope = scope;
        if !self.names.iter().any(|existing| existing == name) {
            self.names.push(name.to_string());
        }
        debug!(name, registered = self.names.len(), "registered definition");
        Ok(self)
    }

    /// The scope mock schemas are compiled in.
    pub fn scope(&self) -> &Value {
        &self.scope
    }

    /// Names of the registered definitions, in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[derive(Debug, Default, Serialize)]
    struct Input {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Tags")]
        tags: Vec<String>,
        #[serde(rename = "Parent")]
        parent: Option<String>,
    }

    #[test]
    fn test_register_records_name() {
        let mut registry = TypeRegistry::new();
        registry.register::<Input>("Input").unwrap();
        assert_eq!(registry.names(), &["Input".to_string()]);
        assert!(registry.scope().lookup_str("#Input").unwrap().exists());
    }

    #[test]
    fn test_registered_shape_accepts_instances() {
        let mut registry = TypeRegistry::new();
        registry.register::<Input>("Input").unwrap();
        let definition = registry.scope().lookup_str("#Input").unwrap();
        let instance = Value::from_json(&json!({"Name": "a", "Tags": ["x"], "Parent": null})).unwrap();
        assert!(definition.unify(&instance).validate(true).is_ok());

        let wrong = Value::from_json(&json!({"Name": 1, "Tags": [], "Parent": null})).unwrap();
        assert!(definition.unify(&wrong).validate(true).is_err());
    }

    #[test]
    fn test_register_schema() {
        let mut registry = TypeRegistry::new();
        registry
            .register_schema("User", "{ Name: string, Age: int & >=0 }")
            .unwrap();
        assert_eq!(registry.names(), &["User".to_string()]);
        assert!(registry.register_schema("Broken", "{ a: }").is_err());
        assert_eq!(registry.names().len(), 1);
    }

    #[test]
    fn test_conflicting_registration_is_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register_schema("N", "int").unwrap();
        assert!(registry.register_schema("N", "string").is_err());
        assert!(registry.register_schema("N", ">=0").is_ok());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_registration() {
        let mut registry = TypeRegistry::new();
        let snapshot = registry.scope().clone();
        registry.register::<Input>("Input").unwrap();
        assert!(!snapshot.lookup_str("#Input").unwrap().exists());
    }
}
