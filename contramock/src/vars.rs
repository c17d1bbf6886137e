//! Variables injected into a mock schema under `vars`.

use contramock_lang::{EvalError, Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;

use crate::base::VARS;
use crate::error::MockError;

/// An ordered bag of named values, visible to a schema as `vars.<name>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vars {
    values: IndexMap<String, Json>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable, encoding `value` with serde.
    pub fn insert<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) -> Result<&mut Self, MockError> {
        let name = name.into();
        let json = serde_json::to_value(value).map_err(|error| MockError::Encode {
            what: format!("variable {name}"),
            message: error.to_string(),
        })?;
        self.values.insert(name, json);
        Ok(self)
    }

    /// Add a variable that is already JSON.
    pub fn insert_json(&mut self, name: impl Into<String>, value: Json) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Json> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The variables as a root value `{vars: {...}}`.
    pub(crate) fn to_value(&self) -> Result<Value, EvalError> {
        let values = self
            .values
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<serde_json::Map<_, _>>();
        let mut root = serde_json::Map::new();
        root.insert(VARS.to_string(), Json::Object(values));
        Value::from_json(&Json::Object(root))
    }
}

impl<K: Into<String>> FromIterator<(K, Json)> for Vars {
    fn from_iter<I: IntoIterator<Item = (K, Json)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }
}
