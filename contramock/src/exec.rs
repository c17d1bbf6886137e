//! Typed calls.
//!
//! `exec1`, `exec2` and `exec3` call a mock function and decode its return
//! values into host types. Arguments are any tuple of serializable values.
//! Error results are declared in the schema as `null` or as an `#Error`
//! struct and decode into `Option<MockedError>`.

use contramock_lang::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::error::MockError;
use crate::mock::Mock;

/// An error value returned by a mock, decoded from `{Error: "message"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct MockedError {
    #[serde(rename = "Error")]
    pub message: String,
}

impl MockedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Arguments of a mock call.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<Json>, serde_json::Error>;
}

impl IntoArgs for () {
    fn into_args(self) -> Result<Vec<Json>, serde_json::Error> {
        Ok(Vec::new())
    }
}

impl IntoArgs for Vec<Json> {
    fn into_args(self) -> Result<Vec<Json>, serde_json::Error> {
        Ok(self)
    }
}

macro_rules! impl_into_args {
    ($($name:ident $index:tt),+) => {
        impl<$($name: Serialize),+> IntoArgs for ($($name,)+) {
            fn into_args(self) -> Result<Vec<Json>, serde_json::Error> {
                Ok(vec![$(serde_json::to_value(&self.$index)?),+])
            }
        }
    };
}

impl_into_args!(A 0);
impl_into_args!(A 0, B 1);
impl_into_args!(A 0, B 1, C 2);
impl_into_args!(A 0, B 1, C 2, D 3);
impl_into_args!(A 0, B 1, C 2, D 3, E 4);
impl_into_args!(A 0, B 1, C 2, D 3, E 4, F 5);

fn decode<T: DeserializeOwned>(function: &str, values: &[Value], index: usize) -> Result<T, MockError> {
    values[index].decode().map_err(|error| MockError::Decode {
        function: function.to_string(),
        index,
        error,
    })
}

impl Mock {
    fn exec_n<A: IntoArgs>(&mut self, name: &str, args: A, count: usize) -> Result<Vec<Value>, MockError> {
        let args = args.into_args().map_err(|error| MockError::Encode {
            what: format!("arguments of {name}"),
            message: error.to_string(),
        })?;
        let values = self.call(name, &args)?;
        if values.len() != count {
            return Err(MockError::ReturnCount {
                function: name.to_string(),
                expected: count,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    /// Call `name` and return its results as JSON, whatever their number.
    pub fn exec_values<A: IntoArgs>(&mut self, name: &str, args: A) -> Result<Vec<Json>, MockError> {
        let args = args.into_args().map_err(|error| MockError::Encode {
            what: format!("arguments of {name}"),
            message: error.to_string(),
        })?;
        self.call(name, &args)?
            .iter()
            .enumerate()
            .map(|(index, value)| {
                value.to_json().map_err(|error| MockError::Decode {
                    function: name.to_string(),
                    index,
                    error,
                })
            })
            .collect()
    }

    /// Call `name` and decode its single result.
    pub fn exec1<T, A>(&mut self, name: &str, args: A) -> Result<T, MockError>
    where
        T: DeserializeOwned,
        A: IntoArgs,
    {
        let values = self.exec_n(name, args, 1)?;
        decode(name, &values, 0)
    }

    /// Call `name` and decode its two results.
    pub fn exec2<T1, T2, A>(&mut self, name: &str, args: A) -> Result<(T1, T2), MockError>
    where
        T1: DeserializeOwned,
        T2: DeserializeOwned,
        A: IntoArgs,
    {
        let values = self.exec_n(name, args, 2)?;
        Ok((decode(name, &values, 0)?, decode(name, &values, 1)?))
    }

    /// Call `name` and decode its three results.
    pub fn exec3<T1, T2, T3, A>(&mut self, name: &str, args: A) -> Result<(T1, T2, T3), MockError>
    where
        T1: DeserializeOwned,
        T2: DeserializeOwned,
        T3: DeserializeOwned,
        A: IntoArgs,
    {
        let values = self.exec_n(name, args, 3)?;
        Ok((
            decode(name, &values, 0)?,
            decode(name, &values, 1)?,
            decode(name, &values, 2)?,
        ))
    }

    /// Like [`Mock::exec1`], panicking on failure.
    pub fn must_exec1<T: DeserializeOwned, A: IntoArgs>(&mut self, name: &str, args: A) -> T {
        self.exec1(name, args).unwrap_or_else(|error| panic!("{error}"))
    }

    /// Like [`Mock::exec2`], panicking on failure.
    pub fn must_exec2<T1, T2, A>(&mut self, name: &str, args: A) -> (T1, T2)
    where
        T1: DeserializeOwned,
        T2: DeserializeOwned,
        A: IntoArgs,
    {
        self.exec2(name, args).unwrap_or_else(|error| panic!("{error}"))
    }

    /// Like [`Mock::exec3`], panicking on failure.
    pub fn must_exec3<T1, T2, T3, A>(&mut self, name: &str, args: A) -> (T1, T2, T3)
    where
        T1: DeserializeOwned,
        T2: DeserializeOwned,
        T3: DeserializeOwned,
        A: IntoArgs,
    {
        self.exec3(name, args).unwrap_or_else(|error| panic!("{error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_tuple_args() {
        let args = ("a", 1, true).into_args().unwrap();
        assert_eq!(args, vec![json!("a"), json!(1), json!(true)]);
        assert!(().into_args().unwrap().is_empty());
    }

    #[test]
    fn test_mocked_error_decodes() {
        let error: MockedError = serde_json::from_value(json!({"Error": "boom"})).unwrap();
        assert_eq!(error, MockedError::new("boom"));
        assert_eq!(error.to_string(), "boom");

        let none: Option<MockedError> = serde_json::from_value(json!(null)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_return_count_checked() {
        let mut mock = Mock::new(
            &TypeRegistry::new(),
            "funcs: Two: #MockFunction & { returns: [1, 2] }",
        )
        .unwrap();
        assert!(matches!(
            mock.exec1::<i64, _>("Two", ()),
            Err(MockError::ReturnCount {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert_eq!(mock.exec2::<i64, i64, _>("Two", ()).unwrap(), (1, 2));
    }

    #[test]
    fn test_decode_failure_reports_index() {
        let mut mock = Mock::new(
            &TypeRegistry::new(),
            "funcs: Two: #MockFunction & { returns: [1, \"x\"] }",
        )
        .unwrap();
        assert!(matches!(
            mock.exec2::<i64, i64, _>("Two", ()),
            Err(MockError::Decode { index: 1, .. })
        ));
    }

    #[test]
    fn test_exec_values() {
        let mut mock = Mock::new(
            &TypeRegistry::new(),
            "funcs: Echo: #MockFunction & { args: [_], returns: [args[0], null] }",
        )
        .unwrap();
        assert_eq!(
            mock.exec_values("Echo", (json!({"k": [1]}),)).unwrap(),
            vec![json!({"k": [1]}), json!(null)]
        );
    }

    #[test]
    #[should_panic(expected = "no overloads matched")]
    fn test_must_exec_panics() {
        let mut mock = Mock::new(
            &TypeRegistry::new(),
            "funcs: Once: #MockFunction & { maxCalls: 0, returns: [true] }",
        )
        .unwrap();
        let _: bool = mock.must_exec1("Once", ());
    }
}
