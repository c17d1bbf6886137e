//! Overload resolution and call accounting.
//!
//! A call tries the overloads of a function in declaration order. Each
//! attempt is counted before anything else is checked, so an overload's
//! quota is consumed by calls it ends up rejecting too. The first overload
//! whose quota allows the call, whose arity matches, and whose schema stays
//! concrete once the arguments are unified into `args` wins; its `returns`
//! are evaluated in that same scope.

use contramock_lang::{EvalError, Path, Selector, Value};
use serde_json::Value as Json;
use tracing::debug;

use crate::base::{RETURNS, UNBOUNDED};
use crate::error::{FailureCause, MockError, OverloadFailure, ResolveError};
use crate::ledger::CallLedger;
use crate::mock::{FunctionSchema, Mock};

/// Resolve one call of `function`, recording attempts in `ledger`.
pub fn resolve(function: &FunctionSchema, ledger: &mut CallLedger, args: &[Value]) -> Result<Vec<Value>, MockError> {
    let schema_error = |error| MockError::Schema {
        function: function.name().to_string(),
        error,
    };

    let mut failures = Vec::new();
    for overload in function.overloads() {
        let index = overload.index();
        let attempts = ledger.record_attempt(index);
        let max_calls = overload.max_calls().map_err(schema_error)?;
        if attempts > max_calls && attempts < UNBOUNDED {
            debug!(function = function.name(), overload = index, attempts, max_calls, "call quota exceeded");
            failures.push(OverloadFailure {
                index,
                cause: FailureCause::MaxCallsExceeded { max_calls, attempts },
            });
            continue;
        }

        let expected = overload.arity().map_err(schema_error)?;
        if expected != args.len() {
            debug!(function = function.name(), overload = index, expected, actual = args.len(), "arity mismatch");
            failures.push(OverloadFailure {
                index,
                cause: FailureCause::ArgumentCount {
                    expected,
                    actual: args.len(),
                },
            });
            continue;
        }

        let bound = overload.bind(args);
        if let Err(errors) = bound.validate(true) {
            debug!(function = function.name(), overload = index, %errors, "arguments rejected");
            failures.push(OverloadFailure {
                index,
                cause: FailureCause::Mismatch(errors),
            });
            continue;
        }

        let returns = bound
            .lookup(&Path::new(vec![Selector::Field(RETURNS.to_string())]))
            .to_json()
            .map_err(schema_error)?;
        let Json::Array(returns) = returns else {
            return Err(schema_error(EvalError::conflict(format!(
                "returns must be a list, found {returns}"
            ))));
        };
        debug!(function = function.name(), overload = index, returns = returns.len(), "matched overload");
        return returns
            .iter()
            .map(Value::from_json)
            .collect::<Result<_, _>>()
            .map_err(schema_error);
    }

    ledger.record_unmatched();
    debug!(function = function.name(), overloads = failures.len(), "no overload matched");
    Err(MockError::NoMatch(ResolveError {
        function: function.name().to_string(),
        failures,
    }))
}

impl Mock {
    /// Call `name` with JSON arguments and return the values the matching
    /// overload declares.
    pub fn call(&mut self, name: &str, args: &[Json]) -> Result<Vec<Value>, MockError> {
        let index = self
            .functions
            .get_index_of(name)
            .ok_or_else(|| MockError::FunctionNotFound {
                name: name.to_string(),
            })?;
        let args = args
            .iter()
            .map(Value::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| MockError::Encode {
                what: format!("arguments of {name}"),
                message: error.to_string(),
            })?;
        resolve(&self.functions[index], &mut self.ledgers[index], &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mock(source: &str) -> Mock {
        Mock::new(&TypeRegistry::new(), source).unwrap()
    }

    fn returns(values: Vec<Value>) -> Vec<Json> {
        values.iter().map(|value| value.to_json().unwrap()).collect()
    }

    const OVERLOADS: &str = r#"
funcs: Overloads: [#MockFunction & {
	args: ["a"]
	returns: ["a"]
}, #MockFunction & {
	args: ["b"]
	maxCalls: 1
	returns: ["b"]
}]
"#;

    // ============================================================
    // Matching
    // ============================================================

    #[test]
    fn test_first_matching_overload_wins() {
        let mut mock = mock(OVERLOADS);
        assert_eq!(returns(mock.call("Overloads", &[json!("a")]).unwrap()), vec![json!("a")]);
        assert_eq!(returns(mock.call("Overloads", &[json!("b")]).unwrap()), vec![json!("b")]);
    }

    #[test]
    fn test_unknown_function() {
        let mut mock = mock(OVERLOADS);
        let error = mock.call("Missing", &[]).unwrap_err();
        assert!(matches!(error, MockError::FunctionNotFound { ref name } if name == "Missing"));
        assert_eq!(mock.ledger("Overloads").unwrap().attempts(0), 0);
    }

    #[test]
    fn test_no_match_reports_every_overload() {
        let mut mock = mock(OVERLOADS);
        let MockError::NoMatch(error) = mock.call("Overloads", &[json!("c")]).unwrap_err() else {
            panic!("expected NoMatch");
        };
        let indices: Vec<usize> = error.failures.iter().map(|failure| failure.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(error
            .failures
            .iter()
            .all(|failure| matches!(failure.cause, FailureCause::Mismatch(_))));
        assert!(error.to_string().ends_with("no overloads matched"));
        assert_eq!(mock.ledger("Overloads").unwrap().unmatched(), 1);
    }

    #[test]
    fn test_arity_mismatch() {
        let mut mock = mock(OVERLOADS);
        let MockError::NoMatch(error) = mock.call("Overloads", &[json!("a"), json!("b")]).unwrap_err() else {
            panic!("expected NoMatch");
        };
        assert_eq!(
            error.failures[0].cause,
            FailureCause::ArgumentCount {
                expected: 1,
                actual: 2
            }
        );
    }

    // ============================================================
    // Call accounting
    // ============================================================

    #[test]
    fn test_quota_is_per_overload() {
        let mut mock = mock(OVERLOADS);
        assert!(mock.call("Overloads", &[json!("b")]).is_ok());

        let MockError::NoMatch(error) = mock.call("Overloads", &[json!("b")]).unwrap_err() else {
            panic!("expected NoMatch");
        };
        assert_eq!(
            error.failures[1].cause,
            FailureCause::MaxCallsExceeded {
                max_calls: 1,
                attempts: 2
            }
        );

        assert!(mock.call("Overloads", &[json!("a")]).is_ok());
    }

    #[test]
    fn test_attempts_counted_for_rejected_overloads() {
        let mut mock = mock(OVERLOADS);
        mock.call("Overloads", &[json!("b")]).unwrap();
        mock.call("Overloads", &[json!("a"), json!("a")]).unwrap_err();

        let ledger = mock.ledger("Overloads").unwrap();
        assert_eq!(ledger.attempts(0), 2);
        assert_eq!(ledger.attempts(1), 2);
        assert_eq!(ledger.unmatched(), 1);
    }

    #[test]
    fn test_zero_quota_never_matches() {
        let mut mock = mock("funcs: Never: #MockFunction & { maxCalls: 0, returns: [] }");
        assert!(mock.call("Never", &[]).is_err());
    }

    // ============================================================
    // Return expressions
    // ============================================================

    #[test]
    fn test_returns_reference_arguments() {
        let mut mock = mock("funcs: Echo: #MockFunction & { args: [string, int], returns: [args[0], args[1] * 2] }");
        assert_eq!(
            returns(mock.call("Echo", &[json!("hi"), json!(21)]).unwrap()),
            vec![json!("hi"), json!(42)]
        );
    }

    #[test]
    fn test_argument_type_mismatch() {
        let mut mock = mock("funcs: Echo: #MockFunction & { args: [string], returns: [args[0]] }");
        assert!(matches!(mock.call("Echo", &[json!(1)]), Err(MockError::NoMatch(_))));
    }

    #[test]
    fn test_argument_state_does_not_leak_between_calls() {
        let mut mock = mock("funcs: Echo: #MockFunction & { args: [string], returns: [args[0]] }");
        assert_eq!(returns(mock.call("Echo", &[json!("one")]).unwrap()), vec![json!("one")]);
        assert_eq!(returns(mock.call("Echo", &[json!("two")]).unwrap()), vec![json!("two")]);
    }
}
