//! End-to-end mock scenarios: registration, overloads, quotas, injected
//! variables and typed decoding.

use contramock::{FailureCause, Mock, MockError, MockedError, TypeRegistry, Vars};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Record {
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Input {
    name: String,
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register::<Record>("Record").unwrap();
    registry.register::<Input>("Input").unwrap();
    registry
}

fn record(value: &str) -> Record {
    Record {
        value: value.to_string(),
    }
}

// ============================================================
// Construction
// ============================================================

#[test]
fn test_empty_schema() {
    let mock = Mock::new(&registry(), "").unwrap();
    assert_eq!(mock.functions().count(), 0);
}

#[test]
fn test_builtin_schema_is_enforced() {
    let error = Mock::new(&registry(), "funcs: 200").unwrap_err();
    assert!(matches!(error, MockError::Compile(_)), "{error}");
}

#[test]
fn test_builtin_and_registered_definitions_are_visible() {
    assert!(Mock::new(&registry(), "#Abc: #MockFunction").is_ok());
    assert!(Mock::new(&registry(), "Record: #Record").is_ok());
    assert!(Mock::new(&TypeRegistry::new(), "Record: #Record").is_err());
}

#[test]
fn test_syntax_error_is_reported() {
    let error = Mock::new(&registry(), "funcs: {").unwrap_err();
    assert!(matches!(error, MockError::Compile(_)));
}

#[test]
fn test_deeply_nested_schema_is_rejected() {
    let nested = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    let schema = format!("funcs: F: #MockFunction & {{ returns: [{nested}] }}");
    let error = Mock::new(&registry(), &schema).unwrap_err();
    assert!(matches!(error, MockError::Compile(_)), "{error}");
}

// ============================================================
// Argument matching
// ============================================================

const EXPECT: &str = r#"
funcs: Expect: #MockFunction & {
	args: [
		#Record,
		"a" | "b"
	]

	returns: [args[0].Value == args[1]]
}
"#;

#[test]
fn test_returns_are_computed_from_arguments() {
    let mut mock = Mock::new(&registry(), EXPECT).unwrap();
    assert!(mock.exec1::<bool, _>("Expect", (record("a"), "a")).unwrap());
    assert!(mock.exec1::<bool, _>("Expect", (record("b"), "b")).unwrap());
    assert!(!mock.exec1::<bool, _>("Expect", (record("a"), "b")).unwrap());
}

#[test]
fn test_argument_outside_disjunction_is_rejected() {
    let mut mock = Mock::new(&registry(), EXPECT).unwrap();
    let error = mock
        .exec1::<bool, _>("Expect", (record("invalid"), "invalid"))
        .unwrap_err();
    let MockError::NoMatch(error) = error else {
        panic!("expected no match, got {error}");
    };
    assert_eq!(error.failures.len(), 1);
    assert!(matches!(error.failures[0].cause, FailureCause::Mismatch(_)));
}

#[test]
fn test_closed_definition_rejects_extra_fields() {
    let mut mock = Mock::new(&registry(), EXPECT).unwrap();
    let result = mock.exec1::<bool, _>("Expect", (json!({"Value": "a", "Extra": 1}), "a"));
    assert!(matches!(result, Err(MockError::NoMatch(_))));
}

// ============================================================
// Returns
// ============================================================

#[test]
fn test_struct_return_decodes() {
    let schema = r#"
funcs: ReturnsAStruct: #MockFunction & {
	returns: [#Record & {Value: "abba"}]
}
"#;
    let mut mock = Mock::new(&registry(), schema).unwrap();
    let value: Record = mock.exec1("ReturnsAStruct", ()).unwrap();
    assert_eq!(value, record("abba"));
}

#[test]
fn test_injected_variable() {
    let schema = r#"
funcs: UseInjectedVar: #MockFunction & {
	returns: [vars.injected]
}
"#;
    let mut vars = Vars::new();
    vars.insert("injected", "value").unwrap();
    let mut mock = Mock::with_vars(&registry(), schema, &vars).unwrap();
    let value: String = mock.exec1("UseInjectedVar", ()).unwrap();
    assert_eq!(value, "value");
}

#[test]
fn test_injected_variable_survives_calls() {
    let schema = r#"
funcs: {
	Both: #MockFunction & {
		args: [string]
		returns: [vars.injected, args[0]]
	}
	Pinned: #MockFunction & {
		args: [vars.injected]
		returns: [args[0]]
	}
}
"#;
    let mut vars = Vars::new();
    vars.insert("injected", "value").unwrap();
    let mut mock = Mock::with_vars(&registry(), schema, &vars).unwrap();

    for arg in ["other", "value", "conflict", ""] {
        let (injected, echoed): (String, String) = mock.exec2("Both", (arg,)).unwrap();
        assert_eq!(injected, "value");
        assert_eq!(echoed, arg);
    }

    let error = mock.exec1::<String, _>("Pinned", ("conflict",)).unwrap_err();
    assert!(matches!(error, MockError::NoMatch(_)), "{error}");
    let value: String = mock.exec1("Pinned", ("value",)).unwrap();
    assert_eq!(value, "value");

    let (injected, _): (String, String) = mock.exec2("Both", ("again",)).unwrap();
    assert_eq!(injected, "value");
}

#[test]
fn test_missing_variable_fails_the_call() {
    let schema = "funcs: UseInjectedVar: #MockFunction & { returns: [vars.injected] }";
    let mut mock = Mock::new(&registry(), schema).unwrap();
    assert!(mock.exec1::<String, _>("UseInjectedVar", ()).is_err());
}

#[test]
fn test_deeply_nested_argument_is_rejected() {
    let schema = "funcs: F: #MockFunction & { args: [_], returns: [true] }";
    let mut mock = Mock::new(&registry(), schema).unwrap();

    let mut nested = json!(1);
    for _ in 0..2000 {
        nested = serde_json::Value::Array(vec![nested]);
    }
    let error = mock.call("F", &[nested]).unwrap_err();
    assert!(matches!(error, MockError::Encode { .. }), "{error}");

    let shallow: bool = mock.exec1("F", (json!([[1]]),)).unwrap();
    assert!(shallow);
}

// ============================================================
// Call quotas
// ============================================================

#[test]
fn test_call_once() {
    let schema = r#"
funcs: CanOnlyCallOnce: #MockFunction & {
	maxCalls: 1
	returns: [true]
}
"#;
    let mut mock = Mock::new(&registry(), schema).unwrap();
    assert!(mock.exec1::<bool, _>("CanOnlyCallOnce", ()).unwrap());

    let error = mock.exec1::<bool, _>("CanOnlyCallOnce", ()).unwrap_err();
    let MockError::NoMatch(error) = error else {
        panic!("expected no match, got {error}");
    };
    assert_eq!(
        error.failures[0].cause,
        FailureCause::MaxCallsExceeded {
            max_calls: 1,
            attempts: 2
        }
    );
    assert_eq!(mock.ledger("CanOnlyCallOnce").unwrap().unmatched(), 1);
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

#[test]
fn test_overloads_are_selected_by_argument() {
    let mut mock = Mock::new(&registry(), OVERLOADS).unwrap();
    assert_eq!(mock.exec1::<String, _>("Overloads", ("a",)).unwrap(), "a");
    assert_eq!(mock.exec1::<String, _>("Overloads", ("b",)).unwrap(), "b");
    assert!(mock.exec1::<String, _>("Overloads", ("c",)).is_err());
}

#[test]
fn test_quota_of_one_overload_leaves_others_callable() {
    let mut mock = Mock::new(&registry(), OVERLOADS).unwrap();
    assert_eq!(mock.exec1::<String, _>("Overloads", ("b",)).unwrap(), "b");
    assert!(mock.exec1::<String, _>("Overloads", ("b",)).is_err());
    assert_eq!(mock.exec1::<String, _>("Overloads", ("a",)).unwrap(), "a");

    let ledger = mock.ledger("Overloads").unwrap();
    assert_eq!(ledger.attempts(0), 3);
    assert_eq!(ledger.attempts(1), 2);
    assert_eq!(ledger.unmatched(), 1);
}

// ============================================================
// Error results
// ============================================================

const HAS_NAME: &str = r#"
import "list"

funcs: HasName: [
	#MockFunction & {
		args: [
			#Input & { Name: !="" },
			[]
		]
		returns: [
			false,
			#Error & {
				Error: "The list provided is empty!"
			}
		]
	},

	#MockFunction & {
		args: [
			#Input & { Name: !="" },
			[...string]
		]
		returns: [
			list.Contains(args[1], args[0].Name),
			null
		]
	}
]
"#;

fn has_name(mock: &mut Mock, name: &str, one_of: &[&str]) -> Result<(bool, Option<MockedError>), MockError> {
    let input = Input {
        name: name.to_string(),
    };
    mock.exec2("HasName", (input, one_of))
}

#[test]
fn test_error_result_is_none_on_success() {
    let mut mock = Mock::new(&registry(), HAS_NAME).unwrap();
    assert_eq!(has_name(&mut mock, "foo", &["foo", "bar"]).unwrap(), (true, None));
    assert_eq!(has_name(&mut mock, "baz", &["foo", "bar"]).unwrap(), (false, None));
}

#[test]
fn test_error_result_decodes() {
    let mut mock = Mock::new(&registry(), HAS_NAME).unwrap();
    let (found, error) = has_name(&mut mock, "foo", &[]).unwrap();
    assert!(!found);
    assert_eq!(error, Some(MockedError::new("The list provided is empty!")));
}

#[test]
fn test_constraint_shared_by_all_overloads() {
    let mut mock = Mock::new(&registry(), HAS_NAME).unwrap();
    let error = has_name(&mut mock, "", &["x"]).unwrap_err();
    let MockError::NoMatch(error) = error else {
        panic!("expected no match, got {error}");
    };
    assert_eq!(error.failures.len(), 2);
    assert!(error.to_string().contains("no overloads matched"));
}

#[test]
#[should_panic(expected = "HasName")]
fn test_must_exec_panics_when_nothing_matches() {
    let mut mock = Mock::new(&registry(), HAS_NAME).unwrap();
    let _: (bool, Option<MockedError>) = mock.must_exec2("HasName", (Input::default(), vec!["x"]));
}
