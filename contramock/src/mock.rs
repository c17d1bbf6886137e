//! Mock instances: a compiled schema plus the functions it declares.

use contramock_lang::{EvalError, Kind, Path, Selector, Value};
use indexmap::IndexMap;
use tracing::debug;

use crate::base::{ARGS, FUNCS, MAX_CALLS};
use crate::error::MockError;
use crate::ledger::CallLedger;
use crate::registry::TypeRegistry;
use crate::vars::Vars;

/// One candidate implementation of a function.
#[derive(Debug, Clone)]
pub struct Overload {
    index: usize,
    value: Value,
}

impl Overload {
    /// Position in the function's overload list.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The overload's schema value (`args`, `maxCalls`, `returns`).
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Number of arguments the overload declares.
    pub fn arity(&self) -> Result<usize, EvalError> {
        self.value.lookup_str(ARGS)?.len()
    }

    /// The call quota; [`crate::base::UNBOUNDED`] when unlimited.
    pub fn max_calls(&self) -> Result<u64, EvalError> {
        self.value.lookup_str(MAX_CALLS)?.to_u64()
    }

    /// The overload with each argument unified into `args[i]`.
    pub(crate) fn bind(&self, args: &[Value]) -> Value {
        args.iter().enumerate().fold(self.value.clone(), |bound, (index, arg)| {
            let path = Path::new(vec![
                Selector::Field(ARGS.to_string()),
                Selector::Index(index),
            ]);
            bound.fill_path(&path, arg)
        })
    }
}

/// A function declared under `funcs`.
#[derive(Debug, Clone)]
pub struct FunctionSchema {
    name: String,
    overloads: Vec<Overload>,
}

impl FunctionSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overloads in the order they are tried.
    pub fn overloads(&self) -> &[Overload] {
        &self.overloads
    }
}

/// A mock compiled from schema text.
///
/// Calls take `&mut self` because they update the call ledgers. A mock
/// holds reference-counted schema values and is confined to its thread;
/// wrap it in a `Mutex` on the owning thread if several callers share it.
#[derive(Debug)]
pub struct Mock {
    value: Value,
    pub(crate) functions: IndexMap<String, FunctionSchema>,
    pub(crate) ledgers: Vec<CallLedger>,
}

impl Mock {
    /// Compile `source` in the scope of `registry`.
    pub fn new(registry: &TypeRegistry, source: &str) -> Result<Self, MockError> {
        Self::with_vars(registry, source, &Vars::new())
    }

    /// Compile `source` in the scope of `registry`, with `vars` injected under `vars`.
    pub fn with_vars(registry: &TypeRegistry, source: &str, vars: &Vars) -> Result<Self, MockError> {
        let mut scope = registry.scope().clone();
        if !vars.is_empty() {
            let vars = vars
                .to_value()
                .map_err(|error| MockError::Compile(error.into()))?;
            scope = scope.unify(&vars);
        }
        let value = Value::compile(source, Some(&scope)).map_err(MockError::Compile)?;

        let mut functions = IndexMap::new();
        let funcs = value
            .lookup_str(FUNCS)
            .and_then(|funcs| funcs.fields())
            .map_err(|error| MockError::Compile(error.into()))?;
        for (selector, function) in funcs {
            let Selector::Field(name) = selector else {
                continue;
            };
            let values = if function.kind() == Kind::LIST {
                function
                    .elements()
                    .map_err(|error| MockError::Compile(error.into()))?
            } else {
                vec![function]
            };
            let overloads = values
                .into_iter()
                .enumerate()
                .map(|(index, value)| Overload { index, value })
                .collect();
            functions.insert(name.clone(), FunctionSchema { name, overloads });
        }

        let ledgers = functions
            .values()
            .map(|function| CallLedger::new(function.overloads.len()))
            .collect();
        debug!(functions = functions.len(), "compiled mock");
        Ok(Self {
            value,
            functions,
            ledgers,
        })
    }

    /// The compiled schema.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Declared functions, in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionSchema> {
        self.functions.values()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSchema> {
        self.functions.get(name)
    }

    /// The call ledger of a function.
    pub fn ledger(&self, name: &str) -> Option<&CallLedger> {
        self.functions
            .get_index_of(name)
            .map(|index| &self.ledgers[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mock(source: &str) -> Mock {
        Mock::new(&TypeRegistry::new(), source).unwrap()
    }

    #[test]
    fn test_empty_schema() {
        let mock = mock("");
        assert_eq!(mock.functions().count(), 0);
    }

    #[test]
    fn test_builtin_violation_fails() {
        let result = Mock::new(&TypeRegistry::new(), "funcs: 200");
        assert!(matches!(result, Err(MockError::Compile(_))));
    }

    #[test]
    fn test_builtin_definition_is_accessible() {
        assert_eq!(mock("#Abc: #MockFunction").functions().count(), 0);
    }

    #[test]
    fn test_single_declaration_is_one_overload() {
        let mock = mock("funcs: Ping: #MockFunction & { returns: [true] }");
        let function = mock.function("Ping").unwrap();
        assert_eq!(function.overloads().len(), 1);
        assert_eq!(function.overloads()[0].arity().unwrap(), 0);
        assert_eq!(function.overloads()[0].max_calls().unwrap(), u64::MAX);
        assert_eq!(mock.ledger("Ping").unwrap().overloads(), 1);
    }

    #[test]
    fn test_overload_list() {
        let mock = mock(
            r#"
funcs: Pick: [{
	args: ["a"]
	returns: [1]
}, {
	args: ["b", "c"]
	maxCalls: 3
	returns: [2]
}]
"#,
        );
        let function = mock.function("Pick").unwrap();
        let arities: Vec<usize> = function
            .overloads()
            .iter()
            .map(|overload| overload.arity().unwrap())
            .collect();
        assert_eq!(arities, vec![1, 2]);
        assert_eq!(function.overloads()[1].max_calls().unwrap(), 3);
        assert_eq!(mock.ledger("Pick").unwrap().overloads(), 2);
    }

    #[test]
    fn test_definitions_and_hidden_fields_are_skipped() {
        let mock = mock("funcs: { #Helper: #MockFunction, _private: #MockFunction, Real: #MockFunction }");
        let names: Vec<&str> = mock.functions().map(FunctionSchema::name).collect();
        assert_eq!(names, vec!["Real"]);
    }

    #[test]
    fn test_unknown_field_in_function_fails() {
        let result = Mock::new(&TypeRegistry::new(), "funcs: F: { args: [], bogus: 1 }");
        assert!(matches!(result, Err(MockError::Compile(_))));
    }
}
