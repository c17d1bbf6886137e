//! Value paths such as `funcs.Expect.args[0]`.

use std::fmt;
use std::str::FromStr;

use crate::ast::Label;
use crate::error::EvalError;
use crate::span::Span;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// A regular field.
    Field(String),
    /// A definition, `#Name`.
    Def(String),
    /// A hidden field, `_name`.
    Hidden(String),
    /// A list element.
    Index(usize),
}

impl Selector {
    /// The struct label this selector addresses, if it is not an index.
    pub fn label(&self) -> Option<Label> {
        match self {
            Selector::Field(name) => Some(Label::Regular(name.clone())),
            Selector::Def(name) => Some(Label::Definition(name.clone())),
            Selector::Hidden(name) => Some(Label::Hidden(name.clone())),
            Selector::Index(_) => None,
        }
    }

    /// Whether this selects a definition.
    pub fn is_definition(&self) -> bool {
        matches!(self, Selector::Def(_))
    }

    /// Whether this selects a hidden field.
    pub fn is_hidden(&self) -> bool {
        matches!(self, Selector::Hidden(_))
    }

    /// Whether this selects a regular field.
    pub fn is_regular(&self) -> bool {
        matches!(self, Selector::Field(_))
    }
}

impl From<&Label> for Selector {
    fn from(label: &Label) -> Self {
        match label {
            Label::Regular(name) => Selector::Field(name.clone()),
            Label::Definition(name) => Selector::Def(name.clone()),
            Label::Hidden(name) => Selector::Hidden(name.clone()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Field(name) if is_identifier(name) => f.write_str(name),
            Selector::Field(name) => write!(f, "{name:?}"),
            Selector::Def(name) => write!(f, "#{name}"),
            Selector::Hidden(name) => f.write_str(name),
            Selector::Index(index) => write!(f, "[{index}]"),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A path from the root of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<Selector>);

impl Path {
    /// The empty path.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    /// Build a path from selectors.
    pub fn new(selectors: Vec<Selector>) -> Self {
        Path(selectors)
    }

    /// Parse a dotted path, e.g. `args[0].Value`.
    pub fn parse(text: &str) -> Result<Self, EvalError> {
        text.parse()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.0
    }

    pub fn last(&self) -> Option<&Selector> {
        self.0.last()
    }

    /// This path extended by one selector.
    pub fn child(&self, selector: Selector) -> Path {
        let mut selectors = self.0.clone();
        selectors.push(selector);
        Path(selectors)
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &Path) -> Path {
        let mut selectors = self.0.clone();
        selectors.extend(other.0.iter().cloned());
        Path(selectors)
    }

    /// Whether `prefix` is a (not necessarily strict) prefix of this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Whether any step of this path selects a definition.
    pub fn has_definition(&self) -> bool {
        self.0.iter().any(Selector::is_definition)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.0.iter().enumerate() {
            if i > 0 && !matches!(selector, Selector::Index(_)) {
                f.write_str(".")?;
            }
            write!(f, "{selector}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = EvalError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bytes = text.as_bytes();
        let mut selectors = Vec::new();
        let mut pos = 0;
        let error = |at: usize, message: &str| {
            EvalError::syntax(Span::new(at, (at + 1).min(text.len())), format!("invalid path {text:?}: {message}"))
        };

        while pos < bytes.len() {
            match bytes[pos] {
                b'[' => {
                    let close = text[pos..]
                        .find(']')
                        .map(|offset| pos + offset)
                        .ok_or_else(|| error(pos, "unterminated index"))?;
                    let index = text[pos + 1..close]
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| error(pos, "index must be a non-negative integer"))?;
                    selectors.push(Selector::Index(index));
                    pos = close + 1;
                }
                b'.' if !selectors.is_empty() => {
                    pos += 1;
                    if matches!(bytes.get(pos), None | Some(b'.') | Some(b'[')) {
                        return Err(error(pos - 1, "expected label after `.`"));
                    }
                }
                b'"' => {
                    let close = text[pos + 1..]
                        .find('"')
                        .map(|offset| pos + 1 + offset)
                        .ok_or_else(|| error(pos, "unterminated quoted label"))?;
                    selectors.push(Selector::Field(text[pos + 1..close].to_string()));
                    pos = close + 1;
                }
                _ => {
                    let end = text[pos..]
                        .find(['.', '['])
                        .map_or(text.len(), |offset| pos + offset);
                    let ident = &text[pos..end];
                    if ident.is_empty() {
                        return Err(error(pos, "empty label"));
                    }
                    selectors.push(Selector::from(&Label::from_ident(ident)));
                    pos = end;
                }
            }
        }

        Ok(Path(selectors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_args_path() {
        let path = Path::parse("args[0].Value").unwrap();
        assert_eq!(
            path.selectors(),
            &[
                Selector::Field("args".into()),
                Selector::Index(0),
                Selector::Field("Value".into()),
            ]
        );
    }

    #[test]
    fn test_parse_definition_and_hidden() {
        let path = Path::parse("#Test._cache").unwrap();
        assert_eq!(
            path.selectors(),
            &[Selector::Def("Test".into()), Selector::Hidden("_cache".into())]
        );
        assert!(path.has_definition());
    }

    #[test]
    fn test_parse_quoted_label() {
        let path = Path::parse("vars.\"my key\"").unwrap();
        assert_eq!(path.last(), Some(&Selector::Field("my key".into())));
    }

    #[test]
    fn test_display_round_trip() {
        let text = "funcs.Overloads[1].args[0]";
        assert_eq!(Path::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_parse_root() {
        assert!(Path::parse("").unwrap().is_root());
    }

    #[test]
    fn test_invalid_index() {
        assert!(Path::parse("args[x]").is_err());
        assert!(Path::parse("args[0").is_err());
        assert!(Path::parse("a..b").is_err());
    }

    #[test]
    fn test_prefix() {
        let parent = Path::parse("funcs.Expect").unwrap();
        let child = parent.child(Selector::Field("args".into()));
        assert!(child.starts_with(&parent));
        assert!(!parent.starts_with(&child));
    }
}
