//! Diagnostic rendering for schema errors.

use ariadne::{Config, Label, Report, ReportKind, Source};
use contramock_lang::{EvalError, EvalErrors};

/// Render `errors` against the schema `source` named `name`.
///
/// Errors carrying a span get a source snippet; the rest are printed as
/// `path: message` lines.
pub fn render(name: &str, source: &str, errors: &EvalErrors) -> String {
    let mut out = String::new();
    for error in errors.errors() {
        match error.span {
            Some(span) => out.push_str(&snippet(name, source, error, span.range())),
            None => {
                out.push_str(&error.to_string());
                out.push('\n');
            }
        }
    }
    out
}

fn snippet(name: &str, source: &str, error: &EvalError, range: std::ops::Range<usize>) -> String {
    let end = range.end.clamp(range.start, source.len());
    let start = range.start.min(end);
    let mut buffer = Vec::new();
    let written = Report::build(ReportKind::Error, name, start)
        .with_config(Config::default().with_color(false))
        .with_message(format!("{:?} error", error.kind))
        .with_label(Label::new((name, start..end)).with_message(&error.message))
        .finish()
        .write((name, Source::from(source)), &mut buffer);
    match written {
        Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
        Err(_) => format!("{error}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contramock_lang::Value;

    #[test]
    fn test_syntax_error_has_snippet() {
        let source = "funcs: {\n  a: ]\n}";
        let errors = Value::compile(source, None).unwrap_err();
        let rendered = render("schema.cue", source, &errors);
        assert!(rendered.contains("schema.cue"), "{rendered}");
        assert!(rendered.contains("a: ]"), "{rendered}");
    }

    #[test]
    fn test_evaluation_error_is_one_line() {
        let source = "a: 1\na: 2";
        let errors = Value::compile(source, None).unwrap_err();
        let rendered = render("schema.cue", source, &errors);
        assert!(rendered.contains("a"), "{rendered}");
        assert_eq!(rendered.lines().count(), errors.errors().len());
    }
}
