//! Token definitions and tokenizer for schema source.
//!
//! Newlines are significant: they separate declarations the same way a
//! comma does, so the lexer keeps them as tokens and the parser decides
//! where they may be skipped.

use logos::Logos;

use crate::error::EvalError;
use crate::span::Span;

/// Token kinds of the schema language.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"@[A-Za-z_][A-Za-z0-9_]*\([^)\n]*\)")]
pub enum TokenKind {
    #[token("\n")]
    Newline,

    // === Keywords ===
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    /// `_|_`
    #[token("_|_")]
    Bottom,

    // === Identifiers and literals ===
    #[regex(r"#[A-Za-z_$][A-Za-z0-9_$]*")]
    DefIdent,
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,
    #[regex(r"[0-9][0-9_]*")]
    Int,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    Float,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    // === Punctuation ===
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token(".")]
    Dot,
    #[token("...")]
    Ellipsis,

    // === Operators ===
    #[token("&")]
    And,
    #[token("|")]
    Or,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("!")]
    Not,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    /// End of input; never produced by logos, appended by [`tokenize`].
    Eof,
}

impl TokenKind {
    /// A short human-readable description used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Newline => "newline",
            TokenKind::Package => "`package`",
            TokenKind::Import => "`import`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Null => "`null`",
            TokenKind::Bottom => "`_|_`",
            TokenKind::DefIdent => "definition",
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Question => "`?`",
            TokenKind::Dot => "`.`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::And => "`&`",
            TokenKind::Or => "`|`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::OrOr => "`||`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::Le => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Ge => "`>=`",
            TokenKind::Not => "`!`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Eof => "end of input",
        }
    }
}

/// A token with its location in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// Byte span in the source.
    pub span: Span,
}

/// Tokenize schema source, appending a trailing [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::from(lexer.span());
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(()) => {
                return Err(EvalError::syntax(
                    span,
                    format!("unexpected character {:?}", lexer.slice()),
                ));
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_field_declaration() {
        assert_eq!(
            kinds("funcs: Expect: #MockFunction"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::DefIdent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_bottom_and_top() {
        assert_eq!(
            kinds("_|_ _"),
            vec![TokenKind::Bottom, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_open_list_tokens() {
        assert_eq!(
            kinds("[..._]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Ellipsis,
                TokenKind::Ident,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_attributes_skipped() {
        assert_eq!(
            kinds("Error: string @go(s,string) // trailing\n"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("18446744073709551615 1.5"),
            vec![TokenKind::Int, TokenKind::Float, TokenKind::Eof]
        );
    }

    #[test]
    fn test_bound_operators() {
        assert_eq!(
            kinds("!=\"\" >=0 <10"),
            vec![
                TokenKind::NotEq,
                TokenKind::String,
                TokenKind::Ge,
                TokenKind::Int,
                TokenKind::Lt,
                TokenKind::Int,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a: ~").unwrap_err();
        assert_eq!(err.span, Some(Span::new(3, 4)));
    }
}
