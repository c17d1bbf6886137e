//! Recursive-descent parser for schema source.
//!
//! # Grammar
//!
//! ```text
//! file    ::= ["package" ident] {import} decls
//! decl    ::= label {":" label} ":" expr | label "?" ":" expr
//!           | "[" expr "]" ":" expr | "..." | expr
//! expr    ::= binary expressions, `|` binding loosest and `*` `/` tightest
//! unary   ::= ("!" | "-" | "+" | "*" | "!=" | "<" | "<=" | ">" | ">=") unary | postfix
//! postfix ::= primary {"." label | "[" expr "]" | "(" args ")"}
//! ```
//!
//! Declarations are separated by commas or newlines. Inside brackets,
//! parentheses, and after binary operators newlines are insignificant.

use crate::ast::{BinaryOp, Decl, Expr, File, Label, ListLit, StructLit, UnaryOp};
use crate::error::EvalError;
use crate::graph::MAX_DEPTH;
use crate::span::Span;
use crate::token::{tokenize, Token, TokenKind};

/// Parse a complete schema file.
pub fn parse_file(source: &str) -> Result<File, EvalError> {
    Parser::new(source)?.parse_file()
}

/// Parse a single expression, e.g. a definition body.
pub fn parse_expr(source: &str) -> Result<Expr, EvalError> {
    let mut parser = Parser::new(source)?;
    parser.skip_newlines();
    let expr = parser.parse_expr()?;
    parser.skip_newlines();
    parser.expect(TokenKind::Eof)?;
    Ok(expr)
}

/// Bracket, operator and label nesting accepted by the parser.
const MAX_NESTING: usize = 64;

/// Schema parser over a token buffer.
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    /// Nested `descend` calls, also the tree depth of the node being parsed.
    depth: usize,
    /// Deepest node of the subtree being parsed. Left-nested operator and
    /// selector chains push it down one level per link.
    deepest: usize,
}

impl<'src> Parser<'src> {
    /// Tokenize `source` and create a parser for it.
    pub fn new(source: &'src str) -> Result<Self, EvalError> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
            deepest: 0,
        })
    }

    // ============================================================
    // Token helpers
    // ============================================================

    fn current(&self) -> Token {
        self.peek(0)
    }

    fn peek(&self, offset: usize) -> Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[index]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// Run `parse` one nesting level deeper.
    fn descend<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::syntax(
                self.current().span,
                format!("expression nested deeper than {MAX_NESTING} levels"),
            ));
        }
        self.depth += 1;
        let result = self.reach(self.depth).and_then(|()| parse(self));
        self.depth -= 1;
        result
    }

    /// Wrap the subtree parsed so far in one more node.
    fn wrap(&mut self) -> Result<(), EvalError> {
        self.reach(self.deepest + 1)
    }

    fn reach(&mut self, depth: usize) -> Result<(), EvalError> {
        if depth > MAX_DEPTH {
            return Err(EvalError::syntax(
                self.current().span,
                format!("expression nested deeper than {MAX_DEPTH} levels"),
            ));
        }
        self.deepest = self.deepest.max(depth);
        Ok(())
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, EvalError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> EvalError {
        let token = self.current();
        EvalError::syntax(
            token.span,
            format!("expected {expected}, found {}", token.kind.describe()),
        )
    }

    fn text(&self, span: Span) -> &'src str {
        &self.source[span.range()]
    }

    fn skip_newlines(&mut self) {
        while self.eat(TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while self.eat(TokenKind::Newline) || self.eat(TokenKind::Comma) {}
    }

    // ============================================================
    // Files and declarations
    // ============================================================

    /// Parse a complete file.
    pub fn parse_file(&mut self) -> Result<File, EvalError> {
        self.skip_separators();

        let mut package = None;
        if self.eat(TokenKind::Package) {
            let name = self.expect(TokenKind::Ident)?;
            package = Some(self.text(name.span).to_string());
            self.skip_separators();
        }

        let mut imports = Vec::new();
        while self.eat(TokenKind::Import) {
            if self.eat(TokenKind::LParen) {
                self.skip_separators();
                while !self.check(TokenKind::RParen) {
                    let token = self.expect(TokenKind::String)?;
                    imports.push(unquote(self.text(token.span), token.span)?);
                    self.skip_separators();
                }
                self.expect(TokenKind::RParen)?;
            } else {
                let token = self.expect(TokenKind::String)?;
                imports.push(unquote(self.text(token.span), token.span)?);
            }
            self.skip_separators();
        }

        let decls = self.parse_decls(TokenKind::Eof)?;
        Ok(File {
            package,
            imports,
            body: Expr::Struct(StructLit { decls }),
        })
    }

    fn parse_decls(&mut self, end: TokenKind) -> Result<Vec<Decl>, EvalError> {
        let mut decls = Vec::new();
        loop {
            self.skip_separators();
            if self.check(end) {
                break;
            }
            decls.push(self.parse_decl()?);

            match self.current().kind {
                TokenKind::Newline | TokenKind::Comma => continue,
                kind if kind == end => break,
                _ => {
                    let expected = format!("newline, `,` or {}", end.describe());
                    return Err(self.unexpected(&expected));
                }
            }
        }
        Ok(decls)
    }

    fn parse_decl(&mut self) -> Result<Decl, EvalError> {
        self.descend(Self::parse_decl_inner)
    }

    fn parse_decl_inner(&mut self) -> Result<Decl, EvalError> {
        match self.current().kind {
            TokenKind::Ellipsis => {
                self.advance();
                Ok(Decl::Ellipsis)
            }
            TokenKind::LBracket => {
                self.advance();
                self.skip_newlines();
                let label = self.parse_expr()?;
                self.skip_newlines();
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expr()?;
                Ok(Decl::Pattern { label, value })
            }
            _ if self.is_label_start() => self.parse_field(),
            _ => Ok(Decl::Embed(self.parse_expr()?)),
        }
    }

    fn is_label_start(&self) -> bool {
        let is_label = matches!(
            self.current().kind,
            TokenKind::Ident | TokenKind::DefIdent | TokenKind::String
        );
        is_label
            && (self.peek(1).kind == TokenKind::Colon
                || (self.peek(1).kind == TokenKind::Question
                    && self.peek(2).kind == TokenKind::Colon))
    }

    /// Whether the bracket at the cursor opens a pattern label, `[...]:`.
    fn is_pattern_start(&self) -> bool {
        if !self.check(TokenKind::LBracket) {
            return false;
        }
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.pos..].iter().enumerate() {
            match token.kind {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek(offset + 1).kind == TokenKind::Colon;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn parse_field(&mut self) -> Result<Decl, EvalError> {
        let token = self.advance();
        let label = match token.kind {
            TokenKind::String => Label::Regular(unquote(self.text(token.span), token.span)?),
            _ => Label::from_ident(self.text(token.span)),
        };
        let optional = self.eat(TokenKind::Question);
        self.expect(TokenKind::Colon)?;

        // `a: b: c` is shorthand for `a: {b: c}`, likewise `a: [string]: c`.
        let value = if self.is_label_start() || self.is_pattern_start() {
            let inner = self.parse_decl()?;
            Expr::Struct(StructLit { decls: vec![inner] })
        } else {
            self.parse_expr()?
        };

        Ok(Decl::Field {
            label,
            optional,
            value,
        })
    }

    // ============================================================
    // Expressions
    // ============================================================

    /// Parse an expression.
    pub fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_binary(1)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, EvalError> {
        let outer = std::mem::replace(&mut self.deepest, self.depth);
        let mut lhs = self.parse_unary()?;

        while let Some(op) = binary_op(self.current().kind) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.wrap()?;
            self.advance();
            self.skip_newlines();
            let rhs = self.parse_binary(precedence + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        self.deepest = self.deepest.max(outer);
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        self.descend(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Expr, EvalError> {
        let op = match self.current().kind {
            TokenKind::Star => {
                self.advance();
                return Ok(Expr::Default(Box::new(self.parse_unary()?)));
            }
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::NotEq => UnaryOp::NotEqual,
            TokenKind::Lt => UnaryOp::Less,
            TokenKind::Le => UnaryOp::LessEqual,
            TokenKind::Gt => UnaryOp::Greater,
            TokenKind::Ge => UnaryOp::GreaterEqual,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let outer = std::mem::replace(&mut self.deepest, self.depth);
        let mut expr = self.parse_primary()?;

        loop {
            if matches!(
                self.current().kind,
                TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen
            ) {
                self.wrap()?;
            }
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let token = self.current();
                    let label = match token.kind {
                        TokenKind::Ident | TokenKind::DefIdent => {
                            Label::from_ident(self.text(token.span))
                        }
                        TokenKind::String => {
                            Label::Regular(unquote(self.text(token.span), token.span)?)
                        }
                        _ => return Err(self.unexpected("field name after `.`")),
                    };
                    self.advance();
                    expr = Expr::Select(Box::new(expr), label);
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.skip_newlines();
                    let index = self.parse_expr()?;
                    self.skip_newlines();
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    self.advance();
                    self.skip_newlines();
                    let mut args = Vec::new();
                    while !self.check(TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        self.skip_newlines();
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                        self.skip_newlines();
                    }
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }

        self.deepest = self.deepest.max(outer);
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let token = self.current();
        let expr = match token.kind {
            TokenKind::Int => {
                let digits: String = self.text(token.span).chars().filter(|c| *c != '_').collect();
                let value = digits.parse::<i128>().map_err(|_| {
                    EvalError::syntax(token.span, format!("integer literal {digits} out of range"))
                })?;
                Expr::Int(value)
            }
            TokenKind::Float => {
                let text = self.text(token.span);
                let value = text.parse::<f64>().map_err(|_| {
                    EvalError::syntax(token.span, format!("invalid float literal {text}"))
                })?;
                Expr::Float(value)
            }
            TokenKind::String => Expr::String(unquote(self.text(token.span), token.span)?),
            TokenKind::True => Expr::Bool(true),
            TokenKind::False => Expr::Bool(false),
            TokenKind::Null => Expr::Null,
            TokenKind::Bottom => Expr::Bottom,
            TokenKind::Ident if self.text(token.span) == "_" => Expr::Top,
            TokenKind::Ident | TokenKind::DefIdent => {
                Expr::Ident(self.text(token.span).to_string())
            }
            TokenKind::LBrace => {
                self.advance();
                let decls = self.parse_decls(TokenKind::RBrace)?;
                self.expect(TokenKind::RBrace)?;
                return Ok(Expr::Struct(StructLit { decls }));
            }
            TokenKind::LBracket => return self.parse_list(),
            TokenKind::LParen => {
                self.advance();
                self.skip_newlines();
                let inner = self.parse_expr()?;
                self.skip_newlines();
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        Ok(expr)
    }

    fn parse_list(&mut self) -> Result<Expr, EvalError> {
        self.expect(TokenKind::LBracket)?;
        self.skip_newlines();

        let mut list = ListLit::default();
        loop {
            if self.check(TokenKind::RBracket) {
                break;
            }
            if self.eat(TokenKind::Ellipsis) {
                let tail = match self.current().kind {
                    TokenKind::RBracket | TokenKind::Comma | TokenKind::Newline => Expr::Top,
                    _ => self.parse_expr()?,
                };
                list.tail = Some(Box::new(tail));
                self.skip_newlines();
                self.eat(TokenKind::Comma);
                self.skip_newlines();
                break;
            }

            list.elems.push(self.parse_expr()?);
            self.skip_newlines();
            if !self.eat(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }

        self.expect(TokenKind::RBracket)?;
        Ok(Expr::List(list))
    }
}

fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::And => BinaryOp::Unify,
        TokenKind::Or => BinaryOp::Disjoin,
        TokenKind::OrOr => BinaryOp::Or,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        _ => return None,
    })
}

/// Strip the quotes from a string literal and process escapes.
fn unquote(literal: &str, span: Span) -> Result<String, EvalError> {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        EvalError::syntax(span, format!("invalid unicode escape \\u{hex}"))
                    })?;
                out.push(decoded);
            }
            other => {
                let shown = other.map(String::from).unwrap_or_default();
                return Err(EvalError::syntax(span, format!("unknown escape sequence \\{shown}")));
            }
        }
    }

    Ok(out)
}
