//! Precedence-climbing parser producing a resolved [`Expr`] tree.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons (chainable),
//! `+ -`, `* / // %`, unary `+ -`, `**` (right associative).

use kt_types::RestrictionError;

use super::lexer::Token;
use super::{BinaryOp, CompareOp, Expr, UnaryOp, Value};

static EOF: Token = Token::Eof;

/// Deepest nesting of parentheses and prefix operators accepted.
const MAX_DEPTH: usize = 64;
/// Longest token stream accepted; bounds the depth of operator chains.
const MAX_TOKENS: usize = 4096;

pub(crate) struct Parser<'n> {
    source: String,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    names: &'n [String],
}

impl<'n> Parser<'n> {
    pub(crate) fn new(source: &str, tokens: Vec<Token>, names: &'n [String]) -> Self {
        Self {
            source: source.to_string(),
            tokens,
            pos: 0,
            depth: 0,
            names,
        }
    }

    /// Parse a full expression; trailing tokens are an error.
    pub(crate) fn parse(mut self) -> Result<Expr, RestrictionError> {
        if self.tokens.len() > MAX_TOKENS {
            return Err(self.error(format!("expression longer than {MAX_TOKENS} tokens")));
        }
        let expr = self.parse_or()?;
        if self.current() != &Token::Eof {
            return Err(self.error(format!("unexpected trailing token {:?}", self.current())));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, RestrictionError> {
        let mut left = self.parse_and()?;
        while self.match_token(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, RestrictionError> {
        let mut left = self.parse_not()?;
        while self.match_token(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, RestrictionError> {
        if self.match_token(&Token::Not) {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, RestrictionError> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current() {
                Token::EqEq => CompareOp::Eq,
                Token::NotEq => CompareOp::Ne,
                Token::Lt => CompareOp::Lt,
                Token::Le => CompareOp::Le,
                Token::Gt => CompareOp::Gt,
                Token::Ge => CompareOp::Ge,
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, RestrictionError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, RestrictionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::SlashSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, RestrictionError> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, RestrictionError> {
        let base = self.parse_primary()?;
        if self.match_token(&Token::StarStar) {
            // Right associative, and the exponent may carry its own sign.
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, RestrictionError> {
        let token = self.current().clone();
        self.advance();
        match token {
            Token::Int(v) => Ok(Expr::Literal(Value::Int(v))),
            Token::Float(v) => Ok(Expr::Literal(Value::Float(v))),
            Token::Str(v) => Ok(Expr::Literal(Value::Str(v))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Ident(name) => match self.names.iter().position(|n| *n == name) {
                Some(index) => Ok(Expr::Param(index)),
                None => Err(RestrictionError::UnknownParameter {
                    expr: self.source.clone(),
                    name,
                }),
            },
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;
                if !self.match_token(&Token::RParen) {
                    return Err(self.error("expected ')'".to_string()));
                }
                Ok(inner)
            }
            Token::Eof => Err(self.error("unexpected end of expression".to_string())),
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Expr, RestrictionError>,
    ) -> Result<Expr, RestrictionError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&EOF)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> RestrictionError {
        RestrictionError::Parse {
            expr: self.source.clone(),
            message,
        }
    }
}
