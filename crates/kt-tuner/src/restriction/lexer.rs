//! Tokenizer for restriction expressions.

use std::iter::Peekable;
use std::str::CharIndices;

use kt_types::RestrictionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Eof,
}

pub(crate) struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    /// Tokenize the whole source, always ending with [`Token::Eof`].
    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, RestrictionError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, found: char, offset: usize) -> RestrictionError {
        RestrictionError::UnexpectedChar {
            expr: self.source.to_string(),
            found,
            offset,
        }
    }

    fn next_token(&mut self) -> Result<Token, RestrictionError> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }

        let Some((offset, c)) = self.chars.next() else {
            return Ok(Token::Eof);
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '%' => Token::Percent,
            '*' => {
                if self.match_char('*') {
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            '/' => {
                if self.match_char('/') {
                    Token::SlashSlash
                } else {
                    Token::Slash
                }
            }
            '=' => {
                if self.match_char('=') {
                    Token::EqEq
                } else {
                    return Err(self.unexpected(c, offset));
                }
            }
            '!' => {
                if self.match_char('=') {
                    Token::NotEq
                } else {
                    Token::Not
                }
            }
            '<' => {
                if self.match_char('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.match_char('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' => {
                if self.match_char('&') {
                    Token::And
                } else {
                    return Err(self.unexpected(c, offset));
                }
            }
            '|' => {
                if self.match_char('|') {
                    Token::Or
                } else {
                    return Err(self.unexpected(c, offset));
                }
            }
            '\'' | '"' => self.string(c, offset)?,
            c if c.is_ascii_digit() || c == '.' => self.number(c, offset)?,
            c if c.is_alphabetic() || c == '_' => self.word(c, offset),
            other => return Err(self.unexpected(other, offset)),
        };
        Ok(token)
    }

    fn string(&mut self, quote: char, start: usize) -> Result<Token, RestrictionError> {
        let mut value = String::new();
        for (_, c) in self.chars.by_ref() {
            if c == quote {
                return Ok(Token::Str(value));
            }
            value.push(c);
        }
        Err(RestrictionError::UnterminatedString {
            expr: self.source.to_string(),
            offset: start,
        })
    }

    fn number(&mut self, first: char, start: usize) -> Result<Token, RestrictionError> {
        let mut end = start + 1;
        let mut is_float = first == '.';
        while let Some(&(i, c)) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && matches!(self.source[..i].chars().last(), Some('e' | 'E'));
            if c.is_ascii_digit() || exponent_sign {
                end = i + 1;
            } else if c == '.' || c == 'e' || c == 'E' {
                is_float = true;
                end = i + 1;
            } else {
                break;
            }
            self.chars.next();
        }

        let literal = &self.source[start..end];
        let invalid = || RestrictionError::InvalidNumber {
            expr: self.source.to_string(),
            literal: literal.to_string(),
        };
        if is_float {
            literal.parse::<f64>().map(Token::Float).map_err(|_| invalid())
        } else {
            literal.parse::<i64>().map(Token::Int).map_err(|_| invalid())
        }
    }

    fn word(&mut self, first: char, start: usize) -> Token {
        let mut end = start + first.len_utf8();
        while let Some(&(i, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        match &self.source[start..end] {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            ident => Token::Ident(ident.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().unwrap()
    }

    #[test]
    fn operators_and_identifiers() {
        assert_eq!(
            lex("a-b==c"),
            vec![
                Token::Ident("a".into()),
                Token::Minus,
                Token::Ident("b".into()),
                Token::EqEq,
                Token::Ident("c".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        assert_eq!(
            lex("x ** 2 // 3 != 4 && !y || z <= 1"),
            vec![
                Token::Ident("x".into()),
                Token::StarStar,
                Token::Int(2),
                Token::SlashSlash,
                Token::Int(3),
                Token::NotEq,
                Token::Int(4),
                Token::And,
                Token::Not,
                Token::Ident("y".into()),
                Token::Or,
                Token::Ident("z".into()),
                Token::Le,
                Token::Int(1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(
            lex("1.5e-3 42 .5 'row'"),
            vec![
                Token::Float(1.5e-3),
                Token::Int(42),
                Token::Float(0.5),
                Token::Str("row".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            lex("not a and True or False"),
            vec![
                Token::Not,
                Token::Ident("a".into()),
                Token::And,
                Token::True,
                Token::Or,
                Token::False,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_assignment_and_unknown_characters() {
        assert!(matches!(
            Lexer::new("a = 1").tokenize(),
            Err(RestrictionError::UnexpectedChar { found: '=', .. })
        ));
        assert!(matches!(
            Lexer::new("a; b").tokenize(),
            Err(RestrictionError::UnexpectedChar { found: ';', .. })
        ));
        assert!(matches!(
            Lexer::new("'open").tokenize(),
            Err(RestrictionError::UnterminatedString { .. })
        ));
    }
}
