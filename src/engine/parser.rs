//! Build-file parser.
//!
//! The configuration syntax is line-oriented:
//!
//! ```text
//! # comment
//! CXXFLAGS = "-O2 -Wall"
//! targets = {
//!     app = cppLink + {
//!         files = { "src/*.cpp" = cppCompile }
//!         libs = "m"
//!     }
//! }
//! ```
//!
//! `key = expr` assigns; a bare word or string on its own declares a key;
//! `{ ... }` groups statements; `+` concatenates values. On the right-hand
//! side a bare identifier is a reference to another key, while a quoted
//! string is literal text (it may contain spaces and `$(...)` calls, which
//! stay unexpanded until the value executes). Newlines and commas separate
//! statements.

use std::rc::Rc;

use thiserror::Error;

use super::statement::{Statement, ValueStatement};

#[derive(Debug, Error)]
#[error("parse error at line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

/// Parse build-file source into a root block statement.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statements = parser.statements(false)?;
    match parser.peek() {
        None => Ok(Statement::Block(statements)),
        Some(_) => Err(ParseError::new(parser.line(), "unexpected `}`")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBrace,
    RBrace,
    Equals,
    Plus,
    /// Newline or comma.
    Separator,
    /// Bare word.
    Word(String),
    /// Double-quoted string.
    Str(String),
}

fn lex(source: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\n' => {
                tokens.push((Token::Separator, line));
                line += 1;
            }
            c if c.is_whitespace() => {}
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        tokens.push((Token::Separator, line));
                        line += 1;
                        break;
                    }
                }
            }
            '{' => tokens.push((Token::LBrace, line)),
            '}' => tokens.push((Token::RBrace, line)),
            '=' => tokens.push((Token::Equals, line)),
            '+' => tokens.push((Token::Plus, line)),
            ',' => tokens.push((Token::Separator, line)),
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some(other) => {
                                text.push('\\');
                                text.push(other);
                            }
                            None => return Err(ParseError::new(line, "unterminated string")),
                        },
                        Some('\n') | None => {
                            return Err(ParseError::new(line, "unterminated string"))
                        }
                        Some(other) => text.push(other),
                    }
                }
                tokens.push((Token::Str(text), line));
            }
            first => {
                let mut word = String::new();
                word.push(first);
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | '=' | '+' | ',' | '#' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push((Token::Word(word), line));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn skip_separators(&mut self) {
        while self.peek() == Some(&Token::Separator) {
            self.pos += 1;
        }
    }

    /// True when the next non-separator token is `+`; consumes up to and
    /// including it. Lets `+` continue an expression across newlines.
    fn eat_plus(&mut self) -> bool {
        let mut ahead = self.pos;
        while self.tokens.get(ahead).map(|(t, _)| t) == Some(&Token::Separator) {
            ahead += 1;
        }
        if self.tokens.get(ahead).map(|(t, _)| t) == Some(&Token::Plus) {
            self.pos = ahead + 1;
            true
        } else {
            false
        }
    }

    fn statements(&mut self, in_braces: bool) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => {
                    if in_braces {
                        return Err(ParseError::new(self.line(), "missing `}`"));
                    }
                    break;
                }
                Some(Token::RBrace) => break,
                Some(_) => {}
            }
            statements.push(self.statement()?);
            match self.peek() {
                None | Some(Token::RBrace) | Some(Token::Separator) => {}
                Some(_) => {
                    return Err(ParseError::new(
                        self.line(),
                        "expected newline or `,` after statement",
                    ))
                }
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement, ParseError> {
        let key = match self.next() {
            Some(Token::Word(w)) => w,
            Some(Token::Str(s)) => s,
            _ => return Err(ParseError::new(self.line(), "expected a key")),
        };
        if self.peek() == Some(&Token::Equals) {
            self.pos += 1;
            let value = self.expression()?;
            Ok(Statement::Assign {
                key,
                value: Rc::new(ValueStatement::tree(value)),
            })
        } else {
            Ok(Statement::Word(key))
        }
    }

    fn expression(&mut self) -> Result<Statement, ParseError> {
        let mut node = self.term()?;
        while self.eat_plus() {
            let right = self.term()?;
            node = Statement::Binary {
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Statement, ParseError> {
        self.skip_separators_before_brace();
        match self.next() {
            Some(Token::LBrace) => {
                let statements = self.statements(true)?;
                match self.next() {
                    Some(Token::RBrace) => Ok(Statement::Block(statements)),
                    _ => Err(ParseError::new(self.line(), "missing `}`")),
                }
            }
            Some(Token::Str(text)) => Ok(Statement::Word(text)),
            Some(Token::Word(name)) => Ok(Statement::Reference(name)),
            _ => Err(ParseError::new(self.line(), "expected a value")),
        }
    }

    /// Allow a `{` to start on the line after `=` or `+`.
    fn skip_separators_before_brace(&mut self) {
        let mut ahead = self.pos;
        while self.tokens.get(ahead).map(|(t, _)| t) == Some(&Token::Separator) {
            ahead += 1;
        }
        if self.tokens.get(ahead).map(|(t, _)| t) == Some(&Token::LBrace) {
            self.pos = ahead;
        }
    }
}
