// Copyright 2024 Qwery Project Authors. Licensed under Apache-2.0.

//! The tokenizer turns a statement string into a [`TokenStream`]: a cursor
//! with single-token lookahead and a LIFO mark/reset stack that the
//! template parser uses to back out of optional clauses.

/// The lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    /// Backtick-quoted identifier; whitespace allowed inside.
    BacktickIdent,
    Number,
    /// Single- or double-quoted string literal.
    Quoted,
    Symbol,
}

/// A lexeme with its kind and source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl Token {
    /// Whether this token matches a template word: case-insensitive for
    /// identifiers and symbols, never for quoted literals.
    pub fn matches(&self, word: &str) -> bool {
        self.kind != TokenKind::Quoted && self.text.eq_ignore_ascii_case(word)
    }
}

/// A syntax error carrying the offending token position.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at line {line}, column {column}, near {near:?}")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub near: String,
}

/// A forward-only cursor over tokens.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    marks: Vec<usize>,
    /// Position of the end of input, for error reporting.
    eof: (u32, u32),
}

impl TokenStream {
    /// Tokenize a source string.
    pub fn tokenize(source: &str) -> Result<TokenStream, SyntaxError> {
        Tokenizer::new(source).run()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Consume and return the next token, failing at end of input.
    pub fn next(&mut self) -> Result<Token, SyntaxError> {
        self.next_option()
            .ok_or_else(|| self.syntax_error("unexpected end of statement"))
    }

    pub fn next_option(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    /// Whether the next token matches `word` without consuming it.
    pub fn is(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.matches(word))
    }

    /// Consume the next token iff it matches `word`.
    pub fn next_if(&mut self, word: &str) -> bool {
        if self.is(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next token, failing unless it matches `word`.
    pub fn expect(&mut self, word: &str) -> Result<(), SyntaxError> {
        if self.next_if(word) {
            Ok(())
        } else {
            Err(self.syntax_error(format!("expected {word:?}")))
        }
    }

    /// Push the current position onto the mark stack.
    pub fn mark(&mut self) {
        self.marks.push(self.pos);
    }

    /// Pop the most recent mark and rewind to it.
    pub fn reset(&mut self) {
        self.pos = self.marks.pop().expect("reset without a mark");
    }

    /// Pop the most recent mark without rewinding.
    pub fn unmark(&mut self) {
        self.marks.pop().expect("unmark without a mark");
    }

    /// The current cursor position; used to detect progress in repetitions.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Construct a syntax error at the current token.
    pub fn syntax_error(&self, message: impl Into<String>) -> SyntaxError {
        match self.peek() {
            Some(token) => SyntaxError {
                message: message.into(),
                line: token.line,
                column: token.column,
                near: token.text.clone(),
            },
            None => SyntaxError {
                message: message.into(),
                line: self.eof.0,
                column: self.eof.1,
                near: "<end>".into(),
            },
        }
    }
}

struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Tokenizer {
    fn new(source: &str) -> Self {
        Tokenizer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<TokenStream, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let Some(ch) = self.current() else { break };
            let (text, kind) = match ch {
                '\'' | '"' => (self.read_quoted(ch)?, TokenKind::Quoted),
                '`' => (self.read_backtick()?, TokenKind::BacktickIdent),
                c if c.is_ascii_digit() => (self.read_number(), TokenKind::Number),
                c if c.is_alphabetic() || c == '_' => (self.read_ident(), TokenKind::Ident),
                _ => (self.read_symbol(line, column)?, TokenKind::Symbol),
            };
            tokens.push(Token {
                text,
                kind,
                line,
                column,
            });
        }
        Ok(TokenStream {
            tokens,
            pos: 0,
            marks: Vec::new(),
            eof: (self.line, self.column),
        })
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    /// Skip whitespace, `--` line comments and `/* */` block comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => self.advance(),
                Some('-') if self.peek_at(1) == Some('-') => {
                    while self.current().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while self.current().is_some() {
                        if self.current() == Some('*') && self.peek_at(1) == Some('/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_number(&mut self) -> String {
        let mut text = String::new();
        let mut seen_dot = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
            } else if ch == '.'
                && !seen_dot
                && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
            {
                seen_dot = true;
                text.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        text
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        self.advance();
        while let Some(ch) = self.current() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(text);
                }
                '\\' => {
                    self.advance();
                    let escaped = match self.current() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some(c) => c,
                        None => break,
                    };
                    text.push(escaped);
                    self.advance();
                }
                _ => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
        Err(SyntaxError {
            message: "unterminated string literal".into(),
            line,
            column,
            near: text,
        })
    }

    fn read_backtick(&mut self) -> Result<String, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        self.advance();
        while let Some(ch) = self.current() {
            if ch == '`' {
                self.advance();
                return Ok(text);
            }
            text.push(ch);
            self.advance();
        }
        Err(SyntaxError {
            message: "unterminated quoted identifier".into(),
            line,
            column,
            near: text,
        })
    }

    fn read_symbol(&mut self, line: u32, column: u32) -> Result<String, SyntaxError> {
        let ch = self.current().unwrap();
        // two-character operators first
        let pair = self.peek_at(1).map(|next| [ch, next]);
        if let Some(pair) = pair {
            let two: String = pair.iter().collect();
            if matches!(two.as_str(), "<>" | "!=" | "<=" | ">=" | "||") {
                self.advance();
                self.advance();
                return Ok(two);
            }
        }
        if "(),;=<>+-*/%@.".contains(ch) {
            self.advance();
            return Ok(ch.to_string());
        }
        Err(SyntaxError {
            message: format!("unexpected character {ch:?}"),
            line,
            column,
            near: ch.to_string(),
        })
    }
}
