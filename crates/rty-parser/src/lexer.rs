//! Hand-written lexer for the supported source subset.
//!
//! Produces a flat token vector with byte spans. Comments and line
//! continuations are consumed here; newlines are significant (they terminate
//! statements) and surface as `Newline` tokens.

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Payload-carrying tokens
    Ident(String),
    Const(String),
    IVar(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(String),

    // Keywords
    KwClass,
    KwModule,
    KwDef,
    KwEnd,
    KwIf,
    KwElsif,
    KwElse,
    KwUnless,
    KwWhile,
    KwUntil,
    KwCase,
    KwWhen,
    KwThen,
    KwBegin,
    KwRescue,
    KwEnsure,
    KwReturn,
    KwTrue,
    KwFalse,
    KwNil,
    KwSelf,
    KwDo,

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Assign,
    AndAnd,
    OrOr,
    Bang,
    Dot,
    SafeNav,
    ColonColon,
    Colon,
    Comma,
    Semi,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Pipe,
    Arrow,

    Newline,
    Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub begin: u32,
    pub end: u32,
}

/// A lexer error: unexpected byte or unterminated string.
#[derive(Clone, Debug)]
pub struct LexError {
    pub begin: u32,
    pub end: u32,
    pub message: String,
}

pub struct Lexer<'src> {
    src: &'src [u8],
    pos: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

pub fn lex(source: &str) -> LexOutput {
    let mut lexer = Lexer {
        src: source.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    lexer.run();
    LexOutput {
        tokens: lexer.tokens,
        errors: lexer.errors,
    }
}

impl<'src> Lexer<'src> {
    fn run(&mut self) {
        while self.pos < self.src.len() {
            let start = self.pos;
            let b = self.src[self.pos];
            match b {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.pos += 1;
                    // Collapse runs of blank lines into one separator.
                    if !matches!(
                        self.tokens.last().map(|t| &t.kind),
                        Some(TokenKind::Newline) | None
                    ) {
                        self.push(TokenKind::Newline, start);
                    }
                }
                b'#' => {
                    while self.pos < self.src.len() && self.src[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'0'..=b'9' => self.number(),
                b'"' | b'\'' => self.string(b),
                b':' => {
                    if self.peek(1) == Some(b':') {
                        self.pos += 2;
                        self.push(TokenKind::ColonColon, start);
                    } else if self.peek(1).is_some_and(is_ident_start) {
                        self.pos += 1;
                        let name = self.ident_text();
                        self.push(TokenKind::Sym(name), start);
                    } else {
                        self.pos += 1;
                        self.push(TokenKind::Colon, start);
                    }
                }
                b'@' => {
                    self.pos += 1;
                    if self.pos < self.src.len() && is_ident_start(self.src[self.pos]) {
                        let name = self.ident_text();
                        self.push(TokenKind::IVar(name), start);
                    } else {
                        self.error(start, "stray '@'");
                    }
                }
                b'+' => self.op1(TokenKind::Plus),
                b'-' => self.op1(TokenKind::Minus),
                b'*' => self.op1(TokenKind::Star),
                b'/' => self.op1(TokenKind::Slash),
                b'=' => match self.peek(1) {
                    Some(b'=') => self.op2(TokenKind::EqEq),
                    Some(b'>') => self.op2(TokenKind::Arrow),
                    _ => self.op1(TokenKind::Assign),
                },
                b'!' => match self.peek(1) {
                    Some(b'=') => self.op2(TokenKind::NotEq),
                    _ => self.op1(TokenKind::Bang),
                },
                b'<' => match self.peek(1) {
                    Some(b'=') => self.op2(TokenKind::LtEq),
                    _ => self.op1(TokenKind::Lt),
                },
                b'>' => match self.peek(1) {
                    Some(b'=') => self.op2(TokenKind::GtEq),
                    _ => self.op1(TokenKind::Gt),
                },
                b'&' => match self.peek(1) {
                    Some(b'&') => self.op2(TokenKind::AndAnd),
                    Some(b'.') => self.op2(TokenKind::SafeNav),
                    _ => {
                        self.pos += 1;
                        self.error(start, "unsupported '&'");
                    }
                },
                b'|' => match self.peek(1) {
                    Some(b'|') => self.op2(TokenKind::OrOr),
                    _ => self.op1(TokenKind::Pipe),
                },
                b'.' => self.op1(TokenKind::Dot),
                b',' => self.op1(TokenKind::Comma),
                b';' => self.op1(TokenKind::Semi),
                b'(' => self.op1(TokenKind::LParen),
                b')' => self.op1(TokenKind::RParen),
                b'[' => self.op1(TokenKind::LBracket),
                b']' => self.op1(TokenKind::RBracket),
                b'{' => self.op1(TokenKind::LBrace),
                b'}' => self.op1(TokenKind::RBrace),
                _ if is_ident_start(b) => self.ident_or_keyword(),
                _ => {
                    self.pos += 1;
                    self.error(start, &format!("unexpected byte 0x{b:02x}"));
                }
            }
        }
        let end = self.src.len() as u32;
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            begin: end,
            end,
        });
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn push(&mut self, kind: TokenKind, begin: usize) {
        self.tokens.push(Token {
            kind,
            begin: begin as u32,
            end: self.pos as u32,
        });
    }

    fn op1(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        self.push(kind, start);
    }

    fn op2(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 2;
        self.push(kind, start);
    }

    fn error(&mut self, begin: usize, message: &str) {
        self.errors.push(LexError {
            begin: begin as u32,
            end: self.pos as u32,
            message: message.to_string(),
        });
    }

    fn number(&mut self) {
        let start = self.pos;
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let is_float = self.src.get(self.pos) == Some(&b'.')
            && self.peek(1).is_some_and(|b| b.is_ascii_digit());
        if is_float {
            self.pos += 1;
            while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => self.push(TokenKind::Float(v), start),
                Err(_) => self.error(start, "malformed float literal"),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.push(TokenKind::Int(v), start),
                Err(_) => self.error(start, "integer literal out of range"),
            }
        }
    }

    fn string(&mut self, quote: u8) {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.src.get(self.pos) {
                None | Some(b'\n') => {
                    self.error(start, "unterminated string literal");
                    break;
                }
                Some(&b) if b == quote => {
                    self.pos += 1;
                    self.push(TokenKind::Str(value), start);
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.src.get(self.pos) {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'\\') => value.push('\\'),
                        Some(&b) if b == quote => value.push(b as char),
                        Some(&b) => {
                            value.push('\\');
                            value.push(b as char);
                        }
                        None => continue,
                    }
                    self.pos += 1;
                }
                Some(&b) => {
                    value.push(b as char);
                    self.pos += 1;
                }
            }
        }
    }

    fn ident_text(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.src.len() && is_ident_continue(self.src[self.pos]) {
            self.pos += 1;
        }
        // Predicate and bang method names.
        if matches!(self.src.get(self.pos), Some(b'?') | Some(b'!'))
            && self.pos > start
        {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn ident_or_keyword(&mut self) {
        let start = self.pos;
        let text = self.ident_text();
        let kind = match text.as_str() {
            "class" => TokenKind::KwClass,
            "module" => TokenKind::KwModule,
            "def" => TokenKind::KwDef,
            "end" => TokenKind::KwEnd,
            "if" => TokenKind::KwIf,
            "elsif" => TokenKind::KwElsif,
            "else" => TokenKind::KwElse,
            "unless" => TokenKind::KwUnless,
            "while" => TokenKind::KwWhile,
            "until" => TokenKind::KwUntil,
            "case" => TokenKind::KwCase,
            "when" => TokenKind::KwWhen,
            "then" => TokenKind::KwThen,
            "begin" => TokenKind::KwBegin,
            "rescue" => TokenKind::KwRescue,
            "ensure" => TokenKind::KwEnsure,
            "return" => TokenKind::KwReturn,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            "nil" => TokenKind::KwNil,
            "self" => TokenKind::KwSelf,
            "do" => TokenKind::KwDo,
            _ => {
                if text.as_bytes()[0].is_ascii_uppercase() {
                    TokenKind::Const(text)
                } else {
                    TokenKind::Ident(text)
                }
            }
        };
        self.push(kind, start);
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
#[path = "tests/lexer.rs"]
mod tests;
