use crate::keywords::to_keyword;
use crate::token::{Pos, Punctuator as P, Token, TokenKind as K};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("lex error at {pos}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, pos: Pos },
    #[error("lex error at {pos}: char literal must hold exactly one character")]
    BadCharLiteral { pos: Pos },
    #[error("lex error at {pos}: unterminated string literal")]
    UnterminatedString { pos: Pos },
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(s.as_bytes()))
    }

    // Only for lexemes known to contain no newline.
    fn advance_n(&mut self, n: usize) {
        self.pos += n;
        self.column += n as u32;
    }

    fn is_ident_start(c: u8) -> bool {
        c == b'_' || c.is_ascii_alphabetic()
    }

    fn is_ident_continue(c: u8) -> bool {
        c == b'_' || c.is_ascii_alphanumeric()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.bump();
            }
            if self.starts_with("//") {
                self.advance_n(2);
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }
    }

    fn lex_ident(&mut self) -> Token {
        let pos = self.here();
        let start = self.pos;
        self.bump();
        while let Some(c) = self.peek() {
            if Self::is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = &self.src[start..self.pos];
        let kind = match to_keyword(lexeme) {
            Some(kw) => K::Keyword(kw),
            None => K::Ident(lexeme.to_string()),
        };
        Token { kind, pos }
    }

    fn lex_number(&mut self) -> Token {
        let pos = self.here();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        // A fractional part needs a digit after the dot; `5.` stays integral
        // and leaves the dot for the next token.
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
            let repr = &self.src[start..self.pos];
            return Token {
                kind: K::FloatConst(repr.parse::<f64>().unwrap_or(0.0)),
                pos,
            };
        }
        let mut value: i64 = 0;
        for b in &self.bytes[start..self.pos] {
            value = value
                .saturating_mul(10)
                .saturating_add(i64::from(b - b'0'));
        }
        Token {
            kind: K::IntConst(value),
            pos,
        }
    }

    /// Consumes the opening quote onward; `pos` is where the literal starts.
    fn lex_string_body(&mut self, pos: Pos) -> Result<String, LexError> {
        self.bump(); // opening "
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'"') => break,
                Some(_) => {
                    self.bump();
                }
                None => return Err(LexError::UnterminatedString { pos }),
            }
        }
        let body = self.src[start..self.pos].to_string();
        self.bump(); // closing "
        Ok(body)
    }

    fn lex_char(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        self.bump(); // opening '
        let c = match self.peek() {
            Some(b'\'') | None => return Err(LexError::BadCharLiteral { pos }),
            Some(c) => c,
        };
        self.bump();
        if self.peek() != Some(b'\'') {
            return Err(LexError::BadCharLiteral { pos });
        }
        self.bump();
        Ok(Token {
            kind: K::CharConst(c as char),
            pos,
        })
    }

    /// `#include "path"`, folded into one token carrying the path.
    fn lex_include(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        self.bump(); // '#'
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.bump();
        }
        let word_start = self.pos;
        while matches!(self.peek(), Some(c) if Self::is_ident_continue(c)) {
            self.bump();
        }
        if &self.src[word_start..self.pos] != "include" {
            return Err(LexError::UnexpectedChar { ch: '#', pos });
        }
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.bump();
        }
        if self.peek() != Some(b'"') {
            return Err(LexError::UnexpectedChar { ch: '#', pos });
        }
        let path = self.lex_string_body(self.here())?;
        Ok(Token {
            kind: K::Include(path),
            pos,
        })
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_ws_and_comments();
        let pos = self.here();
        let c = match self.peek() {
            None => {
                return Ok(Token { kind: K::Eof, pos });
            }
            Some(c) => c,
        };

        if Self::is_ident_start(c) {
            return Ok(self.lex_ident());
        }
        if c.is_ascii_digit() {
            return Ok(self.lex_number());
        }
        if c == b'"' {
            let body = self.lex_string_body(pos)?;
            return Ok(Token {
                kind: K::StringConst(body),
                pos,
            });
        }
        if c == b'\'' {
            return self.lex_char();
        }
        if c == b'#' {
            return self.lex_include();
        }

        // Two-character operators win over their one-character prefixes.
        for (spelling, p) in [
            ("==", P::Eq),
            ("!=", P::Ne),
            ("<=", P::Le),
            (">=", P::Ge),
            ("&&", P::AndAnd),
            ("||", P::OrOr),
        ] {
            if self.starts_with(spelling) {
                self.advance_n(2);
                return Ok(Token {
                    kind: K::Punct(p),
                    pos,
                });
            }
        }

        let p = match c {
            b'(' => P::LParen,
            b')' => P::RParen,
            b'{' => P::LBrace,
            b'}' => P::RBrace,
            b'[' => P::LBracket,
            b']' => P::RBracket,
            b';' => P::Semicolon,
            b',' => P::Comma,
            b'+' => P::Plus,
            b'-' => P::Minus,
            b'*' => P::Star,
            b'/' => P::Slash,
            b'=' => P::Assign,
            b'<' => P::Lt,
            b'>' => P::Gt,
            _ => {
                return Err(LexError::UnexpectedChar {
                    ch: c as char,
                    pos,
                });
            }
        };
        self.bump();
        Ok(Token {
            kind: K::Punct(p),
            pos,
        })
    }
}

/// Lex a whole source text. The returned stream always ends with `Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let mut lx = Lexer::new(src);
    let mut toks = Vec::new();
    loop {
        let t = lx.next_token()?;
        let done = t.kind == K::Eof;
        toks.push(t);
        if done {
            return Ok(toks);
        }
    }
}
