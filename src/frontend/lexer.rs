use log::warn;

use crate::frontend::token::Token;

#[derive(Debug, Clone)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Tokenizer for the assembly surface syntax.
///
/// Lexing never fails: comments are stripped, unrecognized characters are
/// reported through the `log` facade and dropped, and anything structurally
/// wrong surfaces later as a parse error.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if ch == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        ch
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Skips a `;` comment up to (not including) the end of line, so the
    /// line's `Eol` token is still produced.
    fn skip_comment(&mut self) {
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// Reads a decimal or `0x` hexadecimal integer literal.
    ///
    /// Returns `None` (after logging a diagnostic) for literals that do not
    /// fit in an `i64`; the missing token then surfaces as a parse error.
    fn read_int(&mut self) -> Option<Token> {
        let start_line = self.line;
        let start_col = self.col;

        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();

            let mut hex = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    hex.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }

            return match i64::from_str_radix(&hex, 16) {
                Ok(value) => Some(Token::Int(value)),
                Err(_) => {
                    warn!(
                        "{}:{}: invalid hex literal: 0x{}",
                        start_line, start_col, hex
                    );
                    None
                }
            };
        }

        let mut digits = String::new();
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match digits.parse::<i64>() {
            Ok(value) => Some(Token::Int(value)),
            Err(_) => {
                warn!(
                    "{}:{}: integer literal out of range: {}",
                    start_line, start_col, digits
                );
                None
            }
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::Ident(ident)
    }

    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let span = self.span();

            match self.current() {
                None => {
                    tokens.push(Spanned {
                        token: Token::Eof,
                        span,
                    });
                    break;
                }
                Some('\n') => {
                    tokens.push(Spanned {
                        token: Token::Eol,
                        span,
                    });
                    self.advance();
                }
                Some(';') => {
                    self.skip_comment();
                }
                Some(',') => {
                    self.advance();
                    tokens.push(Spanned {
                        token: Token::Comma,
                        span,
                    });
                }
                Some(':') => {
                    self.advance();
                    tokens.push(Spanned {
                        token: Token::Colon,
                        span,
                    });
                }
                Some('[') => {
                    self.advance();
                    tokens.push(Spanned {
                        token: Token::LBracket,
                        span,
                    });
                }
                Some(']') => {
                    self.advance();
                    tokens.push(Spanned {
                        token: Token::RBracket,
                        span,
                    });
                }
                Some(ch) if ch.is_ascii_digit() => {
                    if let Some(token) = self.read_int() {
                        tokens.push(Spanned { token, span });
                    }
                }
                Some(ch) if ch.is_alphabetic() || ch == '_' => {
                    let token = self.read_identifier();
                    tokens.push(Spanned { token, span });
                }
                Some(ch) => {
                    warn!("{}:{}: unrecognized character: {:?}", self.line, self.col, ch);
                    self.advance();
                }
            }
        }

        tokens
    }
}
