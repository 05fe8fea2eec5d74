use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::token::Token;
use crate::lang::expr::Expr;
use crate::lang::program::Program;
use crate::lang::stmt::Stmt;

/// A parsing error with source location.
///
/// `line` and `col` are 1-based positions coming from the lexer spans. For
/// errors at end-of-file the parser falls back to the last consumed token's
/// span so locations are never `0:0`.
#[derive(Debug)]
pub struct ParserError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for ParserError {
    /// Formats as `line:col: message` for CLI-friendly diagnostics.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

/// Recursive-descent parser for the assembly grammar.
///
/// A program is a sequence of lines; a line is either a label
/// (`identifier ':'`) or an instruction (`identifier [expr [',' expr]]`),
/// where `expr` is an integer, an identifier, or a bracketed address
/// expression. Label detection needs one token of lookahead: the colon
/// immediately after the leading identifier.
///
/// Parsing is strict and non-recovering: the first structural violation
/// aborts with a description of what was expected. No partial AST is
/// produced.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token, used for end-of-input
    /// error locations.
    last_span: Option<Span>,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span.clone());
        }
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    /// Constructs a `ParserError` at the most relevant location: the
    /// current token's span if there is one, otherwise the last consumed
    /// span, otherwise (1,1) for empty input.
    fn error(&self, message: &str) -> ParserError {
        if let Some(spanned) = self.current() {
            ParserError {
                message: message.to_string(),
                line: spanned.span.line,
                col: spanned.span.col,
            }
        } else if let Some(span) = &self.last_span {
            ParserError {
                message: message.to_string(),
                line: span.line,
                col: span.col,
            }
        } else {
            ParserError {
                message: message.to_string(),
                line: 1,
                col: 1,
            }
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Eol) | Some(Token::Eof))
    }

    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut stmts = Vec::new();

        while let Some(spanned) = self.current() {
            match spanned.token {
                Token::Eof => break,
                Token::Eol => {
                    self.advance();
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }

        Ok(Program { stmts })
    }

    /// Parses one statement line: a label if the identifier is followed by
    /// a colon, otherwise an instruction.
    fn parse_stmt(&mut self) -> Result<Stmt, ParserError> {
        let name = match self.current() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) => name.clone(),
            _ => return Err(self.error("expected instruction or label")),
        };

        if matches!(self.peek_next(), Some(Token::Colon)) {
            self.advance(); // name
            self.advance(); // ':'
            return Ok(Stmt::Label(name));
        }

        self.parse_instr(name)
    }

    /// Parses an instruction with zero, one, or two operands. Instruction
    /// names are folded to lowercase. The whole line must be consumed:
    /// anything after the operand list is an error.
    fn parse_instr(&mut self, name: String) -> Result<Stmt, ParserError> {
        self.advance(); // instruction name
        let name = name.to_lowercase();

        let mut dst = None;
        let mut src = None;

        if !self.at_line_end() {
            dst = Some(self.parse_expr()?);

            if !self.at_line_end() {
                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                    }
                    _ => return Err(self.error("expected ',' between operands")),
                }

                src = Some(self.parse_expr()?);

                if !self.at_line_end() {
                    return Err(self.error("expected end of line after operands"));
                }
            }
        }

        Ok(Stmt::Instr { name, dst, src })
    }

    /// Parses `expr`: an integer literal, an identifier, or a bracketed
    /// address expression (which may nest).
    fn parse_expr(&mut self) -> Result<Expr, ParserError> {
        match self.peek().cloned() {
            Some(Token::Int(value)) => {
                self.advance();
                Ok(Expr::Int(value))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            Some(Token::LBracket) => {
                self.advance();
                let inner = self.parse_expr()?;
                match self.peek() {
                    Some(Token::RBracket) => {
                        self.advance();
                    }
                    _ => return Err(self.error("expected ']' to close address expression")),
                }
                Ok(Expr::AddressOf(Box::new(inner)))
            }
            _ => Err(self.error("expected integer, identifier, or address expression")),
        }
    }
}
