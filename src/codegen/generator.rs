use crate::codegen::gen_error::GenError;
use crate::lang::expr::Expr;
use crate::lang::program::Program;
use crate::lang::stmt::Stmt;
use crate::lang::symbols::SymbolTable;

/// Translates a parsed program into tape-machine text.
///
/// The generator simulates the tape pointer while emitting code: `cursor`
/// mirrors where the pointer will be at run time, under the assumption that
/// control flow leaves it where the matching construct saved it. Moving the
/// cursor is the only addressing mechanism, so every cell access emits a
/// run of `>` or `<` equal to the distance from the previous position.
///
/// `loop_starts` snapshots the cursor at each `while`/`if` entry; the
/// matching exit pops the snapshot and moves back there before emitting
/// `]`, which is what keeps every `[`/`]` pair keyed on the same cell.
pub struct Generator {
    out: String,
    cursor: i64,
    loop_starts: Vec<i64>,
    symbols: SymbolTable,
    /// Label waiting to be bound by the next `const`. Labels only apply to
    /// the first instruction after them.
    pending_label: Option<String>,
}

impl Generator {
    pub fn new() -> Self {
        Generator {
            out: String::new(),
            cursor: 0,
            loop_starts: Vec::new(),
            symbols: SymbolTable::new(),
            pending_label: None,
        }
    }

    /// Generates the whole program, consuming the generator.
    ///
    /// # Errors
    /// Any instruction-level failure (see [`GenError`]) aborts generation;
    /// a `while`/`if` left open at the end of the program is also an error
    /// rather than emitting imbalanced output.
    pub fn generate(mut self, program: &Program) -> Result<String, GenError> {
        for stmt in &program.stmts {
            match stmt {
                Stmt::Instr { name, dst, src } => {
                    self.instr(name, dst.as_ref(), src.as_ref())?;
                }
                Stmt::Label(name) => {
                    self.pending_label = Some(name.clone());
                }
            }
        }

        if !self.loop_starts.is_empty() {
            return Err(GenError::UnclosedLoop {
                depth: self.loop_starts.len(),
            });
        }

        Ok(self.out)
    }

    /// Emits the movement run from the current cursor to `at`. The run is
    /// all `>` or all `<`, never both.
    fn point(&mut self, at: i64) {
        let diff = at - self.cursor;
        let marker = if diff < 0 { '<' } else { '>' };
        for _ in 0..diff.unsigned_abs() {
            self.out.push(marker);
        }
        self.cursor = at;
    }

    fn push_loop_start(&mut self, at: i64) {
        self.loop_starts.push(at);
    }

    fn pop_loop_start(&mut self, instr: &str) -> Result<i64, GenError> {
        self.loop_starts
            .pop()
            .ok_or_else(|| GenError::loop_underflow(instr))
    }

    fn loop_start(&mut self) {
        self.push_loop_start(self.cursor);
        self.out.push('[');
    }

    fn loop_end(&mut self, instr: &str) -> Result<(), GenError> {
        let start = self.pop_loop_start(instr)?;
        self.point(start);
        self.out.push(']');
        Ok(())
    }

    /// Resolves an operand that must be an address expression.
    fn addr_value(&self, instr: &str, operand: Option<&Expr>) -> Result<i64, GenError> {
        match operand {
            Some(Expr::AddressOf(inner)) => Ok(inner.evaluate(&self.symbols)?),
            Some(_) | None => Err(GenError::operand(instr, "operand must be an address")),
        }
    }

    /// Resolves an address operand and moves the cursor there.
    fn point_at(&mut self, instr: &str, operand: Option<&Expr>) -> Result<(), GenError> {
        let at = self.addr_value(instr, operand)?;
        self.point(at);
        Ok(())
    }

    /// Resolves an optional count operand. Defaults to 1; an address
    /// expression is the wrong kind here.
    fn count_value(&self, instr: &str, operand: Option<&Expr>) -> Result<i64, GenError> {
        match operand {
            None => Ok(1),
            Some(Expr::AddressOf(_)) => Err(GenError::operand(
                instr,
                "count must be an integer, not an address",
            )),
            Some(expr) => Ok(expr.evaluate(&self.symbols)?),
        }
    }

    fn repeat(&mut self, marker: char, times: i64) {
        for _ in 0..times {
            self.out.push(marker);
        }
    }

    fn instr(
        &mut self,
        name: &str,
        dst: Option<&Expr>,
        src: Option<&Expr>,
    ) -> Result<(), GenError> {
        match name {
            "inc" => {
                self.point_at("inc", dst)?;
                let times = self.count_value("inc", src)?;
                self.repeat('+', times);
            }
            "dec" => {
                self.point_at("dec", dst)?;
                let times = self.count_value("dec", src)?;
                self.repeat('-', times);
            }
            "while" => {
                self.point_at("while", dst)?;
                self.loop_start();
            }
            "endwhile" => {
                if dst.is_some() {
                    // Explicit close address: the pushed snapshot is
                    // discarded unchecked, and the caller is responsible
                    // for naming the cell the loop was opened on.
                    self.pop_loop_start("endwhile")?;
                    self.point_at("endwhile", dst)?;
                    self.out.push(']');
                } else {
                    self.loop_end("endwhile")?;
                }
            }
            "call" => {
                self.point_at("call", dst)?;
                self.out.push('.');
            }
            "read" => {
                self.point_at("read", dst)?;
                self.out.push(',');
            }
            "clear" => {
                self.point_at("clear", dst)?;
                self.out.push_str("[-]");
            }
            "if" => {
                let cond = self.addr_value("if", dst)?;
                let junk = self.addr_value("if", src)?;

                // Mark "no branch taken yet" in the junk cell.
                self.point(junk);
                self.out.push_str("[-]+");

                // Open the true-branch loop on the condition cell. Both
                // addresses are saved for else/endif.
                self.point(cond);
                self.push_loop_start(cond);
                self.push_loop_start(junk);
                self.out.push('[');

                // The body that follows runs at most once: the condition
                // is cleared immediately, and clearing the junk cell
                // records that the true branch ran.
                self.out.push_str("[-]");
                self.point(junk);
                self.out.push_str("[-]");
            }
            "else" => {
                let junk = self.pop_loop_start("else")?;
                let cond = self.pop_loop_start("else")?;

                // Close the true-branch loop from the condition cell.
                self.point(cond);
                self.out.push(']');

                // The junk cell still holds 1 only if the true branch
                // never ran; key the false-branch loop on it.
                self.point(junk);
                self.out.push('[');

                self.push_loop_start(cond);
                self.push_loop_start(junk);
            }
            "endif" => {
                let _junk = self.pop_loop_start("endif")?;
                let cond = self.pop_loop_start("endif")?;

                // The condition cell is the one position from which the
                // close matches whichever of the two loops is open.
                self.point(cond);
                self.out.push(']');
            }
            "const" => {
                let value = match (dst, src) {
                    (Some(value), None) => value.clone(),
                    _ => return Err(GenError::operand("const", "takes exactly one value")),
                };
                let name = self.pending_label.take().ok_or(GenError::MissingLabel)?;
                if !self.symbols.define(&name, value) {
                    return Err(GenError::duplicate_const(&name));
                }
            }
            _ => return Err(GenError::unknown_instruction(name)),
        }

        self.pending_label = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn emit(source: &str) -> Result<String, GenError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize();
        let program = Parser::new(tokens).parse().unwrap();
        Generator::new().generate(&program)
    }

    fn emit_ok(source: &str) -> String {
        emit(source).unwrap()
    }

    fn balanced(code: &str) -> bool {
        code.matches('[').count() == code.matches(']').count()
    }

    #[test]
    fn test_inc_movement_then_markers() {
        assert_eq!(emit_ok("inc [3], 2"), ">>>++");
    }

    #[test]
    fn test_dec_default_count() {
        assert_eq!(emit_ok("dec [1]"), ">-");
    }

    #[test]
    fn test_movement_is_minimized() {
        // no movement when the cursor is already on the cell, and a single
        // direction run otherwise
        assert_eq!(emit_ok("inc [2]\ninc [2]\ninc [1]"), ">>++<+");
    }

    #[test]
    fn test_while_loop() {
        let source = "inc [0], 2
while [0]
inc [1], 3
dec [0]
endwhile";
        assert_eq!(emit_ok(source), "++[>+++<-]");
    }

    #[test]
    fn test_endwhile_explicit_address() {
        // the close lands at the named cell without returning to the start
        let source = "while [0]
inc [1]
endwhile [1]";
        assert_eq!(emit_ok(source), "[>+]");
    }

    #[test]
    fn test_call_read_clear() {
        assert_eq!(emit_ok("call [1]"), ">.");
        assert_eq!(emit_ok("read [0]"), ",");
        assert_eq!(emit_ok("clear [2]"), ">>[-]");
    }

    #[test]
    fn test_if_else_endif_protocol() {
        let source = "if [0], [1]
inc [2], 5
else
inc [3], 7
endif";
        let code = emit_ok(source);
        assert_eq!(code, ">[-]+<[[-]>[-]>+++++<<]>[>>+++++++<<<]");
        assert!(balanced(&code));
    }

    #[test]
    fn test_if_without_else() {
        let source = "if [0], [1]
inc [2]
endif";
        let code = emit_ok(source);
        assert_eq!(code, ">[-]+<[[-]>[-]>+<<]");
        assert!(balanced(&code));
    }

    #[test]
    fn test_nested_while_balances() {
        let source = "while [0]
while [1]
dec [1]
endwhile
dec [0]
endwhile";
        let code = emit_ok(source);
        assert_eq!(code, "[>[-]<-]");
        assert!(balanced(&code));
    }

    #[test]
    fn test_const_binding() {
        let source = "five:
const 5
inc [0], five";
        assert_eq!(emit_ok(source), "+++++");
    }

    #[test]
    fn test_const_as_address() {
        let source = "spot:
const 3
inc [spot]";
        assert_eq!(emit_ok(source), ">>>+");
    }

    #[test]
    fn test_const_chain() {
        let source = "a:
const 5
b:
const a
inc [0], b";
        assert_eq!(emit_ok(source), "+++++");
    }

    #[test]
    fn test_literal_where_address_required() {
        assert!(matches!(
            emit("inc 5"),
            Err(GenError::OperandMismatch { .. })
        ));
    }

    #[test]
    fn test_address_where_count_required() {
        assert!(matches!(
            emit("inc [0], [1]"),
            Err(GenError::OperandMismatch { .. })
        ));
    }

    #[test]
    fn test_undefined_identifier() {
        assert_eq!(
            emit("inc [missing]"),
            Err(GenError::NotDefined {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_loop_underflow() {
        assert!(matches!(emit("endwhile"), Err(GenError::LoopUnderflow { .. })));
        assert!(matches!(emit("else"), Err(GenError::LoopUnderflow { .. })));
        assert!(matches!(emit("endif"), Err(GenError::LoopUnderflow { .. })));
    }

    #[test]
    fn test_unclosed_loop_rejected() {
        assert_eq!(emit("while [0]"), Err(GenError::UnclosedLoop { depth: 1 }));
    }

    #[test]
    fn test_const_without_label() {
        assert_eq!(emit("const 5"), Err(GenError::MissingLabel));
    }

    #[test]
    fn test_label_applies_to_next_instruction_only() {
        // the label is consumed (cleared) by the intervening instruction
        let source = "lab:
inc [0]
const 5";
        assert_eq!(emit(source), Err(GenError::MissingLabel));
    }

    #[test]
    fn test_duplicate_const() {
        let source = "x:
const 1
x:
const 2";
        assert_eq!(
            emit(source),
            Err(GenError::DuplicateConst {
                name: "x".to_string()
            })
        );
    }

    #[test]
    fn test_const_operand_arity() {
        let source = "x:
const 1, 2";
        assert!(matches!(emit(source), Err(GenError::OperandMismatch { .. })));
    }

    #[test]
    fn test_unknown_instruction() {
        assert_eq!(
            emit("frob [0]"),
            Err(GenError::UnknownInstruction {
                name: "frob".to_string()
            })
        );
    }

    #[test]
    fn test_const_bound_to_address_fails_at_use() {
        let source = "a:
const [5]
inc [0], a";
        assert_eq!(emit(source), Err(GenError::AddressAsValue));
    }
}
