use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::runtime::op::{
    OP_NOP, OP_R8A_LOAD, OP_R8A_STORE, OP_R32B_LOAD, OP_R32B_STORE, OP_REL_JMP_BWD,
    OP_REL_JMP_FWD, Op,
};
use crate::runtime::registers::{RegisterFile, Width};
use crate::runtime::runtime_error::{LoadError, RuntimeError};

/// Cell arithmetic wraps modulo 255, not 256. A negative remainder
/// truncates to a byte, so `0 - 1` lands on 255 while `254 + 1` lands on 0.
const CELL_MODULUS: i64 = 255;

/// Zero padding appended after the loaded code; the first pad byte is the
/// halt sentinel for straight-line programs.
const CODE_PAD: usize = 10;

/// The eight bytes that survive program loading.
const CONTROL_BYTES: &[u8; 8] = b"><+-[].,";

#[derive(Debug, Clone)]
pub struct VMConfig {
    /// Number of data cells on the tape.
    pub tape_size: usize,
    /// Minimum duration of one fused step; `None` runs unpaced.
    pub clock_rate: Option<Duration>,
}

impl Default for VMConfig {
    fn default() -> Self {
        VMConfig {
            tape_size: 30_000,
            clock_rate: None,
        }
    }
}

/// Tape-machine interpreter.
///
/// Memory is one contiguous byte buffer: the code segment `[0, data_start)`
/// holds the filtered program text followed by a zero pad, and the data
/// segment (the tape) fills the rest. `pc` indexes the code segment, `ptr`
/// the tape; the tape pointer wraps within the data segment in both
/// directions.
///
/// The invoke instruction reads the current cell as an opcode. Register and
/// relative-jump opcodes are serviced in place; everything else is sent to
/// the attached op channel, and a full channel suspends execution until the
/// consumer drains a slot.
pub struct VM {
    memory: Vec<u8>,
    data_start: usize,
    pc: usize,
    ptr: usize,
    regs: RegisterFile,
    config: VMConfig,
    ops: Option<SyncSender<Op>>,
}

/// Counts loop markers across the raw input. A program that balances in
/// count but not in nesting structure is not caught here.
fn validate_brackets(code: &[u8]) -> Result<(), LoadError> {
    let mut depth: i64 = 0;
    for &b in code {
        match b {
            b'[' => depth += 1,
            b']' => depth -= 1,
            _ => {}
        }
    }
    if depth != 0 {
        return Err(LoadError::BracketImbalance);
    }
    Ok(())
}

fn register_slot(reg: u8) -> (Width, usize) {
    let width = match reg / 2 {
        0 => Width::W8,
        1 => Width::W16,
        _ => Width::W32,
    };
    (width, usize::from(reg % 2))
}

impl VM {
    pub fn new(code: &[u8]) -> Result<Self, LoadError> {
        Self::with_config(code, VMConfig::default())
    }

    /// Loads `code` into a fresh machine.
    ///
    /// The raw input is checked for loop-marker balance, then filtered to
    /// the eight control bytes; anything else (commentary, whitespace) is
    /// dropped. The filtered text lands at the start of memory and the
    /// tape pointer starts on the first data cell.
    pub fn with_config(code: &[u8], config: VMConfig) -> Result<Self, LoadError> {
        if code.is_empty() {
            return Err(LoadError::NoMemory);
        }
        validate_brackets(code)?;

        let filtered: Vec<u8> = code
            .iter()
            .copied()
            .filter(|b| CONTROL_BYTES.contains(b))
            .collect();

        let data_start = filtered.len() + CODE_PAD;
        let mut memory = vec![0u8; data_start + config.tape_size];
        memory[..filtered.len()].copy_from_slice(&filtered);

        Ok(VM {
            memory,
            data_start,
            pc: 0,
            ptr: data_start,
            regs: RegisterFile::default(),
            config,
            ops: None,
        })
    }

    /// Attaches the consumer side of the op stream. Forwarded opcodes
    /// block on a full channel until the consumer drains a slot.
    pub fn with_ops(mut self, ops: SyncSender<Op>) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn code_section(&self) -> &[u8] {
        &self.memory[..self.data_start]
    }

    pub fn data_section(&self) -> &[u8] {
        &self.memory[self.data_start..]
    }

    /// Executes until the program counter reaches a zero byte, which is
    /// normal termination.
    ///
    /// Runs of identical movement or arithmetic bytes are fused into a
    /// single update. When a clock rate is configured, each fused step is
    /// padded with sleep up to the configured duration.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while let Some(&instr) = self.memory.get(self.pc) {
            if instr == 0 {
                break;
            }
            let started = self.config.clock_rate.map(|_| Instant::now());

            match instr {
                b'>' => {
                    let n = self.run_length(b'>');
                    self.pc += n - 1;
                    self.step(n as i64);
                }
                b'<' => {
                    let n = self.run_length(b'<');
                    self.pc += n - 1;
                    self.step(-(n as i64));
                }
                b'+' => {
                    let n = self.run_length(b'+');
                    self.pc += n - 1;
                    self.add(n as i64);
                }
                b'-' => {
                    let n = self.run_length(b'-');
                    self.pc += n - 1;
                    self.add(-(n as i64));
                }
                b'[' => {
                    if self.memory.get(self.pc..self.pc + 3) == Some(b"[-]".as_slice()) {
                        // Clear idiom: zero the cell in one step and skip
                        // past the loop.
                        self.memory[self.ptr] = 0;
                        self.pc += 2;
                    } else if self.memory[self.ptr] == 0 {
                        self.jump_to_close();
                    }
                }
                b']' => {
                    if self.memory[self.ptr] != 0 {
                        self.jump_to_open();
                    }
                }
                b'.' => {
                    let op = self.capture_op();
                    self.dispatch(op)?;
                }
                // Input is not implemented.
                b',' => {}
                _ => {}
            }

            self.pc += 1;

            if let (Some(rate), Some(started)) = (self.config.clock_rate, started) {
                let elapsed = started.elapsed();
                if elapsed < rate {
                    trace!("step took {:?}, sleeping {:?}", elapsed, rate - elapsed);
                    thread::sleep(rate - elapsed);
                }
            }
        }

        Ok(())
    }

    fn run_length(&self, b: u8) -> usize {
        let mut n = 0;
        while self.memory.get(self.pc + n) == Some(&b) {
            n += 1;
        }
        n
    }

    /// Moves the tape pointer, wrapping within the data segment.
    fn step(&mut self, by: i64) {
        let tape = (self.memory.len() - self.data_start) as i64;
        let offset = (self.ptr - self.data_start) as i64;
        self.ptr = self.data_start + (offset + by).rem_euclid(tape) as usize;
    }

    /// Fused cell arithmetic under the wrapping modulus.
    fn add(&mut self, amount: i64) {
        let cell = i64::from(self.memory[self.ptr]);
        self.memory[self.ptr] = ((cell + amount) % CELL_MODULUS) as u8;
    }

    /// Scans forward to the matching loop close, tracking nesting depth.
    /// Stops at the terminator if the nesting never balances.
    fn jump_to_close(&mut self) {
        let mut depth: i64 = 0;
        while let Some(&instr) = self.memory.get(self.pc) {
            match instr {
                0 => return,
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                _ => {}
            }
            self.pc += 1;
        }
    }

    /// Scans backward to the matching loop open, clamping at the start of
    /// memory.
    fn jump_to_open(&mut self) {
        let mut depth: i64 = 0;
        while let Some(&instr) = self.memory.get(self.pc) {
            match instr {
                0 => return,
                b']' => depth += 1,
                b'[' => {
                    depth -= 1;
                    if depth <= 0 {
                        return;
                    }
                }
                _ => {}
            }
            if self.pc == 0 {
                return;
            }
            self.pc -= 1;
        }
    }

    /// Reads the current cell as an opcode and captures up to eight
    /// preceding bytes, right-aligned so argument index 0 is the byte at
    /// `ptr - 1` even when the window is short.
    fn capture_op(&self) -> Op {
        let code = self.memory[self.ptr];
        let mut args = [0u8; 8];
        let start = self.ptr.saturating_sub(args.len());
        let window = &self.memory[start..self.ptr];
        args[8 - window.len()..].copy_from_slice(window);
        Op::new(code, args)
    }

    fn dispatch(&mut self, op: Op) -> Result<(), RuntimeError> {
        match op.code {
            OP_NOP => {}
            OP_REL_JMP_FWD => {
                // Clamped to the code segment; the pad there is zero, so
                // an overshooting jump halts.
                self.pc = (self.pc + op.byte(0) as usize).min(self.data_start - 1);
            }
            OP_REL_JMP_BWD => {
                self.pc = self.pc.saturating_sub(op.byte(0) as usize);
            }
            OP_R8A_STORE..=OP_R32B_STORE => {
                let (width, index) = register_slot(op.code - OP_R8A_STORE);
                let value = match width {
                    Width::W8 => u32::from(op.byte(0)),
                    Width::W16 => u32::from(op.word(0)),
                    Width::W32 => op.dword(0),
                };
                self.regs.store(width, index, value);
            }
            OP_R8A_LOAD..=OP_R32B_LOAD => {
                let (width, index) = register_slot(op.code - OP_R8A_LOAD);
                let value = self.regs.load(width, index);
                let end = self.ptr - 1;
                match width {
                    Width::W8 => self.memory[end] = value as u8,
                    Width::W16 => self.set_word(end, value as u16),
                    Width::W32 => self.set_dword(end, value),
                }
            }
            _ => {
                if let Some(ops) = &self.ops {
                    ops.send(op)
                        .map_err(|_| RuntimeError::new("op consumer disconnected"))?;
                } else {
                    debug!("op {} dropped: no consumer attached", op.code);
                }
            }
        }
        Ok(())
    }

    /// Writes a big-endian word ending at `idx`.
    fn set_word(&mut self, idx: usize, value: u16) {
        self.memory[idx - 1] = (value >> 8) as u8;
        self.memory[idx] = value as u8;
    }

    fn set_dword(&mut self, idx: usize, value: u32) {
        self.memory[idx - 3] = (value >> 24) as u8;
        self.memory[idx - 2] = (value >> 16) as u8;
        self.memory[idx - 1] = (value >> 8) as u8;
        self.memory[idx] = value as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    use crate::codegen::Generator;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::runtime::op::{OP_CLEAR_CANVAS, OP_SET_COLOR};

    fn run(code: &[u8]) -> VM {
        let mut vm = VM::new(code).unwrap();
        vm.run().unwrap();
        vm
    }

    fn data_prefix(vm: &VM, n: usize) -> &[u8] {
        &vm.data_section()[..n]
    }

    fn compile(source: &str) -> String {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize();
        let program = Parser::new(tokens).parse().unwrap();
        Generator::new().generate(&program).unwrap()
    }

    #[test]
    fn test_increment_run() {
        let vm = run(b"+++++");
        assert_eq!(data_prefix(&vm, 1), &[5]);
    }

    #[test]
    fn test_wrapping_arithmetic() {
        // decrement from zero wraps under the modulus-255 arithmetic
        let vm = run(b">>>>+<-");
        assert_eq!(data_prefix(&vm, 5), &[0, 0, 0, 255, 1]);
    }

    #[test]
    fn test_increment_wraps_at_modulus() {
        let mut code = vec![b'+'; 254];
        code.push(b'+');
        let vm = run(&code);
        assert_eq!(data_prefix(&vm, 1), &[0]);
    }

    #[test]
    fn test_transfer_loop() {
        let vm = run(b"+++++ +++++[>+++++ +++++<-] 100");
        assert_eq!(data_prefix(&vm, 2), &[0, 100]);
    }

    #[test]
    fn test_depth_tracked_loops() {
        let vm = run(b"+++[[>]+++++[<]>-]");
        assert_eq!(data_prefix(&vm, 4), &[0, 5, 5, 5]);
    }

    #[test]
    fn test_commentary_bytes_filtered() {
        let vm = run(b"add 5 +++++");
        assert_eq!(data_prefix(&vm, 1), &[5]);
    }

    #[test]
    fn test_input_is_noop() {
        let vm = run(b",,+");
        assert_eq!(data_prefix(&vm, 1), &[1]);
    }

    #[test]
    fn test_clear_idiom() {
        let vm = run(b"+++++[-]");
        assert_eq!(data_prefix(&vm, 1), &[0]);

        // observably identical to executing the loop literally
        let vm = run(b"+++++[-]++");
        assert_eq!(data_prefix(&vm, 1), &[2]);
    }

    #[test]
    fn test_loop_skipped_when_cell_zero() {
        let vm = run(b"[>+++<]+");
        assert_eq!(data_prefix(&vm, 2), &[1, 0]);
    }

    #[test]
    fn test_tape_wraps_left() {
        let config = VMConfig {
            tape_size: 5,
            clock_rate: None,
        };
        let mut vm = VM::with_config(b"<+", config).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.data_section(), &[0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_tape_wraps_right() {
        let config = VMConfig {
            tape_size: 5,
            clock_rate: None,
        };
        let mut vm = VM::with_config(b">>>>>+", config).unwrap();
        vm.run().unwrap();
        assert_eq!(vm.data_section(), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_relative_jump_forward() {
        // cell 0 holds the offset; the jump skips the two increments
        // immediately after the invoke
        let vm = run(b"++>+. ++ +");
        assert_eq!(data_prefix(&vm, 2), &[2, 2]);
    }

    #[test]
    fn test_relative_jump_backward() {
        // opcode 2 at cell 1 jumps back over one increment, which then
        // re-executes; the second invoke reads opcode 3 and is dropped
        // (no consumer attached)
        let vm = run(b"++>++.");
        assert_eq!(data_prefix(&vm, 2), &[2, 3]);
    }

    #[test]
    fn test_register_16_round_trip() {
        let vm = run(b"+>++++>++++++++++ ++++++++++ ++.[>>+<<-]>>++++++.");
        assert_eq!(data_prefix(&vm, 5), &[1, 4, 1, 4, 28]);
    }

    #[test]
    fn test_register_8_round_trip_forwards_nothing() {
        let (tx, rx) = sync_channel(8);
        // store r8a=5 (opcode 20), zero the source cell, then load it back
        // (opcode 26)
        let mut vm = VM::new(b"+++++>++++++++++ ++++++++++.<[-]>++++++.")
            .unwrap()
            .with_ops(tx);
        vm.run().unwrap();
        assert_eq!(data_prefix(&vm, 2), &[5, 26]);

        drop(vm);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_forwarded_op_carries_preceding_bytes() {
        let (tx, rx) = sync_channel(8);
        // cells 0..4 = {1, 2, 3, 4}, opcode 41 in cell 4
        let mut code = b"+>++>+++>++++>".to_vec();
        code.extend(std::iter::repeat_n(b'+', 41));
        code.push(b'.');

        let mut vm = VM::new(&code).unwrap().with_ops(tx);
        vm.run().unwrap();
        drop(vm);

        let op = rx.recv().unwrap();
        assert_eq!(op.code, OP_SET_COLOR);
        assert_eq!(op.byte(0), 4); // alpha
        assert_eq!(op.byte(1), 3); // blue
        assert_eq!(op.byte(2), 2); // green
        assert_eq!(op.byte(3), 1); // red
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_backpressure_blocks_until_drained() {
        // 40 increments, then two invokes forwarding opcode 40 twice
        let mut code = vec![b'+'; 40];
        code.push(b'.');
        code.push(b'.');

        let (tx, rx) = sync_channel(1);
        let mut vm = VM::new(&code).unwrap().with_ops(tx);
        let worker = thread::spawn(move || {
            vm.run().unwrap();
        });

        // the first op fills the only slot; the second send must block
        thread::sleep(Duration::from_millis(50));
        assert!(!worker.is_finished());

        assert_eq!(rx.recv().unwrap().code, OP_CLEAR_CANVAS);
        assert_eq!(rx.recv().unwrap().code, OP_CLEAR_CANVAS);
        worker.join().unwrap();
    }

    #[test]
    fn test_pacing_pads_step_duration() {
        let config = VMConfig {
            tape_size: 30,
            clock_rate: Some(Duration::from_millis(2)),
        };
        // five fused steps
        let mut vm = VM::with_config(b"+>+>+", config).unwrap();
        let started = Instant::now();
        vm.run().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_empty_program_rejected() {
        assert!(matches!(VM::new(b""), Err(LoadError::NoMemory)));
    }

    #[test]
    fn test_bracket_imbalance_rejected() {
        assert!(matches!(VM::new(b"[[]"), Err(LoadError::BracketImbalance)));
        // balance is counted on the raw input, commentary included
        assert!(matches!(
            VM::new(b"note] +++"),
            Err(LoadError::BracketImbalance)
        ));
    }

    #[test]
    fn test_code_section_zero_padded() {
        let vm = VM::new(b"+++").unwrap();
        assert_eq!(&vm.code_section()[..3], b"+++");
        assert!(vm.code_section()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_compiled_while_loop() {
        let source = "inc [1], 3
while [1]
inc [0], 2
dec [1]
endwhile";
        let vm = run(compile(source).as_bytes());
        assert_eq!(data_prefix(&vm, 2), &[6, 0]);
    }

    #[test]
    fn test_compiled_if_true_branch() {
        let source = "inc [0]
if [0], [1]
inc [2], 5
else
inc [3], 7
endif";
        let vm = run(compile(source).as_bytes());
        assert_eq!(data_prefix(&vm, 4), &[0, 0, 5, 0]);
    }

    #[test]
    fn test_compiled_if_false_branch() {
        let source = "if [0], [1]
inc [2], 5
else
inc [3], 7
endif";
        let vm = run(compile(source).as_bytes());
        // the junk cell is clobbered on this arm
        assert_eq!(data_prefix(&vm, 4), &[0, 1, 0, 7]);
    }

    #[test]
    fn test_compiled_call_forwards_op() {
        let (tx, rx) = sync_channel(8);
        let source = "inc [0], 40
call [0]";
        let code = compile(source);
        let mut vm = VM::new(code.as_bytes()).unwrap().with_ops(tx);
        vm.run().unwrap();
        drop(vm);

        assert_eq!(rx.recv().unwrap().code, OP_CLEAR_CANVAS);
    }
}
