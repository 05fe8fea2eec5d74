use serde::{Deserialize, Serialize};

// Opcode space: 0-19 common, 20-39 data and registers, 40+ application
// defined. Values the machine does not service internally are forwarded to
// the consumer verbatim; there is no upper bound on legal opcode values.

pub const OP_NOP: u8 = 0;
/// 1 arg byte: pc += offset.
pub const OP_REL_JMP_FWD: u8 = 1;
/// 1 arg byte: pc -= offset.
pub const OP_REL_JMP_BWD: u8 = 2;

// Register stores, argument widths 1/1/2/2/4/4.
pub const OP_R8A_STORE: u8 = 20;
pub const OP_R8B_STORE: u8 = 21;
pub const OP_R16A_STORE: u8 = 22;
pub const OP_R16B_STORE: u8 = 23;
pub const OP_R32A_STORE: u8 = 24;
pub const OP_R32B_STORE: u8 = 25;

// Register loads, same order; written into the tape before the pointer.
pub const OP_R8A_LOAD: u8 = 26;
pub const OP_R8B_LOAD: u8 = 27;
pub const OP_R16A_LOAD: u8 = 28;
pub const OP_R16B_LOAD: u8 = 29;
pub const OP_R32A_LOAD: u8 = 30;
pub const OP_R32B_LOAD: u8 = 31;

// Drawing opcodes, serviced by the external consumer.
pub const OP_CLEAR_CANVAS: u8 = 40;
/// 4 arg bytes: alpha, blue, green, red as index 0..3.
pub const OP_SET_COLOR: u8 = 41;
/// 2 arg bytes: y, x.
pub const OP_SET_PIXEL: u8 = 42;
/// 4 arg bytes: y2, x2, y1, x1.
pub const OP_DRAW_LINE: u8 = 43;

/// An invoked operation: the opcode byte read from the current cell plus
/// the eight tape bytes that preceded the pointer at invocation time.
///
/// Argument index `i` means "the i-th byte before the tape pointer", so
/// index 0 is always the most recently written byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub code: u8,
    pub args: [u8; 8],
}

impl Op {
    pub fn new(code: u8, args: [u8; 8]) -> Self {
        Op { code, args }
    }

    /// Argument byte `i` (index 0 = the byte at `ptr - 1`).
    pub fn byte(&self, i: usize) -> u8 {
        self.args[self.args.len() - 1 - i]
    }

    /// 16-bit value from argument bytes `i + 1` (high) and `i` (low).
    pub fn word(&self, i: usize) -> u16 {
        u16::from(self.byte(i + 1)) << 8 | u16::from(self.byte(i))
    }

    /// 32-bit value from argument bytes `i + 3` (high) down to `i` (low).
    pub fn dword(&self, i: usize) -> u32 {
        u32::from(self.byte(i + 3)) << 24
            | u32::from(self.byte(i + 2)) << 16
            | u32::from(self.byte(i + 1)) << 8
            | u32::from(self.byte(i))
    }

    /// Encodes the op for transport to an out-of-process consumer.
    pub fn to_bytes(&self) -> postcard::Result<Vec<u8>> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> postcard::Result<Self> {
        postcard::from_bytes(bytes)
    }
}
