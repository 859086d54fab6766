//! Call frame supporting structures

use std::fmt;

const STATUS_SCRIPT: u8 = 0x01;
const STATUS_FRESH: u8 = 0x02;
const STATUS_TAIL: u8 = 0x04;

/// Flag bits describing one active invocation, consulted during return.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallStatus(u8);

impl CallStatus {
    /// Status of a script frame.
    pub const fn script() -> Self {
        Self(STATUS_SCRIPT)
    }

    /// Status of a native frame.
    pub const fn native() -> Self {
        Self(0)
    }

    /// Mark the frame as a fresh entry into the interpreter loop.
    pub const fn fresh(self) -> Self {
        Self(self.0 | STATUS_FRESH)
    }

    /// Mark the frame as reused by a tail call.
    pub const fn tail(self) -> Self {
        Self(self.0 | STATUS_TAIL)
    }

    /// Flag whether the frame executes bytecode.
    pub const fn is_script(self) -> bool {
        self.0 & STATUS_SCRIPT != 0
    }

    /// Flag whether returning from the frame leaves the interpreter loop.
    pub const fn is_fresh(self) -> bool {
        self.0 & STATUS_FRESH != 0
    }

    /// Flag whether the frame was reused by a tail call.
    pub const fn is_tail(self) -> bool {
        self.0 & STATUS_TAIL != 0
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.is_script() { 's' } else { 'n' },
            if self.is_fresh() { 'f' } else { '-' },
            if self.is_tail() { 't' } else { '-' },
        )
    }
}

/// Record of one active invocation on the frame stack.
///
/// `base` and `pc` are meaningful for script frames only; native frames keep
/// them at the function slot and zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFrame {
    func: usize,
    base: usize,
    pc: usize,
    nresults: i32,
    status: CallStatus,
}

impl CallFrame {
    /// Create a new call frame.
    pub const fn new(func: usize, base: usize, nresults: i32, status: CallStatus) -> Self {
        Self {
            func,
            base,
            pc: 0,
            nresults,
            status,
        }
    }

    /// Register stack slot holding the callable.
    pub const fn func(&self) -> usize {
        self.func
    }

    /// Register stack index where the frame's registers begin.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Next instruction index within the prototype's code.
    pub const fn pc(&self) -> usize {
        self.pc
    }

    /// Result count the caller expects, or [`MULTIRET`].
    ///
    /// [`MULTIRET`]: crate::consts::MULTIRET
    pub const fn nresults(&self) -> i32 {
        self.nresults
    }

    /// Status flags of the invocation.
    pub const fn status(&self) -> CallStatus {
        self.status
    }

    /// Advance the program counter past the instruction being dispatched.
    pub fn bump_pc(&mut self) -> usize {
        let at = self.pc;
        self.pc += 1;

        at
    }

    /// Displace the program counter by a signed jump offset.
    pub fn displace_pc(&mut self, offset: i32) {
        self.pc = self.pc.wrapping_add_signed(offset as isize);
    }

    /// Rebind the frame to a tail-called function occupying the same slot.
    pub fn reuse_for_tail_call(&mut self, base: usize) {
        self.base = base;
        self.pc = 0;
        self.status = self.status.tail();
    }
}
