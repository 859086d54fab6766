//! Runtime and load error implementation

use crate::value::Type;

use thiserror::Error;

/// Chunk decoding error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LoadError {
    /// The stream doesn't start with the binary chunk signature.
    #[error("bad chunk signature")]
    BadSignature,
    /// The chunk was produced for an unsupported bytecode version.
    #[error("unsupported bytecode version {0:#04x}")]
    BadVersion(u8),
    /// The chunk format tag isn't the reference format.
    #[error("unsupported chunk format {0}")]
    BadFormat(u8),
    /// The stream is structurally invalid.
    #[error("corrupt chunk: {0}")]
    Corrupt(&'static str),
    /// Neither byte order reproduces the header sentinels.
    #[error("chunk endianness doesn't match any supported byte order")]
    BadEndianness,
    /// The stream ended before a read completed.
    #[error("truncated chunk")]
    Truncated,
    /// A declared numeric width can't be represented by the host.
    #[error("unsupported numeric width {0}")]
    UnsupportedWidth(u8),
}

/// Runtime fault variants raised during instruction dispatch or by the host
/// API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fault {
    /// A call targeted a value that is neither a script nor a native closure.
    #[error("attempt to call a {0} value")]
    CallNonCallable(Type),
    /// An arithmetic operand can't be coerced to a number.
    #[error("attempt to perform arithmetic on a {0} value")]
    ArithOnNonNumber(Type),
    /// An ordering comparison received incomparable operand types.
    #[error("attempt to compare {0} with {1}")]
    OrderOnIncomparable(Type, Type),
    /// A concatenation operand is neither a string nor a number.
    #[error("attempt to concatenate a {0} value")]
    ConcatOnNonStringable(Type),
    /// A table access targeted a non-table receiver.
    #[error("attempt to index a {0} value")]
    IndexNonTable(Type),
    /// A length query targeted a value without a length.
    #[error("attempt to get length of a {0} value")]
    LengthOnUnsupported(Type),
    /// Integer division or modulo by zero.
    #[error("attempt to perform integer division by zero")]
    DivisionByZero,
    /// Call depth or register stack exceeded the configured bound.
    #[error("stack overflow")]
    StackOverflow,
    /// Bytecode referenced a nonexistent upvalue.
    #[error("upvalue index out of bounds")]
    UpvalueBounds,
    /// Bytecode referenced a nonexistent constant.
    #[error("constant index out of bounds")]
    ConstantBounds,
    /// Bytecode referenced a nonexistent nested prototype.
    #[error("prototype index out of bounds")]
    PrototypeBounds,
    /// Bytecode addressed a register outside the frame's window.
    #[error("register index out of bounds")]
    RegisterBounds,
    /// The program counter ran past the end of the instruction sequence.
    #[error("instruction index out of bounds")]
    CodeBounds,
    /// An instruction word carries an opcode outside the instruction set.
    #[error("invalid opcode {0}")]
    InvalidOpcode(u8),
}

/// Top-level error surfaced to the embedding host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The chunk couldn't be decoded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Execution raised a fault and unwound to the host.
    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),
}

impl VmError {
    /// Return the runtime fault behind this error, if applicable.
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            Self::Load(_) => None,
        }
    }

    /// Flag whether this error was raised while decoding a chunk.
    pub const fn is_load(&self) -> bool {
        matches!(self, Self::Load(_))
    }
}
