//! Embeddable interpreter for version `0x53` binary chunks.
//!
//! Hosts load a precompiled chunk, register native callbacks, and invoke
//! scripted functions through the [`interpreter::Interpreter`] API.

pub mod arch;
pub mod bytecode;
pub mod call;
pub mod consts;
pub mod error;
pub mod interpreter;
pub mod loader;
pub mod object;
pub mod reader;
pub mod state;
pub mod table;
pub mod value;

#[cfg(feature = "test-helpers")]
pub mod util;

pub mod prelude {
    pub use crate::arch::{ChunkArch, Endianness};
    pub use crate::bytecode::{
        Chunk, Constant, Instruction, Opcode, ProtoId, Prototype, UpvalueDesc,
    };
    pub use crate::call::{CallFrame, CallStatus};
    pub use crate::consts::MULTIRET;
    pub use crate::error::{Fault, LoadError, VmError};
    pub use crate::interpreter::Interpreter;
    pub use crate::loader::load;
    pub use crate::object::{HeapObject, NativeFn, ObjectRef, Pool, ScriptClosure, Upvalue};
    pub use crate::state::ExecuteState;
    pub use crate::table::Table;
    pub use crate::value::{LuaStr, Numeric, Type, Value};
}
