//! [`Interpreter`] implementation

use crate::bytecode::{ProtoId, Prototype};
use crate::call::CallFrame;
use crate::object::{HeapObject, ObjectRef, Pool, Upvalue};
use crate::value::Value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Weak;

mod alu;
mod constructors;
mod executors;
mod flow;
mod host;
mod internal;

/// Virtual machine instance.
///
/// Owns the register stack, the call frame stack, the object and upvalue
/// pools, the prototypes of every loaded chunk, and the distinguished
/// environment table. One instance serves one embedding; sharing across
/// threads requires external synchronisation.
#[derive(Debug)]
pub struct Interpreter {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    objects: Pool<HeapObject>,
    upvalues: Pool<Upvalue>,
    protos: Vec<Prototype>,
    closure_cache: HashMap<ProtoId, Weak<RefCell<HeapObject>>>,
    globals: ObjectRef,
}

impl Interpreter {
    /// Current register stack contents, bottom to top.
    pub fn stack(&self) -> &[Value] {
        self.stack.as_slice()
    }

    /// Number of values on the register stack.
    pub fn top(&self) -> usize {
        self.stack.len()
    }

    /// Number of active call frames.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Handle to the distinguished environment table.
    pub fn globals(&self) -> &ObjectRef {
        &self.globals
    }

    /// The heap object pool.
    pub fn objects(&self) -> &Pool<HeapObject> {
        &self.objects
    }

    /// The upvalue pool.
    pub fn upvalues(&self) -> &Pool<Upvalue> {
        &self.upvalues
    }

    /// Number of prototypes installed by loaded chunks.
    pub fn proto_count(&self) -> usize {
        self.protos.len()
    }
}
