use super::Interpreter;
use crate::bytecode::{Instruction, ProtoId};
use crate::call::CallFrame;
use crate::consts::VM_MAX_STACK;
use crate::error::Fault;
use crate::object::{HeapObject, ObjectRef, ScriptClosure, Upvalue, UpvalRef};
use crate::value::Value;

use std::rc::{Rc, Weak};

impl Interpreter {
    /// Grow the register stack to hold `top` values, never shrinking it.
    pub(crate) fn ensure_stack(&mut self, top: usize) -> Result<(), Fault> {
        if top > VM_MAX_STACK {
            return Err(Fault::StackOverflow);
        }

        if top > self.stack.len() {
            self.stack.resize(top, Value::Nil);
        }

        Ok(())
    }

    /// Move the stack top, padding with nil or truncating.
    pub(crate) fn set_top(&mut self, top: usize) -> Result<(), Fault> {
        if top > VM_MAX_STACK {
            return Err(Fault::StackOverflow);
        }

        self.stack.resize(top, Value::Nil);

        Ok(())
    }

    /// Read a register by absolute stack index.
    pub(crate) fn rget(&self, at: usize) -> Result<Value, Fault> {
        self.stack.get(at).cloned().ok_or(Fault::RegisterBounds)
    }

    /// Write a register by absolute stack index.
    pub(crate) fn rset(&mut self, at: usize, value: Value) -> Result<(), Fault> {
        *self.stack.get_mut(at).ok_or(Fault::RegisterBounds)? = value;

        Ok(())
    }

    /// Resolve a constant pool entry to a value.
    pub(crate) fn constant(&self, proto: ProtoId, index: usize) -> Result<Value, Fault> {
        self.protos
            .get(proto)
            .and_then(|p| p.constants.get(index))
            .map(|constant| constant.value())
            .ok_or(Fault::ConstantBounds)
    }

    /// Resolve a register-or-constant operand.
    pub(crate) fn rk(&self, proto: ProtoId, base: usize, operand: u32) -> Result<Value, Fault> {
        if Instruction::is_constant(operand) {
            self.constant(proto, Instruction::rk_index(operand))
        } else {
            self.rget(base + Instruction::rk_index(operand))
        }
    }

    /// The innermost call frame.
    pub(crate) fn current_frame(&self) -> Result<&CallFrame, Fault> {
        self.frames.last().ok_or(Fault::CodeBounds)
    }

    /// The innermost call frame, mutably.
    pub(crate) fn current_frame_mut(&mut self) -> Result<&mut CallFrame, Fault> {
        self.frames.last_mut().ok_or(Fault::CodeBounds)
    }

    /// Object handle stored at a stack slot, if any.
    pub(crate) fn object_at(&self, at: usize) -> Result<Option<ObjectRef>, Fault> {
        match self.stack.get(at).ok_or(Fault::RegisterBounds)? {
            Value::Object(handle) => Ok(Some(handle.clone())),
            _ => Ok(None),
        }
    }

    /// Prototype and base of the innermost frame, which must be a script
    /// frame holding a script closure.
    pub(crate) fn script_context(&self) -> Result<(ProtoId, usize), Fault> {
        let frame = self.current_frame()?;
        let base = frame.base();

        let handle = self
            .object_at(frame.func())?
            .ok_or_else(|| Fault::CallNonCallable(self.stack[frame.func()].tag()))?;

        let borrowed = handle.borrow();
        match &*borrowed {
            HeapObject::Closure(closure) => Ok((closure.proto, base)),
            other => Err(Fault::CallNonCallable(match other {
                HeapObject::Table(_) => crate::value::Type::Table,
                _ => crate::value::Type::Function,
            })),
        }
    }

    /// Upvalue handle of the executing closure.
    pub(crate) fn current_upvalue(&self, index: usize) -> Result<UpvalRef, Fault> {
        let frame = self.current_frame()?;
        let handle = self
            .object_at(frame.func())?
            .ok_or(Fault::UpvalueBounds)?;

        let borrowed = handle.borrow();
        match &*borrowed {
            HeapObject::Closure(closure) => closure
                .upvalues
                .get(index)
                .cloned()
                .ok_or(Fault::UpvalueBounds),
            _ => Err(Fault::UpvalueBounds),
        }
    }

    /// Read through an upvalue, following the stack alias while open.
    pub(crate) fn read_upvalue(&self, upvalue: &UpvalRef) -> Value {
        match &*upvalue.borrow() {
            Upvalue::Open(at) => self.stack.get(*at).cloned().unwrap_or_default(),
            Upvalue::Closed(value) => value.clone(),
        }
    }

    /// Write through an upvalue, following the stack alias while open.
    pub(crate) fn write_upvalue(&mut self, upvalue: &UpvalRef, value: Value) {
        let open_at = upvalue.borrow().stack_index();

        match open_at {
            Some(at) if at < self.stack.len() => self.stack[at] = value,
            Some(_) => {}
            None => *upvalue.borrow_mut() = Upvalue::Closed(value),
        }
    }

    /// Index a table value, faulting on non-table receivers.
    pub(crate) fn table_get(&self, receiver: &Value, key: &Value) -> Result<Value, Fault> {
        match receiver {
            Value::Object(handle) => handle
                .borrow()
                .as_table()
                .map(|table| table.get(key))
                .ok_or(Fault::IndexNonTable(receiver.tag())),
            _ => Err(Fault::IndexNonTable(receiver.tag())),
        }
    }

    /// Assign into a table value, faulting on non-table receivers.
    pub(crate) fn table_set(
        &mut self,
        receiver: &Value,
        key: Value,
        value: Value,
    ) -> Result<(), Fault> {
        match receiver {
            Value::Object(handle) => {
                let result = handle.borrow_mut().as_table_mut().map(|table| table.set(key, value));
                result.ok_or(Fault::IndexNonTable(receiver.tag()))
            }
            _ => Err(Fault::IndexNonTable(receiver.tag())),
        }
    }

    /// Find the open upvalue aliasing a stack slot, or open a fresh one.
    /// Sharing the alias is observable to script.
    pub(crate) fn find_or_open_upvalue(&mut self, at: usize) -> UpvalRef {
        for handle in self.upvalues.iter_live() {
            if handle.borrow().stack_index() == Some(at) {
                return handle;
            }
        }

        self.upvalues.alloc(Upvalue::Open(at))
    }

    /// Build a closure over `proto` for the frame at `base`, resolving
    /// upvalue descriptors against the executing closure.
    ///
    /// Construction that resolves to the exact upvalue handles of the
    /// prototype's cached closure returns that closure instead of
    /// allocating.
    pub(crate) fn make_closure(
        &mut self,
        proto: ProtoId,
        base: usize,
    ) -> Result<ObjectRef, Fault> {
        let descriptors = self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .upvalues
            .clone();

        let parent_upvalues: Option<Vec<UpvalRef>> = {
            let frame = self.current_frame()?;

            self.object_at(frame.func())?.and_then(|handle| {
                match &*handle.borrow() {
                    HeapObject::Closure(closure) => Some(closure.upvalues.clone()),
                    _ => None,
                }
            })
        };

        let mut upvalues = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            let resolved = if descriptor.in_stack {
                self.find_or_open_upvalue(base + descriptor.index as usize)
            } else {
                parent_upvalues
                    .as_ref()
                    .and_then(|parent| parent.get(descriptor.index as usize))
                    .cloned()
                    .ok_or(Fault::UpvalueBounds)?
            };

            upvalues.push(resolved);
        }

        if let Some(cached) = self.closure_cache.get(&proto).and_then(Weak::upgrade) {
            if let HeapObject::Closure(closure) = &*cached.borrow() {
                let same = closure.upvalues.len() == upvalues.len()
                    && closure
                        .upvalues
                        .iter()
                        .zip(&upvalues)
                        .all(|(a, b)| Rc::ptr_eq(a, b));

                if same {
                    return Ok(cached.clone());
                }
            }
        }

        let handle = self
            .objects
            .alloc(HeapObject::Closure(ScriptClosure { proto, upvalues }));
        self.closure_cache.insert(proto, Rc::downgrade(&handle));

        Ok(handle)
    }

    /// Close every open upvalue aliasing a slot at or above `level`, highest
    /// index first.
    pub(crate) fn close_upvalues(&mut self, level: usize) {
        let mut open: Vec<(usize, UpvalRef)> = self
            .upvalues
            .iter_live()
            .filter_map(|handle| {
                let at = handle.borrow().stack_index()?;

                (at >= level).then(|| (at, handle.clone()))
            })
            .collect();

        open.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        for (at, handle) in open {
            let value = self.stack.get(at).cloned().unwrap_or_default();
            *handle.borrow_mut() = Upvalue::Closed(value);
        }
    }
}
