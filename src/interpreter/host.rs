//! Host embedding API

use super::Interpreter;
use crate::bytecode::Chunk;
use crate::consts::VM_MAX_STACK;
use crate::error::{Fault, LoadError, VmError};
use crate::object::{HeapObject, NativeFn, ScriptClosure, Upvalue};
use crate::value::Value;

use tracing::debug;

impl Interpreter {
    /// Install a parsed chunk: append its prototypes to the arena and push
    /// the root closure, bound to the distinguished environment through its
    /// first upvalue.
    pub fn load_chunk(&mut self, chunk: Chunk) -> Result<(), VmError> {
        let offset = self.protos.len();
        let Chunk {
            num_upvalues,
            main,
            protos,
            ..
        } = chunk;

        let main = main + offset;

        for mut proto in protos {
            for child in &mut proto.protos {
                *child += offset;
            }

            self.protos.push(proto);
        }

        let root_upvalues = self
            .protos
            .get(main)
            .map(|p| p.upvalues.len())
            .unwrap_or_default();

        if root_upvalues != num_upvalues as usize {
            return Err(LoadError::Corrupt("root upvalue count").into());
        }

        let mut upvalues = Vec::with_capacity(root_upvalues);
        for i in 0..root_upvalues {
            let initial = if i == 0 {
                Value::Object(self.globals.clone())
            } else {
                Value::Nil
            };

            upvalues.push(self.upvalues.alloc(Upvalue::Closed(initial)));
        }

        let closure = self.objects.alloc(HeapObject::Closure(ScriptClosure {
            proto: main,
            upvalues,
        }));

        self.push(Value::Object(closure))?;

        debug!(main, protos = self.protos.len() - offset, "chunk installed");

        Ok(())
    }

    /// Push a value onto the register stack.
    pub fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= VM_MAX_STACK {
            return Err(Fault::StackOverflow.into());
        }

        self.stack.push(value);

        Ok(())
    }

    /// Pop the top value, if any.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Pop and discard the top `n` values.
    pub fn pop_n(&mut self, n: usize) {
        let keep = self.stack.len().saturating_sub(n);
        self.stack.truncate(keep);
    }

    /// Number of arguments passed to the executing native closure.
    pub fn arg_count(&self) -> usize {
        match self.frames.last() {
            Some(frame) if !frame.status().is_script() => frame.base() - frame.func() - 1,
            _ => 0,
        }
    }

    /// The `i`-th argument (1-indexed) of the executing native closure, or
    /// nil when out of range.
    pub fn arg(&self, index: usize) -> Value {
        let Some(frame) = self.frames.last() else {
            return Value::Nil;
        };

        if frame.status().is_script() || index == 0 || index > self.arg_count() {
            return Value::Nil;
        }

        self.stack
            .get(frame.func() + index)
            .cloned()
            .unwrap_or_default()
    }

    /// Wrap a host function as a callable value.
    pub fn native_closure(&mut self, f: NativeFn) -> Value {
        Value::Object(self.objects.alloc(HeapObject::Native(f)))
    }

    /// Bind a native closure under a key in the distinguished environment.
    pub fn register_native(&mut self, name: &str, f: NativeFn) {
        let callable = self.native_closure(f);
        self.set_global(name, callable);
    }

    /// Read a key from the distinguished environment.
    pub fn global(&self, key: impl Into<Value>) -> Value {
        let key = key.into();

        self.globals
            .borrow()
            .as_table()
            .map(|table| table.get(&key))
            .unwrap_or_default()
    }

    /// Write a key in the distinguished environment.
    pub fn set_global(&mut self, key: impl Into<Value>, value: Value) {
        let globals = self.globals.clone();
        let mut globals_ref = globals.borrow_mut();

        if let Some(table) = globals_ref.as_table_mut() {
            table.set(key.into(), value);
        }
    }

    /// Invoke the function sitting below `nargs` pushed arguments,
    /// requesting `nresults` results, or every result with [`MULTIRET`].
    ///
    /// On success the function and arguments are replaced by the results.
    /// On a fault every frame at or above this call is unwound first.
    ///
    /// [`MULTIRET`]: crate::consts::MULTIRET
    pub fn call(&mut self, nargs: usize, nresults: i32) -> Result<(), VmError> {
        let func = self
            .stack
            .len()
            .checked_sub(nargs + 1)
            .ok_or(Fault::StackOverflow)?;

        self.run_call(func, nresults)
    }
}
