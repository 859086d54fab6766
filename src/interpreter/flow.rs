use super::Interpreter;
use crate::bytecode::ProtoId;
use crate::call::{CallFrame, CallStatus};
use crate::consts::{MULTIRET, VM_EXTRA_STACK, VM_MAX_CALL_DEPTH};
use crate::error::{Fault, VmError};
use crate::object::{HeapObject, NativeFn};
use crate::value::Value;

use std::mem;

use tracing::trace;

/// Kind of frame a pre-call dispatched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Precall {
    /// A native closure ran to completion; its results are already in place.
    Native,
    /// A script frame was pushed and awaits the interpreter loop.
    Script,
}

enum Callee {
    Native(NativeFn),
    Script(ProtoId),
}

impl Interpreter {
    /// Dispatch a call to the value at `func`, with the arguments between
    /// `func` and the stack top.
    ///
    /// Native closures run synchronously and have their results adjusted to
    /// `nresults` before this returns. Script closures get a frame with the
    /// vararg-adjusted base and a register window of nils.
    pub(crate) fn precall(
        &mut self,
        func: usize,
        nresults: i32,
        fresh: bool,
    ) -> Result<Precall, VmError> {
        if self.frames.len() >= VM_MAX_CALL_DEPTH {
            return Err(Fault::StackOverflow.into());
        }

        let callee = match self.object_at(func)? {
            Some(handle) => match &*handle.borrow() {
                HeapObject::Native(f) => Callee::Native(*f),
                HeapObject::Closure(closure) => Callee::Script(closure.proto),
                HeapObject::Table(_) => {
                    return Err(Fault::CallNonCallable(crate::value::Type::Table).into())
                }
            },
            None => return Err(Fault::CallNonCallable(self.rget(func)?.tag()).into()),
        };

        let nargs = self.stack.len().saturating_sub(func + 1);
        trace!(func, nargs, nresults, "call");

        match callee {
            Callee::Native(f) => {
                let mut status = CallStatus::native();
                if fresh {
                    status = status.fresh();
                }

                self.frames
                    .push(CallFrame::new(func, func + 1 + nargs, nresults, status));

                let produced = match f(self) {
                    Ok(n) => n,
                    Err(e) => {
                        self.frames.pop();

                        return Err(e);
                    }
                };

                self.frames.pop();

                let produced = produced.min(self.stack.len().saturating_sub(func));
                let first = self.stack.len() - produced;

                self.move_results(func, first, produced, nresults)?;
                self.settle_top_after_call(nresults)?;

                Ok(Precall::Native)
            }

            Callee::Script(proto) => {
                let (num_params, is_vararg, max_stack) = {
                    let p = self.protos.get(proto).ok_or(Fault::PrototypeBounds)?;

                    (p.num_params as usize, p.is_vararg, p.max_stack_size as usize)
                };

                let base = if is_vararg {
                    self.adjust_varargs(func, nargs, num_params)?
                } else {
                    self.set_top(func + 1 + num_params)?;

                    func + 1
                };

                self.ensure_stack(base + max_stack + VM_EXTRA_STACK)?;
                self.set_top(base + max_stack)?;

                let mut status = CallStatus::script();
                if fresh {
                    status = status.fresh();
                }

                self.frames
                    .push(CallFrame::new(func, base, nresults, status));

                Ok(Precall::Script)
            }
        }
    }

    /// Move the fixed parameters of a vararg callee above the pushed
    /// arguments; the surplus stays below the returned base as the vararg
    /// window.
    fn adjust_varargs(
        &mut self,
        func: usize,
        nargs: usize,
        num_params: usize,
    ) -> Result<usize, Fault> {
        let base = self.stack.len();
        self.ensure_stack(base + num_params)?;

        for i in 0..num_params {
            let param = if i < nargs {
                mem::take(&mut self.stack[func + 1 + i])
            } else {
                Value::Nil
            };

            self.stack[base + i] = param;
        }

        Ok(base)
    }

    /// Finish the innermost frame: close its upvalues, move `produced`
    /// results starting at `first` down to the function slot, and restore the
    /// caller's stack top.
    ///
    /// Returns whether the finished frame entered the loop from the host.
    pub(crate) fn postcall(&mut self, first: usize, produced: usize) -> Result<bool, Fault> {
        let frame = self.frames.pop().ok_or(Fault::CodeBounds)?;

        if frame.status().is_script() {
            self.close_upvalues(frame.base());
        }

        trace!(
            func = frame.func(),
            produced,
            status = %frame.status(),
            "return"
        );

        self.move_results(frame.func(), first, produced, frame.nresults())?;
        self.settle_top_after_call(frame.nresults())?;

        Ok(frame.status().is_fresh())
    }

    /// Relocate call results to `dst` and adjust their count to `wanted`,
    /// padding with nil or truncating. `MULTIRET` keeps every produced value.
    fn move_results(
        &mut self,
        dst: usize,
        first: usize,
        produced: usize,
        wanted: i32,
    ) -> Result<(), Fault> {
        let produced = produced.min(self.stack.len().saturating_sub(first));
        let keep = if wanted == MULTIRET {
            produced
        } else {
            produced.min(wanted as usize)
        };

        for i in 0..keep {
            self.stack[dst + i] = mem::take(&mut self.stack[first + i]);
        }

        let top = if wanted == MULTIRET {
            dst + keep
        } else {
            dst + wanted as usize
        };

        self.set_top(top)
    }

    /// Restore the continuing script frame's register window after a call
    /// with a fixed result count.
    fn settle_top_after_call(&mut self, wanted: i32) -> Result<(), Fault> {
        if wanted == MULTIRET {
            return Ok(());
        }

        let Some(frame) = self.frames.last() else {
            return Ok(());
        };

        if !frame.status().is_script() {
            return Ok(());
        }

        let (proto, base) = self.script_context()?;
        let max_stack = self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .max_stack_size as usize;

        self.ensure_stack(base + max_stack + VM_EXTRA_STACK)?;
        self.set_top(base + max_stack)
    }

    /// Replace the frame executing a tail call with the frame `precall` just
    /// pushed for the callee, relocating the callee to the caller's slot.
    pub(crate) fn merge_tail_call(&mut self) -> Result<(), Fault> {
        let callee_frame = self.frames.pop().ok_or(Fault::CodeBounds)?;
        let caller_frame = *self.current_frame()?;

        // The dying frame's captures must not alias slots the move below
        // overwrites.
        self.close_upvalues(caller_frame.base());

        let handle = self
            .object_at(callee_frame.func())?
            .ok_or(Fault::CodeBounds)?;
        let proto = match &*handle.borrow() {
            HeapObject::Closure(closure) => closure.proto,
            _ => return Err(Fault::CodeBounds),
        };

        let num_params = self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .num_params as usize;
        let max_stack = self.protos[proto].max_stack_size as usize;

        let ofunc = caller_frame.func();
        let nfunc = callee_frame.func();
        let limit = callee_frame.base() + num_params;

        for i in 0..limit - nfunc {
            self.stack[ofunc + i] = mem::take(&mut self.stack[nfunc + i]);
        }

        let base = callee_frame.base() - (nfunc - ofunc);
        self.current_frame_mut()?.reuse_for_tail_call(base);

        self.ensure_stack(base + max_stack + VM_EXTRA_STACK)?;
        self.set_top(base + max_stack)?;

        Ok(())
    }

    /// Call the value at `func` to completion, entering the interpreter loop
    /// for script closures. The shared entry point of the host API and the
    /// generic `for` iterator protocol.
    pub(crate) fn run_call(&mut self, func: usize, nresults: i32) -> Result<(), VmError> {
        match self.precall(func, nresults, true)? {
            Precall::Native => Ok(()),
            Precall::Script => self.execute(),
        }
    }

    /// Discard frames down to `depth`, closing the upvalues of every
    /// unwound frame and truncating the stack to the outermost unwound
    /// function slot.
    pub(crate) fn unwind(&mut self, depth: usize) {
        let mut floor = None;

        while self.frames.len() > depth {
            let Some(frame) = self.frames.pop() else {
                break;
            };

            if frame.status().is_script() {
                self.close_upvalues(frame.base());
            }

            floor = Some(frame.func());
        }

        if let Some(func) = floor {
            self.stack.truncate(func);
        }
    }
}
