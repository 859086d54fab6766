use super::alu;
use super::flow::Precall;
use super::Interpreter;
use crate::bytecode::{Instruction, Opcode, ProtoId};
use crate::consts::{FIELDS_PER_FLUSH, MULTIRET};
use crate::error::{Fault, VmError};
use crate::object::HeapObject;
use crate::state::ExecuteState;
use crate::table::Table;
use crate::value::{float_to_int_exact, Value};

impl Interpreter {
    /// Run the interpreter loop until the entry frame returns.
    ///
    /// A fault unwinds every frame at or above the entry frame, closing
    /// their upvalues, before surfacing to the caller.
    pub(crate) fn execute(&mut self) -> Result<(), VmError> {
        let entry = self.frames.len();

        self.run_frames().map_err(|e| {
            self.unwind(entry.saturating_sub(1));

            e
        })
    }

    /// Dispatch instructions against a cached frame context, re-resolving it
    /// whenever dispatch enters, replaces, or pops a script frame.
    fn run_frames(&mut self) -> Result<(), VmError> {
        let (mut proto, mut base) = self.script_context()?;

        loop {
            let state = self.step(proto, base)?;

            if state.should_continue() {
                continue;
            }

            if let ExecuteState::Return { fresh: true } = state {
                return Ok(());
            }

            // Reframe or an inner return: the register window and code now
            // belong to a different invocation.
            (proto, base) = self.script_context()?;
        }
    }

    /// Fetch, decode, and dispatch one instruction of the innermost frame.
    fn step(&mut self, proto: ProtoId, base: usize) -> Result<ExecuteState, VmError> {
        let pc = self.current_frame_mut()?.bump_pc();

        let instruction = *self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .code
            .get(pc)
            .ok_or(Fault::CodeBounds)?;

        self.instruction(proto, base, instruction)
    }

    fn instruction(
        &mut self,
        proto: ProtoId,
        base: usize,
        instruction: Instruction,
    ) -> Result<ExecuteState, VmError> {
        use Opcode::*;

        let op = instruction.opcode()?;
        let ra = base + instruction.a();

        match op {
            MOVE => {
                let value = self.rget(base + instruction.b() as usize)?;
                self.rset(ra, value)?;
            }

            LOADK => {
                let value = self.constant(proto, instruction.bx() as usize)?;
                self.rset(ra, value)?;
            }

            LOADKX => {
                let index = self.fetch_extra_arg(proto)? as usize;
                let value = self.constant(proto, index)?;
                self.rset(ra, value)?;
            }

            LOADBOOL => {
                self.rset(ra, Value::Boolean(instruction.b() != 0))?;

                if instruction.c() != 0 {
                    self.current_frame_mut()?.bump_pc();
                }
            }

            LOADNIL => {
                for i in 0..=instruction.b() as usize {
                    self.rset(ra + i, Value::Nil)?;
                }
            }

            GETUPVAL => {
                let upvalue = self.current_upvalue(instruction.b() as usize)?;
                let value = self.read_upvalue(&upvalue);
                self.rset(ra, value)?;
            }

            SETUPVAL => {
                let upvalue = self.current_upvalue(instruction.b() as usize)?;
                let value = self.rget(ra)?;
                self.write_upvalue(&upvalue, value);
            }

            GETTABUP => {
                let upvalue = self.current_upvalue(instruction.b() as usize)?;
                let receiver = self.read_upvalue(&upvalue);
                let key = self.rk(proto, base, instruction.c())?;
                let value = self.table_get(&receiver, &key)?;
                self.rset(ra, value)?;
            }

            SETTABUP => {
                let upvalue = self.current_upvalue(instruction.a())?;
                let receiver = self.read_upvalue(&upvalue);
                let key = self.rk(proto, base, instruction.b())?;
                let value = self.rk(proto, base, instruction.c())?;
                self.table_set(&receiver, key, value)?;
            }

            GETTABLE => {
                let receiver = self.rget(base + instruction.b() as usize)?;
                let key = self.rk(proto, base, instruction.c())?;
                let value = self.table_get(&receiver, &key)?;
                self.rset(ra, value)?;
            }

            SETTABLE => {
                let receiver = self.rget(ra)?;
                let key = self.rk(proto, base, instruction.b())?;
                let value = self.rk(proto, base, instruction.c())?;
                self.table_set(&receiver, key, value)?;
            }

            NEWTABLE => {
                let table = self.objects.alloc(HeapObject::Table(Table::new()));
                self.rset(ra, Value::Object(table))?;
            }

            SELF => {
                let receiver = self.rget(base + instruction.b() as usize)?;
                self.rset(ra + 1, receiver.clone())?;

                let key = self.rk(proto, base, instruction.c())?;
                let value = self.table_get(&receiver, &key)?;
                self.rset(ra, value)?;
            }

            ADD | SUB | MUL | MOD | POW | DIV | IDIV | BAND | BOR | BXOR | SHL | SHR => {
                let lhs = self.rk(proto, base, instruction.b())?;
                let rhs = self.rk(proto, base, instruction.c())?;
                self.rset(ra, alu::binary_arith(op, &lhs, &rhs)?)?;
            }

            UNM | BNOT => {
                let operand = self.rget(base + instruction.b() as usize)?;
                self.rset(ra, alu::unary_arith(op, &operand)?)?;
            }

            NOT => {
                let operand = self.rget(base + instruction.b() as usize)?;
                self.rset(ra, Value::Boolean(!operand.is_truthy()))?;
            }

            LEN => {
                let operand = self.rget(base + instruction.b() as usize)?;
                self.rset(ra, alu::length_of(&operand)?)?;
            }

            CONCAT => {
                let from = base + instruction.b() as usize;
                let to = base + instruction.c() as usize;
                let parts = self
                    .stack
                    .get(from..=to)
                    .ok_or(Fault::RegisterBounds)?
                    .to_vec();

                self.rset(ra, alu::concat(&parts)?)?;
            }

            JMP => self.jump(base, instruction)?,

            EQ => {
                let lhs = self.rk(proto, base, instruction.b())?;
                let rhs = self.rk(proto, base, instruction.c())?;
                self.conditional_jump(proto, base, lhs == rhs, instruction.a() != 0)?;
            }

            LT => {
                let lhs = self.rk(proto, base, instruction.b())?;
                let rhs = self.rk(proto, base, instruction.c())?;
                let cond = alu::less_than(&lhs, &rhs)?;
                self.conditional_jump(proto, base, cond, instruction.a() != 0)?;
            }

            LE => {
                let lhs = self.rk(proto, base, instruction.b())?;
                let rhs = self.rk(proto, base, instruction.c())?;
                let cond = alu::less_equal(&lhs, &rhs)?;
                self.conditional_jump(proto, base, cond, instruction.a() != 0)?;
            }

            TEST => {
                let value = self.rget(ra)?;
                self.conditional_jump(proto, base, value.is_truthy(), instruction.c() != 0)?;
            }

            TESTSET => {
                let value = self.rget(base + instruction.b() as usize)?;

                if value.is_truthy() != (instruction.c() != 0) {
                    self.current_frame_mut()?.bump_pc();
                } else {
                    self.rset(ra, value)?;
                    self.take_next_jump(proto, base)?;
                }
            }

            CALL => {
                let b = instruction.b() as usize;

                if b != 0 {
                    self.set_top(ra + b)?;
                }

                let nresults = instruction.c() as i32 - 1;

                return match self.precall(ra, nresults, false)? {
                    Precall::Native => Ok(ExecuteState::Proceed),
                    Precall::Script => Ok(ExecuteState::Reframe),
                };
            }

            TAILCALL => {
                let b = instruction.b() as usize;

                if b != 0 {
                    self.set_top(ra + b)?;
                }

                return match self.precall(ra, MULTIRET, false)? {
                    // The compiler emits `RETURN A 0` right behind; it will
                    // pick the results up from the function slot.
                    Precall::Native => Ok(ExecuteState::Proceed),
                    Precall::Script => {
                        self.merge_tail_call()?;

                        Ok(ExecuteState::Reframe)
                    }
                };
            }

            RETURN => {
                let b = instruction.b() as usize;
                let produced = if b == 0 {
                    self.stack.len().saturating_sub(ra)
                } else {
                    b - 1
                };

                let fresh = self.postcall(ra, produced)?;

                return Ok(ExecuteState::Return { fresh });
            }

            FORPREP => self.for_prep(ra, instruction)?,

            FORLOOP => self.for_loop(ra, instruction)?,

            TFORCALL => {
                let control = ra + 3;
                self.ensure_stack(control + 3)?;

                for i in (0..3).rev() {
                    let value = self.rget(ra + i)?;
                    self.rset(control + i, value)?;
                }

                self.set_top(control + 3)?;
                self.run_call(control, instruction.c() as i32)?;
            }

            TFORLOOP => {
                let value = self.rget(ra + 1)?;

                if !value.is_nil() {
                    self.rset(ra, value)?;
                    self.current_frame_mut()?.displace_pc(instruction.sbx());
                }
            }

            SETLIST => {
                let b = instruction.b() as usize;
                let c = instruction.c();

                let count = if b == 0 {
                    self.stack.len().saturating_sub(ra + 1)
                } else {
                    b
                };

                let block = if c == 0 {
                    self.fetch_extra_arg(proto)? as usize
                } else {
                    c as usize
                };

                if block == 0 {
                    return Err(Fault::InvalidOpcode(op as u8).into());
                }

                let start = ((block - 1) * FIELDS_PER_FLUSH) as i64;
                let table = self.rget(ra)?;

                for i in 1..=count {
                    let value = self.rget(ra + i)?;
                    self.table_set(&table, Value::Integer(start + i as i64), value)?;
                }

                if b == 0 {
                    self.settle_frame_top(proto, base)?;
                }
            }

            CLOSURE => {
                let child = self
                    .protos
                    .get(proto)
                    .ok_or(Fault::PrototypeBounds)?
                    .protos
                    .get(instruction.bx() as usize)
                    .copied()
                    .ok_or(Fault::PrototypeBounds)?;

                let closure = self.make_closure(child, base)?;
                self.rset(ra, Value::Object(closure))?;
            }

            VARARG => {
                let frame = self.current_frame()?;
                let func = frame.func();

                let num_params = self
                    .protos
                    .get(proto)
                    .ok_or(Fault::PrototypeBounds)?
                    .num_params as usize;

                let extras = (base - func - 1).saturating_sub(num_params);

                let b = instruction.b() as usize;
                let wanted = if b == 0 { extras } else { b - 1 };

                if b == 0 {
                    self.ensure_stack(ra + extras)?;
                }

                for i in 0..wanted {
                    let value = if i < extras {
                        self.rget(base - extras + i)?
                    } else {
                        Value::Nil
                    };

                    self.rset(ra + i, value)?;
                }

                if b == 0 {
                    self.set_top(ra + extras)?;
                }
            }

            EXTRAARG => return Err(Fault::InvalidOpcode(op as u8).into()),
        }

        Ok(ExecuteState::Proceed)
    }

    /// `JMP`: displace the pc and honour the upvalue-close hint in `A`.
    fn jump(&mut self, base: usize, instruction: Instruction) -> Result<(), VmError> {
        let a = instruction.a();

        if a > 0 {
            self.close_upvalues(base + a - 1);
        }

        self.current_frame_mut()?.displace_pc(instruction.sbx());

        Ok(())
    }

    /// Comparison tail shared by `EQ`/`LT`/`LE`/`TEST`: skip the following
    /// `JMP` when the condition misses the expectation, take it otherwise.
    fn conditional_jump(
        &mut self,
        proto: ProtoId,
        base: usize,
        cond: bool,
        expected: bool,
    ) -> Result<(), VmError> {
        if cond != expected {
            self.current_frame_mut()?.bump_pc();

            Ok(())
        } else {
            self.take_next_jump(proto, base)
        }
    }

    /// Execute the `JMP` that must follow a comparison instruction.
    fn take_next_jump(&mut self, proto: ProtoId, base: usize) -> Result<(), VmError> {
        let pc = self.current_frame_mut()?.bump_pc();

        let instruction = *self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .code
            .get(pc)
            .ok_or(Fault::CodeBounds)?;

        match instruction.opcode()? {
            Opcode::JMP => self.jump(base, instruction),
            other => Err(Fault::InvalidOpcode(other as u8).into()),
        }
    }

    /// Consume the `EXTRAARG` word following the current instruction.
    fn fetch_extra_arg(&mut self, proto: ProtoId) -> Result<u32, VmError> {
        let pc = self.current_frame_mut()?.bump_pc();

        let instruction = *self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .code
            .get(pc)
            .ok_or(Fault::CodeBounds)?;

        match instruction.opcode()? {
            Opcode::EXTRAARG => Ok(instruction.ax_arg()),
            other => Err(Fault::InvalidOpcode(other as u8).into()),
        }
    }

    /// Restore the register window after a multi-value consumer.
    fn settle_frame_top(&mut self, proto: ProtoId, base: usize) -> Result<(), VmError> {
        let max_stack = self
            .protos
            .get(proto)
            .ok_or(Fault::PrototypeBounds)?
            .max_stack_size as usize;

        self.set_top(base + max_stack)?;

        Ok(())
    }

    /// `FORPREP`: pick the integer loop when the control values allow it,
    /// fall back to floats, and jump to the loop tail.
    fn for_prep(&mut self, ra: usize, instruction: Instruction) -> Result<(), VmError> {
        let init = self.rget(ra)?;
        let limit = self.rget(ra + 1)?;
        let step = self.rget(ra + 2)?;

        if let (Value::Integer(init), Value::Integer(step)) = (&init, &step) {
            if let Some((limit, exhausted)) = for_limit(&limit, *step) {
                let start = if exhausted { 0 } else { *init };

                self.rset(ra + 1, Value::Integer(limit))?;
                self.rset(ra, Value::Integer(start.wrapping_sub(*step)))?;
                self.current_frame_mut()?.displace_pc(instruction.sbx());

                return Ok(());
            }
        }

        let nlimit = limit
            .to_float()
            .ok_or(Fault::ArithOnNonNumber(limit.tag()))?;
        let nstep = step.to_float().ok_or(Fault::ArithOnNonNumber(step.tag()))?;
        let ninit = init.to_float().ok_or(Fault::ArithOnNonNumber(init.tag()))?;

        self.rset(ra + 1, Value::Number(nlimit))?;
        self.rset(ra + 2, Value::Number(nstep))?;
        self.rset(ra, Value::Number(ninit - nstep))?;
        self.current_frame_mut()?.displace_pc(instruction.sbx());

        Ok(())
    }

    /// `FORLOOP`: advance the control variable and jump back while the limit
    /// holds.
    fn for_loop(&mut self, ra: usize, instruction: Instruction) -> Result<(), VmError> {
        match self.rget(ra)? {
            Value::Integer(current) => {
                let (Value::Integer(limit), Value::Integer(step)) =
                    (self.rget(ra + 1)?, self.rget(ra + 2)?)
                else {
                    return Err(Fault::ArithOnNonNumber(self.rget(ra + 1)?.tag()).into());
                };

                let next = current.wrapping_add(step);
                let continuing = if step > 0 { next <= limit } else { limit <= next };

                if continuing {
                    self.current_frame_mut()?.displace_pc(instruction.sbx());
                    self.rset(ra, Value::Integer(next))?;
                    self.rset(ra + 3, Value::Integer(next))?;
                }

                Ok(())
            }

            Value::Number(current) => {
                let limit = self
                    .rget(ra + 1)?
                    .to_float()
                    .ok_or(Fault::ArithOnNonNumber(self.rget(ra + 1)?.tag()))?;
                let step = self
                    .rget(ra + 2)?
                    .to_float()
                    .ok_or(Fault::ArithOnNonNumber(self.rget(ra + 2)?.tag()))?;

                let next = current + step;
                let continuing = if step > 0.0 {
                    next <= limit
                } else {
                    limit <= next
                };

                if continuing {
                    self.current_frame_mut()?.displace_pc(instruction.sbx());
                    self.rset(ra, Value::Number(next))?;
                    self.rset(ra + 3, Value::Number(next))?;
                }

                Ok(())
            }

            other => Err(Fault::ArithOnNonNumber(other.tag()).into()),
        }
    }
}

/// Convert a numeric `for` limit to an integer, rounding toward the loop
/// interior and clamping out-of-range floats. Returns the clamped limit and
/// whether the loop can't run at all; `None` when the limit isn't numeric.
fn for_limit(limit: &Value, step: i64) -> Option<(i64, bool)> {
    if let Value::Integer(i) = limit {
        return Some((*i, false));
    }

    let f = limit.to_float()?;
    let rounded = if step < 0 { f.ceil() } else { f.floor() };

    if let Some(i) = float_to_int_exact(rounded) {
        return Some((i, false));
    }

    if f > 0.0 {
        Some((i64::MAX, step < 0))
    } else {
        Some((i64::MIN, step > 0))
    }
}
