use picolua::bytecode::{Constant, Instruction, Opcode, BIT_RK};
use picolua::prelude::*;
use picolua::util::test_helpers::{ChunkBuilder, ProtoBuilder};
use picolua::value::Type;

fn abc(op: Opcode, a: u32, b: u32, c: u32) -> Instruction {
    Instruction::abc(op, a, b, c)
}

fn load_into(vm: &mut Interpreter, root: ProtoBuilder) {
    let chunk = load(&ChunkBuilder::new(root).build()).expect("well-formed chunk");
    vm.load_chunk(chunk).expect("install");
}

fn eval(root: ProtoBuilder) -> Result<Value, VmError> {
    let mut vm = Interpreter::new();
    load_into(&mut vm, root);
    vm.call(0, 1)?;

    Ok(vm.pop().unwrap_or_default())
}

#[test]
fn hello_return() {
    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::String("hi".into()))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    assert_eq!(result, Ok(Value::from("hi")));
}

#[test]
fn call_passes_arguments_and_returns() {
    let callee = ProtoBuilder::new()
        .params(1)
        .constant(Constant::Integer(10))
        .op(abc(Opcode::ADD, 1, 0, BIT_RK))
        .op(abc(Opcode::RETURN, 1, 2, 0));

    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::Integer(5))
            .child(callee)
            .op(Instruction::abx(Opcode::CLOSURE, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 0))
            .op(abc(Opcode::CALL, 0, 2, 2))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    assert_eq!(result, Ok(Value::Integer(15)));
}

#[test]
fn surplus_call_results_truncate_and_pad() {
    // Callee returns two values; the caller asks for exactly one, then for
    // three.
    let callee = ProtoBuilder::new()
        .constant(Constant::Integer(1))
        .constant(Constant::Integer(2))
        .op(Instruction::abx(Opcode::LOADK, 0, 0))
        .op(Instruction::abx(Opcode::LOADK, 1, 1))
        .op(abc(Opcode::RETURN, 0, 3, 0));

    let mut vm = Interpreter::new();
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .child(callee)
            .op(Instruction::abx(Opcode::CLOSURE, 0, 0))
            .op(abc(Opcode::CALL, 0, 1, 4))
            .op(abc(Opcode::RETURN, 0, 4, 0)),
    );

    vm.call(0, MULTIRET).expect("run");

    assert_eq!(
        vm.stack(),
        &[Value::Integer(1), Value::Integer(2), Value::Nil]
    );
}

#[test]
fn multi_return_passthrough() {
    let callee = ProtoBuilder::new()
        .constant(Constant::Integer(1))
        .constant(Constant::Integer(2))
        .constant(Constant::Integer(3))
        .op(Instruction::abx(Opcode::LOADK, 0, 0))
        .op(Instruction::abx(Opcode::LOADK, 1, 1))
        .op(Instruction::abx(Opcode::LOADK, 2, 2))
        .op(abc(Opcode::RETURN, 0, 4, 0));

    let mut vm = Interpreter::new();
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .child(callee)
            .op(Instruction::abx(Opcode::CLOSURE, 0, 0))
            .op(abc(Opcode::CALL, 0, 1, 0))
            .op(abc(Opcode::RETURN, 0, 0, 0)),
    );

    vm.call(0, MULTIRET).expect("run");

    assert_eq!(
        vm.stack(),
        &[Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn varargs_flow_through() {
    let mut vm = Interpreter::new();
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .params(1)
            .vararg()
            .op(abc(Opcode::VARARG, 1, 0, 0))
            .op(abc(Opcode::RETURN, 0, 0, 0)),
    );

    vm.push(Value::Integer(7)).expect("push");
    vm.push(Value::Integer(8)).expect("push");
    vm.push(Value::Integer(9)).expect("push");
    vm.call(3, MULTIRET).expect("run");

    // The fixed parameter followed by the two surplus arguments.
    assert_eq!(
        vm.stack(),
        &[Value::Integer(7), Value::Integer(8), Value::Integer(9)]
    );
}

#[test]
fn vararg_with_fixed_count_pads() {
    let mut vm = Interpreter::new();
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .vararg()
            .op(abc(Opcode::VARARG, 0, 4, 0))
            .op(abc(Opcode::RETURN, 0, 4, 0)),
    );

    vm.push(Value::Integer(1)).expect("push");
    vm.call(1, MULTIRET).expect("run");

    assert_eq!(
        vm.stack(),
        &[Value::Integer(1), Value::Nil, Value::Nil]
    );
}

/// `f(n): if n == 0 then return 42 end; return f(n - 1)` through `TAILCALL`,
/// recursing far past the call depth bound to prove frame reuse.
#[test]
fn tail_calls_reuse_the_frame() {
    let recursive = ProtoBuilder::new()
        .params(1)
        .max_stack(4)
        .constant(Constant::Integer(0))
        .constant(Constant::Integer(42))
        .constant(Constant::Integer(1))
        .upvalue(true, 0)
        .op(abc(Opcode::EQ, 0, 0, BIT_RK))
        .op(Instruction::asbx(Opcode::JMP, 0, 2))
        .op(Instruction::abx(Opcode::LOADK, 1, 1))
        .op(abc(Opcode::RETURN, 1, 2, 0))
        .op(abc(Opcode::GETUPVAL, 1, 0, 0))
        .op(abc(Opcode::SUB, 2, 0, BIT_RK | 2))
        .op(abc(Opcode::TAILCALL, 1, 2, 0))
        .op(abc(Opcode::RETURN, 1, 0, 0));

    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::Integer(500))
            .child(recursive)
            .op(Instruction::abx(Opcode::CLOSURE, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 0))
            .op(abc(Opcode::CALL, 0, 2, 2))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    assert_eq!(result, Ok(Value::Integer(42)));
}

/// The same recursion through a plain `CALL` must exhaust the frame stack.
#[test]
fn unbounded_recursion_overflows() {
    let recursive = ProtoBuilder::new()
        .params(1)
        .max_stack(4)
        .upvalue(true, 0)
        .op(abc(Opcode::GETUPVAL, 1, 0, 0))
        .op(abc(Opcode::MOVE, 2, 0, 0))
        .op(abc(Opcode::CALL, 1, 2, 2))
        .op(abc(Opcode::RETURN, 1, 2, 0));

    let mut vm = Interpreter::new();
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .constant(Constant::Integer(0))
            .child(recursive)
            .op(Instruction::abx(Opcode::CLOSURE, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 0))
            .op(abc(Opcode::CALL, 0, 2, 2))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    assert_eq!(
        vm.call(0, 1),
        Err(VmError::Fault(Fault::StackOverflow))
    );

    // The fault unwound every frame back to the host boundary.
    assert_eq!(vm.call_depth(), 0);
    assert_eq!(vm.top(), 0);
}

#[test]
fn calling_a_non_callable_value_faults() {
    let mut vm = Interpreter::new();
    vm.push(Value::Integer(5)).expect("push");

    assert_eq!(
        vm.call(0, 0),
        Err(VmError::Fault(Fault::CallNonCallable(Type::Number)))
    );
}

#[test]
fn numeric_for_sums_the_range() {
    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::Integer(1))
            .constant(Constant::Integer(5))
            .constant(Constant::Integer(0))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 1))
            .op(Instruction::abx(Opcode::LOADK, 2, 0))
            .op(Instruction::abx(Opcode::LOADK, 4, 2))
            .op(Instruction::asbx(Opcode::FORPREP, 0, 1))
            .op(abc(Opcode::ADD, 4, 4, 3))
            .op(Instruction::asbx(Opcode::FORLOOP, 0, -2))
            .op(abc(Opcode::RETURN, 4, 2, 0)),
    );

    assert_eq!(result, Ok(Value::Integer(15)));
}

#[test]
fn numeric_for_with_float_step() {
    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::Integer(1))
            .constant(Constant::Integer(2))
            .constant(Constant::Number(0.5))
            .constant(Constant::Integer(0))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 1))
            .op(Instruction::abx(Opcode::LOADK, 2, 2))
            .op(Instruction::abx(Opcode::LOADK, 4, 3))
            .op(Instruction::asbx(Opcode::FORPREP, 0, 1))
            .op(abc(Opcode::ADD, 4, 4, 3))
            .op(Instruction::asbx(Opcode::FORLOOP, 0, -2))
            .op(abc(Opcode::RETURN, 4, 2, 0)),
    );

    // 1.0 + 1.5 + 2.0
    assert_eq!(result, Ok(Value::Number(4.5)));
}

#[test]
fn numeric_for_on_a_string_faults() {
    let result = eval(
        ProtoBuilder::new()
            .constant(Constant::String("start".into()))
            .constant(Constant::Integer(5))
            .constant(Constant::Integer(1))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 1))
            .op(Instruction::abx(Opcode::LOADK, 2, 2))
            .op(Instruction::asbx(Opcode::FORPREP, 0, 0))
            .op(Instruction::asbx(Opcode::FORLOOP, 0, -1))
            .op(abc(Opcode::RETURN, 0, 1, 0)),
    );

    // "start" parses as no number at all.
    assert!(matches!(
        result,
        Err(VmError::Fault(Fault::ArithOnNonNumber(_)))
    ));
}

fn bounded_iterator(vm: &mut Interpreter) -> Result<usize, VmError> {
    let control = vm.arg(2);
    let next = match control.to_integer() {
        Some(i) if i < 3 => Value::Integer(i + 1),
        _ => Value::Nil,
    };

    vm.push(next)?;

    Ok(1)
}

/// Generic `for` over a native iterator: `for v in iter, nil, 0 do sum += v`.
#[test]
fn generic_for_drives_a_native_iterator() {
    let mut vm = Interpreter::new();
    vm.register_native("iter", bounded_iterator);

    // R0 sum, R1 iterator, R2 state, R3 control, R4 loop variable.
    load_into(
        &mut vm,
        ProtoBuilder::new()
            .upvalue(true, 0)
            .constant(Constant::String("iter".into()))
            .constant(Constant::Integer(0))
            .op(Instruction::abx(Opcode::LOADK, 0, 1))
            .op(abc(Opcode::GETTABUP, 1, 0, BIT_RK))
            .op(abc(Opcode::LOADNIL, 2, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 3, 1))
            .op(Instruction::asbx(Opcode::JMP, 0, 1))
            .op(abc(Opcode::ADD, 0, 0, 4))
            .op(abc(Opcode::TFORCALL, 1, 0, 1))
            .op(Instruction::asbx(Opcode::TFORLOOP, 3, -3))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    vm.call(0, 1).expect("run");

    assert_eq!(vm.pop(), Some(Value::Integer(6)));
}

#[test]
fn loadbool_skips_on_demand() {
    let result = eval(
        ProtoBuilder::new()
            .op(abc(Opcode::LOADBOOL, 0, 1, 1))
            .op(abc(Opcode::LOADBOOL, 0, 0, 0))
            .op(abc(Opcode::RETURN, 0, 2, 0)),
    );

    assert_eq!(result, Ok(Value::Boolean(true)));
}

#[test]
fn testset_picks_the_fallback() {
    let pick = |first: Constant| {
        eval(
            ProtoBuilder::new()
                .constant(first)
                .constant(Constant::String("fallback".into()))
                .op(Instruction::abx(Opcode::LOADK, 0, 0))
                .op(Instruction::abx(Opcode::LOADK, 1, 1))
                .op(abc(Opcode::TESTSET, 2, 0, 1))
                .op(Instruction::asbx(Opcode::JMP, 0, 1))
                .op(abc(Opcode::MOVE, 2, 1, 0))
                .op(abc(Opcode::RETURN, 2, 2, 0)),
        )
    };

    assert_eq!(pick(Constant::Integer(5)), Ok(Value::Integer(5)));
    assert_eq!(pick(Constant::Nil), Ok(Value::from("fallback")));
}
