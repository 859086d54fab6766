use picolua::bytecode::{Constant, Instruction, Opcode, BIT_RK};
use picolua::prelude::*;
use picolua::util::test_helpers::{ChunkBuilder, ProtoBuilder};
use picolua::value::Type;

fn abc(op: Opcode, a: u32, b: u32, c: u32) -> Instruction {
    Instruction::abc(op, a, b, c)
}

fn run(root: ProtoBuilder, nresults: i32) -> Result<Vec<Value>, VmError> {
    let mut vm = Interpreter::new();
    vm.load_chunk(load(&ChunkBuilder::new(root).build())?)?;
    vm.call(0, nresults)?;

    Ok(vm.stack().to_vec())
}

/// Scenario: set `t.x = 42`, read it back, erase it with nil, read again.
#[test]
fn set_get_erase_round_trip() {
    let results = run(
        ProtoBuilder::new()
            .constant(Constant::String("x".into()))
            .constant(Constant::Integer(42))
            .constant(Constant::Nil)
            .op(abc(Opcode::NEWTABLE, 0, 0, 0))
            .op(abc(Opcode::SETTABLE, 0, BIT_RK, BIT_RK | 1))
            .op(abc(Opcode::GETTABLE, 1, 0, BIT_RK))
            .op(abc(Opcode::SETTABLE, 0, BIT_RK, BIT_RK | 2))
            .op(abc(Opcode::GETTABLE, 2, 0, BIT_RK))
            .op(abc(Opcode::RETURN, 1, 3, 0)),
        2,
    )
    .expect("run");

    assert_eq!(results, vec![Value::Integer(42), Value::Nil]);
}

#[test]
fn setlist_populates_the_sequence() {
    let results = run(
        ProtoBuilder::new()
            .constant(Constant::Integer(10))
            .constant(Constant::Integer(20))
            .constant(Constant::Integer(30))
            .constant(Constant::Integer(2))
            .op(abc(Opcode::NEWTABLE, 0, 0, 0))
            .op(Instruction::abx(Opcode::LOADK, 1, 0))
            .op(Instruction::abx(Opcode::LOADK, 2, 1))
            .op(Instruction::abx(Opcode::LOADK, 3, 2))
            .op(abc(Opcode::SETLIST, 0, 3, 1))
            .op(abc(Opcode::LEN, 1, 0, 0))
            .op(abc(Opcode::GETTABLE, 2, 0, BIT_RK | 3))
            .op(abc(Opcode::RETURN, 1, 3, 0)),
        2,
    )
    .expect("run");

    assert_eq!(results, vec![Value::Integer(3), Value::Integer(20)]);
}

#[test]
fn self_loads_receiver_and_member() {
    // R0 = t, then `SELF` primes R1 with the receiver and R0 with t.f.
    let results = run(
        ProtoBuilder::new()
            .constant(Constant::String("f".into()))
            .constant(Constant::Integer(9))
            .op(abc(Opcode::NEWTABLE, 0, 0, 0))
            .op(abc(Opcode::SETTABLE, 0, BIT_RK, BIT_RK | 1))
            .op(abc(Opcode::SELF, 0, 0, BIT_RK))
            .op(abc(Opcode::RETURN, 0, 3, 0)),
        2,
    )
    .expect("run");

    assert_eq!(results[0], Value::Integer(9));
    assert_eq!(results[1].tag(), Type::Table);
}

#[test]
fn indexing_a_number_faults() {
    let result = run(
        ProtoBuilder::new()
            .constant(Constant::Integer(5))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(abc(Opcode::GETTABLE, 1, 0, BIT_RK))
            .op(abc(Opcode::RETURN, 1, 2, 0)),
        1,
    );

    assert_eq!(
        result,
        Err(VmError::Fault(Fault::IndexNonTable(Type::Number)))
    );
}

#[test]
fn assigning_into_a_string_faults() {
    let result = run(
        ProtoBuilder::new()
            .constant(Constant::String("s".into()))
            .constant(Constant::Integer(1))
            .op(Instruction::abx(Opcode::LOADK, 0, 0))
            .op(abc(Opcode::SETTABLE, 0, BIT_RK | 1, BIT_RK | 1))
            .op(abc(Opcode::RETURN, 0, 1, 0)),
        0,
    );

    assert_eq!(
        result,
        Err(VmError::Fault(Fault::IndexNonTable(Type::String)))
    );
}

#[test]
fn length_of_a_boolean_faults() {
    let result = run(
        ProtoBuilder::new()
            .op(abc(Opcode::LOADBOOL, 0, 1, 0))
            .op(abc(Opcode::LEN, 1, 0, 0))
            .op(abc(Opcode::RETURN, 1, 2, 0)),
        1,
    );

    assert_eq!(
        result,
        Err(VmError::Fault(Fault::LengthOnUnsupported(Type::Boolean)))
    );
}
