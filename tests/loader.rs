use picolua::arch::Endianness;
use picolua::bytecode::{Constant, Instruction, Opcode};
use picolua::prelude::*;
use picolua::util::test_helpers::{header, ChunkBuilder, ProtoBuilder};

fn ret0() -> Instruction {
    Instruction::abc(Opcode::RETURN, 0, 1, 0)
}

#[test]
fn counts_survive_the_round_trip() {
    let grandchild = ProtoBuilder::new().op(ret0());
    let child = ProtoBuilder::new()
        .params(2)
        .op(ret0())
        .constant(Constant::Integer(1))
        .upvalue(true, 0)
        .child(grandchild);
    let root = ProtoBuilder::new()
        .vararg()
        .op(Instruction::abx(Opcode::LOADK, 0, 0))
        .op(Instruction::abc(Opcode::RETURN, 0, 2, 0))
        .constant(Constant::String("hi".into()))
        .constant(Constant::Number(0.5))
        .constant(Constant::Boolean(true))
        .constant(Constant::Nil)
        .upvalue(true, 0)
        .child(child);

    let chunk = load(&ChunkBuilder::new(root).build()).expect("well-formed chunk");

    assert_eq!(chunk.num_upvalues, 1);
    assert_eq!(chunk.protos.len(), 3);

    let main = &chunk.protos[chunk.main];
    assert!(main.is_vararg);
    assert_eq!(main.code.len(), 2);
    assert_eq!(main.constants.len(), 4);
    assert_eq!(main.upvalues.len(), 1);
    assert_eq!(main.protos.len(), 1);

    let child = &chunk.protos[main.protos[0]];
    assert_eq!(child.num_params, 2);
    assert_eq!(child.constants, vec![Constant::Integer(1)]);
    assert_eq!(child.protos.len(), 1);
}

#[test]
fn children_precede_their_parent() {
    let root = ProtoBuilder::new()
        .op(ret0())
        .child(ProtoBuilder::new().op(ret0()))
        .child(ProtoBuilder::new().op(ret0()));

    let chunk = load(&ChunkBuilder::new(root).build()).expect("well-formed chunk");

    assert_eq!(chunk.main, 2);
    assert_eq!(chunk.protos[chunk.main].protos, vec![0, 1]);
}

#[test]
fn bad_signature() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[0] = b'#';

    assert_eq!(load(&bytes), Err(LoadError::BadSignature));
}

#[test]
fn bad_version() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[4] = 0x52;

    assert_eq!(load(&bytes), Err(LoadError::BadVersion(0x52)));
}

#[test]
fn bad_format() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[5] = 1;

    assert_eq!(load(&bytes), Err(LoadError::BadFormat(1)));
}

#[test]
fn damaged_conversion_check() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[6] ^= 0x01;

    assert!(matches!(load(&bytes), Err(LoadError::Corrupt(_))));
}

#[test]
fn oversized_width_is_rejected() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[12] = 16;

    assert_eq!(load(&bytes), Err(LoadError::UnsupportedWidth(16)));
}

#[test]
fn narrow_number_width_is_rejected() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    bytes[16] = 4;

    assert_eq!(load(&bytes), Err(LoadError::UnsupportedWidth(4)));
}

#[test]
fn garbled_sentinels_fail_both_byte_orders() {
    let mut bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();
    // Stomp the integer sentinel that follows the five width bytes.
    bytes[17] ^= 0xa5;
    bytes[18] ^= 0xa5;

    assert_eq!(load(&bytes), Err(LoadError::BadEndianness));
}

#[test]
fn truncated_stream() {
    let bytes = ChunkBuilder::new(ProtoBuilder::new().op(ret0())).build();

    for cut in [bytes.len() - 1, bytes.len() / 2, header().len(), 3] {
        assert_eq!(load(&bytes[..cut]), Err(LoadError::Truncated), "cut at {cut}");
    }
}

#[test]
fn unknown_constant_tag_is_corrupt() {
    let root = ProtoBuilder::new().op(ret0()).constant(Constant::Nil);
    let mut bytes = ChunkBuilder::new(root).build();

    // The only nil constant tag in the stream is the single zero byte
    // following the constant count; find it from the end, right before the
    // empty upvalue/proto/debug sections.
    let at = bytes.len() - 1 - 4 * 5;
    assert_eq!(bytes[at], 0x00);
    bytes[at] = 0x07;

    assert!(matches!(load(&bytes), Err(LoadError::Corrupt(_))));
}

/// A chunk whose every multi-byte field is stored in the opposite byte
/// order, as a foreign-endian build of the reference compiler would emit it.
fn swapped_chunk() -> Vec<u8> {
    fn swap32(v: u32) -> [u8; 4] {
        let mut bytes = v.to_ne_bytes();
        bytes.reverse();
        bytes
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0x1b, b'L', b'u', b'a']);
    out.push(0x53);
    out.push(0);
    out.extend_from_slice(&[0x19, 0x93, b'\r', b'\n', 0x1a, b'\n']);
    out.extend_from_slice(&[4, 8, 4, 8, 8]);

    let mut int_sentinel = 0x5678i64.to_ne_bytes();
    int_sentinel.reverse();
    out.extend_from_slice(&int_sentinel);

    let mut num_sentinel = 370.5f64.to_bits().to_ne_bytes();
    num_sentinel.reverse();
    out.extend_from_slice(&num_sentinel);

    out.push(0); // root closure upvalues

    out.push(0); // empty source name
    out.extend_from_slice(&swap32(0)); // line defined
    out.extend_from_slice(&swap32(0)); // last line defined
    out.extend_from_slice(&[0, 0, 2]); // params, vararg, max stack

    out.extend_from_slice(&swap32(1)); // instruction count
    let ret: u32 = Instruction::abc(Opcode::RETURN, 0, 1, 0).into();
    out.extend_from_slice(&swap32(ret));

    out.extend_from_slice(&swap32(0)); // constants
    out.extend_from_slice(&swap32(0)); // upvalues
    out.extend_from_slice(&swap32(0)); // children
    out.extend_from_slice(&swap32(0)); // line info
    out.extend_from_slice(&swap32(0)); // locals
    out.extend_from_slice(&swap32(0)); // upvalue names

    out
}

#[test]
fn foreign_byte_order_is_detected_and_decoded() {
    let chunk = load(&swapped_chunk()).expect("byte-swapped chunk");

    assert_eq!(chunk.arch.endianness(), Endianness::host().swapped());
    assert_eq!(chunk.protos[chunk.main].code.len(), 1);

    let mut vm = Interpreter::new();
    vm.load_chunk(chunk).expect("install");
    vm.call(0, 0).expect("run");

    assert_eq!(vm.top(), 0);
}

/// A chunk declaring two-byte platform integers; counts zero-extend.
#[test]
fn narrow_integer_widths_zero_extend() {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x1b, b'L', b'u', b'a']);
    out.push(0x53);
    out.push(0);
    out.extend_from_slice(&[0x19, 0x93, b'\r', b'\n', 0x1a, b'\n']);
    out.extend_from_slice(&[2, 4, 4, 8, 8]);
    out.extend_from_slice(&0x5678i64.to_ne_bytes());
    out.extend_from_slice(&370.5f64.to_bits().to_ne_bytes());

    out.push(0);

    let int16 = |out: &mut Vec<u8>, v: u16| {
        out.extend_from_slice(&v.to_ne_bytes());
    };

    out.push(0); // source
    int16(&mut out, 0);
    int16(&mut out, 0);
    out.extend_from_slice(&[0, 0, 2]);

    int16(&mut out, 1);
    let ret: u32 = Instruction::abc(Opcode::RETURN, 0, 1, 0).into();
    out.extend_from_slice(&ret.to_ne_bytes());

    int16(&mut out, 0);
    int16(&mut out, 0);
    int16(&mut out, 0);
    int16(&mut out, 0);
    int16(&mut out, 0);
    int16(&mut out, 0);

    let chunk = load(&out).expect("narrow-int chunk");

    assert_eq!(chunk.arch.int_width(), 2);
    assert_eq!(chunk.protos[chunk.main].code.len(), 1);
}

#[test]
fn root_upvalue_count_mismatch_is_corrupt() {
    let root = ProtoBuilder::new().op(ret0()).upvalue(true, 0);
    let bytes = ChunkBuilder::new(root).upvalues(3).build();

    let chunk = load(&bytes).expect("parses fine");
    let mut vm = Interpreter::new();

    assert_eq!(
        vm.load_chunk(chunk),
        Err(VmError::Load(LoadError::Corrupt("root upvalue count")))
    );
}
