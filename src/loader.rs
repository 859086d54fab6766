//! Chunk decoding: header validation and prototype tree parsing

use crate::arch::{ChunkArch, Endianness};
use crate::bytecode::{Chunk, Constant, Instruction, ProtoId, Prototype, UpvalueDesc};
use crate::consts::{
    CHUNK_DATA, CHUNK_FORMAT, CHUNK_INT_SENTINEL, CHUNK_NUM_SENTINEL, CHUNK_SIGNATURE,
    CHUNK_VERSION,
};
use crate::error::LoadError;
use crate::reader::ByteReader;

use tracing::debug;

/// Decode a complete binary chunk into its architecture descriptor, root
/// closure upvalue count, and flattened prototype arena.
pub fn load(bytes: &[u8]) -> Result<Chunk, LoadError> {
    let mut reader = ByteReader::new(bytes);

    let arch = load_header(&mut reader)?;
    let num_upvalues = reader.byte()?;

    let mut protos = Vec::new();
    let main = load_prototype(&mut reader, &arch, &mut protos)?;

    debug!(
        protos = protos.len(),
        consumed = reader.offset(),
        "chunk loaded"
    );

    Ok(Chunk {
        arch,
        num_upvalues,
        main,
        protos,
    })
}

/// Validate the fixed header prelude and infer the chunk's architecture.
fn load_header(reader: &mut ByteReader<'_>) -> Result<ChunkArch, LoadError> {
    if reader.block(4)? != CHUNK_SIGNATURE {
        return Err(LoadError::BadSignature);
    }

    let version = reader.byte()?;
    if version != CHUNK_VERSION {
        return Err(LoadError::BadVersion(version));
    }

    let format = reader.byte()?;
    if format != CHUNK_FORMAT {
        return Err(LoadError::BadFormat(format));
    }

    if reader.block(6)? != CHUNK_DATA {
        return Err(LoadError::Corrupt("conversion check bytes"));
    }

    let int_width = reader.byte()?;
    let size_width = reader.byte()?;
    let instr_width = reader.byte()?;
    let lua_int_width = reader.byte()?;
    let lua_num_width = reader.byte()?;

    // Widths are validated before the sentinels are interpreted; the byte
    // order is provisional until the sentinels pick one.
    let provisional = ChunkArch::new(
        Endianness::host(),
        int_width,
        size_width,
        instr_width,
        lua_int_width,
        lua_num_width,
    )?;

    let int_raw = reader.block(provisional.lua_int_width() as usize)?;
    let num_raw = reader.block(provisional.lua_num_width() as usize)?;

    let endianness = [Endianness::host(), Endianness::host().swapped()]
        .into_iter()
        .find(|&order| {
            let int = assemble(int_raw, order);
            let num = f64::from_bits(assemble(num_raw, order));

            int == CHUNK_INT_SENTINEL as u64 && num == CHUNK_NUM_SENTINEL
        })
        .ok_or(LoadError::BadEndianness)?;

    ChunkArch::new(
        endianness,
        int_width,
        size_width,
        instr_width,
        lua_int_width,
        lua_num_width,
    )
}

/// Re-assemble an already-read block under a byte order.
fn assemble(block: &[u8], endianness: Endianness) -> u64 {
    let mut reader = ByteReader::new(block);

    reader
        .unsigned(block.len() as u8, endianness)
        .unwrap_or_default()
}

/// Parse one prototype and, recursively, its children into the arena.
/// Children land at lower ids than their parent.
fn load_prototype(
    reader: &mut ByteReader<'_>,
    arch: &ChunkArch,
    protos: &mut Vec<Prototype>,
) -> Result<ProtoId, LoadError> {
    let source = reader.string(arch)?.into();
    let line_defined = reader.int(arch)?;
    let last_line_defined = reader.int(arch)?;

    let num_params = reader.byte()?;
    let is_vararg = reader.byte()? != 0;
    let max_stack_size = reader.byte()?;

    let mut code = Vec::new();
    for _ in 0..count(reader.int(arch)?)? {
        code.push(Instruction::from(reader.instruction(arch)?));
    }

    let mut constants = Vec::new();
    for _ in 0..count(reader.int(arch)?)? {
        constants.push(load_constant(reader, arch)?);
    }

    let mut upvalues = Vec::new();
    for _ in 0..count(reader.int(arch)?)? {
        let in_stack = reader.byte()? != 0;
        let index = reader.byte()?;

        upvalues.push(UpvalueDesc { in_stack, index });
    }

    let mut children = Vec::new();
    for _ in 0..count(reader.int(arch)?)? {
        children.push(load_prototype(reader, arch, protos)?);
    }

    skip_debug_info(reader, arch)?;

    protos.push(Prototype {
        source,
        line_defined,
        last_line_defined,
        num_params,
        is_vararg,
        max_stack_size,
        code,
        constants,
        upvalues,
        protos: children,
    });

    Ok(protos.len() - 1)
}

/// Decode one constant pool entry. The tag's low nibble selects the type and
/// the high nibble the reference compiler's subtype.
fn load_constant(reader: &mut ByteReader<'_>, arch: &ChunkArch) -> Result<Constant, LoadError> {
    let tag = reader.byte()?;

    let constant = match (tag & 0x0f, tag >> 4) {
        (0x00, 0) => Constant::Nil,
        (0x01, 0) => Constant::Boolean(reader.byte()? != 0),
        (0x03, 0) => Constant::Number(reader.lua_number(arch)?),
        (0x03, 1) => Constant::Integer(reader.lua_integer(arch)?),
        (0x04, _) => Constant::String(reader.string(arch)?.into()),
        _ => return Err(LoadError::Corrupt("constant tag")),
    };

    Ok(constant)
}

/// Consume the debug information block for stream position correctness; the
/// content is discarded.
fn skip_debug_info(reader: &mut ByteReader<'_>, arch: &ChunkArch) -> Result<(), LoadError> {
    for _ in 0..count(reader.int(arch)?)? {
        reader.int(arch)?;
    }

    for _ in 0..count(reader.int(arch)?)? {
        reader.string(arch)?;
        reader.int(arch)?;
        reader.int(arch)?;
    }

    for _ in 0..count(reader.int(arch)?)? {
        reader.string(arch)?;
    }

    Ok(())
}

/// Narrow a decoded element count to the host.
fn count(raw: u64) -> Result<usize, LoadError> {
    usize::try_from(raw).map_err(|_| LoadError::Corrupt("element count"))
}
