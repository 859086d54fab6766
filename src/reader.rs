//! Primitive byte-level chunk decoding

use crate::arch::{ChunkArch, Endianness};
use crate::error::LoadError;

/// Cursor over a chunk byte stream, decoding primitives according to an
/// architecture descriptor.
#[derive(Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap a byte stream starting at its first byte.
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Stream position, in bytes consumed.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Flag whether every byte of the stream was consumed.
    pub const fn is_exhausted(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    /// Read a single byte.
    pub fn byte(&mut self) -> Result<u8, LoadError> {
        let byte = *self.bytes.get(self.offset).ok_or(LoadError::Truncated)?;
        self.offset += 1;

        Ok(byte)
    }

    /// Read a fixed-size block.
    pub fn block(&mut self, len: usize) -> Result<&'a [u8], LoadError> {
        let end = self.offset.checked_add(len).ok_or(LoadError::Truncated)?;
        let block = self.bytes.get(self.offset..end).ok_or(LoadError::Truncated)?;
        self.offset = end;

        Ok(block)
    }

    /// Assemble an unsigned integer of the given width and byte order,
    /// zero-extended to 64 bits.
    pub fn unsigned(&mut self, width: u8, endianness: Endianness) -> Result<u64, LoadError> {
        let block = self.block(width as usize)?;
        let mut buf = [0u8; 8];

        match endianness {
            Endianness::Little => buf[..block.len()].copy_from_slice(block),
            Endianness::Big => {
                for (i, byte) in block.iter().rev().enumerate() {
                    buf[i] = *byte;
                }
            }
        }

        Ok(u64::from_le_bytes(buf))
    }

    /// Read a platform integer.
    pub fn int(&mut self, arch: &ChunkArch) -> Result<u64, LoadError> {
        self.unsigned(arch.int_width(), arch.endianness())
    }

    /// Read a size-typed unsigned integer.
    pub fn size(&mut self, arch: &ChunkArch) -> Result<u64, LoadError> {
        self.unsigned(arch.size_width(), arch.endianness())
    }

    /// Read a language integer.
    pub fn lua_integer(&mut self, arch: &ChunkArch) -> Result<i64, LoadError> {
        self.unsigned(arch.lua_int_width(), arch.endianness())
            .map(|raw| raw as i64)
    }

    /// Read a language number. Only the IEEE-754 double encoding is
    /// representable; the descriptor rejects other widths up front.
    pub fn lua_number(&mut self, arch: &ChunkArch) -> Result<f64, LoadError> {
        if arch.lua_num_width() != 8 {
            return Err(LoadError::UnsupportedWidth(arch.lua_num_width()));
        }

        self.unsigned(8, arch.endianness()).map(f64::from_bits)
    }

    /// Read an instruction word.
    pub fn instruction(&mut self, arch: &ChunkArch) -> Result<u32, LoadError> {
        self.unsigned(arch.instr_width(), arch.endianness())
            .map(|raw| raw as u32)
    }

    /// Read a length-prefixed byte string.
    ///
    /// The prefix is a single byte, or a size-typed integer when that byte is
    /// `0xff`. A zero prefix is the empty string; otherwise the stored length
    /// is one larger than the payload.
    pub fn string(&mut self, arch: &ChunkArch) -> Result<Vec<u8>, LoadError> {
        let prefix = self.byte()?;
        let stored = if prefix == 0xff {
            self.size(arch)?
        } else {
            u64::from(prefix)
        };

        if stored == 0 {
            return Ok(Vec::new());
        }

        let payload = usize::try_from(stored - 1).map_err(|_| LoadError::Truncated)?;

        self.block(payload).map(<[u8]>::to_vec)
    }
}
