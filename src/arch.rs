//! Architecture descriptor for a binary chunk

use crate::consts::MAX_NUMERIC_WIDTH;
use crate::error::LoadError;

/// Byte order of a chunk's multi-byte encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endianness {
    /// Byte order of the host target.
    pub const fn host() -> Self {
        #[cfg(target_endian = "little")]
        {
            Self::Little
        }
        #[cfg(target_endian = "big")]
        {
            Self::Big
        }
    }

    /// Opposite byte order.
    pub const fn swapped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }
}

/// Widths and byte order of one chunk's numeric encodings.
///
/// Fixed when the header is read and consulted by every subsequent read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChunkArch {
    endianness: Endianness,
    int_width: u8,
    size_width: u8,
    instr_width: u8,
    lua_int_width: u8,
    lua_num_width: u8,
}

impl ChunkArch {
    /// Create a descriptor after validating every width against the host.
    pub fn new(
        endianness: Endianness,
        int_width: u8,
        size_width: u8,
        instr_width: u8,
        lua_int_width: u8,
        lua_num_width: u8,
    ) -> Result<Self, LoadError> {
        for width in [int_width, size_width, lua_int_width] {
            if width == 0 || width > MAX_NUMERIC_WIDTH {
                return Err(LoadError::UnsupportedWidth(width));
            }
        }

        // Instruction words are 32 bits and numbers are IEEE-754 doubles;
        // narrower encodings can't be widened losslessly.
        if instr_width != 4 {
            return Err(LoadError::UnsupportedWidth(instr_width));
        }

        if lua_num_width != 8 {
            return Err(LoadError::UnsupportedWidth(lua_num_width));
        }

        Ok(Self {
            endianness,
            int_width,
            size_width,
            instr_width,
            lua_int_width,
            lua_num_width,
        })
    }

    /// Descriptor matching the host target, as the reference compiler emits
    /// on a 64-bit platform.
    pub const fn host() -> Self {
        Self {
            endianness: Endianness::host(),
            int_width: 4,
            size_width: 8,
            instr_width: 4,
            lua_int_width: 8,
            lua_num_width: 8,
        }
    }

    /// Byte order of the chunk.
    pub const fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Width of the platform integer encoding, in bytes.
    pub const fn int_width(&self) -> u8 {
        self.int_width
    }

    /// Width of the size encoding, in bytes.
    pub const fn size_width(&self) -> u8 {
        self.size_width
    }

    /// Width of an instruction word, in bytes.
    pub const fn instr_width(&self) -> u8 {
        self.instr_width
    }

    /// Width of the language integer encoding, in bytes.
    pub const fn lua_int_width(&self) -> u8 {
        self.lua_int_width
    }

    /// Width of the language number encoding, in bytes.
    pub const fn lua_num_width(&self) -> u8 {
        self.lua_num_width
    }
}

impl Default for ChunkArch {
    fn default() -> Self {
        Self::host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_widths() {
        let arch = ChunkArch::new(Endianness::host(), 16, 8, 4, 8, 8);

        assert_eq!(arch, Err(LoadError::UnsupportedWidth(16)));
    }

    #[test]
    fn rejects_narrow_numbers() {
        let arch = ChunkArch::new(Endianness::host(), 4, 8, 4, 8, 4);

        assert_eq!(arch, Err(LoadError::UnsupportedWidth(4)));
    }

    #[test]
    fn accepts_narrow_integers() {
        let arch = ChunkArch::new(Endianness::host(), 2, 4, 4, 4, 8);

        assert!(arch.is_ok());
    }
}
