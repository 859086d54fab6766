//! Utilities for the test suite

/// Builders assembling well-formed binary chunks in the host architecture,
/// so tests can exercise the loader and the interpreter without a compiler.
pub mod test_helpers {
    use crate::arch::ChunkArch;
    use crate::bytecode::{Constant, Instruction};
    use crate::consts::{CHUNK_DATA, CHUNK_FORMAT, CHUNK_INT_SENTINEL, CHUNK_NUM_SENTINEL,
        CHUNK_SIGNATURE, CHUNK_VERSION};

    /// Builder for one function prototype of a synthetic chunk.
    #[derive(Debug, Clone, Default)]
    pub struct ProtoBuilder {
        num_params: u8,
        is_vararg: bool,
        max_stack: u8,
        code: Vec<Instruction>,
        constants: Vec<Constant>,
        upvalues: Vec<(bool, u8)>,
        children: Vec<ProtoBuilder>,
    }

    impl ProtoBuilder {
        /// Start a prototype with a small register window.
        pub fn new() -> Self {
            Self {
                max_stack: 8,
                ..Self::default()
            }
        }

        /// Fixed parameter count.
        pub fn params(mut self, count: u8) -> Self {
            self.num_params = count;
            self
        }

        /// Accept surplus arguments as varargs.
        pub fn vararg(mut self) -> Self {
            self.is_vararg = true;
            self
        }

        /// Register window size.
        pub fn max_stack(mut self, count: u8) -> Self {
            self.max_stack = count;
            self
        }

        /// Append one instruction.
        pub fn op(mut self, instruction: Instruction) -> Self {
            self.code.push(instruction);
            self
        }

        /// Append one constant pool entry.
        pub fn constant(mut self, constant: Constant) -> Self {
            self.constants.push(constant);
            self
        }

        /// Append one upvalue descriptor.
        pub fn upvalue(mut self, in_stack: bool, index: u8) -> Self {
            self.upvalues.push((in_stack, index));
            self
        }

        /// Append one nested prototype.
        pub fn child(mut self, child: ProtoBuilder) -> Self {
            self.children.push(child);
            self
        }

        /// Number of upvalue descriptors added so far.
        pub fn upvalue_count(&self) -> u8 {
            self.upvalues.len() as u8
        }

        fn emit(&self, out: &mut Vec<u8>) {
            write_string(out, b"");
            write_int(out, 0);
            write_int(out, 0);

            out.push(self.num_params);
            out.push(self.is_vararg as u8);
            out.push(self.max_stack);

            write_int(out, self.code.len() as u32);
            for instruction in &self.code {
                out.extend_from_slice(&u32::from(*instruction).to_ne_bytes());
            }

            write_int(out, self.constants.len() as u32);
            for constant in &self.constants {
                match constant {
                    Constant::Nil => out.push(0x00),
                    Constant::Boolean(b) => {
                        out.push(0x01);
                        out.push(*b as u8);
                    }
                    Constant::Number(n) => {
                        out.push(0x03);
                        out.extend_from_slice(&n.to_bits().to_ne_bytes());
                    }
                    Constant::Integer(i) => {
                        out.push(0x13);
                        out.extend_from_slice(&i.to_ne_bytes());
                    }
                    Constant::String(s) => {
                        out.push(0x04);
                        write_string(out, s.as_bytes());
                    }
                }
            }

            write_int(out, self.upvalues.len() as u32);
            for (in_stack, index) in &self.upvalues {
                out.push(*in_stack as u8);
                out.push(*index);
            }

            write_int(out, self.children.len() as u32);
            for child in &self.children {
                child.emit(out);
            }

            // empty debug information
            write_int(out, 0);
            write_int(out, 0);
            write_int(out, 0);
        }
    }

    /// Builder assembling a complete chunk around a root prototype.
    #[derive(Debug, Clone)]
    pub struct ChunkBuilder {
        root: ProtoBuilder,
        num_upvalues: u8,
    }

    impl ChunkBuilder {
        /// Wrap a root prototype; the root closure's upvalue count follows
        /// the root's descriptors.
        pub fn new(root: ProtoBuilder) -> Self {
            let num_upvalues = root.upvalue_count();

            Self { root, num_upvalues }
        }

        /// Override the root closure's upvalue count.
        pub fn upvalues(mut self, count: u8) -> Self {
            self.num_upvalues = count;
            self
        }

        /// Serialise the chunk in the host architecture.
        pub fn build(&self) -> Vec<u8> {
            let mut out = header();

            out.push(self.num_upvalues);
            self.root.emit(&mut out);

            out
        }
    }

    /// Serialise a valid chunk header for the host architecture.
    pub fn header() -> Vec<u8> {
        let arch = ChunkArch::host();
        let mut out = Vec::new();

        out.extend_from_slice(&CHUNK_SIGNATURE);
        out.push(CHUNK_VERSION);
        out.push(CHUNK_FORMAT);
        out.extend_from_slice(&CHUNK_DATA);

        out.push(arch.int_width());
        out.push(arch.size_width());
        out.push(arch.instr_width());
        out.push(arch.lua_int_width());
        out.push(arch.lua_num_width());

        out.extend_from_slice(&CHUNK_INT_SENTINEL.to_ne_bytes());
        out.extend_from_slice(&CHUNK_NUM_SENTINEL.to_bits().to_ne_bytes());

        out
    }

    fn write_int(out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&value.to_ne_bytes());
    }

    fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
        if bytes.is_empty() {
            out.push(0);

            return;
        }

        let stored = bytes.len() as u64 + 1;

        if stored < 0xff {
            out.push(stored as u8);
        } else {
            out.push(0xff);
            out.extend_from_slice(&stored.to_ne_bytes());
        }

        out.extend_from_slice(bytes);
    }
}
