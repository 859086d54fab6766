//! VM parameters and chunk format constants

/* CHUNK FORMAT */

/// Leading bytes of every binary chunk.
pub const CHUNK_SIGNATURE: [u8; 4] = [0x1b, b'L', b'u', b'a'];

/// Supported bytecode version (`5.3`).
pub const CHUNK_VERSION: u8 = 0x53;

/// Supported chunk format tag.
pub const CHUNK_FORMAT: u8 = 0;

/// Conversion-damage detection constant following the format tag.
pub const CHUNK_DATA: [u8; 6] = [0x19, 0x93, b'\r', b'\n', 0x1a, b'\n'];

/// Integer sentinel used to infer the chunk's byte order.
pub const CHUNK_INT_SENTINEL: i64 = 0x5678;

/// Floating sentinel validating the chunk's number encoding.
pub const CHUNK_NUM_SENTINEL: f64 = 370.5;

/// Widest numeric encoding the reader can assemble, in bytes.
pub const MAX_NUMERIC_WIDTH: u8 = 8;

/* CALL PROTOCOL */

/// Result count requesting all results a callee produces.
pub const MULTIRET: i32 = -1;

/// Keys flushed per `SETLIST` batch.
pub const FIELDS_PER_FLUSH: usize = 50;

/* RESOURCE BOUNDS */

/// Maximum register stack size, in values.
pub const VM_MAX_STACK: usize = 65536;

/// Maximum number of simultaneously active call frames.
pub const VM_MAX_CALL_DEPTH: usize = 128;

/// Extra slots guaranteed past a frame's declared registers for call setup.
pub const VM_EXTRA_STACK: usize = 8;
