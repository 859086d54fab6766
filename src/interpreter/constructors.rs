//! Exposed constructors API for the [`Interpreter`]

use super::Interpreter;
use crate::object::{HeapObject, Pool};
use crate::table::Table;

use std::collections::HashMap;

impl Interpreter {
    /// Create a fresh interpreter with an empty distinguished environment.
    pub fn new() -> Self {
        let mut objects = Pool::new();
        let globals = objects.alloc(HeapObject::Table(Table::new()));

        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            objects,
            upvalues: Pool::new(),
            protos: Vec::new(),
            closure_cache: HashMap::new(),
            globals,
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
