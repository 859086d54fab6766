//! Runtime state representation for the VM

/// Resulting state of one instruction dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteState {
    /// The VM should proceed normally with the execution.
    Proceed,
    /// A script frame was entered or replaced; the loop must re-resolve its
    /// execution context before the next dispatch.
    Reframe,
    /// The current frame returned. When `fresh` is set the frame entered the
    /// loop from the host and the loop must hand control back.
    Return {
        /// The returned frame was the loop's entry frame.
        fresh: bool,
    },
}

impl ExecuteState {
    /// Return true if execution continues inside the same frame.
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl Default for ExecuteState {
    fn default() -> Self {
        Self::Proceed
    }
}
