/// Faults raised while executing an executable.
///
/// A fault stops the VM; the same error is returned by every later step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("Instruction pointer out-of-bounds: {ip}")]
    IpOutOfBounds { ip: i32 },

    #[error("Memory position {pos} is out of bounds")]
    MemoryOutOfBounds { pos: i32 },

    #[error("Data position {index} is out of bounds")]
    DataOutOfBounds { index: i64 },

    #[error("Memory position {pos} is in the read-only data segment")]
    DataWrite { pos: i32 },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Attempted to call non-existent extern {name}")]
    UnknownExtern { name: String },

    #[error("extern {name} failed: {message}")]
    Extern { name: String, message: String },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
}

impl VmError {
    /// Error for extern callbacks to report their own failures.
    pub fn extern_failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        VmError::Extern {
            name: name.into(),
            message: message.into(),
        }
    }
}
