pub mod calls;
pub mod runtime_error;
pub mod stdlib;
pub mod vm;

pub use runtime_error::VmError;
pub use stdlib::{SharedOutput, SplitMix64};
pub use vm::{ExternCall, Vm, VmBuilder, VmConfig, VmState};
