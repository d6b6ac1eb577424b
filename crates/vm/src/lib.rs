//! Execution engine for zzvm.
//!
//! - [`Vm`]: registers, 64KiB memory and the fetch/decode/execute loop
//! - [`disasm`]: instruction rendering shared with tracing
//! - [`loader`]: copying decoded images into a VM
//! - [`syscall`]: the `SYS` handler interface and the stdio default

pub mod context;
pub mod disasm;
pub mod executor;
pub mod loader;
pub mod memory;
pub mod rng;
pub mod syscall;
pub mod tracer;

pub use context::{Context, ContextSnapshot, STACK_DUMP_WORDS};
pub use disasm::{disassemble, disassemble_range, DisasmError, PLACEHOLDER};
pub use executor::{StopReason, Vm, VmConfig, VmError, VmState, DEFAULT_STACK_POINTER};
pub use loader::LoadError;
pub use syscall::{IoSyscall, SyscallHandler};
pub use tracer::{TraceStep, Tracer, DEFAULT_TRACE_CAPACITY};
