//! VM execution loop.

use crate::{
    context::{Context, ContextSnapshot},
    disasm,
    memory::Memory,
    rng::entropy_seed,
    syscall::{IoSyscall, SyscallHandler},
    tracer::{TraceStep, Tracer},
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn, Level};
use zzvm_core::{
    encode_program, Instruction, InstructionError, Opcode, RawInstruction, Register,
    INSTRUCTION_SIZE, MEM_LIMIT,
};

/// Initial stack pointer of a fresh VM.
pub const DEFAULT_STACK_POINTER: u16 = 0xFFF0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Out of bounds: address 0x{address:04x}, length {length}")]
    OutOfBounds { address: u16, length: usize },

    #[error("Invalid register: {0}")]
    InvalidRegister(u8),

    #[error("Invalid instruction: 0x{0:02X}")]
    InvalidInstruction(u8),

    #[error("Invalid state: VM is {0}")]
    InvalidState(VmState),
}

impl VmError {
    /// Stop reason reported for this fault. API misuse has none.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            VmError::OutOfBounds { .. } => Some(StopReason::OutOfBounds),
            VmError::InvalidRegister(_) => Some(StopReason::InvalidRegister),
            VmError::InvalidInstruction(_) => Some(StopReason::InvalidInstruction),
            VmError::InvalidState(_) => None,
        }
    }
}

impl From<InstructionError> for VmError {
    fn from(err: InstructionError) -> Self {
        match err {
            InstructionError::InvalidRegister(index) => VmError::InvalidRegister(index),
            InstructionError::UnknownOpcode(byte) => VmError::InvalidInstruction(byte),
        }
    }
}

/// Why `execute` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The instruction budget ran out.
    Completed,
    Halt,
    OutOfBounds,
    InvalidRegister,
    InvalidInstruction,
}

impl StopReason {
    /// Numeric status code. Zero is success, `Halt` and faults are negative.
    pub fn code(self) -> i32 {
        match self {
            StopReason::Completed => 0,
            StopReason::OutOfBounds => -1,
            StopReason::InvalidRegister => -2,
            StopReason::InvalidInstruction => -3,
            StopReason::Halt => -4,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, StopReason::Completed | StopReason::Halt)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopReason::Completed => "completed",
            StopReason::Halt => "halt",
            StopReason::OutOfBounds => "out of bounds",
            StopReason::InvalidRegister => "invalid register",
            StopReason::InvalidInstruction => "invalid instruction",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a VM handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VmState {
    /// Idle. Memory access, code loading and execution are allowed.
    Sleeping,
    /// Inside `execute`.
    Executing,
    /// Destroyed. Every further call fails.
    Freed,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VmState::Sleeping => "sleeping",
            VmState::Executing => "executing",
            VmState::Freed => "freed",
        };
        f.write_str(name)
    }
}

/// Construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub stack_pointer: u16,
    /// Fixed PRNG seed. `None` seeds from the environment.
    pub seed: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_pointer: DEFAULT_STACK_POINTER,
            seed: None,
        }
    }
}

impl VmConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// What the loop does with IP after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Advance IP by one instruction.
    Next,
    /// IP was set explicitly, leave it alone.
    Jumped,
    Halt,
}

/// The virtual machine.
pub struct Vm {
    state: VmState,
    ctx: Context,
    syscall: Box<dyn SyscallHandler>,
    tracer: Tracer,
}

impl Vm {
    /// Create a VM with the default stack pointer and an entropy seed.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let seed = config.seed.unwrap_or_else(entropy_seed);
        let mut ctx = Context::new(seed);
        ctx.set_reg(Register::SP, config.stack_pointer);
        debug!("created VM, SP=0x{:04x}", config.stack_pointer);

        Self {
            state: VmState::Sleeping,
            ctx,
            syscall: Box::new(IoSyscall::stdio()),
            tracer: Tracer::new(false),
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    /// Release the VM. Memory is zeroed and the handle stays `Freed`.
    pub fn destroy(&mut self) -> Result<(), VmError> {
        match self.state {
            VmState::Sleeping => {
                self.ctx.memory.clear();
                self.ctx.registers.clear();
                self.tracer.clear();
                self.state = VmState::Freed;
                debug!("VM destroyed");
                Ok(())
            }
            state => {
                error!("destroy called on a {} VM", state);
                Err(VmError::InvalidState(state))
            }
        }
    }

    fn ensure_sleeping(&self) -> Result<(), VmError> {
        match self.state {
            VmState::Sleeping => Ok(()),
            state => Err(VmError::InvalidState(state)),
        }
    }

    fn ensure_alive(&self) -> Result<(), VmError> {
        match self.state {
            VmState::Freed => Err(VmError::InvalidState(VmState::Freed)),
            _ => Ok(()),
        }
    }

    /// Copy `data` into memory at `address`.
    pub fn write_mem(&mut self, address: u16, data: &[u8]) -> Result<(), VmError> {
        self.ensure_sleeping()?;
        self.ctx.memory.write(address, data)
    }

    /// Read `length` bytes starting at `address`.
    pub fn read_mem(&self, address: u16, length: usize) -> Result<Vec<u8>, VmError> {
        self.ensure_sleeping()?;
        Ok(self.ctx.memory.read(address, length)?.to_vec())
    }

    /// Copy instructions into memory and point IP at the first one.
    pub fn put_code(&mut self, address: u16, code: &[RawInstruction]) -> Result<(), VmError> {
        self.ensure_sleeping()?;
        let bytes = encode_program(code);
        self.ctx.memory.write(address, &bytes)?;
        self.ctx.set_reg(Register::IP, address);
        Ok(())
    }

    pub fn register(&self, r: Register) -> Result<u16, VmError> {
        self.ensure_alive()?;
        Ok(self.ctx.reg(r))
    }

    pub fn set_register(&mut self, r: Register, value: u16) -> Result<(), VmError> {
        self.ensure_sleeping()?;
        self.ctx.set_reg(r, value);
        Ok(())
    }

    /// Replace the handler invoked by `SYS`.
    pub fn set_syscall_handler<H>(&mut self, handler: H) -> Result<(), VmError>
    where
        H: SyscallHandler + 'static,
    {
        self.ensure_sleeping()?;
        self.syscall = Box::new(handler);
        Ok(())
    }

    /// Record every executed instruction. The recorder keeps the most recent
    /// [`DEFAULT_TRACE_CAPACITY`](crate::tracer::DEFAULT_TRACE_CAPACITY) steps;
    /// drain it with [`Vm::take_trace`] to see all of them.
    pub fn enable_trace(&mut self, enabled: bool) {
        self.tracer.set_enabled(enabled);
    }

    pub fn trace(&self) -> &[TraceStep] {
        self.tracer.steps()
    }

    pub fn take_trace(&mut self) -> Vec<TraceStep> {
        self.tracer.take()
    }

    pub fn snapshot(&self) -> Result<ContextSnapshot, VmError> {
        self.ensure_alive()?;
        Ok(self.ctx.snapshot())
    }

    /// Registers and the stack window as text.
    pub fn dump_context(&self) -> Result<String, VmError> {
        Ok(self.snapshot()?.to_string())
    }

    pub(crate) fn memory_mut(&mut self) -> Result<&mut Memory, VmError> {
        self.ensure_sleeping()?;
        Ok(&mut self.ctx.memory)
    }

    /// Run up to `count` instructions. A negative count runs until halt or fault.
    ///
    /// Faults abort the run and leave IP on the faulting instruction.
    pub fn execute(&mut self, count: i64) -> Result<StopReason, VmError> {
        self.ensure_sleeping()?;

        self.state = VmState::Executing;
        let result = self.run_loop(count);
        self.state = VmState::Sleeping;

        match &result {
            Ok(StopReason::Halt) => info!("halted at 0x{:04x}", self.ctx.registers.ip()),
            Ok(_) => {}
            Err(e) => warn!("execution stopped at 0x{:04x}: {}", self.ctx.registers.ip(), e),
        }
        result
    }

    /// Execute exactly one instruction.
    pub fn step(&mut self) -> Result<StopReason, VmError> {
        self.execute(1)
    }

    /// Execute until halt or fault.
    pub fn run(&mut self) -> Result<StopReason, VmError> {
        self.execute(-1)
    }

    fn run_loop(&mut self, count: i64) -> Result<StopReason, VmError> {
        let mut remaining = count;
        loop {
            if remaining == 0 {
                return Ok(StopReason::Completed);
            }
            if remaining > 0 {
                remaining -= 1;
            }

            if self.cycle()? == Flow::Halt {
                return Ok(StopReason::Halt);
            }
        }
    }

    /// One fetch, decode, execute cycle.
    fn cycle(&mut self) -> Result<Flow, VmError> {
        let ip = self.ctx.registers.ip();
        if ip as usize > MEM_LIMIT - INSTRUCTION_SIZE {
            return Err(VmError::OutOfBounds {
                address: ip,
                length: INSTRUCTION_SIZE,
            });
        }

        let raw = self.ctx.memory.fetch(ip);
        let recording = self.tracer.is_enabled() || tracing::enabled!(Level::TRACE);
        let text = if recording {
            let text = disasm::disassemble(ip, raw).unwrap_or_else(|_| disasm::PLACEHOLDER.into());
            trace!("{:04x}: {}", ip, text);
            Some(text)
        } else {
            None
        };

        let ins = Instruction::decode(raw)?;
        let flow = self.dispatch(ins);

        if flow == Flow::Next {
            let next = self.ctx.registers.ip().wrapping_add(INSTRUCTION_SIZE as u16);
            self.ctx.set_reg(Register::IP, next);
        }

        if let Some(text) = text {
            self.tracer.record(TraceStep {
                ip,
                instruction: raw,
                text,
                registers: *self.ctx.registers.values(),
            });
        }

        Ok(flow)
    }

    fn dispatch(&mut self, ins: Instruction) -> Flow {
        let Vm { ctx, syscall, .. } = self;
        let Instruction { opcode, dst, src, imm } = ins;
        let d = ctx.reg(dst);
        let a = ctx.reg(src);
        let b = ctx.reg(ins.third());

        match opcode {
            Opcode::NOP => {}
            Opcode::NEG => ctx.set_reg(dst, a.wrapping_neg()),
            Opcode::ADDR => ctx.set_reg(dst, a.wrapping_add(b)),
            Opcode::ADDI => ctx.set_reg(dst, a.wrapping_add(imm)),
            Opcode::MULR => ctx.set_reg(dst, a.wrapping_mul(b)),
            Opcode::MULI => ctx.set_reg(dst, a.wrapping_mul(imm)),
            Opcode::ANDR => ctx.set_reg(dst, a & b),
            Opcode::ANDI => ctx.set_reg(dst, a & imm),
            Opcode::ORR => ctx.set_reg(dst, a | b),
            Opcode::ORI => ctx.set_reg(dst, a | imm),
            Opcode::XORR => ctx.set_reg(dst, a ^ b),
            Opcode::XORI => ctx.set_reg(dst, a ^ imm),
            Opcode::SHRR => ctx.set_reg(dst, shift(a, b)),
            Opcode::SHRI => ctx.set_reg(dst, shift(a, imm)),
            Opcode::NOT => ctx.set_reg(dst, !a),

            Opcode::LD => {
                let value = ctx.memory.load16(a.wrapping_add(imm));
                ctx.set_reg(dst, value);
            }
            Opcode::ST => ctx.memory.store16(a.wrapping_add(imm), d),

            Opcode::HLT => return Flow::Halt,

            Opcode::MOVR => ctx.set_reg(dst, a),
            Opcode::MOVI => ctx.set_reg(dst, imm),

            Opcode::JEI => branch_if(ctx, d == a, imm),
            Opcode::JNI => branch_if(ctx, d != a, imm),
            Opcode::JGI => branch_if(ctx, d > a, imm),
            Opcode::JZI => branch_if(ctx, d == 0, imm),

            Opcode::CALL => {
                let ret = ctx.registers.ip().wrapping_add(INSTRUCTION_SIZE as u16);
                ctx.push(ret);
                branch_if(ctx, true, imm);
            }
            Opcode::RET => {
                let target = ctx.pop();
                ctx.set_reg(Register::IP, target);
                return Flow::Jumped;
            }

            // SP operands see the stack pointer as it is at that point of the update.
            Opcode::POP => {
                let value = ctx.memory.load16(ctx.registers.sp());
                ctx.set_reg(dst, value);
                let sp = ctx.registers.sp().wrapping_add(2);
                ctx.set_reg(Register::SP, sp);
            }
            Opcode::PUSH => {
                let sp = ctx.registers.sp().wrapping_sub(2);
                ctx.set_reg(Register::SP, sp);
                let value = ctx.reg(dst);
                ctx.memory.store16(sp, value);
            }
            Opcode::PUSI => ctx.push(imm),

            Opcode::SYS => {
                let result = syscall.syscall(ctx);
                ctx.set_reg(Register::RA, result);
            }
            Opcode::RAND => {
                let value = ctx.next_random() as u16;
                ctx.set_reg(Register::RA, value);
            }
        }

        Flow::Next
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit 3 of `amount` selects a left shift, the low three bits give the distance.
fn shift(value: u16, amount: u16) -> u16 {
    let distance = amount & 7;
    if amount & 8 != 0 {
        value << distance
    } else {
        value >> distance
    }
}

/// Add `imm` to IP when `taken`. The loop's trailing increment still follows.
fn branch_if(ctx: &mut Context, taken: bool, imm: u16) {
    if taken {
        let ip = ctx.registers.ip().wrapping_add(imm);
        ctx.set_reg(Register::IP, ip);
    }
}
