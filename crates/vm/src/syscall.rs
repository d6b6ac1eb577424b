//! Syscall dispatch for the `SYS` opcode.

use crate::context::Context;
use std::io::{self, Read, Stdin, Stdout, Write};
use tracing::warn;
use zzvm_core::Register;

/// `RA` value requesting a one-byte read.
pub const SYS_READ: u16 = 0;
/// `RA` value requesting a one-byte write of the low byte of `R1`.
pub const SYS_WRITE: u16 = 1;
/// Result reported when the host read or write fails.
pub const SYS_FAILED: u16 = 0xFFFF;

/// Handles `SYS`. The return value is stored in `RA`.
pub trait SyscallHandler {
    fn syscall(&mut self, ctx: &mut Context) -> u16;
}

impl<F> SyscallHandler for F
where
    F: FnMut(&mut Context) -> u16,
{
    fn syscall(&mut self, ctx: &mut Context) -> u16 {
        self(ctx)
    }
}

/// Default handler: byte-wise read/write over a reader and a writer.
///
/// Any syscall number other than [`SYS_READ`] and [`SYS_WRITE`] returns 0.
pub struct IoSyscall<R, W> {
    input: R,
    output: W,
}

impl IoSyscall<Stdin, Stdout> {
    /// Read from standard input, write to standard output.
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> IoSyscall<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }

    fn read_byte(&mut self) -> u16 {
        let mut byte = [0u8; 1];
        match self.input.read(&mut byte) {
            Ok(1) => byte[0] as u16,
            Ok(_) => SYS_FAILED,
            Err(e) => {
                warn!("syscall read failed: {}", e);
                SYS_FAILED
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> u16 {
        let result = self
            .output
            .write_all(&[byte])
            .and_then(|_| self.output.flush());
        match result {
            Ok(()) => 0,
            Err(e) => {
                warn!("syscall write failed: {}", e);
                SYS_FAILED
            }
        }
    }
}

impl<R: Read, W: Write> SyscallHandler for IoSyscall<R, W> {
    fn syscall(&mut self, ctx: &mut Context) -> u16 {
        match ctx.reg(Register::RA) {
            SYS_READ => self.read_byte(),
            SYS_WRITE => {
                let byte = ctx.reg(Register::R1) as u8;
                self.write_byte(byte)
            }
            _ => 0,
        }
    }
}
