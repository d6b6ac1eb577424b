//! VM memory model.

use crate::executor::VmError;
use zzvm_core::image::check_bounds;
use zzvm_core::{RawInstruction, Register, INSTRUCTION_SIZE, MEM_LIMIT, NUM_REGISTERS};

/// The register file. All access goes through [`Register`], so there is a
/// single view of the storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    values: [u16; NUM_REGISTERS],
}

impl Registers {
    pub fn new() -> Self {
        Self {
            values: [0; NUM_REGISTERS],
        }
    }

    pub fn get(&self, r: Register) -> u16 {
        self.values[r.index()]
    }

    pub fn set(&mut self, r: Register, value: u16) {
        self.values[r.index()] = value;
    }

    pub fn values(&self) -> &[u16; NUM_REGISTERS] {
        &self.values
    }

    pub fn ip(&self) -> u16 {
        self.get(Register::IP)
    }

    pub fn sp(&self) -> u16 {
        self.get(Register::SP)
    }

    pub fn clear(&mut self) {
        self.values = [0; NUM_REGISTERS];
    }
}

/// Flat 64KiB memory addressed by wrapping 16-bit offsets.
pub struct Memory {
    data: Box<[u8]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MEM_LIMIT].into_boxed_slice(),
        }
    }

    /// Reject ranges that reach or cross the memory limit.
    pub fn check_range(address: u16, length: usize) -> Result<(), VmError> {
        if !check_bounds(address, length) {
            return Err(VmError::OutOfBounds { address, length });
        }
        Ok(())
    }

    pub fn load8(&self, address: u16) -> u8 {
        self.data[address as usize]
    }

    pub fn store8(&mut self, address: u16, value: u8) {
        self.data[address as usize] = value;
    }

    /// Little-endian 16-bit load. The high byte of a word at 0xFFFF wraps to 0x0000.
    pub fn load16(&self, address: u16) -> u16 {
        u16::from_le_bytes([self.load8(address), self.load8(address.wrapping_add(1))])
    }

    pub fn store16(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.store8(address, lo);
        self.store8(address.wrapping_add(1), hi);
    }

    /// Fetch the instruction at `ip`. The caller bounds-checks `ip`.
    pub fn fetch(&self, ip: u16) -> RawInstruction {
        let start = ip as usize;
        let mut bytes = [0u8; INSTRUCTION_SIZE];
        bytes.copy_from_slice(&self.data[start..start + INSTRUCTION_SIZE]);
        RawInstruction::from_bytes(bytes)
    }

    pub fn read(&self, address: u16, length: usize) -> Result<&[u8], VmError> {
        Self::check_range(address, length)?;
        let start = address as usize;
        Ok(&self.data[start..start + length])
    }

    pub fn write(&mut self, address: u16, bytes: &[u8]) -> Result<(), VmError> {
        Self::check_range(address, bytes.len())?;
        let start = address as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
