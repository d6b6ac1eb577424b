//! Loading images into a VM.

use crate::executor::{Vm, VmError};
use crate::memory::Memory;
use std::io::Read;
use thiserror::Error;
use tracing::{debug, info};
use zzvm_core::{Image, ImageError, Register};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("VM error: {0}")]
    Vm(#[from] VmError),
}

impl Vm {
    /// Copy every section of `image` into memory and set IP to its entry.
    ///
    /// All sections are range-checked first, so a rejected image leaves
    /// memory untouched.
    pub fn load_image(&mut self, image: &Image) -> Result<(), VmError> {
        for section in &image.sections {
            Memory::check_range(section.address, section.data.len())?;
        }

        let memory = self.memory_mut()?;
        for section in &image.sections {
            memory.write(section.address, &section.data)?;
            debug!(
                "loaded section at 0x{:04x}, {} bytes",
                section.address,
                section.data.len()
            );
        }

        self.set_register(Register::IP, image.entry)?;
        info!(
            "image loaded: {} sections, entry 0x{:04x}",
            image.sections.len(),
            image.entry
        );
        Ok(())
    }

    /// Decode a bit-encoded image from `reader` and load it. Returns the entry address.
    pub fn load_image_from<R: Read>(&mut self, reader: R) -> Result<u16, LoadError> {
        let image = Image::read_from(reader)?;
        self.load_image(&image)?;
        Ok(image.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{StopReason, VmConfig};
    use std::io::Cursor;
    use zzvm_core::{zzcode, Opcode, RawInstruction, Section};

    fn movi_hlt_image() -> Image {
        let mut image = Image::new(0x4000);
        let mut code = RawInstruction::new(Opcode::MOVI, Register::R1, Register::RA, 0x1234)
            .to_bytes()
            .to_vec();
        code.extend_from_slice(
            &RawInstruction::new(Opcode::HLT, Register::RA, Register::RA, 0).to_bytes(),
        );
        image.add_section(0x4000, code).unwrap();
        image
    }

    #[test]
    fn test_load_and_run() {
        let encoded = movi_hlt_image().encode().unwrap();
        let mut vm = Vm::with_config(VmConfig::with_seed(1));
        assert_eq!(vm.load_image_from(Cursor::new(encoded)).unwrap(), 0x4000);
        assert_eq!(vm.register(Register::IP).unwrap(), 0x4000);
        assert_eq!(vm.run(), Ok(StopReason::Halt));
        assert_eq!(vm.register(Register::R1).unwrap(), 0x1234);
    }

    #[test]
    fn test_rejected_section_leaves_memory() {
        let image = Image {
            entry: 0x1000,
            sections: vec![
                Section::new(0x1000, vec![0xAA; 4]),
                Section::new(0xFFFE, vec![0xBB; 2]),
            ],
        };
        let mut vm = Vm::new();
        assert!(matches!(
            vm.load_image(&image),
            Err(VmError::OutOfBounds { address: 0xFFFE, .. })
        ));
        assert_eq!(vm.read_mem(0x1000, 4).unwrap(), vec![0; 4]);
        assert_eq!(vm.register(Register::IP).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_stream() {
        let mut encoded = movi_hlt_image().encode().unwrap();
        let last = encoded.len() - 1;
        encoded[last] = b'x';

        let mut vm = Vm::new();
        let err = vm.load_image_from(Cursor::new(encoded)).unwrap_err();
        assert!(matches!(err, LoadError::Image(ImageError::Codec(_))));
        assert_eq!(vm.read_mem(0x4000, 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_truncated_stream() {
        let encoded = movi_hlt_image().encode().unwrap();
        let cut = &encoded[..encoded.len() - zzcode::BITS_PER_BYTE];

        let mut vm = Vm::new();
        let err = vm.load_image_from(Cursor::new(cut)).unwrap_err();
        assert!(matches!(err, LoadError::Image(ImageError::Truncated(_))));
    }

    #[test]
    fn test_freed_vm_rejects_load() {
        let mut vm = Vm::new();
        vm.destroy().unwrap();
        let err = vm.load_image(&movi_hlt_image()).unwrap_err();
        assert!(matches!(err, VmError::InvalidState(_)));
    }
}
