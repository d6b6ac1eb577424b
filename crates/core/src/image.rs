//! Executable image format.
//!
//! An image is a header, a section table and the section bodies, all
//! little-endian and all bit-letter encoded (see [`crate::zzcode`]):
//!
//! ```text
//! [magic u16][version u16][entry u16][section_count u16]
//! [address u16][length u16] * section_count
//! [section bytes] * section_count
//! ```

use crate::zzcode::{self, CodecError, BITS_PER_BYTE};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use thiserror::Error;

/// `"Zz"` read as a little-endian u16.
pub const IMAGE_MAGIC: u16 = 0x7a5a;
pub const IMAGE_VERSION: u16 = 0;

/// Size of the addressable memory.
pub const MEM_LIMIT: usize = 0x10000;

/// Decoded sizes of the fixed records.
pub const HEADER_SIZE: usize = 8;
pub const SECTION_HEADER_SIZE: usize = 4;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed image: {0}")]
    Codec(#[from] CodecError),

    #[error("image ended unexpectedly while reading {0}")]
    Truncated(&'static str),

    #[error("invalid image magic 0x{0:04x}")]
    BadMagic(u16),

    #[error("unsupported image version {0}")]
    BadVersion(u16),

    #[error("too many sections: {0} (at most 65535)")]
    TooManySections(usize),

    #[error("section #{index} at 0x{address:04x} with length {length} exceeds memory")]
    SectionOutOfBounds {
        index: usize,
        address: u16,
        length: usize,
    },
}

pub type Result<T> = std::result::Result<T, ImageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHeader {
    pub magic: u16,
    pub version: u16,
    pub entry: u16,
    pub section_count: u16,
}

impl ImageHeader {
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u16::from_le_bytes([bytes[0], bytes[1]]),
            version: u16::from_le_bytes([bytes[2], bytes[3]]),
            entry: u16::from_le_bytes([bytes[4], bytes[5]]),
            section_count: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.magic.to_le_bytes());
        out[2..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..6].copy_from_slice(&self.entry.to_le_bytes());
        out[6..8].copy_from_slice(&self.section_count.to_le_bytes());
        out
    }

    pub fn verify(&self) -> Result<()> {
        if self.magic != IMAGE_MAGIC {
            return Err(ImageError::BadMagic(self.magic));
        }
        if self.version != IMAGE_VERSION {
            return Err(ImageError::BadVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    pub address: u16,
    pub length: u16,
}

impl SectionHeader {
    pub fn from_bytes(bytes: &[u8; SECTION_HEADER_SIZE]) -> Self {
        Self {
            address: u16::from_le_bytes([bytes[0], bytes[1]]),
            length: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; SECTION_HEADER_SIZE] {
        let mut out = [0u8; SECTION_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.address.to_le_bytes());
        out[2..4].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}

/// Check that `length` bytes at `address` stay strictly below the memory limit.
pub fn check_bounds(address: u16, length: usize) -> bool {
    (address as usize)
        .checked_add(length)
        .is_some_and(|end| end < MEM_LIMIT)
}

/// A loadable chunk of memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub address: u16,
    pub data: Vec<u8>,
}

impl Section {
    pub fn new(address: u16, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    pub fn header(&self) -> SectionHeader {
        SectionHeader {
            address: self.address,
            length: self.data.len() as u16,
        }
    }
}

/// A fully decoded image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Image {
    pub entry: u16,
    pub sections: Vec<Section>,
}

impl Image {
    pub fn new(entry: u16) -> Self {
        Self {
            entry,
            sections: Vec::new(),
        }
    }

    /// Append a section after checking it fits in memory.
    pub fn add_section(&mut self, address: u16, data: Vec<u8>) -> Result<()> {
        if !check_bounds(address, data.len()) {
            return Err(ImageError::SectionOutOfBounds {
                index: self.sections.len(),
                address,
                length: data.len(),
            });
        }
        self.sections.push(Section::new(address, data));
        Ok(())
    }

    pub fn header(&self) -> ImageHeader {
        ImageHeader {
            magic: IMAGE_MAGIC,
            version: IMAGE_VERSION,
            entry: self.entry,
            section_count: self.sections.len() as u16,
        }
    }

    /// Check the section count fits the header and every section fits in memory.
    pub fn validate(&self) -> Result<()> {
        if u16::try_from(self.sections.len()).is_err() {
            return Err(ImageError::TooManySections(self.sections.len()));
        }
        for (index, section) in self.sections.iter().enumerate() {
            if !check_bounds(section.address, section.data.len()) {
                return Err(ImageError::SectionOutOfBounds {
                    index,
                    address: section.address,
                    length: section.data.len(),
                });
            }
        }
        Ok(())
    }

    /// Serialize without the bit-letter encoding.
    pub fn to_raw(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut out = Vec::new();
        out.extend_from_slice(&self.header().to_bytes());
        for section in &self.sections {
            out.extend_from_slice(&section.header().to_bytes());
        }
        for section in &self.sections {
            out.extend_from_slice(&section.data);
        }
        Ok(out)
    }

    /// Serialize to the bit-letter encoded file form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(zzcode::encode(&self.to_raw()?))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }

    /// Read and decode an encoded image.
    ///
    /// The whole image is decoded and validated before this returns, so a
    /// caller never sees a partially valid image.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        read_decoded(&mut reader, &mut header_bytes, "header")?;
        let header = ImageHeader::from_bytes(&header_bytes);
        header.verify()?;

        let mut headers = Vec::with_capacity(header.section_count as usize);
        for _ in 0..header.section_count {
            let mut bytes = [0u8; SECTION_HEADER_SIZE];
            read_decoded(&mut reader, &mut bytes, "section table")?;
            headers.push(SectionHeader::from_bytes(&bytes));
        }

        let mut image = Image::new(header.entry);
        for (index, section) in headers.iter().enumerate() {
            let length = section.length as usize;
            if !check_bounds(section.address, length) {
                return Err(ImageError::SectionOutOfBounds {
                    index,
                    address: section.address,
                    length,
                });
            }

            let mut data = vec![0u8; length];
            read_decoded(&mut reader, &mut data, "section data")?;
            image.sections.push(Section::new(section.address, data));
        }

        Ok(image)
    }

    /// Decode an image held in memory.
    pub fn from_encoded(encoded: &[u8]) -> Result<Self> {
        Self::read_from(encoded)
    }
}

/// Read `8 * out.len()` letters and decode them into `out`.
fn read_decoded<R: Read>(reader: &mut R, out: &mut [u8], what: &'static str) -> Result<()> {
    let mut encoded = vec![0u8; out.len() * BITS_PER_BYTE];
    reader.read_exact(&mut encoded).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ImageError::Truncated(what),
        _ => ImageError::Io(e),
    })?;

    for (byte, chunk) in out.iter_mut().zip(encoded.chunks_exact(BITS_PER_BYTE)) {
        *byte = zzcode::decode_byte(chunk)?;
    }
    Ok(())
}
