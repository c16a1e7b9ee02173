use super::{checked_offset, ImageMemory};
use crate::Result;

/// Image backed by an owned buffer, mapped at a chosen base address.
///
/// The buffer must already be in *memory* layout: headers at offset zero and every section at
/// its relative virtual address. Use [`MappedImage::from_file`] to produce that layout from a
/// PE file on disk, or [`crate::pe::ImageBuilder`] for synthetic images.
#[derive(Debug, Clone)]
pub struct MappedImage {
    base: u64,
    data: Vec<u8>,
}

impl MappedImage {
    /// Create a new mapped image
    ///
    /// ## Arguments
    /// * 'base' - The address the first byte of `data` lives at
    /// * 'data' - The image bytes in memory layout
    #[must_use]
    pub fn new(base: u64, data: Vec<u8>) -> MappedImage {
        MappedImage { base, data }
    }

    /// Returns the same bytes mapped at a different base address.
    ///
    /// Nothing inside the image is relocated; this models a loader placing the image somewhere
    /// other than its preferred base.
    #[must_use]
    pub fn rebased(self, base: u64) -> MappedImage {
        MappedImage { base, ..self }
    }

    /// Returns the raw image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw image bytes for in-place modification.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl ImageMemory for MappedImage {
    fn base(&self) -> u64 {
        self.base
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn slice(&self, address: u64, len: usize) -> Result<&[u8]> {
        let offset = checked_offset(self.base, self.data.len(), address, len)?;
        Ok(&self.data[offset..offset + len])
    }
}
