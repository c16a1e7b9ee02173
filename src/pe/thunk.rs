//! Thunk decoder.
//!
//! A module's lookup table is a zero-terminated array of native-width words. Each non-zero word
//! either carries an ordinal in its low 16 bits (when the top bit is set) or an offset, relative
//! to the preferred base, of a hint/name record: a 2-byte hint followed by a NUL-terminated
//! symbol name.

use std::fmt;

use log::trace;

use crate::{
    config::InspectConfig,
    image::{read_c_string, read_le, ImageMemory},
    pe::{HeaderInfo, ImageKind},
    Error, Result,
};

/// Size of the hint that precedes the name in a hint/name record.
pub const HINT_SIZE: u64 = 2;

/// Classification of one raw lookup table word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thunk {
    /// Import by ordinal, the low 16 bits of the word
    Ordinal(u16),
    /// Import by name, offset of the hint/name record
    HintName(u64),
}

impl Thunk {
    /// Classifies a raw lookup table word for an image of the given kind.
    ///
    /// Returns `None` for the zero word that terminates the table. Only the top bit of the
    /// native width selects the ordinal form: in a 64-bit image, bit 31 is part of the offset.
    #[must_use]
    pub fn classify(raw: u64, kind: ImageKind) -> Option<Thunk> {
        if raw == 0 {
            None
        } else if raw & kind.ordinal_flag() != 0 {
            Some(Thunk::Ordinal((raw & 0xFFFF) as u16))
        } else {
            Some(Thunk::HintName(raw))
        }
    }

    /// Resolves the thunk into an import entry, reading the symbol name if needed.
    ///
    /// # Errors
    /// - [`crate::Error::DanglingPointer`] if the hint/name record lies outside the image
    /// - [`crate::Error::Malformed`] if the name is unterminated within `max_name_len` bytes or
    ///   is not valid UTF-8
    pub fn resolve<M: ImageMemory + ?Sized>(
        self,
        memory: &M,
        header: &HeaderInfo,
        max_name_len: usize,
    ) -> Result<ImportEntry> {
        match self {
            Thunk::Ordinal(ordinal) => Ok(ImportEntry::ByOrdinal(ordinal)),
            Thunk::HintName(offset) => {
                let record = header.preferred_address(offset)?;
                let name_address = record
                    .checked_add(HINT_SIZE)
                    .ok_or(dangling_error!(record, HINT_SIZE as usize))?;
                let name = read_c_string(memory, name_address, max_name_len)?;
                Ok(ImportEntry::ByName(name))
            }
        }
    }
}

/// One imported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportEntry {
    /// Imported by ordinal number
    ByOrdinal(u16),
    /// Imported by symbol name
    ByName(String),
}

impl ImportEntry {
    /// The symbol name, if imported by name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            ImportEntry::ByName(name) => Some(name),
            ImportEntry::ByOrdinal(_) => None,
        }
    }

    /// The ordinal, if imported by ordinal.
    #[must_use]
    pub fn ordinal(&self) -> Option<u16> {
        match self {
            ImportEntry::ByOrdinal(ordinal) => Some(*ordinal),
            ImportEntry::ByName(_) => None,
        }
    }
}

impl fmt::Display for ImportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportEntry::ByOrdinal(ordinal) => write!(f, "#{ordinal}"),
            ImportEntry::ByName(name) => write!(f, "{name}"),
        }
    }
}

/// Iterator over the entries of one lookup table.
///
/// Yields entries in table order until the zero terminator. The first error ends the iteration;
/// so does exceeding [`InspectConfig::max_thunks`], which yields [`crate::Error::IterationLimit`].
pub struct ThunkDecoder<'a, M: ImageMemory + ?Sized> {
    memory: &'a M,
    header: &'a HeaderInfo,
    cursor: Option<u64>,
    decoded: usize,
    max_thunks: usize,
    max_name_len: usize,
}

impl<'a, M: ImageMemory + ?Sized> ThunkDecoder<'a, M> {
    /// Creates a decoder for the lookup table at the absolute address `table`.
    ///
    /// A `None` table decodes to nothing.
    pub fn new(
        memory: &'a M,
        header: &'a HeaderInfo,
        table: Option<u64>,
        config: &InspectConfig,
    ) -> Self {
        ThunkDecoder {
            memory,
            header,
            cursor: table,
            decoded: 0,
            max_thunks: config.max_thunks,
            max_name_len: config.max_name_len,
        }
    }

    fn read_raw(&self, address: u64) -> Result<u64> {
        match self.header.kind {
            ImageKind::Pe32 => Ok(u64::from(read_le::<u32, M>(self.memory, address)?)),
            ImageKind::Pe32Plus => read_le::<u64, M>(self.memory, address),
        }
    }

    fn step(&mut self, address: u64) -> Result<Option<ImportEntry>> {
        let raw = self.read_raw(address)?;
        let Some(thunk) = Thunk::classify(raw, self.header.kind) else {
            return Ok(None);
        };

        if self.decoded >= self.max_thunks {
            return Err(Error::IterationLimit(self.max_thunks));
        }
        self.decoded += 1;

        let size = self.header.kind.thunk_size();
        self.cursor = Some(
            address
                .checked_add(size as u64)
                .ok_or(dangling_error!(address, size))?,
        );

        let entry = thunk.resolve(self.memory, self.header, self.max_name_len)?;
        trace!("Thunk at 0x{:X}: 0x{:X} -> {}", address, raw, entry);
        Ok(Some(entry))
    }
}

impl<M: ImageMemory + ?Sized> Iterator for ThunkDecoder<'_, M> {
    type Item = Result<ImportEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.cursor.take()?;
        match self.step(address) {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(error) => {
                self.cursor = None;
                Some(Err(error))
            }
        }
    }
}

impl<M: ImageMemory + ?Sized> std::iter::FusedIterator for ThunkDecoder<'_, M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::MappedImage,
        pe::{ImageBuilder, ImportWalker},
    };

    fn decode(image: &MappedImage, config: &InspectConfig) -> Vec<Result<ImportEntry>> {
        let header = HeaderInfo::read(image).unwrap();
        let module = ImportWalker::new(image, &header, config)
            .next()
            .unwrap()
            .unwrap();
        ThunkDecoder::new(image, &header, module.lookup_table, config).collect()
    }

    #[test]
    fn classify_pe32() {
        assert_eq!(Thunk::classify(0, ImageKind::Pe32), None);
        assert_eq!(
            Thunk::classify(0x8000_0010, ImageKind::Pe32),
            Some(Thunk::Ordinal(0x10))
        );
        assert_eq!(
            Thunk::classify(0x0000_2040, ImageKind::Pe32),
            Some(Thunk::HintName(0x2040))
        );
    }

    #[test]
    fn classify_pe32plus() {
        assert_eq!(
            Thunk::classify(0x8000_0000_0001_0007, ImageKind::Pe32Plus),
            Some(Thunk::Ordinal(7))
        );
        // Bit 31 is not the ordinal flag of a 64-bit thunk
        assert_eq!(
            Thunk::classify(0x8000_2040, ImageKind::Pe32Plus),
            Some(Thunk::HintName(0x8000_2040))
        );
    }

    #[test]
    fn ordinal_uses_low_16_bits() {
        assert_eq!(
            Thunk::classify(0x8123_4567, ImageKind::Pe32),
            Some(Thunk::Ordinal(0x4567))
        );
    }

    #[test]
    fn decodes_mixed_table() {
        let image = ImageBuilder::pe32()
            .module("KERNEL32.DLL")
            .by_name("Sleep")
            .by_ordinal(42)
            .by_name("ExitProcess")
            .build();

        let entries: Vec<ImportEntry> = decode(&image, &InspectConfig::default())
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            entries,
            vec![
                ImportEntry::ByName("Sleep".to_string()),
                ImportEntry::ByOrdinal(42),
                ImportEntry::ByName("ExitProcess".to_string()),
            ]
        );
        assert_eq!(entries[0].name(), Some("Sleep"));
        assert_eq!(entries[1].ordinal(), Some(42));
        assert_eq!(entries[1].to_string(), "#42");
    }

    #[test]
    fn thunk_limit() {
        let image = ImageBuilder::pe32_plus()
            .module("A.DLL")
            .by_ordinal(1)
            .by_ordinal(2)
            .by_ordinal(3)
            .build();

        let exact = decode(&image, &InspectConfig::default().with_max_thunks(3));
        assert_eq!(exact.len(), 3);
        assert!(exact.iter().all(Result::is_ok));

        let capped = decode(&image, &InspectConfig::default().with_max_thunks(2));
        assert_eq!(capped.len(), 3);
        assert!(matches!(capped[2], Err(Error::IterationLimit(2))));
    }

    #[test]
    fn dangling_name() {
        let image = ImageBuilder::pe32()
            .module("A.DLL")
            .raw_thunk(0x0FFF_0000)
            .by_name("Unreached")
            .build();

        let entries = decode(&image, &InspectConfig::default());
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], Err(Error::DanglingPointer { .. })));
    }

    #[test]
    fn name_too_long() {
        let image = ImageBuilder::pe32()
            .module("A.DLL")
            .by_name("AVeryLongSymbolName")
            .build();

        let entries = decode(&image, &InspectConfig::default().with_max_name_len(8));
        assert!(matches!(entries[0], Err(Error::Malformed { .. })));
    }

    #[test]
    fn empty_table() {
        let image = ImageBuilder::pe32().module("EMPTY.DLL").build();
        assert!(decode(&image, &InspectConfig::default()).is_empty());
    }
}
