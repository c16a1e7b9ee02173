//! Synthetic image builder.
//!
//! Produces small, well-formed PE32 and PE32+ images with an import directory, for tests,
//! benchmarks and fuzz seeds. The produced bytes are valid both in memory layout and in file
//! layout: a single section maps the data region at the same offset in both, so the same bytes
//! can be handed to [`crate::image::MappedImage::new`] or to
//! [`crate::image::MappedImage::from_file_bytes`].
//!
//! # Layout
//!
//! | Offset   | Contents                                                   |
//! |----------|------------------------------------------------------------|
//! | `0x0000` | Base header, `e_lfanew = 0x80`                             |
//! | `0x0080` | Extended header, optional header, section table            |
//! | `0x1000` | Import descriptors, lookup tables, IAT, hint/name records, module names |
//!
//! # Examples
//!
//! ```rust
//! use impscope::{pe::ImageBuilder, ImageMemory};
//!
//! let image = ImageBuilder::pe32_plus()
//!     .image_base(0x1_4000_0000)
//!     .module("KERNEL32.DLL")
//!     .by_name("GetProcAddress")
//!     .by_ordinal(17)
//!     .build();
//! assert_eq!(image.base(), 0x1_4000_0000);
//! ```

use crate::{
    image::{parser::Parser, MappedImage},
    pe::{
        header::{DATA_DIRECTORY_SIZE, E_LFANEW_OFFSET},
        DirectoryKind, ImageKind, DOS_MAGIC, IMPORT_DESCRIPTOR_SIZE, PE_MAGIC,
    },
    Result,
};
use strum::EnumCount;

const NT_HEADERS_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_OFFSET: usize = NT_HEADERS_OFFSET + 4 + 20;
const SECTION_HEADER_SIZE: usize = 40;
const SIZE_OF_HEADERS: u32 = 0x200;
const DATA_RVA: usize = 0x1000;
const SECTION_ALIGNMENT: usize = 0x1000;
const FILE_ALIGNMENT: usize = 0x200;

#[derive(Debug, Clone)]
enum ThunkSpec {
    Name(String),
    Ordinal(u16),
    Raw(u64),
}

#[derive(Debug, Clone)]
struct ModuleSpec {
    name: String,
    thunks: Vec<ThunkSpec>,
    lookup_table: bool,
}

/// Builder for synthetic images with an import directory.
///
/// Thunk methods ([`ImageBuilder::by_name`], [`ImageBuilder::by_ordinal`],
/// [`ImageBuilder::raw_thunk`]) and [`ImageBuilder::without_lookup_table`] apply to the module
/// added last and have no effect before the first [`ImageBuilder::module`].
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    kind: ImageKind,
    image_base: u64,
    entry_point: u32,
    modules: Vec<ModuleSpec>,
    import_directory: bool,
    iat_directory: bool,
    import_directory_rva: Option<u32>,
}

impl ImageBuilder {
    /// Starts a 32-bit image preferring `0x400000`.
    #[must_use]
    pub fn pe32() -> Self {
        Self::new(ImageKind::Pe32, 0x40_0000)
    }

    /// Starts a 64-bit image preferring `0x140000000`.
    #[must_use]
    pub fn pe32_plus() -> Self {
        Self::new(ImageKind::Pe32Plus, 0x1_4000_0000)
    }

    fn new(kind: ImageKind, image_base: u64) -> Self {
        ImageBuilder {
            kind,
            image_base,
            entry_point: 0,
            modules: Vec::new(),
            import_directory: true,
            iat_directory: true,
            import_directory_rva: None,
        }
    }

    /// Sets the preferred base, which is also where [`ImageBuilder::build`] maps the image.
    ///
    /// A 32-bit image keeps the low 32 bits only.
    #[must_use]
    pub fn image_base(mut self, base: u64) -> Self {
        self.image_base = match self.kind {
            ImageKind::Pe32 => base & u64::from(u32::MAX),
            ImageKind::Pe32Plus => base,
        };
        self
    }

    /// Sets the entry point offset.
    #[must_use]
    pub fn entry_point(mut self, offset: u32) -> Self {
        self.entry_point = offset;
        self
    }

    /// Adds an imported module.
    #[must_use]
    pub fn module(mut self, name: &str) -> Self {
        self.modules.push(ModuleSpec {
            name: name.to_string(),
            thunks: Vec::new(),
            lookup_table: true,
        });
        self
    }

    /// Imports `symbol` by name from the last module.
    #[must_use]
    pub fn by_name(self, symbol: &str) -> Self {
        self.thunk(ThunkSpec::Name(symbol.to_string()))
    }

    /// Imports `ordinal` from the last module.
    #[must_use]
    pub fn by_ordinal(self, ordinal: u16) -> Self {
        self.thunk(ThunkSpec::Ordinal(ordinal))
    }

    /// Appends a raw lookup table word to the last module, truncated to the thunk width.
    ///
    /// A zero word terminates the table early.
    #[must_use]
    pub fn raw_thunk(self, raw: u64) -> Self {
        self.thunk(ThunkSpec::Raw(raw))
    }

    /// Stores a zero `OriginalFirstThunk` for the last module. Its thunks still land in the IAT.
    #[must_use]
    pub fn without_lookup_table(mut self) -> Self {
        if let Some(module) = self.modules.last_mut() {
            module.lookup_table = false;
        }
        self
    }

    /// Leaves the import directory slot zeroed.
    #[must_use]
    pub fn without_import_directory(mut self) -> Self {
        self.import_directory = false;
        self
    }

    /// Leaves the IAT directory slot zeroed.
    #[must_use]
    pub fn without_iat_directory(mut self) -> Self {
        self.iat_directory = false;
        self
    }

    /// Points the import directory slot at `rva` instead of the generated descriptors.
    #[must_use]
    pub fn import_directory_rva(mut self, rva: u32) -> Self {
        self.import_directory_rva = Some(rva);
        self
    }

    fn thunk(mut self, thunk: ThunkSpec) -> Self {
        if let Some(module) = self.modules.last_mut() {
            module.thunks.push(thunk);
        }
        self
    }

    /// Builds the image and maps it at its preferred base.
    #[must_use]
    pub fn build(&self) -> MappedImage {
        MappedImage::new(self.image_base, self.to_bytes())
    }

    /// Builds the raw image bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let thunk_size = self.kind.thunk_size();
        let descriptors_len = (self.modules.len() + 1) * IMPORT_DESCRIPTOR_SIZE;

        // Offsets below are relative to DATA_RVA.
        let mut cursor = align(descriptors_len, 8);
        let mut lookup_offsets = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            lookup_offsets.push(cursor);
            cursor += (module.thunks.len() + 1) * thunk_size;
        }

        let iat_start = cursor;
        let mut iat_offsets = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            iat_offsets.push(cursor);
            cursor += (module.thunks.len() + 1) * thunk_size;
        }
        let iat_len = cursor - iat_start;

        let mut thunk_values = Vec::with_capacity(self.modules.len());
        let mut name_offsets = Vec::with_capacity(self.modules.len());
        let mut strings: Vec<(usize, Vec<u8>)> = Vec::new();
        for module in &self.modules {
            let mut values = Vec::with_capacity(module.thunks.len());
            for thunk in &module.thunks {
                let value = match thunk {
                    ThunkSpec::Ordinal(ordinal) => self.kind.ordinal_flag() | u64::from(*ordinal),
                    ThunkSpec::Raw(raw) => *raw,
                    ThunkSpec::Name(symbol) => {
                        cursor = align(cursor, 2);
                        let mut record = vec![0u8; 2];
                        record.extend_from_slice(symbol.as_bytes());
                        record.push(0);
                        let offset = cursor;
                        cursor += record.len();
                        strings.push((offset, record));
                        (DATA_RVA + offset) as u64
                    }
                };
                values.push(value);
            }
            thunk_values.push(values);

            let mut name = module.name.as_bytes().to_vec();
            name.push(0);
            name_offsets.push(cursor);
            strings.push((cursor, name));
            cursor = align(cursor + module.name.len() + 1, 2);
        }

        let data_len = cursor.max(1);
        let size_of_image = align(DATA_RVA + data_len, SECTION_ALIGNMENT);
        let mut bytes = vec![0u8; size_of_image];

        for (index, module) in self.modules.iter().enumerate() {
            let descriptor = DATA_RVA + index * IMPORT_DESCRIPTOR_SIZE;
            if module.lookup_table {
                put_u32(&mut bytes, descriptor, rva(lookup_offsets[index]));
            }
            put_u32(&mut bytes, descriptor + 12, rva(name_offsets[index]));
            put_u32(&mut bytes, descriptor + 16, rva(iat_offsets[index]));

            for (slot, value) in thunk_values[index].iter().enumerate() {
                let lookup = DATA_RVA + lookup_offsets[index] + slot * thunk_size;
                let iat = DATA_RVA + iat_offsets[index] + slot * thunk_size;
                self.put_thunk(&mut bytes, lookup, *value);
                self.put_thunk(&mut bytes, iat, *value);
            }
        }

        for (offset, string) in &strings {
            let start = DATA_RVA + offset;
            bytes[start..start + string.len()].copy_from_slice(string);
        }

        self.write_headers(&mut bytes, size_of_image, data_len);

        let directories = OPTIONAL_HEADER_OFFSET + self.kind.fixed_optional_size();
        if self.import_directory {
            let slot = directories + DirectoryKind::Import as usize * DATA_DIRECTORY_SIZE;
            let address = self
                .import_directory_rva
                .unwrap_or_else(|| rva(0));
            put_u32(&mut bytes, slot, address);
            put_u32(&mut bytes, slot + 4, descriptors_len as u32);
        }
        if self.iat_directory && iat_len > 0 {
            let slot = directories + DirectoryKind::Iat as usize * DATA_DIRECTORY_SIZE;
            put_u32(&mut bytes, slot, rva(iat_start));
            put_u32(&mut bytes, slot + 4, iat_len as u32);
        }

        bytes
    }

    fn put_thunk(&self, bytes: &mut [u8], offset: usize, value: u64) {
        match self.kind {
            ImageKind::Pe32 => put_u32(bytes, offset, value as u32),
            ImageKind::Pe32Plus => put_u64(bytes, offset, value),
        }
    }

    fn write_headers(&self, bytes: &mut [u8], size_of_image: usize, data_len: usize) {
        put_u16(bytes, 0, DOS_MAGIC);
        put_u32(bytes, E_LFANEW_OFFSET as usize, NT_HEADERS_OFFSET as u32);

        let fixed_size = self.kind.fixed_optional_size();
        let optional_size = fixed_size + DirectoryKind::COUNT * DATA_DIRECTORY_SIZE;
        let (machine, characteristics) = match self.kind {
            ImageKind::Pe32 => (goblin::pe::header::COFF_MACHINE_X86, 0x0102),
            ImageKind::Pe32Plus => (goblin::pe::header::COFF_MACHINE_X86_64, 0x0022),
        };

        put_u32(bytes, NT_HEADERS_OFFSET, PE_MAGIC);
        let coff = NT_HEADERS_OFFSET + 4;
        put_u16(bytes, coff, machine);
        put_u16(bytes, coff + 2, 1);
        put_u16(bytes, coff + 16, optional_size as u16);
        put_u16(bytes, coff + 18, characteristics);

        let opt = OPTIONAL_HEADER_OFFSET;
        let raw_size = align(data_len, FILE_ALIGNMENT);
        put_u16(bytes, opt, self.kind.magic());
        bytes[opt + 2] = 14;
        put_u32(bytes, opt + 8, raw_size as u32);
        put_u32(bytes, opt + 16, self.entry_point);
        put_u32(bytes, opt + 20, DATA_RVA as u32);
        match self.kind {
            ImageKind::Pe32 => {
                put_u32(bytes, opt + 24, DATA_RVA as u32);
                put_u32(bytes, opt + 28, self.image_base as u32);
            }
            ImageKind::Pe32Plus => put_u64(bytes, opt + 24, self.image_base),
        }
        put_u32(bytes, opt + 32, SECTION_ALIGNMENT as u32);
        put_u32(bytes, opt + 36, FILE_ALIGNMENT as u32);
        put_u16(bytes, opt + 40, 6);
        put_u16(bytes, opt + 48, 6);
        put_u32(bytes, opt + 56, size_of_image as u32);
        put_u32(bytes, opt + 60, SIZE_OF_HEADERS);
        put_u16(bytes, opt + 68, 3);
        match self.kind {
            ImageKind::Pe32 => {
                put_u16(bytes, opt + 70, 0x8140);
                put_u32(bytes, opt + 72, 0x10_0000);
                put_u32(bytes, opt + 76, 0x1000);
                put_u32(bytes, opt + 80, 0x10_0000);
                put_u32(bytes, opt + 84, 0x1000);
            }
            ImageKind::Pe32Plus => {
                put_u16(bytes, opt + 70, 0x8160);
                put_u64(bytes, opt + 72, 0x10_0000);
                put_u64(bytes, opt + 80, 0x1000);
                put_u64(bytes, opt + 88, 0x10_0000);
                put_u64(bytes, opt + 96, 0x1000);
            }
        }
        put_u32(bytes, opt + fixed_size - 4, DirectoryKind::COUNT as u32);

        let section = opt + optional_size;
        bytes[section..section + 6].copy_from_slice(b".idata");
        put_u32(bytes, section + 8, data_len as u32);
        put_u32(bytes, section + 12, DATA_RVA as u32);
        put_u32(bytes, section + 16, raw_size as u32);
        put_u32(bytes, section + 20, DATA_RVA as u32);
        put_u32(bytes, section + 36, 0xC000_0040);
        debug_assert!(section + SECTION_HEADER_SIZE <= SIZE_OF_HEADERS as usize);
    }

    /// Rewrites the preferred base stored in the optional header of `bytes`.
    ///
    /// Used to build an image whose preferred base equals the address its buffer ended up at.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is too short to hold the header chain, or
    /// [`crate::Error::MalformedHeader`] if the optional header magic is unknown.
    pub fn patch_image_base(bytes: &mut [u8], base: u64) -> Result<()> {
        let mut parser = Parser::new(bytes);
        parser.seek(E_LFANEW_OFFSET as usize)?;
        let optional = parser.read_le::<u32>()? as usize + 24;
        parser.seek(optional)?;
        let magic = parser.read_le::<u16>()?;

        match ImageKind::from_magic(magic) {
            Some(ImageKind::Pe32) => {
                let Ok(base) = u32::try_from(base) else {
                    return Err(malformed_error!("Base 0x{:X} does not fit a PE32 image", base));
                };
                parser.seek(optional + 28)?;
                parser.read_le::<u32>()?;
                put_u32(bytes, optional + 28, base);
            }
            Some(ImageKind::Pe32Plus) => {
                parser.seek(optional + 24)?;
                parser.read_le::<u64>()?;
                put_u64(bytes, optional + 24, base);
            }
            None => {
                return Err(malformed_header!(
                    "Unknown optional header magic 0x{:04X}",
                    magic
                ))
            }
        }

        Ok(())
    }
}

fn align(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn rva(offset: usize) -> u32 {
    (DATA_RVA + offset) as u32
}

fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
