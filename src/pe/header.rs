//! Image header reader.
//!
//! Locates and validates the header chain of an image in memory: the base (DOS) header at the
//! image handle, the extended header it points to through `e_lfanew`, and the optional header
//! that carries the preferred base address and the directory table.
//!
//! # Address spaces
//!
//! The header chain itself is read relative to the *runtime* base, which is where the image
//! actually is. The directory entries it yields are relative virtual addresses which the import
//! chain resolves against the *preferred* base recorded in the optional header, see
//! [`HeaderInfo::preferred_address`]. The two are the same for an image that was not relocated.
//!
//! # Examples
//!
//! ```rust
//! use impscope::pe::{DirectoryKind, HeaderInfo, ImageBuilder};
//!
//! let image = ImageBuilder::pe32().module("KERNEL32.DLL").by_name("Sleep").build();
//! let header = HeaderInfo::read(&image)?;
//!
//! assert!(header.directory(DirectoryKind::Import).is_some());
//! assert!(header.directory(DirectoryKind::Export).is_none());
//! # Ok::<(), impscope::Error>(())
//! ```

use std::fmt;

use log::debug;
use strum::{Display, EnumCount, EnumIter, FromRepr, IntoEnumIterator};

use crate::{
    image::{parser::Parser, read_le, ImageMemory},
    Result,
};

/// `MZ`, the magic of the base header.
pub const DOS_MAGIC: u16 = goblin::pe::header::DOS_MAGIC;
/// `PE\0\0`, the magic of the extended header.
pub const PE_MAGIC: u32 = goblin::pe::header::PE_MAGIC;
/// Optional header magic of a 32-bit image.
pub const OPTIONAL_MAGIC_32: u16 = goblin::pe::optional_header::MAGIC_32;
/// Optional header magic of a 64-bit image.
pub const OPTIONAL_MAGIC_64: u16 = goblin::pe::optional_header::MAGIC_64;

/// Offset of the `e_lfanew` field inside the base header.
pub const E_LFANEW_OFFSET: u64 = 0x3C;
/// Size of the COFF file header that follows the extended header magic.
pub const COFF_HEADER_SIZE: usize = 20;
/// Size of one entry of the directory table.
pub const DATA_DIRECTORY_SIZE: usize = 8;

/// The flavor of an image, decided by the optional header magic.
///
/// Besides the optional header layout, the flavor fixes the native width of a thunk and
/// therefore the position of the ordinal flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// 32-bit image (`PE32`), 4-byte thunks
    Pe32,
    /// 64-bit image (`PE32+`), 8-byte thunks
    Pe32Plus,
}

impl ImageKind {
    /// Maps an optional header magic to its image kind.
    #[must_use]
    pub fn from_magic(magic: u16) -> Option<ImageKind> {
        match magic {
            OPTIONAL_MAGIC_32 => Some(ImageKind::Pe32),
            OPTIONAL_MAGIC_64 => Some(ImageKind::Pe32Plus),
            _ => None,
        }
    }

    /// The optional header magic of this kind.
    #[must_use]
    pub fn magic(self) -> u16 {
        match self {
            ImageKind::Pe32 => OPTIONAL_MAGIC_32,
            ImageKind::Pe32Plus => OPTIONAL_MAGIC_64,
        }
    }

    /// Size in bytes of one thunk.
    #[must_use]
    pub fn thunk_size(self) -> usize {
        match self {
            ImageKind::Pe32 => 4,
            ImageKind::Pe32Plus => 8,
        }
    }

    /// The top bit of a thunk word, set when the import is by ordinal.
    #[must_use]
    pub fn ordinal_flag(self) -> u64 {
        match self {
            ImageKind::Pe32 => 0x8000_0000,
            ImageKind::Pe32Plus => 0x8000_0000_0000_0000,
        }
    }

    /// Size of the optional header up to, excluding, the directory table.
    #[must_use]
    pub fn fixed_optional_size(self) -> usize {
        match self {
            ImageKind::Pe32 => 96,
            ImageKind::Pe32Plus => 112,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Pe32 => write!(f, "PE32"),
            ImageKind::Pe32Plus => write!(f, "PE32+"),
        }
    }
}

/// Slots of the directory table, in table order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumCount,
    EnumIter,
    FromRepr,
)]
#[repr(usize)]
pub enum DirectoryKind {
    /// Export directory
    Export = 0,
    /// Import directory
    Import = 1,
    /// Resource directory
    Resource = 2,
    /// Exception directory
    Exception = 3,
    /// Attribute certificate table
    Security = 4,
    /// Base relocation table
    BaseRelocation = 5,
    /// Debug directory
    Debug = 6,
    /// Architecture specific data, reserved
    Architecture = 7,
    /// Global pointer register value
    GlobalPtr = 8,
    /// Thread local storage directory
    Tls = 9,
    /// Load configuration directory
    LoadConfig = 10,
    /// Bound import directory
    BoundImport = 11,
    /// Import address table
    Iat = 12,
    /// Delay load import descriptors
    DelayImport = 13,
    /// CLR runtime header
    ClrRuntime = 14,
    /// Reserved, must be zero
    Reserved = 15,
}

/// One entry of the directory table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DataDirectory {
    /// Address of the table, relative to the preferred base
    pub virtual_address: u32,
    /// Size of the table in bytes
    pub size: u32,
}

/// Read-only view of an image's header chain.
///
/// Computed from scratch on every pass, never cached: in a live process the headers may change
/// between two passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    /// Address the image was found at
    pub runtime_base: u64,
    /// Flavor of the optional header
    pub kind: ImageKind,
    /// COFF machine type
    pub machine: u16,
    /// Number of entries in the section table
    pub number_of_sections: u16,
    /// Entry point, relative to the image base
    pub entry_point_offset: u32,
    /// Address the image was linked to assume
    pub preferred_base: u64,
    /// Size of the image in memory
    pub size_of_image: u32,
    /// Size of the headers, rounded to the file alignment
    pub size_of_headers: u32,
    directories: [DataDirectory; DirectoryKind::COUNT],
}

impl HeaderInfo {
    /// Reads and validates the header chain of the image in `memory`.
    ///
    /// # Errors
    /// - [`crate::Error::MalformedHeader`] if the base header magic, the extended header magic or
    ///   the optional header magic does not match, or the optional header is too small
    /// - [`crate::Error::DanglingPointer`] if any header lies outside the image
    pub fn read<M: ImageMemory + ?Sized>(memory: &M) -> Result<HeaderInfo> {
        let runtime_base = memory.base();

        let dos_magic: u16 = read_le(memory, runtime_base)?;
        if dos_magic != DOS_MAGIC {
            return Err(malformed_header!(
                "Invalid base header magic 0x{:04X} at 0x{:X}",
                dos_magic,
                runtime_base
            ));
        }

        let e_lfanew: u32 = read_le(memory, offset(runtime_base, E_LFANEW_OFFSET)?)?;
        let nt_address = offset(runtime_base, u64::from(e_lfanew))?;

        let signature: u32 = read_le(memory, nt_address)?;
        if signature != PE_MAGIC {
            return Err(malformed_header!(
                "Invalid extended header magic 0x{:08X} at 0x{:X}",
                signature,
                nt_address
            ));
        }

        let coff_address = offset(nt_address, 4)?;
        let mut coff = Parser::new(memory.slice(coff_address, COFF_HEADER_SIZE)?);
        let machine = coff.read_le::<u16>()?;
        let number_of_sections = coff.read_le::<u16>()?;
        coff.advance_by(12)?;
        let size_of_optional_header = usize::from(coff.read_le::<u16>()?);

        let optional_address = offset(coff_address, COFF_HEADER_SIZE as u64)?;
        let magic: u16 = read_le(memory, optional_address)?;
        let Some(kind) = ImageKind::from_magic(magic) else {
            return Err(malformed_header!(
                "Unknown optional header magic 0x{:04X} at 0x{:X}",
                magic,
                optional_address
            ));
        };

        let fixed_size = kind.fixed_optional_size();
        if size_of_optional_header < fixed_size {
            return Err(malformed_header!(
                "{} optional header of {} bytes is smaller than {}",
                kind,
                size_of_optional_header,
                fixed_size
            ));
        }

        let mut optional = Parser::new(memory.slice(optional_address, fixed_size)?);
        optional.seek(16)?;
        let entry_point_offset = optional.read_le::<u32>()?;
        let preferred_base = match kind {
            ImageKind::Pe32 => {
                optional.seek(28)?;
                u64::from(optional.read_le::<u32>()?)
            }
            ImageKind::Pe32Plus => {
                optional.seek(24)?;
                optional.read_le::<u64>()?
            }
        };
        optional.seek(56)?;
        let size_of_image = optional.read_le::<u32>()?;
        let size_of_headers = optional.read_le::<u32>()?;
        optional.seek(fixed_size - 4)?;
        let number_of_rva_and_sizes = optional.read_le::<u32>()? as usize;

        // Slots past NumberOfRvaAndSizes, or past the declared optional header size, are absent.
        let count = number_of_rva_and_sizes
            .min(DirectoryKind::COUNT)
            .min((size_of_optional_header - fixed_size) / DATA_DIRECTORY_SIZE);

        let mut directories = [DataDirectory::default(); DirectoryKind::COUNT];
        let table_address = offset(optional_address, fixed_size as u64)?;
        let mut table = Parser::new(memory.slice(table_address, count * DATA_DIRECTORY_SIZE)?);
        for directory in directories.iter_mut().take(count) {
            directory.virtual_address = table.read_le::<u32>()?;
            directory.size = table.read_le::<u32>()?;
        }

        debug!(
            "{} image at 0x{:X}, preferred base 0x{:X}, {} directories",
            kind, runtime_base, preferred_base, count
        );

        Ok(HeaderInfo {
            runtime_base,
            kind,
            machine,
            number_of_sections,
            entry_point_offset,
            preferred_base,
            size_of_image,
            size_of_headers,
            directories,
        })
    }

    /// Returns the directory of the given kind, or `None` if it is absent.
    ///
    /// A directory whose virtual address is zero is absent. This is not an error: an image
    /// without an import directory simply imports nothing.
    #[must_use]
    pub fn directory(&self, kind: DirectoryKind) -> Option<DataDirectory> {
        let directory = self.directories[kind as usize];
        if directory.virtual_address == 0 {
            None
        } else {
            Some(directory)
        }
    }

    /// Returns the raw table slot of the given kind, present or not.
    #[must_use]
    pub fn raw_directory(&self, kind: DirectoryKind) -> DataDirectory {
        self.directories[kind as usize]
    }

    /// Iterates over all present directories in table order.
    pub fn directories(&self) -> impl Iterator<Item = (DirectoryKind, DataDirectory)> + '_ {
        DirectoryKind::iter().filter_map(|kind| self.directory(kind).map(|dir| (kind, dir)))
    }

    /// The import directory, if present.
    #[must_use]
    pub fn import_directory(&self) -> Option<DataDirectory> {
        self.directory(DirectoryKind::Import)
    }

    /// The import address table directory, if present.
    #[must_use]
    pub fn iat_directory(&self) -> Option<DataDirectory> {
        self.directory(DirectoryKind::Iat)
    }

    /// Resolves an offset inside the import chain against the preferred base.
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingPointer`] if the address overflows.
    pub fn preferred_address(&self, rva: u64) -> Result<u64> {
        offset(self.preferred_base, rva)
    }

    /// Resolves an offset against the runtime base.
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingPointer`] if the address overflows.
    pub fn runtime_address(&self, rva: u64) -> Result<u64> {
        offset(self.runtime_base, rva)
    }

    /// `true` when the image lives at the address it was linked for.
    #[must_use]
    pub fn is_at_preferred_base(&self) -> bool {
        self.runtime_base == self.preferred_base
    }
}

fn offset(base: u64, rva: u64) -> Result<u64> {
    base.checked_add(rva)
        .ok_or_else(|| dangling_error!(base, usize::try_from(rva).unwrap_or(usize::MAX)))
}
