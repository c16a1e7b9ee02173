//! Import directory walker.
//!
//! The import directory is an array of fixed 20-byte descriptors, one per imported module,
//! terminated by a descriptor whose name field is zero. Every offset inside a descriptor is
//! relative to the preferred base.

use log::trace;

use crate::{
    config::InspectConfig,
    image::{parser::Parser, read_c_string, ImageMemory},
    pe::HeaderInfo,
    Error, Result,
};

/// Size of one import descriptor.
pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// One raw entry of the import directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImportDescriptor {
    /// Offset of the lookup table (`OriginalFirstThunk`), 0 if absent
    pub original_first_thunk: u32,
    /// Bind timestamp, 0 when not bound
    pub time_date_stamp: u32,
    /// Index of the first forwarder reference
    pub forwarder_chain: u32,
    /// Offset of the NUL-terminated module name, 0 on the terminator
    pub name: u32,
    /// Offset of the import address table (`FirstThunk`)
    pub first_thunk: u32,
}

impl ImportDescriptor {
    /// Parses a descriptor from its raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `data` is shorter than a descriptor.
    pub fn parse(data: &[u8]) -> Result<ImportDescriptor> {
        let mut parser = Parser::new(data);
        Ok(ImportDescriptor {
            original_first_thunk: parser.read_le::<u32>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            forwarder_chain: parser.read_le::<u32>()?,
            name: parser.read_le::<u32>()?,
            first_thunk: parser.read_le::<u32>()?,
        })
    }

    /// Reads the descriptor at the absolute `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::DanglingPointer`] if the descriptor is not fully inside the image.
    pub fn read<M: ImageMemory + ?Sized>(memory: &M, address: u64) -> Result<ImportDescriptor> {
        Self::parse(memory.slice(address, IMPORT_DESCRIPTOR_SIZE)?)
    }

    /// `true` for the descriptor that terminates the directory.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.name == 0
    }
}

/// A module named by one import descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImport {
    /// Name of the imported module, as stored in the image
    pub name: String,
    /// Absolute address of the lookup table, `None` if the descriptor has none
    pub lookup_table: Option<u64>,
    /// The descriptor the module was read from
    pub descriptor: ImportDescriptor,
}

enum WalkState {
    Next(u64),
    Failed(Error),
    Done,
}

/// Iterator over the modules of an image's import directory.
///
/// Yields modules in directory order until the terminator. An image without an import directory
/// yields nothing. The first error ends the iteration; so does exceeding
/// [`InspectConfig::max_modules`], which yields [`crate::Error::IterationLimit`].
///
/// # Examples
///
/// ```rust
/// use impscope::{pe::{HeaderInfo, ImageBuilder, ImportWalker}, InspectConfig};
///
/// let image = ImageBuilder::pe32()
///     .module("KERNEL32.DLL").by_name("Sleep")
///     .module("USER32.DLL").by_ordinal(7)
///     .build();
/// let header = HeaderInfo::read(&image)?;
///
/// let names = ImportWalker::new(&image, &header, &InspectConfig::default())
///     .map(|module| module.map(|module| module.name))
///     .collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(names, ["KERNEL32.DLL", "USER32.DLL"]);
/// # Ok::<(), impscope::Error>(())
/// ```
pub struct ImportWalker<'a, M: ImageMemory + ?Sized> {
    memory: &'a M,
    header: &'a HeaderInfo,
    state: WalkState,
    walked: usize,
    max_modules: usize,
    max_name_len: usize,
}

impl<'a, M: ImageMemory + ?Sized> ImportWalker<'a, M> {
    /// Creates a walker over the import directory described by `header`.
    pub fn new(memory: &'a M, header: &'a HeaderInfo, config: &InspectConfig) -> Self {
        let state = match header.import_directory() {
            None => WalkState::Done,
            Some(directory) => {
                match header.preferred_address(u64::from(directory.virtual_address)) {
                    Ok(address) => WalkState::Next(address),
                    Err(error) => WalkState::Failed(error),
                }
            }
        };

        ImportWalker {
            memory,
            header,
            state,
            walked: 0,
            max_modules: config.max_modules,
            max_name_len: config.max_name_len,
        }
    }

    fn step(&mut self, address: u64) -> Result<Option<ModuleImport>> {
        let descriptor = ImportDescriptor::read(self.memory, address)?;
        if descriptor.is_terminator() {
            return Ok(None);
        }

        if self.walked >= self.max_modules {
            return Err(Error::IterationLimit(self.max_modules));
        }
        self.walked += 1;

        let name_address = self
            .header
            .preferred_address(u64::from(descriptor.name))?;
        let name = read_c_string(self.memory, name_address, self.max_name_len)?;

        let lookup_table = match descriptor.original_first_thunk {
            0 => None,
            offset => Some(self.header.preferred_address(u64::from(offset))?),
        };

        trace!(
            "Import descriptor at 0x{:X}: {} (lookup table {:X?})",
            address,
            name,
            lookup_table
        );

        let next = address
            .checked_add(IMPORT_DESCRIPTOR_SIZE as u64)
            .ok_or(dangling_error!(address, IMPORT_DESCRIPTOR_SIZE))?;
        self.state = WalkState::Next(next);

        Ok(Some(ModuleImport {
            name,
            lookup_table,
            descriptor,
        }))
    }
}

impl<M: ImageMemory + ?Sized> Iterator for ImportWalker<'_, M> {
    type Item = Result<ModuleImport>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, WalkState::Done) {
            WalkState::Done => None,
            WalkState::Failed(error) => Some(Err(error)),
            WalkState::Next(address) => match self.step(address) {
                Ok(Some(module)) => Some(Ok(module)),
                Ok(None) => None,
                Err(error) => {
                    self.state = WalkState::Done;
                    Some(Err(error))
                }
            },
        }
    }
}

impl<M: ImageMemory + ?Sized> std::iter::FusedIterator for ImportWalker<'_, M> {}
