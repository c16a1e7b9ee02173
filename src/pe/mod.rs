//! PE structures on the import path.
//!
//! Reading an image's imports is a three stage pipeline, each stage consuming the output of the
//! previous one:
//!
//! 1. [`HeaderInfo::read`] validates the header chain and exposes the directory table
//! 2. [`ImportWalker`] iterates the import descriptors of the import directory
//! 3. [`ThunkDecoder`] iterates the lookup table of one module
//!
//! [`crate::Inspector`] drives the three stages for a complete pass. [`ImageBuilder`] produces
//! synthetic images to feed them.

mod builder;
pub mod header;
mod imports;
mod thunk;

pub use builder::ImageBuilder;
pub use header::{
    DataDirectory, DirectoryKind, HeaderInfo, ImageKind, DOS_MAGIC, OPTIONAL_MAGIC_32,
    OPTIONAL_MAGIC_64, PE_MAGIC,
};
pub use imports::{ImportDescriptor, ImportWalker, ModuleImport, IMPORT_DESCRIPTOR_SIZE};
pub use thunk::{ImportEntry, Thunk, ThunkDecoder, HINT_SIZE};
