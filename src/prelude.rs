//! # impscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the impscope library.
//!
//! ```rust
//! use impscope::prelude::*;
//!
//! let image = ImageBuilder::pe32_plus().module("NTDLL.DLL").by_ordinal(1).build();
//! let header = HeaderInfo::read(&image)?;
//! assert_eq!(header.kind, ImageKind::Pe32Plus);
//! # Ok::<(), impscope::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all impscope operations
pub use crate::Error;

/// The result type used throughout impscope
pub use crate::Result;

/// Caps and pacing of inspection passes
pub use crate::InspectConfig;

// ================================================================================================
// Image Providers
// ================================================================================================

/// Address-space abstraction and its providers
pub use crate::{ImageMemory, LiveImage, MappedImage};

// ================================================================================================
// Import Pipeline
// ================================================================================================

/// Header chain
pub use crate::pe::{DirectoryKind, HeaderInfo, ImageKind};

/// Import directory and lookup tables
pub use crate::pe::{ImportEntry, ImportWalker, ModuleImport, ThunkDecoder};

/// Synthetic images
pub use crate::pe::ImageBuilder;

// ================================================================================================
// Passes and Reporting
// ================================================================================================

/// Passes and the refresh loop
pub use crate::{run, run_with, ImportSnapshot, Inspector, ModuleImports, RunSummary, StopSignal};

/// Structured output
pub use crate::report::{LogReporter, Record, RecordLog, Reporter, Severity};
