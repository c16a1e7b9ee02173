// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'image/live.rs' reads the memory of the current process through raw pointers
// - 'image/physical.rs' uses mmap to map a file into memory

//! # impscope
//!
//! Reflective inspection of the import table of a PE image that is mapped in memory.
//!
//! Given the base address of an image, `impscope` validates its header chain, walks the import
//! directory module by module and decodes every imported symbol, by name or by ordinal. Every
//! read is bound-checked against the mapped range of the image, so a corrupt or relocated image
//! yields an error instead of a fault.
//!
//! ## Features
//!
//! - **PE32 and PE32+** - Thunk width and ordinal flag follow the optional header magic
//! - **Any address space** - Files from disk, owned buffers, or the running process itself
//! - **Structured output** - Findings are typed records handed to a pluggable reporter
//! - **Bounded** - Caps on modules, thunks and name lengths for non-terminating tables
//! - **Refresh loop** - Repeated passes with cooperative cancellation
//!
//! ## Quick Start
//!
//! ```rust
//! use impscope::prelude::*;
//!
//! let image = ImageBuilder::pe32()
//!     .module("KERNEL32.DLL")
//!     .by_name("Sleep")
//!     .by_ordinal(17)
//!     .build();
//!
//! let snapshot = Inspector::new(&image, InspectConfig::default()).snapshot()?;
//! for module in &snapshot.modules {
//!     println!("{}: {} import(s)", module.name, module.entries.len());
//! }
//! # Ok::<(), impscope::Error>(())
//! ```
//!
//! ### Inspecting a file
//!
//! ```rust,no_run
//! use impscope::{report::LogReporter, InspectConfig, Inspector, MappedImage};
//!
//! let image = MappedImage::from_file("C:\\Windows\\System32\\notepad.exe")?;
//! Inspector::new(&image, InspectConfig::strict()).pass(&mut LogReporter)?;
//! # Ok::<(), impscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`image`] - The [`ImageMemory`] address-space abstraction and its providers
//! - [`pe`] - Header reader, import walker and thunk decoder
//! - [`report`] - Records, severities and the [`report::Reporter`] sink
//! - [`inspect`] - Complete passes and the refresh loop
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ### Address spaces
//!
//! The header chain is read at the image's runtime base. Offsets inside the import chain are
//! resolved against the preferred base recorded in the optional header, while the reported IAT
//! address uses the runtime base. For an image that was not relocated both are the same; for a
//! relocated one the import chain points outside the image and the pass fails with
//! [`Error::DanglingPointer`].

#[macro_use]
pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test;

mod config;
pub mod image;
pub mod inspect;
pub mod pe;
pub mod prelude;
pub mod report;

pub use config::InspectConfig;
pub use error::Error;
pub use image::{parser::Parser, ImageMemory, LiveImage, MappedImage};
pub use inspect::{
    run, run_with, ImportSnapshot, Inspector, ModuleImports, RunSummary, StopSignal,
};

/// `impscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`]. This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
