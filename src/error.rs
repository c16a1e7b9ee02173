use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! malformed_header {
    ($msg:expr) => {
        crate::Error::MalformedHeader {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::MalformedHeader {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! dangling_error {
    ($address:expr, $len:expr) => {
        crate::Error::DanglingPointer {
            address: $address,
            len: $len,
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every condition is local to a single inspection pass. The run loop in
/// [`crate::inspect`] reports the error and retries on the next tick; nothing here is fatal to
/// the hosting process.
///
/// # Error Categories
///
/// ## Image Structure
/// - [`Error::MalformedHeader`] - The header chain failed validation
/// - [`Error::Malformed`] - Data inside the import chain is corrupt
/// - [`Error::DanglingPointer`] - A read resolved outside the known image range
/// - [`Error::IterationLimit`] - A table did not terminate within the configured cap
///
/// ## Providers
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::NotSupported`] - The requested provider is unavailable on this target
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - Section-table parsing errors from the goblin crate
///
/// An absent directory (virtual address zero) is deliberately *not* an error; see
/// [`crate::pe::HeaderInfo::directory`].
///
/// # Examples
///
/// ```rust
/// use impscope::{Error, Inspector, InspectConfig, MappedImage};
///
/// let image = MappedImage::new(0x40_0000, vec![0u8; 0x200]);
/// match Inspector::new(&image, InspectConfig::default()).header() {
///     Ok(_) => println!("valid image"),
///     Err(Error::MalformedHeader { message, .. }) => println!("bad header: {}", message),
///     Err(e) => println!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The header chain of the image is invalid.
    ///
    /// Raised when the base header, the extended header signature or the optional header magic
    /// does not match the expected constant. No partial header information is produced.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed header - {file}:{line}: {message}")]
    MalformedHeader {
        /// The message to be printed for the MalformedHeader error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The image is damaged and could not be walked.
    ///
    /// Covers structures below the header chain, such as a module or symbol name without a
    /// terminator inside the configured limit, or a name that is not valid UTF-8.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A read resolved outside of the known-valid image range.
    ///
    /// Every access is bound-checked against the mapped range of the image, so a dangling
    /// offset inside the import chain surfaces here instead of faulting.
    #[error("Dangling pointer - {len} byte(s) at 0x{address:X} are outside the image")]
    DanglingPointer {
        /// Absolute address of the attempted read
        address: u64,
        /// Length of the attempted read
        len: usize,
    },

    /// Iteration limit reached.
    ///
    /// Descriptor and thunk arrays are terminated by a null sentinel only. A corrupted image
    /// may never present one, so the walkers stop after a configured number of records.
    ///
    /// The associated value shows the limit that was reached.
    #[error("Reached the maximum iteration count allowed - {0}")]
    IterationLimit(usize),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The requested operation is not supported on this target.
    #[error("This operation is not supported on this target")]
    NotSupported,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while mapping an image from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    ///
    /// goblin is used to read the section table when laying out a file from disk.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
