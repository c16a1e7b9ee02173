use super::{checked_offset, read_le, ImageMemory};
use crate::{
    pe::{
        header::{COFF_HEADER_SIZE, DATA_DIRECTORY_SIZE, E_LFANEW_OFFSET},
        DirectoryKind, HeaderInfo, DOS_MAGIC,
    },
    Result,
};
use strum::EnumCount;

/// Largest possible optional header: PE32+ fixed part plus a full directory table.
const MAX_OPTIONAL_HEADER: usize = 112 + DirectoryKind::COUNT * DATA_DIRECTORY_SIZE;

/// Upper bound for `e_lfanew`; the extended header lives in the first page of a mapped image.
const MAX_E_LFANEW: u32 = 0x1000;

/// Image read directly from the address space of the current process.
///
/// Reads are still bound-checked against `[base, base + len)`, but the range itself is trusted:
/// whoever creates a `LiveImage` vouches that it is mapped and readable for the image's lifetime.
#[derive(Debug)]
pub struct LiveImage {
    ptr: *const u8,
    len: usize,
}

impl LiveImage {
    /// Creates a view of `len` bytes starting at `ptr`.
    ///
    /// # Safety
    /// `ptr..ptr + len` must be readable for as long as the returned value lives.
    #[must_use]
    pub unsafe fn new(ptr: *const u8, len: usize) -> LiveImage {
        LiveImage { ptr, len }
    }

    /// Creates a view of the image whose base header starts at `ptr`, sized by its `SizeOfImage`.
    ///
    /// # Safety
    /// The whole image, as described by its own headers, must be mapped and readable at `ptr`
    /// for as long as the returned value lives.
    ///
    /// # Errors
    /// Returns the errors of [`HeaderInfo::read`], or [`crate::Error::MalformedHeader`] if
    /// `e_lfanew` is misaligned or beyond the first page, or `SizeOfImage` does not even cover
    /// the headers.
    pub unsafe fn from_module_base(ptr: *const u8) -> Result<LiveImage> {
        // Base header first, to learn where the extended header starts.
        let probe = LiveImage::new(ptr, E_LFANEW_OFFSET as usize + 4);
        let magic: u16 = read_le(&probe, probe.base())?;
        if magic != DOS_MAGIC {
            return Err(malformed_header!(
                "Invalid base header magic 0x{:04X} at {:p}",
                magic,
                ptr
            ));
        }
        let e_lfanew: u32 = read_le(&probe, probe.base() + E_LFANEW_OFFSET)?;
        if e_lfanew > MAX_E_LFANEW || e_lfanew % 4 != 0 {
            return Err(malformed_header!(
                "Invalid extended header offset 0x{:X} at {:p}",
                e_lfanew,
                ptr
            ));
        }

        let headers_len = (e_lfanew as usize)
            .saturating_add(4 + COFF_HEADER_SIZE + MAX_OPTIONAL_HEADER);
        let probe = LiveImage::new(ptr, headers_len);
        let header = HeaderInfo::read(&probe)?;

        let size_of_image = header.size_of_image as usize;
        if size_of_image < (e_lfanew as usize).saturating_add(4 + COFF_HEADER_SIZE) {
            return Err(malformed_header!(
                "SizeOfImage 0x{:X} does not cover the headers",
                size_of_image
            ));
        }

        Ok(LiveImage::new(ptr, size_of_image))
    }

    /// The image the current process was started from.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on targets other than Windows, and
    /// [`crate::Error::FileError`] if the module handle cannot be obtained.
    #[cfg(windows)]
    pub fn current_process() -> Result<LiveImage> {
        use winapi::um::libloaderapi::GetModuleHandleW;

        let handle = unsafe { GetModuleHandleW(std::ptr::null()) };
        if handle.is_null() {
            return Err(crate::Error::FileError(std::io::Error::last_os_error()));
        }

        // The main module stays mapped for the lifetime of the process.
        unsafe { LiveImage::from_module_base(handle as *const u8) }
    }

    /// The image the current process was started from.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] on targets other than Windows, and
    /// [`crate::Error::FileError`] if the module handle cannot be obtained.
    #[cfg(not(windows))]
    pub fn current_process() -> Result<LiveImage> {
        Err(crate::Error::NotSupported)
    }
}

impl ImageMemory for LiveImage {
    fn base(&self) -> u64 {
        self.ptr as u64
    }

    fn len(&self) -> usize {
        self.len
    }

    fn slice(&self, address: u64, len: usize) -> Result<&[u8]> {
        let offset = checked_offset(self.base(), self.len, address, len)?;
        // SAFETY: the range lies inside ptr..ptr + len, which the constructor vouched for.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.add(offset), len) })
    }
}
