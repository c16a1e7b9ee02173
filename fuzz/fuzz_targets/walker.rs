#![no_main]

use impscope::{report::RecordLog, InspectConfig, Inspector, MappedImage};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // As an image already in memory layout, at a base that matches no preferred base in particular
    let image = MappedImage::new(0x40_0000, data.to_vec());
    let mut log = RecordLog::default();
    let _ = Inspector::new(&image, InspectConfig::strict()).pass(&mut log);

    // As a file laid out by the loader path
    if let Ok(image) = MappedImage::from_file_bytes(data) {
        let _ = Inspector::new(&image, InspectConfig::strict()).snapshot();
    }
});
