//! Shared functionality which is used in unit tests

use std::time::Duration;

use crate::{config::InspectConfig, image::MappedImage, pe::ImageBuilder};

/// Two modules, three imports, at the default PE32 base
pub fn sample_pe32() -> MappedImage {
    sample(ImageBuilder::pe32())
}

/// Same imports as [`sample_pe32`] in a 64-bit image
pub fn sample_pe32_plus() -> MappedImage {
    sample(ImageBuilder::pe32_plus())
}

fn sample(builder: ImageBuilder) -> MappedImage {
    builder
        .module("KERNEL32.DLL")
        .by_name("Sleep")
        .by_name("ExitProcess")
        .module("WS2_32.DLL")
        .by_ordinal(115)
        .build()
}

/// Default caps without the one second pause between passes
pub fn fast_config() -> InspectConfig {
    InspectConfig::default().with_refresh_interval(Duration::ZERO)
}

pub fn patch_u16(image: &mut MappedImage, offset: usize, value: u16) {
    image.data_mut()[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn patch_u32(image: &mut MappedImage, offset: usize, value: u32) {
    image.data_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn samples_agree() {
    use crate::inspect::Inspector;

    let narrow = Inspector::new(&sample_pe32(), fast_config()).snapshot().unwrap();
    let wide = Inspector::new(&sample_pe32_plus(), fast_config()).snapshot().unwrap();
    assert_eq!(narrow.modules, wide.modules);
}
