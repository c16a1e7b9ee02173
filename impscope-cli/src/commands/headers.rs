use std::path::Path;

use anyhow::Context;
use impscope::{pe::HeaderInfo, Inspector};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, format_address, load_image},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct DirectoryInfo {
    pub name: String,
    pub rva: String,
    pub size: u32,
}

#[derive(Debug, Serialize)]
pub struct HeadersInfo {
    pub file: String,
    pub kind: String,
    pub machine: String,
    pub runtime_base: String,
    pub preferred_base: String,
    pub entry_point: String,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub sections: u16,
    pub directories: Vec<DirectoryInfo>,
}

impl HeadersInfo {
    pub fn new(file: String, header: &HeaderInfo) -> Self {
        HeadersInfo {
            file,
            kind: header.kind.to_string(),
            machine: format!("0x{:04X}", header.machine),
            runtime_base: format_address(header.runtime_base),
            preferred_base: format_address(header.preferred_base),
            entry_point: format!("0x{:08X}", header.entry_point_offset),
            size_of_image: header.size_of_image,
            size_of_headers: header.size_of_headers,
            sections: header.number_of_sections,
            directories: header
                .directories()
                .map(|(kind, directory)| DirectoryInfo {
                    name: kind.to_string(),
                    rva: format!("0x{:08X}", directory.virtual_address),
                    size: directory.size,
                })
                .collect(),
        }
    }
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let image = load_image(path)?;
    let header = Inspector::new(&image, opts.inspect_config())
        .header()
        .with_context(|| format!("invalid header chain: {}", path.display()))?;

    let info = HeadersInfo::new(file_display_name(path), &header);

    print_output(&info, opts, |info| {
        println!("File:            {}", info.file);
        println!("Kind:            {}", info.kind);
        println!("Machine:         {}", info.machine);
        println!("Image base:      {}", info.runtime_base);
        println!("Preferred base:  {}", info.preferred_base);
        println!("Entry point:     {}", info.entry_point);
        println!("Size of image:   0x{:X}", info.size_of_image);
        println!("Size of headers: 0x{:X}", info.size_of_headers);
        println!("Sections:        {}", info.sections);

        if info.directories.is_empty() {
            println!("\nDirectories: none");
            return;
        }

        println!("\nDirectories:");
        let mut tw = TabWriter::new(vec![
            ("Directory", Align::Left),
            ("RVA", Align::Left),
            ("Size", Align::Right),
        ])
        .indent("  ");
        for directory in &info.directories {
            tw.row(vec![
                directory.name.clone(),
                directory.rva.clone(),
                directory.size.to_string(),
            ]);
        }
        tw.print();
    })
}
