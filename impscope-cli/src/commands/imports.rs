use std::path::Path;

use impscope::{pe::ImportEntry, ImportSnapshot, Inspector};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{format_address, load_image},
    output::{print_output, reporter},
};

#[derive(Debug, Serialize)]
pub struct EntryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub entries: Vec<EntryInfo>,
}

#[derive(Debug, Serialize)]
pub struct ImportsOutput {
    pub image_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<String>,
    pub modules: Vec<ModuleInfo>,
}

impl From<&ImportSnapshot> for ImportsOutput {
    fn from(snapshot: &ImportSnapshot) -> Self {
        ImportsOutput {
            image_base: format_address(snapshot.runtime_base),
            iat: snapshot.iat_address.map(format_address),
            modules: snapshot
                .modules
                .iter()
                .map(|module| ModuleInfo {
                    name: module.name.clone(),
                    entries: module
                        .entries
                        .iter()
                        .map(|entry| match entry {
                            ImportEntry::ByName(name) => EntryInfo {
                                name: Some(name.clone()),
                                ordinal: None,
                            },
                            ImportEntry::ByOrdinal(ordinal) => EntryInfo {
                                name: None,
                                ordinal: Some(*ordinal),
                            },
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let image = load_image(path)?;
    let inspector = Inspector::new(&image, opts.inspect_config());

    if opts.json {
        let snapshot = inspector.snapshot()?;
        return print_output(&ImportsOutput::from(&snapshot), opts, |_| {});
    }

    let mut reporter = reporter(opts);
    inspector.pass(&mut reporter)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use impscope::{pe::ImageBuilder, InspectConfig};

    #[test]
    fn json_shape() {
        let image = ImageBuilder::pe32()
            .module("KERNEL32.DLL")
            .by_name("Sleep")
            .by_ordinal(5)
            .build();
        let snapshot = Inspector::new(&image, InspectConfig::default())
            .snapshot()
            .unwrap();

        let json = serde_json::to_value(ImportsOutput::from(&snapshot)).unwrap();
        assert_eq!(json["image_base"], "0x400000");
        assert_eq!(json["modules"][0]["name"], "KERNEL32.DLL");
        assert_eq!(json["modules"][0]["entries"][0]["name"], "Sleep");
        assert_eq!(json["modules"][0]["entries"][1]["ordinal"], 5);
        assert!(json["modules"][0]["entries"][1].get("name").is_none());
    }
}
