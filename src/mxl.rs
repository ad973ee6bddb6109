//! MXL file handler — reads compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml  — declares the root MusicXML file path
//!   - <rootfile>.xml          — the actual MusicXML content (e.g., score.xml)
//!   - (optional) other files  — images, sounds, etc.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{Result, StaffError};
use crate::model::Composition;
use crate::parser;

/// Read and import a .mxl file from raw bytes.
pub fn parse_mxl(data: &[u8]) -> Result<Composition> {
    let xml = extract_musicxml_from_mxl(data)?;
    parser::parse_musicxml(&xml)
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let root_file_path = root_file_path(&mut archive)?;

    let mut xml = String::new();
    archive.by_name(&root_file_path)?.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Path of the root MusicXML file: the first `<rootfile>` in
/// META-INF/container.xml, else the first .xml/.musicxml entry outside
/// META-INF.
fn root_file_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String> {
    let container = match archive.by_name("META-INF/container.xml") {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)?;
            Some(xml)
        }
        Err(_) => None,
    };

    if let Some(xml) = container {
        let doc = roxmltree::Document::parse(&xml)?;
        let declared = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "rootfile")
            .find_map(|n| n.attribute("full-path"));
        if let Some(path) = declared {
            return Ok(path.to_string());
        }
        log::warn!("container.xml declares no rootfile; scanning the archive");
    }

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    names
        .iter()
        .find(|name| {
            !name.starts_with("META-INF/") && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .cloned()
        .ok_or_else(|| StaffError::MissingRootFile(names.clone()))
}
