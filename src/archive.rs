//! Compressed score containers.
//!
//! A container is a ZIP archive holding:
//!   - META-INF/container.xml: optional, names the root score file
//!   - <rootfile>.xml: the score XML itself
//!   - (optional) other files: ignored

use std::io::{Cursor, Read};

use log::debug;
use zip::ZipArchive;

use crate::error::{EngraveError, Result};
use crate::model::Score;
use crate::parser;

/// Read and parse a score container from raw bytes.
pub fn parse_score_archive(data: &[u8]) -> Result<Score> {
    let xml = extract_score_xml(data)?;
    parser::parse_score_xml(&xml)
}

/// Extract the root score XML string from container bytes.
pub fn extract_score_xml(data: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let root_file_path = find_root_file(&mut archive)?;
    debug!("reading root file '{root_file_path}' from archive");

    let mut root_file = archive.by_name(&root_file_path).map_err(|e| {
        EngraveError::Archive(format!("root file '{root_file_path}' not found in archive: {e}"))
    })?;

    let mut xml = String::new();
    root_file
        .read_to_string(&mut xml)
        .map_err(|e| EngraveError::Archive(format!("failed to read '{root_file_path}': {e}")))?;
    Ok(xml)
}

/// Use META-INF/container.xml when present, otherwise the first XML entry.
fn find_root_file(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String> {
    let container_xml = match archive.by_name("META-INF/container.xml") {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)
                .map_err(|e| EngraveError::Archive(format!("failed to read container.xml: {e}")))?;
            Some(xml)
        }
        Err(_) => None,
    };

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml)?;
        return doc
            .descendants()
            .find(|n| n.tag_name().name() == "rootfile")
            .and_then(|n| n.attribute("full-path"))
            .map(String::from)
            .ok_or_else(|| EngraveError::Archive("no rootfile in container.xml".into()));
    }

    let names: Vec<String> = archive.file_names().map(String::from).collect();
    let mut candidates: Vec<&String> = names
        .iter()
        .filter(|n| !n.starts_with("META-INF/") && n.ends_with(".xml"))
        .collect();
    candidates.sort();
    candidates
        .first()
        .map(|n| n.to_string())
        .ok_or_else(|| EngraveError::Archive(format!("no score file found in archive, entries: {names:?}")))
}
