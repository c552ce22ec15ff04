//! engravelib: music engraving layout engine.
//!
//! Reads a score tree (plain XML or a zipped container), resolves every
//! duration to integer ticks, and lays the music out as positioned glyph
//! geometry: pages of systems, each with its moments, staves, beams, ties
//! and slurs. Drawing the geometry is left to the caller.
//!
//! # Example
//! ```no_run
//! use engravelib::{engrave_file, EngraveConfig};
//!
//! let score = engrave_file("path/to/score.xml", &EngraveConfig::default()).unwrap();
//! println!("Pages: {}", score.pages.len());
//! println!("Duration: {} ms", score.total_duration_ms);
//! ```

pub mod archive;
pub mod config;
pub mod duration;
pub mod engraver;
pub mod error;
pub mod model;
pub mod parser;
pub mod pitch;
pub mod resolve;
pub mod timemap;
pub mod voice;

use std::path::{Path, PathBuf};

use log::{info, warn};

pub use config::EngraveConfig;
pub use engraver::geometry::*;
pub use engraver::metrics::{DefaultMetrics, GlyphMetrics};
pub use engraver::{engrave_score, engrave_with_metrics};
pub use error::{EngraveError, Result};
pub use model::*;
pub use parser::parse_score_xml;
pub use archive::parse_score_archive;
pub use resolve::resolve_score;

/// Parse a score file from a path. Zip containers are detected by content.
/// Syntax errors carry the file name.
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Score> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| EngraveError::Io { path: path.to_path_buf(), source })?;
    parse_bytes(&data).map_err(|e| e.in_file(&path.display().to_string()))
}

/// Parse a score from raw bytes: a zip container (`PK` magic) or XML text.
pub fn parse_bytes(data: &[u8]) -> Result<Score> {
    if data.starts_with(b"PK") {
        return parse_score_archive(data);
    }
    let xml = std::str::from_utf8(data)
        .map_err(|e| EngraveError::syntax(format!("score is neither a zip container nor UTF-8 text: {e}")))?;
    parse_score_xml(xml)
}

/// Parse, resolve and lay out a score file.
pub fn engrave_file<P: AsRef<Path>>(path: P, config: &EngraveConfig) -> Result<EngravedScore> {
    let path = path.as_ref();
    let mut score = parse_file(path)?;
    resolve_score(&mut score)?;
    let engraved = engrave_score(&score, config)?;
    info!(
        "{}: {} pages, {:.0} ms",
        path.display(),
        engraved.pages.len(),
        engraved.total_duration_ms
    );
    Ok(engraved)
}

/// Parse, resolve and lay out score bytes.
pub fn engrave_bytes(data: &[u8], config: &EngraveConfig) -> Result<EngravedScore> {
    let mut score = parse_bytes(data)?;
    resolve_score(&mut score)?;
    engrave_score(&score, config)
}

/// Outcome of one file in a batch run.
#[derive(Debug)]
pub struct BatchResult {
    pub path: PathBuf,
    pub result: Result<EngravedScore>,
}

/// Engrave many files. A failing file is logged and reported in its own
/// result; the remaining files are still processed.
pub fn engrave_batch<I, P>(paths: I, config: &EngraveConfig) -> Vec<BatchResult>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|path| {
            let path = path.as_ref().to_path_buf();
            let result = engrave_file(&path, config);
            if let Err(e) = &result {
                warn!("{}: {e}", path.display());
            }
            BatchResult { path, result }
        })
        .collect()
}

/// Serialize engraved geometry to a JSON string.
/// Useful for passing data across FFI boundaries.
pub fn geometry_to_json(score: &EngravedScore) -> Result<String> {
    Ok(serde_json::to_string(score)?)
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI: static library / shared object
// ═══════════════════════════════════════════════════════════════════════

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Engrave score bytes and return the geometry as a JSON C string.
/// The caller must free the returned string with `engravelib_free_string`.
///
/// `config_json` may be null for the default configuration. Returns null
/// on any error.
///
/// # Safety
/// `data` must point to `len` valid bytes. `config_json` must be null or a
/// valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn engravelib_engrave_bytes(
    data: *const u8,
    len: usize,
    config_json: *const c_char,
) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    let config = if config_json.is_null() {
        EngraveConfig::default()
    } else {
        let parsed = unsafe { CStr::from_ptr(config_json) }
            .to_str()
            .map_err(|e| EngraveError::Config(e.to_string()))
            .and_then(EngraveConfig::from_json);
        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!("ffi: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    match engrave_bytes(bytes, &config).and_then(|score| geometry_to_json(&score)) {
        Ok(json) => CString::new(json).unwrap_or_default().into_raw(),
        Err(e) => {
            warn!("ffi: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Free a string previously returned by engravelib functions.
///
/// # Safety
/// `ptr` must be a string previously returned by an engravelib function, or null.
#[no_mangle]
pub unsafe extern "C" fn engravelib_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}
