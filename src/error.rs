//! Error taxonomy for a conversion run.
//!
//! Every error aborts the conversion of the current score. Batch callers
//! catch per file (see [`crate::engrave_batch`]).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::duration::DurationError;

/// Where in a source document a syntax error was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), 0) => write!(f, "{file}"),
            (Some(file), line) => write!(f, "{file}:{line}:{}", self.column),
            (None, 0) => write!(f, "<unknown>"),
            (None, line) => write!(f, "line {line}, column {}", self.column),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngraveError {
    /// Malformed duration or measure-location token, or a bad attribute value.
    #[error("syntax error at {location}: {message}")]
    Syntax {
        location: SourceLocation,
        message: String,
    },

    /// Missing required child or broken structure (unmatched beams, ...).
    #[error("structural error: {0}")]
    Structural(String),

    /// Internal invariant violation while resolving ticks.
    #[error("resolution error: {0}")]
    Resolution(String),

    #[error("xml parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngraveError {
    pub fn syntax(message: impl Into<String>) -> Self {
        EngraveError::Syntax {
            location: SourceLocation::default(),
            message: message.into(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        EngraveError::Structural(message.into())
    }

    /// Attach a file name to a syntax error's location. Other variants are
    /// returned unchanged.
    pub fn in_file(self, file: &str) -> Self {
        match self {
            EngraveError::Syntax { mut location, message } => {
                location.file = Some(file.to_string());
                EngraveError::Syntax { location, message }
            }
            other => other,
        }
    }
}

impl From<DurationError> for EngraveError {
    fn from(err: DurationError) -> Self {
        match err {
            DurationError::Syntax(msg) => EngraveError::syntax(msg),
            DurationError::Resolution(msg) => EngraveError::Resolution(msg),
        }
    }
}

impl From<zip::result::ZipError> for EngraveError {
    fn from(err: zip::result::ZipError) -> Self {
        EngraveError::Archive(err.to_string())
    }
}

pub type Result<T, E = EngraveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_reports_file_and_line() {
        let err = EngraveError::Syntax {
            location: SourceLocation { file: None, line: 12, column: 5 },
            message: "unknown base symbol '3'".into(),
        }
        .in_file("fugue.xml");
        assert_eq!(
            err.to_string(),
            "syntax error at fugue.xml:12:5: unknown base symbol '3'"
        );
    }

    #[test]
    fn duration_errors_map_to_taxonomy() {
        let e: EngraveError = DurationError::Resolution("negative span".into()).into();
        assert!(matches!(e, EngraveError::Resolution(_)));
        let e: EngraveError = DurationError::Syntax("bad".into()).into();
        assert!(matches!(e, EngraveError::Syntax { .. }));
    }
}
