//! Error type for the fallible boundary of the crate: importing MusicXML,
//! loading layout parameters and exporting snapshots.
//!
//! The layout, coordinate and beaming functions never return errors; they
//! degrade to a sane default and report through `log` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StaffError {
    /// The input could not be parsed as XML.
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document parsed but is not a `score-partwise` MusicXML file.
    #[error("Unsupported root element: '{0}'. Only 'score-partwise' is supported.")]
    UnsupportedRoot(String),

    /// The score has no `<part>` to import.
    #[error("Score contains no parts")]
    NoParts,

    /// A compressed .mxl archive could not be read.
    #[error("Failed to read MXL archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The .mxl archive does not contain a MusicXML root file.
    #[error("No MusicXML file found in archive. Files: {0:?}")]
    MissingRootFile(Vec<String>),

    /// Reading a file or archive entry failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not valid UTF-8.
    #[error("Invalid UTF-8 in MusicXML file: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// JSON (de)serialization of params or snapshots failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StaffError>;
