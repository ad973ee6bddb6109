//! stafflib — staff layout and beaming engine for an interactive score editor.
//!
//! Given a [`Composition`] (notes at absolute beats, meters, repeats and
//! voltas) and [`LayoutParams`], the engine partitions measures into rows of
//! equal width, maps beats and pitches to pixels and back, groups short
//! notes into beams and checks each measure's duration. MusicXML (.musicxml)
//! and compressed MXL (.mxl) files can be imported as compositions.
//!
//! # Example
//! ```no_run
//! use stafflib::{parse_file, LayoutParams, Snapshot};
//!
//! let composition = parse_file("path/to/score.musicxml").unwrap();
//! let snapshot = Snapshot::compute(&composition, &LayoutParams::default());
//! println!("Rows: {}", snapshot.rows.len());
//! println!("Beam groups: {}", snapshot.beam_groups.len());
//! ```

pub mod beaming;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod meter;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod pitch;
pub mod validate;

use std::path::Path;

pub use beaming::{group_beams, BeamGroup, BeamLine, SecondaryBeam, Stem, StemDirection};
pub use config::LayoutParams;
pub use engine::{NotePlacement, PointerHit, Snapshot, SnapshotCache};
pub use error::{Result, StaffError};
pub use layout::{
    absolute_beat_to_row_position, beat_to_x, compute_rows, disambiguate_row, resolve_x,
    row_position_to_absolute_beat, x_to_beat, MeasureLayout, RowLayout, RowPosition,
};
pub use meter::{metrics, MeterMap, MeterMetrics};
pub use model::*;
pub use mxl::parse_mxl;
pub use parser::parse_musicxml;
pub use pitch::{pitch_to_staff_position, staff_position_to_pitch, StaffGeometry};
pub use validate::{validate_measures, validate_structure, MeasureReport, StructureIssue};

/// Import a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Composition> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    parse_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Import MusicXML from raw bytes with an optional format hint.
/// If `extension` is None, tries to auto-detect the format.
pub fn parse_bytes(data: &[u8], extension: Option<&str>) -> Result<Composition> {
    match extension {
        Some("mxl") => parse_mxl(data),
        Some("musicxml") | Some("xml") => parse_musicxml(std::str::from_utf8(data)?),
        _ => {
            // Auto-detect: XML starts with '<', anything else is tried as ZIP
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start().starts_with('<') {
                    return parse_musicxml(xml);
                }
            }
            parse_mxl(data)
        }
    }
}

/// Load a composition from its JSON form.
pub fn composition_from_json(json: &str) -> Result<Composition> {
    Ok(serde_json::from_str(json)?)
}

/// Convert a composition to a JSON string.
pub fn composition_to_json(composition: &Composition) -> Result<String> {
    Ok(serde_json::to_string_pretty(composition)?)
}

/// Compute the snapshot of a JSON composition with JSON layout parameters
/// and return it as JSON. Convenience for hosts that talk JSON only.
pub fn snapshot_json(composition_json: &str, params_json: &str) -> Result<String> {
    let composition = composition_from_json(composition_json)?;
    let params = LayoutParams::from_json(params_json)?;
    Snapshot::compute(&composition, &params).to_json()
}
