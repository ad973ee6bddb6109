//! Layout parameters supplied by the host (row capacity, spacing, staff).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout::constants::STAFF_LINE_SPACING;
use crate::pitch::StaffGeometry;

pub const DEFAULT_MEASURES_PER_ROW: usize = 4;
pub const DEFAULT_NOTE_SPACING: f64 = 1.0;
pub const DEFAULT_STAFF_LINE_COUNT: u8 = 5;
pub const MAX_STAFF_LINE_COUNT: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Row capacity in measures
    pub measures_per_row: usize,
    /// Horizontal note-spacing scale, at least 1.0
    pub note_spacing: f64,
    /// Number of staff lines drawn per row
    pub staff_line_count: u8,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            measures_per_row: DEFAULT_MEASURES_PER_ROW,
            note_spacing: DEFAULT_NOTE_SPACING,
            staff_line_count: DEFAULT_STAFF_LINE_COUNT,
        }
    }
}

impl LayoutParams {
    pub fn new(measures_per_row: usize, note_spacing: f64) -> Self {
        Self {
            measures_per_row,
            note_spacing,
            ..Default::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let params: LayoutParams = serde_json::from_str(json)?;
        Ok(params.sanitized())
    }

    /// Clamp every field into its usable range.
    pub fn sanitized(self) -> Self {
        let note_spacing = if self.note_spacing.is_finite() && self.note_spacing >= 1.0 {
            self.note_spacing
        } else {
            if self.note_spacing != DEFAULT_NOTE_SPACING {
                log::warn!("note spacing {} out of range; using 1.0", self.note_spacing);
            }
            DEFAULT_NOTE_SPACING
        };
        Self {
            measures_per_row: self.measures_per_row.max(1),
            note_spacing,
            staff_line_count: self.staff_line_count.clamp(1, MAX_STAFF_LINE_COUNT),
        }
    }

    pub fn staff(&self) -> StaffGeometry {
        StaffGeometry::new(self.staff_line_count, STAFF_LINE_SPACING)
    }
}
