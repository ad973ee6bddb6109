//! Absolute beat ↔ (row, beat-in-row) conversion.
//!
//! Rows are recomputed whenever the layout parameters change, so stored
//! notes only ever carry absolute beats. No rounding happens here.

use serde::Serialize;

use super::RowLayout;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RowPosition {
    pub row: usize,
    pub beat_in_row: f64,
}

/// Find the row holding `beat` and the beat's offset into it.
///
/// Beats past the end stay in the last row (unclamped), so the conversion
/// remains exact. Negative or non-finite beats resolve to row 0, beat 0.
pub fn absolute_beat_to_row_position(rows: &[RowLayout], beat: f64) -> RowPosition {
    if !beat.is_finite() || beat < 0.0 {
        log::warn!("invalid absolute beat {beat}; placing at row 0, beat 0");
        return RowPosition {
            row: 0,
            beat_in_row: 0.0,
        };
    }
    match rows.iter().rposition(|r| r.start_beat <= beat) {
        Some(row) => RowPosition {
            row,
            beat_in_row: beat - rows[row].start_beat,
        },
        None => RowPosition {
            row: 0,
            beat_in_row: beat,
        },
    }
}

/// Absolute beat of `beat_in_row` in row `row`. Rows past the end are
/// clamped to the last row.
pub fn row_position_to_absolute_beat(rows: &[RowLayout], row: usize, beat_in_row: f64) -> f64 {
    let start = match rows.get(row).or_else(|| rows.last()) {
        Some(r) => r.start_beat,
        None => 0.0,
    };
    if row >= rows.len() && !rows.is_empty() {
        log::warn!("row {row} out of range ({} rows); using the last row", rows.len());
    }
    start + beat_in_row
}
