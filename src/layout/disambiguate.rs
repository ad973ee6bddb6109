//! Picks the row a pointer interaction belongs to when the row estimated
//! from its height may be off by one (the pointer drifted vertically).

use serde::Serialize;

use super::coords::{resolve_x, BeatHit};
use super::RowLayout;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RowHit {
    pub row: usize,
    pub beat_in_row: f64,
}

/// Resolve `(estimated_row, x)` to a row and snapped beat.
///
/// If x only fits the estimated row by clamping but fits the row above
/// without clamping, the row above wins. Otherwise the estimate is kept;
/// an out-of-range estimate falls back to the row below it, then to the
/// nearest valid row. Returns `None` only when there are no rows.
pub fn disambiguate_row(rows: &[RowLayout], estimated_row: i64, x: f64) -> Option<RowHit> {
    if rows.is_empty() {
        return None;
    }
    let last = rows.len() as i64 - 1;
    let hit = |row: usize| -> RowHit {
        let BeatHit { beat, .. } = resolve_x(&rows[row], x);
        RowHit {
            row,
            beat_in_row: beat,
        }
    };

    if (0..=last).contains(&estimated_row) {
        let row = estimated_row as usize;
        if row > 0 {
            let here = resolve_x(&rows[row], x);
            let above = resolve_x(&rows[row - 1], x);
            if here.clamped && !above.clamped {
                return Some(RowHit {
                    row: row - 1,
                    beat_in_row: above.beat,
                });
            }
        }
        return Some(hit(row));
    }

    let below = estimated_row + 1;
    if (0..=last).contains(&below) {
        return Some(hit(below as usize));
    }
    Some(hit(estimated_row.clamp(0, last) as usize))
}
