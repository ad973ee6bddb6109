//! Beat ↔ pixel mapping within one row.
//!
//! The forward mapping rounds to whole pixels; the inverse mapping snaps to
//! the half-beat grid. Both go through [`snap_half_beat`], so
//! `x_to_beat(beat_to_x(b)) == b` for every half-beat `b` in the row as
//! long as a half beat is wider than one pixel.

use serde::Serialize;

use super::RowLayout;

/// Forward bias applied before snapping, so values a hair below a grid
/// line (floating drift) land on it rather than half a beat earlier.
pub const SNAP_EPSILON: f64 = 1e-6;

/// Snap a raw beat value to the nearest half beat.
pub fn snap_half_beat(raw: f64) -> f64 {
    ((raw + SNAP_EPSILON) * 2.0).round() / 2.0
}

/// Result of mapping a pixel x to a beat in a row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatHit {
    /// Snapped beat within the row
    pub beat: f64,
    /// The pointer lay outside the row's beat span and was pulled back in
    pub clamped: bool,
}

/// x (page coordinates, whole pixels) of `beat_in_row`.
///
/// Beats outside the row are clamped to its span.
pub fn beat_to_x(row: &RowLayout, beat_in_row: f64) -> f64 {
    if !beat_in_row.is_finite() {
        log::warn!("non-finite beat {beat_in_row} in row {}; using beat 0", row.index);
        return beat_to_x(row, 0.0);
    }
    let beat = beat_in_row.clamp(0.0, row.total_beats);
    match row.measure_at(beat) {
        Some(m) => (row.left() + m.offset + (beat - m.start_beat) * row.beat_width).round(),
        None => row.left().round(),
    }
}

/// Snapped beat under page x `x`.
pub fn x_to_beat(row: &RowLayout, x: f64) -> f64 {
    resolve_x(row, x).beat
}

/// Map page x to a half-beat in the row, reporting whether it had to be
/// clamped into range.
///
/// A measure claims x from the start of its decorations, so a click on a
/// repeat sign or meter label lands on the measure's first beat. When the
/// snapped beat runs past a measure's end the next measure takes over;
/// only past the last measure is the beat clamped.
pub fn resolve_x(row: &RowLayout, x: f64) -> BeatHit {
    if row.measures.is_empty() || row.beat_width <= 0.0 {
        return BeatHit {
            beat: 0.0,
            clamped: true,
        };
    }
    if !x.is_finite() {
        log::warn!("non-finite x {x} in row {}; using beat 0", row.index);
        return BeatHit {
            beat: 0.0,
            clamped: true,
        };
    }

    let local = x - row.left();
    let left_of_row = local < row.measures[0].decoration_start();
    let mut idx = row
        .measures
        .iter()
        .rposition(|m| local >= m.decoration_start())
        .unwrap_or(0);

    loop {
        let m = &row.measures[idx];
        let raw = m.start_beat + (local - m.offset) / row.beat_width;
        let snapped = snap_half_beat(raw).max(m.start_beat);

        if snapped < m.end_beat() - 1e-9 {
            return BeatHit {
                beat: snapped,
                clamped: left_of_row,
            };
        }
        if idx + 1 < row.measures.len() {
            idx += 1;
            continue;
        }
        return BeatHit {
            beat: (row.total_beats - 0.5).max(0.0),
            clamped: true,
        };
    }
}

/// Snap page x to the nearest half-beat column and project it back to a
/// pixel x, kept within the row.
pub fn snap_x(row: &RowLayout, x: f64) -> f64 {
    let beat = x_to_beat(row, x);
    beat_to_x(row, beat).clamp(row.left(), row.right())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutParams;
    use crate::layout::compute_row_layouts;
    use crate::layout::constants::*;
    use crate::model::*;

    fn single_row(measures: usize, meter: Meter) -> RowLayout {
        let params = LayoutParams::new(measures, 1.0);
        compute_row_layouts(measures, meter, &[], &[], &params)
            .into_iter()
            .next()
            .unwrap()
    }

    fn decorated_row() -> RowLayout {
        let markers = [
            RepeatMarker {
                id: "s".into(),
                pair_id: "p".into(),
                kind: RepeatKind::Start,
                measure: 0,
            },
            RepeatMarker {
                id: "e".into(),
                pair_id: "p".into(),
                kind: RepeatKind::End,
                measure: 2,
            },
        ];
        let changes = [MeterChange {
            measure: 2,
            meter: Meter::new(3, 4),
        }];
        compute_row_layouts(3, Meter::new(4, 4), &changes, &markers, &LayoutParams::new(3, 1.0))
            .into_iter()
            .next()
            .unwrap()
    }

    #[test]
    fn snap_biases_forward() {
        assert_eq!(snap_half_beat(3.999999), 4.0);
        assert_eq!(snap_half_beat(1.24), 1.0);
        assert_eq!(snap_half_beat(1.25), 1.5);
        assert_eq!(snap_half_beat(-0.1), 0.0);
    }

    #[test]
    fn forward_mapping_rounds_to_pixels() {
        let row = decorated_row();
        for i in 0..(row.total_beats as usize * 4) {
            let x = beat_to_x(&row, i as f64 * 0.25);
            assert_eq!(x, x.round());
        }
        assert_eq!(beat_to_x(&row, 0.0), (ROW_LEFT_MARGIN + REPEAT_START_WIDTH).round());
    }

    #[test]
    fn half_beats_round_trip() {
        for row in [single_row(4, Meter::new(4, 4)), single_row(3, Meter::new(6, 8)), decorated_row()] {
            let steps = (row.total_beats * 2.0) as usize;
            for i in 0..steps {
                let b = i as f64 * 0.5;
                assert_eq!(x_to_beat(&row, beat_to_x(&row, b)), b, "beat {b}");
            }
        }
    }

    #[test]
    fn drift_at_row_end_clamps_to_last_half_beat() {
        let row = single_row(1, Meter::new(4, 4));
        assert_eq!(row.total_beats, 4.0);
        let x = row.left() + row.measures[0].offset + 3.999999 * row.beat_width;
        let hit = resolve_x(&row, x);
        assert_eq!(hit.beat, 3.5);
        assert!(hit.clamped);
        assert_eq!(x_to_beat(&row, beat_to_x(&row, 3.999999)), 3.5);
    }

    #[test]
    fn decoration_zone_resolves_to_measure_start() {
        let row = decorated_row();
        let m2 = &row.measures[2];
        assert!(m2.prefix_width > 0.0);
        let x = row.left() + m2.offset - m2.prefix_width / 2.0;
        assert_eq!(x_to_beat(&row, x), m2.start_beat);

        // The repeat start sits in front of measure 0.
        let x0 = row.left() + 2.0;
        let hit = resolve_x(&row, x0);
        assert_eq!(hit.beat, 0.0);
        assert!(!hit.clamped);
    }

    #[test]
    fn click_just_before_barline_goes_to_next_measure() {
        let row = single_row(2, Meter::new(4, 4));
        let barline = row.left() + row.measures[1].offset;
        assert_eq!(x_to_beat(&row, barline - 0.1 * row.beat_width), 4.0);
        assert_eq!(x_to_beat(&row, barline - 0.3 * row.beat_width), 3.5);
    }

    #[test]
    fn pointer_outside_row_is_clamped() {
        let row = single_row(2, Meter::new(4, 4));
        let left = resolve_x(&row, row.left() - 50.0);
        assert_eq!(left, BeatHit { beat: 0.0, clamped: true });
        let right = resolve_x(&row, row.right() + 50.0);
        assert_eq!(right, BeatHit { beat: 7.5, clamped: true });
        assert_eq!(beat_to_x(&row, -3.0), beat_to_x(&row, 0.0));
        assert_eq!(beat_to_x(&row, f64::NAN), beat_to_x(&row, 0.0));
        assert_eq!(x_to_beat(&row, f64::INFINITY), 0.0);
    }

    #[test]
    fn snap_x_lands_on_grid_within_row() {
        let row = single_row(2, Meter::new(4, 4));
        let x = row.left() + 1.3 * row.beat_width;
        assert_eq!(snap_x(&row, x), beat_to_x(&row, 1.5));
        let far = snap_x(&row, row.right() + 500.0);
        assert!(far <= row.right());
        assert!(snap_x(&row, -500.0) >= row.left());
    }
}
