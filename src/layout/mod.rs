//! Row layout — partitions measures into rows ("systems") and sizes them.
//!
//! Every row renders at the same total width. Decorations (meter labels,
//! repeat barlines) take fixed pixel widths, and each row gets its own
//! beat width so the beats absorb whatever space the decorations leave.

pub mod constants;
pub mod coords;
pub mod disambiguate;
pub mod timeline;

use serde::Serialize;

use crate::config::LayoutParams;
use crate::meter::{metrics, MeterMap};
use crate::model::*;
use constants::*;

pub use coords::{beat_to_x, resolve_x, snap_half_beat, snap_x, x_to_beat, BeatHit};
pub use disambiguate::{disambiguate_row, RowHit};
pub use timeline::{absolute_beat_to_row_position, row_position_to_absolute_beat, RowPosition};

// ═══════════════════════════════════════════════════════════════════════
// Layout structures
// ═══════════════════════════════════════════════════════════════════════

/// One measure placed in a row. Offsets are relative to the row's left
/// margin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureLayout {
    /// Absolute measure index in the composition
    pub measure_index: usize,
    pub meter: Meter,
    pub beats: f64,
    /// First beat of the measure, counted from the row start
    pub start_beat: f64,
    pub beam_groups: &'static [u32],
    pub shade_groups: &'static [u32],
    pub show_meter_label: bool,
    pub has_repeat_start: bool,
    pub has_repeat_end: bool,
    /// Decoration space before beat 0 of the measure
    pub prefix_width: f64,
    /// Decoration space after the last beat
    pub suffix_width: f64,
    /// x of beat 0 of the measure (after the prefix)
    pub offset: f64,
}

impl MeasureLayout {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.beats
    }

    /// x where the measure's decorations begin.
    pub fn decoration_start(&self) -> f64 {
        self.offset - self.prefix_width
    }
}

/// One row of measures. Derived from the composition on every change and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLayout {
    pub index: usize,
    pub measures: Vec<MeasureLayout>,
    /// Absolute beat at which the row starts
    pub start_beat: f64,
    pub total_beats: f64,
    /// Pixels per beat in this row
    pub beat_width: f64,
    /// Width shared by every row (decorations + beats)
    pub total_width: f64,
    pub decoration_width: f64,
}

impl RowLayout {
    /// x of the row's left edge (page coordinates).
    pub fn left(&self) -> f64 {
        ROW_LEFT_MARGIN
    }

    pub fn right(&self) -> f64 {
        ROW_LEFT_MARGIN + self.total_width
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.total_beats
    }

    pub fn first_measure(&self) -> usize {
        self.measures.first().map_or(0, |m| m.measure_index)
    }

    /// Index of the measure owning `beat_in_row`: the last one whose start
    /// is at or before it.
    pub fn measure_position(&self, beat_in_row: f64) -> usize {
        let idx = self
            .measures
            .partition_point(|m| m.start_beat <= beat_in_row + 1e-9);
        idx.saturating_sub(1)
    }

    pub fn measure_at(&self, beat_in_row: f64) -> Option<&MeasureLayout> {
        self.measures.get(self.measure_position(beat_in_row))
    }

    pub fn top(&self) -> f64 {
        row_top(self.index)
    }

    pub fn staff_top(&self) -> f64 {
        row_top(self.index) + STAFF_TOP_IN_ROW
    }
}

/// y of the top of row `row`.
pub fn row_top(row: usize) -> f64 {
    ROW_TOP_MARGIN + row as f64 * ROW_HEIGHT
}

/// Row band a y coordinate falls in. Not clamped: callers pass the result
/// to [`disambiguate_row`], which deals with out-of-range rows.
pub fn estimate_row(y: f64) -> i64 {
    if !y.is_finite() {
        log::warn!("non-finite y {y} mapped to row 0");
        return 0;
    }
    ((y - ROW_TOP_MARGIN) / ROW_HEIGHT).floor() as i64
}

// ═══════════════════════════════════════════════════════════════════════
// Main layout computation
// ═══════════════════════════════════════════════════════════════════════

struct MeasureDraft {
    measure_index: usize,
    meter: Meter,
    beats: f64,
    show_meter_label: bool,
    has_repeat_start: bool,
    has_repeat_end: bool,
    prefix_width: f64,
    suffix_width: f64,
}

struct RowDraft {
    measures: Vec<MeasureDraft>,
    beats: f64,
    decoration: f64,
}

/// Lay out a composition's measures into rows.
pub fn compute_rows(composition: &Composition, params: &LayoutParams) -> Vec<RowLayout> {
    compute_row_layouts(
        composition.measure_count(),
        composition.meter,
        &composition.meter_changes,
        &composition.repeat_markers,
        params,
    )
}

/// Two-pass row layout.
///
/// Pass 1 resolves each measure's meter and decorations and totals every
/// row. The widest row (beats at the reference width, floored, plus its
/// decorations) sets the uniform row width. Pass 2 derives each row's beat
/// width from that target and places the measures left to right.
pub fn compute_row_layouts(
    measure_count: usize,
    meter: Meter,
    meter_changes: &[MeterChange],
    repeat_markers: &[RepeatMarker],
    params: &LayoutParams,
) -> Vec<RowLayout> {
    let params = params.sanitized();
    let meters = MeterMap::new(meter, meter_changes);
    let per_row = params.measures_per_row;
    let row_count = measure_count.div_ceil(per_row);

    let has_marker = |kind: RepeatKind, measure: usize| {
        repeat_markers
            .iter()
            .any(|m| m.kind == kind && m.measure == measure)
    };

    // ── Pass 1: measure ─────────────────────────────────────────────
    let mut drafts: Vec<RowDraft> = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let first = row * per_row;
        let last = ((row + 1) * per_row).min(measure_count);
        if first >= last {
            continue;
        }

        let mut measures = Vec::with_capacity(last - first);
        let mut beats = 0.0;
        let mut decoration = 0.0;

        for mi in first..last {
            let meter = meters.meter_at(mi);
            let measure_beats = metrics(meter).beats_per_measure as f64;

            // The first measure's meter sits in the margin, never inline.
            let row_start_differs = mi == first
                && mi > 0
                && meter != meters.meter_at(mi - 1)
                && meter != meters.initial();
            let show_meter_label = mi > 0 && (meters.changes_at(mi) || row_start_differs);

            let has_repeat_start = has_marker(RepeatKind::Start, mi);
            // End markers are stored against the measure they precede.
            let has_repeat_end = has_marker(RepeatKind::End, mi + 1);

            let mut prefix_width = 0.0;
            if show_meter_label {
                prefix_width += METER_LABEL_WIDTH;
            }
            if has_repeat_start {
                prefix_width += REPEAT_START_WIDTH;
            }
            let suffix_width = if has_repeat_end { REPEAT_END_WIDTH } else { 0.0 };

            beats += measure_beats;
            decoration += prefix_width + suffix_width;

            measures.push(MeasureDraft {
                measure_index: mi,
                meter,
                beats: measure_beats,
                show_meter_label,
                has_repeat_start,
                has_repeat_end,
                prefix_width,
                suffix_width,
            });
        }

        drafts.push(RowDraft {
            measures,
            beats,
            decoration,
        });
    }

    let scaled_beat_width = REFERENCE_BEAT_WIDTH * params.note_spacing;
    let target_width = drafts
        .iter()
        .map(|r| (r.beats * scaled_beat_width).max(MIN_ROW_CONTENT_WIDTH) + r.decoration)
        .fold(0.0_f64, f64::max);

    // ── Pass 2: layout ──────────────────────────────────────────────
    let mut rows = Vec::with_capacity(drafts.len());
    let mut row_start_beat = 0.0;

    for (index, draft) in drafts.into_iter().enumerate() {
        let beat_width = if draft.beats > 0.0 {
            (target_width - draft.decoration) / draft.beats
        } else {
            scaled_beat_width
        };

        let mut measures = Vec::with_capacity(draft.measures.len());
        let mut running_x = 0.0;
        let mut running_beat = 0.0;

        for m in draft.measures {
            let mm = metrics(m.meter);
            measures.push(MeasureLayout {
                measure_index: m.measure_index,
                meter: m.meter,
                beats: m.beats,
                start_beat: running_beat,
                beam_groups: mm.beam_groups,
                shade_groups: mm.shade_groups,
                show_meter_label: m.show_meter_label,
                has_repeat_start: m.has_repeat_start,
                has_repeat_end: m.has_repeat_end,
                prefix_width: m.prefix_width,
                suffix_width: m.suffix_width,
                offset: running_x + m.prefix_width,
            });
            running_x += m.prefix_width + m.beats * beat_width + m.suffix_width;
            running_beat += m.beats;
        }

        rows.push(RowLayout {
            index,
            measures,
            start_beat: row_start_beat,
            total_beats: draft.beats,
            beat_width,
            total_width: target_width,
            decoration_width: draft.decoration,
        });
        row_start_beat += draft.beats;
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(pair: &str, kind: RepeatKind, measure: usize) -> RepeatMarker {
        RepeatMarker {
            id: format!("{pair}-{kind:?}"),
            pair_id: pair.to_string(),
            kind,
            measure,
        }
    }

    fn rendered_width(row: &RowLayout) -> f64 {
        row.measures
            .iter()
            .map(|m| m.prefix_width + m.beats * row.beat_width + m.suffix_width)
            .sum()
    }

    #[test]
    fn measures_are_sliced_by_row_capacity() {
        let rows = compute_row_layouts(10, Meter::new(4, 4), &[], &[], &LayoutParams::new(4, 1.0));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].measures.len(), 4);
        assert_eq!(rows[2].measures.len(), 2);
        assert_eq!(rows[2].first_measure(), 8);
        assert_eq!(rows[1].start_beat, 16.0);
        assert_eq!(rows[2].start_beat, 32.0);
    }

    #[test]
    fn short_last_row_keeps_the_shared_width() {
        let rows = compute_row_layouts(5, Meter::new(4, 4), &[], &[], &LayoutParams::new(4, 1.0));
        assert_eq!(rows[0].total_width, 16.0 * REFERENCE_BEAT_WIDTH);
        for row in &rows {
            assert!((rendered_width(row) - row.total_width).abs() < 1e-9);
        }
        // One 4-beat measure stretched over the full width.
        assert_eq!(rows[1].beat_width, rows[1].total_width / 4.0);
    }

    #[test]
    fn decorations_shrink_the_beat_width() {
        let markers = [marker("a", RepeatKind::Start, 1), marker("a", RepeatKind::End, 3)];
        let rows = compute_row_layouts(8, Meter::new(4, 4), &[], &markers, &LayoutParams::new(4, 1.0));
        let decorated = &rows[0];
        assert!(decorated.measures[1].has_repeat_start);
        // The end marker at measure 3 closes measure 2.
        assert!(decorated.measures[2].has_repeat_end);
        assert!(!decorated.measures[3].has_repeat_end);
        assert_eq!(decorated.decoration_width, REPEAT_START_WIDTH + REPEAT_END_WIDTH);
        assert!(decorated.beat_width < rows[1].beat_width);
        assert_eq!(decorated.total_width, rows[1].total_width);
        assert!((rendered_width(decorated) - decorated.total_width).abs() < 1e-9);
    }

    #[test]
    fn offsets_accumulate_prefix_beats_and_suffix() {
        let markers = [marker("a", RepeatKind::Start, 1), marker("a", RepeatKind::End, 2)];
        let rows = compute_row_layouts(3, Meter::new(4, 4), &[], &markers, &LayoutParams::new(3, 1.0));
        let row = &rows[0];
        let bw = row.beat_width;
        assert_eq!(row.measures[0].offset, 0.0);
        assert_eq!(row.measures[1].offset, 4.0 * bw + REPEAT_START_WIDTH);
        assert_eq!(
            row.measures[2].offset,
            4.0 * bw + REPEAT_START_WIDTH + 4.0 * bw + REPEAT_END_WIDTH
        );
        assert_eq!(row.measures[2].start_beat, 8.0);
    }

    #[test]
    fn meter_label_only_where_the_meter_changes() {
        let changes = [
            MeterChange { measure: 0, meter: Meter::new(3, 4) },
            MeterChange { measure: 2, meter: Meter::new(6, 8) },
        ];
        let rows = compute_row_layouts(6, Meter::new(3, 4), &changes, &[], &LayoutParams::new(2, 1.0));
        // Never on the very first measure, even with a change recorded there.
        assert!(!rows[0].measures[0].show_meter_label);
        assert!(rows[1].measures[0].show_meter_label);
        assert!(!rows[1].measures[1].show_meter_label);
        assert!(!rows[2].measures[0].show_meter_label);
        assert_eq!(rows[1].measures[0].beam_groups, &[3, 3]);
        assert_eq!(rows[1].total_beats, 12.0);
    }

    #[test]
    fn narrow_rows_are_floored_to_minimum_width() {
        let rows = compute_row_layouts(1, Meter::new(2, 4), &[], &[], &LayoutParams::new(1, 1.0));
        assert_eq!(rows[0].total_width, MIN_ROW_CONTENT_WIDTH);
        assert_eq!(rows[0].beat_width, MIN_ROW_CONTENT_WIDTH / 2.0);
    }

    #[test]
    fn note_spacing_scales_the_width() {
        let narrow = compute_row_layouts(8, Meter::new(4, 4), &[], &[], &LayoutParams::new(4, 1.0));
        let wide = compute_row_layouts(8, Meter::new(4, 4), &[], &[], &LayoutParams::new(4, 1.5));
        assert_eq!(wide[0].total_width, narrow[0].total_width * 1.5);
    }

    #[test]
    fn no_measures_means_no_rows() {
        let rows = compute_row_layouts(0, Meter::new(4, 4), &[], &[], &LayoutParams::default());
        assert!(rows.is_empty());
    }

    #[test]
    fn measure_lookup_by_beat() {
        let rows = compute_row_layouts(4, Meter::new(3, 4), &[], &[], &LayoutParams::new(4, 1.0));
        assert_eq!(rows[0].measure_position(0.0), 0);
        assert_eq!(rows[0].measure_position(2.5), 0);
        assert_eq!(rows[0].measure_position(3.0), 1);
        assert_eq!(rows[0].measure_position(11.5), 3);
        assert_eq!(rows[0].measure_position(-1.0), 0);
    }

    #[test]
    fn row_bands_from_y() {
        assert_eq!(estimate_row(ROW_TOP_MARGIN + 1.0), 0);
        assert_eq!(estimate_row(row_top(2) + 5.0), 2);
        assert_eq!(estimate_row(0.0), -1);
    }
}
