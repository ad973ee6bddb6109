//! Engine snapshot: every derived view of a composition for one set of
//! layout parameters, computed together so they always agree.
//!
//! The host renders straight from a [`Snapshot`] and feeds pointer
//! positions back through [`Snapshot::hit_test`]. Snapshots are plain
//! values; [`SnapshotCache`] keeps the latest one until the composition
//! version or the parameters change, or it is invalidated.

use serde::Serialize;

use crate::beaming::{group_beams, BeamGroup, StemDirection};
use crate::config::LayoutParams;
use crate::error::Result;
use crate::layout::{
    absolute_beat_to_row_position, beat_to_x, compute_rows, disambiguate_row, estimate_row,
    row_position_to_absolute_beat, RowLayout, RowPosition,
};
use crate::model::{Composition, Pitch};
use crate::pitch::{pitch_to_staff_position, staff_position_to_pitch, StaffGeometry};
use crate::validate::{validate_measures, validate_structure, MeasureReport};

/// Where one note is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotePlacement {
    /// Index into the composition's notes
    pub note: usize,
    pub row: usize,
    pub beat_in_row: f64,
    /// Notehead center x (page coordinates)
    pub x: f64,
    /// Notehead center y (page coordinates)
    pub y: f64,
    pub staff_position: i32,
    /// None for rests
    pub stem: Option<StemDirection>,
    /// Whether the note is drawn as part of a beam group
    pub beamed: bool,
}

/// A pointer position resolved against the layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointerHit {
    pub row: usize,
    pub beat_in_row: f64,
    pub absolute_beat: f64,
    pub staff_position: i32,
    pub pitch: Pitch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub params: LayoutParams,
    pub rows: Vec<RowLayout>,
    pub placements: Vec<NotePlacement>,
    pub beam_groups: Vec<BeamGroup>,
    pub measure_reports: Vec<MeasureReport>,
    /// Human-readable repeat, volta and meter problems
    pub structure_issues: Vec<String>,
    #[serde(skip)]
    staff: StaffGeometry,
}

impl Snapshot {
    /// Lay out, place, beam and validate `composition`.
    pub fn compute(composition: &Composition, params: &LayoutParams) -> Self {
        let params = params.sanitized();
        let staff = params.staff();
        let rows = compute_rows(composition, &params);

        let positions: Vec<RowPosition> = composition
            .notes
            .iter()
            .map(|n| absolute_beat_to_row_position(&rows, n.beat))
            .collect();
        let beam_groups = group_beams(&composition.notes, &positions, &rows, &staff);

        let placements = composition
            .notes
            .iter()
            .zip(&positions)
            .enumerate()
            .map(|(i, (note, pos))| {
                let staff_position = pitch_to_staff_position(&note.pitch);
                let group = beam_groups.iter().find(|g| g.contains(i));
                let stem = match (note.is_rest(), group) {
                    (true, _) => None,
                    (false, Some(g)) => Some(g.stem),
                    (false, None) => Some(StemDirection::for_position(staff_position, &staff)),
                };
                let (x, y) = match rows.get(pos.row) {
                    Some(row) => (
                        beat_to_x(row, pos.beat_in_row),
                        row.staff_top() + staff.staff_position_to_y(staff_position),
                    ),
                    None => (0.0, 0.0),
                };
                NotePlacement {
                    note: i,
                    row: pos.row,
                    beat_in_row: pos.beat_in_row,
                    x,
                    y,
                    staff_position,
                    stem,
                    beamed: group.is_some(),
                }
            })
            .collect();

        let measure_reports = validate_measures(composition);
        let structure_issues = validate_structure(composition)
            .iter()
            .map(ToString::to_string)
            .collect();

        Self {
            params,
            rows,
            placements,
            beam_groups,
            measure_reports,
            structure_issues,
            staff,
        }
    }

    /// Resolve a pointer at page `(x, y)` to a row, a snapped beat and the
    /// staff position under it. `None` when there are no rows.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<PointerHit> {
        let hit = disambiguate_row(&self.rows, estimate_row(y), x)?;
        let row = &self.rows[hit.row];
        let staff_position = self.staff.y_to_staff_position(y - row.staff_top());
        Some(PointerHit {
            row: hit.row,
            beat_in_row: hit.beat_in_row,
            absolute_beat: row_position_to_absolute_beat(&self.rows, hit.row, hit.beat_in_row),
            staff_position,
            pitch: staff_position_to_pitch(staff_position),
        })
    }

    pub fn invalid_measures(&self) -> impl Iterator<Item = &MeasureReport> {
        self.measure_reports.iter().filter(|r| !r.valid)
    }

    /// Page height needed to draw every row.
    pub fn height(&self) -> f64 {
        self.rows.last().map_or(0.0, |r| r.top() + crate::layout::constants::ROW_HEIGHT)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Holds the snapshot of one composition version. A lookup with another
/// version or other parameters recomputes; nothing is reused implicitly.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entry: Option<CacheEntry>,
    computed: usize,
}

#[derive(Debug)]
struct CacheEntry {
    version: u64,
    params: LayoutParams,
    snapshot: Snapshot,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for `composition` at `version`. The caller bumps `version`
    /// on every edit.
    pub fn get_or_compute(&mut self, version: u64, composition: &Composition, params: &LayoutParams) -> &Snapshot {
        let params = params.sanitized();
        let fresh = matches!(&self.entry, Some(e) if e.version == version && e.params == params);
        if !fresh {
            self.entry = None;
        }
        let computed = &mut self.computed;
        let entry = self.entry.get_or_insert_with(|| {
            *computed += 1;
            CacheEntry {
                version,
                params,
                snapshot: Snapshot::compute(composition, &params),
            }
        });
        &entry.snapshot
    }

    /// Drop the cached snapshot.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of snapshots computed so far.
    pub fn computed(&self) -> usize {
        self.computed
    }
}
