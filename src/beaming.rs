//! Beaming — groups short notes under beams and computes the beam geometry.
//!
//! Grouping rules:
//! - only pitched sixteenths, eighths and dotted eighths are beamed;
//! - a beam never crosses a bar line or a beat-group band of the meter;
//! - consecutive members are more than 0 and at most 1.5 beats apart;
//! - no other note (of any length, rests included) sits strictly between
//!   two consecutive members.
//!
//! A group's stem direction follows the member furthest from the staff's
//! center line. Sixteenth runs get a secondary beam; a lone sixteenth gets
//! a stub pointing at its beamed neighbour.

use serde::Serialize;

use crate::layout::constants::*;
use crate::layout::coords::beat_to_x;
use crate::layout::timeline::RowPosition;
use crate::layout::RowLayout;
use crate::meter::band_index;
use crate::model::{Duration, Note};
use crate::pitch::{pitch_to_staff_position, StaffGeometry};

/// Largest gap in beats between two consecutive beamed notes.
pub const MAX_BEAM_GAP: f64 = 1.5;

const BEAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StemDirection {
    Up,
    Down,
}

impl StemDirection {
    /// Stem direction of an unbeamed note: notes below the center line
    /// take up-stems.
    pub fn for_position(position: i32, staff: &StaffGeometry) -> StemDirection {
        if staff.steps_from_center(position) < 0 {
            StemDirection::Up
        } else {
            StemDirection::Down
        }
    }
}

/// A straight beam segment in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BeamLine {
    pub fn slope(&self) -> f64 {
        let dx = self.x2 - self.x1;
        if dx.abs() > f64::EPSILON {
            (self.y2 - self.y1) / dx
        } else {
            0.0
        }
    }

    pub fn y_at(&self, x: f64) -> f64 {
        self.y1 + self.slope() * (x - self.x1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SecondaryBeam {
    pub line: BeamLine,
    /// Position in the group of the first and last note it spans
    pub first: usize,
    pub last: usize,
    /// Short stub on a lone sixteenth rather than a full segment
    pub stub: bool,
}

/// One member's stem, from notehead to beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stem {
    pub note: usize,
    pub x: f64,
    pub head_y: f64,
    pub beam_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamGroup {
    pub row: usize,
    pub measure_index: usize,
    /// Beat-group band of the measure the group lives in
    pub band: usize,
    /// Indices into the composition's notes, in beat order
    pub notes: Vec<usize>,
    pub stem: StemDirection,
    pub stems: Vec<Stem>,
    pub primary: BeamLine,
    pub secondary: Vec<SecondaryBeam>,
}

impl BeamGroup {
    pub fn contains(&self, note: usize) -> bool {
        self.notes.contains(&note)
    }

    pub fn stem_for(&self, note: usize) -> Option<StemDirection> {
        self.contains(note).then_some(self.stem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BandKey {
    row: usize,
    measure_index: usize,
    band: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    note: usize,
    key: BandKey,
    beat: f64,
}

/// Group the beamable notes of a composition.
///
/// `positions[i]` is the resolved row position of `notes[i]`.
pub fn group_beams(
    notes: &[Note],
    positions: &[RowPosition],
    rows: &[RowLayout],
    staff: &StaffGeometry,
) -> Vec<BeamGroup> {
    if notes.len() != positions.len() {
        log::warn!(
            "beaming skipped: {} notes but {} positions",
            notes.len(),
            positions.len()
        );
        return Vec::new();
    }

    // Every note's beat per row, sorted, for the intervening-note check.
    let mut row_beats: Vec<Vec<f64>> = vec![Vec::new(); rows.len()];
    for pos in positions {
        if let Some(beats) = row_beats.get_mut(pos.row) {
            beats.push(pos.beat_in_row);
        }
    }
    for beats in &mut row_beats {
        beats.sort_by(f64::total_cmp);
    }

    let mut candidates: Vec<Candidate> = notes
        .iter()
        .zip(positions)
        .enumerate()
        .filter(|(_, (note, pos))| {
            !note.is_rest()
                && note.duration.is_beamable()
                && pos.beat_in_row.is_finite()
                && pos.row < rows.len()
        })
        .filter_map(|(i, (_, pos))| {
            let row = &rows[pos.row];
            let measure = row.measure_at(pos.beat_in_row)?;
            Some(Candidate {
                note: i,
                key: BandKey {
                    row: pos.row,
                    measure_index: measure.measure_index,
                    band: band_index(measure.beam_groups, pos.beat_in_row - measure.start_beat),
                },
                beat: pos.beat_in_row,
            })
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.key
            .row
            .cmp(&b.key.row)
            .then(a.beat.total_cmp(&b.beat))
            .then(a.note.cmp(&b.note))
    });

    let mut groups = Vec::new();
    let mut current: Vec<Candidate> = Vec::new();

    for cand in candidates {
        let joins = match current.last() {
            Some(prev) => {
                let gap = cand.beat - prev.beat;
                prev.key == cand.key
                    && gap > BEAT_EPSILON
                    && gap <= MAX_BEAM_GAP + BEAT_EPSILON
                    && !has_note_between(&row_beats[cand.key.row], prev.beat, cand.beat)
            }
            None => false,
        };
        if !joins {
            flush(&mut current, &mut groups, notes, positions, rows, staff);
        }
        current.push(cand);
    }
    flush(&mut current, &mut groups, notes, positions, rows, staff);

    groups
}

/// Whether any beat in `sorted` lies strictly between `a` and `b`.
fn has_note_between(sorted: &[f64], a: f64, b: f64) -> bool {
    let lo = sorted.partition_point(|&v| v <= a + BEAT_EPSILON);
    let hi = sorted.partition_point(|&v| v < b - BEAT_EPSILON);
    lo < hi
}

fn flush(
    current: &mut Vec<Candidate>,
    groups: &mut Vec<BeamGroup>,
    notes: &[Note],
    positions: &[RowPosition],
    rows: &[RowLayout],
    staff: &StaffGeometry,
) {
    if current.len() >= 2 {
        groups.push(build_group(current, notes, positions, rows, staff));
    }
    current.clear();
}

// ── Geometry ────────────────────────────────────────────────────────

struct Member {
    note: usize,
    stem_x: f64,
    head_y: f64,
    tip_y: f64,
    sixteenth: bool,
}

fn build_group(
    members: &[Candidate],
    notes: &[Note],
    positions: &[RowPosition],
    rows: &[RowLayout],
    staff: &StaffGeometry,
) -> BeamGroup {
    let key = members[0].key;
    let row = &rows[key.row];
    let staff_positions: Vec<i32> = members
        .iter()
        .map(|m| pitch_to_staff_position(&notes[m.note].pitch))
        .collect();
    let stem = consensus_stem(&staff_positions, staff);

    let geometry: Vec<Member> = members
        .iter()
        .zip(&staff_positions)
        .map(|(m, &pos)| {
            let x = beat_to_x(row, positions[m.note].beat_in_row);
            let head_y = row.staff_top() + staff.staff_position_to_y(pos);
            let (stem_x, tip_y) = match stem {
                StemDirection::Up => (x + NOTEHEAD_RX - 1.0, head_y - STEM_LENGTH),
                StemDirection::Down => (x - NOTEHEAD_RX + 1.0, head_y + STEM_LENGTH),
            };
            Member {
                note: m.note,
                stem_x,
                head_y,
                tip_y,
                sixteenth: notes[m.note].duration == Duration::Sixteenth,
            }
        })
        .collect();

    let primary = primary_beam(&geometry, stem);
    let stems = geometry
        .iter()
        .map(|m| Stem {
            note: m.note,
            x: m.stem_x,
            head_y: m.head_y,
            beam_y: primary.y_at(m.stem_x),
        })
        .collect();
    let secondary = secondary_beams(&geometry, &primary, stem);

    BeamGroup {
        row: key.row,
        measure_index: key.measure_index,
        band: key.band,
        notes: members.iter().map(|m| m.note).collect(),
        stem,
        stems,
        primary,
        secondary,
    }
}

/// The member furthest from the center line decides; a tie goes down.
fn consensus_stem(staff_positions: &[i32], staff: &StaffGeometry) -> StemDirection {
    let mut furthest_above = 0;
    let mut furthest_below = 0;
    for &pos in staff_positions {
        let steps = staff.steps_from_center(pos);
        if steps > 0 {
            furthest_above = furthest_above.max(steps);
        } else {
            furthest_below = furthest_below.max(-steps);
        }
    }
    if furthest_below > furthest_above {
        StemDirection::Up
    } else {
        StemDirection::Down
    }
}

/// Beam through the first and last stem tips with its slope clamped, then
/// shifted so it clears every stem tip.
fn primary_beam(members: &[Member], stem: StemDirection) -> BeamLine {
    let first = &members[0];
    let last = &members[members.len() - 1];
    let dx = last.stem_x - first.stem_x;
    let slope = if dx.abs() > 0.1 {
        ((last.tip_y - first.tip_y) / dx).clamp(-MAX_BEAM_SLOPE, MAX_BEAM_SLOPE)
    } else {
        0.0
    };

    let intercepts = members.iter().map(|m| m.tip_y - slope * (m.stem_x - first.stem_x));
    let y1 = match stem {
        StemDirection::Up => intercepts.fold(f64::INFINITY, f64::min),
        StemDirection::Down => intercepts.fold(f64::NEG_INFINITY, f64::max),
    };

    BeamLine {
        x1: first.stem_x,
        y1,
        x2: last.stem_x,
        y2: y1 + slope * dx,
    }
}

fn secondary_beams(members: &[Member], primary: &BeamLine, stem: StemDirection) -> Vec<SecondaryBeam> {
    let offset = match stem {
        StemDirection::Up => SECONDARY_BEAM_GAP,
        StemDirection::Down => -SECONDARY_BEAM_GAP,
    };
    let at = |x: f64| primary.y_at(x) + offset;
    let last_pos = members.len() - 1;

    let mut beams = Vec::new();
    let mut i = 0;
    while i < members.len() {
        if !members[i].sixteenth {
            i += 1;
            continue;
        }
        let start = i;
        while i + 1 < members.len() && members[i + 1].sixteenth {
            i += 1;
        }
        let end = i;

        let (x1, x2) = if end > start {
            (members[start].stem_x, members[end].stem_x)
        } else if start == last_pos {
            // Last note: the stub points back at its neighbour.
            (members[start].stem_x - BEAM_STUB_LENGTH, members[start].stem_x)
        } else {
            (members[start].stem_x, members[start].stem_x + BEAM_STUB_LENGTH)
        };
        beams.push(SecondaryBeam {
            line: BeamLine {
                x1,
                y1: at(x1),
                x2,
                y2: at(x2),
            },
            first: start,
            last: end,
            stub: end == start,
        });
        i += 1;
    }
    beams
}
