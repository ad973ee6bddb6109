//! Measure-duration checks and structural checks on repeats and voltas.
//!
//! Nothing here fails: problems are reported as values so the host can
//! badge a measure or a bracket and keep rendering.

use serde::Serialize;
use thiserror::Error;

use crate::meter::{is_known, MeterMap};
use crate::model::*;

/// Allowed difference between the summed and the expected beat count.
pub const BEAT_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureReport {
    pub measure_index: usize,
    pub expected_beats: f64,
    pub actual_beats: f64,
    pub valid: bool,
    /// `"actual/expected beats"`, only for invalid measures
    pub descriptor: Option<String>,
}

/// Check every measure of the composition against its meter.
pub fn validate_measures(composition: &Composition) -> Vec<MeasureReport> {
    let meters = MeterMap::new(composition.meter, &composition.meter_changes);
    validate_measure_spans(&composition.notes, &meters, composition.measure_count())
}

/// Sum the beats each measure in `0..measure_count` receives.
///
/// A note spanning a bar line contributes only the part inside each
/// measure it overlaps.
pub fn validate_measure_spans(notes: &[Note], meters: &MeterMap, measure_count: usize) -> Vec<MeasureReport> {
    let bounds = meters.measure_boundaries(measure_count);
    let mut actual = vec![0.0_f64; measure_count];

    for note in notes {
        let start = if note.beat.is_finite() && note.beat >= 0.0 {
            note.beat
        } else {
            log::warn!("note '{}' has invalid beat {}; counted at beat 0", note.id, note.beat);
            0.0
        };
        let end = start + note.duration.beats();
        // First measure whose end lies after the note start.
        let first = bounds[1..].partition_point(|&b| b <= start);
        for m in first..measure_count {
            let (m_start, m_end) = (bounds[m], bounds[m + 1]);
            if m_start >= end {
                break;
            }
            let overlap = end.min(m_end) - start.max(m_start);
            if overlap > 0.0 {
                actual[m] += overlap;
            }
        }
    }

    actual
        .into_iter()
        .enumerate()
        .map(|(m, sum)| {
            let expected = bounds[m + 1] - bounds[m];
            let actual_beats = (sum * 1000.0).round() / 1000.0;
            let valid = (actual_beats - expected).abs() <= BEAT_TOLERANCE;
            MeasureReport {
                measure_index: m,
                expected_beats: expected,
                actual_beats,
                valid,
                descriptor: (!valid).then(|| format!("{actual_beats}/{expected} beats")),
            }
        })
        .collect()
}

// ── Structure ───────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureIssue {
    #[error("repeat section '{pair_id}' has no {missing:?} marker")]
    UnpairedRepeat { pair_id: String, missing: RepeatKind },

    #[error("repeat section '{pair_id}' has more than one {kind:?} marker")]
    DuplicateRepeatMarker { pair_id: String, kind: RepeatKind },

    #[error("repeat section '{pair_id}' ends at measure {end}, not after its start {start}")]
    EmptyRepeatSection { pair_id: String, start: usize, end: usize },

    #[error("volta '{volta_id}' references unknown repeat section '{pair_id}'")]
    UnknownVoltaSection { volta_id: String, pair_id: String },

    #[error("volta '{volta_id}' ends at measure {end} before it starts at {start}")]
    InvertedVolta { volta_id: String, start: usize, end: usize },

    #[error("volta '{volta_id}' is not inside repeat section '{pair_id}'")]
    VoltaOutsideSection { volta_id: String, pair_id: String },

    #[error("voltas '{first}' and '{second}' overlap")]
    OverlappingVoltas { first: String, second: String },

    #[error("measure {measure} uses unsupported meter {meter}; drawn as 4/4")]
    UnknownMeter { measure: usize, meter: Meter },
}

/// Report repeat, volta and meter problems. An empty list means the
/// structure is sound.
pub fn validate_structure(composition: &Composition) -> Vec<StructureIssue> {
    let mut issues = Vec::new();

    let mut pair_ids: Vec<&str> = composition
        .repeat_markers
        .iter()
        .map(|m| m.pair_id.as_str())
        .collect();
    pair_ids.sort_unstable();
    pair_ids.dedup();

    for pair_id in pair_ids {
        let of_kind = |kind: RepeatKind| {
            composition
                .repeat_markers
                .iter()
                .filter(|m| m.pair_id == pair_id && m.kind == kind)
                .collect::<Vec<_>>()
        };
        let starts = of_kind(RepeatKind::Start);
        let ends = of_kind(RepeatKind::End);

        for (kind, markers) in [(RepeatKind::Start, &starts), (RepeatKind::End, &ends)] {
            if markers.is_empty() {
                issues.push(StructureIssue::UnpairedRepeat {
                    pair_id: pair_id.to_string(),
                    missing: kind,
                });
            } else if markers.len() > 1 {
                issues.push(StructureIssue::DuplicateRepeatMarker {
                    pair_id: pair_id.to_string(),
                    kind,
                });
            }
        }
        if let (Some(start), Some(end)) = (starts.first(), ends.first()) {
            if end.measure <= start.measure {
                issues.push(StructureIssue::EmptyRepeatSection {
                    pair_id: pair_id.to_string(),
                    start: start.measure,
                    end: end.measure,
                });
            }
        }
    }

    let sections = composition.repeat_sections();
    for volta in &composition.volta_brackets {
        if volta.end_measure < volta.start_measure {
            issues.push(StructureIssue::InvertedVolta {
                volta_id: volta.id.clone(),
                start: volta.start_measure,
                end: volta.end_measure,
            });
            continue;
        }
        match sections.iter().find(|s| s.pair_id == volta.pair_id) {
            None => issues.push(StructureIssue::UnknownVoltaSection {
                volta_id: volta.id.clone(),
                pair_id: volta.pair_id.clone(),
            }),
            Some(section) => {
                if !(section.contains(volta.start_measure) && section.contains(volta.end_measure)) {
                    issues.push(StructureIssue::VoltaOutsideSection {
                        volta_id: volta.id.clone(),
                        pair_id: volta.pair_id.clone(),
                    });
                }
            }
        }
    }

    let voltas = &composition.volta_brackets;
    for (i, a) in voltas.iter().enumerate() {
        for b in &voltas[i + 1..] {
            let overlaps = a.pair_id == b.pair_id
                && a.start_measure <= b.end_measure
                && b.start_measure <= a.end_measure;
            if overlaps {
                issues.push(StructureIssue::OverlappingVoltas {
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
        }
    }

    if !is_known(composition.meter) {
        issues.push(StructureIssue::UnknownMeter {
            measure: 0,
            meter: composition.meter,
        });
    }
    for change in &composition.meter_changes {
        if !is_known(change.meter) {
            issues.push(StructureIssue::UnknownMeter {
                measure: change.measure,
                meter: change.meter,
            });
        }
    }

    issues
}
