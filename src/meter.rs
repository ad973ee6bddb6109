//! Meter table and per-measure meter resolution.
//!
//! A beat is one denominator note value: 3/4 holds three quarter beats and
//! 6/8 holds six eighth beats grouped 3+3.

use serde::Serialize;

use crate::model::{Meter, MeterChange};

/// Upper bound on the measures a composition spans; content past it is
/// kept but not given measures of its own.
pub const MAX_MEASURES: usize = 10_000;

/// Static properties of a time signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterMetrics {
    pub beats_per_measure: u32,
    /// Beat-group bands beaming must not cross; sums to `beats_per_measure`
    pub beam_groups: &'static [u32],
    /// Bands the renderer shades alternately
    pub shade_groups: &'static [u32],
}

const FOUR_FOUR: MeterMetrics = MeterMetrics {
    beats_per_measure: 4,
    beam_groups: &[2, 2],
    shade_groups: &[1, 1, 1, 1],
};

/// Look up the metrics of a meter. Unknown meters use 4/4.
pub fn metrics(meter: Meter) -> MeterMetrics {
    match (meter.numerator, meter.denominator) {
        (2, 2) => MeterMetrics {
            beats_per_measure: 2,
            beam_groups: &[1, 1],
            shade_groups: &[1, 1],
        },
        (3, 2) => MeterMetrics {
            beats_per_measure: 3,
            beam_groups: &[1, 1, 1],
            shade_groups: &[1, 1, 1],
        },
        (2, 4) => MeterMetrics {
            beats_per_measure: 2,
            beam_groups: &[2],
            shade_groups: &[1, 1],
        },
        (3, 4) => MeterMetrics {
            beats_per_measure: 3,
            beam_groups: &[3],
            shade_groups: &[1, 1, 1],
        },
        (4, 4) => FOUR_FOUR,
        (5, 4) => MeterMetrics {
            beats_per_measure: 5,
            beam_groups: &[3, 2],
            shade_groups: &[1, 1, 1, 1, 1],
        },
        (6, 4) => MeterMetrics {
            beats_per_measure: 6,
            beam_groups: &[3, 3],
            shade_groups: &[3, 3],
        },
        (3, 8) => MeterMetrics {
            beats_per_measure: 3,
            beam_groups: &[3],
            shade_groups: &[3],
        },
        (6, 8) => MeterMetrics {
            beats_per_measure: 6,
            beam_groups: &[3, 3],
            shade_groups: &[3, 3],
        },
        (7, 8) => MeterMetrics {
            beats_per_measure: 7,
            beam_groups: &[2, 2, 3],
            shade_groups: &[2, 2, 3],
        },
        (9, 8) => MeterMetrics {
            beats_per_measure: 9,
            beam_groups: &[3, 3, 3],
            shade_groups: &[3, 3, 3],
        },
        (12, 8) => MeterMetrics {
            beats_per_measure: 12,
            beam_groups: &[3, 3, 3, 3],
            shade_groups: &[3, 3, 3, 3],
        },
        _ => FOUR_FOUR,
    }
}

/// Whether the meter has its own table entry (as opposed to the 4/4 fallback).
pub fn is_known(meter: Meter) -> bool {
    meter == Meter::new(4, 4) || metrics(meter) != FOUR_FOUR
}

impl MeterMetrics {
    /// Index of the beat-group band containing `beat_in_measure`.
    /// Beats past the end fall in the last band.
    pub fn band_index(&self, beat_in_measure: f64) -> usize {
        band_index(self.beam_groups, beat_in_measure)
    }
}

/// Index of the band in `groups` containing `beat_in_measure`.
pub fn band_index(groups: &[u32], beat_in_measure: f64) -> usize {
    let mut band_end = 0.0;
    for (i, &len) in groups.iter().enumerate() {
        band_end += len as f64;
        if beat_in_measure < band_end - 1e-9 {
            return i;
        }
    }
    groups.len().saturating_sub(1)
}

#[derive(Debug, Clone, Copy)]
struct Span {
    measure: usize,
    beat: f64,
    beats_per_measure: f64,
}

/// Resolves the meter governing each measure from an initial meter and a
/// list of changes.
#[derive(Debug, Clone)]
pub struct MeterMap {
    initial: Meter,
    /// Sorted by measure; equal measures keep list order, last one wins
    changes: Vec<MeterChange>,
}

impl MeterMap {
    pub fn new(initial: Meter, changes: &[MeterChange]) -> Self {
        let mut changes = changes.to_vec();
        changes.sort_by_key(|c| c.measure);
        Self { initial, changes }
    }

    pub fn initial(&self) -> Meter {
        self.initial
    }

    /// The latest change at or before `measure`, else the initial meter.
    pub fn meter_at(&self, measure: usize) -> Meter {
        let idx = self.changes.partition_point(|c| c.measure <= measure);
        if idx == 0 {
            self.initial
        } else {
            self.changes[idx - 1].meter
        }
    }

    /// Whether a change lands exactly on `measure`.
    pub fn changes_at(&self, measure: usize) -> bool {
        self.changes.iter().any(|c| c.measure == measure)
    }

    pub fn beats_in(&self, measure: usize) -> f64 {
        metrics(self.meter_at(measure)).beats_per_measure as f64
    }

    /// Absolute beat at which `measure` starts.
    pub fn measure_start_beat(&self, measure: usize) -> f64 {
        (0..measure).map(|m| self.beats_in(m)).sum()
    }

    /// Absolute start beat of every measure in `0..count`, plus the end
    /// beat of the last one.
    pub fn measure_boundaries(&self, count: usize) -> Vec<f64> {
        let mut bounds = Vec::with_capacity(count + 1);
        let mut beat = 0.0;
        bounds.push(beat);
        for m in 0..count {
            beat += self.beats_in(m);
            bounds.push(beat);
        }
        bounds
    }

    /// Runs of measures sharing one meter, in measure order. The last
    /// span is open ended.
    fn spans(&self) -> Vec<Span> {
        let mut spans = Vec::with_capacity(self.changes.len() + 1);
        let (mut measure, mut beat) = (0, 0.0);
        let mut starts: Vec<usize> = self.changes.iter().map(|c| c.measure).filter(|&m| m > 0).collect();
        starts.dedup();
        for next in starts {
            let beats_per_measure = self.beats_in(measure);
            spans.push(Span {
                measure,
                beat,
                beats_per_measure,
            });
            beat += (next - measure) as f64 * beats_per_measure;
            measure = next;
        }
        spans.push(Span {
            measure,
            beat,
            beats_per_measure: self.beats_in(measure),
        });
        spans
    }

    /// Smallest number of measures whose total length reaches `beat`.
    pub fn measures_to_cover(&self, beat: f64) -> usize {
        let target = beat - 1e-9;
        if !target.is_finite() || target <= 0.0 {
            return 0;
        }
        let spans = self.spans();
        let idx = spans.partition_point(|s| s.beat < target);
        let span = &spans[idx.saturating_sub(1)];
        span.measure + ((target - span.beat) / span.beats_per_measure).ceil() as usize
    }

    /// Measure index containing absolute `beat`.
    pub fn measure_of_beat(&self, beat: f64) -> usize {
        if !beat.is_finite() || beat <= 0.0 {
            return 0;
        }
        let spans = self.spans();
        let idx = spans.partition_point(|s| s.beat <= beat + 1e-9);
        let span = &spans[idx.saturating_sub(1)];
        span.measure + ((beat - span.beat + 1e-9) / span.beats_per_measure).floor() as usize
    }
}
