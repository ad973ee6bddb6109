//! Data model for a composition laid out on one absolute-beat timeline.
//!
//! Everything here is layout independent: notes carry an absolute beat,
//! repeat markers and volta brackets carry absolute measure indices. Rows,
//! pixel positions and beam groups are derived elsewhere and never stored.

use serde::{Deserialize, Serialize};

/// A complete piece as edited and persisted by the host application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Composition {
    /// Title of the piece
    #[serde(default)]
    pub title: Option<String>,
    /// Meter in effect from measure 0
    #[serde(default)]
    pub meter: Meter,
    /// Meter changes, keyed by absolute measure index
    #[serde(default)]
    pub meter_changes: Vec<MeterChange>,
    /// Notes and rests on the absolute-beat timeline
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Repeat-section start/end markers
    #[serde(default)]
    pub repeat_markers: Vec<RepeatMarker>,
    /// Alternate endings
    #[serde(default)]
    pub volta_brackets: Vec<VoltaBracket>,
    /// Lyric syllables on the same timeline as the notes
    #[serde(default)]
    pub lyrics: Vec<Lyric>,
    /// Explicit measure count; grown automatically to fit the content
    #[serde(default)]
    pub measure_count: Option<usize>,
}

/// A single note or rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Stable identity assigned by the host
    pub id: String,
    /// Pitch, or `Pitch::Rest`
    pub pitch: Pitch,
    /// Length in beats, from a closed set
    pub duration: Duration,
    /// Absolute beat position from the start of the composition
    pub beat: f64,
}

impl Note {
    pub fn new(id: impl Into<String>, pitch: Pitch, duration: Duration, beat: f64) -> Self {
        Self {
            id: id.into(),
            pitch,
            duration,
            beat,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.pitch, Pitch::Rest)
    }

    /// Absolute beat at which the note stops sounding.
    pub fn end_beat(&self) -> f64 {
        self.beat + self.duration.beats()
    }
}

/// One lyric syllable, sung from `beat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lyric {
    pub text: String,
    #[serde(default)]
    pub syllabic: Option<Syllabic>,
    pub beat: f64,
}

/// Where a syllable sits within its word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syllabic {
    Single,
    Begin,
    Middle,
    End,
}

impl Syllabic {
    pub fn from_musicxml(s: &str) -> Option<Syllabic> {
        match s {
            "single" => Some(Syllabic::Single),
            "begin" => Some(Syllabic::Begin),
            "middle" => Some(Syllabic::Middle),
            "end" => Some(Syllabic::End),
            _ => None,
        }
    }
}

/// Diatonic pitch or rest.
///
/// Written as `"C#4"`, `"Bb3"`, `"F##5"` or `"REST"` in serialized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pitch {
    Note {
        letter: Letter,
        accidental: Accidental,
        octave: i8,
    },
    Rest,
}

/// Note letter, ordered C..B so the discriminant is the staff offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    pub const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Diatonic offset within an octave (C = 0 .. B = 6).
    pub fn offset(self) -> i32 {
        self as i32
    }

    pub fn from_offset(offset: i32) -> Letter {
        Letter::ALL[offset.rem_euclid(7) as usize]
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }

    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }
}

/// Chromatic alteration. Never affects the staff position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Accidental {
    #[default]
    Natural,
    Sharp,
    Flat,
    DoubleSharp,
    DoubleFlat,
}

impl Accidental {
    /// Semitone alteration (MusicXML `<alter>` value).
    pub fn alter(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
            Accidental::DoubleSharp => 2,
            Accidental::DoubleFlat => -2,
        }
    }

    pub fn from_alter(alter: i32) -> Accidental {
        match alter {
            1 => Accidental::Sharp,
            -1 => Accidental::Flat,
            a if a >= 2 => Accidental::DoubleSharp,
            a if a <= -2 => Accidental::DoubleFlat,
            _ => Accidental::Natural,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
            Accidental::DoubleSharp => "##",
            Accidental::DoubleFlat => "bb",
        }
    }
}

/// Note length in beats. The editor only produces these eight values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub enum Duration {
    Sixteenth,
    Eighth,
    DottedEighth,
    Quarter,
    DottedQuarter,
    Half,
    DottedHalf,
    Whole,
}

impl Duration {
    pub const ALL: [Duration; 8] = [
        Duration::Sixteenth,
        Duration::Eighth,
        Duration::DottedEighth,
        Duration::Quarter,
        Duration::DottedQuarter,
        Duration::Half,
        Duration::DottedHalf,
        Duration::Whole,
    ];

    pub fn beats(self) -> f64 {
        match self {
            Duration::Sixteenth => 0.25,
            Duration::Eighth => 0.5,
            Duration::DottedEighth => 0.75,
            Duration::Quarter => 1.0,
            Duration::DottedQuarter => 1.5,
            Duration::Half => 2.0,
            Duration::DottedHalf => 3.0,
            Duration::Whole => 4.0,
        }
    }

    /// Exact match against the closed set.
    pub fn from_beats(beats: f64) -> Option<Duration> {
        Duration::ALL
            .iter()
            .copied()
            .find(|d| (d.beats() - beats).abs() < 1e-6)
    }

    /// Closest member of the set (used when importing arbitrary lengths).
    pub fn nearest(beats: f64) -> Duration {
        let mut best = Duration::Quarter;
        let mut best_dist = f64::MAX;
        for d in Duration::ALL {
            let dist = (d.beats() - beats).abs();
            if dist < best_dist {
                best_dist = dist;
                best = d;
            }
        }
        best
    }

    /// Short durations drawn with beams instead of flags.
    pub fn is_beamable(self) -> bool {
        matches!(
            self,
            Duration::Sixteenth | Duration::Eighth | Duration::DottedEighth
        )
    }

    /// Number of beams a note of this length carries (0 for unbeamed).
    pub fn beam_count(self) -> usize {
        match self {
            Duration::Sixteenth => 2,
            Duration::Eighth | Duration::DottedEighth => 1,
            _ => 0,
        }
    }
}

impl From<f64> for Duration {
    /// Lenient conversion used by deserialization: an off-grid length snaps
    /// to the nearest class instead of rejecting the whole composition.
    fn from(beats: f64) -> Self {
        Duration::from_beats(beats).unwrap_or_else(|| {
            let nearest = Duration::nearest(beats);
            log::warn!("unsupported note duration {beats} beats; using {}", nearest.beats());
            nearest
        })
    }
}

impl From<Duration> for f64 {
    fn from(d: Duration) -> f64 {
        d.beats()
    }
}

/// Time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meter {
    /// Beats per measure (e.g., 3 in 3/4)
    pub numerator: u8,
    /// Beat unit (e.g., 4 in 3/4)
    pub denominator: u8,
}

impl Meter {
    pub const fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Meter::new(4, 4)
    }
}

impl std::fmt::Display for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// A meter that takes effect at the start of `measure`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterChange {
    pub measure: usize,
    pub meter: Meter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatKind {
    Start,
    End,
}

/// One half of a repeat section.
///
/// An `End` marker sits at the *start* of its measure, which renders as the
/// closing barline of the previous measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatMarker {
    pub id: String,
    /// Shared by the start and end marker of one section
    pub pair_id: String,
    pub kind: RepeatKind,
    pub measure: usize,
}

/// Alternate ending over `start_measure..=end_measure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltaBracket {
    pub id: String,
    /// Repeat section this ending belongs to
    pub pair_id: String,
    pub start_measure: usize,
    pub end_measure: usize,
    /// Pass number printed on the bracket (1., 2., ...)
    pub number: u32,
}

/// Start/end measure of a repeat section, resolved from its marker pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepeatSection {
    pub pair_id: String,
    pub start: usize,
    /// Index of the measure the end marker sits in front of
    pub end: usize,
}

impl RepeatSection {
    /// Whether `measure` is one of the repeated measures.
    pub fn contains(&self, measure: usize) -> bool {
        measure >= self.start && measure < self.end
    }
}

impl Composition {
    pub fn new(meter: Meter) -> Self {
        Self {
            meter,
            ..Default::default()
        }
    }

    /// Number of measures the composition spans.
    ///
    /// Grows the stored count so every note end, marker and bracket fits.
    pub fn measure_count(&self) -> usize {
        let meters = crate::meter::MeterMap::new(self.meter, &self.meter_changes);
        let mut count = self.measure_count.unwrap_or(0).max(1);

        let last_end = self
            .notes
            .iter()
            .filter(|n| n.beat.is_finite() && n.beat >= 0.0)
            .map(|n| n.end_beat())
            .fold(0.0_f64, f64::max);
        count = count.max(meters.measures_to_cover(last_end));

        for marker in &self.repeat_markers {
            let needed = match marker.kind {
                RepeatKind::Start => marker.measure + 1,
                // An end marker in front of measure N closes measure N-1.
                RepeatKind::End => marker.measure,
            };
            count = count.max(needed);
        }
        for volta in &self.volta_brackets {
            count = count.max(volta.end_measure.max(volta.start_measure) + 1);
        }
        for change in &self.meter_changes {
            count = count.max(change.measure + 1);
        }
        if count > crate::meter::MAX_MEASURES {
            log::warn!("composition needs {count} measures; capped at {}", crate::meter::MAX_MEASURES);
            count = crate::meter::MAX_MEASURES;
        }
        count
    }

    /// Resolve start/end marker pairs into sections, ordered by start.
    /// Unpaired markers are skipped.
    pub fn repeat_sections(&self) -> Vec<RepeatSection> {
        let mut sections: Vec<RepeatSection> = self
            .repeat_markers
            .iter()
            .filter(|m| m.kind == RepeatKind::Start)
            .filter_map(|start| {
                self.repeat_markers
                    .iter()
                    .find(|m| m.kind == RepeatKind::End && m.pair_id == start.pair_id)
                    .map(|end| RepeatSection {
                        pair_id: start.pair_id.clone(),
                        start: start.measure,
                        end: end.measure,
                    })
            })
            .collect();
        sections.sort_by_key(|s| (s.start, s.end));
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::MAX_MEASURES;

    #[test]
    fn off_grid_duration_snaps_when_loading() {
        let notes: Vec<Note> = serde_json::from_str(
            r#"[
                {"id": "a", "pitch": "C5", "duration": 0.3, "beat": 0.0},
                {"id": "b", "pitch": "D5", "duration": 1.5, "beat": 1.0}
            ]"#,
        )
        .unwrap();
        assert_eq!(notes[0].duration, Duration::Sixteenth);
        assert_eq!(notes[1].duration, Duration::DottedQuarter);
        assert_eq!(serde_json::to_string(&Duration::DottedQuarter).unwrap(), "1.5");
    }

    #[test]
    fn far_away_note_caps_the_measure_count() {
        let c = Composition {
            notes: vec![Note::new("far", Pitch::Rest, Duration::Quarter, 1e17)],
            ..Composition::new(Meter::new(4, 4))
        };
        assert_eq!(c.measure_count(), MAX_MEASURES);
    }

    #[test]
    fn measure_count_grows_to_fit_markers() {
        let c = Composition {
            volta_brackets: vec![VoltaBracket {
                id: "v".into(),
                pair_id: "r".into(),
                start_measure: 3,
                end_measure: 4,
                number: 1,
            }],
            ..Composition::new(Meter::new(3, 4))
        };
        assert_eq!(c.measure_count(), 5);
    }
}
