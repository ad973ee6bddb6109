//! Pitch parsing and the diatonic pitch → staff position → y mapping.
//!
//! Staff positions count diatonic steps from C4 (C4 = 0, D4 = 1, B4 = 6,
//! C5 = 7). Accidentals never move a note off its line or space.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::{Accidental, Letter, Pitch};

/// Octave whose C sits at staff position 0.
pub const REFERENCE_OCTAVE: i32 = 4;

/// Reserved position for rests: never drawn on a line, centered instead.
pub const REST_STAFF_POSITION: i32 = -1000;

/// Staff position of the bottom line (E4 on a treble staff).
pub const BOTTOM_LINE_POSITION: i32 = 2;

/// Pitch used when a stored pitch cannot be read (middle line of the staff).
pub const REFERENCE_PITCH: Pitch = Pitch::Note {
    letter: Letter::B,
    accidental: Accidental::Natural,
    octave: 4,
};

/// Staff position of a pitch; rests map to [`REST_STAFF_POSITION`].
pub fn pitch_to_staff_position(pitch: &Pitch) -> i32 {
    match *pitch {
        Pitch::Note { letter, octave, .. } => {
            (octave as i32 - REFERENCE_OCTAVE) * 7 + letter.offset()
        }
        Pitch::Rest => REST_STAFF_POSITION,
    }
}

/// Natural pitch sitting at a staff position (inverse of
/// [`pitch_to_staff_position`] up to the accidental).
pub fn staff_position_to_pitch(position: i32) -> Pitch {
    if position == REST_STAFF_POSITION {
        return Pitch::Rest;
    }
    Pitch::Note {
        letter: Letter::from_offset(position),
        accidental: Accidental::Natural,
        octave: (REFERENCE_OCTAVE + position.div_euclid(7)) as i8,
    }
}

/// Vertical geometry of a staff, relative to the row's staff top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaffGeometry {
    pub line_count: u8,
    /// Distance between adjacent lines
    pub line_spacing: f64,
}

impl StaffGeometry {
    pub fn new(line_count: u8, line_spacing: f64) -> Self {
        Self {
            line_count: line_count.max(1),
            line_spacing,
        }
    }

    /// Staff position of the top line.
    pub fn top_line_position(&self) -> i32 {
        BOTTOM_LINE_POSITION + 2 * (self.line_count as i32 - 1)
    }

    /// Staff position of the center line (or center space for even counts).
    pub fn center_position(&self) -> i32 {
        BOTTOM_LINE_POSITION + (self.line_count as i32 - 1)
    }

    pub fn height(&self) -> f64 {
        (self.line_count as f64 - 1.0) * self.line_spacing
    }

    pub fn center_y(&self) -> f64 {
        self.height() / 2.0
    }

    /// y of a staff position; grows downward from the top line at 0.
    /// Rests render centered.
    pub fn staff_position_to_y(&self, position: i32) -> f64 {
        if position == REST_STAFF_POSITION {
            return self.center_y();
        }
        (self.top_line_position() - position) as f64 * (self.line_spacing / 2.0)
    }

    pub fn pitch_to_y(&self, pitch: &Pitch) -> f64 {
        self.staff_position_to_y(pitch_to_staff_position(pitch))
    }

    /// Nearest staff position for a y coordinate (for pointer placement).
    pub fn y_to_staff_position(&self, y: f64) -> i32 {
        if !y.is_finite() {
            log::warn!("non-finite y {y} mapped to the center line");
            return self.center_position();
        }
        self.top_line_position() - (y / (self.line_spacing / 2.0)).round() as i32
    }

    /// Signed distance in staff steps from the center line; positive above.
    pub fn steps_from_center(&self, position: i32) -> i32 {
        position - self.center_position()
    }
}

// ── Text form ───────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pitch '{0}'")]
pub struct PitchParseError(pub String);

impl FromStr for Pitch {
    type Err = PitchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("rest") {
            return Ok(Pitch::Rest);
        }
        let err = || PitchParseError(s.to_string());

        let mut chars = text.chars();
        let letter = chars.next().and_then(Letter::from_char).ok_or_else(err)?;
        let rest = chars.as_str();

        let octave_start = rest
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(err)?;
        let (acc_text, octave_text) = rest.split_at(octave_start);
        let accidental = match acc_text {
            "" => Accidental::Natural,
            "#" => Accidental::Sharp,
            "b" => Accidental::Flat,
            "##" | "x" => Accidental::DoubleSharp,
            "bb" => Accidental::DoubleFlat,
            _ => return Err(err()),
        };
        let octave: i8 = octave_text.parse().map_err(|_| err())?;

        Ok(Pitch::Note {
            letter,
            accidental,
            octave,
        })
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pitch::Note {
                letter,
                accidental,
                octave,
            } => write!(f, "{}{}{}", letter.as_char(), accidental.suffix(), octave),
            Pitch::Rest => f.write_str("REST"),
        }
    }
}

impl From<String> for Pitch {
    /// Lenient conversion used by deserialization: a malformed pitch must
    /// not abort loading the rest of the composition.
    fn from(s: String) -> Self {
        s.parse().unwrap_or_else(|e: PitchParseError| {
            log::warn!("{e}; using {REFERENCE_PITCH}");
            REFERENCE_PITCH
        })
    }
}

impl From<Pitch> for String {
    fn from(p: Pitch) -> String {
        p.to_string()
    }
}
