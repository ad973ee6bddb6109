//! Shared pixel constants for row geometry.

// ── Rows ────────────────────────────────────────────────────────────
pub const ROW_LEFT_MARGIN: f64 = 60.0; // clef + initial meter live here
pub const ROW_TOP_MARGIN: f64 = 40.0;
pub const ROW_HEIGHT: f64 = 120.0; // vertical pitch between row tops
pub const STAFF_TOP_IN_ROW: f64 = 30.0; // staff top line below the row top

// ── Horizontal spacing ──────────────────────────────────────────────
pub const REFERENCE_BEAT_WIDTH: f64 = 60.0; // at note spacing 1.0
pub const MIN_ROW_CONTENT_WIDTH: f64 = 240.0;

// ── Decorations ─────────────────────────────────────────────────────
pub const METER_LABEL_WIDTH: f64 = 28.0;
pub const REPEAT_START_WIDTH: f64 = 18.0;
pub const REPEAT_END_WIDTH: f64 = 18.0;

// ── Staff ───────────────────────────────────────────────────────────
pub const STAFF_LINE_SPACING: f64 = 10.0;

// ── Notes & beams ───────────────────────────────────────────────────
pub const NOTEHEAD_RX: f64 = 5.5;
pub const STEM_LENGTH: f64 = 30.0;
pub const BEAM_THICKNESS: f64 = 4.0;
pub const SECONDARY_BEAM_GAP: f64 = BEAM_THICKNESS + 3.0;
pub const BEAM_STUB_LENGTH: f64 = 8.0;
pub const MAX_BEAM_SLOPE: f64 = 0.25;
