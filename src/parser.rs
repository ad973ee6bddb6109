//! MusicXML parser — imports the first part of a `score-partwise` document
//! into a [`Composition`].
//!
//! Only what the staff engine models survives the import: pitches with
//! their effective accidentals, durations in beats of the current meter,
//! meter changes, repeats and endings. Ties are merged into single notes
//! and positions land on the half-beat grid.

use std::collections::HashMap;

use roxmltree::{Document, Node};

use crate::error::{Result, StaffError};
use crate::layout::snap_half_beat;
use crate::model::*;

/// Parse a MusicXML XML string into a Composition.
pub fn parse_musicxml(xml: &str) -> Result<Composition> {
    // MusicXML files include a DOCTYPE declaration, so we must allow DTDs
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(StaffError::UnsupportedRoot(root.tag_name().name().to_string()));
    }

    let part = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "part")
        .ok_or(StaffError::NoParts)?;

    let mut importer = Importer::new();
    for measure in part
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "measure")
    {
        importer.measure(&measure);
    }

    let mut composition = importer.finish();
    composition.title = parse_title(&root);
    Ok(composition)
}

// ─── Title ───────────────────────────────────────────────────────────

/// `<credit type="title">` wins over `<work-title>`, which wins over
/// `<movement-title>`.
fn parse_title(root: &Node) -> Option<String> {
    let mut credit = None;
    let mut work = None;
    let mut movement = None;

    for child in root.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "work" => {
                work = child
                    .children()
                    .find(|n| n.tag_name().name() == "work-title")
                    .and_then(|n| trimmed_text(&n));
            }
            "movement-title" => movement = trimmed_text(&child),
            "credit" => {
                let is_title = child.children().any(|n| {
                    n.tag_name().name() == "credit-type" && n.text().map(str::trim) == Some("title")
                });
                if is_title && credit.is_none() {
                    credit = child
                        .children()
                        .find(|n| n.tag_name().name() == "credit-words")
                        .and_then(|n| trimmed_text(&n));
                }
            }
            _ => {}
        }
    }

    credit.or(work).or(movement)
}

// ─── Import state ────────────────────────────────────────────────────

/// A lyric at its unsnapped beat.
#[derive(Debug)]
struct RawLyric {
    text: String,
    syllabic: Option<Syllabic>,
    beat: f64,
}

/// A note before tie merging and grid snapping; `length` is in beats.
#[derive(Debug)]
struct RawNote {
    id: String,
    pitch: Pitch,
    beat: f64,
    length: f64,
}

#[derive(Debug)]
struct Barline {
    repeat: Option<&'static str>,
    ending: Option<(u32, String)>,
}

#[derive(Debug, Default)]
struct Importer {
    /// Duration units per quarter note
    divisions: f64,
    fifths: i32,
    meter: Option<Meter>,
    initial_meter: Option<Meter>,
    meter_changes: Vec<MeterChange>,
    beat: f64,
    /// Beat of the latest pitched non-chord note; chord notes share it
    last_beat: f64,
    measure_index: usize,
    /// Alterations seen earlier in the current measure, by step
    measure_accidentals: HashMap<Letter, i32>,
    /// Voice imported from the part; other voices are skipped
    voice: Option<String>,
    notes: Vec<RawNote>,
    lyrics: Vec<RawLyric>,
    open_ties: HashMap<Pitch, usize>,
    next_note_id: usize,
    next_rest_id: usize,
    /// (measure index, is forward)
    repeats: Vec<(usize, bool)>,
    /// (measure index, number, type)
    endings: Vec<(usize, u32, String)>,
}

impl Importer {
    fn new() -> Self {
        Self {
            divisions: 1.0,
            next_note_id: 1,
            next_rest_id: 1,
            ..Default::default()
        }
    }

    fn current_meter(&self) -> Meter {
        self.meter.unwrap_or_default()
    }

    /// Beats of the current meter in `units` of the current divisions.
    fn units_to_beats(&self, units: f64) -> f64 {
        let quarters = units / self.divisions;
        quarters * self.current_meter().denominator as f64 / 4.0
    }

    fn measure(&mut self, node: &Node) {
        self.measure_accidentals.clear();

        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "attributes" => self.attributes(&child),
                "note" => self.note(&child),
                "forward" => {
                    let in_voice = self.accepts_voice(child_text(&child, "voice").as_deref());
                    if in_voice {
                        let units = child_f64(&child, "duration").unwrap_or(0.0);
                        self.beat += self.units_to_beats(units);
                    }
                }
                "barline" => {
                    let barline = parse_barline(&child);
                    if let Some(direction) = barline.repeat {
                        self.repeats.push((self.measure_index, direction == "forward"));
                    }
                    if let Some((number, kind)) = barline.ending {
                        self.endings.push((self.measure_index, number, kind));
                    }
                }
                _ => {}
            }
        }

        self.measure_index += 1;
    }

    fn attributes(&mut self, node: &Node) {
        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "divisions" => match parse_f64(&child) {
                    Some(d) if d > 0.0 => self.divisions = d,
                    other => log::warn!("ignoring invalid <divisions> {other:?}"),
                },
                "key" => {
                    if let Some(fifths) = child_f64(&child, "fifths") {
                        self.fifths = (fifths as i32).clamp(-7, 7);
                    }
                }
                "time" => {
                    if let Some(meter) = parse_time(&child) {
                        self.time_signature(meter);
                    }
                }
                _ => {}
            }
        }
    }

    fn time_signature(&mut self, meter: Meter) {
        if self.meter == Some(meter) {
            return;
        }
        if self.measure_index == 0 || self.initial_meter.is_none() {
            self.initial_meter = Some(meter);
        } else {
            self.meter_changes.retain(|c| c.measure != self.measure_index);
            self.meter_changes.push(MeterChange {
                measure: self.measure_index,
                meter,
            });
        }
        self.meter = Some(meter);
    }

    /// Whether a note in `voice` belongs to the imported voice. The first
    /// voice seen wins; notes without a voice always belong.
    fn accepts_voice(&mut self, voice: Option<&str>) -> bool {
        let Some(voice) = voice else {
            return true;
        };
        match &self.voice {
            Some(kept) => kept == voice,
            None => {
                self.voice = Some(voice.to_string());
                true
            }
        }
    }

    fn note(&mut self, node: &Node) {
        let mut is_rest = false;
        let mut is_chord = false;
        let mut is_grace = false;
        let mut tie_start = false;
        let mut tie_stop = false;
        let mut units = 0.0;
        let mut voice = None;
        let mut pitch_node = None;
        let mut lyric_nodes = Vec::new();

        for child in node.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "rest" => is_rest = true,
                "chord" => is_chord = true,
                "grace" => is_grace = true,
                "pitch" => pitch_node = Some(child),
                "duration" => units = parse_f64(&child).unwrap_or(0.0),
                "voice" => voice = trimmed_text(&child),
                "lyric" => lyric_nodes.push(child),
                "tie" => match child.attribute("type") {
                    Some("start") => tie_start = true,
                    Some("stop") => tie_stop = true,
                    _ => {}
                },
                _ => {}
            }
        }

        if is_grace || !self.accepts_voice(voice.as_deref()) {
            return;
        }
        let length = self.units_to_beats(units);

        if is_rest {
            let id = format!("r{}", self.next_rest_id);
            self.next_rest_id += 1;
            self.notes.push(RawNote {
                id,
                pitch: Pitch::Rest,
                beat: self.beat,
                length,
            });
            self.beat += length;
            return;
        }

        let Some(pitch) = pitch_node.and_then(|p| self.parse_pitch(&p)) else {
            log::warn!("skipping unpitched note in measure {}", self.measure_index);
            if !is_chord {
                self.beat += length;
            }
            return;
        };

        let beat = if is_chord {
            self.last_beat
        } else {
            self.last_beat = self.beat;
            self.beat += length;
            self.last_beat
        };

        for lyric in &lyric_nodes {
            let Some(text) = child_text(lyric, "text") else {
                continue;
            };
            self.lyrics.push(RawLyric {
                text,
                syllabic: child_text(lyric, "syllabic").and_then(|s| Syllabic::from_musicxml(&s)),
                beat,
            });
        }

        if tie_stop {
            if let Some(&idx) = self.open_ties.get(&pitch) {
                self.notes[idx].length += length;
                if !tie_start {
                    self.open_ties.remove(&pitch);
                }
                return;
            }
        }

        let id = format!("n{}", self.next_note_id);
        self.next_note_id += 1;
        self.notes.push(RawNote {
            id,
            pitch,
            beat,
            length,
        });
        if tie_start {
            self.open_ties.insert(pitch, self.notes.len() - 1);
        }
    }

    /// Resolve the sounding pitch: explicit `<alter>`, else an alteration
    /// of the same step earlier in the measure, else the key signature.
    fn parse_pitch(&mut self, node: &Node) -> Option<Pitch> {
        let step = child_text(node, "step")?;
        let letter = step.chars().next().and_then(Letter::from_char)?;
        let octave = child_f64(node, "octave")? as i8;

        let alter = match child_f64(node, "alter") {
            Some(alter) => {
                let alter = alter.round() as i32;
                self.measure_accidentals.insert(letter, alter);
                alter
            }
            None => match self.measure_accidentals.get(&letter) {
                Some(&alter) => alter,
                None => key_alteration(self.fifths, letter),
            },
        };

        Some(Pitch::Note {
            letter,
            accidental: Accidental::from_alter(alter),
            octave,
        })
    }

    fn finish(self) -> Composition {
        let mut notes: Vec<Note> = self
            .notes
            .into_iter()
            .map(|raw| Note::new(raw.id, raw.pitch, Duration::nearest(raw.length), snap_half_beat(raw.beat)))
            .collect();
        notes.sort_by(|a, b| a.beat.total_cmp(&b.beat).then(a.is_rest().cmp(&b.is_rest())));

        let lyrics = self
            .lyrics
            .into_iter()
            .map(|raw| Lyric {
                text: raw.text,
                syllabic: raw.syllabic,
                beat: snap_half_beat(raw.beat),
            })
            .collect();

        let mut repeat_markers = pair_repeats(&self.repeats);
        let sections = {
            let markers_only = Composition {
                repeat_markers: repeat_markers.clone(),
                ..Default::default()
            };
            markers_only.repeat_sections()
        };
        let volta_brackets = pair_endings(&self.endings, &sections);
        cover_endings(&mut repeat_markers, &volta_brackets);

        Composition {
            title: None,
            meter: self.initial_meter.unwrap_or_default(),
            meter_changes: self.meter_changes,
            notes,
            repeat_markers,
            volta_brackets,
            lyrics,
            measure_count: Some(self.measure_index.max(1)),
        }
    }
}

// ─── Key signature ───────────────────────────────────────────────────

const SHARP_ORDER: [Letter; 7] = [Letter::F, Letter::C, Letter::G, Letter::D, Letter::A, Letter::E, Letter::B];

/// Alteration the key signature with `fifths` applies to `letter`.
fn key_alteration(fifths: i32, letter: Letter) -> i32 {
    let count = fifths.unsigned_abs() as usize;
    if fifths > 0 && SHARP_ORDER[..count].contains(&letter) {
        1
    } else if fifths < 0 && SHARP_ORDER.iter().rev().take(count).any(|&l| l == letter) {
        -1
    } else {
        0
    }
}

// ─── Repeats and endings ─────────────────────────────────────────────

/// Pair each backward repeat with the latest unused forward repeat at or
/// before it; a backward repeat with none repeats from the first measure.
/// The end marker sits in front of the measure after the backward repeat.
fn pair_repeats(repeats: &[(usize, bool)]) -> Vec<RepeatMarker> {
    let mut markers = Vec::new();
    let mut used = vec![false; repeats.len()];

    for &(end_measure, _) in repeats.iter().filter(|(_, forward)| !forward) {
        let forward = repeats
            .iter()
            .enumerate()
            .rev()
            .find(|&(i, &(m, forward))| forward && !used[i] && m <= end_measure)
            .map(|(i, _)| i);
        let start = match forward {
            Some(i) => {
                used[i] = true;
                repeats[i].0
            }
            None => 0,
        };

        let pair = markers.len() / 2 + 1;
        let pair_id = format!("repeat-{pair}");
        markers.push(RepeatMarker {
            id: format!("{pair_id}-start"),
            pair_id: pair_id.clone(),
            kind: RepeatKind::Start,
            measure: start,
        });
        markers.push(RepeatMarker {
            id: format!("{pair_id}-end"),
            pair_id,
            kind: RepeatKind::End,
            measure: end_measure + 1,
        });
    }

    markers
}

/// Turn `<ending>` start/stop pairs into brackets linked to the repeat
/// section containing their first measure, else the closest section
/// starting before it. Endings with no section at all are dropped.
fn pair_endings(endings: &[(usize, u32, String)], sections: &[RepeatSection]) -> Vec<VoltaBracket> {
    let mut brackets = Vec::new();

    for &(start, number, ref kind) in endings {
        if kind != "start" {
            continue;
        }
        let end = endings
            .iter()
            .filter(|(m, n, k)| *n == number && *m >= start && (k == "stop" || k == "discontinue"))
            .map(|(m, _, _)| *m)
            .min()
            .unwrap_or(start);

        let section = sections
            .iter()
            .find(|s| s.contains(start))
            .or_else(|| sections.iter().filter(|s| s.start <= start).last());
        let Some(section) = section else {
            log::warn!("ending {number} at measure {start} has no repeat section; dropped");
            continue;
        };

        brackets.push(VoltaBracket {
            id: format!("volta-{}", brackets.len() + 1),
            pair_id: section.pair_id.clone(),
            start_measure: start,
            end_measure: end,
            number,
        });
    }

    brackets
}

/// Move each section's end marker past the endings linked to it that start
/// at or before it, so an ending after the backward repeat (the usual 2nd
/// ending) lies inside its section.
fn cover_endings(markers: &mut [RepeatMarker], brackets: &[VoltaBracket]) {
    for marker in markers.iter_mut().filter(|m| m.kind == RepeatKind::End) {
        let mut linked: Vec<&VoltaBracket> = brackets.iter().filter(|b| b.pair_id == marker.pair_id).collect();
        linked.sort_by_key(|b| b.start_measure);
        for bracket in linked {
            if bracket.start_measure <= marker.measure {
                marker.measure = marker.measure.max(bracket.end_measure.max(bracket.start_measure) + 1);
            }
        }
    }
}

// ─── Barline ─────────────────────────────────────────────────────────

fn parse_barline(node: &Node) -> Barline {
    let mut barline = Barline {
        repeat: None,
        ending: None,
    };

    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "repeat" => {
                barline.repeat = Some(match child.attribute("direction") {
                    Some("backward") => "backward",
                    _ => "forward",
                });
            }
            "ending" => {
                // "1, 2" style lists keep their first number
                let number = child
                    .attribute("number")
                    .and_then(|n| n.split(|c: char| c == ',' || c.is_whitespace()).find(|s| !s.is_empty()))
                    .and_then(|n| n.trim().parse().ok())
                    .unwrap_or(1);
                let ending_type = child.attribute("type").unwrap_or("start").to_string();
                barline.ending = Some((number, ending_type));
            }
            _ => {}
        }
    }

    barline
}

// ─── Attributes ──────────────────────────────────────────────────────

fn parse_time(node: &Node) -> Option<Meter> {
    let beats = child_text(node, "beats")?;
    let beat_type = child_text(node, "beat-type")?;
    // Compound numerators such as "3+2" add up
    let numerator: u32 = beats
        .split('+')
        .map(|b| b.trim().parse::<u32>().ok())
        .sum::<Option<u32>>()?;
    let denominator: u32 = beat_type.trim().parse().ok()?;
    match (u8::try_from(numerator), u8::try_from(denominator)) {
        (Ok(n), Ok(d)) if n > 0 && d > 0 => Some(Meter::new(n, d)),
        _ => {
            log::warn!("ignoring time signature {beats}/{beat_type}");
            None
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn trimmed_text(node: &Node) -> Option<String> {
    node.text()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn child_text(node: &Node, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| trimmed_text(&n))
}

fn child_f64(node: &Node, name: &str) -> Option<f64> {
    child_text(node, name)?.parse().ok()
}

fn parse_f64(node: &Node) -> Option<f64> {
    node.text()?.trim().parse().ok()
}
