//! Integration tests — import MusicXML documents and MXL archives built in
//! memory, then run them through the engine.

use std::io::{Cursor, Write};

use pretty_assertions::assert_eq;
use stafflib::*;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Two 4/4 measures in G major inside a repeat with a first ending, then a
/// 3/4 measure. Divisions are 2 per quarter.
const SCORE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <work><work-title>Test Tune</work-title></work>
  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>2</divisions>
        <key><fifths>1</fifths></key>
        <time><beats>4</beats><beat-type>4</beat-type></time>
      </attributes>
      <barline location="left"><repeat direction="forward"/></barline>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><tie type="start"/></note>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice><tie type="stop"/></note>
      <note><pitch><step>C</step><octave>5</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><chord/><pitch><step>E</step><octave>5</octave></pitch><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>F</step><alter>0</alter><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>1</duration><voice>1</voice></note>
    </measure>
    <measure number="2">
      <barline location="left"><ending number="1" type="start"/></barline>
      <note><pitch><step>F</step><octave>4</octave></pitch><duration>8</duration><voice>1</voice></note>
      <barline location="right"><ending number="1" type="stop"/><repeat direction="backward"/></barline>
    </measure>
    <measure number="3">
      <attributes><time><beats>3</beats><beat-type>4</beat-type></time></attributes>
      <note><rest/><duration>2</duration><voice>1</voice></note>
      <note><pitch><step>A</step><octave>4</octave></pitch><duration>4</duration><voice>1</voice></note>
    </measure>
  </part>
</score-partwise>"#;

fn summary(composition: &Composition) -> Vec<(String, String, Duration, f64)> {
    composition
        .notes
        .iter()
        .map(|n| (n.id.clone(), n.pitch.to_string(), n.duration, n.beat))
        .collect()
}

fn build_mxl(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container><rootfiles><rootfile full-path="score.xml" media-type="application/vnd.recordare.musicxml+xml"/></rootfiles></container>"#;

// ─── MusicXML ───────────────────────────────────────────────────────

#[test]
fn imports_notes_with_key_ties_and_chords() {
    let c = parse_musicxml(SCORE).expect("score should import");

    assert_eq!(c.title.as_deref(), Some("Test Tune"));
    assert_eq!(
        summary(&c),
        vec![
            ("n1".into(), "F#4".into(), Duration::Quarter, 0.0),
            ("n2".into(), "G4".into(), Duration::Quarter, 1.0),
            ("n3".into(), "C5".into(), Duration::Quarter, 2.0),
            ("n4".into(), "E5".into(), Duration::Quarter, 2.0),
            ("n5".into(), "F4".into(), Duration::Eighth, 3.0),
            ("n6".into(), "F4".into(), Duration::Eighth, 3.5),
            ("n7".into(), "F#4".into(), Duration::Whole, 4.0),
            ("r1".into(), "REST".into(), Duration::Quarter, 8.0),
            ("n8".into(), "A4".into(), Duration::Half, 9.0),
        ]
    );
}

#[test]
fn imports_meters_repeats_and_voltas() {
    let c = parse_musicxml(SCORE).unwrap();

    assert_eq!(c.meter, Meter::new(4, 4));
    assert_eq!(
        c.meter_changes,
        vec![MeterChange {
            measure: 2,
            meter: Meter::new(3, 4)
        }]
    );
    assert_eq!(c.measure_count(), 3);

    let markers: Vec<(RepeatKind, usize)> = c.repeat_markers.iter().map(|m| (m.kind, m.measure)).collect();
    assert_eq!(markers, vec![(RepeatKind::Start, 0), (RepeatKind::End, 2)]);
    assert_eq!(c.volta_brackets.len(), 1);
    let volta = &c.volta_brackets[0];
    assert_eq!((volta.start_measure, volta.end_measure, volta.number), (1, 1, 1));
    assert_eq!(volta.pair_id, c.repeat_markers[0].pair_id);

    assert!(validate_structure(&c).is_empty());
    // The chord note counts toward its measure like any other note.
    let reports = validate_measures(&c);
    assert_eq!(reports[0].descriptor.as_deref(), Some("5/4 beats"));
    assert!(reports[1].valid);
    assert!(reports[2].valid);
}

#[test]
fn imported_score_lays_out() {
    let c = parse_musicxml(SCORE).unwrap();
    let snapshot = Snapshot::compute(&c, &LayoutParams::new(2, 1.0));

    assert_eq!(snapshot.rows.len(), 2);
    assert!(snapshot.rows[0].measures[0].has_repeat_start);
    assert!(snapshot.rows[0].measures[1].has_repeat_end);
    assert!(snapshot.rows[1].measures[0].show_meter_label);
    assert_eq!(snapshot.rows[0].total_width, snapshot.rows[1].total_width);
    // The two eighths at 3 and 3.5 share the second band of measure 0.
    assert_eq!(snapshot.beam_groups.len(), 1);
    assert_eq!(snapshot.beam_groups[0].notes, vec![4, 5]);
}

#[test]
fn first_and_second_endings_stay_inside_their_section() {
    let xml = r#"<score-partwise><part id="P1">
      <measure number="1">
        <attributes><divisions>1</divisions></attributes>
        <barline location="left"><repeat direction="forward"/></barline>
        <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration></note>
      </measure>
      <measure number="2">
        <barline location="left"><ending number="1" type="start"/></barline>
        <note><pitch><step>D</step><octave>5</octave></pitch><duration>4</duration></note>
        <barline location="right"><ending number="1" type="stop"/><repeat direction="backward"/></barline>
      </measure>
      <measure number="3">
        <barline location="left"><ending number="2" type="start"/></barline>
        <note><pitch><step>E</step><octave>5</octave></pitch><duration>4</duration></note>
        <barline location="right"><ending number="2" type="discontinue"/></barline>
      </measure>
      <measure number="4">
        <note><pitch><step>F</step><octave>5</octave></pitch><duration>4</duration></note>
      </measure>
    </part></score-partwise>"#;
    let c = parse_musicxml(xml).unwrap();

    let voltas: Vec<(usize, usize, u32)> =
        c.volta_brackets.iter().map(|v| (v.start_measure, v.end_measure, v.number)).collect();
    assert_eq!(voltas, vec![(1, 1, 1), (2, 2, 2)]);
    assert!(c.volta_brackets.iter().all(|v| v.pair_id == c.repeat_markers[0].pair_id));
    let sections = c.repeat_sections();
    assert_eq!((sections[0].start, sections[0].end), (0, 3));
    assert!(validate_structure(&c).is_empty());
    assert_eq!(c.measure_count(), 4);
}

#[test]
fn compound_meter_counts_eighth_beats() {
    let xml = r#"<score-partwise>
      <part id="P1"><measure number="1">
        <attributes><divisions>2</divisions><time><beats>6</beats><beat-type>8</beat-type></time></attributes>
        <note><pitch><step>C</step><octave>5</octave></pitch><duration>1</duration></note>
        <note><pitch><step>D</step><octave>5</octave></pitch><duration>1</duration></note>
        <note><pitch><step>E</step><octave>5</octave></pitch><duration>1</duration></note>
        <note><pitch><step>F</step><octave>5</octave></pitch><duration>3</duration></note>
      </measure></part>
    </score-partwise>"#;
    let c = parse_musicxml(xml).unwrap();

    assert_eq!(c.meter, Meter::new(6, 8));
    let beats: Vec<(f64, Duration)> = c.notes.iter().map(|n| (n.beat, n.duration)).collect();
    assert_eq!(
        beats,
        vec![
            (0.0, Duration::Quarter),
            (1.0, Duration::Quarter),
            (2.0, Duration::Quarter),
            (3.0, Duration::DottedHalf),
        ]
    );
    assert!(validate_measures(&c)[0].valid);
}

#[test]
fn second_voice_is_skipped() {
    let xml = r#"<score-partwise>
      <part id="P1"><measure number="1">
        <attributes><divisions>1</divisions></attributes>
        <note><pitch><step>C</step><octave>5</octave></pitch><duration>4</duration><voice>1</voice></note>
        <backup><duration>4</duration></backup>
        <note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><voice>2</voice></note>
      </measure></part>
    </score-partwise>"#;
    let c = parse_musicxml(xml).unwrap();
    assert_eq!(summary(&c), vec![("n1".into(), "C5".into(), Duration::Whole, 0.0)]);
}

#[test]
fn rejects_malformed_documents() {
    assert!(matches!(parse_musicxml("<score-partwise>"), Err(StaffError::Xml(_))));
    assert!(matches!(
        parse_musicxml("<score-timewise/>"),
        Err(StaffError::UnsupportedRoot(_))
    ));
}

// ─── MXL ────────────────────────────────────────────────────────────

#[test]
fn mxl_with_container() {
    let data = build_mxl(&[("META-INF/container.xml", CONTAINER), ("score.xml", SCORE)]);
    let c = parse_mxl(&data).unwrap();
    assert_eq!(c, parse_musicxml(SCORE).unwrap());
}

#[test]
fn mxl_without_container_finds_the_score() {
    let data = build_mxl(&[("readme.txt", "hello"), ("song.musicxml", SCORE)]);
    let c = parse_bytes(&data, Some("mxl")).unwrap();
    assert_eq!(c.notes.len(), 9);
}

#[test]
fn mxl_without_score_is_an_error() {
    let data = build_mxl(&[("readme.txt", "hello")]);
    match parse_mxl(&data) {
        Err(StaffError::MissingRootFile(names)) => assert_eq!(names, vec!["readme.txt".to_string()]),
        other => panic!("expected MissingRootFile, got {other:?}"),
    }
}

#[test]
fn parse_bytes_detects_the_format() {
    let from_xml = parse_bytes(SCORE.as_bytes(), None).unwrap();
    let from_zip = parse_bytes(&build_mxl(&[("META-INF/container.xml", CONTAINER), ("score.xml", SCORE)]), None).unwrap();
    assert_eq!(from_xml, from_zip);
}

// ─── JSON ───────────────────────────────────────────────────────────

#[test]
fn composition_json_round_trip() {
    let c = parse_musicxml(SCORE).unwrap();
    let json = composition_to_json(&c).unwrap();
    assert!(json.contains("\"F#4\""));
    assert_eq!(composition_from_json(&json).unwrap(), c);
}

#[test]
fn off_grid_duration_does_not_reject_the_composition() {
    let json = r#"{
        "notes": [
            {"id": "a", "pitch": "C5", "duration": 0.3, "beat": 0.0},
            {"id": "b", "pitch": "D5", "duration": 1.0, "beat": 1.0}
        ]
    }"#;
    let c = composition_from_json(json).unwrap();
    assert_eq!(c.notes.len(), 2);
    assert_eq!(c.notes[0].duration, Duration::Sixteenth);
    assert!(snapshot_json(json, "{}").is_ok());
}

#[test]
fn snapshot_json_from_json_inputs() {
    let json = r#"{
        "meter": {"numerator": 4, "denominator": 4},
        "notes": [
            {"id": "a", "pitch": "C5", "duration": 0.5, "beat": 0.0},
            {"id": "b", "pitch": "D5", "duration": 0.5, "beat": 0.5}
        ]
    }"#;
    let out = snapshot_json(json, r#"{"measures_per_row": 2}"#).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["beam_groups"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["params"]["measures_per_row"], 2);
}
