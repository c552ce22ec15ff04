//! Integration tests: load the fixture scores and resolve their durations.

use std::io::{Cursor, Write};
use std::path::PathBuf;

use engravelib::timemap::TimeMap;
use engravelib::{parse_bytes, parse_file, resolve_score, EngraveError, Score, SequenceItem};
use pretty_assertions::assert_eq;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load(name: &str) -> Score {
    let mut score = parse_file(fixtures_dir().join(name)).unwrap_or_else(|e| panic!("{name}: {e}"));
    resolve_score(&mut score).unwrap_or_else(|e| panic!("{name}: {e}"));
    score
}

/// (id, ticks) of every event in part order, graces included.
fn event_ticks(score: &Score) -> Vec<(String, u64)> {
    let mut out = Vec::new();
    score.for_each_event(|e| out.push((e.id.clone(), e.duration.ticks())));
    out
}

// ─── Etude ───────────────────────────────────────────────────────────

#[test]
fn parse_etude_metadata() {
    let score = load("etude.xml");
    assert_eq!(score.title.as_deref(), Some("Etude in F"));
    assert_eq!(score.composer.as_deref(), Some("Anon."));
    assert_eq!(score.parts.len(), 1);
    assert_eq!(score.parts[0].name.as_deref(), Some("Flute"));
    assert_eq!(score.measure_count(), 4);

    let global = score.global_measure(1).expect("measure 1 has global attributes");
    assert_eq!(global.key.map(|k| k.fifths), Some(-1));
    assert_eq!(global.time.map(|t| (t.beats, t.beat_type)), Some((3, 4)));
}

#[test]
fn etude_ticks_resolve() {
    let score = load("etude.xml");
    let ticks: Vec<(String, u64)> = event_ticks(&score);
    let expected: Vec<(String, u64)> = [
        ("a", 384),
        ("b", 384),
        ("c", 768),
        ("d", 768),
        ("e", 768),
        ("f", 256),
        ("g", 256),
        ("h", 256),
        ("r1", 768),
        ("i", 0),
        ("j", 2304),
        ("k", 2304),
    ]
    .iter()
    .map(|(id, t)| (id.to_string(), *t))
    .collect();
    assert_eq!(ticks, expected);
}

#[test]
fn etude_tuplet_level_and_timing() {
    let score = load("etude.xml");
    let measure = &score.parts[0].measures[1];
    let tuplet = measure.sequences[0]
        .items
        .iter()
        .find_map(|item| match item {
            SequenceItem::Tuplet(t) => Some(t),
            _ => None,
        })
        .expect("measure 2 has a tuplet");
    assert_eq!(tuplet.nesting_level, 0);

    let map = TimeMap::build(&score, 120.0);
    let starts: Vec<u64> = map.entries.iter().map(|e| e.start_tick).collect();
    assert_eq!(starts, vec![0, 2304, 4608, 6912]);
    assert_eq!(map.total_duration_ms(), 6000.0);
}

// ─── Duet ────────────────────────────────────────────────────────────

#[test]
fn duet_tempo_change_slows_playback() {
    let score = load("duet.xml");
    assert_eq!(score.parts.len(), 2);
    assert_eq!(score.parts[1].measures[0].sequences.len(), 2);

    let map = TimeMap::build(&score, 120.0);
    // The tempo direction sits at the very start: every quarter lasts one second.
    assert_eq!(map.tempo_at(0), 60.0);
    assert_eq!(map.total_duration_ms(), 4000.0);
}

// ─── Containers and errors ───────────────────────────────────────────

#[test]
fn zipped_container_matches_plain_file() {
    let xml = std::fs::read(fixtures_dir().join("long_slur.xml")).unwrap();
    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
        writer
            .start_file("META-INF/container.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(br#"<container><rootfiles><rootfile full-path="long_slur.xml"/></rootfiles></container>"#)
            .unwrap();
        writer.start_file("long_slur.xml", zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(&xml).unwrap();
        writer.finish().unwrap();
    }

    let mut zipped = parse_bytes(&buf).unwrap();
    let mut plain = parse_bytes(&xml).unwrap();
    resolve_score(&mut zipped).unwrap();
    resolve_score(&mut plain).unwrap();
    assert_eq!(zipped.title.as_deref(), Some("Long Slur"));
    assert_eq!(event_ticks(&zipped), event_ticks(&plain));
}

#[test]
fn syntax_error_names_file_and_line() {
    match parse_file(fixtures_dir().join("bad_duration.xml")) {
        Err(EngraveError::Syntax { location, .. }) => {
            assert!(location.file.as_deref().is_some_and(|f| f.ends_with("bad_duration.xml")));
            assert_eq!(location.line, 7);
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn missing_file_is_io_error() {
    assert!(matches!(
        parse_file(fixtures_dir().join("no_such_score.xml")),
        Err(EngraveError::Io { .. })
    ));
}
