//! Data model for a symbolic score.
//!
//! The tree is built by the loader (or by hand in tests), resolved once by
//! [`crate::resolve::resolve_score`], and then only read by the engraver.

use serde::{Deserialize, Serialize};

use crate::duration::Duration;

/// A complete score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
    /// Title of the piece
    pub title: Option<String>,
    /// Composer name
    pub composer: Option<String>,
    /// Measure-level attributes shared by every part
    pub global: Option<GlobalSequence>,
    /// Musical parts (instruments)
    pub parts: Vec<Part>,
}

/// Per-measure barlines and signatures shared across parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSequence {
    pub measures: Vec<GlobalMeasure>,
}

/// Global attributes for one measure. Absent entries mean "no change".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMeasure {
    /// 1-based measure number this entry applies to
    pub number: u32,
    pub time: Option<TimeSignature>,
    pub key: Option<KeySignature>,
    /// Barline drawn at the start of the measure (e.g. a heavy-light opener)
    pub start_barline: Option<BarlineStyle>,
    /// Barline drawn at the end of the measure; defaults to a regular bar
    pub end_barline: Option<BarlineStyle>,
    /// Forward repeat at the start of the measure
    pub repeat_start: bool,
    /// Backward repeat at the end of the measure
    pub repeat_end: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u32,
    pub beat_type: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    /// Number of sharps (positive) or flats (negative)
    pub fifths: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarlineStyle {
    Regular,
    Double,
    /// Thin-thick; the final barline
    Final,
    /// Thick-thin; opens a section
    HeavyLight,
    Dashed,
}

/// A musical part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    /// Part identifier (e.g., "P1")
    pub id: String,
    pub name: Option<String>,
    /// Ordered list of measures
    pub measures: Vec<Measure>,
}

/// One measure of one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measure {
    /// 1-based measure number
    pub number: u32,
    /// Clef change at the start of this measure
    pub clef: Option<Clef>,
    /// Voices; at least one
    pub sequences: Vec<Sequence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClefSign {
    G,
    F,
    C,
    Percussion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clef {
    pub sign: ClefSign,
    /// Staff line the clef sits on, counted from the bottom (1..=5)
    pub line: i32,
    /// Octave transposition, e.g. -1 for a tenor's octave-lower treble clef
    pub octave_change: i32,
}

impl Clef {
    pub const TREBLE: Clef = Clef { sign: ClefSign::G, line: 2, octave_change: 0 };
    pub const BASS: Clef = Clef { sign: ClefSign::F, line: 4, octave_change: 0 };
}

impl Default for Clef {
    fn default() -> Self {
        Clef::TREBLE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StemDirection {
    Up,
    Down,
}

impl StemDirection {
    /// +1 when the stem points down the page (y grows downward), -1 when up.
    pub fn sign(self) -> f64 {
        match self {
            StemDirection::Up => -1.0,
            StemDirection::Down => 1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            StemDirection::Up => StemDirection::Down,
            StemDirection::Down => StemDirection::Up,
        }
    }
}

/// One voice in a measure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    /// Voice number, stable across measures of a part
    pub voice: u32,
    /// Stem direction forced on every chord of this voice
    pub stem: Option<StemDirection>,
    pub items: Vec<SequenceItem>,
}

/// The closed set of things a sequence can contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SequenceItem {
    Event(Event),
    Grace(Grace),
    Tuplet(Tuplet),
    Beamed(Beamed),
    Direction(Direction),
}

/// A chord (one or more heads) or a rest (no heads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique within the score
    pub id: String,
    pub duration: Duration,
    /// Tuplet nesting depth, assigned during resolution
    pub tuplet_level: u32,
    /// Noteheads; empty for a rest
    pub heads: Vec<Head>,
    pub ties: Vec<TieDef>,
    pub slurs: Vec<SlurDef>,
    /// Explicit stem direction for this chord
    pub stem: Option<StemDirection>,
    /// Beam marker for beams that are not expressed as a `Beamed` node
    pub beam: Option<BeamMarker>,
    /// Marks placed beyond the stem tip (accent, staccato, fermata, ...)
    pub articulations: Vec<String>,
}

impl Event {
    pub fn is_rest(&self) -> bool {
        self.heads.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeamMarker {
    Start,
    End,
}

/// A notehead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Head {
    pub pitch: Pitch,
    /// Target for ties and slurs
    pub id: Option<String>,
}

/// Diatonic pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    /// Note letter, one of A–G
    pub letter: char,
    /// Octave number (middle C = C4)
    pub octave: i32,
    /// Chromatic alteration, -2..=2
    pub alter: i8,
}

/// Grace chords drawn small before the next event; they take no time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grace {
    pub events: Vec<Event>,
    /// Draw the acciaccatura slash
    pub slash: bool,
}

/// A proportional time span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tuplet {
    /// The time the tuplet occupies
    pub outer: Duration,
    /// The written content; only used for the bracket label
    pub inner: Option<Duration>,
    /// Nesting depth, 0 for a tuplet directly in a sequence
    pub nesting_level: u32,
    pub children: Vec<SequenceItem>,
}

/// Chords joined by a beam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beamed {
    pub children: Vec<SequenceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectionKind {
    Dynamic(String),
    Words(String),
    /// Quarter notes per minute
    Tempo(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub kind: DirectionKind,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveSide {
    Up,
    Down,
    Unspecified,
}

/// A tie from one head to the same pitch in the next chord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieDef {
    /// Expected id of the next chord, if the source names it
    pub target_event: Option<String>,
    pub target_head: Option<String>,
    /// Head of this chord the tie starts from; all matching heads if absent
    pub source_head: Option<String>,
    pub side: CurveSide,
}

/// A slur to a later chord in the same voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlurDef {
    pub target_event: String,
    pub target_head: Option<String>,
    pub side: CurveSide,
}

impl Score {
    pub fn new() -> Self {
        Self {
            title: None,
            composer: None,
            global: None,
            parts: Vec::new(),
        }
    }

    /// Number of measures (taken from the first part).
    pub fn measure_count(&self) -> usize {
        self.parts.first().map_or(0, |p| p.measures.len())
    }

    /// Global attributes for a 1-based measure number.
    pub fn global_measure(&self, number: u32) -> Option<&GlobalMeasure> {
        self.global
            .as_ref()
            .and_then(|g| g.measures.iter().find(|m| m.number == number))
    }

    /// Visit every event of the score, including grace events and events
    /// nested in tuplets and beams.
    pub fn for_each_event<'a>(&'a self, mut f: impl FnMut(&'a Event)) {
        for part in &self.parts {
            for measure in &part.measures {
                for seq in &measure.sequences {
                    visit_items(&seq.items, &mut f);
                }
            }
        }
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

fn visit_items<'a>(items: &'a [SequenceItem], f: &mut impl FnMut(&'a Event)) {
    for item in items {
        match item {
            SequenceItem::Event(e) => f(e),
            SequenceItem::Grace(g) => g.events.iter().for_each(&mut *f),
            SequenceItem::Tuplet(t) => visit_items(&t.children, f),
            SequenceItem::Beamed(b) => visit_items(&b.children, f),
            SequenceItem::Direction(_) => {}
        }
    }
}

impl Pitch {
    pub fn new(letter: char, octave: i32, alter: i8) -> Self {
        Self { letter, octave, alter }
    }

    /// Diatonic step index within the octave, C = 0 … B = 6.
    pub fn letter_index(&self) -> i32 {
        match self.letter {
            'C' => 0,
            'D' => 1,
            'E' => 2,
            'F' => 3,
            'G' => 4,
            'A' => 5,
            'B' => 6,
            _ => 0,
        }
    }

    /// Absolute diatonic number: octave × 7 + letter index.
    pub fn diatonic(&self) -> i32 {
        self.octave * 7 + self.letter_index()
    }
}

impl TimeSignature {
    /// Nominal measure length in ticks.
    pub fn measure_ticks(&self) -> u64 {
        let per_beat = crate::duration::QUARTER_TICKS * 4 / u64::from(self.beat_type.max(1));
        per_beat * u64::from(self.beats)
    }
}
