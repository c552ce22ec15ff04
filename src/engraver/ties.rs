//! Ties and slurs.
//!
//! Curves are resolved per voice inside one system. A curve whose target
//! lies beyond the system's end is drawn to the right limit and handed to
//! the next system as a [`ContinuationRecord`]; the next system resolves
//! its records before anything else and draws them from its left limit.

use log::debug;

use crate::error::{EngraveError, Result};
use crate::model::{CurveSide, Event, Pitch, StemDirection};

use super::chords::{ChordLayout, HeadLayout};
use super::constants::*;
use super::geometry::{Glyph, GlyphClass, PathSegment, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CurveKind {
    Tie,
    Slur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Orientation {
    Over,
    Under,
}

impl Orientation {
    fn sign(self) -> f64 {
        match self {
            Orientation::Over => -1.0,
            Orientation::Under => 1.0,
        }
    }

    fn from_side(side: CurveSide) -> Option<Self> {
        match side {
            CurveSide::Up => Some(Orientation::Over),
            CurveSide::Down => Some(Orientation::Under),
            CurveSide::Unspecified => None,
        }
    }

    fn opposite_stem(direction: StemDirection) -> Self {
        match direction {
            StemDirection::Up => Orientation::Under,
            StemDirection::Down => Orientation::Over,
        }
    }
}

/// An open tie or slur handed from one system to the next.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ContinuationRecord {
    pub(super) kind: CurveKind,
    pub(super) part: usize,
    pub(super) voice: u32,
    pub(super) source_event: String,
    pub(super) target_event: Option<String>,
    pub(super) target_head: Option<String>,
    /// Pitch to match when a tie names no target head
    pub(super) pitch: Option<Pitch>,
    pub(super) orientation: Orientation,
    /// Start height in gap units below the staff's top line
    pub(super) begin_offset: f64,
    pub(super) origin_system: usize,
}

impl ContinuationRecord {
    pub(super) fn describe(&self) -> String {
        let kind = match self.kind {
            CurveKind::Tie => "tie",
            CurveKind::Slur => "slur",
        };
        match &self.target_event {
            Some(target) => format!("{kind} from '{}' to '{target}'", self.source_event),
            None => format!("{kind} from '{}'", self.source_event),
        }
    }
}

/// One voice's chords in time order, by index into the chord table.
pub(super) struct VoiceChords<'a> {
    pub(super) part: usize,
    pub(super) voice: u32,
    pub(super) staff_y: f64,
    pub(super) chords: Vec<(usize, &'a Event)>,
}

pub(super) struct CurveContext {
    pub(super) system: usize,
    pub(super) left_limit: f64,
    pub(super) right_limit: f64,
    pub(super) gap: f64,
}

/// Lay out every curve of a system. Returns the glyphs and the records
/// still open at the system's end.
pub(super) fn layout_curves(
    voices: &[VoiceChords<'_>],
    chords: &[ChordLayout],
    carried: Vec<ContinuationRecord>,
    ctx: &CurveContext,
) -> Result<(Vec<Glyph>, Vec<ContinuationRecord>)> {
    let mut glyphs = Vec::new();
    for record in carried {
        glyphs.push(resolve_continuation(voices, chords, &record, ctx)?);
    }

    let mut open = Vec::new();
    for voice in voices {
        for (pos, &(idx, event)) in voice.chords.iter().enumerate() {
            let source = &chords[idx];
            for tie in &event.ties {
                let next = voice.chords.get(pos + 1);
                if let (Some(expected), Some(&(_, next_event))) = (&tie.target_event, next) {
                    if *expected != next_event.id {
                        return Err(EngraveError::structural(format!(
                            "tie from '{}' names '{expected}' but the next chord is '{}'",
                            event.id, next_event.id
                        )));
                    }
                }
                let sources = tie_source_heads(source, tie.source_head.as_deref())?;
                for (head_index, head) in sources {
                    let orientation = Orientation::from_side(tie.side).unwrap_or_else(|| {
                        if source.heads.len() > 1 {
                            if 2 * head_index < source.heads.len() {
                                Orientation::Over
                            } else {
                                Orientation::Under
                            }
                        } else {
                            Orientation::opposite_stem(source.direction)
                        }
                    });
                    let start = start_point(head, CurveKind::Tie, orientation, ctx.gap);
                    match next {
                        Some(&(next_idx, _)) => {
                            let target = match_head(&chords[next_idx], tie.target_head.as_deref(), &head.pitch)
                                .ok_or_else(|| {
                                    EngraveError::structural(format!(
                                        "tie from '{}' has no matching head in '{}'",
                                        event.id, chords[next_idx].event_id
                                    ))
                                })?;
                            let end = end_point(target, CurveKind::Tie, orientation, ctx.gap);
                            glyphs.push(curve(CurveKind::Tie, start, end, orientation, ctx.gap, &event.id));
                        }
                        None => {
                            glyphs.push(fragment(CurveKind::Tie, start, orientation, ctx, &event.id));
                            open.push(ContinuationRecord {
                                kind: CurveKind::Tie,
                                part: voice.part,
                                voice: voice.voice,
                                source_event: event.id.clone(),
                                target_event: tie.target_event.clone(),
                                target_head: tie.target_head.clone(),
                                pitch: Some(head.pitch),
                                orientation,
                                begin_offset: (start.y - voice.staff_y) / ctx.gap,
                                origin_system: ctx.system,
                            });
                        }
                    }
                }
            }

            for slur in &event.slurs {
                let orientation =
                    Orientation::from_side(slur.side).unwrap_or_else(|| Orientation::opposite_stem(source.direction));
                let start = start_point(outer_head(source, orientation)?, CurveKind::Slur, orientation, ctx.gap);
                let target = voice.chords[pos + 1..].iter().find(|(_, e)| e.id == slur.target_event);
                match target {
                    Some(&(target_idx, _)) => {
                        let head = slur_target_head(&chords[target_idx], slur.target_head.as_deref(), orientation)?;
                        let end = end_point(head, CurveKind::Slur, orientation, ctx.gap);
                        glyphs.push(curve(CurveKind::Slur, start, end, orientation, ctx.gap, &event.id));
                    }
                    None => {
                        glyphs.push(fragment(CurveKind::Slur, start, orientation, ctx, &event.id));
                        open.push(ContinuationRecord {
                            kind: CurveKind::Slur,
                            part: voice.part,
                            voice: voice.voice,
                            source_event: event.id.clone(),
                            target_event: Some(slur.target_event.clone()),
                            target_head: slur.target_head.clone(),
                            pitch: None,
                            orientation,
                            begin_offset: (start.y - voice.staff_y) / ctx.gap,
                            origin_system: ctx.system,
                        });
                    }
                }
            }
        }
    }
    for record in &open {
        debug!("system {}: {} continues into the next system", ctx.system, record.describe());
    }
    Ok((glyphs, open))
}

fn resolve_continuation(
    voices: &[VoiceChords<'_>],
    chords: &[ChordLayout],
    record: &ContinuationRecord,
    ctx: &CurveContext,
) -> Result<Glyph> {
    let unresolved = || {
        EngraveError::structural(format!(
            "{} (system {}) is not resolved in the following system",
            record.describe(),
            record.origin_system
        ))
    };
    let voice = voices
        .iter()
        .find(|v| v.part == record.part && v.voice == record.voice)
        .ok_or_else(unresolved)?;

    let head = match record.kind {
        CurveKind::Tie => {
            let &(idx, event) = voice.chords.first().ok_or_else(unresolved)?;
            if record.target_event.as_ref().is_some_and(|t| *t != event.id) {
                return Err(unresolved());
            }
            let pitch = record.pitch.ok_or_else(unresolved)?;
            match_head(&chords[idx], record.target_head.as_deref(), &pitch).ok_or_else(unresolved)?
        }
        CurveKind::Slur => {
            let &(idx, _) = voice
                .chords
                .iter()
                .find(|(_, e)| Some(&e.id) == record.target_event.as_ref())
                .ok_or_else(unresolved)?;
            slur_target_head(&chords[idx], record.target_head.as_deref(), record.orientation)?
        }
    };
    let start = Point::new(ctx.left_limit, voice.staff_y + record.begin_offset * ctx.gap);
    let end = end_point(head, record.kind, record.orientation, ctx.gap);
    debug!("system {}: resolved {}", ctx.system, record.describe());
    Ok(curve(record.kind, start, end, record.orientation, ctx.gap, &record.source_event))
}

/// Heads a tie starts from, with their top-to-bottom index.
fn tie_source_heads<'c>(chord: &'c ChordLayout, source: Option<&str>) -> Result<Vec<(usize, &'c HeadLayout)>> {
    let heads: Vec<(usize, &HeadLayout)> = chord
        .heads
        .iter()
        .enumerate()
        .filter(|(_, h)| source.is_none() || h.id.as_deref() == source)
        .collect();
    if heads.is_empty() {
        return Err(EngraveError::structural(format!(
            "tie in '{}' starts from unknown head '{}'",
            chord.event_id,
            source.unwrap_or("")
        )));
    }
    Ok(heads)
}

fn match_head<'c>(chord: &'c ChordLayout, head_id: Option<&str>, pitch: &Pitch) -> Option<&'c HeadLayout> {
    match head_id {
        Some(id) => chord.heads.iter().find(|h| h.id.as_deref() == Some(id)),
        None => chord.heads.iter().find(|h| h.pitch == *pitch),
    }
}

/// The head on the curve's side: top head for curves over the chord.
fn outer_head(chord: &ChordLayout, orientation: Orientation) -> Result<&HeadLayout> {
    let head = match orientation {
        Orientation::Over => chord.heads.first(),
        Orientation::Under => chord.heads.last(),
    };
    head.ok_or_else(|| EngraveError::structural(format!("slur endpoint '{}' has no noteheads", chord.event_id)))
}

fn slur_target_head<'c>(chord: &'c ChordLayout, head_id: Option<&str>, orientation: Orientation) -> Result<&'c HeadLayout> {
    match head_id {
        Some(id) => chord.heads.iter().find(|h| h.id.as_deref() == Some(id)).ok_or_else(|| {
            EngraveError::structural(format!("slur target head '{id}' not found in '{}'", chord.event_id))
        }),
        None => outer_head(chord, orientation),
    }
}

fn end_offset(kind: CurveKind) -> (f64, f64) {
    let (angle, radius) = match kind {
        CurveKind::Slur => (SLUR_END_ANGLE_DEG, SLUR_END_RADIUS),
        CurveKind::Tie => (TIE_END_ANGLE_DEG, TIE_END_RADIUS),
    };
    let rad = angle.to_radians();
    (radius * rad.cos(), radius * rad.sin())
}

fn start_point(head: &HeadLayout, kind: CurveKind, orientation: Orientation, gap: f64) -> Point {
    let (dx, dy) = end_offset(kind);
    Point::new(head.center.x + dx * gap, head.center.y + orientation.sign() * dy * gap)
}

fn end_point(head: &HeadLayout, kind: CurveKind, orientation: Orientation, gap: f64) -> Point {
    let (dx, dy) = end_offset(kind);
    Point::new(head.center.x - dx * gap, head.center.y + orientation.sign() * dy * gap)
}

fn fragment(kind: CurveKind, start: Point, orientation: Orientation, ctx: &CurveContext, event_id: &str) -> Glyph {
    let end = Point::new(ctx.right_limit, start.y);
    curve(kind, start, end, orientation, ctx.gap, event_id)
}

/// Filled crescent: outer cubic there, inner cubic back, thicker in the middle.
fn curve(kind: CurveKind, start: Point, end: Point, orientation: Orientation, gap: f64, event_id: &str) -> Glyph {
    let (min_h, max_h, class) = match kind {
        CurveKind::Slur => (SLUR_MIN_HEIGHT, SLUR_MAX_HEIGHT, GlyphClass::Slur),
        CurveKind::Tie => (TIE_MIN_HEIGHT, TIE_MAX_HEIGHT, GlyphClass::Tie),
    };
    let dir = orientation.sign();
    let dx = (end.x - start.x).abs().max(1.0);
    let height = (dx * CURVE_HEIGHT_FACTOR).clamp(min_h * gap, max_h * gap);
    let mid_y = (start.y + end.y) / 2.0;

    let c1 = Point::new(start.x + dx * 0.25, mid_y + dir * height);
    let c2 = Point::new(start.x + dx * 0.75, mid_y + dir * height);
    let ep = CURVE_ENDPOINT_THICKNESS * gap * dir;
    let cp = CURVE_MID_THICKNESS * gap * dir;

    Glyph::from_path(
        class,
        vec![
            PathSegment::Move { to: start },
            PathSegment::Cubic { c1, c2, to: end },
            PathSegment::Line { to: Point::new(end.x, end.y + ep) },
            PathSegment::Cubic {
                c1: Point::new(c2.x, c2.y + cp),
                c2: Point::new(c1.x, c1.y + cp),
                to: Point::new(start.x, start.y + ep),
            },
            PathSegment::Close,
        ],
    )
    .with_event(event_id.to_string())
}
