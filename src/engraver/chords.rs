//! Chord and rest glyph construction.
//!
//! A chord is built around its own anchor: x = 0 is the left edge of the
//! normal notehead column and y = 0 is the top staffline. The layout later
//! moves the finished [`ChordLayout`] to its moment and staff.

use crate::duration::BaseSymbol;
use crate::model::{Clef, Event, Pitch, StemDirection};
use crate::pitch::{ledger_lines, staff_offset, MIDLINE};

use super::constants::*;
use super::geometry::{BoundingBox, Glyph, GlyphClass, Point};
use super::metrics::GlyphMetrics;

#[derive(Debug, Clone)]
pub(super) struct HeadLayout {
    pub(super) id: Option<String>,
    pub(super) pitch: Pitch,
    /// Staff offset in gap units
    pub(super) offset: f64,
    pub(super) center: Point,
    /// Moved to the other side of the stem because of a second
    pub(super) displaced: bool,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct StemLayout {
    pub(super) x: f64,
    pub(super) base_y: f64,
    pub(super) tip_y: f64,
}

#[derive(Debug, Clone)]
pub(super) struct ChordLayout {
    pub(super) event_id: String,
    pub(super) is_rest: bool,
    /// Drawn at grace scale, stem included
    pub(super) grace: bool,
    pub(super) direction: StemDirection,
    /// Top to bottom
    pub(super) heads: Vec<HeadLayout>,
    pub(super) stem: Option<StemLayout>,
    pub(super) accidental_boxes: Vec<BoundingBox>,
    pub(super) glyphs: Vec<Glyph>,
    /// Marks that follow the stem tip when a beam moves it
    pub(super) tip_marks: Vec<Glyph>,
    /// Extents around the anchor in gap units, both >= 0
    pub(super) left_extent: f64,
    pub(super) right_extent: f64,
}

impl ChordLayout {
    pub(super) fn translate(&mut self, dx: f64, dy: f64) {
        for head in &mut self.heads {
            head.center.x += dx;
            head.center.y += dy;
        }
        if let Some(stem) = &mut self.stem {
            stem.x += dx;
            stem.base_y += dy;
            stem.tip_y += dy;
        }
        for b in &mut self.accidental_boxes {
            b.translate(dx, dy);
        }
        for g in self.glyphs.iter_mut().chain(self.tip_marks.iter_mut()) {
            g.translate(dx, dy);
        }
    }

    /// Y of the head nearest the stem tip (the one a beam must clear).
    pub(super) fn beam_side_head_y(&self) -> f64 {
        let ys = self.heads.iter().map(|h| h.center.y);
        match self.direction {
            StemDirection::Up => ys.fold(f64::INFINITY, f64::min),
            StemDirection::Down => ys.fold(f64::NEG_INFINITY, f64::max),
        }
    }

    pub(super) fn average_head_y(&self) -> f64 {
        if self.heads.is_empty() {
            return 0.0;
        }
        self.heads.iter().map(|h| h.center.y).sum::<f64>() / self.heads.len() as f64
    }

    /// Move the stem tip; tip-anchored marks follow by the same delta.
    pub(super) fn set_stem_tip(&mut self, tip_y: f64) {
        let Some(stem) = &mut self.stem else { return };
        let delta = tip_y - stem.tip_y;
        stem.tip_y = tip_y;
        for mark in &mut self.tip_marks {
            mark.translate(0.0, delta);
        }
    }

    /// All glyphs of the chord, stem included.
    pub(super) fn into_glyphs(self, stem_width: f64) -> Vec<Glyph> {
        let stem_width = if self.grace { stem_width * GRACE_SCALE } else { stem_width };
        let mut out = self.glyphs;
        if let Some(stem) = self.stem {
            out.push(
                Glyph::line(
                    GlyphClass::Stem,
                    Point::new(stem.x, stem.base_y),
                    Point::new(stem.x, stem.tip_y),
                    stem_width,
                )
                .with_event(self.event_id.clone()),
            );
        }
        out.extend(self.tip_marks);
        out
    }
}

/// Builds chord glyphs for one configuration.
pub(super) struct ChordBuilder<'a> {
    pub(super) gap: f64,
    pub(super) stem_width: f64,
    pub(super) line_width: f64,
    pub(super) metrics: &'a dyn GlyphMetrics,
}

/// What the caller decided about a chord before building it.
#[derive(Debug, Clone, Copy)]
pub(super) struct ChordOptions {
    pub(super) direction: StemDirection,
    /// Part of a beam group: no flags, stem length settled by the beam
    pub(super) beamed: bool,
    /// `Some(slash)` for grace chords
    pub(super) grace: Option<bool>,
}

impl<'a> ChordBuilder<'a> {
    pub(super) fn build_chord(&self, event: &Event, clef: &Clef, opts: ChordOptions) -> ChordLayout {
        let g = self.gap;
        let scale = if opts.grace.is_some() { GRACE_SCALE } else { 1.0 };
        let base = event.duration.base;
        let head_w = self.metrics.notehead_width(base) * g * scale;
        let up = opts.direction == StemDirection::Up;

        let mut heads: Vec<HeadLayout> = event
            .heads
            .iter()
            .map(|h| {
                let offset = staff_offset(&h.pitch, clef);
                HeadLayout {
                    id: h.id.clone(),
                    pitch: h.pitch,
                    offset,
                    center: Point::new(head_w / 2.0, offset * g),
                    displaced: false,
                }
            })
            .collect();
        heads.sort_by(|a, b| a.offset.total_cmp(&b.offset));

        // Seconds: walk from the stem base, alternating sides in clusters.
        let order: Vec<usize> = if up { (0..heads.len()).rev().collect() } else { (0..heads.len()).collect() };
        let mut prev: Option<(f64, bool)> = None;
        for idx in order {
            let offset = heads[idx].offset;
            let displaced = matches!(prev, Some((p, false)) if (offset - p).abs() < 0.75);
            if displaced {
                heads[idx].displaced = true;
                heads[idx].center.x = if up {
                    head_w * 1.5 - self.stem_width
                } else {
                    -head_w / 2.0 + self.stem_width
                };
            }
            prev = Some((offset, displaced));
        }

        let mut glyphs = Vec::new();
        let symbol = match base {
            BaseSymbol::DoubleWhole => "noteheadDoubleWhole",
            BaseSymbol::Whole => "noteheadWhole",
            BaseSymbol::Half => "noteheadHalf",
            _ => "noteheadBlack",
        };
        let head_h = g * scale;
        for head in &heads {
            let bbox = BoundingBox::new(head.center.x - head_w / 2.0, head.center.y - head_h / 2.0, head_w, head_h);
            glyphs.push(
                Glyph::new(GlyphClass::Notehead, head.center, bbox)
                    .with_symbol(symbol)
                    .with_event(event.id.clone()),
            );
        }

        let heads_left = heads.iter().map(|h| h.center.x - head_w / 2.0).fold(f64::INFINITY, f64::min);
        let heads_right = heads.iter().map(|h| h.center.x + head_w / 2.0).fold(f64::NEG_INFINITY, f64::max);

        self.push_ledger_lines(&mut glyphs, &heads, heads_left, heads_right, scale);
        let accidental_boxes = self.push_accidentals(&mut glyphs, &heads, heads_left, scale, &event.id);
        self.push_dots(&mut glyphs, heads.iter().map(|h| h.offset), heads_right, event.duration.dots, scale, &event.id);

        // Stem
        let mut stem = None;
        if base.has_stem() && !heads.is_empty() {
            let sign = opts.direction.sign();
            let flags = base.flag_count();
            let x = if up { head_w - self.stem_width / 2.0 } else { self.stem_width / 2.0 };
            let (base_y, tip_head_y) = match (heads.first(), heads.last()) {
                (Some(top), Some(bottom)) if up => (bottom.center.y, top.center.y),
                (Some(top), Some(bottom)) => (top.center.y, bottom.center.y),
                _ => (0.0, 0.0),
            };
            let mut length = STEM_LENGTH * g * scale;
            if !opts.beamed && flags > 2 {
                length += FLAG_STEM_EXTRA * g * f64::from(flags - 2);
            }
            let mut tip_y = tip_head_y + sign * length;
            if opts.grace.is_none() {
                let mid = MIDLINE * g;
                if (up && tip_y > mid) || (!up && tip_y < mid) {
                    tip_y = mid;
                }
            }
            stem = Some(StemLayout { x, base_y, tip_y });

            if !opts.beamed && flags > 0 {
                let w = self.metrics.flag_width() * g * scale;
                let h = (3.0 + 0.5 * f64::from(flags.saturating_sub(1))) * g * scale;
                let y = if up { tip_y } else { tip_y - h };
                glyphs.push(
                    Glyph::new(GlyphClass::Flag, Point::new(x, tip_y), BoundingBox::new(x, y, w, h))
                        .with_symbol(flag_symbol(base, opts.direction))
                        .with_event(event.id.clone()),
                );
            }
            if opts.grace == Some(true) {
                let along = tip_y - sign * length * 0.35;
                let reach = 0.6 * g * scale;
                glyphs.push(
                    Glyph::line(
                        GlyphClass::GraceSlash,
                        Point::new(x - reach, along - sign * reach),
                        Point::new(x + reach, along + sign * reach),
                        self.stem_width,
                    )
                    .with_event(event.id.clone()),
                );
            }
        }

        // Articulations beyond the stem tip, or over the head without a stem.
        let mut tip_marks = Vec::new();
        for (i, name) in event.articulations.iter().enumerate() {
            let step = (ARTICULATION_OFFSET + i as f64) * g;
            let (cx, cy) = match (&stem, heads.first()) {
                (Some(s), _) => (s.x, s.tip_y + opts.direction.sign() * step),
                (None, Some(top)) => (top.center.x, top.center.y - step),
                (None, None) => (head_w / 2.0, -step),
            };
            tip_marks.push(
                Glyph::new(GlyphClass::Articulation, Point::new(cx, cy), BoundingBox::new(cx - g / 2.0, cy - g / 2.0, g, g))
                    .with_symbol(name.clone())
                    .with_event(event.id.clone()),
            );
        }

        let mut layout = ChordLayout {
            event_id: event.id.clone(),
            is_rest: false,
            grace: opts.grace.is_some(),
            direction: opts.direction,
            heads,
            stem,
            accidental_boxes,
            glyphs,
            tip_marks,
            left_extent: 0.0,
            right_extent: 0.0,
        };
        self.measure_extents(&mut layout);
        layout
    }

    /// A rest sits on the midline; voices with a forced stem move it out of the way.
    pub(super) fn build_rest(&self, event: &Event, voice_stem: Option<StemDirection>) -> ChordLayout {
        let g = self.gap;
        let base = event.duration.base;
        let width = self.metrics.rest_width(base) * g;
        let shift = match voice_stem {
            Some(StemDirection::Up) => -2.0,
            Some(StemDirection::Down) => 2.0,
            None => 0.0,
        };
        // (top, bottom) in staff offsets
        let (top, bottom) = match base {
            BaseSymbol::DoubleWhole => (1.0, 2.0),
            BaseSymbol::Whole => (1.0, 1.5),
            BaseSymbol::Half => (1.5, 2.0),
            BaseSymbol::Quarter => (0.5, 3.5),
            other => {
                let half = 1.0 + 0.5 * f64::from(other.flag_count());
                (MIDLINE - half, MIDLINE + half)
            }
        };
        let (top, bottom) = (top + shift, bottom + shift);
        let origin = Point::new(width / 2.0, (top + bottom) / 2.0 * g);
        let mut glyphs = vec![Glyph::new(GlyphClass::Rest, origin, BoundingBox::new(0.0, top * g, width, (bottom - top) * g))
            .with_symbol(rest_symbol(base))
            .with_event(event.id.clone())];
        let dot_offset = ((top + bottom) / 2.0 * 2.0).floor() / 2.0;
        self.push_dots(&mut glyphs, std::iter::once(dot_offset), width, event.duration.dots, 1.0, &event.id);

        let mut layout = ChordLayout {
            event_id: event.id.clone(),
            is_rest: true,
            grace: false,
            direction: voice_stem.unwrap_or(StemDirection::Up),
            heads: Vec::new(),
            stem: None,
            accidental_boxes: Vec::new(),
            glyphs,
            tip_marks: Vec::new(),
            left_extent: 0.0,
            right_extent: 0.0,
        };
        self.measure_extents(&mut layout);
        layout
    }

    fn push_ledger_lines(&self, glyphs: &mut Vec<Glyph>, heads: &[HeadLayout], left: f64, right: f64, scale: f64) {
        let g = self.gap;
        let mut lines: Vec<i32> = heads
            .iter()
            .flat_map(|h| ledger_lines(h.offset))
            .map(|o| o.round() as i32)
            .collect();
        lines.sort_unstable();
        lines.dedup();
        let extend = LEDGER_EXTEND * g * scale;
        for line in lines {
            let y = f64::from(line) * g;
            glyphs.push(Glyph::line(
                GlyphClass::LedgerLine,
                Point::new(left - extend, y),
                Point::new(right + extend, y),
                self.line_width,
            ));
        }
    }

    /// Accidentals in columns left of the heads, top to bottom; a later
    /// accidental moves one column further left when it would touch one
    /// already placed.
    fn push_accidentals(
        &self,
        glyphs: &mut Vec<Glyph>,
        heads: &[HeadLayout],
        heads_left: f64,
        scale: f64,
        event_id: &str,
    ) -> Vec<BoundingBox> {
        let g = self.gap;
        let mut columns: Vec<(f64, Vec<f64>)> = Vec::new(); // (width, occupied y's)
        let mut placed: Vec<(usize, &HeadLayout, f64)> = Vec::new();
        for head in heads.iter().filter(|h| h.pitch.alter != 0) {
            let width = self.metrics.accidental_width(head.pitch.alter) * g * scale;
            let y = head.center.y;
            let clearance = ACCIDENTAL_COLUMN_CLEARANCE * g * scale;
            let column = columns
                .iter()
                .position(|(_, ys)| ys.iter().all(|&other| (other - y).abs() >= clearance))
                .unwrap_or_else(|| {
                    columns.push((0.0, Vec::new()));
                    columns.len() - 1
                });
            columns[column].0 = columns[column].0.max(width);
            columns[column].1.push(y);
            placed.push((column, head, width));
        }

        let pad = ACCIDENTAL_PAD * g * scale;
        let mut boxes = Vec::new();
        for (column, head, width) in placed {
            let right = heads_left - pad - columns[..column].iter().map(|(w, _)| w + pad).sum::<f64>();
            let (above, below) = self.metrics.accidental_height(head.pitch.alter);
            let (above, below) = (above * g * scale, below * g * scale);
            let bbox = BoundingBox::new(right - width, head.center.y - above, width, above + below);
            boxes.push(bbox);
            glyphs.push(
                Glyph::new(GlyphClass::Accidental, Point::new(right - width, head.center.y), bbox)
                    .with_symbol(accidental_symbol(head.pitch.alter))
                    .with_event(event_id.to_string()),
            );
        }
        boxes
    }

    /// Augmentation dots; heads on a line put their dot in the space above.
    fn push_dots(
        &self,
        glyphs: &mut Vec<Glyph>,
        offsets: impl Iterator<Item = f64>,
        right: f64,
        dots: u8,
        scale: f64,
        event_id: &str,
    ) {
        if dots == 0 {
            return;
        }
        let g = self.gap;
        let mut steps: Vec<i32> = offsets
            .map(|o| {
                let step = (o * 2.0).round() as i32;
                if step.rem_euclid(2) == 0 {
                    step - 1
                } else {
                    step
                }
            })
            .collect();
        steps.sort_unstable();
        steps.dedup();
        let r = DOT_RADIUS * g * scale;
        for step in steps {
            let y = f64::from(step) * 0.5 * g;
            for i in 0..dots {
                let cx = right + (DOT_OFFSET + DOT_SPACING * f64::from(i)) * g * scale + r;
                glyphs.push(
                    Glyph::new(GlyphClass::Dot, Point::new(cx, y), BoundingBox::new(cx - r, y - r, 2.0 * r, 2.0 * r))
                        .with_symbol("augmentationDot")
                        .with_event(event_id.to_string()),
                );
            }
        }
    }

    fn measure_extents(&self, layout: &mut ChordLayout) {
        let mut left = 0.0_f64;
        let mut right = 0.0_f64;
        let stem_box = layout.stem.map(|s| BoundingBox::new(s.x - self.stem_width / 2.0, 0.0, self.stem_width, 0.0));
        for bbox in layout
            .glyphs
            .iter()
            .chain(layout.tip_marks.iter())
            .map(|g| g.bbox)
            .chain(stem_box)
        {
            left = left.min(bbox.x);
            right = right.max(bbox.right());
        }
        layout.left_extent = -left / self.gap;
        layout.right_extent = right / self.gap;
    }
}

fn flag_symbol(base: BaseSymbol, direction: StemDirection) -> String {
    let value = match base {
        BaseSymbol::Eighth => "8th",
        BaseSymbol::Sixteenth => "16th",
        BaseSymbol::ThirtySecond => "32nd",
        BaseSymbol::SixtyFourth => "64th",
        BaseSymbol::OneTwentyEighth => "128th",
        BaseSymbol::TwoFiftySixth => "256th",
        BaseSymbol::FiveTwelfth => "512th",
        _ => "1024th",
    };
    let dir = match direction {
        StemDirection::Up => "Up",
        StemDirection::Down => "Down",
    };
    format!("flag{value}{dir}")
}

fn rest_symbol(base: BaseSymbol) -> &'static str {
    match base {
        BaseSymbol::DoubleWhole => "restDoubleWhole",
        BaseSymbol::Whole => "restWhole",
        BaseSymbol::Half => "restHalf",
        BaseSymbol::Quarter => "restQuarter",
        BaseSymbol::Eighth => "rest8th",
        BaseSymbol::Sixteenth => "rest16th",
        BaseSymbol::ThirtySecond => "rest32nd",
        BaseSymbol::SixtyFourth => "rest64th",
        BaseSymbol::OneTwentyEighth => "rest128th",
        BaseSymbol::TwoFiftySixth => "rest256th",
        BaseSymbol::FiveTwelfth => "rest512th",
        BaseSymbol::OneThousandTwentyFourth => "rest1024th",
    }
}

pub(super) fn accidental_symbol(alter: i8) -> &'static str {
    match alter {
        2 => "accidentalDoubleSharp",
        1 => "accidentalSharp",
        -1 => "accidentalFlat",
        -2 => "accidentalDoubleFlat",
        _ => "accidentalNatural",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::parse_duration_token;
    use crate::engraver::metrics::DefaultMetrics;
    use crate::model::Head;

    fn event(id: &str, dur: &str, pitches: &[(char, i32, i8)]) -> Event {
        let mut duration = parse_duration_token(dur).unwrap();
        let ticks = crate::duration::basic_ticks(&duration);
        duration.set_resolved(ticks).unwrap();
        Event {
            id: id.into(),
            duration,
            tuplet_level: 0,
            heads: pitches
                .iter()
                .map(|&(l, o, a)| Head { pitch: Pitch::new(l, o, a), id: None })
                .collect(),
            ties: Vec::new(),
            slurs: Vec::new(),
            stem: None,
            beam: None,
            articulations: Vec::new(),
        }
    }

    fn builder(metrics: &DefaultMetrics) -> ChordBuilder<'_> {
        ChordBuilder { gap: 10.0, stem_width: 1.2, line_width: 0.8, metrics }
    }

    fn opts(direction: StemDirection) -> ChordOptions {
        ChordOptions { direction, beamed: false, grace: None }
    }

    fn count(layout: &ChordLayout, class: GlyphClass) -> usize {
        layout.glyphs.iter().filter(|g| g.class == class).count()
    }

    #[test]
    fn quarter_note_stem_and_extents() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        let chord = b.build_chord(&event("a", "/4", &[('G', 4, 0)]), &Clef::TREBLE, opts(StemDirection::Up));
        let stem = chord.stem.unwrap();
        // G4 is on the second line from the bottom: offset 3.
        assert_eq!(chord.heads[0].center.y, 30.0);
        assert_eq!(stem.tip_y, 30.0 - 35.0);
        assert_eq!(chord.left_extent, 0.0);
        assert!(chord.right_extent > 1.1);
        assert_eq!(count(&chord, GlyphClass::Flag), 0);
    }

    #[test]
    fn low_stems_reach_the_midline() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        // A3 in treble: offset 6; stem up would end at 2.5 (below the midline).
        let chord = b.build_chord(&event("a", "/8", &[('A', 3, 0)]), &Clef::TREBLE, opts(StemDirection::Up));
        assert_eq!(chord.stem.unwrap().tip_y, 20.0);
        assert_eq!(count(&chord, GlyphClass::Flag), 1);
        assert_eq!(count(&chord, GlyphClass::LedgerLine), 2);
    }

    #[test]
    fn seconds_are_displaced_and_accidentals_stack() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        let chord = b.build_chord(
            &event("a", "/4", &[('A', 4, 1), ('B', 4, -1), ('C', 5, 1)]),
            &Clef::TREBLE,
            opts(StemDirection::Up),
        );
        let displaced: Vec<bool> = chord.heads.iter().map(|h| h.displaced).collect();
        // top to bottom: C5, B4, A4. From the bottom: A4 normal, B4 displaced, C5 normal.
        assert_eq!(displaced, vec![false, true, false]);
        assert_eq!(chord.accidental_boxes.len(), 3);
        // not every accidental fits in the first column
        let rights: Vec<f64> = chord.accidental_boxes.iter().map(|b| b.right()).collect();
        assert!(rights.iter().any(|&r| r < rights[0] - 1e-9));
        assert!(chord.left_extent > 1.0);
    }

    #[test]
    fn dots_move_into_spaces() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        // G4 sits on a line (offset 3): dot goes to offset 2.5.
        let chord = b.build_chord(&event("a", "/4d", &[('G', 4, 0)]), &Clef::TREBLE, opts(StemDirection::Up));
        let dot = chord.glyphs.iter().find(|g| g.class == GlyphClass::Dot).unwrap();
        assert_eq!(dot.origin.y, 25.0);
    }

    #[test]
    fn tip_marks_follow_the_stem() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        let mut e = event("a", "/8", &[('B', 4, 0)]);
        e.articulations.push("staccato".into());
        let mut chord = b.build_chord(&e, &Clef::TREBLE, ChordOptions { direction: StemDirection::Down, beamed: true, grace: None });
        let before = chord.tip_marks[0].origin.y;
        let tip = chord.stem.unwrap().tip_y;
        chord.set_stem_tip(tip + 7.0);
        assert_eq!(chord.tip_marks[0].origin.y, before + 7.0);
        let glyphs = chord.into_glyphs(1.2);
        assert!(glyphs.iter().any(|g| g.class == GlyphClass::Stem));
    }

    #[test]
    fn rests_and_graces() {
        let metrics = DefaultMetrics;
        let b = builder(&metrics);
        let rest = b.build_rest(&event("r", "/2", &[]), None);
        assert!(rest.is_rest);
        assert_eq!(rest.glyphs[0].symbol.as_deref(), Some("restHalf"));
        assert_eq!(rest.glyphs[0].bbox.bottom(), 20.0);

        let grace = b.build_chord(
            &event("g", "/8", &[('D', 5, 0)]),
            &Clef::TREBLE,
            ChordOptions { direction: StemDirection::Up, beamed: false, grace: Some(true) },
        );
        let normal = b.build_chord(&event("n", "/8", &[('D', 5, 0)]), &Clef::TREBLE, opts(StemDirection::Up));
        assert!(grace.right_extent < normal.right_extent);
        assert!(grace.glyphs.iter().any(|g| g.class == GlyphClass::GraceSlash));
        assert!(grace.grace && !normal.grace && !normal.is_rest);

        let stem_width = |chord: ChordLayout| {
            chord.into_glyphs(1.2).into_iter().find(|g| g.class == GlyphClass::Stem).map(|g| g.bbox.width)
        };
        let (grace_stem, normal_stem) = (stem_width(grace).unwrap(), stem_width(normal).unwrap());
        assert!((grace_stem - 1.2 * GRACE_SCALE).abs() < 1e-9);
        assert!((normal_stem - 1.2).abs() < 1e-9);
    }
}
