//! Staff, clef, key/time signature, barline, repeat and text glyphs.
//!
//! Every builder takes the left edge `x` its block was given by the moment
//! aligner and the y of the staff's top line.

use crate::model::{
    BarlineStyle, Clef, ClefSign, Direction, DirectionKind, KeySignature, Pitch, Placement, TimeSignature,
};
use crate::pitch::{staff_step, MIDLINE};

use super::constants::*;
use super::geometry::{BoundingBox, Glyph, GlyphClass, PathSegment, Point};
use super::metrics::GlyphMetrics;

const THIN_BARLINE: f64 = 0.16;
const THICK_BARLINE: f64 = 0.5;

// ═══════════════════════════════════════════════════════════════════════
// Stafflines
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn staff_lines(x1: f64, x2: f64, staff_y: f64, gap: f64, line_width: f64) -> Vec<Glyph> {
    (0..STAFF_LINES)
        .map(|i| {
            let y = staff_y + i as f64 * gap;
            Glyph::line(GlyphClass::StaffLine, Point::new(x1, y), Point::new(x2, y), line_width)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Clef
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn clef(clef: &Clef, x: f64, staff_y: f64, gap: f64, metrics: &dyn GlyphMetrics) -> Glyph {
    let line_y = staff_y + f64::from(5 - clef.line) * gap;
    let (symbol, top, height) = match clef.sign {
        ClefSign::G => ("gClef", line_y - 4.5 * gap, 7.0 * gap),
        ClefSign::F => ("fClef", line_y - gap, 3.0 * gap),
        ClefSign::C => ("cClef", line_y - 2.0 * gap, 4.0 * gap),
        ClefSign::Percussion => ("unpitchedPercussionClef1", staff_y + gap, 2.0 * gap),
    };
    let symbol = match clef.octave_change {
        -1 => format!("{symbol}8vb"),
        1 => format!("{symbol}8va"),
        _ => symbol.to_string(),
    };
    let width = metrics.clef_width(clef) * gap;
    Glyph::new(GlyphClass::Clef, Point::new(x, line_y), BoundingBox::new(x, top, width, height)).with_symbol(symbol)
}

// ═══════════════════════════════════════════════════════════════════════
// Key signature
// ═══════════════════════════════════════════════════════════════════════

/// Treble-clef staff steps (half gaps below the top line) of the sharps
/// and flats in signature order.
const SHARP_STEPS: [i32; 7] = [0, 3, -1, 2, 5, 1, 4];
const FLAT_STEPS: [i32; 7] = [4, 1, 5, 2, 6, 3, 7];

/// Steps to add to the treble pattern for another clef: where F sits,
/// folded into one octave.
fn key_shift(clef: &Clef) -> i32 {
    (staff_step(&Pitch::new('F', 5, 0), clef) - staff_step(&Pitch::new('F', 5, 0), &Clef::TREBLE)).rem_euclid(7)
}

pub(super) fn key_signature(
    key: &KeySignature,
    clef: &Clef,
    x: f64,
    staff_y: f64,
    gap: f64,
    metrics: &dyn GlyphMetrics,
) -> Vec<Glyph> {
    if key.fifths == 0 || clef.sign == ClefSign::Percussion {
        return Vec::new();
    }
    let sharp = key.fifths > 0;
    let (steps, symbol) = if sharp { (&SHARP_STEPS, "accidentalSharp") } else { (&FLAT_STEPS, "accidentalFlat") };
    let alter = if sharp { 1 } else { -1 };
    let (above, below) = metrics.accidental_height(alter);
    let width = metrics.key_accidental_width(sharp) * gap;
    let shift = key_shift(clef);
    steps
        .iter()
        .take(key.fifths.unsigned_abs().min(7) as usize)
        .enumerate()
        .map(|(i, step)| {
            let ax = x + i as f64 * width;
            let ay = staff_y + f64::from(step + shift) * 0.5 * gap;
            Glyph::new(
                GlyphClass::KeySignature,
                Point::new(ax, ay),
                BoundingBox::new(ax, ay - above * gap, width, (above + below) * gap),
            )
            .with_symbol(symbol)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Time signature
// ═══════════════════════════════════════════════════════════════════════

pub(super) fn time_signature(time: &TimeSignature, x: f64, staff_y: f64, gap: f64, metrics: &dyn GlyphMetrics) -> Vec<Glyph> {
    let width = metrics.time_signature_width(time) * gap;
    [(time.beats, 1.0), (time.beat_type, 3.0)]
        .into_iter()
        .map(|(n, offset)| {
            let text = n.to_string();
            let w = text.len() as f64 * metrics.time_digit_width() * gap;
            let gx = x + (width - w) / 2.0;
            let cy = staff_y + offset * gap;
            Glyph::new(GlyphClass::TimeSignature, Point::new(gx, cy), BoundingBox::new(gx, cy - gap, w, 2.0 * gap))
                .with_text(text)
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Barlines and repeats
// ═══════════════════════════════════════════════════════════════════════

fn thick_bar(x: f64, staff_y: f64, gap: f64) -> Glyph {
    let (x1, y1) = (x + THICK_BARLINE * gap, staff_y + STAFF_HEIGHT * gap);
    Glyph::from_path(
        GlyphClass::Barline,
        vec![
            PathSegment::Move { to: Point::new(x, staff_y) },
            PathSegment::Line { to: Point::new(x1, staff_y) },
            PathSegment::Line { to: Point::new(x1, y1) },
            PathSegment::Line { to: Point::new(x, y1) },
            PathSegment::Close,
        ],
    )
}

fn thin_bar(x: f64, staff_y: f64, gap: f64) -> Glyph {
    let cx = x + THIN_BARLINE * gap / 2.0;
    Glyph::line(
        GlyphClass::Barline,
        Point::new(cx, staff_y),
        Point::new(cx, staff_y + STAFF_HEIGHT * gap),
        THIN_BARLINE * gap,
    )
}

pub(super) fn barline(style: BarlineStyle, x: f64, staff_y: f64, gap: f64, metrics: &dyn GlyphMetrics) -> Vec<Glyph> {
    let right = x + metrics.barline_width(style) * gap;
    match style {
        BarlineStyle::Regular => vec![thin_bar(x, staff_y, gap)],
        BarlineStyle::Dashed => vec![thin_bar(x, staff_y, gap).with_symbol("barlineDashed")],
        BarlineStyle::Double => vec![thin_bar(x, staff_y, gap), thin_bar(right - THIN_BARLINE * gap, staff_y, gap)],
        BarlineStyle::Final => vec![thin_bar(x, staff_y, gap), thick_bar(right - THICK_BARLINE * gap, staff_y, gap)],
        BarlineStyle::HeavyLight => vec![thick_bar(x, staff_y, gap), thin_bar(right - THIN_BARLINE * gap, staff_y, gap)],
    }
}

/// A pair of repeat dots in the two middle spaces.
pub(super) fn repeat_dots(x: f64, staff_y: f64, gap: f64, metrics: &dyn GlyphMetrics) -> Glyph {
    let width = metrics.repeat_width() * gap;
    let r = DOT_RADIUS * gap * 1.2;
    let cx = x + width / 2.0;
    Glyph::new(
        GlyphClass::Repeat,
        Point::new(cx, staff_y + MIDLINE * gap),
        BoundingBox::new(cx - r, staff_y + 1.5 * gap - r, 2.0 * r, gap + 2.0 * r),
    )
    .with_symbol("repeatDots")
}

// ═══════════════════════════════════════════════════════════════════════
// Text
// ═══════════════════════════════════════════════════════════════════════

/// Direction text starting at `x`. Tempo marks always go above the staff.
pub(super) fn direction(direction: &Direction, x: f64, staff_y: f64, gap: f64) -> Glyph {
    let (class, text, char_width) = match &direction.kind {
        DirectionKind::Dynamic(text) => (GlyphClass::Dynamic, text.clone(), DYNAMIC_CHAR_WIDTH),
        DirectionKind::Words(text) => (GlyphClass::Words, text.clone(), WORDS_CHAR_WIDTH),
        DirectionKind::Tempo(bpm) => (GlyphClass::Tempo, format!("\u{2669} = {bpm}"), WORDS_CHAR_WIDTH),
    };
    let placement = match direction.kind {
        DirectionKind::Tempo(_) => Placement::Above,
        _ => direction.placement,
    };
    let baseline = match placement {
        Placement::Above => staff_y - DIRECTION_DISTANCE * gap,
        Placement::Below => staff_y + (STAFF_HEIGHT + DIRECTION_DISTANCE) * gap,
    };
    let width = text.chars().count() as f64 * char_width * gap;
    let height = TEXT_HEIGHT * gap;
    Glyph::new(class, Point::new(x, baseline), BoundingBox::new(x, baseline - height, width, height)).with_text(text)
}

/// Tuplet ratio number centred on `cx` with its baseline at `y`.
pub(super) fn tuplet_number(label: &str, cx: f64, y: f64, gap: f64) -> Glyph {
    let width = label.len() as f64 * WORDS_CHAR_WIDTH * gap;
    let height = TEXT_HEIGHT * gap * 0.8;
    Glyph::new(GlyphClass::TupletNumber, Point::new(cx, y), BoundingBox::new(cx - width / 2.0, y - height, width, height))
        .with_text(label)
}

/// Title (centred) and composer (right-aligned) at the top of the first page.
pub(super) fn header(title: Option<&str>, composer: Option<&str>, page_width: f64, top: f64, right: f64, gap: f64) -> Vec<Glyph> {
    let mut out = Vec::new();
    if let Some(title) = title {
        let width = title.chars().count() as f64 * gap * 1.2;
        let y = top + 2.2 * gap;
        let x = page_width / 2.0 - width / 2.0;
        out.push(
            Glyph::new(GlyphClass::Title, Point::new(page_width / 2.0, y), BoundingBox::new(x, y - 2.2 * gap, width, 2.2 * gap))
                .with_text(title),
        );
    }
    if let Some(composer) = composer {
        let width = composer.chars().count() as f64 * gap * 0.6;
        let x = page_width - right;
        let y = top + 5.5 * gap;
        out.push(
            Glyph::new(GlyphClass::Composer, Point::new(x, y), BoundingBox::new(x - width, y - 1.1 * gap, width, 1.1 * gap))
                .with_text(composer),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engraver::metrics::DefaultMetrics;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_signature_positions_follow_the_clef() {
        let m = DefaultMetrics;
        let ys = |clef: &Clef| -> Vec<f64> {
            key_signature(&KeySignature { fifths: 2 }, clef, 0.0, 0.0, 10.0, &m)
                .iter()
                .map(|g| g.origin.y)
                .collect()
        };
        // F5 on the top line, C5 in the third space
        assert_eq!(ys(&Clef::TREBLE), vec![0.0, 15.0]);
        // F3 on the fourth line, C3 in the second space
        assert_eq!(ys(&Clef::BASS), vec![10.0, 25.0]);
        let flats = key_signature(&KeySignature { fifths: -3 }, &Clef::TREBLE, 0.0, 0.0, 10.0, &m);
        assert_eq!(flats.len(), 3);
        assert_eq!(flats[0].origin.y, 20.0);
    }

    #[test]
    fn barline_styles() {
        let m = DefaultMetrics;
        assert_eq!(barline(BarlineStyle::Regular, 0.0, 0.0, 10.0, &m).len(), 1);
        let fin = barline(BarlineStyle::Final, 0.0, 0.0, 10.0, &m);
        assert_eq!(fin.len(), 2);
        assert!((fin[1].bbox.right() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn dynamics_go_below_the_staff() {
        let d = Direction { kind: DirectionKind::Dynamic("mf".into()), placement: Placement::Below };
        let g = direction(&d, 5.0, 100.0, 10.0);
        assert_eq!(g.class, GlyphClass::Dynamic);
        assert!(g.bbox.y > 140.0);
    }
}
