//! Rendering metrics.
//!
//! Glyph dimensions come from outside the layout code: a renderer with a
//! real music font can supply its own numbers through [`GlyphMetrics`].
//! All values are in gap units.

use crate::duration::BaseSymbol;
use crate::model::{BarlineStyle, Clef, ClefSign, KeySignature, TimeSignature};

pub trait GlyphMetrics {
    fn notehead_width(&self, base: BaseSymbol) -> f64;
    fn accidental_width(&self, alter: i8) -> f64;
    /// Extent above and below the accidental's reference point (the head centre).
    fn accidental_height(&self, alter: i8) -> (f64, f64);
    fn rest_width(&self, base: BaseSymbol) -> f64;
    fn flag_width(&self) -> f64;
    fn clef_width(&self, clef: &Clef) -> f64;
    /// Width of one key-signature accidental.
    fn key_accidental_width(&self, sharp: bool) -> f64;
    fn time_digit_width(&self) -> f64;
    fn barline_width(&self, style: BarlineStyle) -> f64;
    /// Width of a pair of repeat dots including their gap to the barline.
    fn repeat_width(&self) -> f64;

    fn key_signature_width(&self, key: &KeySignature) -> f64 {
        let count = key.fifths.unsigned_abs() as f64;
        count * self.key_accidental_width(key.fifths > 0)
    }

    fn time_signature_width(&self, time: &TimeSignature) -> f64 {
        let digits = time.beats.to_string().len().max(time.beat_type.to_string().len());
        digits as f64 * self.time_digit_width()
    }
}

/// Proportions of a conventional engraving font.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMetrics;

impl GlyphMetrics for DefaultMetrics {
    fn notehead_width(&self, base: BaseSymbol) -> f64 {
        match base {
            BaseSymbol::DoubleWhole => 2.0,
            BaseSymbol::Whole => 1.7,
            _ => 1.18,
        }
    }

    fn accidental_width(&self, alter: i8) -> f64 {
        match alter {
            2 => 1.0,
            1 => 1.0,
            -1 => 0.9,
            -2 => 1.6,
            _ => 0.7,
        }
    }

    fn accidental_height(&self, alter: i8) -> (f64, f64) {
        match alter {
            2 => (0.5, 0.5),
            -1 | -2 => (1.75, 0.5),
            _ => (1.4, 1.4),
        }
    }

    fn rest_width(&self, base: BaseSymbol) -> f64 {
        match base {
            BaseSymbol::DoubleWhole => 0.5,
            BaseSymbol::Whole | BaseSymbol::Half => 1.1,
            BaseSymbol::Quarter => 1.0,
            _ => 1.2,
        }
    }

    fn flag_width(&self) -> f64 {
        1.1
    }

    fn clef_width(&self, clef: &Clef) -> f64 {
        match clef.sign {
            ClefSign::G => 2.6,
            ClefSign::F => 2.7,
            ClefSign::C => 2.8,
            ClefSign::Percussion => 1.2,
        }
    }

    fn key_accidental_width(&self, sharp: bool) -> f64 {
        if sharp {
            1.0
        } else {
            0.8
        }
    }

    fn time_digit_width(&self) -> f64 {
        1.8
    }

    fn barline_width(&self, style: BarlineStyle) -> f64 {
        match style {
            BarlineStyle::Regular | BarlineStyle::Dashed => 0.16,
            BarlineStyle::Double => 0.8,
            BarlineStyle::Final | BarlineStyle::HeavyLight => 1.0,
        }
    }

    fn repeat_width(&self) -> f64 {
        0.9
    }
}
