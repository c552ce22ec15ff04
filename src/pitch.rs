//! Pitch → staff geometry.
//!
//! Vertical positions are measured in gap units from the top staffline,
//! growing downward: the top line is 0, the midline 2, the bottom line 4.
//! One diatonic step is half a gap.

use crate::model::{Clef, ClefSign, Pitch, StemDirection};

/// Staff offset of the middle line.
pub const MIDLINE: f64 = 2.0;
/// Staff offset of the bottom line.
pub const BOTTOM_LINE: f64 = 4.0;

/// The pitch that sits on the clef's reference line.
fn clef_reference(clef: &Clef) -> Pitch {
    let base = match clef.sign {
        ClefSign::G => Pitch::new('G', 4, 0),
        ClefSign::F => Pitch::new('F', 3, 0),
        ClefSign::C | ClefSign::Percussion => Pitch::new('C', 4, 0),
    };
    Pitch::new(base.letter, base.octave + clef.octave_change, 0)
}

/// Vertical offset of a pitch in gap units below the top staffline.
pub fn staff_offset(pitch: &Pitch, clef: &Clef) -> f64 {
    if clef.sign == ClefSign::Percussion {
        // Percussion staves place by step relative to the midline.
        return MIDLINE - f64::from(pitch.diatonic() - Pitch::new('B', 4, 0).diatonic()) * 0.5;
    }
    let reference_offset = f64::from(5 - clef.line);
    let steps = pitch.diatonic() - clef_reference(clef).diatonic();
    reference_offset - f64::from(steps) * 0.5
}

/// Staff position in half-gap steps (integer form of [`staff_offset`]).
pub fn staff_step(pitch: &Pitch, clef: &Clef) -> i32 {
    (staff_offset(pitch, clef) * 2.0).round() as i32
}

/// True when the step lies on a line rather than in a space.
pub fn step_on_line(step: i32) -> bool {
    step.rem_euclid(2) == 0
}

/// Offsets of the ledger lines needed for a head at `offset`.
pub fn ledger_lines(offset: f64) -> Vec<f64> {
    let mut lines = Vec::new();
    let mut y = -1.0;
    while y >= offset - 1e-9 {
        lines.push(y);
        y -= 1.0;
    }
    let mut y = BOTTOM_LINE + 1.0;
    while y <= offset + 1e-9 {
        lines.push(y);
        y += 1.0;
    }
    lines
}

/// Default stem direction for a set of head offsets: the head furthest
/// from the midline decides; equal excursions point the stem down.
pub fn default_stem_direction(offsets: &[f64]) -> StemDirection {
    let (above, below) = excursions(offsets);
    if below > above {
        StemDirection::Up
    } else {
        StemDirection::Down
    }
}

/// Largest distance above and below the midline, both non-negative.
pub fn excursions(offsets: &[f64]) -> (f64, f64) {
    offsets.iter().fold((0.0_f64, 0.0_f64), |(above, below), &o| {
        (above.max(MIDLINE - o), below.max(o - MIDLINE))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treble_clef_offsets() {
        let treble = Clef::TREBLE;
        assert_eq!(staff_offset(&Pitch::new('F', 5, 0), &treble), 0.0);
        assert_eq!(staff_offset(&Pitch::new('B', 4, 0), &treble), 2.0);
        assert_eq!(staff_offset(&Pitch::new('E', 4, 0), &treble), 4.0);
        assert_eq!(staff_offset(&Pitch::new('C', 4, 0), &treble), 5.0);
        // Alteration does not move the head.
        assert_eq!(staff_offset(&Pitch::new('C', 4, 1), &treble), 5.0);
    }

    #[test]
    fn bass_and_octave_clefs() {
        assert_eq!(staff_offset(&Pitch::new('D', 3, 0), &Clef::BASS), 2.0);
        assert_eq!(staff_offset(&Pitch::new('A', 3, 0), &Clef::BASS), 0.0);
        let tenor_g = Clef { octave_change: -1, ..Clef::TREBLE };
        assert_eq!(staff_offset(&Pitch::new('B', 3, 0), &tenor_g), 2.0);
        let alto = Clef { sign: ClefSign::C, line: 3, octave_change: 0 };
        assert_eq!(staff_offset(&Pitch::new('C', 4, 0), &alto), 2.0);
    }

    #[test]
    fn ledger_lines_above_and_below() {
        assert_eq!(ledger_lines(5.0), vec![5.0]);
        assert_eq!(ledger_lines(4.5), Vec::<f64>::new());
        assert_eq!(ledger_lines(-2.5), vec![-1.0, -2.0]);
        assert!(ledger_lines(2.0).is_empty());
    }

    #[test]
    fn default_direction_by_extreme_head() {
        assert_eq!(default_stem_direction(&[3.0]), StemDirection::Up);
        assert_eq!(default_stem_direction(&[1.0]), StemDirection::Down);
        assert_eq!(default_stem_direction(&[2.0]), StemDirection::Down);
        // Chord spanning both sides: the lower head is further out.
        assert_eq!(default_stem_direction(&[1.5, 4.0]), StemDirection::Up);
        assert_eq!(default_stem_direction(&[0.0, 4.0]), StemDirection::Down);
    }
}
