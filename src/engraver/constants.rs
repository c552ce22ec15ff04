//! Shared layout constants. Unless noted, values are in gap units (the
//! distance between two stafflines) and scale with the configured gap size.

// ── Staff ───────────────────────────────────────────────────────────
pub(super) const STAFF_LINES: usize = 5;
pub(super) const STAFF_HEIGHT: f64 = 4.0;
pub(super) const HEADER_HEIGHT: f64 = 7.0; // space for title + composer above the first system

// ── Noteheads, stems, dots ──────────────────────────────────────────
pub(super) const STEM_LENGTH: f64 = 3.5;
pub(super) const FLAG_STEM_EXTRA: f64 = 0.5; // per flag beyond the second
pub(super) const DOT_OFFSET: f64 = 0.5; // head right edge → first dot
pub(super) const DOT_SPACING: f64 = 0.5;
pub(super) const DOT_RADIUS: f64 = 0.2;
pub(super) const LEDGER_EXTEND: f64 = 0.4;
pub(super) const ACCIDENTAL_PAD: f64 = 0.2;
pub(super) const ACCIDENTAL_COLUMN_CLEARANCE: f64 = 1.5; // vertical room needed to share a column
pub(super) const ARTICULATION_OFFSET: f64 = 1.0; // beyond the stem tip or head
pub(super) const GRACE_SCALE: f64 = 0.66;

// ── Beams ───────────────────────────────────────────────────────────
pub(super) const BEAM_THICKNESS: f64 = 0.5;
pub(super) const BEAM_SPACING: f64 = 0.75; // outer edge to outer edge of adjacent levels
pub(super) const BEAM_HEAD_CLEARANCE: f64 = 2.5;
pub(super) const BEAM_ACCIDENTAL_STEP: f64 = 0.75;
pub(super) const BEAM_MAX_SLOPE: f64 = 0.10;
pub(super) const BEAM_SLOPE_DAMPING: f64 = 3.0;
pub(super) const BEAM_COLLISION_ITERATIONS: usize = 24;

/// Depth-indexed beam behaviour: how many spacings the level sits inside
/// the outer beam, and how long a hook at that depth is.
#[derive(Debug, Clone, Copy)]
pub(super) struct BeamLevelStyle {
    pub(super) offset_multiplier: f64,
    pub(super) hook_length: f64,
}

pub(super) const BEAM_LEVELS: [BeamLevelStyle; 8] = [
    BeamLevelStyle { offset_multiplier: 0.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 1.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 2.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 3.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 4.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 5.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 6.0, hook_length: 1.2 },
    BeamLevelStyle { offset_multiplier: 7.0, hook_length: 1.2 },
];

pub(super) fn beam_level(depth: u8) -> BeamLevelStyle {
    let idx = usize::from(depth.max(1) - 1).min(BEAM_LEVELS.len() - 1);
    BEAM_LEVELS[idx]
}

// ── Ties and slurs ──────────────────────────────────────────────────
pub(super) const SLUR_END_ANGLE_DEG: f64 = 60.0;
pub(super) const SLUR_END_RADIUS: f64 = 1.0;
pub(super) const TIE_END_ANGLE_DEG: f64 = 45.0;
pub(super) const TIE_END_RADIUS: f64 = 0.75;
pub(super) const CURVE_HEIGHT_FACTOR: f64 = 0.15;
pub(super) const SLUR_MIN_HEIGHT: f64 = 0.5;
pub(super) const SLUR_MAX_HEIGHT: f64 = 2.5;
pub(super) const TIE_MIN_HEIGHT: f64 = 0.3;
pub(super) const TIE_MAX_HEIGHT: f64 = 1.0;
pub(super) const CURVE_ENDPOINT_THICKNESS: f64 = 0.05;
pub(super) const CURVE_MID_THICKNESS: f64 = 0.15;

// ── Horizontal spacing ──────────────────────────────────────────────
pub(super) const MIN_MOMENT_PADDING: f64 = 0.5;
pub(super) const QUARTER_SPACING: f64 = 3.5; // ideal distance after a quarter; sqrt-scaled for others
pub(super) const COLUMN_PADDING: f64 = 0.2; // between columns of one moment block

// ── Text ────────────────────────────────────────────────────────────
pub(super) const DIRECTION_DISTANCE: f64 = 2.5; // from the staff edge
pub(super) const DYNAMIC_CHAR_WIDTH: f64 = 0.9;
pub(super) const WORDS_CHAR_WIDTH: f64 = 0.6;
pub(super) const TEXT_HEIGHT: f64 = 1.5;
pub(super) const TUPLET_NUMBER_DISTANCE: f64 = 1.2;
