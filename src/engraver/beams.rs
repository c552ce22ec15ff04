//! Beam groups: finding them in a voice, choosing their stem direction,
//! splitting them into levels and hooks, and placing the beam stack.
//!
//! Geometry follows one record per group, parametrized by the depth table
//! in `constants`. `L(x)` below is the outer edge of the depth-1 beam
//! (the edge the stems end on); deeper levels sit inside it, toward the
//! noteheads.

use log::debug;

use crate::error::{EngraveError, Result};
use crate::model::StemDirection;
use crate::pitch::{default_stem_direction, excursions};

use super::chords::ChordLayout;
use super::constants::*;
use super::geometry::{Glyph, GlyphClass, PathSegment, Point};

/// What the scanner sees of a voice: chords by their index in the
/// system's chord table, rests, and the beam markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BeamToken {
    Chord(usize),
    Rest,
    Start,
    End,
}

enum ScanState {
    Scanning,
    InGroup(Vec<usize>),
}

/// Collect the beam groups of one voice stream. Groups of a single chord
/// are dropped (the chord keeps its flags).
pub(super) fn scan_groups(tokens: &[BeamToken], voice: &str) -> Result<Vec<Vec<usize>>> {
    let mut groups = Vec::new();
    let mut state = ScanState::Scanning;
    for token in tokens {
        state = match (state, *token) {
            (ScanState::Scanning, BeamToken::Start) => ScanState::InGroup(Vec::new()),
            (ScanState::Scanning, BeamToken::End) => {
                return Err(EngraveError::structural(format!("{voice}: beam end without a beam start")));
            }
            (ScanState::Scanning, _) => ScanState::Scanning,
            (ScanState::InGroup(_), BeamToken::Start) => {
                return Err(EngraveError::structural(format!("{voice}: beam start inside an open beam")));
            }
            (ScanState::InGroup(members), BeamToken::End) => {
                match members.len() {
                    0 => return Err(EngraveError::structural(format!("{voice}: beam group without chords"))),
                    1 => debug!("{voice}: single-chord beam group left unbeamed"),
                    _ => groups.push(members),
                }
                ScanState::Scanning
            }
            (ScanState::InGroup(mut members), BeamToken::Chord(idx)) => {
                members.push(idx);
                ScanState::InGroup(members)
            }
            (in_group @ ScanState::InGroup(_), BeamToken::Rest) => in_group,
        };
    }
    if let ScanState::InGroup(_) = state {
        return Err(EngraveError::structural(format!("{voice}: beam is never closed")));
    }
    Ok(groups)
}

/// Stem direction for a whole group, from each chord's head offsets.
pub(super) fn decide_stem_direction(chords: &[Vec<f64>], forced: Option<StemDirection>) -> StemDirection {
    if let Some(direction) = forced {
        return direction;
    }
    let ups = chords
        .iter()
        .filter(|offsets| default_stem_direction(offsets) == StemDirection::Up)
        .count();
    let downs = chords.len() - ups;
    if ups != downs {
        return if ups > downs { StemDirection::Up } else { StemDirection::Down };
    }
    let all: Vec<f64> = chords.iter().flatten().copied().collect();
    let (above, below) = excursions(&all);
    let direction = if below > above { StemDirection::Up } else { StemDirection::Down };
    debug!("beam direction tie broken by extremes (above {above}, below {below}): {direction:?}");
    direction
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HookDirection {
    Left,
    Right,
    None,
}

/// One beam segment or hook at one depth.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct BeamComponent {
    pub(super) depth: u8,
    /// Positions within the group
    pub(super) members: Vec<usize>,
    pub(super) hook: HookDirection,
}

impl BeamComponent {
    pub(super) fn is_hook(&self) -> bool {
        self.hook != HookDirection::None
    }
}

/// Split a group into levels given each member's beam depth (flag count,
/// at least 1).
pub(super) fn build_levels(depths: &[u8]) -> Vec<BeamComponent> {
    let depths: Vec<u8> = depths.iter().map(|&d| d.max(1)).collect();
    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let last = depths.len().saturating_sub(1);
    let mut components = Vec::new();
    for depth in 1..=max_depth {
        let mut run: Vec<usize> = Vec::new();
        for i in 0..=depths.len() {
            if i < depths.len() && depths[i] >= depth {
                run.push(i);
                continue;
            }
            match run.len() {
                0 => {}
                1 => {
                    let m = run[0];
                    let hook = if m == 0 {
                        HookDirection::Right
                    } else if m == last {
                        HookDirection::Left
                    } else if depths[m + 1] > depths[m - 1] {
                        HookDirection::Right
                    } else {
                        HookDirection::Left
                    };
                    components.push(BeamComponent { depth, members: vec![m], hook });
                }
                _ => components.push(BeamComponent { depth, members: run.clone(), hook: HookDirection::None }),
            }
            run.clear();
        }
    }
    components
}

/// A beam group of one voice.
#[derive(Debug, Clone)]
pub(super) struct BeamGroup {
    /// Indices into the system's chord table, in time order
    pub(super) members: Vec<usize>,
    pub(super) direction: StemDirection,
    pub(super) components: Vec<BeamComponent>,
}

impl BeamGroup {
    pub(super) fn new(members: Vec<usize>, direction: StemDirection, depths: &[u8]) -> Self {
        Self { members, direction, components: build_levels(depths) }
    }

    fn max_depth(&self) -> u8 {
        self.components.iter().map(|c| c.depth).max().unwrap_or(1)
    }
}

/// The placed outer beam line.
#[derive(Debug, Clone, Copy)]
pub(super) struct BeamLine {
    pub(super) tan: f64,
    pub(super) axis_x: f64,
    pub(super) axis_y: f64,
}

impl BeamLine {
    pub(super) fn outer_at(&self, x: f64) -> f64 {
        self.axis_y + self.tan * (x - self.axis_x)
    }
}

/// Beam stack metrics in page units.
struct Stack {
    /// +1 when the noteheads are below the beam (stems up), -1 otherwise
    toward_heads: f64,
    /// Outer edge of the outer beam to inner edge of the innermost
    depth: f64,
    gap: f64,
}

impl Stack {
    fn new(group: &BeamGroup, gap: f64) -> Self {
        let levels = beam_level(group.max_depth()).offset_multiplier;
        Self {
            toward_heads: -group.direction.sign(),
            depth: (levels * BEAM_SPACING + BEAM_THICKNESS) * gap,
            gap,
        }
    }

    fn inner_at(&self, line: &BeamLine, x: f64) -> f64 {
        line.outer_at(x) + self.toward_heads * self.depth
    }
}

pub(super) struct BeamLayout {
    pub(super) line: BeamLine,
    pub(super) glyphs: Vec<Glyph>,
}

/// Place one group: vertical position, shear, collisions, stem tips, and
/// the beam outlines. `chords` is the system's chord table.
pub(super) fn layout_beam(
    group: &BeamGroup,
    chords: &mut [ChordLayout],
    staff_y: f64,
    gap: f64,
    stem_width: f64,
) -> Result<BeamLayout> {
    let members: Vec<&ChordLayout> = group.members.iter().map(|&i| &chords[i]).collect();
    if members.len() < 2 || members.iter().any(|c| c.stem.is_none()) {
        return Err(EngraveError::Resolution(format!(
            "beam group starting at '{}' has stemless members",
            members.first().map_or("?", |c| c.event_id.as_str())
        )));
    }
    let stack = Stack::new(group, gap);
    let stem_xs: Vec<f64> = members.iter().filter_map(|c| c.stem.map(|s| s.x)).collect();

    let flat = place_vertically(&members, &stack, staff_y);
    let mut line = shear(&members, &stem_xs, flat, group.direction);
    resolve_collisions(&members, &stem_xs, &stack, &mut line);

    for &idx in &group.members {
        if let Some(x) = chords[idx].stem.map(|s| s.x) {
            chords[idx].set_stem_tip(line.outer_at(x));
        }
    }

    let thickness = BEAM_THICKNESS * gap * stack.toward_heads;
    let mut glyphs = Vec::new();
    for component in &group.components {
        let inset = stack.toward_heads * beam_level(component.depth).offset_multiplier * BEAM_SPACING * gap;
        let first = component.members[0];
        let last = component.members[component.members.len() - 1];
        let class = if component.is_hook() { GlyphClass::BeamHook } else { GlyphClass::Beam };
        let hook_length = beam_level(component.depth).hook_length * gap;
        let (x0, x1) = match component.hook {
            HookDirection::None => (stem_xs[first] - stem_width / 2.0, stem_xs[last] + stem_width / 2.0),
            HookDirection::Right => {
                let x = stem_xs[first] - stem_width / 2.0;
                (x, x + hook_length)
            }
            HookDirection::Left => {
                let x = stem_xs[first] + stem_width / 2.0;
                (x - hook_length, x)
            }
        };
        let y0 = line.outer_at(x0) + inset;
        let y1 = line.outer_at(x1) + inset;
        glyphs.push(
            Glyph::from_path(
                class,
                vec![
                    PathSegment::Move { to: Point::new(x0, y0) },
                    PathSegment::Line { to: Point::new(x1, y1) },
                    PathSegment::Line { to: Point::new(x1, y1 + thickness) },
                    PathSegment::Line { to: Point::new(x0, y0 + thickness) },
                    PathSegment::Close,
                ],
            )
            .with_event(chords[group.members[first]].event_id.clone()),
        );
    }
    Ok(BeamLayout { line, glyphs })
}

/// Start with the outer beam's head-side edge on the near staffline, then
/// slide the stack so the closest head is exactly the clearance away from the
/// innermost edge. Returns the flat outer-edge y.
fn place_vertically(members: &[&ChordLayout], stack: &Stack, staff_y: f64) -> f64 {
    let s = stack.toward_heads;
    let thickness = BEAM_THICKNESS * stack.gap;
    let near_line = if s > 0.0 { staff_y } else { staff_y + STAFF_HEIGHT * stack.gap };
    let outer = near_line - s * thickness;
    let inner = outer + s * stack.depth;

    // Positive shift moves the stack toward the heads.
    let shift = (closest_head(members, s) - inner) * s - BEAM_HEAD_CLEARANCE * stack.gap;
    debug!("beam slides {:.2} from the staffline start", shift);
    outer + s * shift
}

/// The head nearest the beam among the group: highest for stems up.
fn closest_head(members: &[&ChordLayout], toward_heads: f64) -> f64 {
    let ys = members.iter().map(|c| c.beam_side_head_y());
    if toward_heads > 0.0 {
        ys.fold(f64::INFINITY, f64::min)
    } else {
        ys.fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Damped and clamped slope; the line passes through the flat height at
/// the axis chord.
fn shear(members: &[&ChordLayout], stem_xs: &[f64], flat: f64, direction: StemDirection) -> BeamLine {
    let width = stem_xs[stem_xs.len() - 1] - stem_xs[0];
    let tan = if width > f64::EPSILON {
        let left = members[0].average_head_y();
        let right = members[members.len() - 1].average_head_y();
        (((right - left) / width) / BEAM_SLOPE_DAMPING).clamp(-BEAM_MAX_SLOPE, BEAM_MAX_SLOPE)
    } else {
        0.0
    };

    let up = direction == StemDirection::Up;
    let closest = closest_head(members, if up { 1.0 } else { -1.0 });
    let candidates: Vec<usize> = (0..members.len())
        .filter(|&i| (members[i].beam_side_head_y() - closest).abs() < 1e-6)
        .collect();
    let leftmost = (up && tan < 0.0) || (!up && tan > 0.0) || tan == 0.0;
    let axis = if leftmost { candidates[0] } else { candidates[candidates.len() - 1] };
    BeamLine { tan, axis_x: stem_xs[axis], axis_y: flat }
}

fn resolve_collisions(members: &[&ChordLayout], stem_xs: &[f64], stack: &Stack, line: &mut BeamLine) {
    let s = stack.toward_heads;
    let clearance = BEAM_HEAD_CLEARANCE * stack.gap;
    let deficit = members
        .iter()
        .zip(stem_xs)
        .map(|(c, &x)| clearance - s * (c.beam_side_head_y() - stack.inner_at(line, x)))
        .fold(0.0_f64, f64::max);
    if deficit > 1e-9 {
        line.axis_y -= s * deficit;
    }

    let (left_x, right_x) = (stem_xs[0], stem_xs[stem_xs.len() - 1]);
    for _ in 0..BEAM_COLLISION_ITERATIONS {
        let hit = members.iter().flat_map(|c| c.accidental_boxes.iter()).any(|b| {
            let x0 = b.x.max(left_x);
            let x1 = b.right().min(right_x);
            if x0 > x1 {
                return false;
            }
            let ys = [
                line.outer_at(x0),
                line.outer_at(x1),
                stack.inner_at(line, x0),
                stack.inner_at(line, x1),
            ];
            let top = ys.iter().copied().fold(f64::INFINITY, f64::min);
            let bottom = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            top < b.bottom() && b.y < bottom
        });
        if !hit {
            break;
        }
        line.axis_y -= s * BEAM_ACCIDENTAL_STEP * stack.gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::{basic_ticks, parse_duration_token};
    use crate::engraver::chords::{ChordBuilder, ChordOptions};
    use crate::engraver::geometry::BoundingBox;
    use crate::engraver::metrics::DefaultMetrics;
    use crate::model::{Clef, Event, Head, Pitch};
    use pretty_assertions::assert_eq;
    use BeamToken::*;

    const GAP: f64 = 10.0;

    fn event(id: &str, dur: &str, pitches: &[(char, i32, i8)]) -> Event {
        let mut duration = parse_duration_token(dur).unwrap();
        let ticks = basic_ticks(&duration);
        duration.set_resolved(ticks).unwrap();
        Event {
            id: id.into(),
            duration,
            tuplet_level: 0,
            heads: pitches.iter().map(|&(l, o, a)| Head { pitch: Pitch::new(l, o, a), id: None }).collect(),
            ties: Vec::new(),
            slurs: Vec::new(),
            stem: None,
            beam: None,
            articulations: Vec::new(),
        }
    }

    /// Chords spaced 40 units apart with the given stem direction.
    fn chords(notes: &[(&str, &[(char, i32, i8)])], direction: StemDirection) -> Vec<ChordLayout> {
        let metrics = DefaultMetrics;
        let builder = ChordBuilder { gap: GAP, stem_width: 1.2, line_width: 0.8, metrics: &metrics };
        notes
            .iter()
            .enumerate()
            .map(|(i, (dur, pitches))| {
                let mut c = builder.build_chord(
                    &event(&format!("c{i}"), dur, pitches),
                    &Clef::TREBLE,
                    ChordOptions { direction, beamed: true, grace: None },
                );
                c.translate(100.0 + 40.0 * i as f64, 0.0);
                c
            })
            .collect()
    }

    #[test]
    fn scanner_collects_groups() {
        let tokens = [Start, Chord(0), Rest, Chord(1), End, Chord(2), Start, Chord(3), End];
        assert_eq!(scan_groups(&tokens, "v1").unwrap(), vec![vec![0, 1]]);
    }

    #[test]
    fn scanner_structural_errors() {
        for tokens in [
            vec![Start, Chord(0), Start, Chord(1), End],
            vec![Chord(0), End],
            vec![Start, Rest, End],
            vec![Start, Chord(0), Chord(1)],
        ] {
            assert!(matches!(scan_groups(&tokens, "v1"), Err(EngraveError::Structural(_))), "{tokens:?}");
        }
    }

    #[test]
    fn stem_direction_majority_and_forced() {
        let group = vec![vec![4.0], vec![3.5], vec![0.5]];
        assert_eq!(decide_stem_direction(&group, None), StemDirection::Up);
        assert_eq!(decide_stem_direction(&group, Some(StemDirection::Down)), StemDirection::Down);
    }

    #[test]
    fn alternating_group_resolves_by_extremes() {
        // up, down, up, down; the lowest head is further from the midline
        let group = vec![vec![5.0], vec![0.0], vec![3.0], vec![1.0]];
        assert_eq!(decide_stem_direction(&group, None), StemDirection::Up);
        // and the other way round
        let group = vec![vec![4.0], vec![-1.0], vec![3.0], vec![1.0]];
        assert_eq!(decide_stem_direction(&group, None), StemDirection::Down);
    }

    #[test]
    fn mirrored_extremes_point_down() {
        let group = vec![vec![4.0], vec![0.0]];
        assert_eq!(decide_stem_direction(&group, None), StemDirection::Down);
    }

    #[test]
    fn levels_and_hooks() {
        let levels = build_levels(&[1, 2, 2, 1]);
        assert_eq!(
            levels,
            vec![
                BeamComponent { depth: 1, members: vec![0, 1, 2, 3], hook: HookDirection::None },
                BeamComponent { depth: 2, members: vec![1, 2], hook: HookDirection::None },
            ]
        );

        let hooks = |depths: &[u8]| -> Vec<(usize, HookDirection)> {
            build_levels(depths)
                .into_iter()
                .filter(|c| c.is_hook())
                .map(|c| (c.members[0], c.hook))
                .collect()
        };
        assert_eq!(hooks(&[2, 1, 1]), vec![(0, HookDirection::Right)]);
        assert_eq!(hooks(&[1, 1, 2]), vec![(2, HookDirection::Left)]);
        assert_eq!(hooks(&[1, 2, 1]), vec![(1, HookDirection::Left)]);
        assert_eq!(hooks(&[1, 3, 2, 2]), vec![(1, HookDirection::Right)]);
        // quarters inside a beam still get the primary beam
        assert_eq!(build_levels(&[0, 1]).len(), 1);
    }

    #[test]
    fn shear_is_clamped_and_stems_meet_the_beam() {
        let mut table = chords(&[("/8", &[('E', 4, 0)]), ("/8", &[('F', 5, 0)])], StemDirection::Up);
        let group = BeamGroup::new(vec![0, 1], StemDirection::Up, &[1, 1]);
        let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();
        assert!(layout.line.tan.abs() <= BEAM_MAX_SLOPE + 1e-12);
        assert_eq!(layout.line.tan, -BEAM_MAX_SLOPE);
        for chord in &table {
            let stem = chord.stem.unwrap();
            assert!((stem.tip_y - layout.line.outer_at(stem.x)).abs() < 1e-9);
        }
        assert_eq!(layout.glyphs.len(), 1);
    }

    #[test]
    fn closest_head_is_exactly_clear_of_the_stack() {
        let mut table = chords(&[("/16", &[('G', 4, 0)]), ("/16", &[('G', 4, 0)])], StemDirection::Up);
        let group = BeamGroup::new(vec![0, 1], StemDirection::Up, &[2, 2]);
        let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();
        assert_eq!(layout.line.tan, 0.0);
        let head_y = table[0].heads[0].center.y;
        let inner = layout.line.outer_at(0.0) + (BEAM_SPACING + BEAM_THICKNESS) * GAP;
        assert!((head_y - inner - BEAM_HEAD_CLEARANCE * GAP).abs() < 1e-9);
        assert_eq!(layout.glyphs.iter().filter(|g| g.class == GlyphClass::Beam).count(), 2);
    }

    #[test]
    fn heads_inside_the_group_push_the_beam_away() {
        // Middle chord is higher than both ends: it must stay 2.5 gaps clear.
        let mut table = chords(
            &[("/8", &[('E', 4, 0)]), ("/8", &[('E', 5, 0)]), ("/8", &[('G', 4, 0)])],
            StemDirection::Up,
        );
        let group = BeamGroup::new(vec![0, 1, 2], StemDirection::Up, &[1, 1, 1]);
        let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();
        for chord in &table {
            let stem = chord.stem.unwrap();
            let inner = layout.line.outer_at(stem.x) + BEAM_THICKNESS * GAP;
            assert!(chord.beam_side_head_y() - inner >= BEAM_HEAD_CLEARANCE * GAP - 1e-9);
        }
    }

    #[test]
    fn hook_glyph_points_toward_its_neighbour() {
        let mut table = chords(&[("/16", &[('A', 4, 0)]), ("/8", &[('A', 4, 0)])], StemDirection::Down);
        let group = BeamGroup::new(vec![0, 1], StemDirection::Down, &[2, 1]);
        let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();
        let hook = layout.glyphs.iter().find(|g| g.class == GlyphClass::BeamHook).unwrap();
        let stem_x = table[0].stem.unwrap().x;
        assert!(hook.bbox.x >= stem_x - 1.0);
        assert!((hook.bbox.width - 1.2 * GAP).abs() < 1e-9);
    }

    #[test]
    fn shear_stays_within_the_maximum_for_any_pair() {
        let pitches: Vec<(char, i32, i8)> =
            (3..=6).flat_map(|o| "CDEFGAB".chars().map(move |l| (l, o, 0))).collect();
        for direction in [StemDirection::Up, StemDirection::Down] {
            for &a in &pitches {
                for &b in &pitches {
                    let mut table = chords(&[("/8", &[a]), ("/8", &[b])], direction);
                    let group = BeamGroup::new(vec![0, 1], direction, &[1, 1]);
                    let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();
                    assert!(layout.line.tan.abs() <= BEAM_MAX_SLOPE + 1e-12, "{a:?} {b:?} {direction:?}");
                    for chord in &table {
                        let stem = chord.stem.unwrap();
                        assert!((stem.tip_y - layout.line.outer_at(stem.x)).abs() < 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn accidental_inside_the_stack_lifts_the_beam_by_whole_steps() {
        let notes: &[(&str, &[(char, i32, i8)])] =
            &[("/8", &[('G', 4, 0)]), ("/8", &[('G', 4, 0)]), ("/8", &[('G', 4, 0)])];
        let group = BeamGroup::new(vec![0, 1, 2], StemDirection::Up, &[1, 1, 1]);
        let baseline = layout_beam(&group, &mut chords(notes, StemDirection::Up), 0.0, GAP, 1.2).unwrap().line;

        let mut table = chords(notes, StemDirection::Up);
        let stem_x = table[1].stem.unwrap().x;
        let accidental = BoundingBox::new(stem_x - 2.5, baseline.axis_y + 1.0, 5.0, 2.0);
        table[1].accidental_boxes.push(accidental);
        let layout = layout_beam(&group, &mut table, 0.0, GAP, 1.2).unwrap();

        let step = BEAM_ACCIDENTAL_STEP * GAP;
        assert!((baseline.axis_y - layout.line.axis_y - step).abs() < 1e-9);
        let inner = layout.line.outer_at(stem_x) + BEAM_THICKNESS * GAP;
        assert!(inner <= accidental.y);
        let stem = table[1].stem.unwrap();
        assert!((stem.tip_y - layout.line.outer_at(stem.x)).abs() < 1e-9);
    }
}
