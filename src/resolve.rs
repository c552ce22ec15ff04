//! Structural validation and tick resolution for a loaded score.
//!
//! Resolution walks every sequence outer level first. A tuplet's outer
//! duration is resolved by its parent (plain basic ticks at sequence level,
//! a proportional share inside another tuplet) and that value becomes the
//! total divided among its own children. Beamed groupings are transparent
//! to the division; grace notes and directions take no time.

use std::collections::HashSet;

use log::debug;

use crate::duration::{basic_ticks, resolve_tuplet_ticks};
use crate::error::{EngraveError, Result};
use crate::model::*;

/// Validate the tree and assign resolved ticks to every duration.
pub fn resolve_score(score: &mut Score) -> Result<()> {
    validate_structure(score)?;

    for part in &mut score.parts {
        for measure in &mut part.measures {
            for seq in &mut measure.sequences {
                resolve_sequence_items(&mut seq.items)?;
            }
        }
    }
    debug!("resolved ticks for {} parts", score.parts.len());
    Ok(())
}

/// Check the required-children rules of the input tree.
pub fn validate_structure(score: &Score) -> Result<()> {
    if score.parts.is_empty() {
        return Err(EngraveError::structural("score has no parts"));
    }

    let measure_count = score.parts[0].measures.len();
    for part in &score.parts {
        if part.measures.is_empty() {
            return Err(EngraveError::structural(format!("part '{}' has no measures", part.id)));
        }
        if part.measures.len() != measure_count {
            return Err(EngraveError::structural(format!(
                "part '{}' has {} measures, expected {measure_count}",
                part.id,
                part.measures.len()
            )));
        }
        for measure in &part.measures {
            if measure.sequences.is_empty() {
                return Err(EngraveError::structural(format!(
                    "measure {} of part '{}' has no sequences",
                    measure.number, part.id
                )));
            }
            for seq in &measure.sequences {
                validate_items(&seq.items, &part.id, measure.number)?;
            }
        }
    }

    let mut seen = HashSet::new();
    let mut duplicate = None;
    score.for_each_event(|event| {
        if !seen.insert(event.id.as_str()) && duplicate.is_none() {
            duplicate = Some(event.id.clone());
        }
    });
    if let Some(id) = duplicate {
        return Err(EngraveError::structural(format!("duplicate event id '{id}'")));
    }

    Ok(())
}

fn validate_items(items: &[SequenceItem], part_id: &str, measure: u32) -> Result<()> {
    for item in items {
        match item {
            SequenceItem::Event(e) => validate_event(e, part_id, measure)?,
            SequenceItem::Grace(g) => {
                for e in &g.events {
                    validate_event(e, part_id, measure)?;
                }
            }
            SequenceItem::Tuplet(t) => {
                if !t.children.iter().any(bears_duration) {
                    return Err(EngraveError::structural(format!(
                        "empty tuplet {} in measure {measure} of part '{part_id}'",
                        t.outer
                    )));
                }
                validate_items(&t.children, part_id, measure)?;
            }
            SequenceItem::Beamed(b) => {
                if !b.children.iter().any(bears_duration) {
                    return Err(EngraveError::structural(format!(
                        "beam group with no chords in measure {measure} of part '{part_id}'"
                    )));
                }
                validate_items(&b.children, part_id, measure)?;
            }
            SequenceItem::Direction(_) => {}
        }
    }
    Ok(())
}

fn validate_event(event: &Event, part_id: &str, measure: u32) -> Result<()> {
    if event.id.is_empty() {
        return Err(EngraveError::structural(format!(
            "event without id in measure {measure} of part '{part_id}'"
        )));
    }
    for head in &event.heads {
        let p = head.pitch;
        if !('A'..='G').contains(&p.letter) || !(-2..=2).contains(&p.alter) {
            return Err(EngraveError::structural(format!(
                "event '{}' has invalid pitch {}{} alter {}",
                event.id, p.letter, p.octave, p.alter
            )));
        }
    }
    Ok(())
}

fn bears_duration(item: &SequenceItem) -> bool {
    match item {
        SequenceItem::Event(_) | SequenceItem::Tuplet(_) => true,
        SequenceItem::Beamed(b) => b.children.iter().any(bears_duration),
        SequenceItem::Grace(_) | SequenceItem::Direction(_) => false,
    }
}

/// Items at sequence level get their basic ticks; tuplets divide theirs.
fn resolve_sequence_items(items: &mut [SequenceItem]) -> Result<()> {
    for item in items {
        match item {
            SequenceItem::Event(e) => {
                let ticks = basic_ticks(&e.duration);
                e.duration.set_resolved(ticks)?;
                e.tuplet_level = 0;
            }
            SequenceItem::Grace(g) => resolve_grace(g)?,
            SequenceItem::Tuplet(t) => {
                let ticks = basic_ticks(&t.outer);
                t.outer.set_resolved(ticks)?;
                resolve_tuplet(t, 0)?;
            }
            SequenceItem::Beamed(b) => resolve_sequence_items(&mut b.children)?,
            SequenceItem::Direction(_) => {}
        }
    }
    Ok(())
}

fn resolve_grace(grace: &mut Grace) -> Result<()> {
    for e in &mut grace.events {
        e.duration.set_resolved(0)?;
    }
    Ok(())
}

/// A duration-bearing child of a tuplet, seen through any beam groupings.
enum Slot<'a> {
    Event(&'a mut Event),
    Tuplet(&'a mut Tuplet),
}

fn collect_slots<'a>(items: &'a mut [SequenceItem], level: u32, slots: &mut Vec<Slot<'a>>) -> Result<()> {
    for item in items {
        match item {
            SequenceItem::Event(e) => {
                e.tuplet_level = level;
                slots.push(Slot::Event(e));
            }
            SequenceItem::Tuplet(t) => slots.push(Slot::Tuplet(t)),
            SequenceItem::Beamed(b) => collect_slots(&mut b.children, level, slots)?,
            SequenceItem::Grace(g) => {
                for e in &mut g.events {
                    e.tuplet_level = level;
                }
                resolve_grace(g)?;
            }
            SequenceItem::Direction(_) => {}
        }
    }
    Ok(())
}

/// Divide the tuplet's already-resolved outer ticks among its children and
/// recurse into nested tuplets with their share as the new total.
fn resolve_tuplet(tuplet: &mut Tuplet, level: u32) -> Result<()> {
    tuplet.nesting_level = level;
    let outer = tuplet.outer.resolved_ticks().ok_or_else(|| {
        EngraveError::Resolution(format!("tuplet {} resolved before its outer duration", tuplet.outer))
    })?;

    let mut slots = Vec::new();
    collect_slots(&mut tuplet.children, level + 1, &mut slots)?;

    let sizes: Vec<u64> = slots
        .iter()
        .map(|slot| match slot {
            Slot::Event(e) => basic_ticks(&e.duration),
            Slot::Tuplet(t) => basic_ticks(&t.outer),
        })
        .collect();
    let spans = resolve_tuplet_ticks(outer, &sizes)?;

    for (slot, span) in slots.into_iter().zip(spans) {
        match slot {
            Slot::Event(e) => e.duration.set_resolved(span)?,
            Slot::Tuplet(t) => {
                t.outer.set_resolved(span)?;
                resolve_tuplet(t, level + 1)?;
            }
        }
    }
    Ok(())
}

/// Total resolved ticks of a run of sequence items.
pub fn items_ticks(items: &[SequenceItem]) -> u64 {
    items
        .iter()
        .map(|item| match item {
            SequenceItem::Event(e) => e.duration.ticks(),
            SequenceItem::Tuplet(t) => t.outer.ticks(),
            SequenceItem::Beamed(b) => items_ticks(&b.children),
            SequenceItem::Grace(_) | SequenceItem::Direction(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::parse_duration_token;

    fn note(id: &str, dur: &str) -> SequenceItem {
        SequenceItem::Event(Event {
            id: id.into(),
            duration: parse_duration_token(dur).unwrap(),
            tuplet_level: 0,
            heads: vec![Head { pitch: Pitch::new('C', 5, 0), id: None }],
            ties: vec![],
            slurs: vec![],
            stem: None,
            beam: None,
            articulations: vec![],
        })
    }

    fn tuplet(outer: &str, children: Vec<SequenceItem>) -> SequenceItem {
        SequenceItem::Tuplet(Tuplet {
            outer: parse_duration_token(outer).unwrap(),
            inner: None,
            nesting_level: 0,
            children,
        })
    }

    fn score_of(items: Vec<SequenceItem>) -> Score {
        Score {
            parts: vec![Part {
                id: "P1".into(),
                name: None,
                measures: vec![Measure {
                    number: 1,
                    clef: None,
                    sequences: vec![Sequence { voice: 1, stem: None, items }],
                }],
            }],
            ..Score::new()
        }
    }

    fn ticks_of(score: &Score) -> Vec<(String, u64, u32)> {
        let mut out = Vec::new();
        score.for_each_event(|e| out.push((e.id.clone(), e.duration.ticks(), e.tuplet_level)));
        out
    }

    #[test]
    fn triplet_inside_beam_grouping() {
        let mut score = score_of(vec![tuplet(
            "/4",
            vec![SequenceItem::Beamed(Beamed {
                children: vec![note("a", "/8"), note("b", "/8"), note("c", "/8")],
            })],
        )]);
        resolve_score(&mut score).unwrap();
        let ticks: Vec<u64> = ticks_of(&score).into_iter().map(|t| t.1).collect();
        assert_eq!(ticks, vec![256, 256, 256]);
    }

    #[test]
    fn three_level_nesting_uses_parent_share() {
        // A half-note triplet whose last third is a triplet holding a quintuplet.
        let innermost = tuplet(
            "/8",
            vec![note("q1", "/32"), note("q2", "/32"), note("q3", "/32"), note("q4", "/32"), note("q5", "/32")],
        );
        let middle = tuplet("/4", vec![note("m1", "/8"), note("m2", "/8"), innermost]);
        let mut score = score_of(vec![tuplet("/2", vec![note("o1", "/4"), note("o2", "/4"), middle])]);
        resolve_score(&mut score).unwrap();

        // Outer half = 1536, split [768,768,768] → 512 each.
        // Middle tuplet total 512 split over [384,384,384] → [170,171,171].
        // Innermost total 171 split over five equal parts.
        let got = ticks_of(&score);
        let lookup = |id: &str| got.iter().find(|t| t.0 == id).unwrap().clone();
        assert_eq!(lookup("o1").1, 512);
        assert_eq!(lookup("o1").2, 1);
        assert_eq!(lookup("m1").1, 170);
        assert_eq!(lookup("m2").1, 171);
        assert_eq!(lookup("m1").2, 2);
        let inner: Vec<u64> = ["q1", "q2", "q3", "q4", "q5"].iter().map(|id| lookup(id).1).collect();
        assert_eq!(inner, vec![34, 34, 34, 34, 35]);
        assert_eq!(inner.iter().sum::<u64>(), 171);
        assert_eq!(lookup("q1").2, 3);

        let seq = &score.parts[0].measures[0].sequences[0];
        assert_eq!(items_ticks(&seq.items), 1536);
    }

    #[test]
    fn rejects_score_without_parts() {
        let mut score = Score::new();
        assert!(matches!(resolve_score(&mut score), Err(EngraveError::Structural(_))));
    }

    #[test]
    fn rejects_empty_tuplet_and_beam() {
        let mut score = score_of(vec![tuplet("/4", vec![])]);
        assert!(matches!(resolve_score(&mut score), Err(EngraveError::Structural(_))));

        let mut score = score_of(vec![SequenceItem::Beamed(Beamed { children: vec![] })]);
        assert!(matches!(resolve_score(&mut score), Err(EngraveError::Structural(_))));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut score = score_of(vec![note("x", "/4"), note("x", "/4")]);
        assert!(matches!(resolve_score(&mut score), Err(EngraveError::Structural(_))));
    }

    #[test]
    fn resolving_twice_is_an_error() {
        let mut score = score_of(vec![note("a", "/4")]);
        resolve_score(&mut score).unwrap();
        assert!(matches!(resolve_score(&mut score), Err(EngraveError::Resolution(_))));
    }
}
