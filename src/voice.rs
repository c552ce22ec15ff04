//! Flattening of a sequence tree into a linear, timed symbol stream.
//!
//! The engraver works on one voice at a time as a flat list: chords and
//! rests with their onset tick, beam start/end markers (from `Beamed`
//! nodes or per-event markers), tuplet brackets, grace chords and
//! directions. Ticks are relative to the start of the measure.

use crate::model::*;

#[derive(Debug, Clone, Copy)]
pub enum VoiceSymbol<'a> {
    Chord { event: &'a Event, tick: u64 },
    Rest { event: &'a Event, tick: u64 },
    /// A grace chord; `index` counts from the first grace before the onset
    Grace { event: &'a Event, tick: u64, slash: bool, index: usize, count: usize },
    BeamStart,
    BeamEnd,
    TupletStart { tuplet: &'a Tuplet, tick: u64 },
    TupletEnd { tick: u64 },
    Direction { direction: &'a Direction, tick: u64 },
}

impl<'a> VoiceSymbol<'a> {
    pub fn tick(&self) -> Option<u64> {
        match *self {
            VoiceSymbol::Chord { tick, .. }
            | VoiceSymbol::Rest { tick, .. }
            | VoiceSymbol::Grace { tick, .. }
            | VoiceSymbol::TupletStart { tick, .. }
            | VoiceSymbol::TupletEnd { tick }
            | VoiceSymbol::Direction { tick, .. } => Some(tick),
            VoiceSymbol::BeamStart | VoiceSymbol::BeamEnd => None,
        }
    }

    pub fn event(&self) -> Option<&'a Event> {
        match *self {
            VoiceSymbol::Chord { event, .. }
            | VoiceSymbol::Rest { event, .. }
            | VoiceSymbol::Grace { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// Flatten a sequence; returns the symbols and the tick where the voice ends.
pub fn flatten_sequence(seq: &Sequence) -> (Vec<VoiceSymbol<'_>>, u64) {
    let mut out = Vec::new();
    let end = flatten_items(&seq.items, 0, &mut out);
    (out, end)
}

fn flatten_items<'a>(items: &'a [SequenceItem], mut tick: u64, out: &mut Vec<VoiceSymbol<'a>>) -> u64 {
    for item in items {
        match item {
            SequenceItem::Event(event) => {
                if event.beam == Some(BeamMarker::Start) {
                    out.push(VoiceSymbol::BeamStart);
                }
                if event.is_rest() {
                    out.push(VoiceSymbol::Rest { event, tick });
                } else {
                    out.push(VoiceSymbol::Chord { event, tick });
                }
                if event.beam == Some(BeamMarker::End) {
                    out.push(VoiceSymbol::BeamEnd);
                }
                tick += event.duration.ticks();
            }
            SequenceItem::Grace(grace) => {
                let count = grace.events.len();
                for (index, event) in grace.events.iter().enumerate() {
                    out.push(VoiceSymbol::Grace { event, tick, slash: grace.slash, index, count });
                }
            }
            SequenceItem::Tuplet(tuplet) => {
                out.push(VoiceSymbol::TupletStart { tuplet, tick });
                tick = flatten_items(&tuplet.children, tick, out);
                out.push(VoiceSymbol::TupletEnd { tick });
            }
            SequenceItem::Beamed(beamed) => {
                out.push(VoiceSymbol::BeamStart);
                tick = flatten_items(&beamed.children, tick, out);
                out.push(VoiceSymbol::BeamEnd);
            }
            SequenceItem::Direction(direction) => out.push(VoiceSymbol::Direction { direction, tick }),
        }
    }
    tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_score_xml;
    use crate::resolve::resolve_score;

    #[test]
    fn flattens_with_onsets_and_markers() {
        let mut score = parse_score_xml(
            r#"<score><part id="P1"><measure><sequence>
                <direction kind="dynamic" text="p"/>
                <tuplet dur="/4"><beamed>
                  <event id="a" dur="/8"><head step="C" octave="5"/></event>
                  <event id="b" dur="/8"><head step="D" octave="5"/></event>
                  <event id="c" dur="/8"><head step="E" octave="5"/></event>
                </beamed></tuplet>
                <rest id="r" dur="/4" />
                <event id="d" dur="/8" beam="start"><head step="F" octave="5"/></event>
                <event id="e" dur="/8" beam="end"><head step="G" octave="5"/></event>
            </sequence></measure></part></score>"#,
        )
        .unwrap();
        resolve_score(&mut score).unwrap();
        let (symbols, end) = flatten_sequence(&score.parts[0].measures[0].sequences[0]);
        assert_eq!(end, 768 * 3);

        let kinds: Vec<String> = symbols
            .iter()
            .map(|s| match s {
                VoiceSymbol::Chord { event, tick } => format!("{}@{tick}", event.id),
                VoiceSymbol::Rest { event, tick } => format!("rest {}@{tick}", event.id),
                VoiceSymbol::BeamStart => "[".into(),
                VoiceSymbol::BeamEnd => "]".into(),
                VoiceSymbol::TupletStart { .. } => "(".into(),
                VoiceSymbol::TupletEnd { .. } => ")".into(),
                VoiceSymbol::Direction { .. } => "dir".into(),
                VoiceSymbol::Grace { .. } => "grace".into(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["dir", "(", "[", "a@0", "b@256", "c@512", "]", ")", "rest r@768", "[", "d@1536", "e@1920", "]"]
        );
    }
}
