//! Score XML loader. Converts the interchange XML into the Score model.
//!
//! The dialect mirrors the model one element per node:
//!
//! ```xml
//! <score title="Etude">
//!   <global>
//!     <measure number="1"><time beats="3" beat-type="4"/><key fifths="-1"/></measure>
//!   </global>
//!   <part id="P1">
//!     <measure>
//!       <clef sign="G" line="2"/>
//!       <sequence voice="1">
//!         <beamed>
//!           <event id="e1" dur="/8"><head step="A" octave="4"/></event>
//!           <event id="e2" dur="/8"><head step="B" octave="4" alter="-1"/></event>
//!         </beamed>
//!         <rest id="r1" dur="/4"/>
//!       </sequence>
//!     </measure>
//!   </part>
//! </score>
//! ```
//!
//! Only shallow attribute reading happens here; durations are parsed into
//! tokens but ticks are resolved later.

use log::warn;
use roxmltree::{Document, Node};

use crate::config::parse_measure_number;
use crate::duration::{parse_duration_token, Duration};
use crate::error::{EngraveError, Result, SourceLocation};
use crate::model::*;

/// Parse a score XML string into a Score.
pub fn parse_score_xml(xml: &str) -> Result<Score> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)?;
    let root = doc.root_element();

    if root.tag_name().name() != "score" {
        return Err(EngraveError::structural(format!(
            "unsupported root element '{}', expected 'score'",
            root.tag_name().name()
        )));
    }

    let mut score = Score::new();
    score.title = root.attribute("title").map(String::from);
    score.composer = root.attribute("composer").map(String::from);

    for child in elements(root) {
        match child.tag_name().name() {
            "global" => score.global = Some(parse_global(child)?),
            "part" => {
                let index = score.parts.len();
                score.parts.push(parse_part(child, index)?);
            }
            other => warn!("ignoring <{other}> in <score>"),
        }
    }

    if score.parts.is_empty() {
        return Err(EngraveError::structural("score has no parts"));
    }
    Ok(score)
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn location(node: Node) -> SourceLocation {
    let pos = node.document().text_pos_at(node.range().start);
    SourceLocation { file: None, line: pos.row, column: pos.col }
}

fn syntax_at(node: Node, message: impl Into<String>) -> EngraveError {
    EngraveError::Syntax { location: location(node), message: message.into() }
}

fn required<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        syntax_at(node, format!("<{}> is missing attribute '{name}'", node.tag_name().name()))
    })
}

fn parse_attr<T: std::str::FromStr>(node: Node, name: &str) -> Result<Option<T>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            syntax_at(node, format!("attribute '{name}' has invalid value '{raw}'"))
        }),
    }
}

fn parse_duration_attr(node: Node, name: &str) -> Result<Duration> {
    let token = required(node, name)?;
    parse_duration_token(token).map_err(|e| syntax_at(node, e.to_string()))
}

fn parse_bool(node: Node, name: &str) -> bool {
    matches!(node.attribute(name), Some("true") | Some("yes") | Some("1"))
}

// ─── Global ──────────────────────────────────────────────────────────

fn parse_global(node: Node) -> Result<GlobalSequence> {
    let mut global = GlobalSequence::default();
    for m in elements(node) {
        if m.tag_name().name() != "measure" {
            warn!("ignoring <{}> in <global>", m.tag_name().name());
            continue;
        }
        let number_token = required(m, "number")?;
        let number = parse_measure_number(number_token).map_err(|_| {
            syntax_at(m, format!("invalid measure location '{number_token}'"))
        })?;
        let mut gm = GlobalMeasure { number, ..GlobalMeasure::default() };

        for child in elements(m) {
            match child.tag_name().name() {
                "time" => {
                    let beats = parse_attr::<u32>(child, "beats")?.unwrap_or(4);
                    let beat_type = parse_attr::<u32>(child, "beat-type")?.unwrap_or(4);
                    if beats == 0 || !beat_type.is_power_of_two() {
                        return Err(syntax_at(child, format!("invalid time signature {beats}/{beat_type}")));
                    }
                    gm.time = Some(TimeSignature { beats, beat_type });
                }
                "key" => {
                    let fifths = parse_attr::<i32>(child, "fifths")?.unwrap_or(0);
                    if !(-7..=7).contains(&fifths) {
                        return Err(syntax_at(child, format!("key fifths {fifths} out of range")));
                    }
                    gm.key = Some(KeySignature { fifths });
                }
                "barline" => {
                    let style = parse_barline_style(child)?;
                    match child.attribute("location").unwrap_or("end") {
                        "start" => gm.start_barline = Some(style),
                        _ => gm.end_barline = Some(style),
                    }
                }
                "repeat" => match child.attribute("direction").unwrap_or("backward") {
                    "forward" => gm.repeat_start = true,
                    _ => gm.repeat_end = true,
                },
                other => warn!("ignoring <{other}> in global measure {number}"),
            }
        }
        global.measures.push(gm);
    }
    Ok(global)
}

fn parse_barline_style(node: Node) -> Result<BarlineStyle> {
    Ok(match node.attribute("style").unwrap_or("regular") {
        "regular" => BarlineStyle::Regular,
        "double" | "light-light" => BarlineStyle::Double,
        "final" | "light-heavy" => BarlineStyle::Final,
        "heavy-light" => BarlineStyle::HeavyLight,
        "dashed" => BarlineStyle::Dashed,
        other => return Err(syntax_at(node, format!("unknown barline style '{other}'"))),
    })
}

// ─── Parts ───────────────────────────────────────────────────────────

fn parse_part(node: Node, index: usize) -> Result<Part> {
    let id = node
        .attribute("id")
        .map(String::from)
        .unwrap_or_else(|| format!("P{}", index + 1));
    let mut part = Part {
        id,
        name: node.attribute("name").map(String::from),
        measures: Vec::new(),
    };

    for m in elements(node) {
        if m.tag_name().name() != "measure" {
            warn!("ignoring <{}> in part '{}'", m.tag_name().name(), part.id);
            continue;
        }
        let number = match m.attribute("number") {
            Some(token) => parse_measure_number(token)
                .map_err(|_| syntax_at(m, format!("invalid measure location '{token}'")))?,
            None => part.measures.len() as u32 + 1,
        };
        part.measures.push(parse_measure(m, number)?);
    }
    Ok(part)
}

fn parse_measure(node: Node, number: u32) -> Result<Measure> {
    let mut measure = Measure { number, clef: None, sequences: Vec::new() };
    for child in elements(node) {
        match child.tag_name().name() {
            "clef" => measure.clef = Some(parse_clef(child)?),
            "sequence" => {
                let voice = parse_attr::<u32>(child, "voice")?
                    .unwrap_or(measure.sequences.len() as u32 + 1);
                let stem = parse_stem(child)?;
                let items = parse_items(child)?;
                measure.sequences.push(Sequence { voice, stem, items });
            }
            other => warn!("ignoring <{other}> in measure {number}"),
        }
    }
    Ok(measure)
}

fn parse_clef(node: Node) -> Result<Clef> {
    let sign = match node.attribute("sign").unwrap_or("G") {
        "G" => ClefSign::G,
        "F" => ClefSign::F,
        "C" => ClefSign::C,
        "percussion" => ClefSign::Percussion,
        other => return Err(syntax_at(node, format!("unknown clef sign '{other}'"))),
    };
    let default_line = match sign {
        ClefSign::G => 2,
        ClefSign::F => 4,
        ClefSign::C | ClefSign::Percussion => 3,
    };
    let line = parse_attr::<i32>(node, "line")?.unwrap_or(default_line);
    if !(1..=5).contains(&line) {
        return Err(syntax_at(node, format!("clef line {line} out of range")));
    }
    Ok(Clef {
        sign,
        line,
        octave_change: parse_attr::<i32>(node, "octave-change")?.unwrap_or(0),
    })
}

fn parse_stem(node: Node) -> Result<Option<StemDirection>> {
    match node.attribute("stem") {
        None | Some("auto") => Ok(None),
        Some("up") => Ok(Some(StemDirection::Up)),
        Some("down") => Ok(Some(StemDirection::Down)),
        Some(other) => Err(syntax_at(node, format!("invalid stem direction '{other}'"))),
    }
}

fn parse_side(node: Node) -> Result<CurveSide> {
    match node.attribute("side") {
        None => Ok(CurveSide::Unspecified),
        Some("up") | Some("over") | Some("above") => Ok(CurveSide::Up),
        Some("down") | Some("under") | Some("below") => Ok(CurveSide::Down),
        Some(other) => Err(syntax_at(node, format!("invalid curve side '{other}'"))),
    }
}

// ─── Sequence contents ───────────────────────────────────────────────

fn parse_items(node: Node) -> Result<Vec<SequenceItem>> {
    let mut items = Vec::new();
    for child in elements(node) {
        let item = match child.tag_name().name() {
            "event" | "rest" => SequenceItem::Event(parse_event(child)?),
            "tuplet" => SequenceItem::Tuplet(Tuplet {
                outer: parse_duration_attr(child, "dur")?,
                inner: match child.attribute("inner") {
                    Some(_) => Some(parse_duration_attr(child, "inner")?),
                    None => None,
                },
                nesting_level: 0,
                children: parse_items(child)?,
            }),
            "beamed" => SequenceItem::Beamed(Beamed { children: parse_items(child)? }),
            "grace" => {
                let mut events = Vec::new();
                for g in elements(child) {
                    if matches!(g.tag_name().name(), "event" | "rest") {
                        events.push(parse_event(g)?);
                    } else {
                        warn!("ignoring <{}> in <grace>", g.tag_name().name());
                    }
                }
                SequenceItem::Grace(Grace { events, slash: parse_bool(child, "slash") })
            }
            "direction" => SequenceItem::Direction(parse_direction(child)?),
            other => {
                warn!("ignoring <{other}> in sequence");
                continue;
            }
        };
        items.push(item);
    }
    Ok(items)
}

fn parse_event(node: Node) -> Result<Event> {
    let mut event = Event {
        id: required(node, "id")?.to_string(),
        duration: parse_duration_attr(node, "dur")?,
        tuplet_level: 0,
        heads: Vec::new(),
        ties: Vec::new(),
        slurs: Vec::new(),
        stem: parse_stem(node)?,
        beam: match node.attribute("beam") {
            None => None,
            Some("start") | Some("begin") => Some(BeamMarker::Start),
            Some("end") | Some("stop") => Some(BeamMarker::End),
            Some(other) => return Err(syntax_at(node, format!("invalid beam marker '{other}'"))),
        },
        articulations: Vec::new(),
    };

    for child in elements(node) {
        match child.tag_name().name() {
            "head" | "pitch" => {
                if node.tag_name().name() == "rest" {
                    return Err(syntax_at(child, "a rest cannot carry heads"));
                }
                event.heads.push(parse_head(child)?);
            }
            "tie" => event.ties.push(TieDef {
                target_event: child.attribute("target").map(String::from),
                target_head: child.attribute("head").map(String::from),
                source_head: child.attribute("from").map(String::from),
                side: parse_side(child)?,
            }),
            "slur" => event.slurs.push(SlurDef {
                target_event: required(child, "target")?.to_string(),
                target_head: child.attribute("head").map(String::from),
                side: parse_side(child)?,
            }),
            "articulation" => event.articulations.push(required(child, "name")?.to_string()),
            other => warn!("ignoring <{other}> in event '{}'", event.id),
        }
    }
    Ok(event)
}

fn parse_head(node: Node) -> Result<Head> {
    let step = required(node, "step")?.trim();
    let letter = match step {
        "A" | "B" | "C" | "D" | "E" | "F" | "G" => step.chars().next().unwrap_or('C'),
        other => return Err(syntax_at(node, format!("invalid step '{other}'"))),
    };
    let octave = parse_attr::<i32>(node, "octave")?
        .ok_or_else(|| syntax_at(node, "<head> is missing attribute 'octave'"))?;
    let alter = parse_attr::<i8>(node, "alter")?.unwrap_or(0);
    if !(-2..=2).contains(&alter) {
        return Err(syntax_at(node, format!("alteration {alter} out of range")));
    }
    Ok(Head {
        pitch: Pitch::new(letter, octave, alter),
        id: node.attribute("id").map(String::from),
    })
}

fn parse_direction(node: Node) -> Result<Direction> {
    let placement = match node.attribute("placement") {
        Some("above") => Placement::Above,
        _ => Placement::Below,
    };
    let kind = match node.attribute("kind").unwrap_or("words") {
        "dynamic" => DirectionKind::Dynamic(required(node, "text")?.to_string()),
        "words" => DirectionKind::Words(required(node, "text")?.to_string()),
        "tempo" => {
            let bpm = parse_attr::<f64>(node, "bpm")?
                .filter(|b| b.is_finite() && *b > 0.0)
                .ok_or_else(|| syntax_at(node, "tempo direction needs a positive 'bpm'"))?;
            DirectionKind::Tempo(bpm)
        }
        other => return Err(syntax_at(node, format!("unknown direction kind '{other}'"))),
    };
    let placement = match (&kind, node.attribute("placement")) {
        (DirectionKind::Tempo(_), None) => Placement::Above,
        _ => placement,
    };
    Ok(Direction { kind, placement })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_line_of_bad_duration() {
        let xml = "<score>\n<part id=\"P1\">\n<measure>\n<sequence>\n<event id=\"a\" dur=\"/3\"/>\n</sequence></measure></part></score>";
        match parse_score_xml(xml) {
            Err(EngraveError::Syntax { location, message }) => {
                assert_eq!(location.line, 5);
                assert!(message.contains("unknown base symbol"), "{message}");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_foreign_root() {
        assert!(matches!(
            parse_score_xml("<score-partwise/>"),
            Err(EngraveError::Structural(_))
        ));
    }

    #[test]
    fn parses_nested_items() {
        let xml = r#"<score title="T">
            <part id="P1"><measure><sequence voice="2" stem="down">
              <tuplet dur="/4" inner="3/8">
                <beamed>
                  <event id="a" dur="/8"><head step="C" octave="5" id="h1"/><tie target="b"/></event>
                  <event id="b" dur="/8"><head step="C" octave="5"/></event>
                  <rest id="c" dur="/8"/>
                </beamed>
              </tuplet>
              <grace slash="true"><event id="g" dur="/16"><head step="D" octave="5"/></event></grace>
              <direction kind="dynamic" text="mf"/>
            </sequence></measure></part></score>"#;
        let score = parse_score_xml(xml).unwrap();
        let seq = &score.parts[0].measures[0].sequences[0];
        assert_eq!(seq.voice, 2);
        assert_eq!(seq.stem, Some(StemDirection::Down));
        assert_eq!(seq.items.len(), 3);
        match &seq.items[0] {
            SequenceItem::Tuplet(t) => {
                assert_eq!(t.outer.to_string(), "/4");
                assert_eq!(t.inner.as_ref().map(|d| d.to_string()).as_deref(), Some("3/8"));
                assert!(matches!(&t.children[0], SequenceItem::Beamed(b) if b.children.len() == 3));
            }
            other => panic!("expected tuplet, got {other:?}"),
        }
        assert!(matches!(&seq.items[1], SequenceItem::Grace(g) if g.slash && g.events.len() == 1));
    }
}
