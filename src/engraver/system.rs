//! Engraving one system: symbols → moments → chords → beams → curves.
//!
//! Each system is built from its own measure range. Open curves and the
//! absolute tick where the system ends are returned to the caller, which
//! hands them to the next system.

use std::collections::BTreeMap;

use log::debug;

use crate::error::Result;
use crate::model::{
    BarlineStyle, Clef, Direction, Event, KeySignature, SequenceItem, StemDirection, TimeSignature, Tuplet,
};
use crate::pitch::{default_stem_direction, staff_offset};
use crate::voice::{flatten_sequence, VoiceSymbol};

use super::beams::{decide_stem_direction, layout_beam, scan_groups, BeamGroup, BeamToken};
use super::chords::{ChordLayout, ChordOptions};
use super::constants::*;
use super::geometry::{Glyph, MomentGeometry, StaffGeometry, SystemGeometry};
use super::layout::{justify, moment_distances, natural_width};
use super::metrics::GlyphMetrics;
use super::moments::{category_padding, Moment, MomentSymbol, SymbolCategory};
use super::staff;
use super::ties::{layout_curves, ContinuationRecord, CurveContext, VoiceChords};
use super::ScoreContext;

#[derive(Debug, Clone, Copy)]
pub(super) struct SystemRange {
    pub(super) index: usize,
    /// Inclusive measure indices
    pub(super) first: usize,
    pub(super) last: usize,
    /// Absolute tick where the system starts
    pub(super) start_tick: u64,
    pub(super) is_last: bool,
}

pub(super) struct SystemOutput {
    pub(super) geometry: SystemGeometry,
    pub(super) open: Vec<ContinuationRecord>,
    pub(super) end_tick: u64,
}

// ── Collected symbols ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Block {
    Clef(Clef),
    Key(KeySignature, Clef),
    Time(TimeSignature),
    Barline(BarlineStyle),
    Repeat,
}

impl Block {
    fn category(&self) -> SymbolCategory {
        match self {
            Block::Clef(_) => SymbolCategory::Clef,
            Block::Key(..) => SymbolCategory::KeySignature,
            Block::Time(_) => SymbolCategory::TimeSignature,
            Block::Barline(_) => SymbolCategory::Barline,
            Block::Repeat => SymbolCategory::Repeat,
        }
    }

    fn width(&self, metrics: &dyn GlyphMetrics) -> f64 {
        match self {
            Block::Clef(clef) => metrics.clef_width(clef),
            Block::Key(key, _) => metrics.key_signature_width(key),
            Block::Time(time) => metrics.time_signature_width(time),
            Block::Barline(style) => metrics.barline_width(*style),
            Block::Repeat => metrics.repeat_width(),
        }
    }

    fn glyphs(&self, x: f64, staff_y: f64, gap: f64, metrics: &dyn GlyphMetrics) -> Vec<Glyph> {
        match self {
            Block::Clef(clef) => vec![staff::clef(clef, x, staff_y, gap, metrics)],
            Block::Key(key, clef) => staff::key_signature(key, clef, x, staff_y, gap, metrics),
            Block::Time(time) => staff::time_signature(time, x, staff_y, gap, metrics),
            Block::Barline(style) => staff::barline(*style, x, staff_y, gap, metrics),
            Block::Repeat => vec![staff::repeat_dots(x, staff_y, gap, metrics)],
        }
    }
}

struct BlockItem {
    part: usize,
    tick: u64,
    block: Block,
}

#[derive(Debug, Clone, Copy)]
enum SlotKind {
    Chord,
    Rest,
    /// `column` 0 is the grace nearest its main chord
    Grace { slash: bool, column: usize },
}

/// A chord, rest or grace chord with everything needed to build it.
struct Slot<'a> {
    event: &'a Event,
    tick: u64,
    part: usize,
    clef: Clef,
    forced: Option<StemDirection>,
    kind: SlotKind,
}

impl Slot<'_> {
    fn head_offsets(&self) -> Vec<f64> {
        self.event.heads.iter().map(|h| staff_offset(&h.pitch, &self.clef)).collect()
    }

    fn category(&self) -> SymbolCategory {
        match self.kind {
            SlotKind::Grace { .. } => SymbolCategory::Grace,
            _ => SymbolCategory::Duration,
        }
    }

    fn column(&self) -> usize {
        match self.kind {
            SlotKind::Grace { column, .. } => column,
            _ => 0,
        }
    }
}

/// One voice of one part across the system's measures.
struct Stream<'a> {
    part: usize,
    voice: u32,
    tokens: Vec<BeamToken>,
    slots: Vec<usize>,
    tuplets: Vec<(&'a Tuplet, Vec<usize>)>,
    directions: Vec<(u64, &'a Direction)>,
}

struct Collected<'a> {
    slots: Vec<Slot<'a>>,
    streams: Vec<Stream<'a>>,
    blocks: Vec<BlockItem>,
    end_tick: u64,
}

#[derive(Debug, Clone, Copy)]
enum Opening {
    /// Clef and key (and optionally time) in front of the first measure
    Prefix { show_time: bool },
    /// Only changes, as inside a system
    Bare,
}

fn per_part(blocks: &mut Vec<BlockItem>, parts: usize, tick: u64, mut block: impl FnMut(usize) -> Option<Block>) {
    for part in 0..parts {
        if let Some(block) = block(part) {
            blocks.push(BlockItem { part, tick, block });
        }
    }
}

fn collect<'a>(ctx: &ScoreContext<'a>, first: usize, last: usize, start_tick: u64, opening: Opening) -> Collected<'a> {
    let score = ctx.score;
    let entries = &ctx.timemap.entries;
    let parts = score.parts.len();
    let mut out = Collected { slots: Vec::new(), streams: Vec::new(), blocks: Vec::new(), end_tick: start_tick };
    let mut tick = start_tick;

    for mi in first..=last {
        let entry = &entries[mi];
        let gm = score.global_measure(entry.number);
        let key = entry.key.filter(|k| k.fifths != 0);

        match opening {
            Opening::Prefix { show_time } if mi == first => {
                per_part(&mut out.blocks, parts, tick, |p| Some(Block::Clef(ctx.clefs[p][mi])));
                per_part(&mut out.blocks, parts, tick, |p| key.map(|k| Block::Key(k, ctx.clefs[p][mi])));
                if show_time {
                    per_part(&mut out.blocks, parts, tick, |_| entry.time_sig.map(Block::Time));
                }
            }
            _ if mi > 0 => {
                per_part(&mut out.blocks, parts, tick, |p| {
                    (ctx.clefs[p][mi] != ctx.clefs[p][mi - 1]).then(|| Block::Clef(ctx.clefs[p][mi]))
                });
                if entry.key_changed {
                    per_part(&mut out.blocks, parts, tick, |p| key.map(|k| Block::Key(k, ctx.clefs[p][mi])));
                }
                if entry.time_changed {
                    per_part(&mut out.blocks, parts, tick, |_| entry.time_sig.map(Block::Time));
                }
            }
            _ => {}
        }
        if mi == first {
            if let Some(style) = gm.and_then(|g| g.start_barline) {
                per_part(&mut out.blocks, parts, tick, |_| Some(Block::Barline(style)));
            }
            if gm.is_some_and(|g| g.repeat_start) {
                per_part(&mut out.blocks, parts, tick, |_| Some(Block::Repeat));
            }
        }

        for (p, part) in score.parts.iter().enumerate() {
            let Some(measure) = part.measures.get(mi) else { continue };
            let clef = ctx.clefs[p][mi];
            for seq in &measure.sequences {
                let si = match out.streams.iter().position(|s| s.part == p && s.voice == seq.voice) {
                    Some(si) => si,
                    None => {
                        out.streams.push(Stream {
                            part: p,
                            voice: seq.voice,
                            tokens: Vec::new(),
                            slots: Vec::new(),
                            tuplets: Vec::new(),
                            directions: Vec::new(),
                        });
                        out.streams.len() - 1
                    }
                };
                let (symbols, _) = flatten_sequence(seq);
                let mut open_tuplets: Vec<(&Tuplet, Vec<usize>)> = Vec::new();
                for symbol in symbols {
                    let (event, at, kind) = match symbol {
                        VoiceSymbol::Chord { event, tick: t } => (event, t, SlotKind::Chord),
                        VoiceSymbol::Rest { event, tick: t } => (event, t, SlotKind::Rest),
                        VoiceSymbol::Grace { event, tick: t, slash, index, count } => {
                            (event, t, SlotKind::Grace { slash, column: count - 1 - index })
                        }
                        VoiceSymbol::BeamStart => {
                            out.streams[si].tokens.push(BeamToken::Start);
                            continue;
                        }
                        VoiceSymbol::BeamEnd => {
                            out.streams[si].tokens.push(BeamToken::End);
                            continue;
                        }
                        VoiceSymbol::TupletStart { tuplet, .. } => {
                            open_tuplets.push((tuplet, Vec::new()));
                            continue;
                        }
                        VoiceSymbol::TupletEnd { .. } => {
                            if let Some(done) = open_tuplets.pop() {
                                out.streams[si].tuplets.push(done);
                            }
                            continue;
                        }
                        VoiceSymbol::Direction { direction, tick: t } => {
                            out.streams[si].directions.push((tick + t, direction));
                            continue;
                        }
                    };
                    let slot = out.slots.len();
                    out.slots.push(Slot { event, tick: tick + at, part: p, clef, forced: seq.stem, kind });
                    let stream = &mut out.streams[si];
                    stream.slots.push(slot);
                    match kind {
                        SlotKind::Chord => stream.tokens.push(BeamToken::Chord(slot)),
                        SlotKind::Rest => stream.tokens.push(BeamToken::Rest),
                        SlotKind::Grace { .. } => continue,
                    }
                    for (_, members) in &mut open_tuplets {
                        members.push(slot);
                    }
                }
            }
        }

        let end = tick + entry.length_ticks;
        let next_gm = if mi < last { score.global_measure(entries[mi + 1].number) } else { None };
        let style = next_gm
            .and_then(|g| g.start_barline)
            .or(gm.and_then(|g| g.end_barline))
            .unwrap_or(if mi + 1 == entries.len() { BarlineStyle::Final } else { BarlineStyle::Regular });
        per_part(&mut out.blocks, parts, end, |_| Some(Block::Barline(style)));
        if gm.is_some_and(|g| g.repeat_end) || next_gm.is_some_and(|g| g.repeat_start) {
            per_part(&mut out.blocks, parts, end, |_| Some(Block::Repeat));
        }
        tick = end;
    }
    out.end_tick = tick;
    out
}

// ── Chords and beams ────────────────────────────────────────────────

fn build_chords(
    ctx: &ScoreContext<'_>,
    collected: &Collected<'_>,
    with_beams: bool,
) -> Result<(Vec<ChordLayout>, Vec<(usize, BeamGroup)>)> {
    let slots = &collected.slots;
    let mut beam_direction: Vec<Option<StemDirection>> = vec![None; slots.len()];
    let mut groups = Vec::new();
    if with_beams {
        for stream in &collected.streams {
            let label = format!("part '{}' voice {}", ctx.score.parts[stream.part].id, stream.voice);
            for members in scan_groups(&stream.tokens, &label)? {
                if members.iter().any(|&s| !slots[s].event.duration.base.has_stem()) {
                    debug!("{label}: beam group with stemless chords left unbeamed");
                    continue;
                }
                let offsets: Vec<Vec<f64>> = members.iter().map(|&s| slots[s].head_offsets()).collect();
                let direction = decide_stem_direction(&offsets, slots[members[0]].forced);
                let depths: Vec<u8> = members.iter().map(|&s| slots[s].event.duration.base.flag_count()).collect();
                for &s in &members {
                    beam_direction[s] = Some(direction);
                }
                groups.push((stream.part, BeamGroup::new(members, direction, &depths)));
            }
        }
    }

    let builder = ctx.chord_builder();
    let chords = slots
        .iter()
        .enumerate()
        .map(|(i, slot)| match slot.kind {
            SlotKind::Rest => builder.build_rest(slot.event, slot.forced),
            SlotKind::Chord => {
                let direction = beam_direction[i]
                    .or(slot.event.stem)
                    .or(slot.forced)
                    .unwrap_or_else(|| default_stem_direction(&slot.head_offsets()));
                builder.build_chord(
                    slot.event,
                    &slot.clef,
                    ChordOptions { direction, beamed: beam_direction[i].is_some(), grace: None },
                )
            }
            SlotKind::Grace { slash, .. } => builder.build_chord(
                slot.event,
                &slot.clef,
                ChordOptions {
                    direction: slot.event.stem.or(slot.forced).unwrap_or(StemDirection::Up),
                    beamed: false,
                    grace: Some(slash),
                },
            ),
        })
        .collect();
    Ok((chords, groups))
}

fn build_moments(ctx: &ScoreContext<'_>, collected: &Collected<'_>, chords: &[ChordLayout]) -> Vec<Moment> {
    fn moment_at<'m>(map: &'m mut BTreeMap<u64, Moment>, ctx: &ScoreContext<'_>, tick: u64) -> &'m mut Moment {
        map.entry(tick).or_insert_with(|| Moment::new(tick, ctx.timemap.ms_at(tick)))
    }

    let mut map: BTreeMap<u64, Moment> = BTreeMap::new();
    for (i, slot) in collected.slots.iter().enumerate() {
        let symbol = MomentSymbol::new(slot.category(), chords[i].left_extent, chords[i].right_extent, i)
            .in_column(slot.column());
        moment_at(&mut map, ctx, slot.tick).add(symbol);
    }
    for (b, item) in collected.blocks.iter().enumerate() {
        let symbol = MomentSymbol::new(item.block.category(), 0.0, item.block.width(ctx.metrics), b);
        moment_at(&mut map, ctx, item.tick).add(symbol);
    }
    map.into_values()
        .map(|mut m| {
            m.align();
            m
        })
        .collect()
}

// ── Widths for system breaking ──────────────────────────────────────

/// Natural width of one measure in gap units, without a system prefix.
pub(super) fn measure_width(ctx: &ScoreContext<'_>, mi: usize) -> Result<f64> {
    let collected = collect(ctx, mi, mi, ctx.timemap.entries[mi].start_tick, Opening::Bare);
    let (chords, _) = build_chords(ctx, &collected, false)?;
    let moments = build_moments(ctx, &collected, &chords);
    let distances = moment_distances(&moments);
    Ok(natural_width(&moments, &distances) + category_padding(SymbolCategory::Barline, SymbolCategory::Duration))
}

/// Width of the clef/key(/time) prefix of a system starting at `mi`.
pub(super) fn prefix_width(ctx: &ScoreContext<'_>, mi: usize, show_time: bool) -> f64 {
    let entry = &ctx.timemap.entries[mi];
    let mut moment = Moment::new(0, 0.0);
    moment.add(MomentSymbol::new(SymbolCategory::Duration, 0.0, 0.0, 0));
    let mut blocks: Vec<Block> = ctx.clefs.iter().map(|clefs| Block::Clef(clefs[mi])).collect();
    if let Some(key) = entry.key.filter(|k| k.fifths != 0) {
        blocks.push(Block::Key(key, Clef::TREBLE));
    }
    if let (true, Some(time)) = (show_time, entry.time_sig) {
        blocks.push(Block::Time(time));
    }
    for (i, block) in blocks.iter().enumerate() {
        moment.add(MomentSymbol::new(block.category(), 0.0, block.width(ctx.metrics), i));
    }
    moment.align();
    -moment.left_extent
}

// ── The system ──────────────────────────────────────────────────────

pub(super) fn engrave_system(
    ctx: &ScoreContext<'_>,
    range: SystemRange,
    carried: Vec<ContinuationRecord>,
) -> Result<SystemOutput> {
    let config = ctx.config;
    let gap = ctx.gap;
    let entries = &ctx.timemap.entries;
    let show_time = range.index == 0 || entries[range.first].time_changed;
    let collected = collect(ctx, range.first, range.last, range.start_tick, Opening::Prefix { show_time });
    let (mut chords, groups) = build_chords(ctx, &collected, true)?;
    let mut moments = build_moments(ctx, &collected, &chords);

    // Horizontal placement
    let distances = justify(&moments, moment_distances(&moments), config.content_width() / gap, !range.is_last);
    let mut x = config.margin_left - moments.first().map_or(0.0, |m| m.left_extent) * gap;
    for (i, moment) in moments.iter_mut().enumerate() {
        if i > 0 {
            x += distances[i - 1] * gap;
        }
        moment.alignment_x = x;
    }
    let moment_index: BTreeMap<u64, usize> = moments.iter().enumerate().map(|(i, m)| (m.tick, i)).collect();
    let staff_ys: Vec<f64> = (0..ctx.score.parts.len())
        .map(|p| p as f64 * (STAFF_HEIGHT * gap + config.min_staff_gap))
        .collect();
    let right_limit = config.page_width - config.margin_right;

    for (i, slot) in collected.slots.iter().enumerate() {
        let Some(&m) = moment_index.get(&slot.tick) else { continue };
        let offset = moments[m].offset_of(slot.category(), i).unwrap_or(0.0);
        chords[i].translate(moments[m].alignment_x + offset * gap, staff_ys[slot.part]);
    }

    let mut glyphs = Vec::new();
    for &y in &staff_ys {
        glyphs.extend(staff::staff_lines(config.margin_left, right_limit, y, gap, config.staffline_width));
    }
    for (b, item) in collected.blocks.iter().enumerate() {
        let Some(&m) = moment_index.get(&item.tick) else { continue };
        let x = moments[m].alignment_x + moments[m].offset_of(item.block.category(), b).unwrap_or(0.0) * gap;
        glyphs.extend(item.block.glyphs(x, staff_ys[item.part], gap, ctx.metrics));
    }

    let left_limit = moments
        .first()
        .and_then(|m| {
            [
                SymbolCategory::Repeat,
                SymbolCategory::TimeSignature,
                SymbolCategory::KeySignature,
                SymbolCategory::Barline,
                SymbolCategory::Clef,
            ]
            .into_iter()
            .filter_map(|c| m.block_right(c))
            .reduce(f64::max)
            .map(|right| m.alignment_x + right * gap)
        })
        .unwrap_or(config.margin_left);

    for (part, group) in &groups {
        let beam = layout_beam(group, &mut chords, staff_ys[*part], gap, config.stem_width)?;
        debug!("beam of {} chords in part {} at slope {:.3}", group.members.len(), part, beam.line.tan);
        glyphs.extend(beam.glyphs);
    }

    for stream in &collected.streams {
        for (tuplet, members) in &stream.tuplets {
            glyphs.extend(tuplet_number(tuplet, members, &chords, gap));
        }
        for &(tick, direction) in &stream.directions {
            let x = moments
                .iter()
                .find(|m| m.tick >= tick)
                .or(moments.last())
                .map_or(config.margin_left, |m| m.alignment_x);
            glyphs.push(staff::direction(direction, x, staff_ys[stream.part], gap));
        }
    }

    let voices: Vec<VoiceChords<'_>> = collected
        .streams
        .iter()
        .map(|s| VoiceChords {
            part: s.part,
            voice: s.voice,
            staff_y: staff_ys[s.part],
            chords: s
                .slots
                .iter()
                .copied()
                .filter(|&i| matches!(collected.slots[i].kind, SlotKind::Chord))
                .map(|i| (i, collected.slots[i].event))
                .collect(),
        })
        .collect();
    let curve_ctx = CurveContext { system: range.index, left_limit, right_limit, gap };
    let (curves, open) = layout_curves(&voices, &chords, carried, &curve_ctx)?;
    glyphs.extend(curves);

    debug!(
        "system {}: measures {}..={}, {} moments, {} beams, {} curves left open",
        range.index,
        entries[range.first].number,
        entries[range.last].number,
        moments.len(),
        groups.len(),
        open.len()
    );

    for chord in chords {
        glyphs.extend(chord.into_glyphs(config.stem_width));
    }

    let geometry = SystemGeometry {
        index: range.index,
        first_measure: entries[range.first].number,
        last_measure: entries[range.last].number,
        y: 0.0,
        left_limit,
        right_limit,
        staves: ctx
            .score
            .parts
            .iter()
            .zip(&staff_ys)
            .map(|(part, &y)| StaffGeometry { part_id: part.id.clone(), y, x_start: config.margin_left, x_end: right_limit })
            .collect(),
        moments: moments
            .iter()
            .map(|m| MomentGeometry { tick: m.tick, time_ms: m.time_ms, x: m.alignment_x })
            .collect(),
        glyphs,
    };
    Ok(SystemOutput { geometry, open, end_tick: collected.end_tick })
}

// ── Tuplet numbers ──────────────────────────────────────────────────

fn tuplet_label(tuplet: &Tuplet) -> String {
    fn units(items: &[SequenceItem]) -> usize {
        items
            .iter()
            .map(|item| match item {
                SequenceItem::Event(_) | SequenceItem::Tuplet(_) => 1,
                SequenceItem::Beamed(beamed) => units(&beamed.children),
                SequenceItem::Grace(_) | SequenceItem::Direction(_) => 0,
            })
            .sum()
    }
    match &tuplet.inner {
        Some(inner) if inner.multiplier > 1 => inner.multiplier.to_string(),
        _ => units(&tuplet.children).to_string(),
    }
}

/// The ratio number on the stem side of the tuplet's chords.
fn tuplet_number(tuplet: &Tuplet, members: &[usize], chords: &[ChordLayout], gap: f64) -> Option<Glyph> {
    let first = chords.get(*members.first()?)?;
    let last = chords.get(*members.last()?)?;
    let centre = |c: &ChordLayout| c.glyphs.first().map_or(0.0, |g| (g.bbox.x + g.bbox.right()) / 2.0);
    let cx = (centre(first) + centre(last)) / 2.0;

    let spans = members.iter().filter_map(|&i| chords.get(i)).flat_map(|c| {
        c.glyphs
            .iter()
            .map(|g| (g.bbox.y, g.bbox.bottom()))
            .chain(c.stem.map(|s| (s.tip_y.min(s.base_y), s.tip_y.max(s.base_y))))
            .collect::<Vec<_>>()
    });
    let (top, bottom) = spans.fold((f64::INFINITY, f64::NEG_INFINITY), |(t, b), (y0, y1)| (t.min(y0), b.max(y1)));
    // A leading rest has no stem; the first stemmed member decides the side.
    let side = members.iter().filter_map(|&i| chords.get(i)).find(|c| !c.is_rest).unwrap_or(first);
    let y = match side.direction {
        StemDirection::Up => top - TUPLET_NUMBER_DISTANCE * gap,
        StemDirection::Down => bottom + (TUPLET_NUMBER_DISTANCE + TEXT_HEIGHT) * gap,
    };
    Some(staff::tuplet_number(&tuplet_label(tuplet), cx, y, gap))
}
