//! Layout engine: a resolved score in, positioned page geometry out.
//!
//! The pipeline per score:
//!   1. timemap and running clefs
//!   2. natural measure widths → system breaks
//!   3. each system: moments, chords, beams, curves (system.rs)
//!   4. open ties/slurs handed from one system to the next
//!   5. systems stacked onto pages

mod beams;
mod chords;
mod constants;
pub mod geometry;
mod layout;
pub mod metrics;
mod moments;
mod staff;
mod system;
mod ties;

use log::{debug, info};

use crate::config::EngraveConfig;
use crate::error::{EngraveError, Result};
use crate::model::{Clef, Score};
use crate::timemap::TimeMap;

use chords::ChordBuilder;
use geometry::EngravedScore;
use metrics::{DefaultMetrics, GlyphMetrics};
use system::{SystemRange, engrave_system, measure_width, prefix_width};

/// Everything shared by the systems of one score.
struct ScoreContext<'a> {
    score: &'a Score,
    config: &'a EngraveConfig,
    metrics: &'a dyn GlyphMetrics,
    timemap: TimeMap,
    /// Clef in effect per part and measure index
    clefs: Vec<Vec<Clef>>,
    gap: f64,
}

impl<'a> ScoreContext<'a> {
    fn new(score: &'a Score, config: &'a EngraveConfig, metrics: &'a dyn GlyphMetrics) -> Self {
        Self {
            score,
            config,
            metrics,
            timemap: TimeMap::build(score, config.tempo_bpm),
            clefs: running_clefs(score),
            gap: config.gap_size,
        }
    }

    fn chord_builder(&self) -> ChordBuilder<'a> {
        ChordBuilder {
            gap: self.gap,
            stem_width: self.config.stem_width,
            line_width: self.config.staffline_width,
            metrics: self.metrics,
        }
    }
}

fn running_clefs(score: &Score) -> Vec<Vec<Clef>> {
    score
        .parts
        .iter()
        .map(|part| {
            let mut current = Clef::TREBLE;
            part.measures
                .iter()
                .map(|m| {
                    if let Some(clef) = m.clef {
                        current = clef;
                    }
                    current
                })
                .collect()
        })
        .collect()
}

fn check_resolved(score: &Score) -> Result<()> {
    let mut unresolved = None;
    score.for_each_event(|event| {
        if unresolved.is_none() && event.duration.resolved_ticks().is_none() {
            unresolved = Some(event.id.clone());
        }
    });
    match unresolved {
        Some(id) => Err(EngraveError::Resolution(format!("event '{id}' has no resolved duration"))),
        None => Ok(()),
    }
}

/// Lay out a resolved score with the default glyph metrics.
pub fn engrave_score(score: &Score, config: &EngraveConfig) -> Result<EngravedScore> {
    engrave_with_metrics(score, config, &DefaultMetrics)
}

/// Lay out a resolved score with caller-supplied glyph metrics.
pub fn engrave_with_metrics(score: &Score, config: &EngraveConfig, metrics: &dyn GlyphMetrics) -> Result<EngravedScore> {
    config.validate()?;
    check_resolved(score)?;
    let ctx = ScoreContext::new(score, config, metrics);
    let entries = &ctx.timemap.entries;
    if entries.is_empty() {
        return Err(EngraveError::structural("score has no measures"));
    }

    let mut widths = Vec::with_capacity(entries.len());
    let mut prefixes = Vec::with_capacity(entries.len());
    for (mi, entry) in entries.iter().enumerate() {
        widths.push(measure_width(&ctx, mi)?);
        prefixes.push(prefix_width(&ctx, mi, mi == 0 || entry.time_changed));
    }
    let numbers: Vec<u32> = entries.iter().map(|e| e.number).collect();
    let ranges = layout::break_systems(&widths, &prefixes, &numbers, &config.system_starts, config.content_width() / ctx.gap);
    debug!("{} measures in {} systems", entries.len(), ranges.len());

    let mut systems = Vec::with_capacity(ranges.len());
    let mut carried = Vec::new();
    let mut start_tick = 0;
    for (index, &(first, last)) in ranges.iter().enumerate() {
        let range = SystemRange { index, first, last, start_tick, is_last: index + 1 == ranges.len() };
        let output = engrave_system(&ctx, range, std::mem::take(&mut carried))?;
        carried = output.open;
        start_tick = output.end_tick;
        systems.push(output.geometry);
    }
    if let Some(record) = carried.first() {
        return Err(EngraveError::structural(format!("{} never reaches its target", record.describe())));
    }

    let header = staff::header(
        score.title.as_deref(),
        score.composer.as_deref(),
        config.page_width,
        config.margin_top,
        config.page_width - config.margin_right,
        ctx.gap,
    );
    let pages = layout::paginate(systems, header, config);
    let engraved = EngravedScore {
        title: score.title.clone(),
        composer: score.composer.clone(),
        total_duration_ms: ctx.timemap.total_duration_ms(),
        pages,
    };
    info!(
        "engraved {} measures into {} systems on {} pages",
        entries.len(),
        ranges.len(),
        engraved.pages.len()
    );
    Ok(engraved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_score_xml;
    use crate::resolve::resolve_score;
    use geometry::GlyphClass;
    use pretty_assertions::assert_eq;

    fn engrave(xml: &str, config: &EngraveConfig) -> Result<EngravedScore> {
        let mut score = parse_score_xml(xml)?;
        resolve_score(&mut score)?;
        engrave_score(&score, config)
    }

    fn count(score: &EngravedScore, class: GlyphClass) -> usize {
        score.systems().flat_map(|s| &s.glyphs).filter(|g| g.class == class).count()
    }

    const TWO_MEASURES: &str = r#"<score title="Scale">
      <global><measure number="1"><time beats="2" beat-type="4"/><key fifths="1"/></measure></global>
      <part id="P1">
        <measure><sequence>
          <beamed>
            <event id="a" dur="/8"><head step="G" octave="4"/></event>
            <event id="b" dur="/8"><head step="A" octave="4"/></event>
          </beamed>
          <event id="c" dur="/4"><head step="B" octave="4"/></event>
        </sequence></measure>
        <measure><sequence>
          <event id="d" dur="/2"><head step="C" octave="5"/></event>
        </sequence></measure>
      </part></score>"#;

    #[test]
    fn small_score_on_one_page() {
        let score = engrave(TWO_MEASURES, &EngraveConfig::default()).unwrap();
        assert_eq!(score.pages.len(), 1);
        assert_eq!(score.systems().count(), 1);
        assert_eq!(score.total_duration_ms, 2000.0);
        assert_eq!(count(&score, GlyphClass::Notehead), 4);
        assert_eq!(count(&score, GlyphClass::Beam), 1);
        assert_eq!(count(&score, GlyphClass::Clef), 1);
        assert_eq!(count(&score, GlyphClass::KeySignature), 1);
        assert_eq!(count(&score, GlyphClass::TimeSignature), 2);
        assert_eq!(score.pages[0].header.len(), 1);

        let system = &score.pages[0].systems[0];
        let ticks: Vec<u64> = system.moments.iter().map(|m| m.tick).collect();
        assert_eq!(ticks, vec![0, 384, 768, 1536, 3072]);
        assert!(system.moments.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn configured_starts_split_systems() {
        let config = EngraveConfig { system_starts: vec![2], ..EngraveConfig::default() };
        let score = engrave(TWO_MEASURES, &config).unwrap();
        let ranges: Vec<(u32, u32)> = score.systems().map(|s| (s.first_measure, s.last_measure)).collect();
        assert_eq!(ranges, vec![(1, 1), (2, 2)]);
        // Clef and key repeat at the second system, the time signature does not.
        assert_eq!(count(&score, GlyphClass::Clef), 2);
        assert_eq!(count(&score, GlyphClass::KeySignature), 2);
        assert_eq!(count(&score, GlyphClass::TimeSignature), 2);
        let systems: Vec<_> = score.systems().collect();
        assert!(systems[1].y > systems[0].y);
    }

    #[test]
    fn unresolved_score_is_rejected() {
        let score = parse_score_xml(TWO_MEASURES).unwrap();
        assert!(matches!(
            engrave_score(&score, &EngraveConfig::default()),
            Err(EngraveError::Resolution(_))
        ));
    }

    #[test]
    fn running_clef_follows_changes() {
        let mut score = parse_score_xml(
            r#"<score><part id="P1">
              <measure><sequence><event id="a" dur="/1"><head step="C" octave="5"/></event></sequence></measure>
              <measure><clef sign="F" line="4"/><sequence><event id="b" dur="/1"><head step="C" octave="3"/></event></sequence></measure>
              <measure><sequence><event id="c" dur="/1"><head step="C" octave="3"/></event></sequence></measure>
            </part></score>"#,
        )
        .unwrap();
        resolve_score(&mut score).unwrap();
        let clefs = running_clefs(&score);
        assert_eq!(clefs[0], vec![Clef::TREBLE, Clef::BASS, Clef::BASS]);

        let engraved = engrave_score(&score, &EngraveConfig::default()).unwrap();
        // The prefix clef plus one change.
        assert_eq!(count(&engraved, GlyphClass::Clef), 2);
    }
}
