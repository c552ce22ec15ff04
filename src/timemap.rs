//! Absolute timing for each measure of a resolved score.
//!
//! Answers "at which tick does each measure start, how long is it, and
//! what wall-clock time is a given tick?". Measure lengths come from the
//! longest voice across all parts; an empty measure falls back to the
//! running time signature (4/4 when none is given).

use crate::duration::QUARTER_TICKS;
use crate::model::{DirectionKind, KeySignature, Score, TimeSignature};
use crate::resolve::items_ticks;
use crate::voice::{flatten_sequence, VoiceSymbol};

/// Timing information for one measure.
#[derive(Debug, Clone)]
pub struct TimemapEntry {
    /// Index into Part.measures
    pub index: usize,
    /// 1-based measure number
    pub number: u32,
    /// Absolute tick where the measure starts
    pub start_tick: u64,
    /// Length of the measure in ticks
    pub length_ticks: u64,
    /// Cumulative start time in milliseconds from the beginning
    pub timestamp_ms: f64,
    /// Duration of this measure in milliseconds
    pub duration_ms: f64,
    /// Tempo (BPM) in effect at the start of the measure
    pub tempo_bpm: f64,
    /// Running time signature
    pub time_sig: Option<TimeSignature>,
    /// Running key signature
    pub key: Option<KeySignature>,
    /// The time signature changes at this measure (always true for the first one that has it)
    pub time_changed: bool,
    pub key_changed: bool,
}

#[derive(Debug, Clone)]
pub struct TimeMap {
    pub entries: Vec<TimemapEntry>,
    /// (absolute tick, bpm), sorted by tick
    tempo_changes: Vec<(u64, f64)>,
    default_tempo: f64,
}

const DEFAULT_TIME_SIG: TimeSignature = TimeSignature { beats: 4, beat_type: 4 };

impl TimeMap {
    /// Walk measures in score order. The score must already be resolved.
    pub fn build(score: &Score, default_tempo: f64) -> TimeMap {
        let mut entries = Vec::with_capacity(score.measure_count());
        let mut tempo_changes: Vec<(u64, f64)> = Vec::new();
        let mut time_sig: Option<TimeSignature> = None;
        let mut key: Option<KeySignature> = None;
        let mut start_tick = 0u64;

        for index in 0..score.measure_count() {
            let number = score.parts[0].measures[index].number;
            let mut time_changed = false;
            let mut key_changed = false;
            if let Some(gm) = score.global_measure(number) {
                if let Some(ts) = gm.time {
                    time_changed = time_sig != Some(ts);
                    time_sig = Some(ts);
                }
                if let Some(k) = gm.key {
                    key_changed = key != Some(k);
                    key = Some(k);
                }
            }

            let mut content = 0u64;
            for part in &score.parts {
                let Some(measure) = part.measures.get(index) else { continue };
                for seq in &measure.sequences {
                    content = content.max(items_ticks(&seq.items));
                    let (symbols, _) = flatten_sequence(seq);
                    for symbol in symbols {
                        if let VoiceSymbol::Direction { direction, tick } = symbol {
                            if let DirectionKind::Tempo(bpm) = direction.kind {
                                tempo_changes.push((start_tick + tick, bpm));
                            }
                        }
                    }
                }
            }
            let length_ticks = if content > 0 {
                content
            } else {
                time_sig.unwrap_or(DEFAULT_TIME_SIG).measure_ticks()
            };

            entries.push(TimemapEntry {
                index,
                number,
                start_tick,
                length_ticks,
                timestamp_ms: 0.0,
                duration_ms: 0.0,
                tempo_bpm: default_tempo,
                time_sig,
                key,
                time_changed,
                key_changed,
            });
            start_tick += length_ticks;
        }

        tempo_changes.sort_by_key(|&(tick, _)| tick);
        let mut map = TimeMap { entries, tempo_changes, default_tempo };

        let timing: Vec<(f64, f64, f64)> = map
            .entries
            .iter()
            .map(|e| {
                let start = map.ms_at(e.start_tick);
                let end = map.ms_at(e.start_tick + e.length_ticks);
                (start, end - start, map.tempo_at(e.start_tick))
            })
            .collect();
        for (entry, (start, duration, tempo)) in map.entries.iter_mut().zip(timing) {
            entry.timestamp_ms = start;
            entry.duration_ms = duration;
            entry.tempo_bpm = tempo;
        }
        map
    }

    /// Tempo in effect at a tick (a change at exactly this tick applies).
    pub fn tempo_at(&self, tick: u64) -> f64 {
        self.tempo_changes
            .iter()
            .take_while(|&&(t, _)| t <= tick)
            .last()
            .map_or(self.default_tempo, |&(_, bpm)| bpm)
    }

    /// Wall-clock milliseconds at an absolute tick.
    pub fn ms_at(&self, tick: u64) -> f64 {
        let span_ms = |ticks: u64, bpm: f64| ticks as f64 * 60_000.0 / (bpm * QUARTER_TICKS as f64);
        let mut ms = 0.0;
        let mut prev_tick = 0u64;
        let mut bpm = self.default_tempo;
        for &(change_tick, change_bpm) in &self.tempo_changes {
            if change_tick >= tick {
                break;
            }
            ms += span_ms(change_tick - prev_tick, bpm);
            prev_tick = change_tick;
            bpm = change_bpm;
        }
        ms + span_ms(tick - prev_tick, bpm)
    }

    pub fn total_ticks(&self) -> u64 {
        self.entries.last().map_or(0, |e| e.start_tick + e.length_ticks)
    }

    /// Total duration of the score in milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        self.ms_at(self.total_ticks())
    }
}
