//! Symbolic durations and their conversion to integer ticks.
//!
//! A duration token has the shape `[multiplier]/base[d...]`, e.g. `/4`,
//! `/8d`, `3/16`. Ticks use a power-of-two ladder with the quarter note
//! at 768, which keeps triplets and quintuplets of short values integral
//! down to the 1024th.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ticks in a quarter note.
pub const QUARTER_TICKS: u64 = 768;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration token: {0}")]
    Syntax(String),
    #[error("tuplet resolution failed: {0}")]
    Resolution(String),
}

/// The twelve note-value classes, longest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaseSymbol {
    DoubleWhole,
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    OneTwentyEighth,
    TwoFiftySixth,
    FiveTwelfth,
    OneThousandTwentyFourth,
}

impl BaseSymbol {
    pub const ALL: [BaseSymbol; 12] = [
        BaseSymbol::DoubleWhole,
        BaseSymbol::Whole,
        BaseSymbol::Half,
        BaseSymbol::Quarter,
        BaseSymbol::Eighth,
        BaseSymbol::Sixteenth,
        BaseSymbol::ThirtySecond,
        BaseSymbol::SixtyFourth,
        BaseSymbol::OneTwentyEighth,
        BaseSymbol::TwoFiftySixth,
        BaseSymbol::FiveTwelfth,
        BaseSymbol::OneThousandTwentyFourth,
    ];

    /// Token spelling of the base (the number after the slash).
    pub fn token(self) -> &'static str {
        match self {
            BaseSymbol::DoubleWhole => "0",
            BaseSymbol::Whole => "1",
            BaseSymbol::Half => "2",
            BaseSymbol::Quarter => "4",
            BaseSymbol::Eighth => "8",
            BaseSymbol::Sixteenth => "16",
            BaseSymbol::ThirtySecond => "32",
            BaseSymbol::SixtyFourth => "64",
            BaseSymbol::OneTwentyEighth => "128",
            BaseSymbol::TwoFiftySixth => "256",
            BaseSymbol::FiveTwelfth => "512",
            BaseSymbol::OneThousandTwentyFourth => "1024",
        }
    }

    pub fn from_token(token: &str) -> Option<BaseSymbol> {
        BaseSymbol::ALL.iter().copied().find(|b| b.token() == token)
    }

    /// Undotted tick value of one unit of this base.
    pub fn ticks(self) -> u64 {
        // DoubleWhole = 8 quarters, each step halves.
        (QUARTER_TICKS * 8) >> (self as u32)
    }

    /// Number of flags (or beams) this value carries when it has a stem.
    pub fn flag_count(self) -> u8 {
        match self {
            BaseSymbol::DoubleWhole
            | BaseSymbol::Whole
            | BaseSymbol::Half
            | BaseSymbol::Quarter => 0,
            other => other as u8 - BaseSymbol::Quarter as u8,
        }
    }

    pub fn has_stem(self) -> bool {
        self >= BaseSymbol::Half
    }

    pub fn is_filled(self) -> bool {
        self >= BaseSymbol::Quarter
    }
}

/// A symbolic duration, optionally resolved to ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub multiplier: u32,
    pub base: BaseSymbol,
    pub dots: u8,
    resolved_ticks: Option<u64>,
}

impl Duration {
    pub fn new(multiplier: u32, base: BaseSymbol, dots: u8) -> Self {
        Self { multiplier, base, dots, resolved_ticks: None }
    }

    pub fn resolved_ticks(&self) -> Option<u64> {
        self.resolved_ticks
    }

    /// Record the resolved tick count. Succeeds once per duration.
    pub fn set_resolved(&mut self, ticks: u64) -> Result<(), DurationError> {
        if let Some(prev) = self.resolved_ticks {
            return Err(DurationError::Resolution(format!(
                "duration {self} already resolved to {prev} ticks"
            )));
        }
        self.resolved_ticks = Some(ticks);
        Ok(())
    }

    /// Resolved ticks if available, otherwise the basic value.
    pub fn ticks(&self) -> u64 {
        self.resolved_ticks.unwrap_or_else(|| basic_ticks(self))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiplier != 1 {
            write!(f, "{}", self.multiplier)?;
        }
        write!(f, "/{}", self.base.token())?;
        for _ in 0..self.dots {
            f.write_str("d")?;
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration_token(s)
    }
}

/// Parse a `[multiplier]/base[d...]` token.
pub fn parse_duration_token(text: &str) -> Result<Duration, DurationError> {
    let text = text.trim();
    let (mult_part, rest) = text
        .split_once('/')
        .ok_or_else(|| DurationError::Syntax(format!("'{text}' has no '/'")))?;

    let multiplier = if mult_part.is_empty() {
        1
    } else {
        mult_part
            .parse::<u32>()
            .map_err(|_| DurationError::Syntax(format!("bad multiplier '{mult_part}' in '{text}'")))?
    };
    if multiplier == 0 {
        return Err(DurationError::Syntax(format!("zero multiplier in '{text}'")));
    }

    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let (base_str, dot_str) = rest.split_at(digits_end);
    let base = BaseSymbol::from_token(base_str)
        .ok_or_else(|| DurationError::Syntax(format!("unknown base symbol '{base_str}' in '{text}'")))?;

    if !dot_str.chars().all(|c| c == 'd') {
        return Err(DurationError::Syntax(format!("unexpected '{dot_str}' after base in '{text}'")));
    }
    let dots = u8::try_from(dot_str.len())
        .map_err(|_| DurationError::Syntax(format!("too many dots in '{text}'")))?;

    Ok(Duration::new(multiplier, base, dots))
}

/// Tick value before any tuplet scaling: base × multiplier × (2 − 2^−dots).
pub fn basic_ticks(duration: &Duration) -> u64 {
    let base = duration.base.ticks() * u64::from(duration.multiplier);
    let dots = u32::from(duration.dots.min(16));
    // base * (2^(d+1) - 1) / 2^d
    (base * ((1u64 << (dots + 1)) - 1)) >> dots
}

/// Divide `outer_ticks` among children proportionally to their relative
/// sizes. The last child absorbs any rounding shortfall.
pub fn resolve_tuplet_ticks(outer_ticks: u64, sizes: &[u64]) -> Result<Vec<u64>, DurationError> {
    if sizes.is_empty() {
        return Err(DurationError::Resolution("tuplet has no duration-bearing children".into()));
    }
    let total: u128 = sizes.iter().map(|&s| u128::from(s)).sum();
    if total == 0 {
        return Err(DurationError::Resolution("tuplet children have zero total size".into()));
    }

    let mut spans = Vec::with_capacity(sizes.len());
    let mut cumulative: u128 = 0;
    let mut prev_pos: i128 = 0;
    for &size in &sizes[..sizes.len() - 1] {
        cumulative += u128::from(size);
        let pos = (cumulative * u128::from(outer_ticks) / total) as i128;
        let span = pos - prev_pos;
        if span < 0 {
            return Err(DurationError::Resolution(format!(
                "negative span {span} while dividing {outer_ticks} ticks"
            )));
        }
        spans.push(span as u64);
        prev_pos = pos;
    }

    let used: u64 = spans.iter().sum();
    let last = outer_ticks.checked_sub(used).ok_or_else(|| {
        DurationError::Resolution(format!("children overran {outer_ticks} ticks by {}", used - outer_ticks))
    })?;
    spans.push(last);
    Ok(spans)
}
