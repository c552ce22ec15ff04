//! Vertical alignment of simultaneous symbols.
//!
//! Every distinct absolute tick of a system is one moment. Inside a moment
//! the symbols sort into category blocks with a fixed left-to-right order:
//! repeat, time signature, key signature, barline, clef, grace, duration.
//! Duration symbols (chords and rests) hang on the moment's anchor at
//! x = 0; each other block sits left of its right-hand neighbour with a
//! padding looked up by category pair. Offsets are in gap units.

use super::constants::COLUMN_PADDING;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) enum SymbolCategory {
    Repeat,
    TimeSignature,
    KeySignature,
    Barline,
    Clef,
    Grace,
    Duration,
}

impl SymbolCategory {
    /// Right-to-left placement order of the non-duration blocks.
    const BLOCKS_RIGHT_TO_LEFT: [SymbolCategory; 6] = [
        SymbolCategory::Grace,
        SymbolCategory::Clef,
        SymbolCategory::Barline,
        SymbolCategory::KeySignature,
        SymbolCategory::TimeSignature,
        SymbolCategory::Repeat,
    ];
}

/// Horizontal room between two neighbouring blocks, `left` placed before `right`.
pub(super) fn category_padding(left: SymbolCategory, right: SymbolCategory) -> f64 {
    use SymbolCategory::*;
    match (left, right) {
        (Barline, Duration) => 1.0,
        (KeySignature, Barline) => 0.5,
        (Barline, Clef) => 0.0,
        (Clef | KeySignature | TimeSignature, Duration) => 1.0,
        (Repeat, Duration) => 0.75,
        (Grace, Duration) => 0.3,
        (Barline | Clef, Grace) => 0.6,
        (Repeat, Barline) => 0.25,
        (Repeat, _) => 0.5,
        (TimeSignature, _) => 0.6,
        _ => 0.5,
    }
}

/// One symbol as seen by the aligner: its horizontal extent around its
/// own origin, and a key the caller uses to find it again.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct MomentSymbol {
    pub(super) category: SymbolCategory,
    /// Extent left of the origin (>= 0)
    pub(super) left: f64,
    /// Extent right of the origin (>= 0)
    pub(super) right: f64,
    /// Columns inside a block run right to left; 0 sits next to the block's right neighbour
    pub(super) column: usize,
    pub(super) key: usize,
}

impl MomentSymbol {
    pub(super) fn new(category: SymbolCategory, left: f64, right: f64, key: usize) -> Self {
        Self { category, left, right, column: 0, key }
    }

    pub(super) fn in_column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }
}

#[derive(Debug, Clone)]
pub(super) struct Moment {
    pub(super) tick: u64,
    pub(super) time_ms: f64,
    pub(super) symbols: Vec<MomentSymbol>,
    /// Origin of each symbol relative to the anchor, parallel to `symbols`
    pub(super) offsets: Vec<f64>,
    /// Leftmost extent relative to the anchor (<= 0)
    pub(super) left_extent: f64,
    /// Rightmost extent relative to the anchor (>= 0)
    pub(super) right_extent: f64,
    /// Page x of the anchor, filled in by the layout
    pub(super) alignment_x: f64,
}

impl Moment {
    pub(super) fn new(tick: u64, time_ms: f64) -> Self {
        Self {
            tick,
            time_ms,
            symbols: Vec::new(),
            offsets: Vec::new(),
            left_extent: 0.0,
            right_extent: 0.0,
            alignment_x: 0.0,
        }
    }

    pub(super) fn add(&mut self, symbol: MomentSymbol) {
        self.symbols.push(symbol);
    }

    pub(super) fn has_duration(&self) -> bool {
        self.symbols.iter().any(|s| s.category == SymbolCategory::Duration)
    }

    /// Offset assigned to the symbol registered under `key` in `category`.
    pub(super) fn offset_of(&self, category: SymbolCategory, key: usize) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s.category == category && s.key == key)
            .and_then(|i| self.offsets.get(i).copied())
    }

    /// Right edge of the block of `category`, if present.
    pub(super) fn block_right(&self, category: SymbolCategory) -> Option<f64> {
        self.symbols
            .iter()
            .zip(&self.offsets)
            .filter(|(s, _)| s.category == category)
            .map(|(s, &o)| o + s.right)
            .reduce(f64::max)
    }

    /// Assign every symbol its offset and compute the extents.
    pub(super) fn align(&mut self) {
        self.offsets = vec![0.0; self.symbols.len()];
        let mut left_edge = 0.0_f64;
        let mut right_extent = 0.0_f64;
        let mut neighbour: Option<SymbolCategory> = None;

        if self.has_duration() {
            for s in self.symbols.iter().filter(|s| s.category == SymbolCategory::Duration) {
                left_edge = left_edge.min(-s.left);
                right_extent = right_extent.max(s.right);
            }
            neighbour = Some(SymbolCategory::Duration);
        }

        for category in SymbolCategory::BLOCKS_RIGHT_TO_LEFT {
            let members: Vec<usize> = (0..self.symbols.len())
                .filter(|&i| self.symbols[i].category == category)
                .collect();
            if members.is_empty() {
                continue;
            }
            let columns = members.iter().map(|&i| self.symbols[i].column).max().unwrap_or(0) + 1;
            let mut column_right = match neighbour {
                Some(right) => left_edge - category_padding(category, right),
                // The rightmost block starts at the anchor.
                None => self.block_width(&members),
            };
            let block_right = column_right;
            let mut block_left = column_right;
            for column in 0..columns {
                let in_column: Vec<usize> = members.iter().copied().filter(|&i| self.symbols[i].column == column).collect();
                if in_column.is_empty() {
                    continue;
                }
                let width = in_column
                    .iter()
                    .map(|&i| self.symbols[i].left + self.symbols[i].right)
                    .fold(0.0, f64::max);
                for &i in &in_column {
                    // Right-align within the column.
                    self.offsets[i] = column_right - self.symbols[i].right;
                }
                block_left = column_right - width;
                column_right = block_left - COLUMN_PADDING;
            }
            left_edge = block_left;
            right_extent = right_extent.max(block_right);
            neighbour = Some(category);
        }

        self.left_extent = left_edge.min(0.0);
        self.right_extent = right_extent;
    }

    /// Width of a block laid out in columns.
    fn block_width(&self, members: &[usize]) -> f64 {
        let columns = members.iter().map(|&i| self.symbols[i].column).max().unwrap_or(0) + 1;
        let mut total = 0.0;
        let mut used = 0usize;
        for column in 0..columns {
            let width = members
                .iter()
                .filter(|&&i| self.symbols[i].column == column)
                .map(|&i| self.symbols[i].left + self.symbols[i].right)
                .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))));
            if let Some(w) = width {
                total += w;
                used += 1;
            }
        }
        total + COLUMN_PADDING * used.saturating_sub(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use SymbolCategory::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn duration_symbols_anchor_at_zero() {
        let mut m = Moment::new(0, 0.0);
        m.add(MomentSymbol::new(Duration, 0.0, 1.18, 0));
        m.add(MomentSymbol::new(Duration, 1.2, 1.18, 1)); // with an accidental
        m.align();
        assert_eq!(m.offsets, vec![0.0, 0.0]);
        assert_eq!(m.left_extent, -1.2);
        assert_eq!(m.right_extent, 1.18);
    }

    #[test]
    fn blocks_stack_leftward_in_category_order() {
        let mut m = Moment::new(768, 500.0);
        m.add(MomentSymbol::new(Duration, 0.0, 1.18, 0));
        m.add(MomentSymbol::new(Barline, 0.0, 0.16, 1));
        m.add(MomentSymbol::new(KeySignature, 0.0, 2.0, 2));
        m.add(MomentSymbol::new(Clef, 0.0, 2.6, 3));
        m.add(MomentSymbol::new(Repeat, 0.0, 0.9, 4));
        m.align();

        let clef = m.offset_of(Clef, 3).unwrap();
        let barline = m.offset_of(Barline, 1).unwrap();
        let key = m.offset_of(KeySignature, 2).unwrap();
        let repeat = m.offset_of(Repeat, 4).unwrap();
        // clef ends 1 gap (clef/duration padding) before the anchor
        assert!(close(clef + 2.6, -1.0));
        // barline touches the clef (padding 0)
        assert!(close(barline + 0.16, clef));
        // key ends half a gap before the barline
        assert!(close(key + 2.0, barline - 0.5));
        assert!(repeat + 0.9 < key);
        assert!(close(m.left_extent, repeat));
        assert!(repeat < key && key < barline && barline < clef && clef < 0.0);
    }

    #[test]
    fn barline_before_duration_is_one_gap() {
        let mut m = Moment::new(0, 0.0);
        m.add(MomentSymbol::new(Duration, 0.3, 1.18, 0));
        m.add(MomentSymbol::new(Barline, 0.0, 0.16, 1));
        m.align();
        assert!(close(m.offset_of(Barline, 1).unwrap() + 0.16, -0.3 - 1.0));
    }

    #[test]
    fn lone_final_barline_anchors_at_zero() {
        let mut m = Moment::new(3072, 2000.0);
        m.add(MomentSymbol::new(Barline, 0.0, 1.0, 0));
        m.align();
        assert_eq!(m.offsets, vec![0.0]);
        assert_eq!(m.left_extent, 0.0);
        assert_eq!(m.right_extent, 1.0);
    }

    #[test]
    fn rightmost_block_starts_at_anchor_without_durations() {
        let mut m = Moment::new(0, 0.0);
        m.add(MomentSymbol::new(Barline, 0.0, 0.16, 0));
        m.add(MomentSymbol::new(KeySignature, 0.0, 1.0, 1));
        m.align();
        assert!(close(m.offset_of(Barline, 0).unwrap(), 0.0));
        assert!(close(m.offset_of(KeySignature, 1).unwrap(), -1.5));
    }

    #[test]
    fn grace_columns_run_right_to_left() {
        let mut m = Moment::new(0, 0.0);
        m.add(MomentSymbol::new(Duration, 0.0, 1.18, 0));
        // two graces; column 0 is the one nearest the main chord
        m.add(MomentSymbol::new(Grace, 0.0, 0.8, 1).in_column(1));
        m.add(MomentSymbol::new(Grace, 0.0, 0.8, 2).in_column(0));
        m.align();
        let near = m.offset_of(Grace, 2).unwrap();
        let far = m.offset_of(Grace, 1).unwrap();
        assert!(close(near + 0.8, -0.3));
        assert!(close(far + 0.8, near - COLUMN_PADDING));
    }

    #[test]
    fn block_width_pads_between_used_columns_only() {
        let mut m = Moment::new(0, 0.0);
        m.add(MomentSymbol::new(Grace, 0.2, 0.8, 0).in_column(0));
        m.add(MomentSymbol::new(Grace, 0.0, 0.6, 1).in_column(0));
        // column 1 stays empty
        m.add(MomentSymbol::new(Grace, 0.0, 0.7, 2).in_column(2));
        assert!(close(m.block_width(&[0, 1, 2]), 1.0 + 0.7 + COLUMN_PADDING));
        assert!(close(m.block_width(&[1]), 0.6));
    }

    #[test]
    fn alignment_is_deterministic() {
        let build = || {
            let mut m = Moment::new(0, 0.0);
            m.add(MomentSymbol::new(TimeSignature, 0.0, 1.8, 0));
            m.add(MomentSymbol::new(Duration, 0.5, 1.18, 1));
            m.add(MomentSymbol::new(Clef, 0.0, 2.6, 2));
            m.align();
            (m.offsets.clone(), m.left_extent, m.right_extent)
        };
        assert_eq!(build(), build());
    }
}
