//! Horizontal spacing, system breaking and page layout.
//!
//! Widths here are in gap units until a system is placed on the page.

use log::debug;

use crate::config::EngraveConfig;
use crate::duration::QUARTER_TICKS;

use super::constants::*;
use super::geometry::{Glyph, PageGeometry, SystemGeometry};
use super::moments::Moment;

// ═══════════════════════════════════════════════════════════════════════
// Moment spacing
// ═══════════════════════════════════════════════════════════════════════

/// Distance between consecutive moment anchors: the duration-driven ideal
/// (square-root damped), never less than what keeps the two moments'
/// extents half a gap apart.
pub(super) fn moment_distances(moments: &[Moment]) -> Vec<f64> {
    moments
        .windows(2)
        .map(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            let min = a.right_extent + MIN_MOMENT_PADDING - b.left_extent;
            let ideal = if a.has_duration() {
                let quarters = b.tick.saturating_sub(a.tick) as f64 / QUARTER_TICKS as f64;
                QUARTER_SPACING * quarters.sqrt()
            } else {
                0.0
            };
            min.max(ideal)
        })
        .collect()
}

/// Width from the first moment's left edge to the last moment's right edge.
pub(super) fn natural_width(moments: &[Moment], distances: &[f64]) -> f64 {
    match (moments.first(), moments.last()) {
        (Some(first), Some(last)) => last.right_extent - first.left_extent + distances.iter().sum::<f64>(),
        _ => 0.0,
    }
}

/// Scale the distances so the moments exactly fill `available`. Without
/// `stretch` a system that already fits is left alone.
pub(super) fn justify(moments: &[Moment], distances: Vec<f64>, available: f64, stretch: bool) -> Vec<f64> {
    let total: f64 = distances.iter().sum();
    let natural = natural_width(moments, &distances);
    if total <= 0.0 || (natural <= available && !stretch) {
        return distances;
    }
    let fixed = natural - total;
    let factor = ((available - fixed) / total).max(0.0);
    debug!("justify: natural {natural:.2}, available {available:.2}, factor {factor:.3}");
    distances.into_iter().map(|d| d * factor).collect()
}

// ═══════════════════════════════════════════════════════════════════════
// System breaking
// ═══════════════════════════════════════════════════════════════════════

/// Group measures into systems; returns inclusive (first, last) index
/// pairs. `widths` are natural measure widths, `prefixes` the width of
/// the clef/key(/time) prefix a system starting at that measure needs.
/// A non-empty `starts` list (1-based measure numbers) decides on its own.
pub(super) fn break_systems(
    widths: &[f64],
    prefixes: &[f64],
    numbers: &[u32],
    starts: &[u32],
    available: f64,
) -> Vec<(usize, usize)> {
    let n = widths.len();
    if n == 0 {
        return Vec::new();
    }
    let mut systems = Vec::new();
    let mut first = 0;

    if !starts.is_empty() {
        for i in 1..n {
            if starts.contains(&numbers[i]) {
                systems.push((first, i - 1));
                first = i;
            }
        }
        systems.push((first, n - 1));
        debug!("configured system starts give {} systems", systems.len());
        return systems;
    }

    let mut width = prefixes[0];
    for i in 0..n {
        if i > first && width + widths[i] > available {
            debug!("system break before measure {} (width {width:.2} of {available:.2})", numbers[i]);
            systems.push((first, i - 1));
            first = i;
            width = prefixes[i];
        }
        width += widths[i];
    }
    systems.push((first, n - 1));
    systems
}

// ═══════════════════════════════════════════════════════════════════════
// Pages
// ═══════════════════════════════════════════════════════════════════════

/// Stack systems down the page, `min_system_gap` apart, starting a new
/// page when a system would cross the bottom margin. Systems arrive with
/// their first staff's top line at y = 0.
pub(super) fn paginate(systems: Vec<SystemGeometry>, header: Vec<Glyph>, config: &EngraveConfig) -> Vec<PageGeometry> {
    let gap = config.gap_size;
    let bottom_limit = config.page_height - config.margin_bottom;
    let new_page = |index: usize, header: Vec<Glyph>| PageGeometry {
        index,
        width: config.page_width,
        height: config.page_height,
        header,
        systems: Vec::new(),
    };

    let mut cursor = config.margin_top + if header.is_empty() { 0.0 } else { HEADER_HEIGHT * gap };
    let mut page = new_page(0, header);
    let mut pages = Vec::new();

    for mut system in systems {
        let staves_bottom = system.staves.iter().map(|s| s.y + STAFF_HEIGHT * gap).fold(0.0, f64::max);
        let (above, below) = match system.bounds() {
            Some(b) => ((-b.y).max(0.0), b.bottom().max(staves_bottom)),
            None => (0.0, staves_bottom),
        };
        let mut top = cursor + above;
        if top + below > bottom_limit && !page.systems.is_empty() {
            debug!("page break before system {}", system.index);
            let index = page.index + 1;
            pages.push(std::mem::replace(&mut page, new_page(index, Vec::new())));
            cursor = config.margin_top;
            top = cursor + above;
        }
        system.translate(0.0, top);
        cursor = top + below + config.min_system_gap;
        page.systems.push(system);
    }
    pages.push(page);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engraver::geometry::{GlyphClass, Point, StaffGeometry};
    use crate::engraver::moments::{MomentSymbol, SymbolCategory};
    use pretty_assertions::assert_eq;

    fn moment(tick: u64, left: f64, right: f64) -> Moment {
        let mut m = Moment::new(tick, 0.0);
        m.add(MomentSymbol::new(SymbolCategory::Duration, left, right, 0));
        m.align();
        m
    }

    #[test]
    fn distances_take_the_larger_of_ideal_and_extents() {
        let moments = vec![moment(0, 0.0, 1.2), moment(768, 0.0, 1.2), moment(960, 3.0, 1.2)];
        let d = moment_distances(&moments);
        // a quarter apart: the ideal
        assert_eq!(d[0], QUARTER_SPACING);
        // a sixteenth apart with a wide accidental on the right: the extents
        assert_eq!(d[1], 1.2 + MIN_MOMENT_PADDING + 3.0);
    }

    #[test]
    fn justification_stretches_and_compresses() {
        let moments = vec![moment(0, 0.0, 1.0), moment(768, 0.0, 1.0)];
        let d = moment_distances(&moments);
        let natural = natural_width(&moments, &d);
        let stretched = justify(&moments, d.clone(), natural * 2.0, true);
        assert!((natural_width(&moments, &stretched) - natural * 2.0).abs() < 1e-9);
        // the last system is not stretched...
        assert_eq!(justify(&moments, d.clone(), natural * 2.0, false), d);
        // ...but is compressed when it does not fit
        let squeezed = justify(&moments, d.clone(), natural - 1.0, false);
        assert!((natural_width(&moments, &squeezed) - (natural - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn greedy_breaks() {
        let widths = [10.0, 10.0, 10.0, 10.0, 10.0];
        let prefixes = [8.0, 5.0, 5.0, 5.0, 5.0];
        let numbers = [1, 2, 3, 4, 5];
        assert_eq!(break_systems(&widths, &prefixes, &numbers, &[], 30.0), vec![(0, 1), (2, 3), (4, 4)]);
        // an oversized measure still gets a system of its own
        assert_eq!(break_systems(&[50.0, 5.0], &[5.0, 5.0], &[1, 2], &[], 30.0), vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn configured_breaks_win() {
        let widths = [10.0; 5];
        let prefixes = [5.0; 5];
        let numbers = [1, 2, 3, 4, 5];
        assert_eq!(break_systems(&widths, &prefixes, &numbers, &[1, 4], 1000.0), vec![(0, 2), (3, 4)]);
    }

    fn system(index: usize) -> SystemGeometry {
        SystemGeometry {
            index,
            first_measure: 1,
            last_measure: 1,
            y: 0.0,
            left_limit: 0.0,
            right_limit: 100.0,
            staves: vec![StaffGeometry { part_id: "P1".into(), y: 0.0, x_start: 0.0, x_end: 100.0 }],
            moments: Vec::new(),
            glyphs: vec![Glyph::line(GlyphClass::StaffLine, Point::new(0.0, 20.0), Point::new(100.0, 20.0), 1.0)],
        }
    }

    #[test]
    fn systems_flow_onto_new_pages() {
        let config = EngraveConfig { page_height: 400.0, ..EngraveConfig::default() };
        let pages = paginate((0..4).map(system).collect(), Vec::new(), &config);
        // each system takes 40 + 90 = 130 units; 30 + 130 + 130 + 40 fits, a fourth does not
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].systems.len(), 3);
        assert_eq!(pages[0].systems[1].y, config.margin_top + 40.0 + config.min_system_gap);
        assert_eq!(pages[1].systems[0].y, config.margin_top);
        assert_eq!(pages[1].index, 1);
    }
}
