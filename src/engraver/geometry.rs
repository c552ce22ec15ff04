//! Positioned output geometry.
//!
//! Everything here is in page units (the configured gap size converts gap
//! units to page units), with the origin at the top-left corner of the
//! page and y growing downward. The types serialize with serde so a
//! renderer in any language can consume them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box; `x`,`y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest box containing every point; empty input gives a zero box.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else { return Self::default() };
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in iter {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }

    /// Overlap test; touching edges do not count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }
}

/// One drawing command of a glyph outline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PathSegment {
    Move { to: Point },
    Line { to: Point },
    Cubic { c1: Point, c2: Point, to: Point },
    Close,
}

impl PathSegment {
    fn translate(&mut self, dx: f64, dy: f64) {
        let shift = |p: &mut Point| {
            p.x += dx;
            p.y += dy;
        };
        match self {
            PathSegment::Move { to } | PathSegment::Line { to } => shift(to),
            PathSegment::Cubic { c1, c2, to } => {
                shift(c1);
                shift(c2);
                shift(to);
            }
            PathSegment::Close => {}
        }
    }

    fn points(&self) -> Vec<Point> {
        match *self {
            PathSegment::Move { to } | PathSegment::Line { to } => vec![to],
            PathSegment::Cubic { c1, c2, to } => vec![c1, c2, to],
            PathSegment::Close => Vec::new(),
        }
    }
}

/// Class tag attached to every glyph, serialized in kebab-case so it can
/// double as a CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlyphClass {
    StaffLine,
    LedgerLine,
    Clef,
    KeySignature,
    TimeSignature,
    Barline,
    Repeat,
    Notehead,
    Accidental,
    Dot,
    Stem,
    Flag,
    Rest,
    Beam,
    BeamHook,
    GraceSlash,
    Articulation,
    Tie,
    Slur,
    TupletNumber,
    Dynamic,
    Words,
    Tempo,
    Title,
    Composer,
}

/// A positioned drawing element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub class: GlyphClass,
    /// Anchor point: a head centre, a line start, a text baseline origin
    pub origin: Point,
    pub bbox: BoundingBox,
    /// Outline for shapes that are computed rather than looked up
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Font symbol name for glyphs drawn from a music font
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Id of the event this glyph belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Glyph {
    pub fn new(class: GlyphClass, origin: Point, bbox: BoundingBox) -> Self {
        Self { class, origin, bbox, path: Vec::new(), symbol: None, text: None, event: None }
    }

    /// A glyph whose box is derived from its outline.
    pub fn from_path(class: GlyphClass, path: Vec<PathSegment>) -> Self {
        let points: Vec<Point> = path.iter().flat_map(PathSegment::points).collect();
        let bbox = BoundingBox::from_points(&points);
        let origin = points.first().copied().unwrap_or_default();
        Self { class, origin, bbox, path, symbol: None, text: None, event: None }
    }

    /// A straight stroke from `a` to `b` with the given width.
    pub fn line(class: GlyphClass, a: Point, b: Point, width: f64) -> Self {
        let mut glyph = Glyph::from_path(class, vec![PathSegment::Move { to: a }, PathSegment::Line { to: b }]);
        let half = width / 2.0;
        if (a.y - b.y).abs() < f64::EPSILON {
            glyph.bbox.y -= half;
            glyph.bbox.height += width;
        } else {
            glyph.bbox.x -= half;
            glyph.bbox.width += width;
        }
        glyph
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.origin.x += dx;
        self.origin.y += dy;
        self.bbox.translate(dx, dy);
        for seg in &mut self.path {
            seg.translate(dx, dy);
        }
    }
}

/// Vertical placement of one part's staff inside a system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffGeometry {
    pub part_id: String,
    /// y of the top staffline
    pub y: f64,
    pub x_start: f64,
    pub x_end: f64,
}

/// Where a moment landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentGeometry {
    pub tick: u64,
    pub time_ms: f64,
    /// The duration anchor of the moment
    pub x: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemGeometry {
    pub index: usize,
    pub first_measure: u32,
    pub last_measure: u32,
    /// y of the first staff's top line
    pub y: f64,
    /// End of the clef/key prefix; curves continued from the previous system start here
    pub left_limit: f64,
    pub right_limit: f64,
    pub staves: Vec<StaffGeometry>,
    pub moments: Vec<MomentGeometry>,
    pub glyphs: Vec<Glyph>,
}

impl SystemGeometry {
    /// Box around every glyph of the system.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.glyphs.iter().map(|g| g.bbox).reduce(|a, b| a.union(&b))
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.y += dy;
        self.left_limit += dx;
        self.right_limit += dx;
        for staff in &mut self.staves {
            staff.y += dy;
            staff.x_start += dx;
            staff.x_end += dx;
        }
        for moment in &mut self.moments {
            moment.x += dx;
        }
        for glyph in &mut self.glyphs {
            glyph.translate(dx, dy);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub index: usize,
    pub width: f64,
    pub height: f64,
    /// Title and composer on the first page
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<Glyph>,
    pub systems: Vec<SystemGeometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngravedScore {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub total_duration_ms: f64,
    pub pages: Vec<PageGeometry>,
}

impl EngravedScore {
    pub fn systems(&self) -> impl Iterator<Item = &SystemGeometry> {
        self.pages.iter().flat_map(|p| p.systems.iter())
    }
}
