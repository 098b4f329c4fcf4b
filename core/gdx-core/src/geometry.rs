//! Geometry — 피처 형상과 공간 관계 연산
//!
//! Planar geometries (point, polyline, polygon, envelope) plus the spatial
//! predicates used by query filters. Relationships are evaluated through a
//! DE-9IM matrix built from sample points: vertices, crossing points, midpoints
//! of sub-segments split at every crossing, and points offset just inside
//! polygon rings. This is exact for the predicates the filter layer exposes
//! on non-degenerate input.

use crate::error::{GdxError, GdxResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            (other.x - self.x).mul_add(t, self.x),
            (other.y - self.y).mul_add(t, self.y),
        )
    }

    fn approx_eq(self, other: Self) -> bool {
        (self.x - other.x).abs() <= f64::EPSILON * 16.0 && (self.y - other.y).abs() <= f64::EPSILON * 16.0
    }
}

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    #[must_use]
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    #[must_use]
    pub fn of_points(points: &[Point]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Self::new(first.x, first.y, first.x, first.y);
        for p in points.iter().skip(1) {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        Some(bounds)
    }

    #[must_use]
    pub const fn contains_point(self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    #[must_use]
    pub fn width(self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(self) -> f64 {
        self.max_y - self.min_y
    }

    fn ring(self) -> Vec<Point> {
        vec![
            Point::new(self.min_x, self.min_y),
            Point::new(self.max_x, self.min_y),
            Point::new(self.max_x, self.max_y),
            Point::new(self.min_x, self.max_y),
        ]
    }
}

/// Shape type a feature class declares for its shape field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    Polyline,
    Polygon,
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryType::Point => write!(f, "Point"),
            GeometryType::Polyline => write!(f, "Polyline"),
            GeometryType::Polygon => write!(f, "Polygon"),
        }
    }
}

/// A single-part planar geometry.
///
/// Polygon rings are stored without a repeated closing vertex; the closing
/// edge is implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    Polyline(Vec<Point>),
    Polygon(Vec<Point>),
    Envelope(Envelope),
}

/// Spatial relationship between a feature shape and a filter geometry.
///
/// Relations read "feature <relation> filter geometry": `Within` selects
/// features inside the filter geometry, `Contains` selects features that
/// enclose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialRelationship {
    Intersects,
    EnvelopeIntersects,
    Within,
    Contains,
    Crosses,
    Touches,
    /// DE-9IM pattern such as `"T*F**F***"`.
    Relation(String),
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Point::new(x, y))
    }

    pub fn polyline(coords: &[(f64, f64)]) -> Self {
        Geometry::Polyline(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    /// Builds a polygon ring; a trailing vertex equal to the first is dropped.
    pub fn polygon(coords: &[(f64, f64)]) -> Self {
        let mut ring: Vec<Point> = coords.iter().map(|&(x, y)| Point::new(x, y)).collect();
        if ring.len() > 1 && ring[0] == ring[ring.len() - 1] {
            ring.pop();
        }
        Geometry::Polygon(ring)
    }

    pub fn envelope(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Geometry::Envelope(Envelope::new(x1, y1, x2, y2))
    }

    /// Shape type this geometry satisfies; envelopes count as polygons.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Polyline(_) => GeometryType::Polyline,
            Geometry::Polygon(_) | Geometry::Envelope(_) => GeometryType::Polygon,
        }
    }

    pub fn dimension(&self) -> u8 {
        match self.geometry_type() {
            GeometryType::Point => 0,
            GeometryType::Polyline => 1,
            GeometryType::Polygon => 2,
        }
    }

    pub fn validate(&self) -> GdxResult<()> {
        let ok = match self {
            Geometry::Point(p) => p.x.is_finite() && p.y.is_finite(),
            Geometry::Polyline(path) => path.len() >= 2 && finite(path),
            Geometry::Polygon(ring) => ring.len() >= 3 && finite(ring),
            Geometry::Envelope(e) => e.width() >= 0.0 && e.height() >= 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(GdxError::Validation(format!(
                "invalid {} geometry",
                self.geometry_type()
            )))
        }
    }

    pub fn extent(&self) -> Envelope {
        match self {
            Geometry::Point(p) => Envelope::new(p.x, p.y, p.x, p.y),
            Geometry::Polyline(pts) | Geometry::Polygon(pts) => {
                Envelope::of_points(pts).unwrap_or(Envelope::new(0.0, 0.0, 0.0, 0.0))
            }
            Geometry::Envelope(e) => *e,
        }
    }

    /// Well-known text, used when exporting shapes to Arrow.
    pub fn to_wkt(&self) -> String {
        fn coords(pts: &[Point]) -> String {
            pts.iter()
                .map(|p| format!("{} {}", p.x, p.y))
                .collect::<Vec<_>>()
                .join(", ")
        }
        match self {
            Geometry::Point(p) => format!("POINT ({} {})", p.x, p.y),
            Geometry::Polyline(path) => format!("LINESTRING ({})", coords(path)),
            Geometry::Polygon(_) | Geometry::Envelope(_) => {
                let mut ring = self.ring();
                if let Some(first) = ring.first().copied() {
                    ring.push(first);
                }
                format!("POLYGON (({}))", coords(&ring))
            }
        }
    }

    // ════════════════════════════════════════════
    // Spatial predicates
    // ════════════════════════════════════════════

    pub fn intersects(&self, other: &Geometry) -> bool {
        if !self.extent().intersects(other.extent()) {
            return false;
        }
        let m = self.relate_matrix(other);
        m.get(INTERIOR, INTERIOR).is_some()
            || m.get(INTERIOR, BOUNDARY).is_some()
            || m.get(BOUNDARY, INTERIOR).is_some()
            || m.get(BOUNDARY, BOUNDARY).is_some()
    }

    pub fn within(&self, other: &Geometry) -> bool {
        if !self.extent().intersects(other.extent()) {
            return false;
        }
        let m = self.relate_matrix(other);
        m.get(INTERIOR, INTERIOR).is_some()
            && m.get(INTERIOR, EXTERIOR).is_none()
            && m.get(BOUNDARY, EXTERIOR).is_none()
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        other.within(self)
    }

    pub fn touches(&self, other: &Geometry) -> bool {
        if !self.extent().intersects(other.extent()) {
            return false;
        }
        let m = self.relate_matrix(other);
        m.get(INTERIOR, INTERIOR).is_none()
            && (m.get(INTERIOR, BOUNDARY).is_some()
                || m.get(BOUNDARY, INTERIOR).is_some()
                || m.get(BOUNDARY, BOUNDARY).is_some())
    }

    pub fn crosses(&self, other: &Geometry) -> bool {
        if !self.extent().intersects(other.extent()) {
            return false;
        }
        let m = self.relate_matrix(other);
        let (da, db) = (self.dimension(), other.dimension());
        if da < db {
            m.get(INTERIOR, INTERIOR).is_some() && m.get(INTERIOR, EXTERIOR).is_some()
        } else if da > db {
            m.get(INTERIOR, INTERIOR).is_some() && m.get(EXTERIOR, INTERIOR).is_some()
        } else if da == 1 {
            m.get(INTERIOR, INTERIOR) == Some(0)
        } else {
            false
        }
    }

    /// Tests a DE-9IM pattern (`T`, `F`, `*`, `0`, `1`, `2`).
    pub fn relate(&self, other: &Geometry, pattern: &str) -> GdxResult<bool> {
        let pattern: Vec<char> = pattern.chars().collect();
        if pattern.len() != 9 {
            return Err(GdxError::Validation(format!(
                "relation pattern must have 9 characters, got {}",
                pattern.len()
            )));
        }
        let m = self.relate_matrix(other);
        for (idx, ch) in pattern.iter().enumerate() {
            let cell = m.cells[idx];
            let ok = match ch.to_ascii_uppercase() {
                '*' => true,
                'T' => cell.is_some(),
                'F' => cell.is_none(),
                '0' => cell == Some(0),
                '1' => cell == Some(1),
                '2' => cell == Some(2),
                other => {
                    return Err(GdxError::Validation(format!(
                        "invalid relation pattern character '{}'",
                        other
                    )));
                }
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn satisfies(&self, filter: &Geometry, relationship: &SpatialRelationship) -> GdxResult<bool> {
        Ok(match relationship {
            SpatialRelationship::Intersects => self.intersects(filter),
            SpatialRelationship::EnvelopeIntersects => self.extent().intersects(filter.extent()),
            SpatialRelationship::Within => self.within(filter),
            SpatialRelationship::Contains => self.contains(filter),
            SpatialRelationship::Crosses => self.crosses(filter),
            SpatialRelationship::Touches => self.touches(filter),
            SpatialRelationship::Relation(pattern) => self.relate(filter, pattern)?,
        })
    }

    /// DE-9IM matrix of `self` against `other`.
    pub fn relate_matrix(&self, other: &Geometry) -> IntersectionMatrix {
        let a = Shape::from(self);
        let b = Shape::from(other);
        let mut matrix = IntersectionMatrix::default();
        matrix.set(EXTERIOR, EXTERIOR, 2);

        let scale = self.extent().width().max(self.extent().height())
            .max(other.extent().width().max(other.extent().height()))
            .max(1.0);
        let offset = scale * 1e-7;

        let mut samples = Vec::new();
        a.samples(&b, offset, &mut samples);
        b.samples(&a, offset, &mut samples);
        for (pa, pb) in crossing_points(&a, &b) {
            samples.push(Sample { point: pa, dim: 0 });
            samples.push(Sample { point: pb, dim: 0 });
        }

        for sample in samples {
            let la = a.locate(sample.point);
            let lb = b.locate(sample.point);
            let cap = a.part_dimension(la).min(b.part_dimension(lb));
            matrix.raise(la, lb, sample.dim.min(cap));
        }
        matrix
    }

    fn ring(&self) -> Vec<Point> {
        match self {
            Geometry::Polygon(ring) => ring.clone(),
            Geometry::Envelope(e) => e.ring(),
            Geometry::Point(p) => vec![*p],
            Geometry::Polyline(path) => path.clone(),
        }
    }
}

fn finite(points: &[Point]) -> bool {
    points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
}

// ════════════════════════════════════════════
// DE-9IM machinery
// ════════════════════════════════════════════

const INTERIOR: usize = 0;
const BOUNDARY: usize = 1;
const EXTERIOR: usize = 2;

/// Row-major 3x3 matrix; `None` is an empty intersection, `Some(d)` its dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntersectionMatrix {
    cells: [Option<u8>; 9],
}

impl IntersectionMatrix {
    fn get(&self, a: usize, b: usize) -> Option<u8> {
        self.cells[a * 3 + b]
    }

    fn set(&mut self, a: usize, b: usize, dim: u8) {
        self.cells[a * 3 + b] = Some(dim);
    }

    fn raise(&mut self, a: usize, b: usize, dim: u8) {
        let cell = &mut self.cells[a * 3 + b];
        *cell = Some(cell.map_or(dim, |d| d.max(dim)));
    }
}

impl fmt::Display for IntersectionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in self.cells {
            match cell {
                None => write!(f, "F")?,
                Some(d) => write!(f, "{}", d)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    point: Point,
    dim: u8,
}

/// Normalized view of a geometry for location tests.
enum Shape {
    Point(Point),
    Path { points: Vec<Point>, closed: bool },
    Area(Vec<Point>),
}

impl From<&Geometry> for Shape {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point(p) => Shape::Point(*p),
            Geometry::Polyline(path) => {
                let closed = path.len() > 2 && path[0].approx_eq(path[path.len() - 1]);
                Shape::Path {
                    points: path.clone(),
                    closed,
                }
            }
            Geometry::Polygon(_) | Geometry::Envelope(_) => Shape::Area(geometry.ring()),
        }
    }
}

impl Shape {
    fn segments(&self) -> Vec<(Point, Point)> {
        match self {
            Shape::Point(_) => Vec::new(),
            Shape::Path { points, .. } => points.windows(2).map(|w| (w[0], w[1])).collect(),
            Shape::Area(ring) => (0..ring.len())
                .map(|i| (ring[i], ring[(i + 1) % ring.len()]))
                .collect(),
        }
    }

    fn vertices(&self) -> Vec<Point> {
        match self {
            Shape::Point(p) => vec![*p],
            Shape::Path { points, .. } => points.clone(),
            Shape::Area(ring) => ring.clone(),
        }
    }

    fn part_dimension(&self, location: usize) -> u8 {
        match (self, location) {
            (_, EXTERIOR) => 2,
            (Shape::Point(_), _) => 0,
            (Shape::Path { .. }, INTERIOR) => 1,
            (Shape::Path { .. }, _) => 0,
            (Shape::Area(_), INTERIOR) => 2,
            (Shape::Area(_), _) => 1,
        }
    }

    fn locate(&self, p: Point) -> usize {
        match self {
            Shape::Point(q) => {
                if q.approx_eq(p) {
                    INTERIOR
                } else {
                    EXTERIOR
                }
            }
            Shape::Path { points, closed } => {
                if !closed {
                    let first = points[0];
                    let last = points[points.len() - 1];
                    if first.approx_eq(p) || last.approx_eq(p) {
                        return BOUNDARY;
                    }
                }
                if self
                    .segments()
                    .iter()
                    .any(|&(s, e)| point_on_segment(s, e, p))
                {
                    INTERIOR
                } else {
                    EXTERIOR
                }
            }
            Shape::Area(ring) => {
                if self
                    .segments()
                    .iter()
                    .any(|&(s, e)| point_on_segment(s, e, p))
                {
                    BOUNDARY
                } else if ring_contains(ring, p) {
                    INTERIOR
                } else {
                    EXTERIOR
                }
            }
        }
    }

    /// Pushes representative points of this shape's interior and boundary,
    /// split against `other` so every part on either side of a crossing is seen.
    fn samples(&self, other: &Shape, offset: f64, out: &mut Vec<Sample>) {
        for v in self.vertices() {
            out.push(Sample { point: v, dim: 0 });
        }
        let other_segments = other.segments();
        let other_vertices = other.vertices();
        for (s, e) in self.segments() {
            let mut cuts = vec![0.0, 1.0];
            for &(os, oe) in &other_segments {
                if let Some(t) = segment_intersection_param(s, e, os, oe) {
                    cuts.push(t);
                }
            }
            for &q in &other_vertices {
                if point_on_segment(s, e, q) {
                    cuts.push(param_of(s, e, q));
                }
            }
            cuts.sort_by(|a, b| a.total_cmp(b));
            cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
            for pair in cuts.windows(2) {
                let mid = s.lerp(e, (pair[0] + pair[1]) * 0.5);
                out.push(Sample { point: mid, dim: 1 });
                if let Shape::Area(ring) = self {
                    // Nudge the midpoint to whichever side of the edge is inside.
                    let (dx, dy) = (e.x - s.x, e.y - s.y);
                    let len = dx.hypot(dy);
                    if len > 0.0 {
                        let (nx, ny) = (-dy / len * offset, dx / len * offset);
                        for candidate in [
                            Point::new(mid.x + nx, mid.y + ny),
                            Point::new(mid.x - nx, mid.y - ny),
                        ] {
                            if ring_contains(ring, candidate) {
                                out.push(Sample {
                                    point: candidate,
                                    dim: 2,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}

fn crossing_points(a: &Shape, b: &Shape) -> Vec<(Point, Point)> {
    let mut out = Vec::new();
    for (s, e) in a.segments() {
        for (os, oe) in b.segments() {
            if let Some(t) = segment_intersection_param(s, e, os, oe) {
                let p = s.lerp(e, t);
                out.push((p, p));
            }
        }
    }
    out
}

/// Parameter along `a_start..a_end` of a proper (non-collinear) crossing.
fn segment_intersection_param(a_start: Point, a_end: Point, b_start: Point, b_end: Point) -> Option<f64> {
    let r = (a_end.x - a_start.x, a_end.y - a_start.y);
    let s = (b_end.x - b_start.x, b_end.y - b_start.y);
    let denom = r.0.mul_add(s.1, -(r.1 * s.0));
    if denom.abs() <= f64::EPSILON {
        return None;
    }
    let q = (b_start.x - a_start.x, b_start.y - a_start.y);
    let t = q.0.mul_add(s.1, -(q.1 * s.0)) / denom;
    let u = q.0.mul_add(r.1, -(q.1 * r.0)) / denom;
    let tol = 1e-12;
    if (-tol..=1.0 + tol).contains(&t) && (-tol..=1.0 + tol).contains(&u) {
        Some(t.clamp(0.0, 1.0))
    } else {
        None
    }
}

fn param_of(start: Point, end: Point, p: Point) -> f64 {
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let len2 = dx.mul_add(dx, dy * dy);
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - start.x).mul_add(dx, (p.y - start.y) * dy) / len2).clamp(0.0, 1.0)
}

fn ring_contains(ring: &[Point], point: Point) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut previous = ring[ring.len() - 1];
    for &current in ring {
        let crosses_scanline = (current.y > point.y) != (previous.y > point.y);
        if crosses_scanline {
            let intersection_x = ((previous.x - current.x) * (point.y - current.y)
                / (previous.y - current.y))
                + current.x;
            if point.x < intersection_x {
                inside = !inside;
            }
        }
        previous = current;
    }
    inside
}

fn orientation(start: Point, end: Point, probe: Point) -> i8 {
    let cross =
        (end.y - start.y).mul_add(probe.x - end.x, -((end.x - start.x) * (probe.y - end.y)));
    let scale = (end.x - start.x).abs().max((end.y - start.y).abs()).max(1.0);
    if cross > f64::EPSILON * scale * 16.0 {
        1
    } else if cross < -f64::EPSILON * scale * 16.0 {
        -1
    } else {
        0
    }
}

fn point_on_segment(start: Point, end: Point, point: Point) -> bool {
    if orientation(start, end, point) != 0 {
        return false;
    }
    point.x >= start.x.min(end.x)
        && point.x <= start.x.max(end.x)
        && point.y >= start.y.min(end.y)
        && point.y <= start.y.max(end.y)
}
