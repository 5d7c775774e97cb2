//! Spherical engine: geometries on the unit sphere.
//!
//! Vertices are carried through unit vectors so longitudes come back wrapped
//! to `[-180, 180]`, and tracks are measured by great-circle arcs. Polygon
//! rings are oriented so the interior lies on the left of the exterior ring,
//! which selects the smaller of the two regions a ring splits the sphere into.
#![expect(
    clippy::float_arithmetic,
    reason = "spherical trigonometry is floating-point throughout"
)]

use geo::{Coord, LineString, MapCoords, Polygon};

use super::wkt::{self, WktStyle};
use super::{EngineKind, Geometry, GeometryEngine};

/// Engine that is correct across the antimeridian and near the poles.
///
/// WKT is written in the compact style with full-precision coordinates, e.g.
/// `POLYGON((0.0 0.0,1.0 0.0,0.9999999999999998 1.0,0.0 1.0,0.0 0.0))`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphericalEngine;

impl GeometryEngine for SphericalEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Spherical
    }

    fn normalize(&self, geometry: Geometry) -> Geometry {
        match geometry {
            Geometry::Point(point) => Geometry::Point(point.map_coords(round_trip)),
            Geometry::LineString(line) => Geometry::LineString(line.map_coords(round_trip)),
            Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.map_coords(round_trip))
            }
            Geometry::Polygon(polygon) => {
                Geometry::Polygon(orient(&polygon.map_coords(round_trip)))
            }
            Geometry::MultiPolygon(polygons) => {
                let mapped = polygons.map_coords(round_trip);
                Geometry::MultiPolygon(mapped.iter().map(orient).collect())
            }
            Geometry::Collection(parts) => Geometry::Collection(
                parts
                    .into_iter()
                    .map(|part| self.normalize(part))
                    .collect(),
            ),
        }
    }

    fn format(&self, geometry: &Geometry) -> String {
        wkt::write(geometry, WktStyle::Compact)
    }
}

/// Point on the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
struct UnitVector {
    x: f64,
    y: f64,
    z: f64,
}

impl UnitVector {
    fn from_degrees(coord: Coord) -> Self {
        let (lat_sin, lat_cos) = coord.y.to_radians().sin_cos();
        let (lon_sin, lon_cos) = coord.x.to_radians().sin_cos();
        Self {
            x: lat_cos * lon_cos,
            y: lat_cos * lon_sin,
            z: lat_sin,
        }
    }

    fn to_degrees(self) -> Coord {
        Coord {
            x: self.y.atan2(self.x).to_degrees(),
            y: self.z.atan2(self.x.hypot(self.y)).to_degrees(),
        }
    }

    fn dot(self, other: Self) -> f64 {
        self.x.mul_add(other.x, self.y.mul_add(other.y, self.z * other.z))
    }

    fn cross(self, other: Self) -> Self {
        Self {
            x: self.y.mul_add(other.z, -(self.z * other.y)),
            y: self.z.mul_add(other.x, -(self.x * other.z)),
            z: self.x.mul_add(other.y, -(self.y * other.x)),
        }
    }

    fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    const fn scaled(self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    const fn minus(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    fn normalized(self) -> Option<Self> {
        let norm = self.norm();
        (norm > f64::EPSILON).then(|| self.scaled(norm.recip()))
    }

    /// Great-circle angle to `other` in radians.
    fn angle(self, other: Self) -> f64 {
        self.cross(other).norm().atan2(self.dot(other))
    }
}

fn round_trip(coord: Coord) -> Coord {
    UnitVector::from_degrees(coord).to_degrees()
}

/// Exterior ring counter-clockwise, holes clockwise.
fn orient(polygon: &Polygon) -> Polygon {
    let exterior = with_winding(polygon.exterior(), true);
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| with_winding(ring, false))
        .collect();
    Polygon::new(exterior, interiors)
}

fn with_winding(ring: &LineString, counter_clockwise: bool) -> LineString {
    let mut oriented = ring.clone();
    if (signed_area(ring) > 0.0) != counter_clockwise {
        oriented.0.reverse();
    }
    oriented
}

/// Shoelace sum over longitudes unwrapped relative to the first vertex, so a
/// ring straddling the antimeridian keeps its winding.
fn signed_area(ring: &LineString) -> f64 {
    let Some(origin) = ring.0.first().map(|coord| coord.x) else {
        return 0.0;
    };
    let unwrap = |coord: Coord| Coord {
        x: origin + wrap_longitude(coord.x - origin),
        y: coord.y,
    };
    ring.lines()
        .map(|segment| {
            let start = unwrap(segment.start);
            let end = unwrap(segment.end);
            start.x.mul_add(end.y, -(end.x * start.y))
        })
        .sum()
}

fn wrap_longitude(delta: f64) -> f64 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { 180.0 } else { wrapped }
}

/// Great-circle length of `line` in radians.
pub(crate) fn length(line: &LineString) -> f64 {
    line.lines()
        .map(|segment| {
            UnitVector::from_degrees(segment.start).angle(UnitVector::from_degrees(segment.end))
        })
        .sum()
}

/// Closest point of one track edge to a search point.
struct EdgeHit {
    distance: f64,
    along: f64,
    before_start: bool,
    after_end: bool,
}

fn nearest_on_edge(start: UnitVector, end: UnitVector, target: UnitVector) -> EdgeHit {
    let edge_len = start.angle(end);
    let at_start = EdgeHit {
        distance: target.angle(start),
        along: 0.0,
        before_start: true,
        after_end: false,
    };
    let Some(normal) = start.cross(end).normalized() else {
        return EdgeHit {
            before_start: false,
            ..at_start
        };
    };
    let in_plane = target.minus(normal.scaled(target.dot(normal))).normalized();
    if let Some(projected) = in_plane
        && start.cross(projected).dot(normal) >= 0.0
        && projected.cross(end).dot(normal) >= 0.0
    {
        return EdgeHit {
            distance: target.angle(projected),
            along: start.angle(projected),
            before_start: false,
            after_end: false,
        };
    }
    let at_end = EdgeHit {
        distance: target.angle(end),
        along: edge_len,
        before_start: false,
        after_end: true,
    };
    if at_end.distance < at_start.distance {
        at_end
    } else {
        at_start
    }
}

/// Position of `point` along `line` as a fraction of its great-circle length.
///
/// The point is projected onto the nearest edge. Returns `None` when the
/// nearest position is clamped to the first vertex from before the track
/// start, or to the last vertex from beyond the track end.
pub(crate) fn locate(line: &LineString, point: Coord) -> Option<f64> {
    nearest(line, point)
        .filter(|found| !found.outside)
        .map(|found| found.fraction)
}

/// Like [`locate`], but points beyond either end clamp to that end.
pub(crate) fn position(line: &LineString, point: Coord) -> Option<f64> {
    nearest(line, point).map(|found| found.fraction)
}

struct Nearest {
    fraction: f64,
    outside: bool,
}

fn nearest(line: &LineString, point: Coord) -> Option<Nearest> {
    let vertices: Vec<UnitVector> = line.coords().copied().map(UnitVector::from_degrees).collect();
    let target = UnitVector::from_degrees(point);
    let edge_count = vertices.len().saturating_sub(1);
    let mut travelled = 0.0;
    let mut best: Option<(EdgeHit, f64, usize)> = None;
    for (index, pair) in vertices.windows(2).enumerate() {
        let [start, end] = pair else {
            continue;
        };
        let hit = nearest_on_edge(*start, *end, target);
        let offset = travelled;
        travelled += start.angle(*end);
        if best
            .as_ref()
            .is_none_or(|(closest, _, _)| hit.distance < closest.distance)
        {
            best = Some((hit, offset, index));
        }
    }
    let total = travelled;
    if total <= f64::EPSILON {
        return None;
    }
    let (hit, offset, index) = best?;
    Some(Nearest {
        fraction: ((offset + hit.along) / total).clamp(0.0, 1.0),
        outside: (hit.before_start && index == 0) || (hit.after_end && index + 1 == edge_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::rstest;

    #[rstest]
    fn writes_polygon_in_compact_style() {
        let polygon = SphericalEngine
            .parse("POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))")
            .expect("valid WKT");
        let text = SphericalEngine.format(&polygon);
        assert!(text.starts_with("POLYGON((0.0 0.0,"), "got {text}");
        assert!(text.ends_with(",0.0 0.0))"), "got {text}");
    }

    #[rstest]
    fn clockwise_exterior_is_reversed() {
        let clockwise = SphericalEngine
            .parse("POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))")
            .expect("valid WKT");
        let Geometry::Polygon(polygon) = clockwise else {
            panic!("expected polygon");
        };
        assert!(signed_area(polygon.exterior()) > 0.0);
    }

    #[rstest]
    fn antimeridian_ring_keeps_counter_clockwise_winding() {
        let ring: LineString = vec![
            (170.0, -5.0),
            (-170.0, -5.0),
            (-170.0, 5.0),
            (170.0, 5.0),
            (170.0, -5.0),
        ]
        .into();
        assert!(signed_area(&ring) > 0.0);
    }

    #[rstest]
    #[case(190.0, -170.0)]
    #[case(-45.5, -45.5)]
    #[case(360.0, 0.0)]
    fn longitudes_wrap(#[case] input: f64, #[case] expected: f64) {
        let coord = round_trip(Coord { x: input, y: 10.0 });
        assert!((coord.x - expected).abs() < 1e-9, "got {}", coord.x);
        assert!((coord.y - 10.0).abs() < 1e-9, "got {}", coord.y);
    }

    #[rstest]
    fn measures_track_across_antimeridian() {
        let track = line_string![(x: 179.0, y: 0.0), (x: -179.0, y: 0.0)];
        assert!((length(&track) - 2.0_f64.to_radians()).abs() < 1e-12);
        let fraction = locate(&track, Coord { x: 180.0, y: 0.5 }).expect("on track");
        assert!((fraction - 0.5).abs() < 1e-9, "got {fraction}");
    }

    #[rstest]
    fn points_beyond_track_ends_have_no_position() {
        let track = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 20.0, y: 0.0)];
        assert!(locate(&track, Coord { x: -5.0, y: 0.0 }).is_none());
        assert!(locate(&track, Coord { x: 25.0, y: 1.0 }).is_none());
        let middle = locate(&track, Coord { x: 15.0, y: 2.0 }).expect("on track");
        assert!((middle - 0.75).abs() < 1e-9, "got {middle}");
    }

    #[rstest]
    fn positions_beyond_track_ends_clamp() {
        let track = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 20.0, y: 0.0)];
        let before = position(&track, Coord { x: -5.0, y: 0.0 }).expect("clamped");
        let after = position(&track, Coord { x: 25.0, y: 1.0 }).expect("clamped");
        assert!(before.abs() < 1e-12, "got {before}");
        assert!((after - 1.0).abs() < 1e-12, "got {after}");
    }

    #[rstest]
    fn stalled_track_has_no_position() {
        let stalled = line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 1.0)];
        assert!(position(&stalled, Coord { x: 1.0, y: 1.0 }).is_none());
    }
}
