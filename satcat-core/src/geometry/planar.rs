//! Planar engine: longitude and latitude on a flat plane.

use geo::{Coord, Distance, Euclidean, Length, Line, LineLocatePoint, LineString, Point};

use super::wkt::{self, WktStyle};
use super::{EngineKind, Geometry, GeometryEngine};

/// Engine for small regions where planar maths is accurate enough.
///
/// Coordinates are kept exactly as parsed and WKT is written in the
/// conventional spaced style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanarEngine;

impl GeometryEngine for PlanarEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Planar
    }

    fn normalize(&self, geometry: Geometry) -> Geometry {
        geometry
    }

    fn format(&self, geometry: &Geometry) -> String {
        wkt::write(geometry, WktStyle::Spaced)
    }
}

/// Euclidean length of `line` in degrees.
pub(crate) fn length(line: &LineString) -> f64 {
    Euclidean.length(line)
}

/// Position of `point` along `line` as a fraction of the track length.
///
/// Only segments whose perpendicular foot for `point` lies between their
/// end points qualify, and the closest of those wins. Returns `None` when no
/// segment qualifies.
#[expect(
    clippy::float_arithmetic,
    reason = "offsets along the track are sums and ratios of lengths"
)]
pub(crate) fn locate(line: &LineString, point: Coord) -> Option<f64> {
    let total = length(line);
    if total <= f64::EPSILON {
        return None;
    }
    let target = Point::from(point);
    let mut travelled = 0.0;
    let mut best: Option<(f64, f64)> = None;
    for segment in line.lines() {
        let segment_len = Euclidean.length(&segment);
        if segment_len > 0.0
            && projects_within(&segment, target)
            && let Some(fraction) = segment.line_locate_point(&target)
        {
            let distance = Euclidean.distance(&target, &segment);
            if best.is_none_or(|(closest, _)| distance < closest) {
                best = Some((distance, fraction.mul_add(segment_len, travelled)));
            }
        }
        travelled += segment_len;
    }
    best.map(|(_, along)| (along / total).clamp(0.0, 1.0))
}

/// Position of the point of `line` closest to `point`, as a fraction of the
/// track length. Points beyond either end clamp to that end.
pub(crate) fn position(line: &LineString, point: Coord) -> Option<f64> {
    line.line_locate_point(&Point::from(point))
}

fn projects_within(segment: &Line, target: Point) -> bool {
    let direction = Point::from(segment.delta());
    (target - segment.start_point()).dot(direction) >= 0.0
        && (target - segment.end_point()).dot(direction) <= 0.0
}

#[cfg(test)]
#[expect(
    clippy::float_arithmetic,
    reason = "tests compare fractions with a tolerance"
)]
mod tests {
    use super::*;
    use geo::line_string;
    use rstest::{fixture, rstest};

    #[fixture]
    fn track() -> LineString {
        line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)]
    }

    #[rstest]
    #[case(Coord { x: 0.0, y: 0.0 }, 0.0)]
    #[case(Coord { x: 5.0, y: 1.0 }, 0.25)]
    #[case(Coord { x: 11.0, y: 5.0 }, 0.75)]
    #[case(Coord { x: 10.0, y: 10.0 }, 1.0)]
    fn locates_points_along_track(track: LineString, #[case] point: Coord, #[case] expected: f64) {
        let fraction = locate(&track, point).expect("point projects onto track");
        assert!((fraction - expected).abs() < 1e-12, "got {fraction}");
    }

    #[rstest]
    fn points_beyond_track_have_no_position(track: LineString) {
        assert!(locate(&track, Coord { x: -3.0, y: -3.0 }).is_none());
        assert!(locate(&track, Coord { x: 15.0, y: 15.0 }).is_none());
    }

    #[rstest]
    fn length_sums_segments(track: LineString) {
        assert!((length(&track) - 20.0).abs() < 1e-12);
    }

    #[rstest]
    #[case(Coord { x: -3.0, y: 0.0 }, 0.0)]
    #[case(Coord { x: 5.0, y: -2.0 }, 0.25)]
    #[case(Coord { x: 10.0, y: 14.0 }, 1.0)]
    fn position_clamps_to_track_ends(
        track: LineString,
        #[case] point: Coord,
        #[case] expected: f64,
    ) {
        let fraction = position(&track, point).expect("finite position");
        assert!((fraction - expected).abs() < 1e-12, "got {fraction}");
    }

    #[rstest]
    fn single_point_track_has_no_position() {
        let stalled = line_string![(x: 1.0, y: 1.0), (x: 1.0, y: 1.0)];
        assert!(locate(&stalled, Coord { x: 1.0, y: 1.0 }).is_none());
    }

    #[rstest]
    fn normalize_keeps_coordinates() {
        let geometry = PlanarEngine
            .parse("LINESTRING(-7.23 10.8, 1 2)")
            .expect("valid WKT");
        assert_eq!(PlanarEngine.format(&geometry), "LINESTRING (-7.23 10.8, 1 2)");
    }
}
