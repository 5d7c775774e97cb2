//! WKT reading and writing.

use std::str::FromStr;

use geo::{Coord, LineString, Polygon};

use super::{Geometry, GeometryError};

/// Parse WKT text into a [`Geometry`].
pub(super) fn parse(text: &str) -> Result<Geometry, GeometryError> {
    let parse_error = |reason: String| GeometryError::Parse {
        wkt: text.to_owned(),
        reason,
    };
    let parsed = ::wkt::Wkt::<f64>::from_str(text).map_err(|err| parse_error(format!("{err}")))?;
    let geometry =
        geo::Geometry::<f64>::try_from(parsed).map_err(|err| parse_error(format!("{err}")))?;
    Geometry::from_geo(geometry)
}

/// Layout of the emitted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WktStyle {
    /// `POLYGON ((10 5, 10 7, ...))`
    Spaced,
    /// `POLYGON((10.0 5.0,10.0 7.0,...))`
    Compact,
}

impl WktStyle {
    const fn tag_gap(self) -> &'static str {
        match self {
            Self::Spaced => " ",
            Self::Compact => "",
        }
    }

    const fn separator(self) -> &'static str {
        match self {
            Self::Spaced => ", ",
            Self::Compact => ",",
        }
    }

    fn number(self, out: &mut String, value: f64) {
        let digits = value.to_string();
        let integral = !digits.contains(['.', 'N', 'i']);
        out.push_str(&digits);
        if self == Self::Compact && integral {
            out.push_str(".0");
        }
    }
}

/// Render `geometry` in the requested style.
pub(super) fn write(geometry: &Geometry, style: WktStyle) -> String {
    let mut out = String::new();
    write_geometry(&mut out, geometry, style);
    out
}

fn write_geometry(out: &mut String, geometry: &Geometry, style: WktStyle) {
    match geometry {
        Geometry::Point(point) => {
            tag(out, "POINT", style);
            out.push('(');
            write_coord(out, point.0, style);
            out.push(')');
        }
        Geometry::LineString(line) => {
            tag(out, "LINESTRING", style);
            write_line(out, line, style);
        }
        Geometry::MultiLineString(lines) => {
            tag(out, "MULTILINESTRING", style);
            write_list(out, &lines.0, style, write_line);
        }
        Geometry::Polygon(polygon) => {
            tag(out, "POLYGON", style);
            write_polygon(out, polygon, style);
        }
        Geometry::MultiPolygon(polygons) => {
            tag(out, "MULTIPOLYGON", style);
            write_list(out, &polygons.0, style, write_polygon);
        }
        Geometry::Collection(parts) => {
            tag(out, "GEOMETRYCOLLECTION", style);
            write_list(out, parts, style, write_geometry);
        }
    }
}

fn tag(out: &mut String, name: &str, style: WktStyle) {
    out.push_str(name);
    out.push_str(style.tag_gap());
}

fn write_list<T>(
    out: &mut String,
    items: &[T],
    style: WktStyle,
    write_item: fn(&mut String, &T, WktStyle),
) {
    if items.is_empty() {
        if style == WktStyle::Compact {
            out.push(' ');
        }
        out.push_str("EMPTY");
        return;
    }
    out.push('(');
    for (position, item) in items.iter().enumerate() {
        if position > 0 {
            out.push_str(style.separator());
        }
        write_item(out, item, style);
    }
    out.push(')');
}

fn write_line(out: &mut String, line: &LineString, style: WktStyle) {
    let coords: Vec<Coord> = line.coords().copied().collect();
    write_list(out, &coords, style, |buffer, coord, inner| {
        write_coord(buffer, *coord, inner);
    });
}

fn write_polygon(out: &mut String, polygon: &Polygon, style: WktStyle) {
    let rings: Vec<&LineString> = std::iter::once(polygon.exterior())
        .filter(|ring| !ring.0.is_empty())
        .chain(polygon.interiors())
        .collect();
    write_list(out, &rings, style, |buffer, ring, inner| {
        write_line(buffer, ring, inner);
    });
}

fn write_coord(out: &mut String, coord: Coord, style: WktStyle) {
    style.number(out, coord.x);
    out.push(' ');
    style.number(out, coord.y);
}
