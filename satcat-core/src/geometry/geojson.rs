//! GeoJSON encoding for document stores.
//!
//! Only the geometry object is produced; features and properties live in the
//! surrounding document. Polygons are written closed and a single-member
//! composite collapses to its member, matching what `2dsphere` indexes accept.

use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use serde_json::{Value, json};

use super::{Geometry, GeometryError};

/// Encode `geometry` as a GeoJSON geometry object.
pub(super) fn to_value(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point(point) => json!({
            "type": "Point",
            "coordinates": position(point.0),
        }),
        Geometry::LineString(line) => json!({
            "type": "LineString",
            "coordinates": positions(line),
        }),
        Geometry::MultiLineString(lines) => match lines.0.as_slice() {
            [line] => json!({
                "type": "LineString",
                "coordinates": positions(line),
            }),
            _ => json!({
                "type": "MultiLineString",
                "coordinates": lines.iter().map(positions).collect::<Vec<_>>(),
            }),
        },
        Geometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": rings(polygon),
        }),
        Geometry::MultiPolygon(polygons) => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(rings).collect::<Vec<_>>(),
        }),
        Geometry::Collection(parts) => match parts.as_slice() {
            [single] => to_value(single),
            _ => json!({
                "type": "GeometryCollection",
                "geometries": parts.iter().map(to_value).collect::<Vec<_>>(),
            }),
        },
    }
}

fn position(coord: Coord) -> Value {
    json!([coord.x, coord.y])
}

fn positions(line: &LineString) -> Vec<Value> {
    line.coords().copied().map(position).collect()
}

fn rings(polygon: &Polygon) -> Vec<Vec<Value>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| {
            let mut closed = ring.clone();
            closed.close();
            positions(&closed)
        })
        .collect()
}

/// Decode a GeoJSON geometry object.
pub(super) fn from_value(value: &Value) -> Result<Geometry, GeometryError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing geometry type"))?;
    if kind == "GeometryCollection" {
        let members = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("GeometryCollection without geometries"))?;
        return members
            .iter()
            .map(from_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Geometry::Collection);
    }
    let coordinates = value
        .get("coordinates")
        .ok_or_else(|| invalid("missing coordinates"))?;
    match kind {
        "Point" => Ok(Geometry::Point(Point(read_position(coordinates)?))),
        "LineString" => read_line(coordinates).map(Geometry::LineString),
        "MultiLineString" => read_array(coordinates)?
            .iter()
            .map(read_line)
            .collect::<Result<Vec<_>, _>>()
            .map(|lines| Geometry::MultiLineString(MultiLineString::new(lines))),
        "Polygon" => read_polygon(coordinates).map(Geometry::Polygon),
        "MultiPolygon" => read_array(coordinates)?
            .iter()
            .map(read_polygon)
            .collect::<Result<Vec<_>, _>>()
            .map(|polygons| Geometry::MultiPolygon(MultiPolygon::new(polygons))),
        "MultiPoint" => Err(GeometryError::UnsupportedGeometry { kind: "MultiPoint" }),
        other => Err(invalid(&format!("unknown geometry type {other}"))),
    }
}

fn invalid(reason: &str) -> GeometryError {
    GeometryError::InvalidGeoJson {
        reason: reason.to_owned(),
    }
}

fn read_array(value: &Value) -> Result<&Vec<Value>, GeometryError> {
    value
        .as_array()
        .ok_or_else(|| invalid("coordinates must be an array"))
}

fn read_position(value: &Value) -> Result<Coord, GeometryError> {
    match read_array(value)?.as_slice() {
        [x, y, ..] => match (x.as_f64(), y.as_f64()) {
            (Some(lon), Some(lat)) => Ok(Coord { x: lon, y: lat }),
            _ => Err(invalid("position members must be numbers")),
        },
        _ => Err(invalid("position needs two members")),
    }
}

fn read_line(value: &Value) -> Result<LineString, GeometryError> {
    read_array(value)?
        .iter()
        .map(read_position)
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn read_polygon(value: &Value) -> Result<Polygon, GeometryError> {
    let mut rings = read_array(value)?
        .iter()
        .map(read_line)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings
        .next()
        .ok_or_else(|| invalid("polygon without rings"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}
