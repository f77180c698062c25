//! Geometry elements: `Point`, `LineString`, `LinearRing`, `Polygon` and
//! `MultiGeometry`.
//!
//! Parsing has two failure levels. XML problems are fatal [`ParseError`]s.
//! Geometry problems (bad coordinates, open rings) come back as `Err(String)`
//! so the reader can apply its leniency policy.

use std::io::BufRead;

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use quick_xml::events::Event;

use super::{KmlReader, ParseError, local_name};

type GeometryResult = Result<Geometry<f64>, String>;

/// Whether `name` is a geometry element the reader understands.
pub(super) fn is_geometry_element(name: &str) -> bool {
    matches!(
        name,
        "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry"
    )
}

impl<R: BufRead> KmlReader<'_, R> {
    /// Read the geometry element `kind` that was just opened.
    pub(super) fn read_geometry(&mut self, kind: &str) -> Result<GeometryResult, ParseError> {
        match kind {
            "Polygon" => self.read_polygon(),
            "MultiGeometry" => self.read_multi_geometry(),
            _ => {
                let coordinates = self.read_coordinates(kind)?;
                Ok(coordinates.and_then(|coords| build_simple(kind, coords)))
            }
        }
    }

    fn read_coordinates(
        &mut self,
        element: &str,
    ) -> Result<Result<Vec<Coord<f64>>, String>, ParseError> {
        let leaves = self.read_leaves(element)?;
        Ok(leaves
            .into_iter()
            .find(|(leaf, _)| leaf == "coordinates")
            .ok_or_else(|| format!("{element} has no coordinates"))
            .and_then(|(_, text)| parse_coordinates(&text)))
    }

    fn read_polygon(&mut self) -> Result<GeometryResult, ParseError> {
        let mut exterior: Option<Result<LineString<f64>, String>> = None;
        let mut interiors: Vec<Result<LineString<f64>, String>> = Vec::new();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let name = local_name(&child);
                    match name.as_str() {
                        "outerBoundaryIs" => {
                            let boundary = self.read_coordinates(&name)?.and_then(ring);
                            exterior = Some(boundary);
                        }
                        "innerBoundaryIs" => {
                            let boundary = self.read_coordinates(&name)?.and_then(ring);
                            interiors.push(boundary);
                        }
                        _ => self.skip_element(&name)?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: "Polygon".to_owned(),
                    });
                }
                _ => {}
            }
        }
        let Some(exterior) = exterior else {
            return Ok(Err("Polygon has no outer boundary".to_owned()));
        };
        Ok(exterior.and_then(|outer| {
            let inner = interiors.into_iter().collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::Polygon(Polygon::new(outer, inner)))
        }))
    }

    fn read_multi_geometry(&mut self) -> Result<GeometryResult, ParseError> {
        let mut parts = Vec::new();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let name = local_name(&child);
                    if is_geometry_element(&name) {
                        parts.push(self.read_geometry(&name)?);
                    } else {
                        self.skip_element(&name)?;
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: "MultiGeometry".to_owned(),
                    });
                }
                _ => {}
            }
        }
        Ok(parts
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map(collect_parts))
    }
}

/// Narrow a homogeneous collection to its multi-part type.
fn collect_parts(parts: Vec<Geometry<f64>>) -> Geometry<f64> {
    if parts.is_empty() {
        return Geometry::GeometryCollection(GeometryCollection(parts));
    }
    if parts.iter().all(|part| matches!(part, Geometry::Point(_))) {
        let points: Vec<Point<f64>> = parts
            .into_iter()
            .filter_map(|part| Point::try_from(part).ok())
            .collect();
        return Geometry::MultiPoint(MultiPoint::new(points));
    }
    if parts.iter().all(|part| matches!(part, Geometry::LineString(_))) {
        let lines: Vec<LineString<f64>> = parts
            .into_iter()
            .filter_map(|part| LineString::try_from(part).ok())
            .collect();
        return Geometry::MultiLineString(MultiLineString::new(lines));
    }
    if parts.iter().all(|part| matches!(part, Geometry::Polygon(_))) {
        let polygons: Vec<Polygon<f64>> = parts
            .into_iter()
            .filter_map(|part| Polygon::try_from(part).ok())
            .collect();
        return Geometry::MultiPolygon(MultiPolygon::new(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection(parts))
}

fn build_simple(kind: &str, coords: Vec<Coord<f64>>) -> GeometryResult {
    match kind {
        "Point" => match coords.as_slice() {
            [coord] => Ok(Geometry::Point(Point::from(*coord))),
            other => Err(format!("Point needs one coordinate, found {}", other.len())),
        },
        "LineString" => {
            if coords.len() < 2 {
                return Err(format!(
                    "LineString needs at least two coordinates, found {}",
                    coords.len()
                ));
            }
            Ok(Geometry::LineString(LineString::new(coords)))
        }
        _ => ring(coords).map(Geometry::LineString),
    }
}

fn ring(coords: Vec<Coord<f64>>) -> Result<LineString<f64>, String> {
    if coords.len() < 4 {
        return Err(format!(
            "LinearRing needs at least four coordinates, found {}",
            coords.len()
        ));
    }
    let line = LineString::new(coords);
    if !line.is_closed() {
        return Err("LinearRing is not closed".to_owned());
    }
    Ok(line)
}

/// Parse a KML `coordinates` list of `lon,lat[,alt]` tuples.
pub(crate) fn parse_coordinates(text: &str) -> Result<Vec<Coord<f64>>, String> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let mut axis = |label: &str| -> Result<f64, String> {
                let raw = parts
                    .next()
                    .ok_or_else(|| format!("coordinate {tuple:?} has no {label}"))?;
                raw.parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| format!("coordinate {tuple:?} has an invalid {label}"))
            };
            let x = axis("longitude")?;
            let y = axis("latitude")?;
            Ok(Coord { x, y })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1,2", vec![Coord { x: 1.0, y: 2.0 }])]
    #[case(" 1,2,30\n 3,4 ", vec![Coord { x: 1.0, y: 2.0 }, Coord { x: 3.0, y: 4.0 }])]
    #[case("", vec![])]
    fn parses_coordinate_tuples(#[case] text: &str, #[case] expected: Vec<Coord<f64>>) {
        assert_eq!(parse_coordinates(text).expect("coordinates"), expected);
    }

    #[rstest]
    #[case("1")]
    #[case("a,b")]
    #[case("1,inf")]
    fn rejects_broken_tuples(#[case] text: &str) {
        assert!(parse_coordinates(text).is_err());
    }

    #[rstest]
    fn rings_must_close() {
        let open = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.0 },
            Coord { x: 1.0, y: 1.0 },
            Coord { x: 0.0, y: 1.0 },
        ];
        assert!(ring(open).is_err());
    }

    #[rstest]
    fn mixed_parts_become_a_collection() {
        let parts = vec![
            Geometry::Point(Point::new(0.0, 0.0)),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
        ];
        assert!(matches!(collect_parts(parts), Geometry::GeometryCollection(_)));
    }

    #[rstest]
    fn homogeneous_points_become_multipoint() {
        let parts = vec![
            Geometry::Point(Point::new(0.0, 0.0)),
            Geometry::Point(Point::new(1.0, 1.0)),
        ];
        match collect_parts(parts) {
            Geometry::MultiPoint(points) => assert_eq!(points.0.len(), 2),
            other => panic!("expected a multipoint, got {other:?}"),
        }
    }
}
