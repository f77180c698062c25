//! `Style` and `StyleMap` capture.
//!
//! Styles without an `id` get a generated identifier. The counter only
//! depends on document order, so two passes over the same bytes agree.

use std::io::BufRead;

use kml_ingest_core::{Color, ExternalGraphic, StyleFragment, StyleId, Symbolizer};
use quick_xml::events::{BytesStart, Event};

use super::{KmlReader, ParseError, local_name};

type Leaves = [(String, String)];

fn leaf<'l>(leaves: &'l Leaves, name: &str) -> Option<&'l str> {
    leaves
        .iter()
        .find(|(leaf, _)| leaf == name)
        .map(|(_, text)| text.trim())
}

impl<R: BufRead> KmlReader<'_, R> {
    /// Read a `Style` or `StyleMap`, capture it and return its identifier.
    pub(super) fn read_style(&mut self, start: &BytesStart<'_>) -> Result<StyleId, ParseError> {
        let element = local_name(start);
        let id = match self.attribute(start, "id")? {
            Some(id) if !id.is_empty() => StyleId::from_element_id(&id),
            _ => {
                self.generated_styles += 1;
                StyleId::new(format!("#inline-style-{}", self.generated_styles))
            }
        };
        let symbolizers = if element == "StyleMap" {
            self.skip_element(&element)?;
            Vec::new()
        } else {
            self.read_symbolizers(&element)?
        };
        if let Some(sink) = self.sink.as_deref_mut() {
            sink.capture(StyleFragment::new(id.clone(), symbolizers));
        }
        Ok(id)
    }

    fn read_symbolizers(&mut self, element: &str) -> Result<Vec<Symbolizer>, ParseError> {
        let mut symbolizers = Vec::new();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let name = local_name(&child);
                    match name.as_str() {
                        "IconStyle" | "LineStyle" | "PolyStyle" | "LabelStyle" => {
                            let leaves = self.read_leaves(&name)?;
                            symbolizers.push(self.symbolizer(&name, &leaves));
                        }
                        _ => self.skip_element(&name)?,
                    }
                }
                Event::End(_) => return Ok(symbolizers),
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: element.to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    fn symbolizer(&mut self, kind: &str, leaves: &Leaves) -> Symbolizer {
        let color = self.color_leaf(kind, leaves);
        match kind {
            "IconStyle" => {
                let scale = self
                    .number_leaf(kind, leaves, "scale")
                    .filter(|scale| (scale - 1.0).abs() > f64::EPSILON);
                let graphic = leaf(leaves, "href").map(|href| {
                    let mut graphic = ExternalGraphic::new(href);
                    graphic.tint = color.filter(|tint| *tint != Color::WHITE);
                    graphic.scale = scale;
                    graphic
                });
                Symbolizer::Point { graphic }
            }
            "LineStyle" => Symbolizer::Line {
                stroke: color,
                width: self.number_leaf(kind, leaves, "width"),
            },
            "PolyStyle" => Symbolizer::Polygon {
                fill: color,
                filled: leaf(leaves, "fill") != Some("0"),
                outlined: leaf(leaves, "outline") != Some("0"),
            },
            _ => Symbolizer::Text {
                color,
                scale: self.number_leaf(kind, leaves, "scale"),
            },
        }
    }

    fn color_leaf(&mut self, kind: &str, leaves: &Leaves) -> Option<Color> {
        let raw = leaf(leaves, "color")?;
        match Color::from_kml(raw) {
            Ok(color) => Some(color),
            Err(err) => {
                self.warn(format!("ignoring {kind} colour: {err}"));
                None
            }
        }
    }

    fn number_leaf(&mut self, kind: &str, leaves: &Leaves, name: &str) -> Option<f64> {
        let raw = leaf(leaves, name)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                self.warn(format!("ignoring {kind} {name} {raw:?}"));
                None
            }
        }
    }
}
