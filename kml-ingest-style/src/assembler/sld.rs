//! SLD 1.0 serialisation of a [`StyleDocument`].

use std::error::Error;

use kml_ingest_core::{Color, NAME_FIELD, Symbolizer};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use super::{Filter, Rule, StyleDocument};

const SLD_NS: &str = "http://www.opengis.net/sld";
const OGC_NS: &str = "http://www.opengis.net/ogc";
const GML_NS: &str = "http://www.opengis.net/gml";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const INDENT: usize = 4;

type SldResult<T = ()> = Result<T, Box<dyn Error + Send + Sync>>;

struct SldWriter {
    inner: Writer<Vec<u8>>,
}

impl SldWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', INDENT),
        }
    }

    fn emit(&mut self, event: Event<'_>) -> SldResult {
        self.inner.write_event(event).map_err(Into::into)
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> SldResult {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.emit(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> SldResult {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> SldResult {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.emit(Event::Empty(start))
    }

    fn text(&mut self, name: &str, text: &str) -> SldResult {
        self.open(name, &[])?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn css(&mut self, name: &str, value: &str) -> SldResult {
        self.open("sld:CssParameter", &[("name", name)])?;
        self.emit(Event::Text(BytesText::new(value)))?;
        self.close("sld:CssParameter")
    }

    fn colour(&mut self, prefix: &str, colour: Color) -> SldResult {
        self.css(prefix, &colour.to_rgb_hex())?;
        self.css(&format!("{prefix}-opacity"), &colour.opacity().to_string())
    }
}

pub(super) fn write_document(document: &StyleDocument) -> SldResult<String> {
    let mut writer = SldWriter::new();
    writer.emit(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.open(
        "sld:StyledLayerDescriptor",
        &[
            ("xmlns", SLD_NS),
            ("xmlns:sld", SLD_NS),
            ("xmlns:ogc", OGC_NS),
            ("xmlns:gml", GML_NS),
            ("xmlns:xlink", XLINK_NS),
            ("version", "1.0.0"),
        ],
    )?;
    writer.open("sld:NamedLayer", &[])?;
    writer.text("sld:Name", &document.name)?;
    writer.open("sld:UserStyle", &[])?;
    writer.text("sld:Name", &document.name)?;
    for style in &document.styles {
        writer.open("sld:FeatureTypeStyle", &[])?;
        writer.text("sld:Name", &style.name)?;
        for rule in &style.rules {
            write_rule(&mut writer, rule)?;
        }
        writer.close("sld:FeatureTypeStyle")?;
    }
    writer.close("sld:UserStyle")?;
    writer.close("sld:NamedLayer")?;
    writer.close("sld:StyledLayerDescriptor")?;
    Ok(String::from_utf8(writer.inner.into_inner())?)
}

fn write_rule(writer: &mut SldWriter, rule: &Rule) -> SldResult {
    writer.open("sld:Rule", &[])?;
    writer.open("ogc:Filter", &[])?;
    write_filter(writer, &rule.filter)?;
    writer.close("ogc:Filter")?;
    for symbolizer in &rule.symbolizers {
        write_symbolizer(writer, symbolizer)?;
    }
    writer.close("sld:Rule")
}

fn write_filter(writer: &mut SldWriter, filter: &Filter) -> SldResult {
    match filter {
        Filter::PropertyEquals { property, literal } => {
            writer.open("ogc:PropertyIsEqualTo", &[("matchCase", "false")])?;
            writer.text("ogc:PropertyName", property)?;
            writer.text("ogc:Literal", literal)?;
            writer.close("ogc:PropertyIsEqualTo")
        }
        Filter::GeometryTypeEquals { property, kind } => {
            writer.open("ogc:PropertyIsEqualTo", &[("matchCase", "false")])?;
            writer.open("ogc:Function", &[("name", "geometryType")])?;
            writer.text("ogc:PropertyName", property)?;
            writer.close("ogc:Function")?;
            writer.text("ogc:Literal", kind.as_str())?;
            writer.close("ogc:PropertyIsEqualTo")
        }
        Filter::PropertyIsNull { property } => {
            writer.open("ogc:PropertyIsNull", &[])?;
            writer.text("ogc:PropertyName", property)?;
            writer.close("ogc:PropertyIsNull")
        }
        Filter::And(filters) => {
            writer.open("ogc:And", &[])?;
            for nested in filters {
                write_filter(writer, nested)?;
            }
            writer.close("ogc:And")
        }
    }
}

fn write_symbolizer(writer: &mut SldWriter, symbolizer: &Symbolizer) -> SldResult {
    match symbolizer {
        Symbolizer::Point { graphic: None } => writer.empty("sld:PointSymbolizer", &[]),
        Symbolizer::Point {
            graphic: Some(graphic),
        } => {
            writer.open("sld:PointSymbolizer", &[])?;
            writer.open("sld:Graphic", &[])?;
            writer.open("sld:ExternalGraphic", &[])?;
            writer.empty(
                "sld:OnlineResource",
                &[("xlink:type", "simple"), ("xlink:href", graphic.href.as_str())],
            )?;
            writer.text(
                "sld:Format",
                graphic.format.as_deref().unwrap_or("unknown"),
            )?;
            writer.close("sld:ExternalGraphic")?;
            writer.close("sld:Graphic")?;
            writer.close("sld:PointSymbolizer")
        }
        Symbolizer::Line { stroke, width } => {
            writer.open("sld:LineSymbolizer", &[])?;
            writer.open("sld:Stroke", &[])?;
            if let Some(colour) = stroke {
                writer.colour("stroke", *colour)?;
            }
            if let Some(width) = width {
                writer.css("stroke-width", &width.to_string())?;
            }
            writer.close("sld:Stroke")?;
            writer.close("sld:LineSymbolizer")
        }
        Symbolizer::Polygon {
            fill,
            filled,
            outlined,
        } => {
            writer.open("sld:PolygonSymbolizer", &[])?;
            if *filled {
                writer.open("sld:Fill", &[])?;
                if let Some(colour) = fill {
                    writer.colour("fill", *colour)?;
                }
                writer.close("sld:Fill")?;
            }
            if *outlined {
                writer.empty("sld:Stroke", &[])?;
            }
            writer.close("sld:PolygonSymbolizer")
        }
        Symbolizer::Text { color, .. } => {
            writer.open("sld:TextSymbolizer", &[])?;
            writer.open("sld:Label", &[])?;
            writer.text("ogc:PropertyName", NAME_FIELD)?;
            writer.close("sld:Label")?;
            if let Some(colour) = color {
                writer.open("sld:Fill", &[])?;
                writer.colour("fill", *colour)?;
                writer.close("sld:Fill")?;
            }
            writer.close("sld:TextSymbolizer")
        }
    }
}
