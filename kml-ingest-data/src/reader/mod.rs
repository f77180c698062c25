//! Pull-based reader turning a KML document into raw events.
//!
//! [`KmlReader`] wraps a streaming XML parser and surfaces three kinds of
//! [`RawEvent`]: placemark records, declared schemas and network links. The
//! [`ReadMode`] decides which of them reach the caller. Style declarations are
//! never surfaced as events; when a [`StyleSink`] is attached they are handed
//! to it as they are met.
//!
//! # Example
//!
//! ```
//! use kml_ingest_core::StyleMap;
//! use kml_ingest_data::reader::{KmlReader, RawEvent, ReadMode};
//!
//! let source = br##"<kml><Document>
//!   <Style id="sunny"><LineStyle><width>2</width></LineStyle></Style>
//!   <Placemark><name>Pier</name><styleUrl>#sunny</styleUrl></Placemark>
//! </Document></kml>"##;
//!
//! let mut styles = StyleMap::new();
//! let mut reader = KmlReader::new(&source[..], ReadMode::Full).with_style_sink(&mut styles);
//! let Some(RawEvent::Record(record)) = reader.next_event()? else {
//!     panic!("expected a record");
//! };
//! assert_eq!(record.style_ref.as_ref().map(|id| id.as_str()), Some("#sunny"));
//! drop(reader);
//! assert_eq!(styles.len(), 1);
//! # Ok::<(), kml_ingest_data::ParseError>(())
//! ```

mod geometry;
mod style;

use std::io::{self, BufRead};
use std::sync::Arc;

use geo::{Geometry, Point};
use indexmap::IndexMap;
use kml_ingest_core::{
    ADDRESS_FIELD, DESCRIPTION_FIELD, Field, FieldType, LOOK_AT_FIELD, NAME_FIELD, OPEN_FIELD,
    PHONE_NUMBER_FIELD, StyleId, StyleSink, VISIBILITY_FIELD, Value, placemark_fields,
};
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

/// Which events a reader surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Records, schema declarations and link references.
    #[default]
    Full,
    /// Records only. Elements named after one of `schema_names` are read as
    /// records typed by that declared schema.
    FeaturesOnly {
        /// Declared schema names whose elements count as records.
        schema_names: Vec<String>,
    },
}

/// A placemark (or schema-typed element) as found in the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawRecord {
    /// Value of the element's `id` attribute.
    pub id: Option<String>,
    /// Structural fields the record was read against.
    pub fields: Vec<Field>,
    /// Structural and typed extended values.
    pub attrs: IndexMap<String, Value>,
    /// Parsed geometry; `None` when absent or rejected leniently.
    pub geometry: Option<Geometry<f64>>,
    /// Referenced or inline style.
    pub style_ref: Option<StyleId>,
    /// Names of the enclosing folders, outermost first.
    pub folders: Vec<String>,
    /// Free-form `ExtendedData/Data` values.
    pub untyped: IndexMap<String, String>,
}

impl RawRecord {
    fn add_field(&mut self, field: &Field) {
        if !self.fields.iter().any(|known| known.name == field.name) {
            self.fields.push(field.clone());
        }
    }
}

/// A `Schema` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDecl {
    /// Declared name, falling back to the `id` attribute.
    pub name: String,
    /// Value of the `id` attribute.
    pub id: Option<String>,
    /// Declared fields in order.
    pub fields: Vec<Field>,
}

impl SchemaDecl {
    /// Whether a `schemaUrl` fragment refers to this declaration.
    fn answers_to(&self, reference: &str) -> bool {
        self.name == reference || self.id.as_deref() == Some(reference)
    }
}

/// A reference to another document (`NetworkLink`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Link target as written in the source.
    pub target: String,
}

/// Event surfaced by [`KmlReader`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// A placemark or schema-typed element.
    Record(RawRecord),
    /// A `Schema` declaration.
    SchemaDecl(SchemaDecl),
    /// A `NetworkLink` target.
    LinkRef(LinkRef),
}

/// Errors raised while reading a document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed document at byte {position}: {source}")]
    Xml {
        /// Byte offset of the failure.
        position: u64,
        /// Parser failure.
        #[source]
        source: quick_xml::Error,
    },
    /// The underlying stream failed.
    #[error("failed to read document: {0}")]
    Io(#[from] io::Error),
    /// A geometry could not be built and leniency is off.
    #[error("invalid geometry at byte {position}: {message}")]
    Geometry {
        /// Byte offset where the geometry ended.
        position: u64,
        /// What was wrong with it.
        message: String,
    },
    /// The document ended inside an element.
    #[error("document ended inside <{element}>")]
    UnexpectedEof {
        /// Element left open.
        element: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenElement {
    Folder,
    Other,
}

/// Streaming KML reader.
///
/// The reader is forward-only. Dropping it releases the source.
pub struct KmlReader<'s, R> {
    xml: quick_xml::Reader<R>,
    buf: Vec<u8>,
    mode: ReadMode,
    lenient: bool,
    sink: Option<&'s mut dyn StyleSink>,
    open: Vec<OpenElement>,
    folders: Vec<String>,
    schemas: Vec<SchemaDecl>,
    warnings: Vec<String>,
    generated_styles: usize,
    finished: bool,
}

impl<R> std::fmt::Debug for KmlReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmlReader")
            .field("mode", &self.mode)
            .field("lenient", &self.lenient)
            .field("capturing_styles", &self.sink.is_some())
            .field("folders", &self.folders)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'s, R: BufRead> KmlReader<'s, R> {
    /// Wrap `source` in a strict reader.
    pub fn new(source: R, mode: ReadMode) -> Self {
        let mut xml = quick_xml::Reader::from_reader(source);
        let config = xml.config_mut();
        config.trim_text(true);
        config.expand_empty_elements = true;
        Self {
            xml,
            buf: Vec::new(),
            mode,
            lenient: false,
            sink: None,
            open: Vec::new(),
            folders: Vec::new(),
            schemas: Vec::new(),
            warnings: Vec::new(),
            generated_styles: 0,
            finished: false,
        }
    }

    /// Tolerate malformed geometries, recording a warning instead of failing.
    #[must_use]
    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Hand every style declaration to `sink`.
    #[must_use]
    pub fn with_style_sink(mut self, sink: &'s mut dyn StyleSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drain the warnings gathered so far.
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Schema declarations met so far.
    #[must_use]
    pub fn declared_schemas(&self) -> &[SchemaDecl] {
        &self.schemas
    }

    /// Pull the next event.
    ///
    /// Returns `Ok(None)` at the end of the document. After an error or the
    /// end of the document every further call returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] for malformed XML, IO failures and, unless the
    /// reader is lenient, malformed geometries.
    pub fn next_event(&mut self) -> Result<Option<RawEvent>, ParseError> {
        if self.finished {
            return Ok(None);
        }
        let outcome = self.advance();
        if !matches!(outcome, Ok(Some(_))) {
            self.finished = true;
        }
        outcome
    }

    fn advance(&mut self) -> Result<Option<RawEvent>, ParseError> {
        loop {
            match self.next_xml()? {
                Event::Start(start) => {
                    if let Some(event) = self.on_start(&start)? {
                        return Ok(Some(event));
                    }
                }
                Event::End(_) => {
                    if self.open.pop() == Some(OpenElement::Folder) {
                        self.folders.pop();
                    }
                }
                Event::Eof => {
                    if self.open.is_empty() {
                        return Ok(None);
                    }
                    return Err(ParseError::UnexpectedEof {
                        element: "document".to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    fn on_start(&mut self, start: &BytesStart<'_>) -> Result<Option<RawEvent>, ParseError> {
        let name = local_name(start);
        let full = self.mode == ReadMode::Full;
        match name.as_str() {
            "Placemark" => self
                .read_feature(start, None)
                .map(|record| Some(RawEvent::Record(record))),
            "Schema" => {
                let declaration = self.read_schema(start)?;
                Ok(declaration.and_then(|decl| {
                    self.schemas.push(decl.clone());
                    full.then_some(RawEvent::SchemaDecl(decl))
                }))
            }
            "NetworkLink" | "Url" if full => {
                let leaves = self.read_leaves(&name)?;
                Ok(leaves
                    .into_iter()
                    .find(|(leaf, _)| leaf == "href")
                    .map(|(_, target)| RawEvent::LinkRef(LinkRef { target })))
            }
            "NetworkLink" | "Url" => {
                self.skip_element(&name)?;
                Ok(None)
            }
            "Style" | "StyleMap" => {
                self.read_style(start)?;
                Ok(None)
            }
            "Folder" => {
                self.open.push(OpenElement::Folder);
                self.folders.push(String::new());
                Ok(None)
            }
            NAME_FIELD if self.open.last() == Some(&OpenElement::Folder) => {
                let text = self.read_text(&name)?;
                if let Some(folder) = self.folders.last_mut() {
                    *folder = text;
                }
                Ok(None)
            }
            other => {
                if let ReadMode::FeaturesOnly { schema_names } = &self.mode
                    && schema_names.iter().any(|schema| schema == other)
                {
                    let schema = other.to_owned();
                    return self
                        .read_feature(start, Some(&schema))
                        .map(|record| Some(RawEvent::Record(record)));
                }
                self.open.push(OpenElement::Other);
                Ok(None)
            }
        }
    }

    /// Read a placemark, or an element typed by the declared schema `custom`.
    fn read_feature(
        &mut self,
        start: &BytesStart<'_>,
        custom: Option<&str>,
    ) -> Result<RawRecord, ParseError> {
        let element = local_name(start);
        let mut record = RawRecord {
            id: self.attribute(start, "id")?,
            fields: placemark_fields(),
            folders: self.folders.clone(),
            ..RawRecord::default()
        };
        let custom_fields: Vec<Field> = custom
            .and_then(|schema| self.schemas.iter().find(|decl| decl.name == schema))
            .map(|decl| decl.fields.clone())
            .unwrap_or_default();
        for field in &custom_fields {
            record.add_field(field);
        }
        loop {
            match self.next_xml()? {
                Event::Start(child) => self.read_feature_child(&child, &custom_fields, &mut record)?,
                Event::End(_) => return Ok(record),
                Event::Eof => return Err(ParseError::UnexpectedEof { element }),
                _ => {}
            }
        }
    }

    fn read_feature_child(
        &mut self,
        child: &BytesStart<'_>,
        custom_fields: &[Field],
        record: &mut RawRecord,
    ) -> Result<(), ParseError> {
        let name = local_name(child);
        match name.as_str() {
            NAME_FIELD | ADDRESS_FIELD | PHONE_NUMBER_FIELD | DESCRIPTION_FIELD => {
                let text = self.read_text(&name)?;
                record.attrs.insert(name, Value::Text(text));
            }
            VISIBILITY_FIELD | OPEN_FIELD => {
                let text = self.read_text(&name)?;
                match FieldType::Boolean.coerce(&text) {
                    Ok(value) => {
                        record.attrs.insert(name, value);
                    }
                    Err(err) => self.warn(format!("ignoring {name}: {err}")),
                }
            }
            "styleUrl" => {
                let reference = self.read_text(&name)?;
                if !reference.trim().is_empty() {
                    record.style_ref = Some(StyleId::new(reference.trim()));
                }
            }
            "Style" | "StyleMap" => {
                let id = self.read_style(child)?;
                record.style_ref.get_or_insert(id);
            }
            LOOK_AT_FIELD => {
                if let Some(point) = self.read_look_at()? {
                    record
                        .attrs
                        .insert(LOOK_AT_FIELD.to_owned(), Value::Geometry(Geometry::Point(point)));
                }
            }
            "ExtendedData" => self.read_extended_data(record)?,
            kind if geometry::is_geometry_element(kind) => {
                match self.read_geometry(kind)? {
                    Ok(parsed) => record.geometry = Some(parsed),
                    Err(message) => self.reject_geometry(message)?,
                }
            }
            other => match custom_fields.iter().find(|field| field.name == other) {
                Some(field) => {
                    let text = self.read_text(&name)?;
                    match field.field_type.coerce(&text) {
                        Ok(value) => {
                            record.attrs.insert(name, value);
                        }
                        Err(err) => {
                            self.warn(format!("keeping {name} as text: {err}"));
                            record.untyped.insert(name, text);
                        }
                    }
                }
                None => self.skip_element(&name)?,
            },
        }
        Ok(())
    }

    fn read_look_at(&mut self) -> Result<Option<Point<f64>>, ParseError> {
        let leaves = self.read_leaves(LOOK_AT_FIELD)?;
        let coordinate = |axis: &str| {
            leaves
                .iter()
                .find(|(leaf, _)| leaf == axis)
                .and_then(|(_, text)| text.trim().parse::<f64>().ok())
        };
        Ok(coordinate("longitude")
            .zip(coordinate("latitude"))
            .map(|(x, y)| Point::new(x, y)))
    }

    fn read_extended_data(&mut self, record: &mut RawRecord) -> Result<(), ParseError> {
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let name = local_name(&child);
                    match name.as_str() {
                        "Data" => {
                            let key = self.attribute(&child, "name")?;
                            let value = self
                                .read_leaves(&name)?
                                .into_iter()
                                .find(|(leaf, _)| leaf == "value")
                                .map(|(_, text)| text)
                                .unwrap_or_default();
                            if let Some(key) = key {
                                record.untyped.insert(key, value);
                            }
                        }
                        "SchemaData" => self.read_schema_data(&child, record)?,
                        _ => self.skip_element(&name)?,
                    }
                }
                Event::End(_) => return Ok(()),
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: "ExtendedData".to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    fn read_schema_data(
        &mut self,
        start: &BytesStart<'_>,
        record: &mut RawRecord,
    ) -> Result<(), ParseError> {
        let reference = self.attribute(start, "schemaUrl")?.unwrap_or_default();
        let fragment = reference.rsplit('#').next().unwrap_or_default().to_owned();
        let declared: Vec<Field> = self
            .schemas
            .iter()
            .find(|decl| decl.answers_to(&fragment))
            .map(|decl| decl.fields.clone())
            .unwrap_or_default();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let name = local_name(&child);
                    if name != "SimpleData" {
                        self.skip_element(&name)?;
                        continue;
                    }
                    let key = self.attribute(&child, "name")?;
                    let text = self.read_text(&name)?;
                    let Some(key) = key else { continue };
                    let Some(field) = declared.iter().find(|field| field.name == key) else {
                        record.untyped.insert(key, text);
                        continue;
                    };
                    match field.field_type.coerce(&text) {
                        Ok(value) => {
                            record.add_field(field);
                            record.attrs.insert(key, value);
                        }
                        Err(err) => {
                            self.warn(format!("keeping {key} as text: {err}"));
                            record.untyped.insert(key, text);
                        }
                    }
                }
                Event::End(_) => return Ok(()),
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: "SchemaData".to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    fn read_schema(&mut self, start: &BytesStart<'_>) -> Result<Option<SchemaDecl>, ParseError> {
        let name = self.attribute(start, "name")?;
        let id = self.attribute(start, "id")?;
        let mut fields = Vec::new();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    let child_name = local_name(&child);
                    if child_name == "SimpleField" {
                        let field_name = self.attribute(&child, "name")?;
                        let field_type = self.attribute(&child, "type")?;
                        if let Some(field_name) = field_name {
                            let field_type = field_type
                                .as_deref()
                                .map_or(FieldType::Text, FieldType::from_kml_type);
                            fields.push(Field::new(field_name, field_type));
                        }
                    }
                    self.skip_element(&child_name)?;
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: "Schema".to_owned(),
                    });
                }
                _ => {}
            }
        }
        let Some(name) = name.or_else(|| id.clone()) else {
            self.warn("ignoring a Schema without name or id".to_owned());
            return Ok(None);
        };
        Ok(Some(SchemaDecl { name, id, fields }))
    }

    fn reject_geometry(&mut self, message: String) -> Result<(), ParseError> {
        let position = self.byte_position();
        if self.lenient {
            self.warn(format!("dropping geometry ending at byte {position}: {message}"));
            Ok(())
        } else {
            Err(ParseError::Geometry { position, message })
        }
    }

    fn warn(&mut self, message: String) {
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn byte_position(&self) -> u64 {
        u64::try_from(self.xml.buffer_position()).unwrap_or(u64::MAX)
    }

    fn next_xml(&mut self) -> Result<Event<'static>, ParseError> {
        self.buf.clear();
        let position = self.byte_position();
        match self.xml.read_event_into(&mut self.buf) {
            Ok(event) => Ok(event.into_owned()),
            Err(source) => Err(xml_error(position, source)),
        }
    }

    fn attribute(&self, start: &BytesStart<'_>, key: &str) -> Result<Option<String>, ParseError> {
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| {
                xml_error(self.byte_position(), quick_xml::Error::from(err))
            })?;
            if attribute.key.local_name().as_ref() == key.as_bytes() {
                let value = attribute
                    .unescape_value()
                    .map_err(|err| xml_error(self.byte_position(), err))?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }

    /// Read the text content of the element just opened, skipping children.
    fn read_text(&mut self, element: &str) -> Result<String, ParseError> {
        let mut text = String::new();
        let mut depth = 0_usize;
        loop {
            match self.next_xml()? {
                Event::Text(chunk) if depth == 0 => {
                    let unescaped = chunk
                        .unescape()
                        .map_err(|err| xml_error(self.byte_position(), err))?;
                    text.push_str(&unescaped);
                }
                Event::CData(chunk) if depth == 0 => {
                    text.push_str(&String::from_utf8_lossy(&chunk));
                }
                Event::Start(_) => depth += 1,
                Event::End(_) => match depth.checked_sub(1) {
                    Some(outer) => depth = outer,
                    None => return Ok(text),
                },
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: element.to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    /// Collect `(local name, text)` for every text-bearing descendant.
    fn read_leaves(&mut self, element: &str) -> Result<Vec<(String, String)>, ParseError> {
        let mut leaves = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        loop {
            match self.next_xml()? {
                Event::Start(child) => {
                    path.push(local_name(&child));
                    text.clear();
                }
                Event::Text(chunk) => {
                    let unescaped = chunk
                        .unescape()
                        .map_err(|err| xml_error(self.byte_position(), err))?;
                    text.push_str(&unescaped);
                }
                Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
                Event::End(_) => match path.pop() {
                    Some(name) => {
                        if !text.is_empty() {
                            leaves.push((name, std::mem::take(&mut text)));
                        }
                    }
                    None => return Ok(leaves),
                },
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: element.to_owned(),
                    });
                }
                _ => {}
            }
        }
    }

    fn skip_element(&mut self, element: &str) -> Result<(), ParseError> {
        let mut depth = 0_usize;
        loop {
            match self.next_xml()? {
                Event::Start(_) => depth += 1,
                Event::End(_) => match depth.checked_sub(1) {
                    Some(outer) => depth = outer,
                    None => return Ok(()),
                },
                Event::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        element: element.to_owned(),
                    });
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for KmlReader<'_, R> {
    type Item = Result<RawEvent, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

impl<R: BufRead> std::iter::FusedIterator for KmlReader<'_, R> {}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn xml_error(position: u64, source: quick_xml::Error) -> ParseError {
    match source {
        quick_xml::Error::Io(shared) => ParseError::Io(
            Arc::try_unwrap(shared)
                .unwrap_or_else(|shared| io::Error::new(shared.kind(), shared.to_string())),
        ),
        other => ParseError::Xml {
            position,
            source: other,
        },
    }
}
