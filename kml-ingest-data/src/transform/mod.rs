//! Typed streaming over a second pass of the reader.
//!
//! A [`RecordTransformer`] pulls raw records from its own reader and maps
//! each one onto a frozen [`UnifiedSchema`]:
//!
//! - the geometry, style reference and folder lineage are synthesised into
//!   the `Geometry`, `Style` and `Folder` fields;
//! - every other schema field is copied from the structural or typed values,
//!   falling back to a free-form `ExtendedData` value of the same name;
//! - the description is passed through an optional [`RewriteRule`].
//!
//! Values missing from the source are left out of the record. A value that
//! cannot be coerced to its field type is dropped with a warning.
//!
//! When the schema is a geometry partition only records of that subtype
//! (and, for the null-geometry partition, records without geometry) are
//! produced.

mod rewrite;

use std::io::BufRead;

use indexmap::IndexMap;
use kml_ingest_core::{
    DESCRIPTION_FIELD, FOLDER_FIELD, FOLDER_SEPARATOR, GEOMETRY_FIELD, GeometryKind, STYLE_FIELD,
    TypedRecord, UnifiedSchema, Value,
};

use crate::reader::{KmlReader, ParseError, RawEvent, RawRecord, ReadMode};

pub use rewrite::{RewriteConfigError, RewriteRule};

/// Reader mode for the second pass over a source inferred as `schema`.
///
/// The mode recognises elements serialised against the schema's declared
/// schemas as records.
#[must_use]
pub fn reader_mode_for(schema: &UnifiedSchema) -> ReadMode {
    ReadMode::FeaturesOnly {
        schema_names: schema.declared_schemas.clone(),
    }
}

/// Forward-only sequence of [`TypedRecord`]s.
///
/// # Examples
/// ```
/// use kml_ingest_data::reader::KmlReader;
/// use kml_ingest_data::transform::{RecordTransformer, reader_mode_for};
/// use kml_ingest_data::unify::infer;
///
/// let source = b"<kml><Folder><name>Harbour</name>
///   <Placemark><name>Pier</name></Placemark>
/// </Folder></kml>";
/// let inference = infer(
///     KmlReader::new(&source[..], Default::default()),
///     "piers",
///     false,
/// )?;
/// let schema = &inference.schemas[0];
/// let reader = KmlReader::new(&source[..], reader_mode_for(schema));
/// let records = RecordTransformer::open(reader, schema).collect::<Result<Vec<_>, _>>()?;
/// assert_eq!(records[0].text("Folder"), Some("Harbour"));
/// # Ok::<(), kml_ingest_data::ParseError>(())
/// ```
#[derive(Debug)]
pub struct RecordTransformer<'s, R> {
    reader: KmlReader<'s, R>,
    schema: UnifiedSchema,
    partition: Option<GeometryKind>,
    rewrite: Option<RewriteRule>,
    warnings: Vec<String>,
    seen: usize,
}

impl<R: BufRead> RecordTransformer<'static, R> {
    /// Open a fresh filtered reader over `source` and transform it.
    pub fn from_source(source: R, schema: &UnifiedSchema, lenient: bool) -> Self {
        let reader = KmlReader::new(source, reader_mode_for(schema)).with_lenient(lenient);
        Self::open(reader, schema)
    }
}

impl<'s, R: BufRead> RecordTransformer<'s, R> {
    /// Transform the records `reader` yields onto `schema`.
    ///
    /// The reader should be fresh; schema declarations and links it surfaces
    /// are skipped.
    pub fn open(reader: KmlReader<'s, R>, schema: &UnifiedSchema) -> Self {
        Self {
            reader,
            partition: schema.geometry_kind(),
            schema: schema.clone(),
            rewrite: None,
            warnings: Vec::new(),
            seen: 0,
        }
    }

    /// Rewrite resource paths in the description field.
    #[must_use]
    pub fn with_rewrite(mut self, rule: RewriteRule) -> Self {
        self.rewrite = Some(rule);
        self
    }

    /// Schema records are mapped onto.
    #[must_use]
    pub fn schema(&self) -> &UnifiedSchema {
        &self.schema
    }

    /// Drain the reader's and the transformer's warnings.
    pub fn take_warnings(&mut self) -> Vec<String> {
        let mut warnings = self.reader.take_warnings();
        warnings.append(&mut self.warnings);
        warnings
    }

    fn transform(&mut self, mut record: RawRecord) -> TypedRecord {
        let id = record
            .id
            .take()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("{}.{}", self.schema.name, self.seen));
        let mut attrs = IndexMap::with_capacity(self.schema.fields.len());
        for field in &self.schema.fields {
            let name = field.name.as_str();
            let raw = match name {
                GEOMETRY_FIELD => record.geometry.take().map(Value::Geometry),
                STYLE_FIELD => record
                    .style_ref
                    .take()
                    .map(|style| Value::Text(style.into_inner())),
                FOLDER_FIELD => folder_path(&record.folders).map(Value::Text),
                _ => {
                    let structural = record.attrs.shift_remove(name);
                    record
                        .untyped
                        .shift_remove(name)
                        .map(Value::Text)
                        .or(structural)
                }
            };
            let Some(raw) = raw else { continue };
            let value = match raw.coerce_to(field.field_type) {
                Ok(value) => value,
                Err(err) => {
                    let message = format!("{id}: dropping {name}: {err}");
                    log::warn!("{message}");
                    self.warnings.push(message);
                    continue;
                }
            };
            let value = match (&self.rewrite, value) {
                (Some(rule), Value::Text(text)) if name == DESCRIPTION_FIELD => {
                    Value::Text(rule.apply(&text))
                }
                (_, value) => value,
            };
            attrs.insert(field.name.clone(), value);
        }
        TypedRecord { id, attrs }
    }
}

impl<R: BufRead> Iterator for RecordTransformer<'_, R> {
    type Item = Result<TypedRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.reader.next_event() {
                Ok(Some(RawEvent::Record(record))) => record,
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            };
            self.seen += 1;
            let accepted = self
                .partition
                .is_none_or(|kind| kind.admits(record.geometry.as_ref()));
            if accepted {
                return Some(Ok(self.transform(record)));
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for RecordTransformer<'_, R> {}

/// Join non-empty folder names, outermost first.
fn folder_path(folders: &[String]) -> Option<String> {
    let names: Vec<&str> = folders
        .iter()
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .collect();
    (!names.is_empty()).then(|| names.join(FOLDER_SEPARATOR))
}

#[cfg(test)]
mod tests;
