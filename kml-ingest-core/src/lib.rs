//! Core domain types for the KML ingest pipeline.
//!
//! The types here are shared by the reader, the schema unifier, the record
//! transformer and the style assembler. They carry no parsing logic of their
//! own: the data crate produces them and the style crate consumes them.

#![forbid(unsafe_code)]

pub mod host;
pub mod schema;
pub mod style;
pub mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use host::{CatalogError, CatalogSink, ContainerUnpacker, StyleWriter};
pub use schema::{
    ADDRESS_FIELD, DESCRIPTION_FIELD, FOLDER_FIELD, FOLDER_SEPARATOR, Field, GEOMETRY_FIELD,
    KML_SRS, LOOK_AT_FIELD, NAME_FIELD, OPEN_FIELD, PHONE_NUMBER_FIELD, REGION_FIELD, STYLE_FIELD,
    TypedRecord, UnifiedSchema, VISIBILITY_FIELD, placemark_fields,
};
pub use style::{
    Color, ColorError, ExternalGraphic, StyleFragment, StyleId, StyleMap, StyleSink, Symbolizer,
};
pub use value::{FieldType, GeometryKind, Value, ValueError};
