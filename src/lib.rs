//! Facade crate for the KML importer.
//!
//! This crate re-exports the core domain types and the reading, schema and
//! record stages. Style assembly and image assets sit behind the `style`
//! feature.
//!
//! # Examples
//! ```
//! use kml_ingest::{KmlReader, ReadMode, RecordTransformer, infer, reader_mode_for};
//!
//! let source = b"<kml><Placemark><name>Pier</name></Placemark></kml>";
//! let inference = infer(KmlReader::new(&source[..], ReadMode::Full), "piers", false)?;
//! let schema = &inference.schemas[0];
//! let reader = KmlReader::new(&source[..], reader_mode_for(schema));
//! let records = RecordTransformer::open(reader, schema).collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(records[0].text("name"), Some("Pier"));
//! # Ok::<(), kml_ingest::ParseError>(())
//! ```

#![forbid(unsafe_code)]

pub use kml_ingest_core::{
    CatalogError, CatalogSink, Color, ContainerUnpacker, ExternalGraphic, Field, FieldType,
    GeometryKind, StyleFragment, StyleId, StyleMap, StyleSink, StyleWriter, Symbolizer,
    TypedRecord, UnifiedSchema, Value,
};

pub use kml_ingest_data::{
    FormatError, Inference, KmlReader, KmzUnpacker, ParseError, RawEvent, ReadMode,
    RecordTransformer, RewriteRule, can_read, infer, reader_mode_for, type_name_from_file,
};

#[cfg(feature = "style")]
pub use kml_ingest_style::{
    AssetCache, HttpFetcher, RemoteFetcher, StyleDocument, StyleError, assemble,
    assemble_with_assets, write_style,
};
