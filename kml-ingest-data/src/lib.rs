//! Reading and shaping KML sources.
//!
//! Responsibilities:
//! - Pull raw events out of a KML document ([`reader`]).
//! - Infer the unified schema of a source ([`unify`]).
//! - Stream typed records onto that schema ([`transform`]).
//! - Handle the on-disk shape of KML and KMZ inputs ([`format`]).
//!
//! Boundaries:
//! - Style fragments are only captured here; rule assembly and image assets
//!   live in `kml-ingest-style`.
//! - Nothing here writes to a catalog or store.
//!
//! Invariants:
//! - Parse errors surface unchanged from every stage.
//! - Two passes over the same bytes observe the same records in the same
//!   order.
#![forbid(unsafe_code)]

pub mod format;
pub mod reader;
pub mod transform;
pub mod unify;

pub use format::{
    FormatError, KmzUnpacker, can_read, deploy_resources, locate_document, resource_paths,
    type_name_from_file,
};
pub use reader::{KmlReader, LinkRef, ParseError, RawEvent, RawRecord, ReadMode, SchemaDecl};
pub use transform::{RecordTransformer, RewriteConfigError, RewriteRule, reader_mode_for};
pub use unify::{Inference, infer, merge_fields};
