//! Interfaces to the host that embeds the pipeline.
//!
//! The pipeline never talks to a backing store, an archive format or a style
//! repository directly. Hosts implement these traits and hand them in.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::UnifiedSchema;

/// Expands a compressed container next to itself.
pub trait ContainerUnpacker {
    /// Unpack `container` into a sibling directory and return that directory.
    ///
    /// The directory keeps the container's file name (extension included)
    /// and the container file is removed.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the container cannot be read or expanded.
    fn unpack(&self, container: &Utf8Path) -> io::Result<Utf8PathBuf>;
}

/// Persists serialised style documents.
pub trait StyleWriter {
    /// Store `document` under `identifier`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the document cannot be stored.
    fn write_style(&mut self, identifier: &str, document: &[u8]) -> io::Result<()>;
}

/// Materialises schemas in a backing catalogue.
pub trait CatalogSink {
    /// Register `schema` so typed records can be attached to it.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalogue refuses the schema.
    fn attach(&mut self, schema: &UnifiedSchema) -> Result<(), CatalogError>;
}

/// Failures reported by a [`CatalogSink`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// The catalogue rejected the schema.
    #[error("catalogue rejected schema {schema}: {message}")]
    Rejected {
        /// Schema name.
        schema: String,
        /// Reason given by the catalogue.
        message: String,
    },
    /// Writing to the catalogue failed.
    #[error("catalogue IO failed for schema {schema}")]
    Io {
        /// Schema name.
        schema: String,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}
