//! In-memory host collaborators used by unit and behaviour tests.

use std::io;

use crate::{CatalogError, CatalogSink, StyleWriter, UnifiedSchema};

/// `StyleWriter` that keeps every document in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingStyleWriter {
    documents: Vec<(String, Vec<u8>)>,
}

impl RecordingStyleWriter {
    /// Documents written so far, in write order.
    #[must_use]
    pub fn documents(&self) -> &[(String, Vec<u8>)] {
        &self.documents
    }
}

impl StyleWriter for RecordingStyleWriter {
    fn write_style(&mut self, identifier: &str, document: &[u8]) -> io::Result<()> {
        self.documents.push((identifier.to_owned(), document.to_vec()));
        Ok(())
    }
}

/// `CatalogSink` that records attached schemas and can reject names.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    schemas: Vec<UnifiedSchema>,
    rejected: Vec<String>,
}

impl MemoryCatalog {
    /// Build a catalogue that refuses the given schema names.
    #[must_use]
    pub fn rejecting(names: Vec<String>) -> Self {
        Self {
            schemas: Vec::new(),
            rejected: names,
        }
    }

    /// Schemas accepted so far.
    #[must_use]
    pub fn schemas(&self) -> &[UnifiedSchema] {
        &self.schemas
    }
}

impl CatalogSink for MemoryCatalog {
    fn attach(&mut self, schema: &UnifiedSchema) -> Result<(), CatalogError> {
        if self.rejected.contains(&schema.name) {
            return Err(CatalogError::Rejected {
                schema: schema.name.clone(),
                message: "name reserved".to_owned(),
            });
        }
        self.schemas.push(schema.clone());
        Ok(())
    }
}
