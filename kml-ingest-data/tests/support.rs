//! Shared helpers for the data crate's behavioural tests.

use kml_ingest_core::{TypedRecord, UnifiedSchema};
use kml_ingest_data::{Inference, KmlReader, ParseError, ReadMode, RecordTransformer, infer};

/// Outcome of running both passes over a document.
#[derive(Debug)]
pub struct PipelineRun {
    /// Result of the inference pass.
    pub inference: Inference,
    /// Records produced for each inferred schema, in schema order.
    pub partitions: Vec<(UnifiedSchema, Vec<TypedRecord>)>,
    /// Warnings raised by the transform passes.
    pub transform_warnings: Vec<String>,
}

impl PipelineRun {
    /// Every record across all partitions.
    pub fn records(&self) -> impl Iterator<Item = &TypedRecord> {
        self.partitions.iter().flat_map(|(_, records)| records)
    }
}

/// Wrap `body` in a KML document.
pub fn kml_document(body: &str) -> String {
    format!(r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>{body}</Document></kml>"#)
}

/// Infer `source`, then transform it once per inferred schema.
pub fn run_pipeline(source: &str, collate: bool, lenient: bool) -> Result<PipelineRun, ParseError> {
    let reader = KmlReader::new(source.as_bytes(), ReadMode::Full).with_lenient(lenient);
    let inference = infer(reader, "fixture", collate)?;
    let mut partitions = Vec::with_capacity(inference.schemas.len());
    let mut transform_warnings = Vec::new();
    for schema in &inference.schemas {
        let mut transformer = RecordTransformer::from_source(source.as_bytes(), schema, lenient);
        let records = transformer.by_ref().collect::<Result<Vec<_>, _>>()?;
        transform_warnings.extend(transformer.take_warnings());
        partitions.push((schema.clone(), records));
    }
    Ok(PipelineRun {
        inference,
        partitions,
        transform_warnings,
    })
}
