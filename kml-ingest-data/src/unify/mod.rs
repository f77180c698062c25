//! Schema inference over a full pass of the reader.
//!
//! [`infer`] drains a [`KmlReader`] and folds every record shape and declared
//! schema into one [`UnifiedSchema`]. Field types follow a first-writer-wins
//! policy: once a name is known its type never changes, even when a later
//! record disagrees.
//!
//! Every non-empty result carries the geometry, style and folder fields.
//! The structural `LookAt` and `Region` fields are dropped. Free-form
//! `ExtendedData` keys become text fields appended after the structural ones,
//! unless the name is already taken.
//!
//! With `collate` set, the schema is split into one partition per observed
//! geometry subtype. Records without geometry are assigned to
//! [`GeometryKind::NULL_GEOMETRY_PARTITION`], which is added to the set when
//! needed so that every record belongs to exactly one partition.
//!
//! [`GeometryKind::NULL_GEOMETRY_PARTITION`]: kml_ingest_core::GeometryKind::NULL_GEOMETRY_PARTITION

mod accumulator;

use std::io::BufRead;

use kml_ingest_core::{Field, UnifiedSchema};

use crate::reader::{KmlReader, ParseError, RawEvent};
use accumulator::SchemaAccumulator;

/// Outcome of the inference pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Inference {
    /// Unified schema, or one schema per geometry partition. Empty when the
    /// source held no records and no declarations.
    pub schemas: Vec<UnifiedSchema>,
    /// Warnings raised by the reader (lenient geometry, coercion).
    pub warnings: Vec<String>,
    /// Targets of the document's network links, in document order.
    pub links: Vec<String>,
}

impl Inference {
    /// Whether the source produced no schema.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Merge `incoming` into `target`.
///
/// Names already present keep their position and type; new names are
/// appended in the order given.
///
/// # Examples
/// ```
/// use kml_ingest_core::{Field, FieldType};
/// use kml_ingest_data::unify::merge_fields;
///
/// let mut fields = vec![Field::new("foo", FieldType::Integer)];
/// merge_fields(
///     &mut fields,
///     &[Field::new("foo", FieldType::Float), Field::text("bar")],
/// );
/// assert_eq!(
///     fields,
///     vec![Field::new("foo", FieldType::Integer), Field::text("bar")]
/// );
/// ```
pub fn merge_fields(target: &mut Vec<Field>, incoming: &[Field]) {
    for field in incoming {
        if !target.iter().any(|known| known.name == field.name) {
            target.push(field.clone());
        }
    }
}

/// Drain `reader` and unify everything it reports.
///
/// The reader should be in [`ReadMode::Full`](crate::reader::ReadMode::Full);
/// a filtered reader hides the declarations the unifier merges.
///
/// # Errors
///
/// Returns the reader's [`ParseError`] unchanged.
///
/// # Examples
/// ```
/// use kml_ingest_data::reader::{KmlReader, ReadMode};
/// use kml_ingest_data::unify::infer;
///
/// let source = b"<kml><Placemark><name>Pier</name></Placemark></kml>";
/// let inference = infer(KmlReader::new(&source[..], ReadMode::Full), "piers", false)?;
/// let [schema] = inference.schemas.as_slice() else {
///     panic!("expected one schema");
/// };
/// assert_eq!(schema.fields.len(), 9);
/// # Ok::<(), kml_ingest_data::ParseError>(())
/// ```
pub fn infer<R: BufRead>(
    mut reader: KmlReader<'_, R>,
    name: &str,
    collate: bool,
) -> Result<Inference, ParseError> {
    let mut accumulator = SchemaAccumulator::default();
    let mut links = Vec::new();
    while let Some(event) = reader.next_event()? {
        match event {
            RawEvent::Record(record) => accumulator.record(&record),
            RawEvent::SchemaDecl(declaration) => accumulator.declare(declaration),
            RawEvent::LinkRef(link) => {
                log::debug!("{name}: found network link to {}", link.target);
                links.push(link.target);
            }
        }
    }
    let warnings = reader.take_warnings();
    drop(reader);

    let schemas = accumulator.finish(name, collate);
    if schemas.is_empty() {
        log::debug!("{name}: source holds no records");
    }
    Ok(Inference {
        schemas,
        warnings,
        links,
    })
}
