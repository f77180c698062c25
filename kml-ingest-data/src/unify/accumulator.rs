//! Running aggregate built during the inference pass.
//!
//! Collects record shapes, declared schemas, free-form attribute keys and
//! observed geometry subtypes, then freezes them into unified schemas.
use std::collections::BTreeSet;

use indexmap::IndexSet;
use kml_ingest_core::{
    FOLDER_FIELD, Field, FieldType, GEOMETRY_FIELD, GeometryKind, LOOK_AT_FIELD, REGION_FIELD,
    STYLE_FIELD, UnifiedSchema,
};

use super::merge_fields;
use crate::reader::{RawRecord, SchemaDecl};

/// Fields that never survive into a unified schema as observed.
const DROPPED_FIELDS: [&str; 4] = [GEOMETRY_FIELD, LOOK_AT_FIELD, REGION_FIELD, STYLE_FIELD];

#[derive(Debug, Default)]
pub(super) struct SchemaAccumulator {
    record_fields: Vec<Field>,
    declared: Vec<SchemaDecl>,
    untyped: IndexSet<String>,
    kinds: BTreeSet<GeometryKind>,
    saw_null_geometry: bool,
    records: usize,
}

impl SchemaAccumulator {
    pub(super) fn record(&mut self, record: &RawRecord) {
        self.records += 1;
        merge_fields(&mut self.record_fields, &record.fields);
        for key in record.untyped.keys() {
            self.untyped.insert(key.clone());
        }
        match &record.geometry {
            Some(geometry) => {
                self.kinds.insert(GeometryKind::of(geometry));
            }
            None => self.saw_null_geometry = true,
        }
    }

    pub(super) fn declare(&mut self, declaration: SchemaDecl) {
        self.declared.push(declaration);
    }

    /// Freeze the aggregate.
    ///
    /// Returns no schema at all when neither records nor declarations were
    /// seen.
    pub(super) fn finish(self, name: &str, collate: bool) -> Vec<UnifiedSchema> {
        if self.records == 0 && self.declared.is_empty() {
            return Vec::new();
        }
        let mut observed = self.record_fields;
        for declaration in &self.declared {
            merge_fields(&mut observed, &declaration.fields);
        }

        let mut fields = vec![Field::new(GEOMETRY_FIELD, FieldType::Geometry(None))];
        let kept: Vec<Field> = observed
            .into_iter()
            .filter(|field| !DROPPED_FIELDS.contains(&field.name.as_str()))
            .collect();
        merge_fields(&mut fields, &kept);
        merge_fields(
            &mut fields,
            &[Field::text(STYLE_FIELD), Field::text(FOLDER_FIELD)],
        );
        let untyped: Vec<Field> = self.untyped.into_iter().map(Field::text).collect();
        merge_fields(&mut fields, &untyped);

        let declared_names = self
            .declared
            .into_iter()
            .map(|declaration| declaration.name)
            .collect();
        let schema = UnifiedSchema::new(name, fields).with_declared_schemas(declared_names);

        if !collate || self.kinds.is_empty() {
            return vec![schema];
        }
        let mut kinds = self.kinds;
        if self.saw_null_geometry {
            kinds.insert(GeometryKind::NULL_GEOMETRY_PARTITION);
        }
        kinds.into_iter().map(|kind| schema.partition(kind)).collect()
    }
}
