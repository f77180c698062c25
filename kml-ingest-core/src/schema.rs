//! Unified schemas and the typed records that conform to them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{FieldType, GeometryKind, Value};

/// Name of the geometry field.
pub const GEOMETRY_FIELD: &str = "Geometry";
/// Name of the synthesised style reference field.
pub const STYLE_FIELD: &str = "Style";
/// Name of the synthesised folder lineage field.
pub const FOLDER_FIELD: &str = "Folder";
/// Camera hint dropped from unified schemas.
pub const LOOK_AT_FIELD: &str = "LookAt";
/// Visibility region dropped from unified schemas.
pub const REGION_FIELD: &str = "Region";
/// Placemark name.
pub const NAME_FIELD: &str = "name";
/// Placemark visibility flag.
pub const VISIBILITY_FIELD: &str = "visibility";
/// Placemark open flag.
pub const OPEN_FIELD: &str = "open";
/// Placemark postal address.
pub const ADDRESS_FIELD: &str = "address";
/// Placemark phone number.
pub const PHONE_NUMBER_FIELD: &str = "phoneNumber";
/// Free-text placemark description.
pub const DESCRIPTION_FIELD: &str = "description";

/// Spatial reference system tagged on every schema.
pub const KML_SRS: &str = "EPSG:4326";

/// Separator used when flattening folder lineage.
pub const FOLDER_SEPARATOR: &str = " -> ";

/// A named, typed schema field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name, unique within a schema.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    /// Construct a field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Construct a text field.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }
}

/// Structural shape of a `Placemark` as the reader reports it.
///
/// Order matters: it seeds the field order of every unified schema.
#[must_use]
pub fn placemark_fields() -> Vec<Field> {
    vec![
        Field::text(NAME_FIELD),
        Field::new(VISIBILITY_FIELD, FieldType::Boolean),
        Field::new(OPEN_FIELD, FieldType::Boolean),
        Field::text(ADDRESS_FIELD),
        Field::text(PHONE_NUMBER_FIELD),
        Field::text(DESCRIPTION_FIELD),
        Field::new(LOOK_AT_FIELD, FieldType::Geometry(Some(GeometryKind::Point))),
        Field::text(STYLE_FIELD),
        Field::new(REGION_FIELD, FieldType::Geometry(Some(GeometryKind::LineString))),
        Field::new(GEOMETRY_FIELD, FieldType::Geometry(None)),
    ]
}

/// Flat description of every record found in a source.
///
/// Field names are unique and keep insertion order. Once inference finishes
/// the schema is treated as read-only.
///
/// # Examples
/// ```
/// use kml_ingest_core::{Field, FieldType, GeometryKind, UnifiedSchema};
///
/// let schema = UnifiedSchema::new(
///     "parks",
///     vec![
///         Field::new("Geometry", FieldType::Geometry(None)),
///         Field::text("name"),
///     ],
/// );
/// let points = schema.partition(GeometryKind::Point);
/// assert_eq!(points.name, "parksPoint");
/// assert_eq!(points.geometry_kind(), Some(GeometryKind::Point));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedSchema {
    /// Schema name.
    pub name: String,
    /// Spatial reference system identifier.
    #[serde(default = "default_srs")]
    pub srs: String,
    /// Ordered fields.
    pub fields: Vec<Field>,
    /// Names of the declared schemas that contributed fields.
    #[serde(default)]
    pub declared_schemas: Vec<String>,
}

fn default_srs() -> String {
    KML_SRS.to_owned()
}

impl UnifiedSchema {
    /// Build a schema tagged with [`KML_SRS`].
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            srs: default_srs(),
            fields,
            declared_schemas: Vec::new(),
        }
    }

    /// Attach the declared schema names used by the filtered second pass.
    #[must_use]
    pub fn with_declared_schemas(mut self, names: Vec<String>) -> Self {
        self.declared_schemas = names;
        self
    }

    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Whether the schema has a field called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Subtype the geometry field is narrowed to, if any.
    #[must_use]
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        match self.field(GEOMETRY_FIELD)?.field_type {
            FieldType::Geometry(kind) => kind,
            _ => None,
        }
    }

    /// Clone the schema for one geometry subtype.
    ///
    /// The name gains the subtype as a suffix and the geometry field is
    /// narrowed. Every other field is unchanged.
    #[must_use]
    pub fn partition(&self, kind: GeometryKind) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|field| {
                if field.name == GEOMETRY_FIELD {
                    Field::new(GEOMETRY_FIELD, FieldType::Geometry(Some(kind)))
                } else {
                    field.clone()
                }
            })
            .collect();
        Self {
            name: format!("{}{kind}", self.name),
            srs: self.srs.clone(),
            fields,
            declared_schemas: self.declared_schemas.clone(),
        }
    }
}

/// A record mapped onto a [`UnifiedSchema`].
///
/// Absent source values are omitted from `attrs` rather than defaulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedRecord {
    /// Record identifier.
    pub id: String,
    /// Attribute values keyed by field name, in schema order.
    pub attrs: IndexMap<String, Value>,
}

impl TypedRecord {
    /// Read an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// Read a text attribute.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn placemark_shape_starts_with_name_and_ends_with_geometry() {
        let fields = placemark_fields();
        assert_eq!(fields.first().map(|f| f.name.as_str()), Some(NAME_FIELD));
        assert_eq!(fields.last().map(|f| f.name.as_str()), Some(GEOMETRY_FIELD));
        assert_eq!(fields.len(), 10);
    }

    #[rstest]
    fn partition_keeps_everything_but_geometry_type() {
        let schema = UnifiedSchema::new(
            "doc",
            vec![
                Field::new(GEOMETRY_FIELD, FieldType::Geometry(None)),
                Field::text(NAME_FIELD),
            ],
        )
        .with_declared_schemas(vec!["legacy".into()]);
        let polygons = schema.partition(GeometryKind::Polygon);
        assert_eq!(polygons.name, "docPolygon");
        assert_eq!(polygons.declared_schemas, vec!["legacy".to_owned()]);
        assert_eq!(
            polygons.field(NAME_FIELD),
            schema.field(NAME_FIELD),
            "non-geometry fields are shared"
        );
        assert_eq!(schema.geometry_kind(), None);
    }

    #[rstest]
    fn schema_round_trips_through_json_with_default_srs() {
        let json = r#"{"name":"cached","fields":[{"name":"foo","type":"integer"}]}"#;
        let schema: UnifiedSchema = serde_json::from_str(json).expect("schema json");
        assert_eq!(schema.srs, KML_SRS);
        assert_eq!(schema.field("foo").map(|f| f.field_type), Some(FieldType::Integer));
    }
}
