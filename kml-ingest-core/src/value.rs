//! Attribute values and their declared types.
//!
//! A [`FieldType`] is what a schema promises; a [`Value`] is what a record
//! carries. Values read from free text are converted with
//! [`FieldType::coerce`], and values already typed by one schema are adapted
//! to another with [`Value::coerce_to`].

use std::fmt;
use std::str::FromStr;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Concrete geometry subtype used to partition records.
///
/// The set is closed: every [`geo::Geometry`] maps onto exactly one variant
/// through [`GeometryKind::of`]. Variant order is the partition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    /// A single position.
    Point,
    /// An open or closed path, including linear rings.
    LineString,
    /// An area bounded by an outer ring.
    Polygon,
    /// Several positions.
    MultiPoint,
    /// Several paths.
    MultiLineString,
    /// Several areas.
    MultiPolygon,
    /// A heterogeneous collection.
    GeometryCollection,
}

impl GeometryKind {
    /// Partition receiving records without a geometry.
    pub const NULL_GEOMETRY_PARTITION: Self = Self::Point;

    /// Classify a geometry.
    ///
    /// # Examples
    /// ```
    /// use geo::{Geometry, Point};
    /// use kml_ingest_core::GeometryKind;
    ///
    /// let point = Geometry::Point(Point::new(1.0, 2.0));
    /// assert_eq!(GeometryKind::of(&point), GeometryKind::Point);
    /// ```
    #[must_use]
    pub const fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Whether a record with `geometry` belongs to the partition for `self`.
    ///
    /// Records without geometry land in [`Self::NULL_GEOMETRY_PARTITION`].
    #[must_use]
    pub fn admits(self, geometry: Option<&Geometry<f64>>) -> bool {
        geometry.map_or(self == Self::NULL_GEOMETRY_PARTITION, |geom| {
            Self::of(geom) == self
        })
    }

    /// Name used in schema names and rendering filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text.
    Text,
    /// Signed integer (`int`, `uint`, `short`, `ushort`).
    Integer,
    /// Single precision number in the source declaration.
    Float,
    /// Double precision number in the source declaration.
    Double,
    /// Boolean flag (`0`/`1` or `true`/`false`).
    Boolean,
    /// Geometry, optionally narrowed to one subtype.
    Geometry(Option<GeometryKind>),
}

impl FieldType {
    /// Map a KML `SimpleField` type name onto a field type.
    ///
    /// Unknown names fall back to [`FieldType::Text`].
    #[must_use]
    pub fn from_kml_type(name: &str) -> Self {
        match name.trim() {
            "int" | "uint" | "short" | "ushort" => Self::Integer,
            "float" => Self::Float,
            "double" => Self::Double,
            "bool" => Self::Boolean,
            _ => Self::Text,
        }
    }

    /// Convert raw source text into a value of this type.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Conversion`] when the text does not parse as the
    /// declared type, or when the type is a geometry.
    ///
    /// # Examples
    /// ```
    /// use kml_ingest_core::{FieldType, Value};
    ///
    /// assert_eq!(FieldType::Integer.coerce(" 42 ")?, Value::Integer(42));
    /// assert_eq!(FieldType::Boolean.coerce("1")?, Value::Boolean(true));
    /// # Ok::<(), kml_ingest_core::ValueError>(())
    /// ```
    pub fn coerce(self, raw: &str) -> Result<Value, ValueError> {
        let trimmed = raw.trim();
        let conversion = || ValueError::Conversion {
            raw: raw.to_owned(),
            target: self,
        };
        match self {
            Self::Text => Ok(Value::Text(raw.to_owned())),
            Self::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| conversion()),
            Self::Float | Self::Double => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| conversion()),
            Self::Boolean => match trimmed {
                "1" | "true" => Ok(Value::Boolean(true)),
                "0" | "false" => Ok(Value::Boolean(false)),
                _ => Err(conversion()),
            },
            Self::Geometry(_) => Err(conversion()),
        }
    }

    /// Whether `value` already satisfies this type.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text, Value::Text(_))
            | (Self::Integer, Value::Integer(_))
            | (Self::Float | Self::Double, Value::Float(_))
            | (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Geometry(kind), Value::Geometry(geometry)) => {
                kind.is_none_or(|expected| GeometryKind::of(geometry) == expected)
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::Boolean => f.write_str("boolean"),
            Self::Geometry(None) => f.write_str("geometry"),
            Self::Geometry(Some(kind)) => write!(f, "geometry({kind})"),
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Free text.
    Text(String),
    /// Integral number.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Geometry in WGS84 longitude/latitude order.
    Geometry(Geometry<f64>),
}

impl Value {
    /// Borrow the text of a [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Adapt the value to `target`.
    ///
    /// Values that already satisfy the type are cloned. Text is parsed, and
    /// scalars are rendered when the target is text.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Conversion`] when no conversion exists.
    pub fn coerce_to(&self, target: FieldType) -> Result<Self, ValueError> {
        if target.accepts(self) {
            return Ok(self.clone());
        }
        match (self, target) {
            (Self::Text(text), _) => target.coerce(text),
            (Self::Integer(number), FieldType::Text) => Ok(Self::Text(number.to_string())),
            (Self::Float(number), FieldType::Text) => Ok(Self::Text(number.to_string())),
            (Self::Boolean(flag), FieldType::Text) => Ok(Self::Text(flag.to_string())),
            (Self::Integer(number), FieldType::Float | FieldType::Double) => {
                FieldType::Double.coerce(&number.to_string())
            }
            _ => Err(ValueError::Conversion {
                raw: format!("{self:?}"),
                target,
            }),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Geometry<f64>> for Value {
    fn from(value: Geometry<f64>) -> Self {
        Self::Geometry(value)
    }
}

impl FromStr for GeometryKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Point" => Ok(Self::Point),
            "LineString" | "LinearRing" => Ok(Self::LineString),
            "Polygon" => Ok(Self::Polygon),
            "MultiPoint" => Ok(Self::MultiPoint),
            "MultiLineString" => Ok(Self::MultiLineString),
            "MultiPolygon" => Ok(Self::MultiPolygon),
            "GeometryCollection" | "MultiGeometry" => Ok(Self::GeometryCollection),
            other => Err(ValueError::Conversion {
                raw: other.to_owned(),
                target: FieldType::Geometry(None),
            }),
        }
    }
}

/// Errors raised when converting values between types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValueError {
    /// The input could not be represented as the target type.
    #[error("cannot convert {raw:?} to {target}")]
    Conversion {
        /// Offending input, rendered for diagnostics.
        raw: String,
        /// Requested type.
        target: FieldType,
    },
}
