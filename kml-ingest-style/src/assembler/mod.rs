//! Rendering rules assembled from captured style fragments.
//!
//! Records carry the identifier of their style in the `Style` field, so each
//! fragment becomes a feature style whose rules are guarded by an equality
//! filter on that field. Area fills are split into a rule of their own that
//! also requires a polygon geometry, matching how the fragments render in
//! their source application. A trailing default style gives records without
//! a style a yellow pushpin.
//!
//! Assembly is deterministic: fragments are visited in identifier order and
//! nothing depends on hash iteration.

mod sld;

use std::io;

use kml_ingest_core::{
    GEOMETRY_FIELD, GeometryKind, STYLE_FIELD, StyleFragment, StyleMap, StyleWriter, Symbolizer,
    TypedRecord, Value,
};
use thiserror::Error;

/// Name of the fallback feature style.
pub const DEFAULT_STYLE_NAME: &str = "defaultPushpinStyle";

/// Marker drawn for records without a style.
pub const DEFAULT_PUSHPIN: &str = "http://maps.google.com/mapfiles/kml/pushpin/ylw-pushpin.png";

/// Errors raised while serialising or persisting a style document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StyleError {
    /// The document could not be serialised.
    #[error("failed to serialise style {name}")]
    Serialise {
        /// Document name.
        name: String,
        /// Writer failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The persistence collaborator refused the document.
    #[error("failed to persist style {identifier}")]
    Persist {
        /// Identifier the document was stored under.
        identifier: String,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Condition selecting the records a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// The text property equals the literal, ignoring ASCII case.
    PropertyEquals {
        /// Property name.
        property: String,
        /// Expected value.
        literal: String,
    },
    /// The geometry property is of the given subtype.
    GeometryTypeEquals {
        /// Geometry property name.
        property: String,
        /// Expected subtype.
        kind: GeometryKind,
    },
    /// The property is absent.
    PropertyIsNull {
        /// Property name.
        property: String,
    },
    /// Every nested filter matches.
    And(Vec<Filter>),
}

impl Filter {
    /// Match records whose style reference is `id`.
    pub fn style_equals(id: impl Into<String>) -> Self {
        Self::PropertyEquals {
            property: STYLE_FIELD.to_owned(),
            literal: id.into(),
        }
    }

    /// Whether `record` satisfies the filter.
    #[must_use]
    pub fn matches(&self, record: &TypedRecord) -> bool {
        match self {
            Self::PropertyEquals { property, literal } => record
                .text(property)
                .is_some_and(|value| value.eq_ignore_ascii_case(literal)),
            Self::GeometryTypeEquals { property, kind } => match record.get(property) {
                Some(Value::Geometry(geometry)) => GeometryKind::of(geometry) == *kind,
                _ => false,
            },
            Self::PropertyIsNull { property } => record.get(property).is_none(),
            Self::And(filters) => filters.iter().all(|filter| filter.matches(record)),
        }
    }
}

/// Symbolizers applied to the records a filter selects.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Selection condition.
    pub filter: Filter,
    /// Directives in drawing order.
    pub symbolizers: Vec<Symbolizer>,
}

/// Rules generated for one style identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStyle {
    /// Style identifier, or [`DEFAULT_STYLE_NAME`].
    pub name: String,
    /// Rules in evaluation order.
    pub rules: Vec<Rule>,
}

/// Assembled rendering rules for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDocument {
    /// Layer name.
    pub name: String,
    /// Feature styles in identifier order, the default style last.
    pub styles: Vec<FeatureStyle>,
}

impl StyleDocument {
    /// Every rule in document order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.styles.iter().flat_map(|style| style.rules.iter())
    }

    /// Rules whose filter selects `record`.
    #[must_use]
    pub fn rules_for(&self, record: &TypedRecord) -> Vec<&Rule> {
        self.rules()
            .filter(|rule| rule.filter.matches(record))
            .collect()
    }

    /// Serialise as an SLD 1.0 `StyledLayerDescriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`StyleError::Serialise`] when the XML writer fails.
    pub fn to_sld(&self) -> Result<String, StyleError> {
        sld::write_document(self).map_err(|source| StyleError::Serialise {
            name: self.name.clone(),
            source,
        })
    }
}

/// Build rendering rules for every non-alias fragment in `map`.
///
/// Relative graphic links are rewritten to `{resource_prefix}/{link}`; an
/// empty prefix leaves them untouched.
///
/// # Examples
/// ```
/// use kml_ingest_core::{Color, StyleFragment, StyleMap, Symbolizer};
/// use kml_ingest_style::assembler::{assemble, DEFAULT_STYLE_NAME};
///
/// let map: StyleMap = [StyleFragment::new(
///     "#river",
///     vec![Symbolizer::Line { stroke: Some(Color::rgba(0, 0, 255, 255)), width: Some(2.0) }],
/// )]
/// .into_iter()
/// .collect();
/// let document = assemble(&map, "rivers", "styles");
/// let names: Vec<&str> = document.styles.iter().map(|style| style.name.as_str()).collect();
/// assert_eq!(names, ["#river", DEFAULT_STYLE_NAME]);
/// assert!(document.to_sld()?.contains("<ogc:Literal>#river</ogc:Literal>"));
/// # Ok::<(), kml_ingest_style::assembler::StyleError>(())
/// ```
#[must_use]
pub fn assemble(map: &StyleMap, name: &str, resource_prefix: &str) -> StyleDocument {
    let mut styles: Vec<FeatureStyle> = map
        .iter()
        .filter(|fragment| !fragment.is_alias())
        .map(|fragment| feature_style(fragment, resource_prefix))
        .collect();
    styles.push(default_style());
    StyleDocument {
        name: name.to_owned(),
        styles,
    }
}

/// Serialise `document` and hand it to `writer` under `identifier`.
///
/// # Errors
///
/// Returns [`StyleError`] when serialisation fails or the writer refuses the
/// document.
pub fn write_style(
    writer: &mut dyn StyleWriter,
    identifier: &str,
    document: &StyleDocument,
) -> Result<(), StyleError> {
    let sld = document.to_sld()?;
    writer
        .write_style(identifier, sld.as_bytes())
        .map_err(|source| StyleError::Persist {
            identifier: identifier.to_owned(),
            source,
        })
}

fn feature_style(fragment: &StyleFragment, resource_prefix: &str) -> FeatureStyle {
    let id = fragment.id.as_str();
    let (polygons, others): (Vec<Symbolizer>, Vec<Symbolizer>) = fragment
        .symbolizers
        .iter()
        .cloned()
        .map(|symbolizer| prefix_graphic(symbolizer, resource_prefix))
        .partition(Symbolizer::is_polygon);

    let mut rules: Vec<Rule> = polygons
        .into_iter()
        .map(|polygon| Rule {
            filter: Filter::And(vec![
                Filter::style_equals(id),
                Filter::GeometryTypeEquals {
                    property: GEOMETRY_FIELD.to_owned(),
                    kind: GeometryKind::Polygon,
                },
            ]),
            symbolizers: vec![polygon],
        })
        .collect();
    if !others.is_empty() {
        rules.push(Rule {
            filter: Filter::style_equals(id),
            symbolizers: others,
        });
    }
    FeatureStyle {
        name: id.to_owned(),
        rules,
    }
}

fn prefix_graphic(mut symbolizer: Symbolizer, resource_prefix: &str) -> Symbolizer {
    if resource_prefix.is_empty() {
        return symbolizer;
    }
    if let Some(graphic) = symbolizer.graphic_mut()
        && is_relative(&graphic.href)
    {
        graphic.href = format!("{resource_prefix}/{}", graphic.href);
    }
    symbolizer
}

fn is_relative(link: &str) -> bool {
    matches!(
        url::Url::parse(link),
        Err(url::ParseError::RelativeUrlWithoutBase)
    )
}

fn default_style() -> FeatureStyle {
    let mut pin = kml_ingest_core::ExternalGraphic::new(DEFAULT_PUSHPIN);
    pin.format = Some("image/png".to_owned());
    FeatureStyle {
        name: DEFAULT_STYLE_NAME.to_owned(),
        rules: vec![Rule {
            filter: Filter::PropertyIsNull {
                property: STYLE_FIELD.to_owned(),
            },
            symbolizers: vec![Symbolizer::Point { graphic: Some(pin) }],
        }],
    }
}
