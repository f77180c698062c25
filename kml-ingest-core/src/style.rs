//! Style fragments captured while reading a document.
//!
//! The reader pushes every `Style` and `StyleMap` it meets into a
//! [`StyleSink`]. [`StyleMap`] is the sink the pipeline uses: keyed by
//! identifier, last declaration wins, iterated in identifier order.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a style fragment, in the form records reference it
/// (for example `#sunny`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(String);

impl StyleId {
    /// Wrap an identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identifier for a document-level `id` attribute.
    ///
    /// # Examples
    /// ```
    /// use kml_ingest_core::StyleId;
    ///
    /// assert_eq!(StyleId::from_element_id("sunny").as_str(), "#sunny");
    /// ```
    #[must_use]
    pub fn from_element_id(id: &str) -> Self {
        Self(format!("#{id}"))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for StyleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for StyleId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
    /// Alpha channel, 255 is opaque.
    pub alpha: u8,
}

impl Color {
    /// Opaque white, the identity tint.
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);

    /// Construct a colour from its channels.
    #[must_use]
    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Parse a KML `aabbggrr` colour.
    ///
    /// # Errors
    ///
    /// Returns [`ColorError`] unless the input is eight hex digits.
    ///
    /// # Examples
    /// ```
    /// use kml_ingest_core::Color;
    ///
    /// let color = Color::from_kml("d00d1e55")?;
    /// assert_eq!(color.to_argb(), 0xd055_1e0d);
    /// # Ok::<(), kml_ingest_core::ColorError>(())
    /// ```
    pub fn from_kml(raw: &str) -> Result<Self, ColorError> {
        let [alpha, blue, green, red] = parse_channels::<4>(raw.trim().trim_start_matches('#'))
            .ok_or_else(|| ColorError::Malformed(raw.to_owned()))?;
        Ok(Self::rgba(red, green, blue, alpha))
    }

    /// Pack the colour as `0xAARRGGBB`.
    #[must_use]
    pub const fn to_argb(self) -> u32 {
        u32::from_be_bytes([self.alpha, self.red, self.green, self.blue])
    }

    /// Render as `#RRGGBB`, dropping alpha.
    #[must_use]
    pub fn to_rgb_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }

    /// Alpha as a fraction in `0.0..=1.0`.
    #[must_use]
    pub fn opacity(self) -> f64 {
        f64::from(self.alpha) / 255.0
    }
}

impl FromStr for Color {
    type Err = ColorError;

    /// Parse `#RRGGBB` or `#AARRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        if let Some([red, green, blue]) = parse_channels::<3>(digits) {
            return Ok(Self::rgba(red, green, blue, 255));
        }
        let [alpha, red, green, blue] =
            parse_channels::<4>(digits).ok_or_else(|| ColorError::Malformed(s.to_owned()))?;
        Ok(Self::rgba(red, green, blue, alpha))
    }
}

fn parse_channels<const N: usize>(digits: &str) -> Option<[u8; N]> {
    if digits.len() != N * 2 || !digits.is_ascii() {
        return None;
    }
    let mut channels = [0_u8; N];
    for (slot, pair) in channels.iter_mut().zip(digits.as_bytes().chunks(2)) {
        let text = std::str::from_utf8(pair).ok()?;
        *slot = u8::from_str_radix(text, 16).ok()?;
    }
    Some(channels)
}

/// Errors raised while parsing colours.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ColorError {
    /// The text is not a hex colour of the expected width.
    #[error("malformed colour {0:?}")]
    Malformed(String),
}

/// Image reference inside a point symbolizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalGraphic {
    /// Link to the image, relative or absolute.
    pub href: String,
    /// MIME type, when known.
    pub format: Option<String>,
    /// Requested tint.
    pub tint: Option<Color>,
    /// Requested scale factor.
    pub scale: Option<f64>,
}

impl ExternalGraphic {
    /// Reference `href`, guessing the MIME type from its extension.
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        let format = format_from_extension(&href).map(str::to_owned);
        Self {
            href,
            format,
            tint: None,
            scale: None,
        }
    }

    /// Request a tinted derivative.
    #[must_use]
    pub const fn with_tint(mut self, tint: Color) -> Self {
        self.tint = Some(tint);
        self
    }

    /// Request a scaled derivative.
    #[must_use]
    pub const fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Whether the MIME type still needs resolving.
    #[must_use]
    pub fn format_missing(&self) -> bool {
        self.format.as_deref().is_none_or(|format| format == "unknown")
    }

    /// Whether a derived asset must be generated.
    #[must_use]
    pub const fn needs_processing(&self) -> bool {
        self.tint.is_some() || self.scale.is_some()
    }
}

fn format_from_extension(href: &str) -> Option<&'static str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// One styling directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbolizer {
    /// Icon marker (`IconStyle`).
    Point {
        /// Marker image.
        graphic: Option<ExternalGraphic>,
    },
    /// Stroke (`LineStyle`).
    Line {
        /// Stroke colour.
        stroke: Option<Color>,
        /// Stroke width in pixels.
        width: Option<f64>,
    },
    /// Area fill (`PolyStyle`).
    Polygon {
        /// Fill colour.
        fill: Option<Color>,
        /// Whether the area is filled.
        filled: bool,
        /// Whether the area is outlined.
        outlined: bool,
    },
    /// Label (`LabelStyle`).
    Text {
        /// Label colour.
        color: Option<Color>,
        /// Label scale.
        scale: Option<f64>,
    },
}

impl Symbolizer {
    /// Whether this is an area fill directive.
    #[must_use]
    pub const fn is_polygon(&self) -> bool {
        matches!(self, Self::Polygon { .. })
    }

    /// Borrow the marker image of a point symbolizer.
    pub fn graphic_mut(&mut self) -> Option<&mut ExternalGraphic> {
        match self {
            Self::Point { graphic } => graphic.as_mut(),
            _ => None,
        }
    }

    /// Borrow the marker image of a point symbolizer.
    #[must_use]
    pub const fn graphic(&self) -> Option<&ExternalGraphic> {
        match self {
            Self::Point { graphic } => graphic.as_ref(),
            _ => None,
        }
    }
}

/// Styling captured for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleFragment {
    /// Identifier records use to refer to the style.
    pub id: StyleId,
    /// Directives in declaration order.
    pub symbolizers: Vec<Symbolizer>,
}

impl StyleFragment {
    /// Build a fragment.
    pub fn new(id: impl Into<StyleId>, symbolizers: Vec<Symbolizer>) -> Self {
        Self {
            id: id.into(),
            symbolizers,
        }
    }

    /// A fragment with no directives stands in for a `StyleMap` alias.
    #[must_use]
    pub fn is_alias(&self) -> bool {
        self.symbolizers.is_empty()
    }
}

impl From<String> for StyleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Receiver for style fragments met during parsing.
pub trait StyleSink {
    /// Record a fragment.
    fn capture(&mut self, fragment: StyleFragment);
}

/// Captured fragments keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleMap {
    fragments: BTreeMap<StyleId, StyleFragment>,
}

impl StyleMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fragment, replacing any earlier one with the same identifier.
    pub fn insert(&mut self, fragment: StyleFragment) -> Option<StyleFragment> {
        self.fragments.insert(fragment.id.clone(), fragment)
    }

    /// Look up a fragment.
    #[must_use]
    pub fn get(&self, id: &StyleId) -> Option<&StyleFragment> {
        self.fragments.get(id)
    }

    /// Iterate fragments in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &StyleFragment> {
        self.fragments.values()
    }

    /// Iterate the marker images of non-alias fragments in identifier order.
    pub fn graphics_mut(&mut self) -> impl Iterator<Item = &mut ExternalGraphic> {
        self.fragments
            .values_mut()
            .flat_map(|fragment| fragment.symbolizers.iter_mut())
            .filter_map(Symbolizer::graphic_mut)
    }

    /// Number of captured identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl StyleSink for StyleMap {
    fn capture(&mut self, fragment: StyleFragment) {
        self.insert(fragment);
    }
}

impl FromIterator<StyleFragment> for StyleMap {
    fn from_iter<T: IntoIterator<Item = StyleFragment>>(iter: T) -> Self {
        let mut map = Self::new();
        for fragment in iter {
            map.insert(fragment);
        }
        map
    }
}
