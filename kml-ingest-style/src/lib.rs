//! Style assembly and derived image assets for imported KML layers.
//!
//! Responsibilities:
//! - Turn captured style fragments into filtered rendering rules and
//!   serialise them as SLD ([`assembler`]).
//! - Generate tinted and scaled icons, fetching remote images at most once
//!   per run ([`assets`], [`fetch`]).
//!
//! Boundaries:
//! - Styles are captured by `kml-ingest-data`'s reader; this crate only
//!   consumes the resulting [`StyleMap`].
//! - Persistence goes through the host's [`kml_ingest_core::StyleWriter`].
//!
//! Invariants:
//! - The same map and prefix always serialise to the same bytes.
//! - Asset failures are warnings, never errors.
#![forbid(unsafe_code)]

pub mod assembler;
pub mod assets;
pub mod fetch;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use assembler::{
    DEFAULT_PUSHPIN, DEFAULT_STYLE_NAME, FeatureStyle, Filter, Rule, StyleDocument, StyleError,
    assemble, write_style,
};
pub use assets::{AssetCache, AssetError};
pub use fetch::{FetchBuildError, FetchError, HttpFetcher, HttpFetcherConfig, RemoteFetcher};

use kml_ingest_core::StyleMap;

/// Run a complete style assembly over `map`.
///
/// Missing graphic formats are sniffed, tinted or scaled graphics are
/// replaced by generated icons, and the rules are assembled with
/// `resource_prefix`. The cache is consumed so its temporary downloads are
/// removed; its warnings are returned beside the document.
///
/// # Examples
/// ```
/// use std::io::Write;
///
/// use kml_ingest_core::StyleMap;
/// use kml_ingest_style::{AssetCache, FetchError, RemoteFetcher, assemble_with_assets};
///
/// struct Offline;
///
/// impl RemoteFetcher for Offline {
///     fn fetch(&self, url: &str, _sink: &mut dyn Write) -> Result<u64, FetchError> {
///         Err(FetchError::Http { url: url.to_owned(), status: 503, message: "offline".to_owned() })
///     }
/// }
///
/// let cache = AssetCache::new(Offline, "/data/parks", "/srv/styles");
/// let (document, warnings) = assemble_with_assets(StyleMap::new(), "parks", "styles", cache);
/// assert_eq!(document.styles.len(), 1);
/// assert!(warnings.is_empty());
/// ```
pub fn assemble_with_assets<F: RemoteFetcher>(
    mut map: StyleMap,
    name: &str,
    resource_prefix: &str,
    mut cache: AssetCache<F>,
) -> (StyleDocument, Vec<String>) {
    cache.sniff_formats(&mut map);
    let updated = cache.process_graphics(&mut map);
    log::debug!("replaced {updated} graphics with generated icons");
    let document = assemble(&map, name, resource_prefix);
    (document, cache.finish())
}
