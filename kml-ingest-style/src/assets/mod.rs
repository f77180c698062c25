//! Derived icon generation for tinted and scaled graphics.
//!
//! [`AssetCache`] turns a `(source, tint, scale)` request into an image file
//! in a destination directory. It is scoped to one assembly run:
//!
//! - each distinct request is resolved once, failures included, so a broken
//!   link is reported a single time rather than on every reference;
//! - each remote location is fetched at most once into a temporary file,
//!   whatever tints and scales are later requested from it;
//! - temporary downloads are deleted by [`AssetCache::finish`] or when the
//!   cache is dropped.
//!
//! Failures never abort the run. They become warnings returned by
//! [`AssetCache::finish`].

mod raster;

use std::collections::HashMap;
use std::error::Error as _;
use std::io::{self, Cursor, Read};

use camino::{Utf8Path, Utf8PathBuf};
use image::{ImageError, ImageFormat, ImageReader};
use kml_ingest_core::{Color, StyleMap};
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use crate::fetch::{FetchError, RemoteFetcher};

/// Magic numbers of the image formats graphics are sniffed for.
const MAGIC_NUMBERS: [(&[u8], &str); 3] = [
    (&[0x89, 0x50, 0x4E, 0x47], "image/png"),
    (&[0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg"),
    (&[0x47, 0x49, 0x46, 0x38], "image/gif"),
];

/// Reasons a derived asset could not be produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssetError {
    /// The source is neither a relative path nor a `file`, `http` or
    /// `https` URL.
    #[error("unsupported location {uri:?}")]
    UnsupportedLocation {
        /// Source as referenced.
        uri: String,
    },
    /// The source does not end in a file name.
    #[error("{uri} does not name a file")]
    NoFileName {
        /// Source as referenced.
        uri: String,
    },
    /// Fetching the remote source failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// An earlier fetch of the same location failed.
    #[error("{uri} could not be fetched earlier in this run")]
    EarlierFetchFailed {
        /// Remote location.
        uri: String,
    },
    /// A temporary download could not be created or read.
    #[error("temporary download failed")]
    Temporary(#[source] io::Error),
    /// A local file could not be read or written.
    #[error("failed to access {path}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The source is not a decodable image.
    #[error("failed to decode {uri}")]
    Decode {
        /// Source as referenced.
        uri: String,
        /// Decoder failure.
        #[source]
        source: ImageError,
    },
    /// The derived image could not be encoded.
    #[error("failed to encode {path}")]
    Encode {
        /// Output path.
        path: Utf8PathBuf,
        /// Encoder failure.
        #[source]
        source: ImageError,
    },
    /// The scale factor cannot produce a non-empty image.
    #[error("cannot scale {uri} by {scale}")]
    InvalidScale {
        /// Source as referenced.
        uri: String,
        /// Requested factor.
        scale: f64,
    },
    /// Neither the output name nor the source reveal an image format.
    #[error("no output format for {path}")]
    UnknownFormat {
        /// Output path.
        path: Utf8PathBuf,
    },
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> AssetError + '_ {
    move |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssetKey {
    scale: Option<u64>,
    tint: Option<u32>,
    source: String,
}

impl AssetKey {
    fn new(source: &str, tint: Option<Color>, scale: Option<f64>) -> Self {
        Self {
            scale: scale.map(f64::to_bits),
            tint: tint.map(Color::to_argb),
            source: source.to_owned(),
        }
    }
}

enum Location {
    Local(Utf8PathBuf),
    Remote(Url),
}

/// Per-run cache of derived icons.
///
/// # Examples
/// ```no_run
/// use kml_ingest_core::Color;
/// use kml_ingest_style::assets::AssetCache;
/// use kml_ingest_style::fetch::HttpFetcher;
///
/// let mut cache = AssetCache::new(HttpFetcher::new()?, "/data/parks", "/srv/styles");
/// let tinted = cache.resolve(
///     "http://maps.google.com/mapfiles/kml/pushpin/ylw-pushpin.png",
///     Some(Color::rgba(255, 0, 0, 255)),
///     Some(1.5),
/// );
/// for warning in cache.finish() {
///     eprintln!("{warning}");
/// }
/// # let _ = tinted;
/// # Ok::<(), kml_ingest_style::fetch::FetchBuildError>(())
/// ```
#[derive(Debug)]
pub struct AssetCache<F> {
    fetcher: F,
    relative_root: Utf8PathBuf,
    destination: Utf8PathBuf,
    processed: HashMap<AssetKey, Option<Utf8PathBuf>>,
    fetched: HashMap<String, Option<NamedTempFile>>,
    formats: HashMap<String, Option<String>>,
    warnings: Vec<String>,
}

impl<F: RemoteFetcher> AssetCache<F> {
    /// Resolve relative sources against `relative_root` and write derived
    /// images into `destination`.
    pub fn new(
        fetcher: F,
        relative_root: impl Into<Utf8PathBuf>,
        destination: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            relative_root: relative_root.into(),
            destination: destination.into(),
            processed: HashMap::new(),
            fetched: HashMap::new(),
            formats: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Directory derived images are written to.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }

    /// Warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Produce the image derived from `source` with the given tint and
    /// scale, returning its path.
    ///
    /// The tint is applied first; the output is named
    /// `{width}-{argb}-{file}` with each prefix present only when its
    /// operation was requested. Returns `None`, and records a warning the
    /// first time, when the asset cannot be produced.
    pub fn resolve(
        &mut self,
        source: &str,
        tint: Option<Color>,
        scale: Option<f64>,
    ) -> Option<Utf8PathBuf> {
        let key = AssetKey::new(source, tint, scale);
        if let Some(cached) = self.processed.get(&key) {
            return cached.clone();
        }
        let resolved = match self.generate(source, tint, scale) {
            Ok(path) => Some(path),
            Err(err) => {
                self.warn(source, &err);
                None
            }
        };
        self.processed.insert(key, resolved.clone());
        resolved
    }

    /// Fill missing graphic MIME types from the images' magic numbers.
    ///
    /// Each source is inspected once per run.
    pub fn sniff_formats(&mut self, map: &mut StyleMap) {
        for graphic in map.graphics_mut() {
            if !graphic.format_missing() {
                continue;
            }
            if let Some(format) = self.sniff(&graphic.href) {
                graphic.format = Some(format);
            }
        }
    }

    /// Generate derived icons for every graphic requesting a tint or scale
    /// and point those graphics at the generated file names.
    ///
    /// Graphics whose format is still unknown are left alone. Returns the
    /// number of graphics updated.
    pub fn process_graphics(&mut self, map: &mut StyleMap) -> usize {
        let mut updated = 0;
        for graphic in map.graphics_mut() {
            if graphic.format_missing() || !graphic.needs_processing() {
                continue;
            }
            let Some(path) = self.resolve(&graphic.href, graphic.tint, graphic.scale) else {
                continue;
            };
            let Some(name) = path.file_name() else {
                continue;
            };
            log::debug!("update {} to {name}", graphic.href);
            name.clone_into(&mut graphic.href);
            graphic.tint = None;
            graphic.scale = None;
            updated += 1;
        }
        updated
    }

    /// Delete temporary downloads and return the run's warnings.
    pub fn finish(mut self) -> Vec<String> {
        let mut removed = 0_usize;
        for (url, download) in self.fetched.drain() {
            let Some(file) = download else { continue };
            match file.close() {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("failed to remove the download of {url}: {err}"),
            }
        }
        log::debug!("removed {removed} temporary downloads");
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, source: &str, err: &AssetError) {
        let mut message = format!("skipping asset {source}: {err}");
        let mut cause = err.source();
        while let Some(inner) = cause {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            cause = inner.source();
        }
        log::warn!("{message}");
        self.warnings.push(message);
    }

    fn locate(&self, source: &str) -> Result<Location, AssetError> {
        let unsupported = || AssetError::UnsupportedLocation {
            uri: source.to_owned(),
        };
        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Location::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .ok()
                .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
                .map(Location::Local)
                .ok_or_else(unsupported),
            Ok(_) => Err(unsupported()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Location::Local(self.relative_root.join(source)))
            }
            Err(_) => Err(unsupported()),
        }
    }

    fn generate(
        &mut self,
        source: &str,
        tint: Option<Color>,
        scale: Option<f64>,
    ) -> Result<Utf8PathBuf, AssetError> {
        let location = self.locate(source)?;
        let no_file_name = || AssetError::NoFileName {
            uri: source.to_owned(),
        };
        let (bytes, file_name) = match location {
            Location::Local(path) => {
                let name = path.file_name().ok_or_else(no_file_name)?.to_owned();
                (kml_ingest_fs::read_file(&path).map_err(io_error(&path))?, name)
            }
            Location::Remote(url) => {
                let name = url
                    .path_segments()
                    .and_then(Iterator::last)
                    .filter(|segment| !segment.is_empty())
                    .ok_or_else(no_file_name)?
                    .to_owned();
                let mut bytes = Vec::new();
                self.fetched_file(&url)?
                    .read_to_end(&mut bytes)
                    .map_err(AssetError::Temporary)?;
                (bytes, name)
            }
        };

        let decode_error = |err| AssetError::Decode {
            uri: source.to_owned(),
            source: err,
        };
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| decode_error(ImageError::IoError(err)))?;
        let input_format = reader.format();
        let mut image = reader.decode().map_err(decode_error)?.to_rgba8();

        let mut name = file_name;
        if let Some(tint) = tint {
            raster::colorize(&mut image, tint);
            name = format!("{:08x}-{name}", tint.to_argb());
        }
        if let Some(factor) = scale {
            let (width, height) = raster::scaled_size(image.dimensions(), factor).ok_or_else(
                || AssetError::InvalidScale {
                    uri: source.to_owned(),
                    scale: factor,
                },
            )?;
            image = raster::resample(&image, width, height);
            name = format!("{width}-{name}");
        }

        let target = self.destination.join(&name);
        let format = ImageFormat::from_path(target.as_std_path())
            .ok()
            .or(input_format)
            .ok_or_else(|| AssetError::UnknownFormat {
                path: target.clone(),
            })?;
        let encoded = raster::encode(image, format).map_err(|source| AssetError::Encode {
            path: target.clone(),
            source,
        })?;
        kml_ingest_fs::write_file(&target, &encoded).map_err(io_error(&target))?;
        log::debug!("generated {target} from {source}");
        Ok(target)
    }

    /// Reopen the download of `url`, fetching it on first use.
    fn fetched_file(&mut self, url: &Url) -> Result<std::fs::File, AssetError> {
        let key = url.as_str();
        if !self.fetched.contains_key(key) {
            log::debug!("fetching {url}");
            let outcome = self.download(url);
            let (download, result) = match outcome {
                Ok(file) => (Some(file), Ok(())),
                Err(err) => (None, Err(err)),
            };
            self.fetched.insert(key.to_owned(), download);
            result?;
        }
        match self.fetched.get(key) {
            Some(Some(file)) => file.reopen().map_err(AssetError::Temporary),
            _ => Err(AssetError::EarlierFetchFailed {
                uri: key.to_owned(),
            }),
        }
    }

    fn download(&self, url: &Url) -> Result<NamedTempFile, AssetError> {
        let mut file = tempfile::Builder::new()
            .prefix("kml-ingest-")
            .tempfile()
            .map_err(AssetError::Temporary)?;
        let written = self.fetcher.fetch(url.as_str(), &mut file)?;
        log::debug!("fetched {written} bytes from {url}");
        Ok(file)
    }

    fn sniff(&mut self, source: &str) -> Option<String> {
        if let Some(known) = self.formats.get(source) {
            return known.clone();
        }
        let sniffed = match self.magic_bytes(source) {
            Ok(prefix) => mime_from_magic(&prefix).map(str::to_owned),
            Err(err) => {
                self.warn(source, &err);
                None
            }
        };
        self.formats.insert(source.to_owned(), sniffed.clone());
        sniffed
    }

    fn magic_bytes(&mut self, source: &str) -> Result<Vec<u8>, AssetError> {
        const MAGIC_LEN: usize = 4;
        match self.locate(source)? {
            Location::Local(path) => {
                kml_ingest_fs::read_prefix(&path, MAGIC_LEN).map_err(io_error(&path))
            }
            Location::Remote(url) => {
                let mut prefix = Vec::with_capacity(MAGIC_LEN);
                self.fetched_file(&url)?
                    .take(u64::try_from(MAGIC_LEN).unwrap_or(u64::MAX))
                    .read_to_end(&mut prefix)
                    .map_err(AssetError::Temporary)?;
                Ok(prefix)
            }
        }
    }

    #[cfg(test)]
    fn download_paths(&self) -> Vec<std::path::PathBuf> {
        self.fetched
            .values()
            .flatten()
            .map(|file| file.path().to_path_buf())
            .collect()
    }
}

fn mime_from_magic(prefix: &[u8]) -> Option<&'static str> {
    MAGIC_NUMBERS
        .iter()
        .find(|(magic, _)| prefix.starts_with(magic))
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests;
