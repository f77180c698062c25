//! Source-format helpers for KML documents and KMZ containers.
//!
//! A KMZ is a zip archive holding a KML document plus the resources it links
//! to. Before import it is unpacked into a directory carrying the
//! container's own name (`parks.kmz/`), so [`type_name_from_file`] can name
//! the layer after the container rather than the inner `doc.kml`.

use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;
use kml_ingest_core::ContainerUnpacker;
use kml_ingest_fs::{copy_resources, is_kml_document, open_dir_and_file, read_prefix};
use thiserror::Error;

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Errors raised by the format helpers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FormatError {
    /// A filesystem operation failed.
    #[error("failed to access {path}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The container is not a readable zip archive.
    #[error("failed to read archive {path}")]
    Archive {
        /// Container path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: zip::result::ZipError,
    },
    /// An archive entry would escape the target directory.
    #[error("archive {path} holds an unsafe entry {entry:?}")]
    UnsafeEntry {
        /// Container path.
        path: Utf8PathBuf,
        /// Offending entry name.
        entry: String,
    },
    /// No KML document was found in an unpacked container.
    #[error("no KML document found in {path}")]
    NoDocument {
        /// Directory searched.
        path: Utf8PathBuf,
    },
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> FormatError + '_ {
    move |source| FormatError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn has_extension(path: &Utf8Path, wanted: &str) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(wanted))
}

/// Derive a layer name from a document path.
///
/// A document inside a directory named `*.kml` or `*.kmz` (an unpacked
/// container) takes the directory's name.
///
/// # Examples
/// ```
/// use camino::Utf8Path;
/// use kml_ingest_data::format::type_name_from_file;
///
/// assert_eq!(type_name_from_file(Utf8Path::new("/data/parks.kml")), "parks");
/// assert_eq!(type_name_from_file(Utf8Path::new("/data/parks.kmz/doc.kml")), "parks");
/// ```
#[must_use]
pub fn type_name_from_file(path: &Utf8Path) -> String {
    let named = match path.parent() {
        Some(parent) if has_extension(parent, "kml") || has_extension(parent, "kmz") => parent,
        _ => path,
    };
    named
        .file_stem()
        .or_else(|| named.file_name())
        .unwrap_or_default()
        .to_owned()
}

/// Whether `path` starts with the zip local-file signature.
#[must_use]
pub fn is_zip(path: &Utf8Path) -> bool {
    read_prefix(path, ZIP_MAGIC.len()).is_ok_and(|prefix| prefix == ZIP_MAGIC)
}

/// Whether `path` names a document this importer can read.
///
/// `.kml` files are readable when they can be opened; `.kmz` files only when
/// they are zip archives.
#[must_use]
pub fn can_read(path: &Utf8Path) -> bool {
    if has_extension(path, "kml") {
        kml_ingest_fs::open_utf8_file(path).is_ok()
    } else if has_extension(path, "kmz") {
        is_zip(path)
    } else {
        false
    }
}

/// Sorted, `/`-separated paths of every non-KML file below `dir`.
///
/// # Errors
///
/// Returns [`FormatError::Io`] when the directory cannot be listed.
pub fn resource_paths(dir: &Utf8Path) -> Result<Vec<String>, FormatError> {
    let paths = kml_ingest_fs::resource_paths(dir).map_err(io_error(dir))?;
    Ok(paths
        .iter()
        .map(|path| {
            path.components()
                .map(|component| component.as_str())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect())
}

/// Copy the resources of an unpacked container next to its style document.
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Returns [`FormatError::Io`] when listing or copying fails.
pub fn deploy_resources(dir: &Utf8Path, style_dir: &Utf8Path) -> Result<u64, FormatError> {
    let paths = kml_ingest_fs::resource_paths(dir).map_err(io_error(dir))?;
    if paths.is_empty() {
        return Ok(0);
    }
    copy_resources(dir, style_dir, &paths).map_err(io_error(style_dir))
}

/// Find the KML document inside an unpacked container.
///
/// Prefers `doc.kml`, otherwise the first `.kml` file by name.
///
/// # Errors
///
/// Returns [`FormatError::NoDocument`] when the directory holds no document.
pub fn locate_document(dir: &Utf8Path) -> Result<Utf8PathBuf, FormatError> {
    let listing = kml_ingest_fs::open_utf8_dir(dir).map_err(io_error(dir))?;
    let mut documents = Vec::new();
    for entry in listing.entries().map_err(io_error(dir))? {
        let name = entry
            .and_then(|entry| entry.file_name())
            .map_err(io_error(dir))?;
        if is_kml_document(Utf8Path::new(&name)) {
            documents.push(name);
        }
    }
    documents.sort();
    let chosen = documents
        .iter()
        .find(|name| name.as_str() == "doc.kml")
        .or_else(|| documents.first())
        .ok_or_else(|| FormatError::NoDocument {
            path: dir.to_path_buf(),
        })?;
    Ok(dir.join(chosen))
}

/// Unpacks KMZ containers in place.
///
/// `x.kmz` (or a zip misnamed `x.kml`) becomes the directory `x.kmz`
/// (`x.kml`) holding the archive's contents; the container file is removed.
/// Plain KML documents are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct KmzUnpacker;

impl KmzUnpacker {
    /// Unpack `container`, returning the directory holding its contents, or
    /// `container` itself when it is a plain document.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] when the archive is unreadable, holds an entry
    /// escaping the target directory, or the filesystem refuses a step.
    pub fn unpack_container(&self, container: &Utf8Path) -> Result<Utf8PathBuf, FormatError> {
        if !has_extension(container, "kmz") && !is_zip(container) {
            return Ok(container.to_path_buf());
        }
        let (parent, name) = open_dir_and_file(container).map_err(io_error(container))?;
        let staged = format!("tmp{name}");
        parent
            .rename(&name, &parent, &staged)
            .map_err(io_error(container))?;
        if let Err(err) = extract(&parent, &staged, &name, container) {
            // Restore the container on failure.
            let _ = parent.remove_dir_all(&name);
            let _ = parent.rename(&staged, &parent, &name);
            return Err(err);
        }
        parent.remove_file(&staged).map_err(io_error(container))?;
        log::debug!("unpacked {container}");
        Ok(container.to_path_buf())
    }
}

fn extract(
    parent: &Dir,
    staged: &str,
    name: &str,
    container: &Utf8Path,
) -> Result<(), FormatError> {
    let archive_error = |source| FormatError::Archive {
        path: container.to_path_buf(),
        source,
    };
    let file = parent.open(staged).map_err(io_error(container))?;
    let mut archive = zip::ZipArchive::new(file.into_std()).map_err(archive_error)?;
    parent.create_dir(name).map_err(io_error(container))?;
    let target = parent.open_dir(name).map_err(io_error(container))?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(archive_error)?;
        let relative = entry
            .enclosed_name()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            .ok_or_else(|| FormatError::UnsafeEntry {
                path: container.to_path_buf(),
                entry: entry.name().to_owned(),
            })?;
        if entry.is_dir() {
            target
                .create_dir_all(&relative)
                .map_err(io_error(container))?;
            continue;
        }
        if let Some(folder) = relative.parent().filter(|folder| !folder.as_str().is_empty()) {
            target.create_dir_all(folder).map_err(io_error(container))?;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(io_error(container))?;
        target
            .write(&relative, &contents)
            .map_err(io_error(container))?;
    }
    Ok(())
}

impl ContainerUnpacker for KmzUnpacker {
    fn unpack(&self, container: &Utf8Path) -> io::Result<Utf8PathBuf> {
        self.unpack_container(container).map_err(|err| match err {
            FormatError::Io { source, .. } => source,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })
    }
}
