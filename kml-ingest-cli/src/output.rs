//! Filesystem sinks for the artefacts an import produces.

use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use kml_ingest_core::{CatalogError, CatalogSink, StyleWriter, TypedRecord, UnifiedSchema};
use kml_ingest_data::ParseError;

use crate::CliError;

/// Writes style documents as `<identifier>.sld` files in one directory.
#[derive(Debug, Clone)]
pub(crate) struct FsStyleWriter {
    dir: Utf8PathBuf,
}

impl FsStyleWriter {
    pub(crate) fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub(crate) fn path_for(&self, identifier: &str) -> Utf8PathBuf {
        self.dir.join(format!("{identifier}.sld"))
    }
}

impl StyleWriter for FsStyleWriter {
    fn write_style(&mut self, identifier: &str, document: &[u8]) -> io::Result<()> {
        let path = self.path_for(identifier);
        kml_ingest_fs::write_file(&path, document)?;
        log::debug!("wrote style {path}");
        Ok(())
    }
}

/// Collects attached schemas and persists them as one JSON array.
///
/// The file is the input `--schema` accepts on a later run.
#[derive(Debug)]
pub(crate) struct JsonCatalog {
    path: Utf8PathBuf,
    schemas: Vec<UnifiedSchema>,
}

impl JsonCatalog {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            schemas: Vec::new(),
        }
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub(crate) fn persist(&self) -> Result<(), CliError> {
        let payload =
            serde_json::to_vec_pretty(&self.schemas).map_err(|source| CliError::Json {
                path: self.path.clone(),
                source,
            })?;
        kml_ingest_fs::write_file(&self.path, &payload).map_err(|source| CliError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl CatalogSink for JsonCatalog {
    fn attach(&mut self, schema: &UnifiedSchema) -> Result<(), CatalogError> {
        if self.schemas.iter().any(|known| known.name == schema.name) {
            return Err(CatalogError::Rejected {
                schema: schema.name.clone(),
                message: "a schema with this name is already attached".to_owned(),
            });
        }
        self.schemas.push(schema.clone());
        Ok(())
    }
}

/// Load schemas previously written by [`JsonCatalog`].
pub(crate) fn load_schemas(path: &Utf8Path) -> Result<Vec<UnifiedSchema>, CliError> {
    let file = kml_ingest_fs::open_utf8_file(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(io::BufReader::new(file)).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `records` to `path` as newline-delimited JSON.
///
/// Returns the number of records written. `document` names the source in
/// parse errors.
pub(crate) fn write_records<I>(
    path: &Utf8Path,
    document: &Utf8Path,
    records: I,
) -> Result<usize, CliError>
where
    I: Iterator<Item = Result<TypedRecord, ParseError>>,
{
    let io_error = |source: io::Error| CliError::Io {
        path: path.to_path_buf(),
        source,
    };
    kml_ingest_fs::ensure_parent_dir(path).map_err(io_error)?;
    let (dir, name) = kml_ingest_fs::open_dir_and_file(path).map_err(io_error)?;
    let mut writer = BufWriter::new(dir.create(name.as_str()).map_err(io_error)?);
    let mut written = 0_usize;
    for record in records {
        let record = record.map_err(|source| CliError::Parse {
            path: document.to_path_buf(),
            source,
        })?;
        serde_json::to_writer(&mut writer, &record).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.write_all(b"\n").map_err(io_error)?;
        written += 1;
    }
    writer.flush().map_err(io_error)?;
    Ok(written)
}
