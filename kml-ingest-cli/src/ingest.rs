//! The `ingest` command: unpack, infer, transform and style one source.

use std::io::{self, BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use kml_ingest_core::{CatalogSink, StyleMap, UnifiedSchema};
use kml_ingest_data::{
    KmlReader, KmzUnpacker, ReadMode, RecordTransformer, RewriteRule, can_read, deploy_resources,
    infer, locate_document, reader_mode_for, resource_paths, type_name_from_file,
};
use kml_ingest_style::{
    AssetCache, HttpFetcher, RemoteFetcher, assemble_with_assets, write_style,
};

use crate::output::{FsStyleWriter, JsonCatalog, load_schemas, write_records};
use crate::{CliError, IngestArgs, IngestConfig};

/// Artefacts produced by one `ingest` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    name: String,
    schema_path: Utf8PathBuf,
    record_files: Vec<Utf8PathBuf>,
    style_path: Utf8PathBuf,
    record_count: usize,
    links: Vec<String>,
    warnings: Vec<String>,
}

impl IngestOutcome {
    /// Layer name the artefacts are named after.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the persisted schema catalogue.
    #[must_use]
    pub fn schema_path(&self) -> &Utf8Path {
        &self.schema_path
    }

    /// One newline-delimited JSON file per schema, in schema order.
    #[must_use]
    pub fn record_files(&self) -> &[Utf8PathBuf] {
        &self.record_files
    }

    /// Path of the SLD document.
    #[must_use]
    pub fn style_path(&self) -> &Utf8Path {
        &self.style_path
    }

    /// Records written across every schema.
    #[must_use]
    pub const fn record_count(&self) -> usize {
        self.record_count
    }

    /// Network link targets found while inferring the schema.
    #[must_use]
    pub fn links(&self) -> &[String] {
        &self.links
    }

    /// Non-fatal problems met along the way.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

pub(crate) fn run_ingest(args: IngestArgs) -> Result<IngestOutcome, CliError> {
    let config = resolve_ingest_config(args)?;
    let fetcher = HttpFetcher::new()?;
    ingest_with(&config, fetcher)
}

pub(crate) fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    Ok(config)
}

/// Where the document and its resources live once staged.
struct StagedSource {
    document: Utf8PathBuf,
    resource_root: Utf8PathBuf,
    packaged: bool,
}

pub(crate) fn ingest_with<F: RemoteFetcher>(
    config: &IngestConfig,
    fetcher: F,
) -> Result<IngestOutcome, CliError> {
    if !can_read(&config.source) {
        return Err(CliError::UnsupportedSource {
            path: config.source.clone(),
        });
    }
    let staging = tempfile::Builder::new()
        .prefix("kml-ingest-")
        .tempdir()
        .map_err(io_error(&config.source))?;
    let workspace = Utf8Path::from_path(staging.path())
        .ok_or_else(|| CliError::Io {
            path: config.source.clone(),
            source: io::Error::other("staging directory is not UTF-8"),
        })?
        .to_path_buf();
    let staged = stage_source(&config.source, &workspace)?;
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| type_name_from_file(&staged.document));
    log::info!("importing {} as {name}", config.source);

    kml_ingest_fs::ensure_dir(&config.output_dir).map_err(io_error(&config.output_dir))?;
    let style_dir = if config.resource_prefix.is_empty() {
        config.output_dir.clone()
    } else {
        config.output_dir.join(&config.resource_prefix)
    };

    let mut styles = StyleMap::new();
    let mut warnings = Vec::new();
    let mut links = Vec::new();
    let cached = config.schema.is_some();
    let schemas = match &config.schema {
        Some(path) => load_schemas(path)?,
        None => {
            let reader = open_document(&staged.document, ReadMode::Full, config.lenient)?
                .with_style_sink(&mut styles);
            let inference =
                infer(reader, &name, config.collate).map_err(|source| CliError::Parse {
                    path: config.source.clone(),
                    source,
                })?;
            for link in &inference.links {
                log::info!("{name} links to {link}");
            }
            warnings.extend(inference.warnings);
            links = inference.links;
            inference.schemas
        }
    };

    let rewrite = resource_rewrite(config, &staged)?;
    let mut catalog = JsonCatalog::new(config.output_dir.join(format!("{name}.schema.json")));
    let mut record_files = Vec::with_capacity(schemas.len());
    let mut record_count = 0;
    for (index, schema) in schemas.iter().enumerate() {
        catalog.attach(schema)?;
        let mut reader =
            open_document(&staged.document, reader_mode_for(schema), config.lenient)?;
        // Styles are captured during inference unless the schema was cached.
        if cached && index == 0 {
            reader = reader.with_style_sink(&mut styles);
        }
        let (path, written, mut transform_warnings) =
            transform_schema(config, schema, reader, rewrite.as_ref())?;
        record_count += written;
        record_files.push(path);
        warnings.append(&mut transform_warnings);
    }
    catalog.persist()?;

    let cache = AssetCache::new(fetcher, staged.resource_root.clone(), style_dir.clone());
    let (style, asset_warnings) =
        assemble_with_assets(styles, &name, &config.resource_prefix, cache);
    warnings.extend(asset_warnings);
    let mut writer = FsStyleWriter::new(&config.output_dir);
    write_style(&mut writer, &name, &style)?;
    if staged.packaged {
        let copied = deploy_resources(&staged.resource_root, &style_dir)?;
        log::debug!("deployed {copied} bytes of resources to {style_dir}");
    }

    Ok(IngestOutcome {
        schema_path: catalog.path().to_path_buf(),
        style_path: writer.path_for(&name),
        name,
        record_files,
        record_count,
        links,
        warnings,
    })
}

/// Copy the source into `workspace` and unpack it there, leaving the
/// caller's file untouched.
fn stage_source(source: &Utf8Path, workspace: &Utf8Path) -> Result<StagedSource, CliError> {
    let file_name = source.file_name().ok_or_else(|| CliError::UnsupportedSource {
        path: source.to_path_buf(),
    })?;
    let copy = workspace.join(file_name);
    let contents = kml_ingest_fs::read_file(source).map_err(io_error(source))?;
    kml_ingest_fs::write_file(&copy, &contents).map_err(io_error(&copy))?;

    let unpacked = KmzUnpacker.unpack_container(&copy)?;
    if kml_ingest_fs::dir_is_dir(&unpacked).map_err(io_error(&unpacked))? {
        return Ok(StagedSource {
            document: locate_document(&unpacked)?,
            resource_root: unpacked,
            packaged: true,
        });
    }
    let resource_root = match source.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    Ok(StagedSource {
        document: unpacked,
        resource_root,
        packaged: false,
    })
}

fn open_document<'s>(
    path: &Utf8Path,
    mode: ReadMode,
    lenient: bool,
) -> Result<KmlReader<'s, impl BufRead>, CliError> {
    let file = kml_ingest_fs::open_utf8_file(path).map_err(io_error(path))?;
    Ok(KmlReader::new(BufReader::new(file), mode).with_lenient(lenient))
}

/// Rule pointing description links at the deployed copies of a
/// container's resources.
fn resource_rewrite(
    config: &IngestConfig,
    staged: &StagedSource,
) -> Result<Option<RewriteRule>, CliError> {
    if !staged.packaged || config.resource_prefix.is_empty() {
        return Ok(None);
    }
    let resources = resource_paths(&staged.resource_root)?;
    if resources.is_empty() {
        return Ok(None);
    }
    Ok(Some(RewriteRule::new(
        format!("{}/", config.resource_prefix),
        resources,
    )?))
}

fn transform_schema<R: BufRead>(
    config: &IngestConfig,
    schema: &UnifiedSchema,
    reader: KmlReader<'_, R>,
    rewrite: Option<&RewriteRule>,
) -> Result<(Utf8PathBuf, usize, Vec<String>), CliError> {
    let mut transformer = RecordTransformer::open(reader, schema);
    if let Some(rule) = rewrite {
        transformer = transformer.with_rewrite(rule.clone());
    }
    let path = config.output_dir.join(format!("{}.ndjson", schema.name));
    let written = write_records(&path, &config.source, transformer.by_ref())?;
    log::info!("wrote {written} records to {path}");
    Ok((path, written, transformer.take_warnings()))
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}
