//! Command-line interface for importing KML and KMZ documents.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

mod error;
mod ingest;
mod output;

pub use error::CliError;
pub use ingest::IngestOutcome;
use ingest::run_ingest;

pub(crate) const ARG_SOURCE: &str = "source";
pub(crate) const ARG_OUTPUT_DIR: &str = "output-dir";
pub(crate) const ARG_NAME: &str = "name";
pub(crate) const ARG_SCHEMA: &str = "schema";
pub(crate) const ARG_RESOURCE_PREFIX: &str = "resource-prefix";
pub(crate) const ENV_SOURCE: &str = "KML_INGEST_CMDS_INGEST_SOURCE";
pub(crate) const ENV_OUTPUT_DIR: &str = "KML_INGEST_CMDS_INGEST_OUTPUT_DIR";
pub(crate) const DEFAULT_RESOURCE_PREFIX: &str = "styles";

/// Run the CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments or configuration are invalid or any
/// stage of the import fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Ingest(args) => {
            let outcome = run_ingest(args)?;
            log::info!(
                "imported {} records into {} schema(s) for {}",
                outcome.record_count(),
                outcome.record_files().len(),
                outcome.name()
            );
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(
    name = "kml-ingest",
    about = "Import KML and KMZ documents as typed records and layer styles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a KML or KMZ document into schema, records and styles.
    Ingest(IngestArgs),
}

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Import a KML document or KMZ container. The schema is \
                 inferred from the document (or read from --schema), the \
                 records are written as newline-delimited JSON and the \
                 captured styles become an SLD document with any derived \
                 icons beside it.",
    about = "Import a KML or KMZ document"
)]
#[ortho_config(prefix = "KML_INGEST")]
struct IngestArgs {
    /// Path to the KML document or KMZ container.
    #[arg(long = ARG_SOURCE, value_name = "path")]
    #[serde(default)]
    source: Option<Utf8PathBuf>,
    /// Directory receiving the generated artefacts.
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    output_dir: Option<Utf8PathBuf>,
    /// Layer name; defaults to the document's file name.
    #[arg(long = ARG_NAME, value_name = "name")]
    #[serde(default)]
    name: Option<String>,
    /// Split records into one schema per geometry type.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    collate: bool,
    /// Skip malformed geometries instead of failing.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    lenient: bool,
    /// JSON file holding previously inferred schemas.
    #[arg(long = ARG_SCHEMA, value_name = "path")]
    #[serde(default)]
    schema: Option<Utf8PathBuf>,
    /// Directory, relative to the output, that holds icons and resources.
    #[arg(long = ARG_RESOURCE_PREFIX, value_name = "prefix")]
    #[serde(default)]
    resource_prefix: Option<String>,
}

impl IngestArgs {
    fn into_config(self) -> Result<IngestConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        IngestConfig::try_from(merged)
    }
}

/// Resolved `ingest` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IngestConfig {
    source: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    name: Option<String>,
    collate: bool,
    lenient: bool,
    schema: Option<Utf8PathBuf>,
    resource_prefix: String,
}

impl IngestConfig {
    fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.source, ARG_SOURCE)?;
        if let Some(schema) = &self.schema {
            Self::require_existing(schema, ARG_SCHEMA)?;
        }
        match kml_ingest_fs::file_is_file(&self.output_dir) {
            Ok(true) => Err(CliError::OutputDirectoryNotDirectory {
                path: self.output_dir.clone(),
            }),
            Ok(false) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CliError::Io {
                path: self.output_dir.clone(),
                source,
            }),
        }
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match kml_ingest_fs::file_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::MissingSourceFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        let source = args.source.ok_or(CliError::MissingArgument {
            field: ARG_SOURCE,
            env: ENV_SOURCE,
        })?;
        let output_dir = args.output_dir.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT_DIR,
            env: ENV_OUTPUT_DIR,
        })?;
        let resource_prefix = args
            .resource_prefix
            .map(|prefix| prefix.trim_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_RESOURCE_PREFIX.to_owned());
        Ok(Self {
            source,
            output_dir,
            name: args.name.filter(|name| !name.trim().is_empty()),
            collate: args.collate,
            lenient: args.lenient,
            schema: args.schema,
            resource_prefix,
        })
    }
}

#[cfg(test)]
mod tests;
