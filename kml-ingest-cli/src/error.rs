//! Error types emitted by the CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use kml_ingest_core::CatalogError;
use kml_ingest_data::{FormatError, ParseError, RewriteConfigError};
use kml_ingest_style::{FetchBuildError, StyleError};
use thiserror::Error;

/// Errors emitted by the CLI.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Flag name.
        field: &'static str,
        /// Environment variable carrying the option.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk or is not a file.
    #[error("{field} path {path:?} does not exist or is not a file")]
    MissingSourceFile {
        /// Flag naming the input.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The source is neither a KML document nor a KMZ container.
    #[error("{path:?} is not a readable KML or KMZ source")]
    UnsupportedSource {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The output directory exists but is not a directory.
    #[error("output directory {path:?} is not a directory")]
    OutputDirectoryNotDirectory {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The document could not be parsed.
    #[error("failed to read {path:?}: {source}")]
    Parse {
        /// Document being read.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: ParseError,
    },
    /// Unpacking or inspecting the source failed.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// The resource rewrite rule was rejected.
    #[error(transparent)]
    Rewrite(#[from] RewriteConfigError),
    /// Building the HTTP fetcher for remote icons failed.
    #[error(transparent)]
    Fetcher(#[from] FetchBuildError),
    /// Serialising or persisting the style document failed.
    #[error(transparent)]
    Style(#[from] StyleError),
    /// The schema catalogue refused a schema.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// A filesystem operation failed.
    #[error("failed to access {path:?}: {source}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// Encoding or decoding JSON failed.
    #[error("failed to process JSON at {path:?}: {source}")]
    Json {
        /// File being read or written.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
}
