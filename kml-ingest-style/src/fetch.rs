//! Remote fetch capability used by the asset cache.
//!
//! [`RemoteFetcher`] is synchronous so the cache stays embeddable in
//! synchronous hosts. [`HttpFetcher`] bridges to `reqwest` by blocking on a
//! Tokio runtime it owns.

use std::io::{self, Write};
use std::pin::pin;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

/// Default user agent for image requests.
pub const DEFAULT_USER_AGENT: &str = "kml-ingest/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while fetching a remote resource.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The server answered with a failure status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Requested location.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error reported by the client.
        message: String,
    },
    /// The request could not be completed.
    #[error("network error while fetching {url}")]
    Network {
        /// Requested location.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: io::Error,
    },
    /// The fetched bytes could not be stored.
    #[error("failed to store the response from {url}")]
    Write {
        /// Requested location.
        url: String,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
}

/// Copies the resource at a network location into a sink.
pub trait RemoteFetcher {
    /// Stream `url` into `sink`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the request fails or the sink refuses
    /// the bytes.
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError>;
}

impl<T: RemoteFetcher + ?Sized> RemoteFetcher for &T {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        (**self).fetch(url, sink)
    }
}

impl<T: RemoteFetcher + ?Sized> RemoteFetcher for Box<T> {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        (**self).fetch(url, sink)
    }
}

/// Error type for [`HttpFetcher`] construction failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] io::Error),
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Connect and request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpFetcherConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// HTTP implementation of [`RemoteFetcher`].
///
/// Outside any Tokio runtime the fetcher blocks on its own current-thread
/// runtime. Inside a multi-threaded runtime it borrows that runtime's handle
/// through [`tokio::task::block_in_place`]. Inside a current-thread runtime
/// it falls back to its own runtime, which can deadlock if the caller's
/// runtime drives IO the request depends on.
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpFetcher {
    /// Create a fetcher with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new() -> Result<Self, FetchBuildError> {
        Self::with_config(HttpFetcherConfig::default())
    }

    /// Create a fetcher with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn with_config(config: HttpFetcherConfig) -> Result<Self, FetchBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(FetchBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(FetchBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// Configuration the fetcher was built with.
    #[must_use]
    pub const fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }

    async fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url))?;
        let mut stream = pin!(response.bytes_stream());
        let mut written = 0_u64;
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
        {
            sink.write_all(&chunk).map_err(|source| FetchError::Write {
                url: url.to_owned(),
                source,
            })?;
            written = written.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }
        sink.flush().map_err(|source| FetchError::Write {
            url: url.to_owned(),
            source,
        })?;
        Ok(written)
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        let future = self.download(url, sink);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}

fn convert_reqwest_error(error: reqwest::Error, url: &str) -> FetchError {
    if let Some(status) = error.status() {
        return FetchError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    FetchError::Network {
        url: url.to_owned(),
        source: io::Error::new(kind, error),
    }
}
