//! In-memory fetcher used by unit and behaviour tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Write;

use crate::fetch::{FetchError, RemoteFetcher};

/// [`RemoteFetcher`] serving canned bodies and counting requests.
///
/// Unknown URLs answer with a 404.
#[derive(Debug, Default)]
pub struct StubFetcher {
    bodies: BTreeMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl StubFetcher {
    /// Serve `body` for `url`.
    #[must_use]
    pub fn with_body(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bodies.insert(url.into(), body);
        self
    }

    /// URLs requested so far, in request order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    /// Number of requests made for `url`.
    #[must_use]
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

impl RemoteFetcher for StubFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        self.requests.borrow_mut().push(url.to_owned());
        let body = self.bodies.get(url).ok_or_else(|| FetchError::Http {
            url: url.to_owned(),
            status: 404,
            message: "not found".to_owned(),
        })?;
        sink.write_all(body).map_err(|source| FetchError::Write {
            url: url.to_owned(),
            source,
        })?;
        Ok(u64::try_from(body.len()).unwrap_or(u64::MAX))
    }
}
