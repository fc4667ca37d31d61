//! Direct HTTP fetch of a listing page.

use std::time::Duration;

use crate::BoxFuture;
use crate::error::AcquireError;

use super::{Acquire, Acquired};

/// Plain GET of the listing URL.
///
/// Only a successful status with a non-empty body counts as content; an
/// error page for a missing directory is a failure, not an empty listing.
#[derive(Debug, Clone)]
pub struct DirectFetch {
    client: reqwest::Client,
    timeout: Duration,
}

impl DirectFetch {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    async fn fetch(&self, url: &str) -> Result<String, AcquireError> {
        let response = self.client.get(url).send().await.map_err(|err| self.classify(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status(status));
        }
        let body = response.text().await.map_err(|err| self.classify(err))?;
        tracing::trace!(url, %status, bytes = body.len(), "direct fetch complete");
        if body.is_empty() {
            return Err(AcquireError::EmptyBody);
        }
        Ok(body)
    }

    fn classify(&self, err: reqwest::Error) -> AcquireError {
        if err.is_timeout() {
            AcquireError::Timeout(self.timeout)
        } else {
            AcquireError::Transport(err)
        }
    }
}

impl Acquire for DirectFetch {
    fn name(&self) -> &'static str {
        "direct-fetch"
    }

    fn acquire<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Acquired, AcquireError>> {
        Box::pin(async move { self.fetch(url).await.map(Acquired::Html) })
    }
}
