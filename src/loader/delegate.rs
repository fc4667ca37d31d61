//! Delegated fetch through the privileged host.

use std::sync::Arc;

use crate::BoxFuture;
use crate::error::AcquireError;
use crate::host::{HostChannel, HostRequest};

use super::{Acquire, Acquired};

/// Asks the host process to fetch the listing for us.
pub struct DelegatedFetch {
    host: Arc<dyn HostChannel>,
}

impl DelegatedFetch {
    pub fn new(host: Arc<dyn HostChannel>) -> Self {
        Self { host }
    }
}

impl Acquire for DelegatedFetch {
    fn name(&self) -> &'static str {
        "delegated-fetch"
    }

    fn acquire<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Acquired, AcquireError>> {
        Box::pin(async move {
            let response = self
                .host
                .request(HostRequest::BgFetch {
                    url: url.to_string(),
                })
                .await
                .map_err(|err| AcquireError::Delegation(err.to_string()))?;
            response
                .text()
                .map(|body| Acquired::Html(body.to_string()))
                .ok_or_else(|| AcquireError::Delegation("host reported no content".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::HostResponse;

    struct CannedHost(fn() -> Result<HostResponse, HostError>);

    impl HostChannel for CannedHost {
        fn request(&self, request: HostRequest) -> BoxFuture<'_, Result<HostResponse, HostError>> {
            assert!(matches!(request, HostRequest::BgFetch { .. }));
            Box::pin(async move { (self.0)() })
        }
    }

    fn delegated(reply: fn() -> Result<HostResponse, HostError>) -> DelegatedFetch {
        DelegatedFetch::new(Arc::new(CannedHost(reply)))
    }

    #[tokio::test]
    async fn test_successful_reply_is_html() {
        let strategy = delegated(|| Ok(HostResponse::ok(Some("<a href=\"a.md\">a.md</a>".into()))));
        assert_eq!(
            strategy.acquire("file:///x/").await.unwrap(),
            Acquired::Html("<a href=\"a.md\">a.md</a>".into())
        );
    }

    #[tokio::test]
    async fn test_unsuccessful_reply_is_an_error() {
        let strategy = delegated(|| Ok(HostResponse::failed()));
        assert!(matches!(
            strategy.acquire("file:///x/").await.unwrap_err(),
            AcquireError::Delegation(_)
        ));
    }

    #[tokio::test]
    async fn test_channel_error_is_an_error() {
        let strategy = delegated(|| Err(HostError::Closed));
        let err = strategy.acquire("file:///x/").await.unwrap_err();
        assert_eq!(err.to_string(), "delegated fetch failed: host channel closed");
    }
}
