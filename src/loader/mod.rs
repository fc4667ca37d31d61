//! Listing acquisition and caching.
//!
//! A [`ListingLoader`] owns an ordered cascade of acquisition strategies:
//! - [`RenderedDom`]: read the listing a browser engine renders
//! - [`DirectFetch`]: plain HTTP GET
//! - [`DelegatedFetch`]: ask the privileged host to fetch for us
//!
//! Strategies run one after another, never concurrently, and each only runs
//! if everything before it came back empty. Non-empty listings are cached
//! per path; failures are not, so a later request retries the full cascade.

mod delegate;
mod fetch;
mod render;

pub use delegate::DelegatedFetch;
pub use fetch::DirectFetch;
pub use render::{CommandSurface, RenderSurface, RenderedDom};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::BoxFuture;
use crate::error::{AcquireError, LoadError};
use crate::host::HostChannel;
use crate::listing;
use crate::node::TreeNode;

/// Time budget for the rendered-DOM and direct-fetch strategies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Content produced by one acquisition strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// Entries already extracted (rendered DOM)
    Nodes(Vec<TreeNode>),
    /// Raw listing page to hand to the parser
    Html(String),
}

/// One way of obtaining a directory listing.
pub trait Acquire: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Obtain listing content for `url`.
    fn acquire<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Acquired, AcquireError>>;
}

/// Cached, coalescing listing loader.
pub struct ListingLoader {
    strategies: Vec<Box<dyn Acquire>>,
    cache: Mutex<HashMap<String, Vec<TreeNode>>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for ListingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ListingLoader")
            .field("strategies", &names)
            .field("cached", &lock(&self.cache).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ListingLoader {
    /// Create a loader that tries `strategies` in order.
    pub fn new(strategies: Vec<Box<dyn Acquire>>) -> Self {
        Self {
            strategies,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    /// Load the listing for `path`, or an empty list if it cannot be obtained.
    pub async fn load(&self, path: &str) -> Vec<TreeNode> {
        self.load_outcome(path).await.unwrap_or_default()
    }

    /// Load the listing for `path`, distinguishing an empty directory from
    /// one that could not be read.
    ///
    /// Returns `Ok` with an empty list when some strategy delivered content
    /// that holds no visible entries.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Unavailable`] when no strategy delivered any
    /// content at all.
    pub async fn load_outcome(&self, path: &str) -> Result<Vec<TreeNode>, LoadError> {
        if let Some(hit) = self.cached(path) {
            return Ok(hit);
        }

        // At most one acquisition per path; later callers wait and re-check.
        let gate = self.gate(path);
        let result = {
            let _permit = gate.lock().await;
            if let Some(hit) = self.cached(path) {
                Ok(hit)
            } else {
                let result = self.acquire(path).await;
                match &result {
                    Ok(nodes) if !nodes.is_empty() => {
                        lock(&self.cache).insert(path.to_string(), nodes.clone());
                    }
                    _ => {}
                }
                result
            }
        };
        self.release_gate(path, &gate);
        result
    }

    /// Whether a listing for `path` is cached.
    pub fn is_cached(&self, path: &str) -> bool {
        lock(&self.cache).contains_key(path)
    }

    /// Drop the cached listing for one path.
    pub fn invalidate(&self, path: &str) {
        lock(&self.cache).remove(path);
    }

    /// Drop every cached listing.
    pub fn clear_cache(&self) {
        lock(&self.cache).clear();
    }

    fn cached(&self, path: &str) -> Option<Vec<TreeNode>> {
        lock(&self.cache).get(path).cloned()
    }

    fn gate(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.in_flight)
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    fn release_gate(&self, path: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = lock(&self.in_flight);
        // Ours plus the map's reference means nobody else is waiting.
        if Arc::strong_count(gate) <= 2 {
            in_flight.remove(path);
        }
    }

    async fn acquire(&self, path: &str) -> Result<Vec<TreeNode>, LoadError> {
        let mut delivered = false;
        let mut last_error = None;

        for strategy in &self.strategies {
            let started = Instant::now();
            let nodes = match strategy.acquire(path).await {
                Ok(Acquired::Nodes(nodes)) => nodes,
                Ok(Acquired::Html(html)) => listing::parse(&html, path),
                Err(err) => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        path,
                        %err,
                        elapsed = ?started.elapsed(),
                        "acquisition failed"
                    );
                    last_error = Some(err.to_string());
                    continue;
                }
            };
            delivered = true;
            if nodes.is_empty() {
                tracing::debug!(strategy = strategy.name(), path, "strategy found no entries");
                continue;
            }
            tracing::debug!(
                strategy = strategy.name(),
                path,
                entries = nodes.len(),
                elapsed = ?started.elapsed(),
                "listing acquired"
            );
            return Ok(nodes);
        }

        if delivered {
            Ok(Vec::new())
        } else {
            Err(LoadError::Unavailable {
                path: path.to_string(),
                reason: last_error.unwrap_or_else(|| "no acquisition strategy configured".into()),
            })
        }
    }
}

/// Assembles the standard acquisition cascade.
#[derive(Default)]
pub struct LoaderBuilder {
    timeout: Option<Duration>,
    surface: Option<Arc<dyn RenderSurface>>,
    direct_fetch: bool,
    host: Option<Arc<dyn HostChannel>>,
    extra: Vec<Box<dyn Acquire>>,
}

impl LoaderBuilder {
    /// Time budget for rendering and direct fetches (default 5 seconds).
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable the rendered-DOM strategy with the given surface.
    pub fn render_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Enable or disable the direct HTTP fetch strategy.
    pub const fn direct_fetch(mut self, enabled: bool) -> Self {
        self.direct_fetch = enabled;
        self
    }

    /// Enable delegated fetches through the privileged host.
    pub fn host(mut self, host: Arc<dyn HostChannel>) -> Self {
        self.host = Some(host);
        self
    }

    /// Append a custom strategy after the standard ones.
    pub fn strategy(mut self, strategy: Box<dyn Acquire>) -> Self {
        self.extra.push(strategy);
        self
    }

    pub fn build(self) -> ListingLoader {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let mut strategies: Vec<Box<dyn Acquire>> = Vec::new();
        if let Some(surface) = self.surface {
            strategies.push(Box::new(RenderedDom::new(surface, timeout)));
        }
        if self.direct_fetch {
            strategies.push(Box::new(DirectFetch::new(timeout)));
        }
        if let Some(host) = self.host {
            strategies.push(Box::new(DelegatedFetch::new(host)));
        }
        strategies.extend(self.extra);
        ListingLoader::new(strategies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test strategy that replays a fixed result and counts calls.
    struct Scripted {
        calls: Arc<AtomicUsize>,
        result: fn() -> Result<Acquired, AcquireError>,
        delay: Duration,
    }

    impl Scripted {
        fn new(result: fn() -> Result<Acquired, AcquireError>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                calls: Arc::clone(&calls),
                result,
                delay: Duration::ZERO,
            };
            (strategy, calls)
        }
    }

    impl Acquire for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn acquire<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Acquired, AcquireError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                (self.result)()
            })
        }
    }

    fn listing_html() -> Result<Acquired, AcquireError> {
        Ok(Acquired::Html(
            r#"addRow("docs/", "docs/", 1);addRow("readme.md", "readme.md", 0);"#.into(),
        ))
    }

    fn empty_html() -> Result<Acquired, AcquireError> {
        Ok(Acquired::Html("<html><body></body></html>".into()))
    }

    fn empty_body() -> Result<Acquired, AcquireError> {
        Err(AcquireError::EmptyBody)
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let (strategy, calls) = Scripted::new(listing_html);
        let loader = ListingLoader::new(vec![Box::new(strategy)]);

        let first = loader.load("https://x/").await;
        let second = loader.load("https://x/").await;
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.is_cached("https://x/"));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_reacquisition() {
        let (strategy, calls) = Scripted::new(listing_html);
        let loader = ListingLoader::new(vec![Box::new(strategy)]);

        loader.load("https://x/").await;
        loader.clear_cache();
        loader.load("https://x/").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_drops_only_one_path() {
        let (strategy, calls) = Scripted::new(listing_html);
        let loader = ListingLoader::new(vec![Box::new(strategy)]);

        loader.load("https://x/a/").await;
        loader.load("https://x/b/").await;
        loader.invalidate("https://x/a/");
        assert!(!loader.is_cached("https://x/a/"));
        assert!(loader.is_cached("https://x/b/"));
        loader.load("https://x/b/").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_fall_through_in_order() {
        let (failing, failing_calls) = Scripted::new(empty_body);
        let (working, working_calls) = Scripted::new(listing_html);
        let (unused, unused_calls) = Scripted::new(listing_html);
        let loader =
            ListingLoader::new(vec![Box::new(failing), Box::new(working), Box::new(unused)]);

        let nodes = loader.load("https://x/").await;
        assert_eq!(nodes[0].name, "docs");
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(working_calls.load(Ordering::SeqCst), 1);
        assert_eq!(unused_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_parse_falls_through_to_next_strategy() {
        let (empty, _) = Scripted::new(empty_html);
        let (working, working_calls) = Scripted::new(listing_html);
        let loader = ListingLoader::new(vec![Box::new(empty), Box::new(working)]);

        assert_eq!(loader.load("https://x/").await.len(), 2);
        assert_eq!(working_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (strategy, calls) = Scripted::new(empty_body);
        let loader = ListingLoader::new(vec![Box::new(strategy)]);

        assert!(loader.load("https://x/").await.is_empty());
        assert!(loader.load("https://x/").await.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!loader.is_cached("https://x/"));
    }

    #[tokio::test]
    async fn test_outcome_separates_empty_from_unavailable() {
        let (empty, _) = Scripted::new(empty_html);
        let loader = ListingLoader::new(vec![Box::new(empty)]);
        assert_eq!(loader.load_outcome("https://x/").await.unwrap(), Vec::new());

        let (failing, _) = Scripted::new(empty_body);
        let loader = ListingLoader::new(vec![Box::new(failing)]);
        let err = loader.load_outcome("https://x/").await.unwrap_err();
        assert!(err.to_string().contains("empty response body"));
    }

    #[tokio::test]
    async fn test_loader_without_strategies_is_unavailable() {
        let loader = ListingLoader::new(Vec::new());
        let err = loader.load_outcome("https://x/").await.unwrap_err();
        assert!(err.to_string().contains("no acquisition strategy configured"));
    }

    #[tokio::test]
    async fn test_concurrent_loads_of_one_path_acquire_once() {
        let (mut strategy, calls) = Scripted::new(listing_html);
        strategy.delay = Duration::from_millis(50);
        let loader = ListingLoader::new(vec![Box::new(strategy)]);

        let (a, b) = tokio::join!(loader.load("https://x/"), loader.load("https://x/"));
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(lock(&loader.in_flight).is_empty());
    }

    #[test]
    fn test_builder_orders_standard_strategies() {
        let loader = ListingLoader::builder()
            .direct_fetch(true)
            .host(Arc::new(crate::host::LocalHost::default()))
            .build();
        let names: Vec<_> = loader.strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["direct-fetch", "delegated-fetch"]);
    }
}
