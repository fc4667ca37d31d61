// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. loader::ListingLoader)
    clippy::module_name_repetitions
)]

//! # Marktree
//!
//! A lazily loaded markdown file tree over directory listing pages.
//!
//! Marktree turns whatever a server or browser hands back for a directory
//! URL into a browsable tree of folders and markdown files:
//! - Chrome-style `addRow(...)` listings and plain anchor indexes
//! - Several acquisition strategies tried in order, with a per-path cache
//! - Expansion state persisted through a host key-value store
//! - Search filtering that keeps ancestors of matches visible
//!
//! ## Architecture
//!
//! - **Listing**: raw markup in, sorted [`node::TreeNode`]s out
//! - **Loader**: strategy cascade and cache around the parser
//! - **Tree**: expansion, activation and search over loaded nodes
//!
//! ## Modules
//!
//! - [`node`]: Node model and filtering rules
//! - [`listing`]: Listing page parsing
//! - [`loader`]: Acquisition strategies and caching
//! - [`host`]: Message channel to the privileged host
//! - [`store`]: Expansion set persistence
//! - [`search`]: Search filtering and highlights
//! - [`tree`]: Live tree state
//! - [`config`]: Persistent flag configuration

pub mod config;
pub mod error;
pub mod host;
pub mod listing;
pub mod loader;
pub mod node;
pub mod search;
pub mod store;
pub mod tree;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used at the async trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Re-exports for convenient access to common types.
pub mod prelude {
    pub use crate::error::{AcquireError, HostError, LoadError, StoreError};
    pub use crate::host::{HostChannel, LocalHost, ProcessHost};
    pub use crate::loader::{ListingLoader, LoaderBuilder};
    pub use crate::node::{NodeKind, TreeNode};
    pub use crate::search::SearchQuery;
    pub use crate::store::{ExpansionStore, HostStore};
    pub use crate::tree::{Activation, FileTree, ListingStatus, TreeRow};
}
