//! Live file tree state.
//!
//! [`FileTree`] owns the root listing and every subtree loaded so far. It:
//! - loads directories lazily on first expansion
//! - restores the persisted expansion set, depth-first and one load at a time
//! - records expansion changes and hands them to the [`ExpansionStore`]
//! - projects the tree into [`TreeRow`]s filtered by the active search
//!
//! Nodes are addressed by path; paths are unique within one tree.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::BoxFuture;
use crate::loader::ListingLoader;
use crate::node::{NodeKind, TreeNode};
use crate::search::SearchQuery;
use crate::store::ExpansionStore;

/// What is known about a directory's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStatus {
    /// Never requested
    NotLoaded,
    /// Loaded with at least one entry
    Ready,
    /// Loaded and confirmed to hold no visible entries
    Empty,
    /// No acquisition strategy could read the listing
    Unavailable,
}

impl ListingStatus {
    /// Placeholder text for a directory without entries.
    pub const fn placeholder(self) -> Option<&'static str> {
        match self {
            Self::Empty => Some("No files found"),
            Self::Unavailable => Some("Listing unavailable"),
            Self::NotLoaded | Self::Ready => None,
        }
    }
}

/// Result of activating a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A directory was toggled; carries the new expansion state
    Toggled(bool),
    /// A file was opened; carries its path
    Open(String),
}

/// One visible line of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    /// Nesting level below the root (root entries are 0)
    pub depth: usize,
    pub expanded: bool,
    /// Whether this is the currently open document
    pub active: bool,
    /// Byte ranges of search matches in `name`
    pub highlights: Vec<std::ops::Range<usize>>,
}

/// The directory part of a document locator, up to and including the last `/`.
pub fn directory_of(location: &str) -> &str {
    location
        .rfind('/')
        .map_or(location, |idx| &location[..=idx])
}

/// The live tree over one root directory.
pub struct FileTree {
    loader: Arc<ListingLoader>,
    store: Option<Arc<dyn ExpansionStore>>,
    root: TreeNode,
    expanded: BTreeSet<String>,
    query: SearchQuery,
    active: Option<String>,
    statuses: HashMap<String, ListingStatus>,
}

impl std::fmt::Debug for FileTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTree")
            .field("root", &self.root.path)
            .field("expanded", &self.expanded)
            .field("query", &self.query)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl FileTree {
    /// Create an unloaded tree rooted at `root_path`.
    ///
    /// `expanded` is the persisted expansion set; call
    /// [`FileTree::initialize`] to load the root and restore it.
    pub fn new(
        loader: Arc<ListingLoader>,
        root_path: &str,
        expanded: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            loader,
            store: None,
            root: TreeNode::root(root_path),
            expanded: expanded.into_iter().collect(),
            query: SearchQuery::default(),
            active: None,
            statuses: HashMap::new(),
        }
    }

    /// Create a tree for the directory containing `document`, with the
    /// document marked active.
    pub fn for_document(
        loader: Arc<ListingLoader>,
        document: &str,
        expanded: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut tree = Self::new(loader, directory_of(document), expanded);
        if directory_of(document) != document {
            tree.active = Some(document.to_string());
        }
        tree
    }

    /// Persist expansion changes to `store`.
    pub fn with_store(mut self, store: Arc<dyn ExpansionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load the root listing and restore persisted expansion below it.
    pub async fn initialize(&mut self) {
        let root_path = self.root.path.clone();
        self.load_children(&root_path).await;
        tracing::info!(
            root = %root_path,
            entries = self.root.children.len(),
            status = ?self.listing_status(&root_path),
            "file tree initialized"
        );
    }

    /// Replace the whole tree with a fresh one rooted at `root_path`.
    pub async fn reinitialize(&mut self, root_path: &str) {
        self.root = TreeNode::root(root_path);
        self.statuses.clear();
        self.initialize().await;
    }

    /// Load a directory's children if that has not happened yet.
    ///
    /// Children that are in the expansion set are expanded and loaded in
    /// turn, depth-first. Unknown paths, files and loaded directories are
    /// left alone.
    pub fn load_children<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self.root.find(path) {
                Some(node) if node.is_dir() && !node.loaded => {}
                _ => return,
            }

            let (children, status) = match self.loader.load_outcome(path).await {
                Ok(children) if children.is_empty() => (children, ListingStatus::Empty),
                Ok(children) => (children, ListingStatus::Ready),
                Err(err) => {
                    tracing::debug!(%err, "directory left empty");
                    (Vec::new(), ListingStatus::Unavailable)
                }
            };
            self.statuses.insert(path.to_string(), status);

            let restore: Vec<String> = children
                .iter()
                .filter(|child| child.is_dir() && self.expanded.contains(&child.path))
                .map(|child| child.path.clone())
                .collect();

            let Some(node) = self.root.find_mut(path) else {
                return;
            };
            node.children = children;
            node.loaded = true;

            for child_path in restore {
                if let Some(child) = self.root.find_mut(&child_path) {
                    child.expanded = true;
                }
                self.load_children(&child_path).await;
            }
        })
    }

    /// Flip a directory's expansion, loading it first if needed.
    ///
    /// Returns the new expansion state, or `None` if `path` is not a
    /// directory below the root.
    pub async fn toggle(&mut self, path: &str) -> Option<bool> {
        if path == self.root.path {
            return None;
        }
        let node = self.root.find_mut(path).filter(|node| node.is_dir())?;
        node.expanded = !node.expanded;
        let expanded = node.expanded;
        if expanded && !node.loaded {
            self.load_children(path).await;
        }

        if expanded {
            self.expanded.insert(path.to_string());
        } else {
            self.expanded.remove(path);
        }
        self.persist().await;
        Some(expanded)
    }

    /// Make sure a directory is expanded, loading it if needed.
    ///
    /// Unlike [`FileTree::toggle`] this never collapses. Returns `None` if
    /// `path` is not a directory below the root.
    pub async fn expand(&mut self, path: &str) -> Option<bool> {
        match self.root.find(path) {
            Some(node) if node.is_dir() && node.expanded && path != self.root.path => Some(true),
            _ => self.toggle(path).await,
        }
    }

    /// Handle a click on a node: directories toggle, files open.
    pub async fn activate(&mut self, path: &str) -> Option<Activation> {
        if self.root.find(path)?.is_dir() {
            return self.toggle(path).await.map(Activation::Toggled);
        }
        self.active = Some(path.to_string());
        Some(Activation::Open(path.to_string()))
    }

    /// Drop a directory's cached listing and load it again.
    pub async fn refresh(&mut self, path: &str) {
        let Some(node) = self.root.find_mut(path).filter(|node| node.is_dir()) else {
            return;
        };
        node.children.clear();
        node.loaded = false;
        self.loader.invalidate(path);
        self.statuses.remove(path);
        self.load_children(path).await;
    }

    /// Set the search query; whitespace and case are ignored.
    pub fn set_search_query(&mut self, query: &str) {
        self.query = SearchQuery::new(query);
    }

    pub const fn search(&self) -> &SearchQuery {
        &self.query
    }

    /// Whether the node at `path` passes the current search.
    ///
    /// The root is always visible; unknown paths never are.
    pub fn is_visible(&self, path: &str) -> bool {
        if path == self.root.path {
            return true;
        }
        self.root
            .find(path)
            .is_some_and(|node| self.query.is_visible(node))
    }

    /// Every visible row below the root, in display order.
    ///
    /// Only expanded directories contribute their children.
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        self.collect_rows(&self.root.children, 0, &mut rows);
        rows
    }

    fn collect_rows(&self, nodes: &[TreeNode], depth: usize, rows: &mut Vec<TreeRow>) {
        for node in nodes {
            if !self.query.is_visible(node) {
                continue;
            }
            rows.push(TreeRow {
                name: node.name.clone(),
                path: node.path.clone(),
                kind: node.kind,
                depth,
                expanded: node.expanded,
                active: self.active.as_deref() == Some(node.path.as_str()),
                highlights: self.query.highlights(&node.name),
            });
            if node.is_dir() && node.expanded {
                self.collect_rows(&node.children, depth + 1, rows);
            }
        }
    }

    pub fn listing_status(&self, path: &str) -> ListingStatus {
        self.statuses
            .get(path)
            .copied()
            .unwrap_or(ListingStatus::NotLoaded)
    }

    pub const fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        self.root.find(path)
    }

    /// The current expansion set.
    pub const fn expanded_paths(&self) -> &BTreeSet<String> {
        &self.expanded
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(err) = store.save(&self.expanded).await {
            tracing::warn!(%err, "failed to persist expanded folders");
        }
    }
}
