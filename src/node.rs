//! The canonical tree node and its construction rules.
//!
//! A node only exists for directories and for files the viewer can open.
//! Everything else in a listing is dropped at construction time.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// File extensions (lower-case, without the dot) the viewer can open.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "mdc", "mkd", "txt", "markdown"];

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Directory,
    Markdown,
}

/// One entry in the file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Display name, never empty and never hidden
    pub name: String,
    /// Absolute locator (URL or file path), unique within a tree
    pub path: String,
    pub kind: NodeKind,
    /// Only meaningful for directories
    pub expanded: bool,
    /// Empty until the directory has been loaded
    pub children: Vec<Self>,
    /// True once the directory listing has been fetched
    pub loaded: bool,
}

impl TreeNode {
    /// Build a node from a listing entry, or `None` if the entry is filtered out.
    ///
    /// Rejects empty names, `.`, `..` and hidden entries for both kinds.
    /// Files are kept only if their extension is one of
    /// [`MARKDOWN_EXTENSIONS`]. A single trailing `/` is stripped from
    /// directory names.
    pub fn new(name: &str, path: impl Into<String>, is_dir: bool) -> Option<Self> {
        if name.is_empty() || name == "." || name == ".." || name.starts_with('.') {
            return None;
        }
        let name = if is_dir {
            name.strip_suffix('/').unwrap_or(name)
        } else {
            name
        };
        if name.is_empty() {
            return None;
        }
        let kind = if is_dir {
            NodeKind::Directory
        } else if is_markdown_name(name) {
            NodeKind::Markdown
        } else {
            return None;
        };
        Some(Self {
            name: name.to_string(),
            path: path.into(),
            kind,
            expanded: false,
            children: Vec::new(),
            loaded: false,
        })
    }

    /// A directory node standing for a listing root.
    pub(crate) fn root(path: &str) -> Self {
        Self {
            name: root_name(path),
            path: path.to_string(),
            kind: NodeKind::Directory,
            expanded: true,
            children: Vec::new(),
            loaded: false,
        }
    }

    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub const fn is_markdown(&self) -> bool {
        matches!(self.kind, NodeKind::Markdown)
    }

    /// Find a node by path in this subtree.
    pub fn find(&self, path: &str) -> Option<&Self> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// Find a node by path in this subtree, mutably.
    pub fn find_mut(&mut self, path: &str) -> Option<&mut Self> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(path))
    }
}

/// Returns true if `name` has one of the recognized markdown/text extensions.
pub fn is_markdown_name(name: &str) -> bool {
    name.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// Sort a listing: directories first, then by name.
///
/// Names compare on their lower-cased base letters, so `éclair` sorts with
/// `e` rather than after `z`. Ties fall back to case and then to the raw
/// name so the order is total.
pub fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by_cached_key(|node| {
        (
            !node.is_dir(),
            collation_key(&node.name),
            node.name.to_lowercase(),
            node.name.clone(),
        )
    });
}

/// Canonical decomposition with combining marks removed, lower-cased.
fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn root_name(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .map_or_else(|| path.to_string(), ToOwned::to_owned)
}
