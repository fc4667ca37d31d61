//! Search filtering for the file tree.
//!
//! Provides name filtering with:
//! - Case-insensitive substring matching
//! - Ancestor visibility (a directory shows if anything below it matches)
//! - Match ranges for highlighting
//!
//! Visibility never changes expansion: a collapsed directory with a matching
//! descendant is shown, but stays collapsed.

use std::ops::Range;

use crate::node::TreeNode;

/// A normalized search query. Empty means "show everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    needle: String,
}

impl SearchQuery {
    pub fn new(raw: &str) -> Self {
        Self {
            needle: raw.to_lowercase().trim().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.needle
    }

    pub fn is_empty(&self) -> bool {
        self.needle.is_empty()
    }

    /// Whether `name` contains the query, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.is_empty() || name.to_lowercase().contains(&self.needle)
    }

    /// Whether `node` should be shown: it matches, or a loaded descendant does.
    pub fn is_visible(&self, node: &TreeNode) -> bool {
        self.is_empty() || self.matches(&node.name) || self.has_matching_descendant(node)
    }

    fn has_matching_descendant(&self, node: &TreeNode) -> bool {
        node.is_dir()
            && node
                .children
                .iter()
                .any(|child| self.matches(&child.name) || self.has_matching_descendant(child))
    }

    /// Byte ranges in `name` of every non-overlapping match.
    ///
    /// Empty when the query is empty, or when lower-casing `name` changes its
    /// byte layout (ranges would not map back onto `name`).
    pub fn highlights(&self, name: &str) -> Vec<Range<usize>> {
        if self.is_empty() {
            return Vec::new();
        }
        let lowered = name.to_lowercase();
        if lowered.len() != name.len() {
            return Vec::new();
        }
        lowered
            .match_indices(self.needle.as_str())
            .map(|(start, matched)| start..start + matched.len())
            .filter(|range| name.is_char_boundary(range.start) && name.is_char_boundary(range.end))
            .collect()
    }
}
