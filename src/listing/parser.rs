//! Listing extraction strategies.
//!
//! Three independent ways of reading entries out of a listing page, tried in
//! order. The first one that yields at least one entry wins; results are
//! never merged across strategies.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::node::{TreeNode, sort_nodes};

/// A parse strategy: raw HTML and base URL in, unsorted entries out.
type Strategy = fn(&str, &str) -> Vec<TreeNode>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("structured-call", parse_add_row_structured),
    ("lenient-call", parse_add_row_lenient),
    ("anchors", parse_anchors),
];

/// `addRow(<args>);` with the argument list captured, spanning newlines.
static ADD_ROW_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)addRow\((.*?)\);").expect("valid addRow call regex"));

/// `addRow("name", "url", flag` without caring how the call ends.
static ADD_ROW_LENIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"addRow\("((?:[^"\\]|\\.)*)"\s*,\s*"((?:[^"\\]|\\.)*)"\s*,\s*(\d+)"#)
        .expect("valid lenient addRow regex")
});

/// Parse a raw listing page into sorted tree nodes.
///
/// Never fails: a page nothing can be read from yields an empty list.
pub fn parse(html: &str, base_url: &str) -> Vec<TreeNode> {
    for (name, strategy) in STRATEGIES {
        let mut nodes = strategy(html, base_url);
        dedup_paths(&mut nodes);
        if !nodes.is_empty() {
            tracing::debug!(strategy = name, entries = nodes.len(), base_url, "parsed listing");
            sort_nodes(&mut nodes);
            return nodes;
        }
    }
    tracing::debug!(base_url, "no parse strategy produced entries");
    Vec::new()
}

/// Read entries from the DOM a browser renders for a directory listing.
///
/// Browser-native listings mark each entry anchor with the `icon` class and
/// directories additionally with `dir`. Returns `None` if the document has
/// no such anchors at all, which means it is not a rendered listing.
pub fn parse_rendered(markup: &str, base_url: &str) -> Option<Vec<TreeNode>> {
    let Ok(selector) = Selector::parse("a.icon") else {
        return None;
    };
    let document = Html::parse_document(markup);
    let mut saw_anchor = false;
    let mut nodes = Vec::new();

    for link in document.select(&selector) {
        saw_anchor = true;
        let is_dir = link.value().classes().any(|class| class == "dir");
        let text = link_text(&link);
        let name = text.strip_suffix('/').unwrap_or(&text);
        let href = link.value().attr("href").unwrap_or_default();
        if href.is_empty() {
            continue;
        }
        let path = if href.starts_with("file://") {
            href.to_string()
        } else {
            resolve_url(base_url, href)
        };
        nodes.extend(TreeNode::new(name, directory_path(path, is_dir), is_dir));
    }

    if !saw_anchor {
        return None;
    }
    dedup_paths(&mut nodes);
    sort_nodes(&mut nodes);
    Some(nodes)
}

/// Keep the first node for each path; icon and name links often repeat an entry.
fn dedup_paths(nodes: &mut Vec<TreeNode>) {
    let mut seen = HashSet::new();
    nodes.retain(|node| seen.insert(node.path.clone()));
}

/// Resolve `relative` against `base`, falling back to plain concatenation.
pub fn resolve_url(base: &str, relative: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(relative))
        .map_or_else(|_| format!("{base}{relative}"), String::from)
}

fn parse_add_row_structured(html: &str, base_url: &str) -> Vec<TreeNode> {
    let mut nodes = Vec::new();
    for captures in ADD_ROW_CALL.captures_iter(html) {
        let raw_args = &captures[1];
        let args: Vec<Value> = match serde_json::from_str(&format!("[{raw_args}]")) {
            Ok(args) => args,
            Err(err) => {
                tracing::trace!(%err, raw_args, "skipping malformed addRow call");
                continue;
            }
        };
        let (Some(name), Some(href)) = (args.first(), args.get(1)) else {
            continue;
        };
        let is_dir = args.get(2).is_some_and(is_dir_flag);
        let path = directory_path(resolve_url(base_url, &value_to_string(href)), is_dir);
        nodes.extend(TreeNode::new(&value_to_string(name), path, is_dir));
    }
    nodes
}

fn parse_add_row_lenient(html: &str, base_url: &str) -> Vec<TreeNode> {
    ADD_ROW_LENIENT
        .captures_iter(html)
        .filter_map(|captures| {
            let name = unescape(&captures[1]);
            let href = unescape(&captures[2]);
            let is_dir = &captures[3] == "1";
            let path = directory_path(resolve_url(base_url, &href), is_dir);
            TreeNode::new(&name, path, is_dir)
        })
        .collect()
}

fn parse_anchors(html: &str, base_url: &str) -> Vec<TreeNode> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let mut nodes = Vec::new();

    for link in document.select(&selector) {
        let href = link.value().attr("href").unwrap_or_default();
        if is_navigation_href(href) {
            continue;
        }
        let path = resolve_url(base_url, href);
        // Self and ancestor links ("Parent Directory", breadcrumbs)
        if base_url.starts_with(&path) {
            continue;
        }
        let text = link_text(&link);
        let name = if text.is_empty() { href } else { text.as_str() };
        nodes.extend(TreeNode::new(name, path, href.ends_with('/')));
    }
    nodes
}

/// Directory locators end in `/` so their own entries resolve beneath them.
fn directory_path(mut path: String, is_dir: bool) -> String {
    if is_dir && !path.ends_with('/') {
        path.push('/');
    }
    path
}

fn is_navigation_href(href: &str) -> bool {
    matches!(href, "" | "/" | "." | "./" | ".." | "../")
        || href.starts_with('#')
        || href.starts_with('?')
}

fn link_text(link: &ElementRef<'_>) -> String {
    link.text().collect::<String>().trim().to_string()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_dir_flag(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => s.trim().parse::<f64>().ok() == Some(1.0),
        Value::Bool(b) => *b,
        _ => false,
    }
}

/// Decode JavaScript string escapes, falling back to dropping backslashes
/// when the text is not a valid JSON string body.
fn unescape(raw: &str) -> String {
    if let Ok(decoded) = serde_json::from_str::<String>(&format!("\"{raw}\"")) {
        return decoded;
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
