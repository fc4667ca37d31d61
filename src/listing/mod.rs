//! Directory-listing parsing.
//!
//! This module handles:
//! - Extracting entries from `addRow(...)` listings (Chrome `file://` pages)
//! - Falling back to plain anchors (Apache, nginx, Firefox)
//! - Reading the rendered DOM a browser produces for a listing
//! - Resolving entry links against the listing URL

mod parser;

pub use parser::{parse, parse_rendered, resolve_url};
