//! Marktree - browse the markdown files behind a directory listing.
//!
//! # Usage
//!
//! ```bash
//! marktree ~/notes
//! marktree https://example.com/docs/ --search install
//! marktree ./docs/README.md --expand guides/
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use marktree::config::{
    ConfigFlags, clear_config_flags, default_store_path, global_config_path, load_config_flags,
    local_override_path, save_config_flags,
};
use marktree::host::{HostChannel, LocalHost, ProcessHost};
use marktree::listing;
use marktree::loader::{CommandSurface, DEFAULT_TIMEOUT, ListingLoader};
use marktree::node::NodeKind;
use marktree::store::{HostStore, load_expanded};
use marktree::tree::FileTree;

/// Browse the markdown files behind a directory listing
#[derive(Parser, Debug)]
#[command(name = "marktree", version, about, long_about = None)]
struct Cli {
    /// Listing URL, local directory, or a document whose directory to list
    #[arg(value_name = "TARGET")]
    target: String,

    /// Only show entries whose name contains QUERY (and their ancestors)
    #[arg(long, value_name = "QUERY")]
    search: Option<String>,

    /// Expand a directory after loading (relative to the root, repeatable)
    #[arg(long, value_name = "PATH")]
    expand: Vec<String>,

    /// Time budget in seconds for rendering and direct fetches
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Headless browser command that prints the rendered DOM of {url}
    #[arg(long, value_name = "CMD")]
    renderer: Option<String>,

    /// Helper command answering JSON host messages on stdin/stdout
    #[arg(long, value_name = "CMD")]
    host: Option<String>,

    /// Skip the direct HTTP fetch strategy
    #[arg(long)]
    no_fetch: bool,

    /// JSON file holding persisted state such as expanded folders
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

impl Cli {
    fn flags(&self) -> ConfigFlags {
        ConfigFlags {
            no_fetch: self.no_fetch,
            timeout_secs: self.timeout,
            renderer: self.renderer.clone(),
            host: self.host.clone(),
            store: self.store.clone(),
        }
    }
}

/// Turn the command-line target into a locator the loader understands.
fn target_location(target: &str) -> Result<String> {
    match Url::parse(target) {
        // Windows drive letters parse as a one-letter scheme
        Ok(url) if url.scheme().len() > 1 => return Ok(url.into()),
        _ => {}
    }
    let path = std::fs::canonicalize(target)
        .with_context(|| format!("Target not found: {target}"))?;
    let url = if path.is_dir() {
        Url::from_directory_path(&path)
    } else {
        Url::from_file_path(&path)
    };
    url.map(String::from)
        .map_err(|()| anyhow::anyhow!("Cannot express {} as a file URL", path.display()))
}

/// Resolve an `--expand` argument against the root; directories end in `/`.
fn expand_location(root: &str, path: &str) -> String {
    let mut location = listing::resolve_url(root, path);
    if !location.ends_with('/') {
        location.push('/');
    }
    location
}

fn print_tree(tree: &FileTree) {
    let root = tree.root();
    println!("{}", root.path);

    let rows = tree.visible_rows();
    if rows.is_empty() {
        let message = if tree.search().is_empty() {
            tree.listing_status(&root.path)
                .placeholder()
                .unwrap_or("No files found")
        } else {
            "No matching files"
        };
        println!("  {message}");
        return;
    }

    for row in rows {
        let indent = "  ".repeat(row.depth + 1);
        let marker = match row.kind {
            NodeKind::Directory if row.expanded => "▾ ",
            NodeKind::Directory => "▸ ",
            NodeKind::Markdown => "  ",
        };
        let active = if row.active { "  <" } else { "" };
        println!("{indent}{marker}{}{active}", row.name);

        if row.kind == NodeKind::Directory && row.expanded && tree.search().is_empty() {
            let placeholder = tree.listing_status(&row.path).placeholder();
            if let Some(message) = placeholder {
                println!("{indent}    {message}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = cli.flags();

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    let store_path = effective.store.clone().unwrap_or_else(default_store_path);
    let host: Arc<dyn HostChannel> = match &effective.host {
        Some(command) => Arc::new(
            ProcessHost::from_command(command).context("--host needs a command to run")?,
        ),
        None => Arc::new(LocalHost::new(Some(store_path.clone()))),
    };

    let timeout = effective
        .timeout_secs
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs);
    let mut builder = ListingLoader::builder()
        .timeout(timeout)
        .direct_fetch(!effective.no_fetch)
        .host(Arc::clone(&host));
    if let Some(command) = &effective.renderer {
        let surface =
            CommandSurface::from_command(command).context("--renderer needs a command to run")?;
        builder = builder.render_surface(Arc::new(surface));
    }
    let loader = Arc::new(builder.build());
    tracing::debug!(?loader, "loader ready");

    let persisted = match load_expanded(&store_path) {
        Ok(expanded) => expanded,
        Err(err) => {
            tracing::warn!(%err, path = %store_path.display(), "ignoring unreadable store");
            Default::default()
        }
    };

    let target = target_location(&cli.target)?;
    let mut tree = FileTree::for_document(loader, &target, persisted)
        .with_store(Arc::new(HostStore::new(host)));
    tree.initialize().await;

    let root = tree.root().path.clone();
    for path in &cli.expand {
        let location = expand_location(&root, path);
        if tree.expand(&location).await.is_none() {
            eprintln!("[warn] Not a directory in this tree: {path}");
        }
    }
    if let Some(query) = &cli.search {
        tree.set_search_query(query);
    }

    print_tree(&tree);
    Ok(())
}
