//! Rendered-DOM acquisition.
//!
//! Browsers build their own DOM for directory listings (Chrome's `file://`
//! pages, for instance) that is not present in the raw response body. This
//! strategy asks a rendering engine for the finished document and reads the
//! listing anchors out of it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use crate::BoxFuture;
use crate::error::AcquireError;
use crate::host::split_command;
use crate::listing;

use super::{Acquire, Acquired};

/// A rendering engine that can load a URL and serialize the resulting DOM.
///
/// Dropping the returned future must tear the surface down.
pub trait RenderSurface: Send + Sync {
    fn render<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, AcquireError>>;
}

/// Surface backed by a headless browser command line.
///
/// `{url}` in the arguments is replaced by the target URL; without a
/// placeholder the URL is appended. The serialized DOM is read from stdout,
/// e.g. `chromium --headless --dump-dom {url}`.
#[derive(Debug, Clone)]
pub struct CommandSurface {
    program: String,
    args: Vec<String>,
}

impl CommandSurface {
    pub fn from_command(command: &str) -> Option<Self> {
        split_command(command).map(|(program, args)| Self { program, args })
    }

    fn args_for(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = self.args.iter().map(|arg| arg.replace("{url}", url)).collect();
        if !self.args.iter().any(|arg| arg.contains("{url}")) {
            args.push(url.to_string());
        }
        args
    }
}

impl RenderSurface for CommandSurface {
    fn render<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, AcquireError>> {
        Box::pin(async move {
            let output = Command::new(&self.program)
                .args(self.args_for(url))
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await?;
            if !output.status.success() {
                return Err(AcquireError::Render(format!(
                    "{} exited with {}",
                    self.program, output.status
                )));
            }
            let markup = String::from_utf8_lossy(&output.stdout).into_owned();
            if markup.trim().is_empty() {
                return Err(AcquireError::Render("no document produced".into()));
            }
            Ok(markup)
        })
    }
}

/// Reads the listing out of a rendered document, bounded by a timeout.
pub struct RenderedDom {
    surface: Arc<dyn RenderSurface>,
    timeout: Duration,
}

impl RenderedDom {
    pub fn new(surface: Arc<dyn RenderSurface>, timeout: Duration) -> Self {
        Self { surface, timeout }
    }
}

impl Acquire for RenderedDom {
    fn name(&self) -> &'static str {
        "rendered-dom"
    }

    fn acquire<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Acquired, AcquireError>> {
        Box::pin(async move {
            let markup = tokio::time::timeout(self.timeout, self.surface.render(url))
                .await
                .map_err(|_| AcquireError::Timeout(self.timeout))??;
            listing::parse_rendered(&markup, url)
                .map(Acquired::Nodes)
                .ok_or(AcquireError::NoListing)
        })
    }
}
