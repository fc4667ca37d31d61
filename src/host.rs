//! Message channel to a privileged host process.
//!
//! Some listings cannot be fetched from the local context (`file://` URLs,
//! hosts that need credentials the client does not hold). Those requests are
//! delegated to a host that answers JSON messages:
//!
//! ```text
//! -> {"action":"bg-fetch","data":{"url":"file:///home/me/docs/"}}
//! <- {"success":true,"data":"<html>..."}
//! -> {"action":"storage","data":{"key":"expandedFolders","value":[...]}}
//! <- {"success":true}
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use url::Url;

use crate::BoxFuture;
use crate::error::HostError;

/// A request sent to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum HostRequest {
    /// Fetch a URL on our behalf and return its body.
    BgFetch { url: String },
    /// Write `value` under `key` in the host's key-value store.
    Storage { key: String, value: Value },
}

/// The host's answer to a [`HostRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HostResponse {
    pub const fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
        }
    }

    pub const fn failed() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    /// The response body, if the request succeeded with non-empty text.
    pub fn text(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.data
            .as_ref()
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }
}

/// A channel that can carry requests to the privileged host.
pub trait HostChannel: Send + Sync {
    fn request(&self, request: HostRequest) -> BoxFuture<'_, Result<HostResponse, HostError>>;
}

/// Split a command line into program and arguments.
pub(crate) fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(ToOwned::to_owned);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

struct HostProcess {
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl HostProcess {
    async fn exchange(&mut self, request: &HostRequest) -> Result<HostResponse, HostError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        let reply = self.stdout.next_line().await?.ok_or(HostError::Closed)?;
        Ok(serde_json::from_str(&reply)?)
    }
}

/// Host reached through a helper process speaking one JSON message per line.
///
/// The process is started on first use and restarted after any failure.
/// Requests are serialized: one message is in flight at a time.
pub struct ProcessHost {
    program: String,
    args: Vec<String>,
    process: Mutex<Option<HostProcess>>,
}

impl ProcessHost {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            process: Mutex::new(None),
        }
    }

    /// Build from a whitespace-separated command line.
    pub fn from_command(command: &str) -> Option<Self> {
        split_command(command).map(|(program, args)| Self::new(program, args))
    }

    fn spawn(&self) -> Result<HostProcess, HostError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(HostError::Spawn)?;
        let stdin = child.stdin.take().ok_or(HostError::Closed)?;
        let stdout = child.stdout.take().ok_or(HostError::Closed)?;
        tracing::debug!(program = %self.program, "started host process");
        Ok(HostProcess {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

impl HostChannel for ProcessHost {
    fn request(&self, request: HostRequest) -> BoxFuture<'_, Result<HostResponse, HostError>> {
        Box::pin(async move {
            let mut guard = self.process.lock().await;
            if guard.is_none() {
                *guard = Some(self.spawn()?);
            }
            let Some(process) = guard.as_mut() else {
                return Err(HostError::Closed);
            };
            let result = process.exchange(&request).await;
            if let Err(err) = &result {
                tracing::debug!(%err, "host exchange failed, dropping process");
                *guard = None;
            }
            result
        })
    }
}

/// In-process host with direct filesystem access.
///
/// `bg-fetch` reads local paths and `file://` URLs; directories come back as
/// an `addRow(...)` listing page. `storage` writes into a JSON object file.
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    storage_path: Option<PathBuf>,
}

impl LocalHost {
    pub const fn new(storage_path: Option<PathBuf>) -> Self {
        Self { storage_path }
    }

    async fn fetch(&self, url: &str) -> Result<HostResponse, HostError> {
        let Some(path) = local_path_for(url) else {
            tracing::debug!(url, "local host only serves file locations");
            return Ok(HostResponse::failed());
        };
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(%err, path = %path.display(), "local fetch failed");
                return Ok(HostResponse::failed());
            }
        };
        let body = if metadata.is_dir() {
            render_listing(&path).await?
        } else {
            tokio::fs::read_to_string(&path).await?
        };
        Ok(HostResponse::ok(Some(Value::String(body))))
    }

    async fn store(&self, key: String, value: Value) -> Result<HostResponse, HostError> {
        let Some(path) = &self.storage_path else {
            return Ok(HostResponse::failed());
        };
        let mut entries: BTreeMap<String, Value> = match tokio::fs::read_to_string(path).await {
            Ok(content) if !content.trim().is_empty() => serde_json::from_str(&content)?,
            Ok(_) => BTreeMap::new(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        entries.insert(key, value);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec_pretty(&entries)?).await?;
        Ok(HostResponse::ok(None))
    }
}

impl HostChannel for LocalHost {
    fn request(&self, request: HostRequest) -> BoxFuture<'_, Result<HostResponse, HostError>> {
        Box::pin(async move {
            match request {
                HostRequest::BgFetch { url } => self.fetch(&url).await,
                HostRequest::Storage { key, value } => self.store(key, value).await,
            }
        })
    }
}

/// Map a `file://` URL or plain path to a filesystem path.
fn local_path_for(location: &str) -> Option<PathBuf> {
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Windows drive letters parse as a one-letter scheme
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(location)),
    }
}

/// Render a directory as the `addRow(...)` page Chrome produces for `file://`.
async fn render_listing(dir: &Path) -> Result<String, HostError> {
    let mut out = format!(
        "<!DOCTYPE html>\n<html><head><title>Index of {}</title></head><body>\n<script>\n",
        dir.display()
    );
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        let is_dir = file_type.is_dir();
        let mut href = Url::from_file_path(entry.path())
            .ok()
            .and_then(|url| url.path_segments()?.next_back().map(ToOwned::to_owned))
            .unwrap_or_else(|| name.clone());
        if is_dir {
            href.push('/');
        }
        out.push_str(&format!(
            "addRow({}, {}, {});\n",
            serde_json::to_string(&name)?,
            serde_json::to_string(&href)?,
            u8::from(is_dir)
        ));
    }
    out.push_str("</script>\n</body></html>\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_request_wire_format() {
        let fetch = HostRequest::BgFetch {
            url: "file:///tmp/".into(),
        };
        assert_eq!(
            serde_json::to_string(&fetch).unwrap(),
            r#"{"action":"bg-fetch","data":{"url":"file:///tmp/"}}"#
        );
        let storage = HostRequest::Storage {
            key: "expandedFolders".into(),
            value: serde_json::json!(["a/"]),
        };
        assert_eq!(
            serde_json::to_string(&storage).unwrap(),
            r#"{"action":"storage","data":{"key":"expandedFolders","value":["a/"]}}"#
        );
    }

    #[test]
    fn test_response_text_requires_success_and_content() {
        let ok: HostResponse = serde_json::from_str(r#"{"success":true,"data":"<html>"}"#).unwrap();
        assert_eq!(ok.text(), Some("<html>"));
        let failed: HostResponse = serde_json::from_str(r#"{"success":false,"data":"x"}"#).unwrap();
        assert_eq!(failed.text(), None);
        let empty: HostResponse = serde_json::from_str(r#"{"success":true,"data":""}"#).unwrap();
        assert_eq!(empty.text(), None);
        let missing: HostResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(missing.text(), None);
    }

    #[test]
    fn test_local_path_for_handles_urls_and_paths() {
        assert_eq!(
            local_path_for("file:///tmp/docs/"),
            Some(PathBuf::from("/tmp/docs/"))
        );
        assert_eq!(local_path_for("/srv/docs"), Some(PathBuf::from("/srv/docs")));
        assert_eq!(local_path_for("https://example.com/"), None);
    }

    #[test]
    fn test_split_command() {
        let (program, args) = split_command("chromium --headless  --dump-dom").unwrap();
        assert_eq!(program, "chromium");
        assert_eq!(args, ["--headless", "--dump-dom"]);
        assert!(split_command("   ").is_none());
    }

    #[tokio::test]
    async fn test_local_host_lists_directory_as_add_rows() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("guide")).unwrap();
        std::fs::write(dir.path().join("my notes.md"), "# hi").unwrap();
        let base = Url::from_directory_path(dir.path()).unwrap().to_string();

        let host = LocalHost::default();
        let response = host
            .request(HostRequest::BgFetch { url: base.clone() })
            .await
            .unwrap();
        let html = response.text().unwrap();
        assert!(html.contains(r#"addRow("guide", "guide/", 1);"#));
        assert!(html.contains(r#"addRow("my notes.md", "my%20notes.md", 0);"#));
    }

    #[tokio::test]
    async fn test_local_host_reads_files_and_reports_missing_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.md");
        std::fs::write(&file, "# A").unwrap();

        let host = LocalHost::default();
        let response = host
            .request(HostRequest::BgFetch {
                url: file.display().to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.text(), Some("# A"));

        let missing = host
            .request(HostRequest::BgFetch {
                url: dir.path().join("nope").display().to_string(),
            })
            .await
            .unwrap();
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_local_host_storage_merges_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let host = LocalHost::new(Some(path.clone()));
        let response = host
            .request(HostRequest::Storage {
                key: "expandedFolders".into(),
                value: serde_json::json!(["file:///a/"]),
            })
            .await
            .unwrap();
        assert!(response.success);

        let saved: BTreeMap<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["expandedFolders"], serde_json::json!(["file:///a/"]));
    }

    fn shell_host(script: &str) -> ProcessHost {
        ProcessHost::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn bg_fetch() -> HostRequest {
        HostRequest::BgFetch {
            url: "file:///srv/docs/".into(),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_host_answers_one_line_per_request() {
        let host = shell_host(
            r#"while read -r line; do printf '%s\n' '{"success":true,"data":"<a href=\"a.md\">a.md</a>"}'; done"#,
        );
        for _ in 0..2 {
            let response = host.request(bg_fetch()).await.unwrap();
            assert_eq!(response.text(), Some(r#"<a href="a.md">a.md</a>"#));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_host_restarts_after_helper_exits() {
        let dir = tempdir().unwrap();
        let starts = dir.path().join("starts");
        // First start exits at once; later starts answer normally
        let script = format!(
            r#"n=$(cat '{path}' 2>/dev/null || echo 0); echo $((n+1)) > '{path}'; [ "$n" = 0 ] && exit 0; while read -r line; do printf '%s\n' '{{"success":true,"data":"again"}}'; done"#,
            path = starts.display()
        );
        let host = shell_host(&script);

        let err = host.request(bg_fetch()).await.unwrap_err();
        assert!(matches!(err, HostError::Closed | HostError::Io(_)), "{err}");

        let response = host.request(bg_fetch()).await.unwrap();
        assert_eq!(response.text(), Some("again"));
        assert_eq!(std::fs::read_to_string(&starts).unwrap().trim(), "2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_host_rejects_non_json_replies() {
        let host = shell_host("while read -r line; do echo 'not json'; done");
        let err = host.request(bg_fetch()).await.unwrap_err();
        assert!(matches!(err, HostError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_process_host_reports_missing_program() {
        let host = ProcessHost::new("marktree-no-such-helper", Vec::new());
        let err = host.request(bg_fetch()).await.unwrap_err();
        assert!(matches!(err, HostError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_local_host_without_storage_path_rejects_writes() {
        let host = LocalHost::default();
        let response = host
            .request(HostRequest::Storage {
                key: "k".into(),
                value: Value::Null,
            })
            .await
            .unwrap();
        assert!(!response.success);
    }
}
