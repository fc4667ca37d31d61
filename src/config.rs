use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub no_fetch: bool,
    pub timeout_secs: Option<u64>,
    pub renderer: Option<String>,
    pub host: Option<String>,
    pub store: Option<PathBuf>,
}

impl ConfigFlags {
    pub fn union(&self, other: &Self) -> Self {
        Self {
            no_fetch: self.no_fetch || other.no_fetch,
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            renderer: other.renderer.clone().or_else(|| self.renderer.clone()),
            host: other.host.clone().or_else(|| self.host.clone()),
            store: other.store.clone().or_else(|| self.store.clone()),
        }
    }
}

pub fn global_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("marktree").join("config");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("marktree")
                .join("config");
        }
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("marktree").join("config");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("marktree")
                .join("config");
        }
    }

    local_override_path()
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(".marktreerc")
}

/// Default location of the expansion store when none is configured.
pub fn default_store_path() -> PathBuf {
    global_config_path().with_file_name("state.json")
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    let mut lines = vec!["# marktree defaults (saved with --save)".to_string()];
    if flags.no_fetch {
        lines.push("--no-fetch".to_string());
    }
    if let Some(secs) = flags.timeout_secs {
        lines.push(format!("--timeout {secs}"));
    }
    // Commands contain spaces, so they use the `=` form and keep one per line
    if let Some(renderer) = &flags.renderer {
        lines.push(format!("--renderer={renderer}"));
    }
    if let Some(host) = &flags.host {
        lines.push(format!("--host={host}"));
    }
    if let Some(store) = &flags.store {
        lines.push(format!("--store {}", store.display()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    fs::write(path, format!("{}\n", lines.join("\n")))
        .with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if token == "--no-fetch" {
            flags.no_fetch = true;
        } else if token == "--timeout" {
            if let Some(next) = tokens.get(i + 1) {
                flags.timeout_secs = next.parse().ok();
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--timeout=") {
            flags.timeout_secs = value.parse().ok();
        } else if token == "--renderer" {
            if let Some(next) = tokens.get(i + 1) {
                flags.renderer = Some(next.clone());
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--renderer=") {
            flags.renderer = Some(value.to_string());
        } else if token == "--host" {
            if let Some(next) = tokens.get(i + 1) {
                flags.host = Some(next.clone());
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--host=") {
            flags.host = Some(value.to_string());
        } else if token == "--store" {
            if let Some(next) = tokens.get(i + 1) {
                flags.store = Some(PathBuf::from(next));
                i += 1;
            }
        } else if let Some(value) = token.strip_prefix("--store=") {
            flags.store = Some(PathBuf::from(value));
        }
        i += 1;
    }
    flags
}

/// Read flag tokens from an rc file.
///
/// `--renderer=` and `--host=` take the rest of their line, so
/// `--renderer=chromium --headless --dump-dom {url}` keeps its arguments.
pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let mut flags = ConfigFlags::default();
    for line in content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
    {
        let line_flags = match command_value(line) {
            Some(("renderer", value)) => ConfigFlags {
                renderer: Some(value.to_string()),
                ..ConfigFlags::default()
            },
            Some(("host", value)) => ConfigFlags {
                host: Some(value.to_string()),
                ..ConfigFlags::default()
            },
            _ => {
                let tokens: Vec<String> = line.split_whitespace().map(ToOwned::to_owned).collect();
                parse_flag_tokens(&tokens)
            }
        };
        flags = flags.union(&line_flags);
    }
    Ok(flags)
}

fn command_value(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("--")?;
    let (name, value) = rest.split_once('=')?;
    matches!(name, "renderer" | "host").then_some((name, value.trim()))
}
