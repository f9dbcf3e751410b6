//! One-shot client setup: register the `turn-mcp` server in the editor's MCP
//! config and inject the rules that tell the agent to call `turn`.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::mailbox::FileMailbox;

pub const SERVER_KEY: &str = "turn-mcp";
pub const RULES_MARKER: &str = "## Turn MCP Rules";
const RULES_BODY: &str = include_str!("../rules/turn-rules.md");
const COMMAND_OVERRIDE_ENV: &str = "TURN_MCP_COMMAND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupPaths {
    pub mcp_config: PathBuf,
    pub rules: PathBuf,
}

impl SetupPaths {
    /// Windsurf's global MCP config and rules locations.
    pub fn windsurf() -> Option<Self> {
        let base = dirs::home_dir()?.join(".codeium").join("windsurf");
        Some(Self {
            mcp_config: base.join("mcp_config.json"),
            rules: base.join("memories").join("global_rules.md"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpInstallReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Where a malformed config was moved before being replaced.
    pub backup: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpRemoval {
    Removed,
    NotConfigured,
    Malformed,
    MissingFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesInstall {
    Injected,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesRemoval {
    Removed,
    NotFound,
    MissingFile,
}

/// The `mcpServers` entry that launches this binary in `serve` mode.
///
/// `TURN_MCP_COMMAND` replaces the command line, e.g. for a dev build.
/// A non-default mailbox dir is passed to the server through its env.
pub fn server_entry(mailbox_dir: Option<&Path>) -> io::Result<Value> {
    let (command, args) = match std::env::var(COMMAND_OVERRIDE_ENV) {
        Ok(custom) => {
            let mut parts = shlex::split(&custom).unwrap_or_default().into_iter();
            let command = parts.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{COMMAND_OVERRIDE_ENV} must name a command"),
                )
            })?;
            (command, parts.collect::<Vec<_>>())
        }
        Err(_) => {
            let exe = std::env::current_exe()?;
            (exe.display().to_string(), vec!["serve".to_string()])
        }
    };

    let mut server = Map::new();
    server.insert("command".into(), Value::String(command));
    server.insert(
        "args".into(),
        Value::Array(args.into_iter().map(Value::String).collect()),
    );
    if let Some(dir) = mailbox_dir.filter(|dir| *dir != FileMailbox::default_dir()) {
        let mut env = Map::new();
        env.insert("TURN_MCP_DIR".into(), Value::String(dir.display().to_string()));
        server.insert("env".into(), Value::Object(env));
    }
    Ok(Value::Object(server))
}

pub fn ensure_mcp_config(path: &Path, entry: &Value) -> io::Result<McpInstallReport> {
    let mut report = McpInstallReport::default();
    ensure_parent(path)?;

    if !path.exists() {
        let mut servers = Map::new();
        servers.insert(SERVER_KEY.to_string(), entry.clone());
        let mut top = Map::new();
        top.insert("mcpServers".to_string(), Value::Object(servers));
        write_pretty_json(path, &Value::Object(top))?;
        report.created = 1;
        return Ok(report);
    }

    let existing = fs::read_to_string(path)?;
    let mut parsed = match serde_json::from_str::<Value>(&existing) {
        Ok(value) if value.is_object() => value,
        _ => {
            let backup = backup_path(path);
            fs::copy(path, &backup)?;
            tracing::warn!(path = %path.display(), backup = %backup.display(), "MCP config was malformed, backed it up");
            report.backup = Some(backup);
            Value::Object(Map::new())
        }
    };

    let top = parsed.as_object_mut().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} must contain a top-level JSON object", path.display()),
        )
    })?;
    let servers = top
        .entry("mcpServers".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !servers.is_object() {
        *servers = Value::Object(Map::new());
    }
    let servers_obj = servers.as_object_mut().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} field mcpServers must be an object", path.display()),
        )
    })?;

    if servers_obj.get(SERVER_KEY) == Some(entry) {
        report.skipped = 1;
        return Ok(report);
    }
    servers_obj.insert(SERVER_KEY.to_string(), entry.clone());
    write_pretty_json(path, &parsed)?;
    report.updated = 1;
    Ok(report)
}

pub fn is_mcp_configured(path: &Path) -> bool {
    fs::read_to_string(path)
        .ok()
        .and_then(|body| serde_json::from_str::<Value>(&body).ok())
        .is_some_and(|config| {
            config
                .get("mcpServers")
                .and_then(|servers| servers.get(SERVER_KEY))
                .is_some()
        })
}

pub fn remove_mcp_config(path: &Path) -> io::Result<McpRemoval> {
    if !path.exists() {
        return Ok(McpRemoval::MissingFile);
    }
    let body = fs::read_to_string(path)?;
    let Ok(mut config) = serde_json::from_str::<Value>(&body) else {
        return Ok(McpRemoval::Malformed);
    };
    let removed = config
        .get_mut("mcpServers")
        .and_then(Value::as_object_mut)
        .and_then(|servers| servers.remove(SERVER_KEY))
        .is_some();
    if !removed {
        return Ok(McpRemoval::NotConfigured);
    }
    write_pretty_json(path, &config)?;
    Ok(McpRemoval::Removed)
}

pub fn ensure_rules(path: &Path) -> io::Result<RulesInstall> {
    ensure_parent(path)?;
    let existing = match fs::read_to_string(path) {
        Ok(body) => body,
        Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
        Err(error) => return Err(error),
    };
    if existing.contains(RULES_MARKER) {
        return Ok(RulesInstall::AlreadyPresent);
    }
    fs::write(path, append_block(existing, RULES_BODY))?;
    Ok(RulesInstall::Injected)
}

pub fn remove_rules(path: &Path) -> io::Result<RulesRemoval> {
    if !path.exists() {
        return Ok(RulesRemoval::MissingFile);
    }
    let existing = fs::read_to_string(path)?;
    match strip_rules_section(&existing) {
        Some(next) => {
            fs::write(path, next)?;
            Ok(RulesRemoval::Removed)
        }
        None => Ok(RulesRemoval::NotFound),
    }
}

/// Remove the rules section: from the marker up to the next `## ` heading
/// or the end of the text. Returns `None` if the marker is absent.
pub fn strip_rules_section(content: &str) -> Option<String> {
    let start = content.find(RULES_MARKER)?;
    let after_marker = start + RULES_MARKER.len();
    let end = content[after_marker..]
        .find("\n## ")
        .map(|rel| after_marker + rel)
        .unwrap_or(content.len());

    let mut next = content[..start].trim_end().to_string();
    next.push_str(&content[end..]);
    Some(next)
}

fn append_block(mut existing: String, block: &str) -> String {
    if !existing.is_empty() && !existing.ends_with('\n') {
        existing.push('\n');
    }
    if !existing.trim().is_empty() {
        existing.push('\n');
    }
    existing.push_str(block);
    existing
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn write_pretty_json(path: &Path, value: &Value) -> io::Result<()> {
    let mut body = serde_json::to_string_pretty(value).map_err(|error| {
        io::Error::other(format!("failed to serialize {}: {error}", path.display()))
    })?;
    body.push('\n');
    fs::write(path, body)
}
