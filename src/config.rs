use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::mailbox::FileMailbox;

#[derive(Debug, Parser, Clone)]
#[command(name = "turn-mcp")]
#[command(about = "Lets a tool-calling agent pause mid-session and wait for the next human instruction")]
pub struct Cli {
    /// Mailbox directory shared by the controller and the agent bridge.
    #[arg(long, global = true, env = "TURN_MCP_DIR")]
    pub mailbox_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Idle ticks between "still waiting" log lines in serve mode.
    #[arg(long, global = true, default_value_t = 20)]
    pub heartbeat_ticks: u64,

    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit controller events as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub json_output: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the MCP stdio server that exposes the `turn` tool.
    Serve,
    /// Watch the mailbox, hold the message queue and serve the HTTP API.
    Monitor(MonitorArgs),
    /// Print the current status record and whether the MCP server is registered.
    Status(SetupPathArgs),
    /// Register the MCP server and inject the agent rules.
    Configure(ConfigureArgs),
    /// Remove the MCP server entry and the agent rules.
    Unconfigure(SetupPathArgs),
}

#[derive(Debug, Args, Clone)]
pub struct MonitorArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    #[arg(long, default_value_t = 3890)]
    pub port: u16,
}

#[derive(Debug, Args, Clone)]
pub struct SetupPathArgs {
    /// MCP client config file (default: Windsurf's global mcp_config.json).
    #[arg(long)]
    pub mcp_config: Option<PathBuf>,

    /// Rules file (default: Windsurf's global_rules.md).
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ConfigureArgs {
    #[command(flatten)]
    pub paths: SetupPathArgs,

    /// Only register the MCP server.
    #[arg(long, default_value_t = false)]
    pub no_rules: bool,
}

impl Cli {
    pub fn mailbox_dir(&self) -> PathBuf {
        self.mailbox_dir
            .clone()
            .unwrap_or_else(FileMailbox::default_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
