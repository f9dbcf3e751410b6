use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;

use turn_mcp::{
    api::api_router,
    bridge::AgentBridge,
    config::{Cli, Command, ConfigureArgs, MonitorArgs, SetupPathArgs},
    controller::Controller,
    events::{init_logging, EventEmitter},
    mailbox::{FileMailbox, Mailbox},
    mcp::run_stdio,
    monitor::Monitor,
    setup::{self, McpRemoval, RulesInstall, RulesRemoval, SetupPaths},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match cli.command.clone() {
        Command::Serve => run_serve(&cli).await,
        Command::Monitor(args) => run_monitor(&cli, args).await,
        Command::Status(args) => run_status(&cli, args),
        Command::Configure(args) => run_configure(&cli, args),
        Command::Unconfigure(args) => run_unconfigure(args),
    }
}

async fn run_serve(cli: &Cli) -> Result<()> {
    let bridge = AgentBridge::new(FileMailbox::new(cli.mailbox_dir()))
        .with_poll_interval(cli.poll_interval())
        .with_heartbeat_ticks(cli.heartbeat_ticks);
    run_stdio(bridge).await
}

async fn run_monitor(cli: &Cli, args: MonitorArgs) -> Result<()> {
    let mailbox_dir = cli.mailbox_dir();
    let monitor = Arc::new(
        Monitor::new(Controller::new(FileMailbox::new(mailbox_dir.clone())))
            .with_poll_interval(cli.poll_interval()),
    );

    tokio::spawn(EventEmitter::new(cli.json_output).forward(monitor.subscribe()));
    monitor.start();

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API on {addr}"))?;
    eprintln!("[turn-mcp] mailbox {}", mailbox_dir.display());
    eprintln!("[turn-mcp] API listening on http://{addr}");

    let router = api_router(monitor.clone());
    let server = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(target = "turn_mcp::api", error = %error, "HTTP API server error");
        }
    });

    eprintln!("[turn-mcp] monitoring, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    server.abort();
    monitor.stop();
    tracing::info!(target = "turn_mcp::monitor", "monitor shut down");
    Ok(())
}

fn run_status(cli: &Cli, args: SetupPathArgs) -> Result<()> {
    let mailbox = FileMailbox::new(cli.mailbox_dir());
    match mailbox.read_status() {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("no status record in {}", mailbox.dir().display()),
    }
    if let Some(input) = mailbox.read_input() {
        println!("pending input: {input}");
    }

    match resolve_paths(&args) {
        Ok(paths) if setup::is_mcp_configured(&paths.mcp_config) => {
            println!("MCP server configured in {}", paths.mcp_config.display())
        }
        Ok(paths) => println!(
            "MCP server not configured in {} (run `turn-mcp configure`)",
            paths.mcp_config.display()
        ),
        Err(error) => println!("MCP configuration unknown: {error}"),
    }
    Ok(())
}

fn resolve_paths(args: &SetupPathArgs) -> Result<SetupPaths> {
    let defaults = SetupPaths::windsurf();
    let pick = |explicit: &Option<PathBuf>, default: Option<PathBuf>| {
        explicit
            .clone()
            .or(default)
            .context("could not determine home directory; pass the path explicitly")
    };
    Ok(SetupPaths {
        mcp_config: pick(
            &args.mcp_config,
            defaults.as_ref().map(|paths| paths.mcp_config.clone()),
        )?,
        rules: pick(&args.rules, defaults.map(|paths| paths.rules))?,
    })
}

fn run_configure(cli: &Cli, args: ConfigureArgs) -> Result<()> {
    let paths = resolve_paths(&args.paths)?;
    let mailbox_dir = cli.mailbox_dir();
    let entry = setup::server_entry(Some(mailbox_dir.as_path()))
        .context("failed to resolve server command")?;

    let report = setup::ensure_mcp_config(&paths.mcp_config, &entry)
        .with_context(|| format!("failed to update {}", paths.mcp_config.display()))?;
    if let Some(backup) = &report.backup {
        println!("backed up malformed config to {}", backup.display());
    }
    if report.created > 0 {
        println!("registered MCP server in {}", paths.mcp_config.display());
    } else if report.updated > 0 {
        println!("updated MCP server in {}", paths.mcp_config.display());
    } else {
        println!("MCP server already configured in {}", paths.mcp_config.display());
    }

    if args.no_rules {
        return Ok(());
    }
    match setup::ensure_rules(&paths.rules)
        .with_context(|| format!("failed to update {}", paths.rules.display()))?
    {
        RulesInstall::Injected => println!("injected rules into {}", paths.rules.display()),
        RulesInstall::AlreadyPresent => {
            println!("rules already present in {}", paths.rules.display())
        }
    }
    Ok(())
}

fn run_unconfigure(args: SetupPathArgs) -> Result<()> {
    let paths = resolve_paths(&args)?;

    match setup::remove_mcp_config(&paths.mcp_config)
        .with_context(|| format!("failed to update {}", paths.mcp_config.display()))?
    {
        McpRemoval::Removed => println!("removed MCP server from {}", paths.mcp_config.display()),
        McpRemoval::NotConfigured | McpRemoval::MissingFile => {
            println!("MCP server not configured in {}", paths.mcp_config.display())
        }
        McpRemoval::Malformed => println!(
            "left {} untouched: not valid JSON",
            paths.mcp_config.display()
        ),
    }

    match setup::remove_rules(&paths.rules)
        .with_context(|| format!("failed to update {}", paths.rules.display()))?
    {
        RulesRemoval::Removed => println!("removed rules from {}", paths.rules.display()),
        RulesRemoval::NotFound | RulesRemoval::MissingFile => {
            println!("no rules found in {}", paths.rules.display())
        }
    }
    Ok(())
}
