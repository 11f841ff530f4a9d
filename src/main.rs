#![forbid(unsafe_code)]

//! `discord-rpc-ipc`: list a guild's channels over the desktop client's IPC.
//!
//! Resolves configuration, opens an RPC session against the running desktop
//! client, runs `GET_CHANNELS`, and prints the result.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use discord_rpc_ipc::config::{ConfigOverrides, RpcConfig};
use discord_rpc_ipc::output::{render_channels, OutputFormat};
use discord_rpc_ipc::{AppError, Result, RpcSession};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "discord-rpc-ipc",
    about = "List guild channels through the Discord desktop client's IPC RPC",
    version,
    long_about = None
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Application (client) id; overrides `CLIENT_ID`.
    #[arg(long)]
    client_id: Option<String>,

    /// Guild whose channels are listed; overrides `TARGET_GUILD_ID`.
    #[arg(long)]
    guild_id: Option<String>,

    /// Seconds to wait for the command response.
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the channel list as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("Error: {err}");
        return ExitCode::from(exit_status(&err));
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "run failed");
            eprintln!("Error: {err}");
            if let AppError::Command(_) = err {
                eprintln!("The application may lack the required scope or is not authorized.");
            }
            ExitCode::from(exit_status(&err))
        }
    }
}

fn run(args: &Cli) -> Result<()> {
    let overrides = ConfigOverrides {
        client_id: args.client_id.clone(),
        guild_id: args.guild_id.clone(),
        command_seconds: args.timeout_seconds,
    };
    let config = RpcConfig::resolve(args.config.as_deref(), &overrides)?;
    info!(client_id = %config.client_id, guild_id = %config.guild_id, "configuration loaded");

    let mut session = RpcSession::open(&config)?;
    let channels = session.get_channels(&config.guild_id);
    session.close();
    let channels = channels?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render_channels(&mut out, &channels, format)
        .and_then(|()| out.flush())
        .map_err(|err| AppError::Io(format!("failed to write output: {err}")))
}

fn exit_status(err: &AppError) -> u8 {
    match err {
        AppError::Config(_) => 2,
        _ => 1,
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Io(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Io(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
