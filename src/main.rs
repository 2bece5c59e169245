use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use mazari_bot::{
    relay, BotConfig, BotRuntime, CommandDispatcher, ExitReason, PairingRegistry, RelayConfig,
    SnapshotStore, StdinPrompt, StubConnector,
};

/// MazariBot: WhatsApp bot runtime and pairing relay.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Directory holding session credentials (overrides SESSION_DIR).
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Path to the JSON snapshot file (overrides STORE_FILE).
    #[arg(long)]
    store_file: Option<PathBuf>,

    /// Phone number for non-interactive pairing (overrides PHONE_NUMBER).
    #[arg(long)]
    phone_number: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bot.
    Run,
    /// Run the pairing relay HTTP server.
    Relay {
        /// Port to bind (overrides PORT).
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_bot(cli.session_dir, cli.store_file, cli.phone_number).await,
        Commands::Relay { port } => run_relay(port).await,
    }
}

async fn run_bot(
    session_dir: Option<PathBuf>,
    store_file: Option<PathBuf>,
    phone_number: Option<String>,
) -> ExitCode {
    let mut config = BotConfig::from_env();
    if let Some(dir) = session_dir {
        config = config.with_session_dir(dir);
    }
    if let Some(file) = store_file {
        config = config.with_store_file(file);
    }
    if let Some(phone) = phone_number {
        config = config.with_phone_number(phone);
    }

    let store = Arc::new(SnapshotStore::new(config.store_file.clone()));
    store.load();
    let flush_task = Arc::clone(&store).spawn_flush_task(config.flush_interval);

    let dispatcher = Arc::new(CommandDispatcher::new());
    let mut runtime = BotRuntime::new(config, StubConnector, Arc::clone(&store), dispatcher);
    let mut prompt = StdinPrompt;

    let code = tokio::select! {
        result = runtime.run(&mut prompt) => match result {
            Ok(ExitReason::RetriesExhausted) => ExitCode::FAILURE,
            Ok(ExitReason::Interrupted) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("fatal startup error: {err}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received; shutting down");
            ExitCode::SUCCESS
        }
    };

    flush_task.abort();
    store.flush();
    code
}

async fn run_relay(port: Option<u16>) -> ExitCode {
    let mut config = RelayConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }

    let registry = Arc::new(PairingRegistry::new());
    match relay::serve(&config, registry).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("pairing relay failed: {err}");
            ExitCode::FAILURE
        }
    }
}
