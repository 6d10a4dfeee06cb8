//! Selfkit Demo CLI
//!
//! Command-line interface for running the selfkit interactive demos against an
//! in-process network with a simulated counterparty.

use anyhow::Result;
use clap::{Parser, Subcommand};
use selfkit_interactive::ChatCommand;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod ui;

use commands::credentials::CredentialKind;
use commands::GlobalArgs;

#[derive(Parser)]
#[command(name = "selfkit-demo")]
#[command(about = "Selfkit Demo CLI - discovery, credential and agreement rounds", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory (can also be set via SELFKIT_DEMO_DIR env var)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Do not start the simulated peer; discovery codes must be scanned elsewhere
    #[arg(long, global = true)]
    no_peer: bool,

    /// Stop the discovery demos after this many rounds instead of waiting for Ctrl-C
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    rounds: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Setup a new identity
    Setup {
        /// Name for this identity
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show current identity
    Whoami,

    /// List all saved identities
    List,

    /// Discover a counterparty and send a chat message
    Chat,

    /// Discover a counterparty and have it countersign an agreement
    Agreement {
        /// Title printed at the top of the terms document
        #[arg(short, long, default_value = "Sample Agreement")]
        title: String,
    },

    /// Discover a counterparty and request credential presentations
    RequestCredentials {
        /// Credential kinds to ask for; any one satisfies the request
        #[arg(value_enum, required = true)]
        kinds: Vec<CredentialKind>,
    },

    /// Discover a counterparty and issue it a customer credential
    IssueCredential {
        /// Name claim placed in the credential
        #[arg(short, long, default_value = "Test Name")]
        name: String,
    },

    /// Answer requests and run rounds for chat commands
    Serve {
        /// Command for the simulated peer to send once connected (repeatable)
        #[arg(long = "send", value_parser = parse_command)]
        send: Vec<ChatCommand>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration: Option<u64>,
    },
}

fn parse_command(text: &str) -> Result<ChatCommand, String> {
    text.parse()
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "selfkit_demo_cli=debug,selfkit_demo_core=debug,selfkit_interactive=debug,selfkit_lib=debug"
    } else {
        "selfkit_demo_cli=info,selfkit_demo_core=warn,selfkit_interactive=info,selfkit_lib=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let args = GlobalArgs {
        storage_dir: cli.storage_dir,
        no_peer: cli.no_peer,
        verbose: cli.verbose,
        rounds: cli.rounds,
    };

    match cli.command {
        Commands::Setup { name } => commands::setup::run(&args, name).await,
        Commands::Whoami => commands::whoami::run(&args).await,
        Commands::List => commands::list::run(&args).await,
        Commands::Chat => commands::chat::run(&args).await,
        Commands::Agreement { title } => commands::agreement::run(&args, &title).await,
        Commands::RequestCredentials { kinds } => {
            commands::credentials::request(&args, &kinds).await
        }
        Commands::IssueCredential { name } => commands::credentials::issue(&args, &name).await,
        Commands::Serve { send, duration } => {
            commands::serve::run(&args, &send, duration).await
        }
    }
}
