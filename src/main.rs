use std::process::ExitCode;

use clap::{Parser, Subcommand};

use gastown::commands::doctor::DoctorArgs;
use gastown::commands::init::InitArgs;
use gastown::commands::mail::MailCommand;
use gastown::commands::nudge::NudgeArgs;
use gastown::commands::session::SessionCommand;
use gastown::commands::wisp::WispCommand;
use gastown::error::{ExitError, GtError};
use gastown::{commands, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "gt",
    version,
    about = "Coordinate a town of AI agents running in tmux"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start, stop, inspect and inject into agent sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Deliver a message into an agent's live session
    Nudge(NudgeArgs),
    /// Send and read durable mail
    Mail {
        #[command(subcommand)]
        command: MailCommand,
    },
    /// Bond, step, squash, burn and collect molecules
    Wisp {
        #[command(subcommand)]
        command: WispCommand,
    },
    /// Initialize a new town
    Init(InitArgs),
    /// Validate town config and companion tools
    Doctor(DoctorArgs),
    /// Print the JSON Schema for town.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Session { .. } => "session",
            Self::Nudge(_) => "nudge",
            Self::Mail { .. } => "mail",
            Self::Wisp { .. } => "wisp",
            Self::Init(_) => "init",
            Self::Doctor(_) => "doctor",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Session { command } => command.execute(),
        Commands::Nudge(args) => args.execute(),
        Commands::Mail { command } => command.execute(),
        Commands::Wisp { command } => command.execute(),
        Commands::Init(args) => args.execute(),
        Commands::Doctor(args) => args.execute(),
        Commands::Schema => commands::schema::run_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else if let Some(gt_err) = e.downcast_ref::<GtError>() {
                eprintln!("error: {e:#}");
                gt_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
