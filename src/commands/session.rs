use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;

use crate::address::Address;
use crate::clock::SystemClock;
use crate::identity::resolve_sender;
use crate::session::{ListFilter, SessionInfo, SessionSupervisor, StartOptions};
use crate::tmux::TmuxExecutor;

use super::TownContext;

const DEFAULT_CAPTURE_LINES: i64 = 100;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Start an agent's session
    Start {
        /// Agent address (e.g. wyvern/Toast, wyvern/crew/max, mayor)
        agent: String,
        /// Record id to hand the agent once it is ready
        #[arg(long)]
        issue: Option<String>,
        /// Sender used to tag the initial task
        #[arg(long)]
        from: Option<String>,
    },
    /// Stop an agent's session
    Stop {
        agent: String,
        /// Kill immediately instead of interrupting first
        #[arg(long)]
        force: bool,
    },
    /// Attach the terminal to an agent's session
    #[command(visible_alias = "at")]
    Attach { agent: String },
    /// List agents and whether their sessions are running
    List {
        /// Only this rig
        #[arg(long)]
        rig: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the tail of an agent's scrollback
    Capture {
        agent: String,
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = DEFAULT_CAPTURE_LINES, allow_negative_numbers = true)]
        lines: i64,
    },
    /// Deliver text into an agent's session
    Inject {
        agent: String,
        /// Text to deliver
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,
        /// Read the text from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long)]
        from: Option<String>,
    },
}

impl SessionCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let ctx = TownContext::discover()?;
        match self {
            Self::Start { agent, issue, from } => {
                let agent = Address::parse(agent)?;
                let supervisor = supervisor(&ctx, from.as_deref())?;
                supervisor.start(
                    &agent,
                    &StartOptions {
                        initial_task: issue.clone(),
                    },
                )?;
                println!("Started {agent} ({})", agent.session_id());
            }
            Self::Stop { agent, force } => {
                let agent = Address::parse(agent)?;
                supervisor(&ctx, None)?.stop(&agent, *force)?;
                println!("Stopped {agent}");
            }
            Self::Attach { agent } => {
                let agent = Address::parse(agent)?;
                supervisor(&ctx, None)?.attach(&agent)?;
            }
            Self::List { rig, json } => {
                let sessions = supervisor(&ctx, None)?.list(&ListFilter { rig: rig.clone() })?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else {
                    print_roster(&sessions);
                }
            }
            Self::Capture { agent, lines } => {
                if *lines <= 0 {
                    anyhow::bail!("--lines must be positive, got {lines}");
                }
                let agent = Address::parse(agent)?;
                let count = usize::try_from(*lines).context("--lines out of range")?;
                print!("{}", supervisor(&ctx, None)?.capture(&agent, count)?);
            }
            Self::Inject {
                agent,
                message,
                file,
                from,
            } => {
                let text = match (message, file) {
                    (Some(m), _) => m.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path)
                        .with_context(|| format!("reading {}", path.display()))?,
                    (None, None) => anyhow::bail!("either --message or --file is required"),
                };
                let agent = Address::parse(agent)?;
                supervisor(&ctx, from.as_deref())?.inject(&agent, text.trim_end())?;
                println!("Injected into {agent}");
            }
        }
        Ok(())
    }
}

fn supervisor<'a>(
    ctx: &'a TownContext,
    from: Option<&str>,
) -> anyhow::Result<SessionSupervisor<'a, TmuxExecutor, SystemClock>> {
    let sender = resolve_sender(from)?;
    Ok(SessionSupervisor::new(&ctx.town, &ctx.tmux, &ctx.clock, sender))
}

fn print_roster(sessions: &[SessionInfo]) {
    if sessions.is_empty() {
        println!("No agents.");
        return;
    }
    let width = sessions
        .iter()
        .map(|s| s.agent.identity().len())
        .max()
        .unwrap_or(0);
    for s in sessions {
        let marker = if s.running { "●" } else { "○" };
        println!(
            "{marker} {:<width$}  {}",
            s.agent.identity(),
            s.session_id
        );
    }
}
