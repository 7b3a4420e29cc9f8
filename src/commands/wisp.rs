use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use regex::Regex;

use crate::wisp::{BondOptions, BurnOutcome, Molecule, PsProbe, StepStatus, WispLedger};

use super::TownContext;

#[derive(Debug, Subcommand)]
pub enum WispCommand {
    /// Create a molecule from a proto
    Bond {
        proto: String,
        /// Store in the durable record store instead of as a wisp
        #[arg(long)]
        durable: bool,
        /// Parent record digests are filed under
        #[arg(long)]
        parent: Option<String>,
        /// Owning process; the wisp is reclaimed once it exits
        #[arg(long)]
        pid: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Mark a step complete
    Step { id: String, step: String },
    /// Write a digest and retire the molecule
    Squash {
        id: String,
        /// Summary stored in the digest
        #[arg(short, long)]
        message: String,
    },
    /// Discard a molecule without a digest
    Burn {
        id: String,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
    /// List live wisps
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one molecule
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete orphaned wisps
    Gc {
        /// Age after which an incomplete wisp is orphaned (e.g. 30m, 1h)
        #[arg(long, value_parser = parse_duration)]
        threshold: Option<Duration>,
        /// Keep running, collecting every interval, until Ctrl-C
        #[arg(long, value_parser = parse_duration)]
        watch: Option<Duration>,
    },
    /// List digests filed under a parent record
    Digests {
        parent: String,
        #[arg(long)]
        json: bool,
    },
}

impl WispCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        let ctx = TownContext::discover()?;
        let store = ctx.store();
        let ledger = WispLedger::new(&ctx.town, &store, &ctx.clock, PsProbe);

        match self {
            Self::Bond {
                proto,
                durable,
                parent,
                pid,
                json,
            } => {
                let molecule = ledger.bond(
                    proto,
                    &BondOptions {
                        wisp: !durable,
                        parent: parent.clone(),
                        process_id: *pid,
                    },
                )?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&molecule)?);
                } else {
                    println!("{}", molecule.id);
                }
            }
            Self::Step { id, step } => {
                let molecule = ledger.step(id, step)?;
                println!(
                    "✓ {id}: {step} ({}/{})",
                    molecule.completed_steps(),
                    molecule.steps.len()
                );
            }
            Self::Squash { id, message } => {
                let digest = ledger.squash(id, message)?;
                println!("✓ Squashed {id} into {digest}");
            }
            Self::Burn { id, yes } => {
                if !yes && std::io::stdin().is_terminal() && !confirm_burn(id)? {
                    println!("Aborted.");
                    return Ok(());
                }
                match ledger.burn(id)? {
                    BurnOutcome::Burned => println!("✓ Burned {id}"),
                    BurnOutcome::Abandoned => println!("✓ Marked {id} abandoned"),
                }
            }
            Self::List { json } => {
                let wisps = ledger.list()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&wisps)?);
                } else if wisps.is_empty() {
                    println!("No wisps.");
                } else {
                    for m in &wisps {
                        print_summary(m);
                    }
                }
            }
            Self::Show { id, json } => {
                let molecule = ledger.show(id)?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&molecule)?);
                } else {
                    print_summary(&molecule);
                    for step in &molecule.steps {
                        let mark = match step.status {
                            StepStatus::Complete => "✓",
                            StepStatus::Pending => "·",
                        };
                        println!("    {mark} {}", step.id);
                    }
                }
            }
            Self::Gc { threshold, watch } => {
                let threshold =
                    threshold.unwrap_or_else(|| ctx.town.config.settings.orphan_threshold());
                match watch {
                    None => {
                        let n = ledger.gc(threshold)?;
                        println!("Reclaimed {n} orphaned wisp(s)");
                    }
                    Some(interval) => watch_gc(&ledger, threshold, *interval)?,
                }
            }
            Self::Digests { parent, json } => {
                let digests = ledger.digests(parent)?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&digests)?);
                } else if digests.is_empty() {
                    println!("No digests under {parent}.");
                } else {
                    for d in &digests {
                        let when = d
                            .created_at
                            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default();
                        println!("{}  {when}  {}  (from {})", d.id, d.title, d.squashed_from);
                    }
                }
            }
        }
        Ok(())
    }
}

fn watch_gc<S, C, P>(
    ledger: &WispLedger<'_, S, C, P>,
    threshold: Duration,
    interval: Duration,
) -> anyhow::Result<()>
where
    S: crate::store::RecordStore,
    C: crate::clock::Clock,
    P: crate::wisp::ProcessProbe,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    eprintln!("Collecting every {}s (Ctrl-C to stop)", interval.as_secs());
    while !stop.load(Ordering::SeqCst) {
        match ledger.gc(threshold) {
            Ok(0) => {}
            Ok(n) => println!("{}  reclaimed {n}", Utc::now().format("%H:%M:%S")),
            Err(e) => tracing::warn!(error = %e, "gc pass failed"),
        }
        let started = Instant::now();
        while started.elapsed() < interval && !stop.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(200).min(interval));
        }
    }
    Ok(())
}

fn confirm_burn(id: &str) -> anyhow::Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(format!("Burn {id} without a digest?"))
        .default(false)
        .interact()
        .context("reading user confirmation")
}

fn print_summary(m: &Molecule) {
    let pid = m.process_id.map(|p| format!("  pid={p}")).unwrap_or_default();
    println!(
        "{}  {}  {}/{} steps  updated {}{pid}",
        m.id,
        m.proto,
        m.completed_steps(),
        m.steps.len(),
        m.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+[smhd])+$").expect("static regex"))
}

/// Parse `90s`, `5m`, `1h`, `2h30m` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    if !duration_re().is_match(raw) {
        return Err(format!("invalid duration {raw:?} (use e.g. 30m, 1h, 2h30m)"));
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().map_err(|e| format!("invalid duration {raw:?}: {e}"))?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => 86_400,
        };
        total = n
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration {raw:?} overflows"))?;
    }
    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("2h30m").unwrap(), Duration::from_secs(9000));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("1w").is_err());
        assert!(parse_duration("-5m").is_err());
    }
}
