use std::io::IsTerminal;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;
use crate::subprocess::on_path;
use crate::town::{TOWN_TOML, Town};

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorReport {
    pub town: Option<TownStatus>,
    pub tools: Vec<ToolStatus>,
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TownStatus {
    pub name: String,
    pub root: String,
    pub rigs: usize,
    pub agents: usize,
    pub wisps: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub command: String,
    pub present: bool,
}

impl DoctorArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let cwd = super::current_dir()?;
        let format = self.format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                OutputFormat::Pretty
            } else {
                OutputFormat::Text
            }
        });

        let report = match Town::discover(&cwd) {
            Ok(town) => check(Some(&town)),
            Err(e) => {
                let mut report = check(None);
                report.issues.insert(0, format!("{TOWN_TOML}: {e:#}"));
                report
            }
        };
        let issue_count = report.issues.len();

        match format {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if issue_count > 0 {
            return Err(ExitError::DoctorFailed(issue_count).into());
        }
        Ok(())
    }
}

/// Inspect the town (if any) and the companion tools it depends on.
pub fn check(town: Option<&Town>) -> DoctorReport {
    let settings = town.map(|t| t.config.settings.clone()).unwrap_or_default();
    let agent_program = settings
        .agent_command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string();

    let mut report = DoctorReport {
        town: town.map(|t| TownStatus {
            name: t.config.name.clone(),
            root: t.root.display().to_string(),
            rigs: t.config.rigs.len(),
            agents: 2 + t.config.rigs.iter().map(|r| t.roster(r).len()).sum::<usize>(),
            wisps: std::fs::read_dir(t.wisp_dir())
                .map(|rd| {
                    rd.filter_map(Result::ok)
                        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
                        .count()
                })
                .unwrap_or(0),
        }),
        tools: vec![],
        issues: vec![],
    };

    for (name, command) in [
        ("tmux", settings.tmux_command),
        ("record store", settings.store_command),
        ("agent", agent_program),
    ] {
        let present = !command.is_empty() && on_path(&command);
        if !present {
            report.issues.push(format!("Tool not found: {command} ({name})"));
        }
        report.tools.push(ToolStatus {
            name: name.to_string(),
            command,
            present,
        });
    }
    report
}

fn print_pretty(report: &DoctorReport) {
    println!("=== Gas Town Doctor ===\n");
    if let Some(ref town) = report.town {
        println!("Town:   {} ({})", town.name, town.root);
        println!("Rigs:   {}", town.rigs);
        println!("Agents: {}", town.agents);
        println!("Wisps:  {}", town.wisps);
        println!();
    }

    println!("Tools:");
    for tool in &report.tools {
        if tool.present {
            println!("  ✓ {}: {}", tool.name, tool.command);
        } else {
            println!("  ✗ {}: {} NOT FOUND", tool.name, tool.command);
        }
    }

    if report.issues.is_empty() {
        println!("\n✓ No issues found");
    } else {
        println!("\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            println!("  • {issue}");
        }
    }
}

fn print_text(report: &DoctorReport) {
    if let Some(ref town) = report.town {
        println!(
            "gt-doctor  town={}  rigs={}  agents={}  wisps={}",
            town.name, town.rigs, town.agents, town.wisps
        );
    }
    for tool in &report.tools {
        let status = if tool.present { "ok" } else { "missing" };
        println!("tool  {}  {}  {status}", tool.name, tool.command);
    }
    if !report.issues.is_empty() {
        println!("issues  count={}", report.issues.len());
        for issue in &report.issues {
            println!("issue  {issue}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::town::testing::sample_town;

    #[test]
    fn missing_tools_are_issues() {
        let dir = tempfile::tempdir().unwrap();
        let mut town = sample_town(dir.path());
        town.config.settings.store_command = "nonexistent-bd-xyz".into();
        town.config.settings.tmux_command = "sh".into();
        town.config.settings.agent_command = "sh -c true".into();

        let report = check(Some(&town));

        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("nonexistent-bd-xyz"));
        let agent = report.tools.iter().find(|t| t.name == "agent").unwrap();
        assert_eq!(agent.command, "sh");
        assert!(agent.present);
    }

    #[test]
    fn town_summary_counts_roster() {
        let dir = tempfile::tempdir().unwrap();
        let town = sample_town(dir.path());
        let status = check(Some(&town)).town.unwrap();
        // mayor + deacon, wyvern: witness, refinery, max, Toast, furiosa; ember: nux
        assert_eq!(status.agents, 8);
        assert_eq!(status.rigs, 2);
        assert_eq!(status.wisps, 0);
    }
}
