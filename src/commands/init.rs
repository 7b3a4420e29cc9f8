use std::collections::BTreeMap;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::address::{Address, validate_name};
use crate::error::ExitError;
use crate::town::{ProtoConfig, RigConfig, Settings, TOWN_TOML, Town, TownConfig};

const DEFAULT_PATROL: &[&str] = &["inbox-check", "health-scan", "handoff"];

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Town name
    #[arg(long)]
    pub name: Option<String>,
    /// First rig to create
    #[arg(long)]
    pub rig: Option<String>,
    /// Polecats for that rig (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub polecats: Vec<String>,
    /// Crew members for that rig (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub crew: Vec<String>,
    /// Command launched in each agent session
    #[arg(long)]
    pub agent_command: Option<String>,
    /// Non-interactive mode
    #[arg(long)]
    pub no_interactive: bool,
    /// Overwrite an existing town.toml
    #[arg(long)]
    pub force: bool,
    /// Town root directory (default: current directory)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

/// Collected answers for init.
#[derive(Debug)]
struct InitChoices {
    name: String,
    rig: Option<String>,
    polecats: Vec<String>,
    crew: Vec<String>,
    agent_command: String,
}

impl InitArgs {
    pub fn execute(&self) -> Result<()> {
        let root = match self.root.clone() {
            Some(r) => r,
            None => super::current_dir()?,
        };
        fs::create_dir_all(&root).with_context(|| format!("creating {}", root.display()))?;

        let config_path = root.join(TOWN_TOML);
        if config_path.exists() && !self.force {
            return Err(ExitError::Config(format!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            ))
            .into());
        }

        let interactive = !self.no_interactive && std::io::stdin().is_terminal();
        let choices = self.gather_choices(interactive, &root)?;
        let config = build_config(&choices);
        // Round-trip through the validator so init never writes a file
        // that `gt` then refuses to load.
        let toml_str = config.to_toml()?;
        TownConfig::parse_toml(&toml_str)?;

        fs::write(&config_path, &toml_str)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Generated {TOWN_TOML}");

        create_layout(&root, &config)?;
        println!("Town {:?} ready at {}", config.name, root.display());
        Ok(())
    }

    fn gather_choices(&self, interactive: bool, root: &Path) -> Result<InitChoices> {
        let inferred = infer_town_name(root);
        let name = match (&self.name, interactive) {
            (Some(n), _) => n.clone(),
            (None, true) => prompt_input("Town name", Some(&inferred))?,
            (None, false) => inferred,
        };

        let rig = match (&self.rig, interactive) {
            (Some(r), _) => Some(r.clone()),
            (None, true) => {
                if prompt_confirm("Create a rig now?", true)? {
                    Some(prompt_input("Rig name", None)?)
                } else {
                    None
                }
            }
            (None, false) => None,
        };

        let mut polecats = self.polecats.clone();
        let mut crew = self.crew.clone();
        if interactive && rig.is_some() && polecats.is_empty() && crew.is_empty() {
            polecats = split_list(&prompt_input("Polecats (comma-separated)", Some(""))?);
            crew = split_list(&prompt_input("Crew (comma-separated)", Some(""))?);
        }

        let agent_command = match (&self.agent_command, interactive) {
            (Some(c), _) => c.clone(),
            (None, true) => prompt_input("Agent command", Some(&Settings::default().agent_command))?,
            (None, false) => Settings::default().agent_command,
        };

        if let Some(ref r) = rig {
            validate_name(r, "rig", r)?;
        }
        for agent in polecats.iter().chain(&crew) {
            validate_name(agent, "agent name", agent)?;
        }

        Ok(InitChoices {
            name,
            rig,
            polecats,
            crew,
            agent_command,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Town name from the directory name, `gastown` if that yields nothing.
fn infer_town_name(root: &Path) -> String {
    root.canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "gastown".to_string())
}

fn build_config(choices: &InitChoices) -> TownConfig {
    let rigs = choices
        .rig
        .iter()
        .map(|name| RigConfig {
            name: name.clone(),
            path: None,
            polecats: choices.polecats.clone(),
            crew: choices.crew.clone(),
            witness: true,
            refinery: true,
        })
        .collect();
    let mut protos = BTreeMap::new();
    protos.insert(
        "patrol".to_string(),
        ProtoConfig {
            steps: DEFAULT_PATROL.iter().map(|s| (*s).to_string()).collect(),
        },
    );
    TownConfig {
        name: choices.name.clone(),
        settings: Settings {
            agent_command: choices.agent_command.clone(),
            ..Settings::default()
        },
        rigs,
        protos,
    }
}

/// Town-level agent directories plus every rig's worker directories.
fn create_layout(root: &Path, config: &TownConfig) -> Result<()> {
    let town = Town {
        root: root.to_path_buf(),
        config: config.clone(),
    };
    let mut agents = vec![Address::Mayor, Address::Deacon];
    for rig in &config.rigs {
        agents.extend(town.roster(rig));
    }
    for agent in &agents {
        let dir = town.workdir(agent)?;
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(())
}

// --- Interactive prompts using dialoguer ---

fn prompt_input(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut builder = dialoguer::Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true);
    if let Some(d) = default {
        builder = builder.default(d.to_string());
    }
    builder.interact_text().context("reading user input")
}

fn prompt_confirm(prompt: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("reading user confirmation")
}
