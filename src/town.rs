//! Town configuration (`town.toml`) and the rig roster.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::address::{Address, RigRole, validate_name};
use crate::error::{ExitError, GtError};

/// Config file name at the town root.
pub const TOWN_TOML: &str = "town.toml";

/// Environment override for the town root.
pub const TOWN_ROOT_ENV: &str = "GT_TOWN_ROOT";

/// Find the town root: `$GT_TOWN_ROOT`, else the nearest ancestor of
/// `start` holding a `town.toml`, else `~/gt` if it has one.
pub fn find_town_root(start: &Path) -> anyhow::Result<PathBuf> {
    if let Some(root) = std::env::var_os(TOWN_ROOT_ENV) {
        let root = PathBuf::from(root);
        if root.join(TOWN_TOML).exists() {
            return Ok(root);
        }
        anyhow::bail!(
            "{TOWN_ROOT_ENV}={} has no {TOWN_TOML}",
            root.display()
        );
    }

    if let Some(found) = start.ancestors().find(|dir| dir.join(TOWN_TOML).exists()) {
        return Ok(found.to_path_buf());
    }

    if let Some(home) = dirs::home_dir() {
        let fallback = home.join("gt");
        if fallback.join(TOWN_TOML).exists() {
            return Ok(fallback);
        }
    }

    anyhow::bail!(
        "no {TOWN_TOML} found in {} or any parent (run `gt init`)",
        start.display()
    )
}

/// Top-level `town.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TownConfig {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub rigs: Vec<RigConfig>,
    /// Step lists for molecule prototypes, keyed by proto name.
    #[serde(default)]
    pub protos: BTreeMap<String, ProtoConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Settings {
    /// Command launched inside every agent session.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Scrollback text that signals the agent is ready for input.
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Grace period between interrupt and forced kill on stop.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
    /// Age after which an incomplete wisp counts as orphaned.
    #[serde(default = "default_orphan_threshold")]
    pub orphan_threshold_secs: u64,
    /// Record store CLI.
    #[serde(default = "default_store_command")]
    pub store_command: String,
    #[serde(default = "default_tmux_command")]
    pub tmux_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_command: default_agent_command(),
            ready_marker: default_ready_marker(),
            ready_timeout_secs: default_ready_timeout(),
            stop_grace_secs: default_stop_grace(),
            orphan_threshold_secs: default_orphan_threshold(),
            store_command: default_store_command(),
            tmux_command: default_tmux_command(),
        }
    }
}

impl Settings {
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub const fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub const fn orphan_threshold(&self) -> Duration {
        Duration::from_secs(self.orphan_threshold_secs)
    }
}

fn default_agent_command() -> String {
    "claude".into()
}

fn default_ready_marker() -> String {
    ">".into()
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_stop_grace() -> u64 {
    5
}

fn default_orphan_threshold() -> u64 {
    3600
}

fn default_store_command() -> String {
    "bd".into()
}

fn default_tmux_command() -> String {
    "tmux".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RigConfig {
    pub name: String,
    /// Rig directory; defaults to `<town>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub polecats: Vec<String>,
    #[serde(default)]
    pub crew: Vec<String>,
    #[serde(default = "default_true")]
    pub witness: bool,
    #[serde(default = "default_true")]
    pub refinery: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProtoConfig {
    #[serde(default)]
    pub steps: Vec<String>,
}

impl TownConfig {
    /// Load and validate `town.toml`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse_toml(&contents)
    }

    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {TOWN_TOML}: {e}")))?;
        config
            .validate()
            .map_err(|e| ExitError::Config(format!("invalid {TOWN_TOML}: {e}")))?;
        Ok(config)
    }

    /// Names must keep session ids injective; duplicates are rejected.
    fn validate(&self) -> Result<(), GtError> {
        let mut seen = std::collections::HashSet::new();
        for rig in &self.rigs {
            validate_name(&rig.name, "rig", &rig.name)?;
            if !seen.insert(rig.name.as_str()) {
                return Err(GtError::Config(format!("duplicate rig {:?}", rig.name)));
            }
            for name in rig.polecats.iter().chain(&rig.crew) {
                validate_name(name, "agent name", name)?;
            }
            if let Some(reserved) = rig
                .polecats
                .iter()
                .find(|p| matches!(p.as_str(), "crew" | "witness" | "refinery"))
            {
                return Err(GtError::Config(format!(
                    "rig {:?}: polecat name {reserved:?} is reserved",
                    rig.name
                )));
            }
        }
        Ok(())
    }

    /// Serialize with a header comment and per-section notes.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        fn set_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(item) = doc.get_mut(key) {
                if let Some(tbl) = item.as_table_mut() {
                    tbl.decor_mut().set_prefix(comment);
                } else if let Some(arr) = item.as_array_of_tables_mut() {
                    if let Some(first) = arr.iter_mut().next() {
                        first.decor_mut().set_prefix(comment);
                    }
                }
            }
        }

        let raw = toml::to_string_pretty(self).context("serializing town config to TOML")?;
        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# Town configuration\n# Rigs, agents and session settings for `gt`\n\n");
        set_comment(&mut doc, "settings", "\n# Session and store settings\n");
        set_comment(&mut doc, "rigs", "\n# Rigs and their agent rosters\n");
        set_comment(&mut doc, "protos", "\n# Molecule prototypes (step lists)\n");

        Ok(doc.to_string())
    }
}

/// A loaded town: its root directory plus configuration.
#[derive(Debug, Clone)]
pub struct Town {
    pub root: PathBuf,
    pub config: TownConfig,
}

impl Town {
    /// Discover the town from `start` and load its config.
    pub fn discover(start: &Path) -> anyhow::Result<Self> {
        let root = find_town_root(start)?;
        Self::load(&root)
    }

    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let config = TownConfig::load(&root.join(TOWN_TOML))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn rig(&self, name: &str) -> Option<&RigConfig> {
        self.config.rigs.iter().find(|r| r.name == name)
    }

    fn rig_dir(&self, rig: &RigConfig) -> PathBuf {
        match &rig.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.root.join(p),
            None => self.root.join(&rig.name),
        }
    }

    /// Whether `address` names an agent this town knows about.
    pub fn knows(&self, address: &Address) -> bool {
        match address {
            Address::Mayor | Address::Deacon => true,
            Address::Agent { rig, name } => self
                .rig(rig)
                .is_some_and(|r| r.polecats.iter().any(|p| p == name)),
            Address::Crew { rig, name } => self
                .rig(rig)
                .is_some_and(|r| r.crew.iter().any(|c| c == name)),
            Address::Role { rig, role } => self.rig(rig).is_some_and(|r| match role {
                RigRole::Witness => r.witness,
                RigRole::Refinery => r.refinery,
            }),
        }
    }

    /// Working directory for an agent's session.
    pub fn workdir(&self, address: &Address) -> Result<PathBuf, GtError> {
        let rig_dir = |rig: &str| {
            self.rig(rig)
                .map(|r| self.rig_dir(r))
                .ok_or_else(|| GtError::NotFound(format!("rig {rig:?}")))
        };
        Ok(match address {
            Address::Mayor => self.root.join("mayor"),
            Address::Deacon => self.root.join("deacon"),
            Address::Agent { rig, name } => rig_dir(rig)?.join("polecats").join(name),
            Address::Crew { rig, name } => rig_dir(rig)?.join("crew").join(name),
            Address::Role {
                rig,
                role: RigRole::Witness,
            } => rig_dir(rig)?.join("witness"),
            Address::Role {
                rig,
                role: RigRole::Refinery,
            } => rig_dir(rig)?.join("refinery").join("rig"),
        })
    }

    /// Full roster of a rig, in a stable order.
    pub fn roster(&self, rig: &RigConfig) -> Vec<Address> {
        let mut out = Vec::new();
        if rig.witness {
            out.push(Address::Role {
                rig: rig.name.clone(),
                role: RigRole::Witness,
            });
        }
        if rig.refinery {
            out.push(Address::Role {
                rig: rig.name.clone(),
                role: RigRole::Refinery,
            });
        }
        out.extend(rig.crew.iter().map(|name| Address::Crew {
            rig: rig.name.clone(),
            name: name.clone(),
        }));
        out.extend(rig.polecats.iter().map(|name| Address::Agent {
            rig: rig.name.clone(),
            name: name.clone(),
        }));
        out
    }

    /// Step names for a proto; unknown protos have no steps.
    pub fn proto_steps(&self, proto: &str) -> Vec<String> {
        self.config
            .protos
            .get(proto)
            .map(|p| p.steps.clone())
            .unwrap_or_default()
    }

    /// Directory holding the ephemeral wisp namespace.
    pub fn wisp_dir(&self) -> PathBuf {
        self.root.join(".wisps")
    }

    /// Directory for town-level audit logs.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{SAMPLE, sample_town};
    use super::*;

    #[test]
    fn parse_sample() {
        let config = TownConfig::parse_toml(SAMPLE).unwrap();
        assert_eq!(config.name, "gastown");
        assert_eq!(config.rigs.len(), 2);
        assert_eq!(config.settings.ready_timeout_secs, 2);
        assert_eq!(config.settings.agent_command, "claude");
        assert_eq!(config.settings.orphan_threshold(), Duration::from_secs(3600));
        assert!(config.rigs[0].witness);
        assert!(!config.rigs[1].refinery);
    }

    #[test]
    fn parse_minimal() {
        let config = TownConfig::parse_toml("name = \"t\"").unwrap();
        assert!(config.rigs.is_empty());
        assert_eq!(config.settings.store_command, "bd");
    }

    #[test]
    fn partial_settings_take_defaults() {
        let config = TownConfig::parse_toml("name = \"t\"\n[settings]\nstop_grace_secs = 9\n").unwrap();
        let s = &config.settings;
        assert_eq!(s.stop_grace_secs, 9);
        assert_eq!(s.agent_command, "claude");
        assert_eq!(s.tmux_command, "tmux");
        assert_eq!(s.orphan_threshold(), Duration::from_secs(3600));
    }

    #[test]
    fn rejects_hyphenated_rig() {
        let err = TownConfig::parse_toml("name = \"t\"\n[[rigs]]\nname = \"my-rig\"\n").unwrap_err();
        assert!(err.downcast_ref::<ExitError>().is_some());
        assert!(err.to_string().contains("my-rig"));
    }

    #[test]
    fn rejects_reserved_polecat() {
        let err = TownConfig::parse_toml(
            "name = \"t\"\n[[rigs]]\nname = \"r\"\npolecats = [\"witness\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn rejects_duplicate_rig() {
        let err = TownConfig::parse_toml(
            "name = \"t\"\n[[rigs]]\nname = \"r\"\n[[rigs]]\nname = \"r\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn parse_malformed() {
        assert!(TownConfig::parse_toml("name = ").is_err());
        assert!(TownConfig::parse_toml("[settings]").is_err());
    }

    #[test]
    fn workdirs() {
        let town = sample_town(Path::new("/town"));
        let wd = |raw: &str| town.workdir(&Address::parse(raw).unwrap()).unwrap();
        assert_eq!(wd("mayor"), PathBuf::from("/town/mayor"));
        assert_eq!(wd("wyvern/Toast"), PathBuf::from("/town/wyvern/polecats/Toast"));
        assert_eq!(wd("wyvern/crew/max"), PathBuf::from("/town/wyvern/crew/max"));
        assert_eq!(wd("wyvern/witness"), PathBuf::from("/town/wyvern/witness"));
        assert_eq!(wd("wyvern/refinery"), PathBuf::from("/town/wyvern/refinery/rig"));
        assert!(matches!(
            town.workdir(&Address::parse("nowhere/x").unwrap()),
            Err(GtError::NotFound(_))
        ));
    }

    #[test]
    fn knows_roster_members() {
        let town = sample_town(Path::new("/town"));
        let knows = |raw: &str| town.knows(&Address::parse(raw).unwrap());
        assert!(knows("mayor"));
        assert!(knows("wyvern/Toast"));
        assert!(knows("wyvern/crew/max"));
        assert!(knows("wyvern/witness"));
        assert!(!knows("wyvern/ghost"));
        assert!(!knows("ember/witness"));
        assert!(!knows("nowhere/Toast"));
    }

    #[test]
    fn roster_order() {
        let town = sample_town(Path::new("/town"));
        let rig = town.rig("wyvern").unwrap();
        let names: Vec<String> = town.roster(rig).iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "wyvern/witness",
                "wyvern/refinery",
                "wyvern/crew/max",
                "wyvern/Toast",
                "wyvern/furiosa"
            ]
        );
    }

    #[test]
    fn proto_steps_lookup() {
        let town = sample_town(Path::new("/town"));
        assert_eq!(town.proto_steps("patrol").len(), 3);
        assert!(town.proto_steps("unknown").is_empty());
    }

    #[test]
    fn roundtrip_toml() {
        let config = TownConfig::parse_toml(SAMPLE).unwrap();
        let toml_str = config.to_toml().unwrap();
        assert!(toml_str.contains("[[rigs]]"));
        let back = TownConfig::parse_toml(&toml_str).unwrap();
        assert_eq!(back.rigs.len(), 2);
        assert_eq!(back.protos["patrol"].steps, config.protos["patrol"].steps);
    }

    #[test]
    fn find_root_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOWN_TOML), "name = \"t\"").unwrap();
        let nested = dir.path().join("wyvern/polecats/Toast");
        std::fs::create_dir_all(&nested).unwrap();
        if std::env::var_os(TOWN_ROOT_ENV).is_none() {
            assert_eq!(find_town_root(&nested).unwrap(), dir.path());
        }
    }
}
