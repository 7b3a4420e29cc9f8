//! Logical agent addresses and their terminal-session identifiers.
//!
//! Grammar (case-sensitive, no whitespace):
//!
//! ```text
//! mayor | deacon | <rig>/<agent> | <rig>/crew/<name> | <rig>/witness | <rig>/refinery
//! ```
//!
//! Rig and agent names are restricted to `[A-Za-z0-9_]+`. Keeping `-` out
//! of names is what makes `session_id` injective: the first `-` after the
//! `gt-` prefix always ends the rig component.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GtError, Result};

/// Prefix shared by every session this crate creates.
pub const SESSION_PREFIX: &str = "gt-";

const MAYOR: &str = "mayor";
const DEACON: &str = "deacon";
const CREW: &str = "crew";

/// Singleton roles that exist once per rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RigRole {
    Witness,
    Refinery,
}

impl RigRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            RigRole::Witness => "witness",
            RigRole::Refinery => "refinery",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "witness" => Some(RigRole::Witness),
            "refinery" => Some(RigRole::Refinery),
            _ => None,
        }
    }
}

/// A typed agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// Town-level coordinator.
    Mayor,
    /// Town-level patrol daemon.
    Deacon,
    /// A worker ("polecat") inside a rig.
    Agent { rig: String, name: String },
    /// A long-lived crew member inside a rig.
    Crew { rig: String, name: String },
    /// A rig's witness or refinery.
    Role { rig: String, role: RigRole },
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex"))
}

/// Validate a rig or agent name component.
pub fn validate_name(raw: &str, kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GtError::invalid(raw, format!("empty {kind}")));
    }
    if !name_re().is_match(value) {
        return Err(GtError::invalid(
            raw,
            format!("{kind} {value:?} must match [A-Za-z0-9_]+"),
        ));
    }
    Ok(())
}

impl Address {
    /// Parse a textual address. Never partially resolves: any malformed
    /// component fails the whole parse with `InvalidFormat`.
    pub fn parse(raw: &str) -> Result<Self> {
        // A single trailing slash is the only tolerated variant.
        let normalized = raw.strip_suffix('/').unwrap_or(raw);

        match normalized {
            MAYOR => return Ok(Address::Mayor),
            DEACON => return Ok(Address::Deacon),
            _ => {}
        }

        let Some((rig, rest)) = normalized.split_once('/') else {
            return Err(GtError::invalid(raw, "expected 'rig/agent'"));
        };
        validate_name(raw, "rig", rig)?;

        let rig = rig.to_string();
        match rest.split_once('/') {
            Some((CREW, name)) => {
                validate_name(raw, "crew name", name)?;
                Ok(Address::Crew {
                    rig,
                    name: name.to_string(),
                })
            }
            Some(_) => Err(GtError::invalid(raw, "too many path components")),
            None => {
                validate_name(raw, "agent name", rest)?;
                if rest == CREW {
                    return Err(GtError::invalid(raw, "crew address needs a name"));
                }
                Ok(match RigRole::from_name(rest) {
                    Some(role) => Address::Role { rig, role },
                    None => Address::Agent {
                        rig,
                        name: rest.to_string(),
                    },
                })
            }
        }
    }

    /// Canonical session identifier for this address. Pure and total.
    pub fn session_id(&self) -> String {
        match self {
            Address::Mayor => format!("{SESSION_PREFIX}{MAYOR}"),
            Address::Deacon => format!("{SESSION_PREFIX}{DEACON}"),
            Address::Agent { rig, name } => format!("{SESSION_PREFIX}{rig}-{name}"),
            Address::Crew { rig, name } => format!("{SESSION_PREFIX}{rig}-{CREW}-{name}"),
            Address::Role { rig, role } => format!("{SESSION_PREFIX}{rig}-{}", role.as_str()),
        }
    }

    /// Inverse of [`Address::session_id`]. Returns `None` for sessions
    /// this crate did not name.
    pub fn from_session_id(session_id: &str) -> Option<Self> {
        let rest = session_id.strip_prefix(SESSION_PREFIX)?;
        match rest {
            MAYOR => return Some(Address::Mayor),
            DEACON => return Some(Address::Deacon),
            _ => {}
        }
        let (rig, tail) = rest.split_once('-')?;
        let candidate = match tail.split_once('-') {
            Some((CREW, name)) => format!("{rig}/{CREW}/{name}"),
            Some(_) => return None,
            None => format!("{rig}/{tail}"),
        };
        Address::parse(&candidate).ok()
    }

    /// Canonical text form, used as mail assignee and sender label.
    pub fn identity(&self) -> String {
        self.to_string()
    }

    /// The rig this address belongs to, if any.
    pub fn rig(&self) -> Option<&str> {
        match self {
            Address::Mayor | Address::Deacon => None,
            Address::Agent { rig, .. } | Address::Crew { rig, .. } | Address::Role { rig, .. } => {
                Some(rig)
            }
        }
    }

    /// Short role label exported to agent sessions as `GT_ROLE`.
    pub const fn role_name(&self) -> &'static str {
        match self {
            Address::Mayor => "mayor",
            Address::Deacon => "deacon",
            Address::Agent { .. } => "polecat",
            Address::Crew { .. } => "crew",
            Address::Role { role, .. } => role.as_str(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Mayor => f.write_str(MAYOR),
            Address::Deacon => f.write_str(DEACON),
            Address::Agent { rig, name } => write!(f, "{rig}/{name}"),
            Address::Crew { rig, name } => write!(f, "{rig}/{CREW}/{name}"),
            Address::Role { rig, role } => write!(f, "{rig}/{}", role.as_str()),
        }
    }
}

impl FromStr for Address {
    type Err = GtError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}
