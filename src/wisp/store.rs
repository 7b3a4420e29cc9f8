//! On-disk ephemeral namespace: one JSON file per wisp.
//!
//! Writes go through a temp file and `rename`, so readers see either the
//! old or the new record. Exclusive operations first *claim* a wisp by
//! renaming `<id>.json` to `<id>.json.claim-<op>@<unix millis>`; only one
//! rename can win. The claim time lives in the name because `rename` keeps
//! the mtime of the last write, which says nothing about when the claim
//! was taken.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{GtError, Result};

use super::molecule::Molecule;

const EXT: &str = ".json";
const CLAIM_MARK: &str = ".json.claim-";

pub struct WispStore {
    dir: PathBuf,
}

impl WispStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{EXT}"))
    }

    fn claim_path(&self, id: &str, op: &str, at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{id}{CLAIM_MARK}{op}@{}", at.timestamp_millis()))
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| GtError::io(format!("creating {}", self.dir.display()), e))
    }

    /// Write a new wisp. Returns `false`, leaving the existing record
    /// alone, when `molecule.id` is already taken (live or claimed).
    pub fn insert(&self, molecule: &Molecule) -> Result<bool> {
        self.ensure_dir()?;
        if self.is_claimed(&molecule.id)? {
            return Ok(false);
        }
        let dest = self.path(&molecule.id);
        let tmp = write_temp(&self.dir, molecule)?;
        // hard_link refuses to replace an existing file.
        let linked = fs::hard_link(&tmp, &dest);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(GtError::io(format!("creating {}", dest.display()), e)),
        }
    }

    pub fn load(&self, id: &str) -> Result<Option<Molecule>> {
        read_molecule(&self.path(id))
    }

    /// Every live wisp. Unreadable files are logged and skipped.
    pub fn list(&self) -> Result<Vec<Molecule>> {
        let mut out = Vec::new();
        for path in self.entries()? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(EXT) || name.starts_with('.') {
                continue;
            }
            match read_molecule(&path) {
                Ok(Some(m)) => out.push(m),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable wisp"),
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn entries(&self) -> Result<Vec<PathBuf>> {
        match fs::read_dir(&self.dir) {
            Ok(rd) => Ok(rd.filter_map(|e| e.ok().map(|e| e.path())).collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(GtError::io(format!("reading {}", self.dir.display()), e)),
        }
    }

    /// Whether some operation currently holds a claim on `id`.
    pub fn is_claimed(&self, id: &str) -> Result<bool> {
        let prefix = format!("{id}{CLAIM_MARK}");
        Ok(self.entries()?.iter().any(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        }))
    }

    /// Take exclusive hold of `id` for `op`. `None` when there is no live
    /// file to take (absent, or already claimed elsewhere).
    pub fn claim(&self, id: &str, op: &str, at: DateTime<Utc>) -> Result<Option<Claim<'_>>> {
        let live = self.path(id);
        let held = self.claim_path(id, op, at);
        match fs::rename(&live, &held) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(GtError::io(format!("claiming {id}"), e)),
        }
        let molecule = match read_molecule(&held) {
            Ok(Some(m)) => m,
            Ok(None) => return Ok(None),
            Err(e) => {
                // Put it back so the failure is visible to the next reader.
                let _ = fs::rename(&held, &live);
                return Err(e);
            }
        };
        Ok(Some(Claim {
            store: self,
            held,
            molecule,
        }))
    }

    /// Claims taken at least `max_age` before `now`, as `(id, path)`.
    pub fn stale_claims(&self, now: DateTime<Utc>, max_age: Duration) -> Result<Vec<(String, PathBuf)>> {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let mut out = Vec::new();
        for path in self.entries()? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((id, tag)) = name.split_once(CLAIM_MARK) else {
                continue;
            };
            let Some(taken) = claim_time(tag) else {
                tracing::warn!(path = %path.display(), "claim without a timestamp, leaving it");
                continue;
            };
            if now - taken >= max_age {
                out.push((id.to_string(), path));
            }
        }
        Ok(out)
    }

    /// Move an abandoned claim back to its live path, reset to `active`.
    pub fn recover_claim(&self, id: &str, held: &Path) -> Result<()> {
        let Some(mut molecule) = read_molecule(held)? else {
            return Ok(());
        };
        molecule.state = super::MoleculeState::Active;
        molecule.version += 1;
        write_atomic(&self.dir, held, &molecule)?;
        fs::rename(held, self.path(id)).map_err(|e| lost_or_io(id, "recovering", e))
    }
}

fn claim_time(tag: &str) -> Option<DateTime<Utc>> {
    let (_op, millis) = tag.rsplit_once('@')?;
    DateTime::from_timestamp_millis(millis.parse().ok()?)
}

fn lost_or_io(id: &str, doing: &str, e: std::io::Error) -> GtError {
    if e.kind() == ErrorKind::NotFound {
        GtError::ClaimLost(id.to_string())
    } else {
        GtError::io(format!("{doing} {id}"), e)
    }
}

/// Exclusive hold on one wisp. Dropping a claim without calling one of
/// its methods leaves the claim file in place for gc to recover.
pub struct Claim<'a> {
    store: &'a WispStore,
    held: PathBuf,
    molecule: Molecule,
}

impl Claim<'_> {
    pub const fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    /// Persist an intermediate state while still holding the claim.
    pub fn checkpoint(&mut self, molecule: Molecule) -> Result<()> {
        write_atomic(&self.store.dir, &self.held, &molecule)?;
        self.molecule = molecule;
        Ok(())
    }

    /// Publish `molecule` at the live path and drop the claim. Fails with
    /// `ClaimLost` if gc recovered the claim in the meantime.
    pub fn commit(self, molecule: &Molecule) -> Result<()> {
        self.ensure_held()?;
        write_atomic(&self.store.dir, &self.held, molecule)?;
        fs::rename(&self.held, self.store.path(&molecule.id))
            .map_err(|e| lost_or_io(&molecule.id, "committing", e))
    }

    /// Put the claimed record back untouched.
    pub fn restore(self) -> Result<()> {
        let live = self.store.path(&self.molecule.id);
        fs::rename(&self.held, &live).map_err(|e| lost_or_io(&self.molecule.id, "restoring", e))
    }

    /// Delete the wisp for good. Fails with `ClaimLost` if the claim file
    /// is already gone, since the wisp may be live again.
    pub fn delete(self) -> Result<()> {
        fs::remove_file(&self.held).map_err(|e| lost_or_io(&self.molecule.id, "removing", e))
    }

    fn ensure_held(&self) -> Result<()> {
        fs::metadata(&self.held)
            .map(drop)
            .map_err(|e| lost_or_io(&self.molecule.id, "checking claim on", e))
    }
}

fn read_molecule(path: &Path) -> Result<Option<Molecule>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GtError::io(format!("reading {}", path.display()), e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| GtError::Config(format!("corrupt wisp {}: {e}", path.display())))
}

fn write_temp(dir: &Path, molecule: &Molecule) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(molecule)
        .map_err(|e| GtError::Config(format!("serializing {}: {e}", molecule.id)))?;
    let tmp = dir.join(format!(".{}.tmp-{:08x}", molecule.id, rand::random::<u32>()));
    fs::write(&tmp, json).map_err(|e| GtError::io(format!("writing {}", tmp.display()), e))?;
    Ok(tmp)
}

fn write_atomic(dir: &Path, dest: &Path, molecule: &Molecule) -> Result<()> {
    let tmp = write_temp(dir, molecule)?;
    fs::rename(&tmp, dest).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        GtError::io(format!("renaming into {}", dest.display()), e)
    })
}
