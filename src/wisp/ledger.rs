use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::{GtError, Result};
use crate::store::{CreateRequest, ListFilter, RecordId, RecordStore, UpdateRequest};
use crate::town::Town;

use super::molecule::{DurableBody, Molecule, MoleculeState, Step, is_wisp_id, new_wisp_id};
use super::probe::ProcessProbe;
use super::store::{Claim, WispStore};
use super::Digest;

/// Record type of durable molecules.
pub const MOLECULE_TYPE: &str = "molecule";
/// Record type of squash summaries.
pub const DIGEST_TYPE: &str = "digest";

const STATUS_OPEN: &str = "open";
const STATUS_CLOSED: &str = "closed";
const STATUS_ABANDONED: &str = "abandoned";

/// Label digests carry so they can be listed by parent store-side.
const PARENT_LABEL: &str = "parent";

/// Fresh ids tried before bond gives up on a crowded namespace.
const ID_ATTEMPTS: usize = 4;

#[derive(Debug, Clone)]
pub struct BondOptions {
    /// Keep the molecule in the ephemeral namespace.
    pub wisp: bool,
    pub parent: Option<RecordId>,
    pub process_id: Option<u32>,
}

impl Default for BondOptions {
    fn default() -> Self {
        Self {
            wisp: true,
            parent: None,
            process_id: None,
        }
    }
}

/// How [`WispLedger::burn`] disposed of a molecule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnOutcome {
    /// Wisp deleted, nothing kept.
    Burned,
    /// Durable record kept and marked abandoned.
    Abandoned,
}

/// Lifecycle of molecules across the ephemeral and durable namespaces.
pub struct WispLedger<'a, S, C, P> {
    town: &'a Town,
    store: S,
    wisps: WispStore,
    clock: &'a C,
    probe: P,
}

impl<'a, S: RecordStore, C: Clock, P: ProcessProbe> WispLedger<'a, S, C, P> {
    pub fn new(town: &'a Town, store: S, clock: &'a C, probe: P) -> Self {
        Self {
            town,
            store,
            wisps: WispStore::new(town.wisp_dir()),
            clock,
            probe,
        }
    }

    /// Create a molecule from `proto`'s step list.
    pub fn bond(&self, proto: &str, options: &BondOptions) -> Result<Molecule> {
        let now = self.clock.now();
        let steps: Vec<Step> = self
            .town
            .proto_steps(proto)
            .into_iter()
            .map(Step::pending)
            .collect();

        if options.wisp {
            let mut molecule = Molecule {
                id: String::new(),
                proto: proto.to_string(),
                steps,
                wisp: true,
                parent: options.parent.clone(),
                process_id: options.process_id,
                state: MoleculeState::Active,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            for _ in 0..ID_ATTEMPTS {
                molecule.id = new_wisp_id(proto, now);
                if self.wisps.insert(&molecule)? {
                    tracing::info!(id = %molecule.id, proto, steps = molecule.steps.len(), "wisp bonded");
                    return Ok(molecule);
                }
                tracing::debug!(id = %molecule.id, "wisp id taken, drawing another");
            }
            return Err(GtError::Config(format!(
                "no free wisp id for {proto} after {ID_ATTEMPTS} attempts"
            )));
        }

        let body = DurableBody {
            proto: proto.to_string(),
            steps,
            process_id: options.process_id,
        };
        let request = CreateRequest {
            record_type: MOLECULE_TYPE.into(),
            title: proto.to_string(),
            body: encode_body(&body)?,
            labels: vec![format!("proto:{proto}")],
            parent: options.parent.clone(),
            ..Default::default()
        };
        let id = self.store.create(&request)?;
        tracing::info!(%id, proto, "molecule bonded");
        Ok(Molecule {
            id,
            proto: body.proto,
            steps: body.steps,
            wisp: false,
            parent: options.parent.clone(),
            process_id: options.process_id,
            state: MoleculeState::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Mark one step complete. Steps may complete in any order.
    pub fn step(&self, id: &str, step: &str) -> Result<Molecule> {
        let now = self.clock.now();
        if is_wisp_id(id) {
            let claim = self.claim(id, "step")?;
            let mut molecule = claim.molecule().clone();
            if !molecule.complete_step(step) {
                claim.restore()?;
                return Err(unknown_step(id, step));
            }
            molecule.version += 1;
            molecule.updated_at = now;
            claim.commit(&molecule)?;
            tracing::info!(%id, step, done = molecule.completed_steps(), total = molecule.steps.len(), "step complete");
            return Ok(molecule);
        }

        let mut molecule = self.load_durable(id)?;
        if !molecule.complete_step(step) {
            return Err(unknown_step(id, step));
        }
        molecule.updated_at = now;
        let body = DurableBody {
            proto: molecule.proto.clone(),
            steps: molecule.steps.clone(),
            process_id: molecule.process_id,
        };
        self.store.update(
            id,
            &UpdateRequest {
                description: Some(encode_body(&body)?),
                ..Default::default()
            },
        )?;
        tracing::info!(%id, step, "step complete");
        Ok(molecule)
    }

    /// Write a digest for `id` and retire it. Returns the digest id.
    pub fn squash(&self, id: &str, summary: &str) -> Result<RecordId> {
        if !is_wisp_id(id) {
            return self.squash_durable(id, summary);
        }

        let mut claim = self.claim(id, "squash")?;
        let mut molecule = claim.molecule().clone();
        molecule.state = MoleculeState::Squashing;
        molecule.version += 1;
        claim.checkpoint(molecule.clone())?;

        match self.write_digest(&molecule, summary) {
            Ok(digest) => {
                match claim.delete() {
                    Ok(()) => {}
                    Err(GtError::ClaimLost(_)) => self.retire_recovered(id)?,
                    Err(e) => return Err(e),
                }
                tracing::info!(%id, %digest, "wisp squashed");
                Ok(digest)
            }
            Err(e) => {
                molecule.state = MoleculeState::Active;
                molecule.version += 1;
                if let Err(restore) = claim.commit(&molecule) {
                    tracing::warn!(%id, error = %restore, "could not release wisp after failed squash");
                }
                Err(e)
            }
        }
    }

    /// The record is closed before the digest is written, so a retry after
    /// any failure never produces a second digest. If the digest write
    /// fails the record is reopened.
    fn squash_durable(&self, id: &str, summary: &str) -> Result<RecordId> {
        let molecule = self.load_durable(id)?;
        self.set_status(id, STATUS_CLOSED)?;
        match self.write_digest(&molecule, summary) {
            Ok(digest) => {
                tracing::info!(%id, %digest, "molecule squashed");
                Ok(digest)
            }
            Err(e) => {
                if let Err(reopen) = self.set_status(id, STATUS_OPEN) {
                    tracing::warn!(%id, error = %reopen, "could not reopen molecule after failed squash");
                }
                Err(e)
            }
        }
    }

    fn set_status(&self, id: &str, status: &str) -> Result<()> {
        self.store.update(
            id,
            &UpdateRequest {
                status: Some(status.into()),
                ..Default::default()
            },
        )?;
        Ok(())
    }

    /// gc recovered our squash claim while the digest was being written.
    /// The digest stands, so the live copy has to go.
    fn retire_recovered(&self, id: &str) -> Result<()> {
        tracing::warn!(%id, "squash claim was recovered by gc; removing the live copy");
        match self.wisps.claim(id, "squash", self.clock.now())? {
            Some(claim) => claim.delete(),
            None => Err(GtError::ClaimLost(id.to_string())),
        }
    }

    /// Discard `id` without a digest.
    pub fn burn(&self, id: &str) -> Result<BurnOutcome> {
        if is_wisp_id(id) {
            self.claim(id, "burn")?.delete()?;
            tracing::info!(%id, "wisp burned");
            return Ok(BurnOutcome::Burned);
        }
        self.load_durable(id)?;
        self.store.update(
            id,
            &UpdateRequest {
                status: Some(STATUS_ABANDONED.into()),
                add_labels: vec![STATUS_ABANDONED.into()],
                ..Default::default()
            },
        )?;
        tracing::info!(%id, "molecule abandoned");
        Ok(BurnOutcome::Abandoned)
    }

    /// Delete orphaned wisps and return how many were reclaimed.
    ///
    /// A wisp is orphaned when it is incomplete and either its owning
    /// process is gone or it has not been updated for longer than
    /// `threshold`. Orphans are deleted without a digest. Each candidate is
    /// claimed and re-checked first, so a wisp that a concurrent step or
    /// squash touched in the meantime is left alone.
    pub fn gc(&self, threshold: Duration) -> Result<usize> {
        let now = self.clock.now();
        for (id, held) in self.wisps.stale_claims(now, threshold)? {
            match self.wisps.recover_claim(&id, &held) {
                Ok(()) => tracing::warn!(%id, "recovered abandoned claim"),
                Err(e) => tracing::warn!(%id, error = %e, "could not recover abandoned claim"),
            }
        }

        let mut reclaimed = 0;
        for molecule in self.wisps.list()? {
            if !self.is_orphaned(&molecule, now, threshold) {
                continue;
            }
            match self.reclaim(&molecule, now, threshold) {
                Ok(true) => reclaimed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(id = %molecule.id, error = %e, "gc: skipping orphan"),
            }
        }
        if reclaimed > 0 {
            tracing::info!(reclaimed, "gc finished");
        }
        Ok(reclaimed)
    }

    fn reclaim(&self, seen: &Molecule, now: DateTime<Utc>, threshold: Duration) -> Result<bool> {
        let Some(claim) = self.wisps.claim(&seen.id, "gc", now)? else {
            return Ok(false);
        };
        let held = claim.molecule();
        if held.version != seen.version || !self.is_orphaned(held, now, threshold) {
            tracing::debug!(id = %seen.id, "gc: wisp changed under us, leaving it");
            claim.restore()?;
            return Ok(false);
        }
        claim.delete()?;
        tracing::info!(id = %seen.id, proto = %seen.proto, "orphaned wisp reclaimed");
        Ok(true)
    }

    fn is_orphaned(&self, molecule: &Molecule, now: DateTime<Utc>, threshold: Duration) -> bool {
        if molecule.is_complete() || molecule.state != MoleculeState::Active {
            return false;
        }
        if molecule
            .process_id
            .is_some_and(|pid| !self.probe.is_alive(pid))
        {
            return true;
        }
        let limit = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        now - molecule.updated_at > limit
    }

    /// Live wisps, oldest first.
    pub fn list(&self) -> Result<Vec<Molecule>> {
        self.wisps.list()
    }

    pub fn show(&self, id: &str) -> Result<Molecule> {
        if !is_wisp_id(id) {
            return self.load_durable(id);
        }
        match self.wisps.load(id)? {
            Some(m) => Ok(m),
            None if self.wisps.is_claimed(id)? => Err(GtError::Busy(id.to_string())),
            None => Err(GtError::UnknownMolecule(id.to_string())),
        }
    }

    /// Digests written under `parent`, oldest first. The store filters by
    /// the `parent:` label, so only matching digests come back.
    pub fn digests(&self, parent: &str) -> Result<Vec<Digest>> {
        let filter = ListFilter {
            record_type: Some(DIGEST_TYPE.into()),
            labels: vec![format!("{PARENT_LABEL}:{parent}")],
            ..Default::default()
        };
        let mut out: Vec<Digest> = self.store.list(&filter)?.into_iter().map(Digest::from).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    fn claim(&self, id: &str, op: &str) -> Result<Claim<'_>> {
        match self.wisps.claim(id, op, self.clock.now())? {
            Some(claim) => Ok(claim),
            None if self.wisps.is_claimed(id)? => Err(GtError::Busy(id.to_string())),
            None => Err(GtError::UnknownMolecule(id.to_string())),
        }
    }

    fn write_digest(&self, molecule: &Molecule, summary: &str) -> Result<RecordId> {
        let mut labels = vec![
            format!("squashed-from:{}", molecule.id),
            format!("proto:{}", molecule.proto),
        ];
        if let Some(ref parent) = molecule.parent {
            labels.push(format!("{PARENT_LABEL}:{parent}"));
        }
        let request = CreateRequest {
            record_type: DIGEST_TYPE.into(),
            title: format!("Digest: {}", molecule.proto),
            body: summary.to_string(),
            labels,
            parent: molecule.parent.clone(),
            ..Default::default()
        };
        Ok(self.store.create(&request)?)
    }

    fn load_durable(&self, id: &str) -> Result<Molecule> {
        let record = self
            .store
            .get(id)?
            .filter(|r| r.record_type == MOLECULE_TYPE && (r.status.is_empty() || r.status == STATUS_OPEN))
            .ok_or_else(|| GtError::UnknownMolecule(id.to_string()))?;
        let body: DurableBody = serde_json::from_str(&record.description)
            .map_err(|e| GtError::StoreRejected(format!("molecule {id} has unreadable steps: {e}")))?;
        let stamp = record.created_at.unwrap_or_else(|| self.clock.now());
        Ok(Molecule {
            id: record.id,
            proto: body.proto,
            steps: body.steps,
            wisp: false,
            parent: record.parent,
            process_id: body.process_id,
            state: MoleculeState::Active,
            version: 0,
            created_at: stamp,
            updated_at: stamp,
        })
    }
}

fn encode_body(body: &DurableBody) -> Result<String> {
    serde_json::to_string(body).map_err(|e| GtError::Config(format!("encoding molecule: {e}")))
}

fn unknown_step(id: &str, step: &str) -> GtError {
    GtError::UnknownStep {
        molecule: id.to_string(),
        step: step.to_string(),
    }
}
