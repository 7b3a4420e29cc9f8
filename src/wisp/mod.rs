//! Molecules of cyclic work and their ephemeral "wisp" namespace.
//!
//! A wisp lives only in `<town>/.wisps`; a durable molecule lives only in
//! the record store. Which namespace an id belongs to is decided by its
//! prefix, so no lookup ever consults both. A wisp ends in exactly one of
//! `squash` (digest written, wisp deleted), `burn` (deleted) or gc.

mod ledger;
mod molecule;
mod probe;
mod store;

pub use ledger::{BondOptions, BurnOutcome, DIGEST_TYPE, MOLECULE_TYPE, WispLedger};
pub use molecule::{
    Digest, Molecule, MoleculeState, Step, StepStatus, WISP_PREFIX, is_wisp_id, new_wisp_id,
};
pub use probe::{ProcessProbe, PsProbe};
pub use store::{Claim, WispStore};
