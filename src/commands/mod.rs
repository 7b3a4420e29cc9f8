pub mod doctor;
pub mod init;
pub mod mail;
pub mod nudge;
pub mod schema;
pub mod session;
pub mod wisp;

use std::path::PathBuf;

use anyhow::Context;

use crate::clock::SystemClock;
use crate::store::BdStore;
use crate::tmux::{Tmux, TmuxExecutor};
use crate::town::Town;

/// Everything a command needs to talk to the town: config, tmux, clock,
/// record store.
pub struct TownContext {
    pub town: Town,
    pub tmux: Tmux<TmuxExecutor>,
    pub clock: SystemClock,
}

impl TownContext {
    /// Locate and load the town around the current directory.
    pub fn discover() -> anyhow::Result<Self> {
        let cwd = current_dir()?;
        let town = Town::discover(&cwd)?;
        let tmux = Tmux::new(TmuxExecutor::new(town.config.settings.tmux_command.clone()));
        Ok(Self {
            town,
            tmux,
            clock: SystemClock,
        })
    }

    pub fn store(&self) -> BdStore {
        BdStore::new(self.town.config.settings.store_command.clone(), &self.town.root)
    }
}

pub fn current_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("could not determine current directory")
}
