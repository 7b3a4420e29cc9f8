//! Gas Town - session supervision, reliable delivery, mail and wisp
//! lifecycle for a town of AI agents running in tmux

pub mod address;
pub mod clock;
pub mod commands;
pub mod delivery;
pub mod error;
pub mod feed;
pub mod identity;
pub mod mail;
pub mod session;
pub mod store;
pub mod subprocess;
pub mod telemetry;
pub mod template;
pub mod tmux;
pub mod town;
pub mod wisp;
