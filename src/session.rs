//! Lifecycle of the one terminal session each agent owns.
//!
//! Liveness is always read back from the multiplexer; the supervisor keeps
//! no session state of its own.

use std::time::Duration;

use serde::Serialize;

use crate::address::Address;
use crate::clock::Clock;
use crate::delivery::DeliveryChannel;
use crate::error::{GtError, Result};
use crate::template;
use crate::tmux::{Tmux, TmuxCommandRunner, TmuxError};
use crate::town::Town;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for [`SessionSupervisor::start`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Record id handed to the agent once it is ready.
    pub initial_task: Option<String>,
}

/// Filter for [`SessionSupervisor::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub rig: Option<String>,
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub agent: Address,
    pub session_id: String,
    pub running: bool,
}

pub struct SessionSupervisor<'a, R, C> {
    town: &'a Town,
    tmux: &'a Tmux<R>,
    clock: &'a C,
    /// Identity used to tag text this supervisor injects.
    sender: Address,
}

impl<'a, R: TmuxCommandRunner, C: Clock> SessionSupervisor<'a, R, C> {
    pub const fn new(town: &'a Town, tmux: &'a Tmux<R>, clock: &'a C, sender: Address) -> Self {
        Self {
            town,
            tmux,
            clock,
            sender,
        }
    }

    fn delivery(&self) -> DeliveryChannel<'a, R, C> {
        DeliveryChannel::new(self.tmux, self.clock)
    }

    fn ensure_known(&self, agent: &Address) -> Result<()> {
        if self.town.knows(agent) {
            Ok(())
        } else {
            Err(GtError::NotFound(format!("agent {agent}")))
        }
    }

    fn is_running(&self, session_id: &str) -> Result<bool> {
        self.tmux
            .has_session(session_id)
            .map_err(|e| GtError::NotFound(format!("session backend: {e}")))
    }

    /// Create the agent's session in its working directory and launch the
    /// agent process. An initial task is delivered once the agent is ready.
    pub fn start(&self, agent: &Address, options: &StartOptions) -> Result<()> {
        self.ensure_known(agent)?;
        let session_id = agent.session_id();
        if self.is_running(&session_id)? {
            return Err(GtError::AlreadyRunning(session_id));
        }

        let workdir = self.town.workdir(agent)?;
        std::fs::create_dir_all(&workdir)
            .map_err(|e| launch_failed(&session_id, &e))?;

        let env = [
            ("GT_ADDRESS", agent.identity()),
            ("GT_ROLE", agent.role_name().to_string()),
            ("GT_RIG", agent.rig().unwrap_or_default().to_string()),
            ("GT_TOWN_ROOT", self.town.root.to_string_lossy().into_owned()),
        ];
        let settings = &self.town.config.settings;
        self.tmux
            .new_session(&session_id, &workdir, &env, &settings.agent_command)
            .map_err(|e| launch_failed(&session_id, &e))?;
        tracing::info!(session = %session_id, workdir = %workdir.display(), "session started");

        if let Some(task) = &options.initial_task {
            if let Err(e) = self.deliver_initial_task(agent, &session_id, task) {
                self.discard(&session_id);
                return Err(e);
            }
        }
        Ok(())
    }

    fn deliver_initial_task(&self, agent: &Address, session_id: &str, task: &str) -> Result<()> {
        let settings = &self.town.config.settings;
        if !self.wait_for_ready(session_id, &settings.ready_marker, settings.ready_timeout())? {
            tracing::warn!(session = %session_id, "agent not ready before timeout; delivering task anyway");
        }
        let prompt = template::initial_task(&agent.identity(), agent.rig(), task)
            .map_err(|e| launch_failed(session_id, &e))?;
        self.delivery()
            .nudge(session_id, &self.sender, &prompt)
            .map_err(|e| launch_failed(session_id, &e))
    }

    /// Tear down a half-started session so a retry is not refused as running.
    fn discard(&self, session_id: &str) {
        match self.tmux.kill_session(session_id) {
            Ok(()) => tracing::info!(session = %session_id, "killed session after failed start"),
            Err(e) => tracing::warn!(session = %session_id, "could not kill half-started session: {e}"),
        }
    }

    /// Poll scrollback for `marker`. Returns `Ok(false)` on timeout and
    /// `LaunchFailed` when the session dies while starting.
    fn wait_for_ready(&self, session_id: &str, marker: &str, timeout: Duration) -> Result<bool> {
        let deadline = self.clock.now() + chrono::Duration::from_std(timeout).unwrap_or_default();
        loop {
            if !self.is_running(session_id)? {
                return Err(GtError::LaunchFailed {
                    session: session_id.to_string(),
                    detail: "session exited during startup".into(),
                });
            }
            match self.tmux.capture(session_id, 50) {
                Ok(text) if text.contains(marker) => return Ok(true),
                Ok(_) => {}
                Err(e) => tracing::debug!(session = session_id, "capture while waiting: {e}"),
            }
            if self.clock.now() >= deadline {
                return Ok(false);
            }
            self.clock.sleep(POLL_INTERVAL);
        }
    }

    /// Stop the agent's session.
    ///
    /// Unforced stops interrupt the agent and wait out the grace period so
    /// in-flight store writes can finish; the session is killed afterwards
    /// regardless.
    pub fn stop(&self, agent: &Address, force: bool) -> Result<()> {
        let session_id = agent.session_id();
        if !self.is_running(&session_id)? {
            return Err(GtError::NotRunning(session_id));
        }

        if !force {
            if let Err(e) = self.tmux.send_interrupt(&session_id) {
                tracing::warn!(session = %session_id, "interrupt failed: {e}");
            }
            let grace = self.town.config.settings.stop_grace();
            if self.wait_for_exit(&session_id, grace)? {
                tracing::info!(session = %session_id, "session exited after interrupt");
                return Ok(());
            }
            tracing::info!(session = %session_id, "grace period elapsed; killing session");
        }

        if let Err(e) = self.tmux.kill_session(&session_id) {
            if self.is_running(&session_id)? {
                return Err(GtError::ShutdownFailed {
                    session: session_id,
                    detail: e.to_string(),
                });
            }
            tracing::debug!(session = %session_id, "kill raced with exit: {e}");
        }
        tracing::info!(session = %session_id, force, "session stopped");
        Ok(())
    }

    fn wait_for_exit(&self, session_id: &str, grace: Duration) -> Result<bool> {
        let deadline = self.clock.now() + chrono::Duration::from_std(grace).unwrap_or_default();
        loop {
            if !self.is_running(session_id)? {
                return Ok(true);
            }
            if self.clock.now() >= deadline {
                return Ok(false);
            }
            self.clock.sleep(POLL_INTERVAL);
        }
    }

    /// Hand the terminal to the agent's session. Returns when the caller
    /// detaches or the session ends.
    pub fn attach(&self, agent: &Address) -> Result<()> {
        let session_id = agent.session_id();
        if !self.is_running(&session_id)? {
            return Err(GtError::NotRunning(session_id));
        }
        self.tmux
            .attach(&session_id)
            .map_err(|e| GtError::SendFailed {
                session: session_id,
                detail: e.to_string(),
            })
    }

    /// Every known agent in scope with its live status. Agents without a
    /// session are reported as not running rather than omitted.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<SessionInfo>> {
        let live = self
            .tmux
            .list_sessions()
            .map_err(|e| GtError::NotFound(format!("session backend: {e}")))?;

        let mut agents = Vec::new();
        match &filter.rig {
            Some(name) => {
                let rig = self
                    .town
                    .rig(name)
                    .ok_or_else(|| GtError::NotFound(format!("rig {name:?}")))?;
                agents.extend(self.town.roster(rig));
            }
            None => {
                agents.push(Address::Mayor);
                agents.push(Address::Deacon);
                for rig in &self.town.config.rigs {
                    agents.extend(self.town.roster(rig));
                }
            }
        }

        Ok(agents
            .into_iter()
            .map(|agent| {
                let session_id = agent.session_id();
                let running = live.iter().any(|s| *s == session_id);
                SessionInfo {
                    agent,
                    session_id,
                    running,
                }
            })
            .collect())
    }

    /// The last `lines` lines of scrollback, verbatim.
    pub fn capture(&self, agent: &Address, lines: usize) -> Result<String> {
        if lines == 0 {
            return Err(GtError::invalid(&lines.to_string(), "line count must be positive"));
        }
        let session_id = agent.session_id();
        if !self.is_running(&session_id)? {
            return Err(GtError::NotRunning(session_id));
        }
        self.tmux.capture(&session_id, lines).map_err(|e| match e {
            TmuxError::CommandFailed(_) => GtError::NotRunning(session_id.clone()),
            TmuxError::Io(e) => GtError::io(format!("capturing {session_id}"), e),
        })
    }

    /// Deliver arbitrary text to the agent through the delivery channel.
    pub fn inject(&self, agent: &Address, text: &str) -> Result<()> {
        self.delivery().nudge(&agent.session_id(), &self.sender, text)
    }
}

fn launch_failed(session_id: &str, err: &impl std::fmt::Display) -> GtError {
    GtError::LaunchFailed {
        session: session_id.to_string(),
        detail: err.to_string(),
    }
}
