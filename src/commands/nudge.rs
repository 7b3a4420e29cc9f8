use clap::Args;

use crate::address::Address;
use crate::clock::{Clock, SystemClock};
use crate::delivery::DeliveryChannel;
use crate::error::GtError;
use crate::feed::{NudgeEntry, NudgeLog};
use crate::identity::resolve_sender;
use crate::tmux::{Tmux, TmuxCommandRunner, TmuxExecutor};

use super::TownContext;

#[derive(Debug, Args)]
pub struct NudgeArgs {
    /// Agent address, or a raw session name
    pub target: String,
    /// Text to deliver
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub message: Vec<String>,
    /// Sender shown in the `[from ...]` tag
    #[arg(long)]
    pub from: Option<String>,
}

/// What a nudge ended up doing.
#[derive(Debug, PartialEq, Eq)]
pub enum NudgeOutcome {
    Delivered(String),
    /// The target is optional and not running.
    Skipped(String),
}

impl NudgeArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let sender = resolve_sender(self.from.as_deref())?;
        // Nudging works outside a town too; fall back to plain `tmux`.
        let (tmux, log) = match TownContext::discover() {
            Ok(ctx) => (ctx.tmux, Some(NudgeLog::for_town(&ctx.town))),
            Err(e) => {
                tracing::debug!(error = %e, "no town, using default tmux");
                (Tmux::new(TmuxExecutor::default()), None)
            }
        };
        let text = self.message.join(" ");
        match nudge(&tmux, &SystemClock, &sender, &self.target, &text)? {
            NudgeOutcome::Delivered(session) => {
                if let Some(ref log) = log {
                    record(log, &SystemClock, &sender, &self.target, &session, &text);
                }
                println!("✓ Nudged {} ({session})", self.target);
            }
            NudgeOutcome::Skipped(why) => println!("{why}"),
        }
        Ok(())
    }
}

/// Add a delivered nudge to the town audit log. A failed append is
/// logged and otherwise ignored; the nudge already happened.
pub fn record<C: Clock>(
    log: &NudgeLog,
    clock: &C,
    sender: &Address,
    target: &str,
    session: &str,
    text: &str,
) {
    let entry = NudgeEntry {
        at: clock.now(),
        from: sender.identity(),
        target: target.to_string(),
        session: session.to_string(),
        message: text.to_string(),
    };
    if let Err(e) = log.append(&entry) {
        tracing::warn!(error = %e, target, "could not record nudge");
    }
}

/// Resolve `target` to a session and deliver `text` from `sender`.
pub fn nudge<R: TmuxCommandRunner, C: Clock>(
    tmux: &Tmux<R>,
    clock: &C,
    sender: &Address,
    target: &str,
    text: &str,
) -> anyhow::Result<NudgeOutcome> {
    let channel = DeliveryChannel::new(tmux, clock);

    let session_id = match Address::parse(target) {
        Ok(Address::Deacon) => {
            let session_id = Address::Deacon.session_id();
            if !tmux.has_session(&session_id)? {
                return Ok(NudgeOutcome::Skipped(
                    "Deacon is not running, nudge skipped".into(),
                ));
            }
            session_id
        }
        Ok(address) => address.session_id(),
        // Legacy: a bare session name that exists is accepted as-is.
        Err(parse_err) if !target.contains('/') => {
            if tmux.has_session(target)? {
                target.to_string()
            } else {
                return Err(parse_err.into());
            }
        }
        Err(parse_err) => return Err(parse_err.into()),
    };

    match channel.nudge(&session_id, sender, text) {
        Ok(()) => Ok(NudgeOutcome::Delivered(session_id)),
        Err(GtError::SessionNotFound(_)) => {
            Err(GtError::NotRunning(format!("{target} ({session_id})")).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::tmux::testing::FakeTmux;

    fn setup(live: &[&str]) -> (Tmux<FakeTmux>, ManualClock, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut fake = FakeTmux::new(log.clone());
        for s in live {
            fake = fake.with_session(s);
        }
        let clock = ManualClock::new(log.clone());
        (Tmux::new(fake), clock, log)
    }

    #[test]
    fn nudges_agent_by_address() {
        let (tmux, clock, log) = setup(&["gt-wyvern-Toast"]);
        let out = nudge(&tmux, &clock, &Address::Mayor, "wyvern/Toast", "hi").unwrap();
        assert_eq!(out, NudgeOutcome::Delivered("gt-wyvern-Toast".into()));
        let calls = log.lock().unwrap().clone();
        assert!(calls.contains(&"send-keys -t gt-wyvern-Toast -l [from mayor] hi".to_string()));
    }

    #[test]
    fn absent_deacon_is_skipped() {
        let (tmux, clock, log) = setup(&[]);
        let out = nudge(&tmux, &clock, &Address::Mayor, "deacon", "wake").unwrap();
        assert!(matches!(out, NudgeOutcome::Skipped(_)));
        assert!(!log.lock().unwrap().iter().any(|c| c.starts_with("send-keys")));
    }

    #[test]
    fn absent_agent_is_an_error() {
        let (tmux, clock, _) = setup(&[]);
        let err = nudge(&tmux, &clock, &Address::Mayor, "wyvern/Toast", "hi").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GtError>(),
            Some(GtError::NotRunning(_))
        ));
    }

    #[test]
    fn raw_session_name_is_accepted_when_live() {
        let (tmux, clock, _) = setup(&["scratch-1"]);
        let out = nudge(&tmux, &clock, &Address::Deacon, "scratch-1", "hi").unwrap();
        assert_eq!(out, NudgeOutcome::Delivered("scratch-1".into()));
    }

    #[test]
    fn unknown_raw_name_reports_invalid_address() {
        let (tmux, clock, _) = setup(&[]);
        let err = nudge(&tmux, &clock, &Address::Mayor, "scratch-1", "hi").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GtError>(),
            Some(GtError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn delivered_nudge_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let town = crate::town::testing::sample_town(dir.path());
        let log = NudgeLog::for_town(&town);
        let (tmux, clock, _) = setup(&["gt-wyvern-Toast"]);

        let sender = Address::parse("wyvern/witness").unwrap();
        let NudgeOutcome::Delivered(session) =
            nudge(&tmux, &clock, &sender, "wyvern/Toast", "rebase please").unwrap()
        else {
            panic!("expected delivery");
        };
        record(&log, &clock, &sender, "wyvern/Toast", &session, "rebase please");

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].from, "wyvern/witness");
        assert_eq!(entries[0].session, "gt-wyvern-Toast");
        assert_eq!(entries[0].message, "rebase please");
        assert_eq!(entries[0].at, clock.now());
    }

    #[test]
    fn unwritable_log_does_not_fail_the_nudge() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the logs directory should be.
        std::fs::write(dir.path().join("logs"), "").unwrap();
        let log = NudgeLog::for_town(&crate::town::testing::sample_town(dir.path()));
        let (_, clock, _) = setup(&[]);
        record(&log, &clock, &Address::Mayor, "deacon", "gt-deacon", "hi");
        assert!(log.entries().is_err() || log.entries().unwrap().is_empty());
    }
}
