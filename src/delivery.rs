//! Reliable two-phase text injection into a live agent session.
//!
//! A single "type and press Enter" races with the agent's line editor:
//! a large paste may still be arriving when the newline lands, and the
//! newline is then taken as pasted content. Delivery is therefore split
//! into a literal paste, a fixed settle interval, and a separate Enter.
//! Nothing else in this crate writes keystrokes into an agent session.

use std::time::Duration;

use crate::address::Address;
use crate::clock::Clock;
use crate::error::{GtError, Result};
use crate::tmux::{Tmux, TmuxCommandRunner};

/// Time allowed for a paste to land before the commit keystroke.
pub const SETTLE_INTERVAL: Duration = Duration::from_millis(500);

/// Tag prepended to every delivered message.
pub fn sender_tag(sender: &str) -> String {
    format!("[from {sender}]")
}

pub struct DeliveryChannel<'a, R, C> {
    tmux: &'a Tmux<R>,
    clock: &'a C,
}

impl<'a, R: TmuxCommandRunner, C: Clock> DeliveryChannel<'a, R, C> {
    pub const fn new(tmux: &'a Tmux<R>, clock: &'a C) -> Self {
        Self { tmux, clock }
    }

    /// Deliver `text` into `session_id`, tagged with the sender.
    ///
    /// The paste, the settle delay and exactly one Enter are always issued
    /// in that order, whatever the message length.
    pub fn nudge(&self, session_id: &str, sender: &Address, text: &str) -> Result<()> {
        let exists = self
            .tmux
            .has_session(session_id)
            .map_err(|e| send_failed(session_id, &e))?;
        if !exists {
            return Err(GtError::SessionNotFound(session_id.to_string()));
        }

        let message = format!("{} {text}", sender_tag(&sender.identity()));
        tracing::debug!(session = session_id, bytes = message.len(), "nudge: paste");
        self.tmux
            .send_literal(session_id, &message)
            .map_err(|e| send_failed(session_id, &e))?;

        self.clock.sleep(SETTLE_INTERVAL);

        tracing::debug!(session = session_id, "nudge: commit");
        self.tmux
            .send_enter(session_id)
            .map_err(|e| send_failed(session_id, &e))?;
        Ok(())
    }
}

fn send_failed(session_id: &str, err: &impl std::fmt::Display) -> GtError {
    GtError::SendFailed {
        session: session_id.to_string(),
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::tmux::testing::FakeTmux;

    fn setup() -> (Tmux<FakeTmux>, ManualClock, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tmux = Tmux::new(FakeTmux::new(log.clone()).with_session("gt-wyvern-Toast"));
        let clock = ManualClock::new(log.clone());
        (tmux, clock, log)
    }

    #[test]
    fn nudge_pastes_settles_then_commits() {
        let (tmux, clock, log) = setup();
        let channel = DeliveryChannel::new(&tmux, &clock);
        channel
            .nudge("gt-wyvern-Toast", &Address::Mayor, "Check your mail")
            .unwrap();

        let calls = log.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "has-session -t =gt-wyvern-Toast".to_string(),
                "send-keys -t gt-wyvern-Toast -l [from mayor] Check your mail".to_string(),
                "sleep 500ms".to_string(),
                "send-keys -t gt-wyvern-Toast Enter".to_string(),
            ]
        );
    }

    #[test]
    fn nudge_order_is_independent_of_length() {
        let (tmux, clock, log) = setup();
        let channel = DeliveryChannel::new(&tmux, &clock);
        let long = "x".repeat(64 * 1024);
        channel.nudge("gt-wyvern-Toast", &Address::Deacon, &long).unwrap();

        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.len(), 4);
        assert!(calls[1].contains(" -l [from deacon] xxx"));
        assert_eq!(calls[2], "sleep 500ms");
        assert_eq!(calls[3], "send-keys -t gt-wyvern-Toast Enter");
        assert_eq!(calls.iter().filter(|c| c.ends_with("Enter")).count(), 1);
    }

    #[test]
    fn nudge_missing_session() {
        let (tmux, clock, log) = setup();
        let channel = DeliveryChannel::new(&tmux, &clock);
        let err = channel
            .nudge("gt-wyvern-nobody", &Address::Mayor, "hi")
            .unwrap_err();
        assert!(matches!(err, GtError::SessionNotFound(ref s) if s == "gt-wyvern-nobody"));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn nudge_paste_failure_skips_commit() {
        let (tmux, clock, log) = setup();
        tmux.runner().fail("send-keys");
        let channel = DeliveryChannel::new(&tmux, &clock);
        let err = channel
            .nudge("gt-wyvern-Toast", &Address::Mayor, "hi")
            .unwrap_err();
        assert!(matches!(err, GtError::SendFailed { .. }));
        assert!(err.to_string().contains("send-keys refused"));
        assert!(!log.lock().unwrap().iter().any(|c| c.starts_with("sleep")));
    }

    #[test]
    fn sender_tag_format() {
        assert_eq!(sender_tag("wyvern/crew/max"), "[from wyvern/crew/max]");
    }
}
