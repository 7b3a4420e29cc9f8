//! Terminal-session backend.
//!
//! `TmuxCommandRunner` is the single seam to the multiplexer binary so
//! every higher layer can be exercised against a fake.

use std::path::Path;
use std::process::Stdio;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmuxError {
    #[error("tmux command failed: {0}")]
    CommandFailed(String),

    #[error("tmux io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for executing tmux commands. Enables mock injection for testing.
pub trait TmuxCommandRunner: Send + Sync {
    /// Run a command, capturing stdout.
    fn run(&self, args: &[&str]) -> Result<String, TmuxError>;

    /// Run a command with the caller's terminal attached. Blocks until the
    /// command exits.
    fn run_foreground(&self, args: &[&str]) -> Result<(), TmuxError>;
}

impl<T: TmuxCommandRunner + ?Sized> TmuxCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        (**self).run(args)
    }

    fn run_foreground(&self, args: &[&str]) -> Result<(), TmuxError> {
        (**self).run_foreground(args)
    }
}

/// Real tmux executor using `std::process::Command`.
pub struct TmuxExecutor {
    tmux_bin: String,
    socket_name: Option<String>,
}

impl TmuxExecutor {
    pub fn new(tmux_bin: impl Into<String>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
            socket_name: None,
        }
    }

    #[must_use]
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    fn command(&self, args: &[&str]) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.tmux_bin);
        if let Some(ref name) = self.socket_name {
            cmd.args(["-L", name]);
        }
        cmd.args(args);
        cmd
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxCommandRunner for TmuxExecutor {
    fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
        let output = self.command(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TmuxError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn run_foreground(&self, args: &[&str]) -> Result<(), TmuxError> {
        let status = self
            .command(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(TmuxError::CommandFailed(format!(
                "exit code {}",
                status.code().unwrap_or(-1)
            )))
        }
    }
}

/// Typed facade over the multiplexer operations the supervisor needs.
pub struct Tmux<R> {
    runner: R,
}

impl<R: TmuxCommandRunner> Tmux<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Create a detached session rooted at `workdir` running `command`.
    pub fn new_session(
        &self,
        session: &str,
        workdir: &Path,
        env: &[(&str, String)],
        command: &str,
    ) -> Result<(), TmuxError> {
        let workdir = workdir.to_string_lossy();
        let env_pairs: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut args = vec!["new-session", "-d", "-s", session, "-c", workdir.as_ref()];
        for pair in &env_pairs {
            args.push("-e");
            args.push(pair);
        }
        if !command.is_empty() {
            args.push(command);
        }
        self.runner.run(&args).map(|_| ())
    }

    /// Whether a session with exactly this name exists.
    ///
    /// tmux reports a missing session through a non-zero exit, so
    /// `CommandFailed` maps to `false`; io errors (tmux missing) propagate.
    pub fn has_session(&self, session: &str) -> Result<bool, TmuxError> {
        let target = exact(session);
        match self.runner.run(&["has-session", "-t", &target]) {
            Ok(_) => Ok(true),
            Err(TmuxError::CommandFailed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Names of all live sessions. An absent tmux server means no sessions.
    pub fn list_sessions(&self) -> Result<Vec<String>, TmuxError> {
        match self.runner.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(out) => Ok(out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            Err(TmuxError::CommandFailed(msg))
                if msg.contains("no server running") || msg.contains("No such file") =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Capture the last `lines` lines of scrollback, verbatim.
    pub fn capture(&self, session: &str, lines: usize) -> Result<String, TmuxError> {
        let start = format!("-{lines}");
        let out = self
            .runner
            .run(&["capture-pane", "-p", "-t", session, "-S", &start])?;
        Ok(last_lines(&out, lines))
    }

    /// Paste `text` with no key-name interpretation.
    pub fn send_literal(&self, session: &str, text: &str) -> Result<(), TmuxError> {
        self.runner
            .run(&["send-keys", "-t", session, "-l", text])
            .map(|_| ())
    }

    pub fn send_enter(&self, session: &str) -> Result<(), TmuxError> {
        self.runner
            .run(&["send-keys", "-t", session, "Enter"])
            .map(|_| ())
    }

    pub fn send_interrupt(&self, session: &str) -> Result<(), TmuxError> {
        self.runner
            .run(&["send-keys", "-t", session, "C-c"])
            .map(|_| ())
    }

    pub fn kill_session(&self, session: &str) -> Result<(), TmuxError> {
        let target = exact(session);
        self.runner.run(&["kill-session", "-t", &target]).map(|_| ())
    }

    /// Hand the terminal to `session` until the user detaches. Inside an
    /// existing tmux client the client is switched instead of nesting.
    pub fn attach(&self, session: &str) -> Result<(), TmuxError> {
        let target = exact(session);
        if std::env::var_os("TMUX").is_some() {
            self.runner.run_foreground(&["switch-client", "-t", &target])
        } else {
            self.runner.run_foreground(&["attach-session", "-t", &target])
        }
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix.
fn exact(session: &str) -> String {
    format!("={session}")
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    let mut out = lines[skip..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory tmux that tracks sessions and records every call.
    pub struct FakeTmux {
        pub sessions: Mutex<HashSet<String>>,
        pub captures: Mutex<HashMap<String, String>>,
        pub log: Arc<Mutex<Vec<String>>>,
        /// First argument of commands that should fail.
        pub failing: Mutex<HashSet<String>>,
        /// Sessions whose agent exits when interrupted.
        pub exit_on_interrupt: bool,
    }

    impl FakeTmux {
        pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                sessions: Mutex::new(HashSet::new()),
                captures: Mutex::new(HashMap::new()),
                log,
                failing: Mutex::new(HashSet::new()),
                exit_on_interrupt: true,
            }
        }

        pub fn with_session(self, name: &str) -> Self {
            self.sessions.lock().unwrap().insert(name.to_string());
            self
        }

        pub fn with_capture(self, name: &str, text: &str) -> Self {
            self.captures
                .lock()
                .unwrap()
                .insert(name.to_string(), text.to_string());
            self
        }

        pub fn fail(&self, command: &str) {
            self.failing.lock().unwrap().insert(command.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn target(args: &[&str]) -> String {
            args.iter()
                .zip(args.iter().skip(1))
                .find(|(a, _)| **a == "-t" || **a == "-s")
                .map(|(_, b)| b.trim_start_matches('=').to_string())
                .unwrap_or_default()
        }
    }

    impl TmuxCommandRunner for FakeTmux {
        fn run(&self, args: &[&str]) -> Result<String, TmuxError> {
            self.log.lock().unwrap().push(args.join(" "));
            let cmd = args.first().copied().unwrap_or_default();
            if self.failing.lock().unwrap().contains(cmd) {
                return Err(TmuxError::CommandFailed(format!("{cmd} refused")));
            }
            let target = Self::target(args);
            let mut sessions = self.sessions.lock().unwrap();
            match cmd {
                "new-session" => {
                    if !sessions.insert(target.clone()) {
                        return Err(TmuxError::CommandFailed(format!(
                            "duplicate session: {target}"
                        )));
                    }
                    Ok(String::new())
                }
                "has-session" => {
                    if sessions.contains(&target) {
                        Ok(String::new())
                    } else {
                        Err(TmuxError::CommandFailed(format!(
                            "can't find session: {target}"
                        )))
                    }
                }
                "list-sessions" => {
                    if sessions.is_empty() {
                        return Err(TmuxError::CommandFailed(
                            "no server running on /tmp/tmux-0/default".into(),
                        ));
                    }
                    let mut names: Vec<&String> = sessions.iter().collect();
                    names.sort();
                    Ok(names
                        .into_iter()
                        .map(|s| format!("{s}\n"))
                        .collect::<String>())
                }
                "kill-session" => {
                    sessions.remove(&target);
                    Ok(String::new())
                }
                "send-keys" => {
                    if !sessions.contains(&target) {
                        return Err(TmuxError::CommandFailed(format!(
                            "can't find pane: {target}"
                        )));
                    }
                    if args.last() == Some(&"C-c") && self.exit_on_interrupt {
                        sessions.remove(&target);
                    }
                    Ok(String::new())
                }
                "capture-pane" => Ok(self
                    .captures
                    .lock()
                    .unwrap()
                    .get(&target)
                    .cloned()
                    .unwrap_or_default()),
                _ => Err(TmuxError::CommandFailed(format!(
                    "unexpected command: {args:?}"
                ))),
            }
        }

        fn run_foreground(&self, args: &[&str]) -> Result<(), TmuxError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("foreground {}", args.join(" ")));
            Ok(())
        }
    }
}
