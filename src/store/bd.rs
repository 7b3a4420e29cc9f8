//! `bd` command-line adapter for the record store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExitError;
use crate::subprocess::{RunOutput, Tool};

use super::{CreateRequest, ListFilter, Record, RecordId, RecordStore, StoreError, UpdateRequest};

/// A read that hangs this long counts as an unavailable store.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a call may be killed when it overruns.
#[derive(Clone, Copy)]
enum Call {
    /// `list`/`show`: safe to abandon.
    Read,
    /// `create`/`pin`/`update`: always run to completion, since killing
    /// one mid-flight leaves the outcome unknown.
    Write,
}

/// Record store reached by running `bd` inside the town root.
pub struct BdStore {
    program: String,
    workdir: PathBuf,
    read_timeout: Duration,
}

impl BdStore {
    pub fn new(program: impl Into<String>, workdir: &Path) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.to_path_buf(),
            read_timeout: READ_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = limit;
        self
    }

    fn tool(&self, args: &[String], call: Call) -> Tool {
        let tool = Tool::new(self.program.as_str())
            .args(args)
            .current_dir(&self.workdir);
        match call {
            Call::Read => tool.timeout(self.read_timeout),
            Call::Write => tool,
        }
    }

    fn run(&self, args: &[String], call: Call) -> Result<RunOutput, StoreError> {
        let output = self.tool(args, call).run().map_err(|e| unavailable(&e))?;
        if output.success() {
            Ok(output)
        } else {
            let stderr = output.stderr.trim();
            Err(StoreError::Rejected(if stderr.is_empty() {
                format!("{} exited {}", self.program, output.exit_code)
            } else {
                stderr.to_string()
            }))
        }
    }
}

fn unavailable(err: &anyhow::Error) -> StoreError {
    match err.downcast_ref::<ExitError>() {
        Some(e) => StoreError::Unavailable(e.to_string()),
        None => StoreError::Unavailable(format!("{err:#}")),
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

pub(super) fn create_args(req: &CreateRequest) -> Vec<String> {
    let mut args = owned(&[
        "create",
        "--type",
        &req.record_type,
        "--title",
        &req.title,
        "-d",
        &req.body,
    ]);
    if let Some(ref assignee) = req.assignee {
        args.extend(owned(&["--assignee", assignee]));
    }
    if let Some(priority) = req.priority {
        args.push("--priority".into());
        args.push(priority.to_string());
    }
    if !req.labels.is_empty() {
        args.push("--labels".into());
        args.push(req.labels.join(","));
    }
    if let Some(ref parent) = req.parent {
        args.extend(owned(&["--parent", parent]));
    }
    args.push("--silent".into());
    args
}

pub(super) fn list_args(filter: &ListFilter) -> Vec<String> {
    let mut args = owned(&["list", "--json"]);
    if let Some(ref t) = filter.record_type {
        args.extend(owned(&["--type", t]));
    }
    if let Some(ref a) = filter.assignee {
        args.extend(owned(&["--assignee", a]));
    }
    if let Some(ref s) = filter.status {
        args.extend(owned(&["--status", s]));
    }
    for label in &filter.labels {
        args.extend(owned(&["--label", label]));
    }
    args
}

pub(super) fn update_args(id: &str, update: &UpdateRequest) -> Vec<String> {
    let mut args = owned(&["update", id]);
    if let Some(ref s) = update.status {
        args.extend(owned(&["--status", s]));
    }
    if let Some(ref d) = update.description {
        args.extend(owned(&["-d", d]));
    }
    for label in &update.add_labels {
        args.extend(owned(&["--add-label", label]));
    }
    args
}

/// `bd show --json` prints either one object or a one-element array.
pub(super) fn parse_show(json: &str) -> Result<Option<Record>, StoreError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| StoreError::Rejected(format!("unparseable bd show output: {e}")))?;
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        serde_json::Value::Array(_) | serde_json::Value::Null => return Ok(None),
        other => other,
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| StoreError::Rejected(format!("unparseable bd show output: {e}")))
}

pub(super) fn parse_list(json: &str) -> Result<Vec<Record>, StoreError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json)
        .map_err(|e| StoreError::Rejected(format!("unparseable bd list output: {e}")))
}

impl RecordStore for BdStore {
    fn create(&self, request: &CreateRequest) -> Result<RecordId, StoreError> {
        let output = self.run(&create_args(request), Call::Write)?;
        let id = output.stdout.trim().to_string();
        if id.is_empty() {
            return Err(StoreError::Rejected("bd create returned no id".into()));
        }
        tracing::debug!(%id, record_type = %request.record_type, "record created");
        Ok(id)
    }

    fn pin(&self, id: &str) -> Result<(), StoreError> {
        self.run(&owned(&["pin", id]), Call::Write).map(|_| ())
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Record>, StoreError> {
        let output = self.run(&list_args(filter), Call::Read)?;
        let mut records = parse_list(&output.stdout)?;
        // bd may ignore filters it does not know; re-apply locally.
        records.retain(|r| filter.matches(r));
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let output = self
            .tool(&owned(&["show", id, "--json"]), Call::Read)
            .run()
            .map_err(|e| unavailable(&e))?;
        if !output.success() {
            if output.stderr.contains("not found") {
                return Ok(None);
            }
            return Err(StoreError::Rejected(output.stderr.trim().to_string()));
        }
        parse_show(&output.stdout)
    }

    fn update(&self, id: &str, update: &UpdateRequest) -> Result<(), StoreError> {
        self.run(&update_args(id, update), Call::Write).map(|_| ())
    }
}
