use std::process::ExitCode;

/// Errors that cause gt to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("{tool} timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("doctor found {0} issue(s)")]
    DoctorFailed(usize),
}

impl ExitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExitError::Config(_) => ExitCode::from(2),
            ExitError::ToolNotFound { .. } => ExitCode::from(3),
            ExitError::Timeout { .. } => ExitCode::from(5),
            ExitError::DoctorFailed(_) => ExitCode::from(6),
        }
    }
}

/// Domain failures surfaced by the address, session, delivery, mail and
/// wisp layers.
#[derive(Debug, thiserror::Error)]
pub enum GtError {
    #[error("invalid address {raw:?}: {reason}")]
    InvalidFormat { raw: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("session {0} is already running")]
    AlreadyRunning(String),

    #[error("session {0} is not running")]
    NotRunning(String),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("launching {session} failed: {detail}")]
    LaunchFailed { session: String, detail: String },

    #[error("stopping {session} failed: {detail}")]
    ShutdownFailed { session: String, detail: String },

    #[error("sending to {session} failed: {detail}")]
    SendFailed { session: String, detail: String },

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("record store rejected request: {0}")]
    StoreRejected(String),

    #[error("unknown molecule {0}")]
    UnknownMolecule(String),

    #[error("molecule {molecule} has no step {step}")]
    UnknownStep { molecule: String, step: String },

    #[error("molecule {0} is held by another operation")]
    Busy(String),

    #[error("claim on molecule {0} was recovered by gc before the operation finished")]
    ClaimLost(String),

    #[error("{0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GtError {
    pub fn invalid(raw: &str, reason: impl Into<String>) -> Self {
        GtError::InvalidFormat {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GtError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            GtError::Config(_) => ExitCode::from(2),
            GtError::InvalidFormat { .. } => ExitCode::from(10),
            GtError::NotFound(_) | GtError::SessionNotFound(_) => ExitCode::from(11),
            GtError::AlreadyRunning(_) | GtError::NotRunning(_) => ExitCode::from(12),
            GtError::LaunchFailed { .. }
            | GtError::ShutdownFailed { .. }
            | GtError::SendFailed { .. } => ExitCode::from(13),
            GtError::StoreUnavailable(_) | GtError::StoreRejected(_) => ExitCode::from(14),
            GtError::UnknownMolecule(_)
            | GtError::UnknownStep { .. }
            | GtError::Busy(_)
            | GtError::ClaimLost(_) => ExitCode::from(15),
            GtError::Io { .. } => ExitCode::FAILURE,
        }
    }
}

pub type Result<T, E = GtError> = std::result::Result<T, E>;
