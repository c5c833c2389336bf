use thiserror::Error;

/// Errors surfaced by the supervision core.
///
/// Every one of these is recovered locally by its caller (result value plus a
/// log line); none of them tears the whole process down.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS refused or failed to create the child process.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called on a task that has not been joined yet.
    #[error("task is already running")]
    AlreadyRunning,

    /// The host refused to register the control handler or rejected a status
    /// update. Logged as a warning; the service keeps running with degraded
    /// observability.
    #[error("host registration failed: {0}")]
    HostRegistration(String),

    /// An injected start hook failed.
    #[error("start hook failed: {0}")]
    Hook(#[from] anyhow::Error),
}
