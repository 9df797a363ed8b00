//! Error types shared by the pipeline loops
//!
//! Errors never cross a handoff boundary: each loop resolves its own
//! failures before producing its next buffer. These types only surface at
//! startup, at teardown, or when a peer thread has disappeared.

/// A handoff queue whose peer endpoint has been dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The other side of the channel hung up (its thread exited or panicked)
    #[error("{channel} channel disconnected")]
    Disconnected { channel: &'static str },
}

/// Failure to bring the pipeline up or down.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The OS refused to spawn a loop thread
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A loop thread panicked before joining
    #[error("{0} thread panicked")]
    Panicked(&'static str),

    /// A thread exited before completing its startup handshake
    #[error("{0} thread exited during startup")]
    Startup(&'static str),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}
