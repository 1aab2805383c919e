use std::io;

use thiserror::Error;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The search path was exhausted without a match, or an explicit path
    /// does not name an executable file.
    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    /// The OS refused to create the process.
    #[error("failed to spawn {command}: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Write to a channel after half-close, or after the reading side is
    /// gone.
    #[error("channel closed for writing")]
    ChannelClosed,

    /// A command run through [`run()`](crate::run()) or checked with
    /// [`Capture::check`](crate::Capture::check) finished with a non-zero
    /// code.
    ///
    /// The code conflates normal exits and signal deaths; see
    /// [`Task::finish`](crate::Task::finish).
    #[error("command exited with code {0}")]
    NonZeroExit(i32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
