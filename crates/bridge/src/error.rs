//! Error kinds surfaced to callers of the bridge.

use std::time::Duration;

/// Errors the editor side must be able to tell apart.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A synchronous request did not complete before its deadline. The debugger state is
    /// unknown, not stale-but-valid.
    #[error("event loop did not respond within {waited:?}")]
    EventLoopUnresponsive {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The worker thread is gone or wedged. Fatal to the session.
    #[error("debugger worker is dead: {0}")]
    DeadWorker(String),

    /// The debugger has more than one target, which is not supported.
    #[error("debugger has {targets} targets, only one is supported")]
    InconsistentState {
        /// Number of targets the debugger reported.
        targets: usize,
    },

    /// The debugger ran a command and reported failure.
    #[error("`{command}` failed: {output}")]
    CommandFailed {
        /// The command as sent to the interpreter.
        command: String,
        /// First line of the error output.
        output: String,
    },
}

impl BridgeError {
    pub(crate) fn command_failed(command: &str, output: &str) -> Self {
        BridgeError::CommandFailed {
            command: command.to_string(),
            output: output.lines().next().unwrap_or_default().trim().to_string(),
        }
    }
}
