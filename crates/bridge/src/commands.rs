//! Messages between the editor-facing gateway and the worker thread
//!
//! Every operation the editor can ask of the debugger is a [`Command`] variant. A command is
//! wrapped in a [`Request`] when submitted; if the caller asked for a result, the worker answers
//! with a [`Delivery`] carrying the request's sequence number.

use std::path::PathBuf;

use session::Action;

use crate::types::{BreakpointId, BufferId, Pane};

/// Operations performed on the worker thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a debugger command given as tokens
    Execute(Vec<String>),

    /// Set a breakpoint at a file and line
    SetBreakpoint { path: PathBuf, line: u32 },

    /// Delete every breakpoint resolving to a buffer line, or set one there if there are none
    ToggleBreakpoint { buffer: BufferId, line: u32 },

    DeleteBreakpoint(BreakpointId),

    /// Change the query behind a pane, then refresh and show it
    SetPaneCommand { pane: Pane, command: String },

    /// Switch the backtrace pane between the selected thread and all threads
    ToggleBacktraceAll,

    SelectThreadAndFrame {
        thread: Option<u32>,
        frame: Option<u32>,
    },

    /// Forward text to the debuggee's stdin
    PutStdin(String),

    /// Completion candidates for a partially typed command
    ///
    /// `arg` is the word under the cursor, `line` the whole command line and `pos` the cursor
    /// position in `line`.
    Complete { arg: String, line: String, pos: usize },

    /// Reconcile the editor with the debugger
    Refresh,

    RunActions(Vec<Action>),

    /// Leave the current mode (running its teardown) and enter another (running its setup)
    EnterMode(String),

    /// Names of the session's modes
    Modes,

    /// Stop the worker. Always the last request a worker handles.
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Execute(_) => "execute",
            Command::SetBreakpoint { .. } => "set_breakpoint",
            Command::ToggleBreakpoint { .. } => "toggle_breakpoint",
            Command::DeleteBreakpoint(_) => "delete_breakpoint",
            Command::SetPaneCommand { .. } => "set_pane_command",
            Command::ToggleBacktraceAll => "toggle_backtrace_all",
            Command::SelectThreadAndFrame { .. } => "select_thread_and_frame",
            Command::PutStdin(_) => "put_stdin",
            Command::Complete { .. } => "complete",
            Command::Refresh => "refresh",
            Command::RunActions(_) => "run_actions",
            Command::EnterMode(_) => "enter_mode",
            Command::Modes => "modes",
            Command::Shutdown => "shutdown",
        }
    }
}

/// A command submitted through the gateway
#[derive(Debug)]
pub(crate) struct Request {
    pub seq: u64,
    pub command: Command,
    /// Whether the caller is waiting for a [`Delivery`]
    pub sync: bool,
}

/// Result of a synchronous request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command has no result value
    Done,
    /// Whether a command, or every action of a batch, succeeded
    Success(bool),
    Completions(Vec<String>),
    Modes(Vec<String>),
    /// The command failed or panicked on the worker
    Aborted(String),
}

#[derive(Debug)]
pub(crate) struct Delivery {
    pub seq: u64,
    pub reply: Reply,
}

/// State of the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Blocked waiting for a request or debugger event
    IdleWaiting,

    /// Handling exactly one request or one batch of debugger events
    Dispatching,

    Terminated,
}
