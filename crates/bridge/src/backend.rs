//! The debugger seam.
//!
//! The bridge never walks stacks, formats variables or disassembles anything itself. It drives
//! an implementation of [`DebuggerBackend`] (normally a binding to LLDB's SB API) and only ever
//! from the worker thread, which owns the backend outright.

use std::path::Path;

use crate::types::{
    BreakpointId, BreakpointInfo, CommandOutput, ProcessId, ProcessState, TargetId, ThreadInfo,
};

/// Where a debugger object delivers its broadcasts once the bridge subscribes to it
pub type EventSink = crossbeam_channel::Sender<DebuggerEvent>;

/// Notifications originating from the debugger, on its own timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerEvent {
    /// Breakpoints were added, removed or re-resolved on a target
    BreakpointsChanged { target: TargetId },
    /// A process changed state (stopped, resumed, exited...)
    ProcessStateChanged {
        process: ProcessId,
        state: ProcessState,
    },
    /// A process has stdout or stderr waiting to be read
    ProcessOutput { process: ProcessId },
}

pub trait DebuggerBackend: Send {
    /// Run a command in the interpreter, recording it in the command history
    fn execute(&mut self, command: &str) -> CommandOutput;

    /// Run a command in the interpreter without recording it. Used for pane content.
    fn query(&mut self, command: &str) -> CommandOutput;

    /// Completion candidates for `line` with the cursor at `pos`.
    ///
    /// The first element is the common prefix of all matches, followed by the matches.
    fn complete(&mut self, line: &str, pos: usize) -> Vec<String>;

    fn num_targets(&self) -> usize;

    fn selected_target(&self) -> Option<TargetId>;

    fn target_is_valid(&self, target: TargetId) -> bool;

    fn target_process(&self, target: TargetId) -> Option<ProcessId>;

    fn num_breakpoints(&self, target: TargetId) -> usize;

    fn breakpoints(&self, target: TargetId) -> Vec<BreakpointInfo>;

    fn create_breakpoint(
        &mut self,
        target: TargetId,
        path: &Path,
        line: u32,
    ) -> eyre::Result<BreakpointId>;

    fn process_is_valid(&self, process: ProcessId) -> bool;

    fn process_state(&self, process: ProcessId) -> ProcessState;

    /// One-line human readable description, e.g. `SBProcess: pid = 42, state = running`
    fn describe_process(&self, process: ProcessId) -> String;

    fn exit_status(&self, process: ProcessId) -> Option<i32>;

    fn threads(&self, process: ProcessId) -> Vec<ThreadInfo>;

    /// `index_id` of the selected thread
    fn selected_thread(&self, process: ProcessId) -> Option<u32>;

    fn interrupt(&mut self, process: ProcessId) -> eyre::Result<()>;

    fn kill(&mut self, process: ProcessId) -> eyre::Result<()>;

    fn put_stdin(&mut self, process: ProcessId, input: &str) -> eyre::Result<()>;

    /// Read at most `max_bytes` of pending stdout, `None` when there is nothing to read
    fn read_stdout(&mut self, process: ProcessId, max_bytes: usize) -> Option<String>;

    /// Read at most `max_bytes` of pending stderr, `None` when there is nothing to read
    fn read_stderr(&mut self, process: ProcessId, max_bytes: usize) -> Option<String>;

    /// Deliver breakpoint change broadcasts of `target` to `sink`.
    ///
    /// Called once per target lifetime.
    fn subscribe_target(&mut self, target: TargetId, sink: EventSink);

    /// Deliver state, stdout and stderr broadcasts of `process` to `sink`.
    ///
    /// Called once per process lifetime.
    fn subscribe_process(&mut self, process: ProcessId, sink: EventSink);

    /// Release the debugger. Called exactly once, when the worker exits.
    fn terminate(&mut self);
}

/// Text the process panes show in place of a failed query: why there is nothing to show.
/// Empty when the process is stopped, since then the query's own error is meaningful.
pub(crate) fn process_status(backend: &dyn DebuggerBackend, target: Option<TargetId>) -> String {
    let Some(target) = target.filter(|t| backend.target_is_valid(*t)) else {
        return "Target does not exist.".to_string();
    };
    let Some(process) = backend
        .target_process(target)
        .filter(|p| backend.process_is_valid(*p))
    else {
        return "Process does not exist.".to_string();
    };
    if backend.process_state(process) == ProcessState::Stopped {
        return String::new();
    }
    let mut status = backend.describe_process(process);
    if let Some(code) = backend.exit_status(process) {
        status.push_str(&format!(", exit status = {code}"));
    }
    status
}
