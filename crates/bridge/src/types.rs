use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Handle to a debugger target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

/// Handle to a live process of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

/// Debugger-assigned breakpoint number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Editor buffer number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a marker (a `:sign` in vim terms) placed in an editor buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u32);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

/// A breakpoint and every source location it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub id: BreakpointId,
    pub locations: Vec<SourceLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// `None` when the frame has no line information (e.g. system libraries)
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Stable per-process thread index (not the OS thread id)
    pub index_id: u32,
    /// Index into `frames` of the frame the user selected
    pub selected_frame: usize,
    /// Innermost frame first
    pub frames: Vec<FrameInfo>,
}

impl ThreadInfo {
    /// Location to show the program counter at: the selected frame, or the first frame further
    /// out that has line information.
    pub fn pc_location(&self) -> Option<&SourceLocation> {
        self.frames
            .iter()
            .skip(self.selected_frame)
            .find_map(|frame| frame.location.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Launching,
    Attaching,
    Running,
    Stepping,
    Stopped,
    Crashed,
    Suspended,
    Detached,
    Exited,
    Invalid,
}

impl ProcessState {
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            ProcessState::Launching
                | ProcessState::Attaching
                | ProcessState::Running
                | ProcessState::Stepping
                | ProcessState::Stopped
                | ProcessState::Crashed
                | ProcessState::Suspended
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Launching => "launching",
            ProcessState::Attaching => "attaching",
            ProcessState::Running => "running",
            ProcessState::Stepping => "stepping",
            ProcessState::Stopped => "stopped",
            ProcessState::Crashed => "crashed",
            ProcessState::Suspended => "suspended",
            ProcessState::Detached => "detached",
            ProcessState::Exited => "exited",
            ProcessState::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Result of running a command in the debugger's command interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Command output on success, error text otherwise
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Read-only panes kept up to date with the debugger session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pane {
    Backtrace,
    Breakpoints,
    Disassembly,
    Threads,
    Locals,
    Registers,
    Logs,
}

impl Pane {
    /// Panes whose content is the output of a debugger query
    pub const QUERY_PANES: [Pane; 6] = [
        Pane::Backtrace,
        Pane::Breakpoints,
        Pane::Disassembly,
        Pane::Threads,
        Pane::Locals,
        Pane::Registers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pane::Backtrace => "backtrace",
            Pane::Breakpoints => "breakpoints",
            Pane::Disassembly => "disassembly",
            Pane::Threads => "threads",
            Pane::Locals => "locals",
            Pane::Registers => "registers",
            Pane::Logs => "logs",
        }
    }

    /// The query a pane runs unless configured otherwise. The log pane has none: it is only ever
    /// appended to.
    pub fn default_query(self) -> Option<&'static str> {
        match self {
            Pane::Backtrace => Some("bt"),
            Pane::Breakpoints => Some("breakpoint list"),
            Pane::Disassembly => Some("disassemble -c 20 -p"),
            Pane::Threads => Some("thread list"),
            Pane::Locals => Some("frame variable"),
            Pane::Registers => Some("register read"),
            Pane::Logs => None,
        }
    }
}

impl fmt::Display for Pane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pane {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backtrace" => Ok(Pane::Backtrace),
            "breakpoints" => Ok(Pane::Breakpoints),
            "disassembly" => Ok(Pane::Disassembly),
            "threads" => Ok(Pane::Threads),
            "locals" => Ok(Pane::Locals),
            "registers" => Ok(Pane::Registers),
            "logs" => Ok(Pane::Logs),
            other => Err(eyre::eyre!("invalid pane {other}")),
        }
    }
}

/// Severity of a status line message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}
