//! Bridge between a text editor and a debugger
//!
//! A single worker thread owns the debugger. The editor talks to it through a [`Gateway`], and
//! the worker keeps the editor's markers and panes in step with the debugger's state.
mod actions;
mod backend;
mod busy;
mod commands;
mod config;
mod content;
mod detector;
mod editor;
mod error;
mod gateway;
mod governor;
mod markers;
mod reconciler;
mod source_map;
pub mod testing;
mod types;
pub mod utils;
mod worker;

pub use backend::{DebuggerBackend, DebuggerEvent, EventSink};
pub use busy::{BusyDepth, BusyGuard};
pub use commands::{Command, Reply, WorkerState};
pub use config::BridgeConfig;
pub use content::{ContentCache, split_output};
pub use detector::{StateChangeMask, StateTracker};
pub use editor::{EditorSurface, MarkerStyle};
pub use error::BridgeError;
pub use gateway::Gateway;
pub use governor::{FloodAction, FloodGovernor, FloodLimits};
pub use markers::{MarkerKey, MarkerRegistry};
pub use reconciler::UiReconciler;
pub use source_map::SourceMap;
pub use types::{
    BreakpointId, BreakpointInfo, BufferId, CommandOutput, FrameInfo, MarkerId, Pane, ProcessId,
    ProcessState, Severity, SourceLocation, TargetId, ThreadInfo,
};

// session files are loaded by the embedding editor
pub use session::{Action, Mode, Session};
