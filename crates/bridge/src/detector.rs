//! Detects target, process and breakpoint transitions after debugger-mutating commands.

use bitflags::bitflags;

use crate::backend::{DebuggerBackend, EventSink};
use crate::types::{ProcessId, TargetId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateChangeMask: u8 {
        const TARGET_CREATED = 1 << 0;
        const TARGET_DESTROYED = 1 << 1;
        const PROCESS_CREATED = 1 << 2;
        const PROCESS_DESTROYED = 1 << 3;
        const BREAKPOINTS_CHANGED = 1 << 4;
        const INCONSISTENT_STATE = 1 << 5;
    }
}

/// Identity and counts seen at the previous check
#[derive(Debug, Default)]
pub struct StateTracker {
    target: Option<TargetId>,
    process: Option<ProcessId>,
    num_breakpoints: usize,
}

impl StateTracker {
    pub fn target(&self) -> Option<TargetId> {
        self.target
    }

    pub fn process(&self) -> Option<ProcessId> {
        self.process
    }

    /// Compare the debugger against the last snapshot and update it.
    ///
    /// Listeners are attached to a target or process exactly once, on the check that first sees
    /// it.
    pub fn detect(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        sink: &EventSink,
    ) -> StateChangeMask {
        let mut changes = StateChangeMask::empty();

        let targets = backend.num_targets();
        if targets > 1 {
            tracing::warn!(targets, "more than one target");
            return StateChangeMask::INCONSISTENT_STATE;
        }

        match self.target {
            Some(target) if !backend.target_is_valid(target) => {
                tracing::debug!(?target, "target destroyed");
                changes |= StateChangeMask::TARGET_DESTROYED;
                self.target = None;
                if self.process.take().is_some() {
                    changes |= StateChangeMask::PROCESS_DESTROYED;
                }
                if self.num_breakpoints > 0 {
                    changes |= StateChangeMask::BREAKPOINTS_CHANGED;
                    self.num_breakpoints = 0;
                }
                return changes;
            }
            Some(_) => {}
            None => {
                if let Some(target) = backend
                    .selected_target()
                    .filter(|t| backend.target_is_valid(*t))
                {
                    tracing::debug!(?target, "target created");
                    changes |= StateChangeMask::TARGET_CREATED;
                    backend.subscribe_target(target, sink.clone());
                    self.target = Some(target);
                }
            }
        }

        let Some(target) = self.target else {
            return changes;
        };

        let current = backend
            .target_process(target)
            .filter(|p| backend.process_is_valid(*p));
        match (self.process, current) {
            (old, Some(process)) if old != Some(process) => {
                tracing::debug!(?process, "process created");
                changes |= StateChangeMask::PROCESS_CREATED;
                backend.subscribe_process(process, sink.clone());
                self.process = Some(process);
            }
            (Some(process), None) => {
                tracing::debug!(?process, "process destroyed");
                changes |= StateChangeMask::PROCESS_DESTROYED;
                self.process = None;
            }
            _ => {}
        }

        let num_breakpoints = backend.num_breakpoints(target);
        if num_breakpoints != self.num_breakpoints {
            changes |= StateChangeMask::BREAKPOINTS_CHANGED;
            self.num_breakpoints = num_breakpoints;
        }

        changes
    }
}
