//! The thread that owns the debugger.
//!
//! The worker waits on two sources at once: requests from the [`Gateway`](crate::Gateway) and
//! events broadcast by the debugger. Each wake-up handles exactly one request, or one batch of
//! debugger events, and then goes back to waiting.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{Arc, Mutex},
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use eyre::WrapErr;
use session::{Action, Session};

use crate::actions;
use crate::backend::{DebuggerBackend, DebuggerEvent, EventSink};
use crate::busy::BusyDepth;
use crate::commands::{Command, Delivery, Reply, Request, WorkerState};
use crate::config::BridgeConfig;
use crate::detector::{StateChangeMask, StateTracker};
use crate::editor::EditorSurface;
use crate::error::BridgeError;
use crate::governor::{self, FloodAction, FloodGovernor};
use crate::reconciler::UiReconciler;
use crate::types::{BufferId, Pane, ProcessId, ProcessState, Severity, TargetId};
use crate::utils::{escape_tokens, normalise_path};

/// Why the worker woke up
enum Wake {
    Request(Request),
    Debugger(DebuggerEvent),
    Timeout,
    /// Every gateway handle is gone
    Disconnected,
}

pub(crate) struct Worker {
    backend: Box<dyn DebuggerBackend>,
    editor: Box<dyn EditorSurface>,
    config: BridgeConfig,
    session: Session,
    current_mode: Option<String>,
    tracker: StateTracker,
    ui: UiReconciler,
    governor: FloodGovernor,
    busy: BusyDepth,
    events_tx: EventSink,
    events_rx: Receiver<DebuggerEvent>,
    requests: Receiver<Request>,
    replies_tx: Sender<Delivery>,
    /// Used to evict an unread reply
    replies_rx: Receiver<Delivery>,
    state: Arc<Mutex<WorkerState>>,
}

impl Worker {
    pub(crate) fn new(
        backend: Box<dyn DebuggerBackend>,
        editor: Box<dyn EditorSurface>,
        config: BridgeConfig,
        session: Session,
        requests: Receiver<Request>,
        (replies_tx, replies_rx): (Sender<Delivery>, Receiver<Delivery>),
        state: Arc<Mutex<WorkerState>>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            backend,
            editor,
            ui: UiReconciler::new(config.panes.clone()),
            governor: FloodGovernor::new(config.flood),
            config,
            session,
            current_mode: None,
            tracker: StateTracker::default(),
            busy: BusyDepth::default(),
            events_tx,
            events_rx,
            requests,
            replies_tx,
            replies_rx,
            state,
        }
    }

    fn set_state(&self, state: WorkerState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    pub(crate) fn run(mut self) {
        let idle_timeout = self.config.idle_timeout();
        let max_idle = self.config.max_idle();
        let mut idle_timeouts: u64 = 0;
        let mut idle_since = Instant::now();

        loop {
            self.set_state(WorkerState::IdleWaiting);
            let wake = crossbeam_channel::select! {
                recv(self.requests) -> msg => match msg {
                    Ok(request) => Wake::Request(request),
                    Err(_) => Wake::Disconnected,
                },
                recv(self.events_rx) -> msg => match msg {
                    Ok(event) => Wake::Debugger(event),
                    Err(_) => Wake::Disconnected,
                },
                default(idle_timeout) => Wake::Timeout,
            };

            match wake {
                Wake::Timeout => {
                    idle_timeouts += 1;
                    // both must hold: a wait that returns early inflates the count only
                    if idle_timeouts > self.config.max_idle_timeouts
                        && idle_since.elapsed() >= max_idle
                    {
                        tracing::error!(
                            idle_timeouts,
                            idle = ?idle_since.elapsed(),
                            "wait keeps timing out, giving up on the event loop"
                        );
                        break;
                    }
                }
                Wake::Disconnected => {
                    tracing::warn!("gateway dropped without shutting down");
                    break;
                }
                Wake::Request(request) => {
                    idle_timeouts = 0;
                    idle_since = Instant::now();
                    self.set_state(WorkerState::Dispatching);
                    if !self.dispatch(request) {
                        break;
                    }
                }
                Wake::Debugger(event) => {
                    idle_timeouts = 0;
                    idle_since = Instant::now();
                    self.set_state(WorkerState::Dispatching);
                    let result =
                        panic::catch_unwind(AssertUnwindSafe(|| self.handle_events(event)));
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!(error = ?e, "handling debugger events"),
                        Err(payload) => tracing::error!(
                            panic = %panic_message(payload.as_ref()),
                            "panic while handling debugger events"
                        ),
                    }
                }
            }
        }

        self.teardown();
    }

    /// Run one request. Returns false if the worker should stop.
    fn dispatch(&mut self, request: Request) -> bool {
        let Request { seq, command, sync } = request;
        if command == Command::Shutdown {
            tracing::debug!("received shutdown command");
            if sync {
                self.deliver(seq, Reply::Done);
            }
            return false;
        }

        let name = command.name();
        tracing::debug!(seq, command = name, "dispatching request");
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle(command)));
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(error = ?e, command = name, "command failed");
                if let Err(e) = self.editor.status(&format!("{name}: {e}"), Severity::Error) {
                    tracing::warn!(error = %e, "reporting failure to editor");
                }
                Reply::Aborted(format!("{e:#}"))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(panic = %message, command = name, "command panicked");
                Reply::Aborted(message)
            }
        };
        if sync {
            self.deliver(seq, reply);
        }
        true
    }

    /// Put a reply in the single slot, replacing one nobody collected
    fn deliver(&self, seq: u64, reply: Reply) {
        let mut delivery = Delivery { seq, reply };
        loop {
            match self.replies_tx.try_send(delivery) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(stale) = self.replies_rx.try_recv() {
                        tracing::debug!(seq = stale.seq, "dropping uncollected reply");
                    }
                    delivery = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn handle(&mut self, command: Command) -> eyre::Result<Reply> {
        let reply = match command {
            Command::Execute(tokens) => self.execute_tokens(tokens)?,
            Command::SetBreakpoint { path, line } => {
                Reply::Success(self.set_breakpoint(&path, line)?)
            }
            Command::ToggleBreakpoint { buffer, line } => {
                Reply::Success(self.toggle_breakpoint(buffer, line)?)
            }
            Command::DeleteBreakpoint(id) => {
                Reply::Success(self.exec_command(&format!("breakpoint delete {id}"))?)
            }
            Command::SetPaneCommand { pane, command } => {
                self.change_pane_command(pane, command)?;
                Reply::Done
            }
            Command::ToggleBacktraceAll => {
                let command = if self.ui.pane_command(Pane::Backtrace) == Some("bt all") {
                    "bt"
                } else {
                    "bt all"
                };
                self.change_pane_command(Pane::Backtrace, command.to_string())?;
                Reply::Done
            }
            Command::SelectThreadAndFrame { thread, frame } => {
                let mut ok = true;
                if let Some(thread) = thread {
                    ok &= self.exec_command(&format!("thread select {thread}"))?;
                }
                if let Some(frame) = frame {
                    ok &= self.exec_command(&format!("frame select {frame}"))?;
                }
                Reply::Success(ok)
            }
            Command::PutStdin(input) => {
                self.put_stdin(&input)?;
                Reply::Done
            }
            Command::Complete { arg, line, pos } => {
                Reply::Completions(self.complete(&arg, &line, pos))
            }
            Command::Refresh => {
                self.ui.forget_missing_buffers();
                self.update_ui()?;
                Reply::Done
            }
            Command::RunActions(actions) => {
                Reply::Success(self.batch(|worker| worker.run_batch(&actions))?)
            }
            Command::EnterMode(name) => Reply::Success(self.enter_mode(&name)?),
            Command::Modes => Reply::Modes(self.session.mode_names()),
            Command::Shutdown => Reply::Done,
        };
        Ok(reply)
    }

    fn execute_tokens(&mut self, tokens: Vec<String>) -> eyre::Result<Reply> {
        let Some(first) = tokens.first() else {
            self.editor
                .status("Usage: <debugger command> [args...]", Severity::Warning)?;
            return Ok(Reply::Success(false));
        };
        match first.as_str() {
            "di" | "dis" | "disassemble" => {
                self.change_pane_command(Pane::Disassembly, tokens.join(" "))?;
                Ok(Reply::Done)
            }
            "bt" | "_regexp-bt" => {
                self.change_pane_command(Pane::Backtrace, tokens.join(" "))?;
                Ok(Reply::Done)
            }
            _ => {
                let help = first == "help";
                let ok = self.exec_command(&escape_tokens(&tokens))?;
                if help {
                    self.editor.open_pane(Pane::Logs)?;
                }
                Ok(Reply::Success(ok))
            }
        }
    }

    /// Run a command that may change debugger state, echo it and its result to the log pane,
    /// then bring the editor up to date
    #[tracing::instrument(skip(self))]
    fn exec_command(&mut self, command: &str) -> eyre::Result<bool> {
        self.log(&format!("→(lldb) {command}\n"), "")?;
        let result = self.backend.execute(command);
        if !result.success {
            self.log(&result.output, "✗")?;
            let error = BridgeError::command_failed(command, &result.output);
            self.editor.status(&error.to_string(), Severity::Error)?;
        } else if !result.output.is_empty() {
            self.log(&result.output, "✓")?;
        }

        self.detect_changes()?;
        self.update_ui()?;
        Ok(result.success)
    }

    fn log(&mut self, text: &str, prefix: &str) -> eyre::Result<usize> {
        self.ui.append_log(self.editor.as_mut(), text, prefix)
    }

    fn detect_changes(&mut self) -> eyre::Result<StateChangeMask> {
        let changes = self.tracker.detect(self.backend.as_mut(), &self.events_tx);
        if changes.is_empty() {
            return Ok(changes);
        }
        tracing::debug!(?changes, "debugger state changed");

        if changes.contains(StateChangeMask::INCONSISTENT_STATE) {
            let error = BridgeError::InconsistentState {
                targets: self.backend.num_targets(),
            };
            self.editor.status(&error.to_string(), Severity::Error)?;
        }
        if changes.intersects(StateChangeMask::TARGET_CREATED | StateChangeMask::TARGET_DESTROYED) {
            self.ui.forget_buffers();
        }
        if changes.contains(StateChangeMask::PROCESS_CREATED) {
            self.governor.reset();
        }
        Ok(changes)
    }

    /// Reconcile the editor unless a batch is running
    fn update_ui(&mut self) -> eyre::Result<()> {
        if self.busy.is_busy() {
            tracing::trace!(depth = self.busy.depth(), "busy, skipping ui update");
            return Ok(());
        }
        self.ui
            .update(self.backend.as_mut(), self.editor.as_mut(), self.tracker.target())
    }

    /// The tracked target, refusing to guess when the debugger has several
    fn current_target(&mut self) -> eyre::Result<Option<TargetId>> {
        let targets = self.backend.num_targets();
        if targets > 1 {
            return Err(BridgeError::InconsistentState { targets }.into());
        }
        if self.tracker.target().is_none() {
            // the target may have been created outside of exec_command
            self.detect_changes()?;
        }
        Ok(self.tracker.target())
    }

    fn set_breakpoint(&mut self, path: &Path, line: u32) -> eyre::Result<bool> {
        let Some(target) = self.current_target()? else {
            self.editor
                .status("No target to set a breakpoint on!", Severity::Warning)?;
            return Ok(false);
        };
        let path = normalise_path(path);
        let absolute = std::path::absolute(&path)
            .wrap_err_with(|| format!("making {} absolute", path.display()))?;

        let result = self.backend.create_breakpoint(target, &absolute, line);
        self.log(&format!("→(lldb-bp) {}:{line}\n", path.display()), "")?;
        let ok = match result {
            Ok(id) => {
                tracing::debug!(%id, path = %absolute.display(), line, "breakpoint created");
                true
            }
            Err(e) => {
                self.log(&format!("{e}\n"), "✗")?;
                self.editor
                    .status(&format!("Could not set breakpoint: {e}"), Severity::Error)?;
                false
            }
        };

        self.detect_changes()?;
        self.update_ui()?;
        Ok(ok)
    }

    fn toggle_breakpoint(&mut self, buffer: BufferId, line: u32) -> eyre::Result<bool> {
        let handles = self.ui.breakpoints_at(buffer, line);
        if !handles.is_empty() {
            let ids: Vec<String> = handles.iter().map(ToString::to_string).collect();
            return self.exec_command(&format!("breakpoint delete {}", ids.join(" ")));
        }
        let Some(path) = self.editor.buffer_name(buffer)? else {
            self.editor
                .status(&format!("Buffer {buffer} has no file"), Severity::Warning)?;
            return Ok(false);
        };
        self.set_breakpoint(&path, line)
    }

    fn change_pane_command(&mut self, pane: Pane, command: String) -> eyre::Result<()> {
        tracing::debug!(%pane, %command, "changing pane command");
        self.ui.set_pane_command(pane, command);
        self.update_ui()?;
        if self.tracker.target().is_some() {
            self.editor.open_pane(pane)?;
        }
        Ok(())
    }

    fn put_stdin(&mut self, input: &str) -> eyre::Result<()> {
        match self.tracker.process() {
            Some(process) => self
                .backend
                .put_stdin(process, input)
                .wrap_err("writing to process stdin"),
            None => self.editor.status("No active process!", Severity::Warning),
        }
    }

    /// Completions for the word `arg` of `line`, with the cursor at byte `pos`
    fn complete(&mut self, arg: &str, line: &str, pos: usize) -> Vec<String> {
        let candidates = if arg == line && !line.is_empty() {
            // completing the command name itself: filter the full command list
            let mut candidates = vec![String::new()];
            for candidate in self.backend.complete("", 0) {
                if candidate == line {
                    candidates.insert(1, candidate);
                } else if candidate.starts_with(line) {
                    candidates.push(candidate);
                }
            }
            candidates
        } else {
            self.backend.complete(line, pos.min(line.len()))
        };

        let Some((common, matches)) = candidates.split_first() else {
            return Vec::new();
        };
        if matches.is_empty() {
            return Vec::new();
        }
        if common.is_empty() && !arg.is_empty() {
            let first_ok = matches.first().is_some_and(|m| m.starts_with(arg));
            let last_ok = matches.last().is_some_and(|m| m.starts_with(arg));
            if !first_ok || !last_ok {
                return Vec::new();
            }
        }
        matches.to_vec()
    }

    /// Run `f` with UI updates suppressed, then reconcile once
    fn batch(&mut self, f: impl FnOnce(&mut Self) -> eyre::Result<bool>) -> eyre::Result<bool> {
        let result = {
            let _busy = self.busy.enter();
            f(self)
        };
        self.update_ui()?;
        result
    }

    /// Run actions in order, stopping at the first that fails
    fn run_batch(&mut self, actions: &[Action]) -> eyre::Result<bool> {
        for action in actions {
            tracing::debug!(%action, "running action");
            if !self.run_action(action)? {
                tracing::warn!(%action, "action failed, skipping the rest");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run_action(&mut self, action: &Action) -> eyre::Result<bool> {
        match action {
            Action::Shell(command) => {
                self.log(&format!("→(sh) {command}\n"), "")?;
                let output = actions::run_shell(command)?;
                if output.success {
                    self.log(&output.output, "✓")?;
                } else {
                    self.log(&output.output, "✗")?;
                    let error = BridgeError::command_failed(command, &output.output);
                    self.editor.status(&error.to_string(), Severity::Error)?;
                }
                Ok(output.success)
            }
            Action::Breakpoint { path, line } => self.set_breakpoint(path, *line),
            Action::Debugger(command) => self.exec_command(command),
        }
    }

    /// Tear down the current mode and set up `name`
    fn enter_mode(&mut self, name: &str) -> eyre::Result<bool> {
        let Some(mode) = self.session.mode(name).cloned() else {
            self.editor
                .status(&format!("No mode named {name}"), Severity::Warning)?;
            return Ok(false);
        };

        self.batch(|worker| {
            if let Some(current) = worker.current_mode.take() {
                let teardown = worker
                    .session
                    .mode(&current)
                    .map(|m| m.teardown.clone())
                    .unwrap_or_default();
                match worker.run_batch(&teardown) {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!(mode = %current, "teardown incomplete"),
                    Err(e) => tracing::warn!(mode = %current, error = ?e, "teardown failed"),
                }
            }
            worker.current_mode = Some(name.to_string());
            tracing::info!(mode = name, "entering mode");
            worker.run_batch(&mode.setup)
        })
    }

    fn handle_events(&mut self, first: DebuggerEvent) -> eyre::Result<()> {
        let mut state_changed = false;
        let mut outputs: Vec<ProcessId> = Vec::new();
        let events: Vec<DebuggerEvent> = std::iter::once(first)
            .chain(self.events_rx.try_iter())
            .collect();
        tracing::trace!(count = events.len(), "handling debugger events");

        for event in events {
            match event {
                DebuggerEvent::BreakpointsChanged { .. } => state_changed = true,
                DebuggerEvent::ProcessStateChanged { state, .. } => {
                    state_changed = true;
                    if state == ProcessState::Stopped {
                        self.governor.process_stopped();
                    }
                }
                DebuggerEvent::ProcessOutput { process } => {
                    if !outputs.contains(&process) {
                        outputs.push(process);
                    }
                }
            }
        }

        if state_changed {
            self.detect_changes()?;
        }
        for process in outputs {
            self.drain_output(process)?;
        }
        self.update_ui()
    }

    /// Pull stdout and stderr into the log pane until both are empty or the governor steps in
    fn drain_output(&mut self, process: ProcessId) -> eyre::Result<()> {
        let chunk = self.governor.limits().read_chunk;
        loop {
            let mut out = String::new();
            if let Some(stdout) = self.backend.read_stdout(process, chunk) {
                out.push_str(&stdout);
            }
            if let Some(stderr) = self.backend.read_stderr(process, chunk) {
                out.push_str(&stderr);
            }
            if out.is_empty() {
                return Ok(());
            }

            let lines = self.log(&out, "")?;
            let stopped = self.backend.process_state(process) == ProcessState::Stopped;
            match self
                .governor
                .record(governor::trailing_line_len(&out), lines, stopped)
            {
                FloodAction::PassThrough => {}
                FloodAction::Halt => return Ok(()),
                FloodAction::Interrupt => {
                    self.backend
                        .interrupt(process)
                        .wrap_err("interrupting noisy process")?;
                    self.log(governor::INTERRUPT_MESSAGE, "")?;
                    return Ok(());
                }
                FloodAction::Kill => {
                    self.backend
                        .kill(process)
                        .wrap_err("killing noisy process")?;
                    self.log(governor::KILL_MESSAGE, "")?;
                    return Ok(());
                }
            }
        }
    }

    fn teardown(&mut self) {
        self.backend.terminate();
        self.set_state(WorkerState::Terminated);
        tracing::info!("worker terminated");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
