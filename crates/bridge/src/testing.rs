//! In-memory stand-ins for the debugger and the editor.
//!
//! [`FakeDebugger`] understands a small subset of LLDB's command language, enough to create a
//! target, set breakpoints, launch a process that stops at the first breakpoint and produce
//! output. [`RecordingEditor`] records every call made to it and keeps virtual buffers so tests
//! can inspect what the user would see.
//!
//! Both hand out a handle sharing their state, so a test can drive or inspect them after they
//! have been moved into the worker thread.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::backend::{DebuggerBackend, DebuggerEvent, EventSink};
use crate::editor::{EditorSurface, MarkerStyle};
use crate::types::{
    BreakpointId, BreakpointInfo, BufferId, CommandOutput, FrameInfo, MarkerId, Pane, ProcessId,
    ProcessState, Severity, SourceLocation, TargetId, ThreadInfo,
};

const COMMANDS: &[&str] = &[
    "breakpoint",
    "bt",
    "continue",
    "disassemble",
    "frame",
    "help",
    "process",
    "register",
    "settings",
    "target",
    "thread",
];

#[derive(Debug)]
struct FakeProcess {
    id: ProcessId,
    state: ProcessState,
    stdout: String,
    stderr: String,
    /// Thread index id → location of its innermost frame
    threads: BTreeMap<u32, Option<SourceLocation>>,
    selected_thread: u32,
    selected_frame: usize,
    exit_status: Option<i32>,
    stdin: String,
    /// Events produced before anyone subscribed
    pending: Vec<DebuggerEvent>,
    sink: Option<EventSink>,
}

impl FakeProcess {
    fn notify(&mut self, event: DebuggerEvent) {
        match &self.sink {
            Some(sink) => {
                let _ = sink.send(event);
            }
            None => self.pending.push(event),
        }
    }

    fn set_state(&mut self, state: ProcessState) {
        self.state = state;
        let process = self.id;
        self.notify(DebuggerEvent::ProcessStateChanged { process, state });
    }

    fn write_stdout(&mut self, text: &str) {
        self.stdout.push_str(text);
        let process = self.id;
        self.notify(DebuggerEvent::ProcessOutput { process });
    }
}

#[derive(Debug, Default)]
struct FakeWorld {
    next_id: u64,
    next_breakpoint: u32,
    target: Option<(TargetId, PathBuf)>,
    extra_targets: usize,
    breakpoints: Vec<BreakpointInfo>,
    process: Option<FakeProcess>,
    target_sink: Option<EventSink>,
    source_map: Vec<(String, String)>,
    launch_stdout: String,
    ignore_interrupts: bool,
    history: Vec<String>,
    target_subscriptions: usize,
    process_subscriptions: usize,
    interrupts: usize,
    kills: usize,
    terminated: bool,
}

impl FakeWorld {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn run(&mut self, command: &str) -> CommandOutput {
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["target", "create", path] => self.create_target(path),
            ["target", "delete"] => self.delete_target(),
            ["breakpoint", "set", "-f", path, "-l", line] => match line.parse() {
                Ok(line) => self.set_breakpoint(Path::new(path), line),
                Err(_) => CommandOutput::failed(format!("error: invalid line number: {line}")),
            },
            ["breakpoint", "delete", ids @ ..] => self.delete_breakpoints(ids),
            ["breakpoint", "list"] => self.list_breakpoints(),
            ["process", "launch"] | ["run"] | ["r"] => self.launch(),
            ["process", "kill"] | ["kill"] => self.kill_process(),
            ["process", "interrupt"] => self.interrupt_process(),
            ["process", "continue"] | ["continue"] | ["c"] => self.resume(),
            ["thread", "select", index] => self.select_thread(index),
            ["frame", "select", index] => self.select_frame(index),
            ["bt"] | ["bt", "all"] => self.backtrace(words.len() == 2),
            ["thread", "list"] => self.with_stopped(|p| {
                let mut out = format!("Process {} stopped\n", p.id.0);
                for (index, location) in &p.threads {
                    let marker = if *index == p.selected_thread { '*' } else { ' ' };
                    out.push_str(&format!("{marker} thread #{index}: {}\n", describe(location)));
                }
                out
            }),
            ["frame", "variable"] => self.with_stopped(|_| "(int) x = 1\n".to_string()),
            ["register", "read"] => self.with_stopped(|_| {
                "General Purpose Registers:\n  rip = 0x100000f50\n".to_string()
            }),
            ["disassemble", ..] => self.with_stopped(|_| {
                "a.out`main:\n->  0x100000f50 <+0>: pushq  %rbp\n".to_string()
            }),
            ["settings", "set", "target.source-map", from, to] => {
                self.source_map.push((from.to_string(), to.to_string()));
                CommandOutput::ok("")
            }
            ["settings", "show", "target.source-map"] => {
                let mut out = "target.source-map (path-map) =\n".to_string();
                for (i, (from, to)) in self.source_map.iter().enumerate() {
                    out.push_str(&format!("[{i}] \"{from}\" -> \"{to}\"\n"));
                }
                CommandOutput::ok(out)
            }
            ["help", ..] => CommandOutput::ok(
                "Debugger commands:\n  breakpoint -- Commands for operating on breakpoints.\n",
            ),
            _ => CommandOutput::failed(format!("error: '{command}' is not a valid command.\n")),
        }
    }

    fn create_target(&mut self, path: &str) -> CommandOutput {
        if self.target.is_some() {
            self.extra_targets += 1;
        } else {
            let id = TargetId(self.allocate());
            self.target = Some((id, PathBuf::from(path)));
        }
        CommandOutput::ok(format!("Current executable set to '{path}' (x86_64).\n"))
    }

    fn delete_target(&mut self) -> CommandOutput {
        if self.target.take().is_none() {
            return CommandOutput::failed("error: no targets to delete\n");
        }
        self.breakpoints.clear();
        self.process = None;
        self.target_sink = None;
        CommandOutput::ok("1 targets deleted.\n")
    }

    fn notify_breakpoints(&mut self) {
        if let (Some(sink), Some((target, _))) = (&self.target_sink, &self.target) {
            let _ = sink.send(DebuggerEvent::BreakpointsChanged { target: *target });
        }
    }

    fn set_breakpoint(&mut self, path: &Path, line: u32) -> CommandOutput {
        if self.target.is_none() {
            return CommandOutput::failed(
                "error: invalid target, create a target using the 'target create' command\n",
            );
        }
        self.next_breakpoint += 1;
        let id = BreakpointId(self.next_breakpoint);
        self.breakpoints.push(BreakpointInfo {
            id,
            locations: vec![SourceLocation::new(path, line)],
        });
        self.notify_breakpoints();
        CommandOutput::ok(format!(
            "Breakpoint {id}: where = a.out`main + 4 at {}:{line}, address = 0x100000f54\n",
            path.display()
        ))
    }

    fn delete_breakpoints(&mut self, ids: &[&str]) -> CommandOutput {
        let mut deleted = 0;
        for id in ids {
            let Ok(id) = id.parse().map(BreakpointId) else {
                return CommandOutput::failed(format!("error: invalid breakpoint id: {id}\n"));
            };
            let before = self.breakpoints.len();
            self.breakpoints.retain(|bp| bp.id != id);
            if self.breakpoints.len() == before {
                return CommandOutput::failed(format!("error: no breakpoint with id {id}\n"));
            }
            deleted += 1;
        }
        self.notify_breakpoints();
        CommandOutput::ok(format!(
            "{deleted} breakpoints deleted; 0 breakpoint locations disabled.\n"
        ))
    }

    fn list_breakpoints(&self) -> CommandOutput {
        if self.target.is_none() {
            return CommandOutput::failed("error: invalid target\n");
        }
        if self.breakpoints.is_empty() {
            return CommandOutput::ok("No breakpoints currently set.");
        }
        let mut out = "Current breakpoints:".to_string();
        for bp in &self.breakpoints {
            for location in &bp.locations {
                out.push_str(&format!(
                    "\n{}: file = '{}', line = {}, exact_match = 0, locations = 1",
                    bp.id,
                    location.path.display(),
                    location.line
                ));
            }
        }
        CommandOutput::ok(out)
    }

    fn launch(&mut self) -> CommandOutput {
        let Some((_, path)) = &self.target else {
            return CommandOutput::failed("error: invalid target\n");
        };
        let path = path.clone();
        let id = ProcessId(self.allocate());
        let stop = self
            .breakpoints
            .iter()
            .find_map(|bp| bp.locations.first())
            .cloned();
        let mut process = FakeProcess {
            id,
            state: ProcessState::Launching,
            stdout: String::new(),
            stderr: String::new(),
            threads: BTreeMap::from([(1, stop.clone())]),
            selected_thread: 1,
            selected_frame: 0,
            exit_status: None,
            stdin: String::new(),
            pending: Vec::new(),
            sink: None,
        };
        let launch_stdout = self.launch_stdout.clone();
        if !launch_stdout.is_empty() {
            process.write_stdout(&launch_stdout);
        }
        process.set_state(if stop.is_some() {
            ProcessState::Stopped
        } else {
            ProcessState::Running
        });
        self.process = Some(process);
        CommandOutput::ok(format!(
            "Process {} launched: '{}' (x86_64)\n",
            id.0,
            path.display()
        ))
    }

    fn kill_process(&mut self) -> CommandOutput {
        match self.process.take() {
            Some(process) => {
                self.kills += 1;
                CommandOutput::ok(format!(
                    "Process {} exited with status = 9 (0x00000009)\n",
                    process.id.0
                ))
            }
            None => CommandOutput::failed("error: Process must be launched.\n"),
        }
    }

    fn interrupt_process(&mut self) -> CommandOutput {
        self.interrupts += 1;
        let ignore = self.ignore_interrupts;
        match self.process.as_mut() {
            Some(process) if process.state == ProcessState::Running => {
                if !ignore {
                    process.set_state(ProcessState::Stopped);
                }
                CommandOutput::ok("")
            }
            Some(_) => CommandOutput::failed("error: Process is not running.\n"),
            None => CommandOutput::failed("error: Process must be launched.\n"),
        }
    }

    fn resume(&mut self) -> CommandOutput {
        match self.process.as_mut() {
            Some(process) if process.state == ProcessState::Stopped => {
                process.set_state(ProcessState::Running);
                CommandOutput::ok(format!("Process {} resuming\n", process.id.0))
            }
            Some(_) => CommandOutput::failed("error: Process is running.\n"),
            None => CommandOutput::failed("error: Process must be launched.\n"),
        }
    }

    fn select_thread(&mut self, index: &str) -> CommandOutput {
        let Some(process) = self.process.as_mut() else {
            return CommandOutput::failed("error: invalid process\n");
        };
        match index.parse() {
            Ok(index) if process.threads.contains_key(&index) => {
                process.selected_thread = index;
                process.selected_frame = 0;
                CommandOutput::ok(format!("* thread #{index}\n"))
            }
            _ => CommandOutput::failed(format!("error: invalid thread #{index}.\n")),
        }
    }

    fn select_frame(&mut self, index: &str) -> CommandOutput {
        let Some(process) = self.process.as_mut() else {
            return CommandOutput::failed("error: invalid process\n");
        };
        match index.parse() {
            Ok(0) => {
                process.selected_frame = 0;
                CommandOutput::ok("frame #0\n")
            }
            _ => CommandOutput::failed(format!("error: Frame index ({index}) out of range.\n")),
        }
    }

    fn backtrace(&self, all: bool) -> CommandOutput {
        self.with_stopped(|p| {
            let mut out = String::new();
            for (index, location) in &p.threads {
                if !all && *index != p.selected_thread {
                    continue;
                }
                let marker = if *index == p.selected_thread { '*' } else { ' ' };
                out.push_str(&format!(
                    "{marker} thread #{index}\n  * frame #0: {}\n",
                    describe(location)
                ));
            }
            out
        })
    }

    fn with_stopped(&self, f: impl FnOnce(&FakeProcess) -> String) -> CommandOutput {
        match &self.process {
            Some(process) if process.state == ProcessState::Stopped => {
                CommandOutput::ok(f(process))
            }
            Some(_) => CommandOutput::failed("error: Process is running.\n"),
            None => CommandOutput::failed("error: invalid process\n"),
        }
    }

    fn process(&self, id: ProcessId) -> Option<&FakeProcess> {
        self.process.as_ref().filter(|p| p.id == id)
    }

    fn process_mut(&mut self, id: ProcessId) -> Option<&mut FakeProcess> {
        self.process.as_mut().filter(|p| p.id == id)
    }
}

fn describe(location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!("a.out`main at {}:{}", location.path.display(), location.line),
        None => "libsystem_kernel.dylib`__read_nocancel + 10".to_string(),
    }
}

fn lock(world: &Mutex<FakeWorld>) -> MutexGuard<'_, FakeWorld> {
    // a panicking test thread must not hide the state from the others
    world.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scripted debugger implementing [`DebuggerBackend`]
#[derive(Debug)]
pub struct FakeDebugger {
    world: Arc<Mutex<FakeWorld>>,
}

/// Test-side view of a [`FakeDebugger`]
#[derive(Debug, Clone)]
pub struct FakeHandle {
    world: Arc<Mutex<FakeWorld>>,
}

impl FakeDebugger {
    pub fn new() -> (Self, FakeHandle) {
        let world = Arc::new(Mutex::new(FakeWorld::default()));
        (
            Self {
                world: Arc::clone(&world),
            },
            FakeHandle { world },
        )
    }

    fn world(&self) -> MutexGuard<'_, FakeWorld> {
        lock(&self.world)
    }
}

impl FakeHandle {
    fn world(&self) -> MutexGuard<'_, FakeWorld> {
        lock(&self.world)
    }

    pub fn target(&self) -> Option<TargetId> {
        self.world().target.as_ref().map(|(id, _)| *id)
    }

    pub fn process(&self) -> Option<ProcessId> {
        self.world().process.as_ref().map(|p| p.id)
    }

    pub fn process_state(&self) -> Option<ProcessState> {
        self.world().process.as_ref().map(|p| p.state)
    }

    /// Create a target without telling the worker, as typed in the debugger's own console
    pub fn create_target(&self, path: &str) {
        self.world().create_target(path);
    }

    /// Make the debugger report a second target
    pub fn add_extra_target(&self) {
        self.world().extra_targets += 1;
    }

    /// Stdout the next launched process writes immediately
    pub fn set_launch_stdout(&self, text: impl Into<String>) {
        self.world().launch_stdout = text.into();
    }

    /// Keep running when interrupted
    pub fn ignore_interrupts(&self) {
        self.world().ignore_interrupts = true;
    }

    /// Write to the running process's stdout and announce it
    pub fn emit_stdout(&self, text: &str) {
        if let Some(process) = self.world().process.as_mut() {
            process.write_stdout(text);
        }
    }

    /// Move the selected thread and stop there
    pub fn stop_at(&self, path: impl Into<PathBuf>, line: u32) {
        if let Some(process) = self.world().process.as_mut() {
            let location = SourceLocation::new(path, line);
            process.threads.insert(process.selected_thread, Some(location));
            process.set_state(ProcessState::Stopped);
        }
    }

    /// Add a thread stopped at a location
    pub fn add_thread(&self, index: u32, path: impl Into<PathBuf>, line: u32) {
        if let Some(process) = self.world().process.as_mut() {
            process
                .threads
                .insert(index, Some(SourceLocation::new(path, line)));
        }
    }

    pub fn history(&self) -> Vec<String> {
        self.world().history.clone()
    }

    pub fn stdin(&self) -> String {
        self.world()
            .process
            .as_ref()
            .map(|p| p.stdin.clone())
            .unwrap_or_default()
    }

    pub fn target_subscriptions(&self) -> usize {
        self.world().target_subscriptions
    }

    pub fn process_subscriptions(&self) -> usize {
        self.world().process_subscriptions
    }

    pub fn interrupts(&self) -> usize {
        self.world().interrupts
    }

    pub fn kills(&self) -> usize {
        self.world().kills
    }

    pub fn terminated(&self) -> bool {
        self.world().terminated
    }
}

impl DebuggerBackend for FakeDebugger {
    fn execute(&mut self, command: &str) -> CommandOutput {
        let mut world = self.world();
        world.history.push(command.to_string());
        world.run(command)
    }

    fn query(&mut self, command: &str) -> CommandOutput {
        self.world().run(command)
    }

    fn complete(&mut self, line: &str, pos: usize) -> Vec<String> {
        let prefix = line.get(..pos).unwrap_or(line);
        if prefix.contains(' ') {
            return vec![String::new()];
        }
        let matches: Vec<String> = COMMANDS
            .iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| c.to_string())
            .collect();
        let common = match matches.as_slice() {
            [] => String::new(),
            [only] => format!("{} ", &only[prefix.len()..]),
            [first, rest @ ..] => {
                let mut common = first.clone();
                for m in rest {
                    while !m.starts_with(&common) {
                        common.pop();
                    }
                }
                common[prefix.len().min(common.len())..].to_string()
            }
        };
        let mut result = vec![common];
        result.extend(matches);
        result
    }

    fn num_targets(&self) -> usize {
        let world = self.world();
        usize::from(world.target.is_some()) + world.extra_targets
    }

    fn selected_target(&self) -> Option<TargetId> {
        self.world().target.as_ref().map(|(id, _)| *id)
    }

    fn target_is_valid(&self, target: TargetId) -> bool {
        self.world()
            .target
            .as_ref()
            .is_some_and(|(id, _)| *id == target)
    }

    fn target_process(&self, target: TargetId) -> Option<ProcessId> {
        let world = self.world();
        if !world.target.as_ref().is_some_and(|(id, _)| *id == target) {
            return None;
        }
        world.process.as_ref().map(|p| p.id)
    }

    fn num_breakpoints(&self, target: TargetId) -> usize {
        if self.target_is_valid(target) {
            self.world().breakpoints.len()
        } else {
            0
        }
    }

    fn breakpoints(&self, target: TargetId) -> Vec<BreakpointInfo> {
        if self.target_is_valid(target) {
            self.world().breakpoints.clone()
        } else {
            Vec::new()
        }
    }

    fn create_breakpoint(
        &mut self,
        target: TargetId,
        path: &Path,
        line: u32,
    ) -> eyre::Result<BreakpointId> {
        eyre::ensure!(self.target_is_valid(target), "invalid target");
        let mut world = self.world();
        let result = world.set_breakpoint(path, line);
        eyre::ensure!(result.success, "{}", result.output);
        world
            .breakpoints
            .last()
            .map(|bp| bp.id)
            .ok_or_else(|| eyre::eyre!("breakpoint not recorded"))
    }

    fn process_is_valid(&self, process: ProcessId) -> bool {
        self.world().process(process).is_some()
    }

    fn process_state(&self, process: ProcessId) -> ProcessState {
        self.world()
            .process(process)
            .map(|p| p.state)
            .unwrap_or(ProcessState::Invalid)
    }

    fn describe_process(&self, process: ProcessId) -> String {
        match self.world().process(process) {
            Some(p) => format!(
                "SBProcess: pid = {}, state = {}, threads = {}",
                p.id.0,
                p.state,
                p.threads.len()
            ),
            None => "No value".to_string(),
        }
    }

    fn exit_status(&self, process: ProcessId) -> Option<i32> {
        self.world().process(process).and_then(|p| p.exit_status)
    }

    fn threads(&self, process: ProcessId) -> Vec<ThreadInfo> {
        let world = self.world();
        let Some(p) = world.process(process) else {
            return Vec::new();
        };
        p.threads
            .iter()
            .map(|(index, location)| ThreadInfo {
                index_id: *index,
                selected_frame: if *index == p.selected_thread {
                    p.selected_frame
                } else {
                    0
                },
                frames: vec![FrameInfo {
                    location: location.clone(),
                }],
            })
            .collect()
    }

    fn selected_thread(&self, process: ProcessId) -> Option<u32> {
        self.world().process(process).map(|p| p.selected_thread)
    }

    fn interrupt(&mut self, process: ProcessId) -> eyre::Result<()> {
        let mut world = self.world();
        world.interrupts += 1;
        let ignore = world.ignore_interrupts;
        let p = world
            .process_mut(process)
            .ok_or_else(|| eyre::eyre!("invalid process"))?;
        if !ignore && p.state == ProcessState::Running {
            p.set_state(ProcessState::Stopped);
        }
        Ok(())
    }

    fn kill(&mut self, process: ProcessId) -> eyre::Result<()> {
        let mut world = self.world();
        let p = world
            .process_mut(process)
            .ok_or_else(|| eyre::eyre!("invalid process"))?;
        p.exit_status = Some(9);
        p.set_state(ProcessState::Exited);
        world.kills += 1;
        Ok(())
    }

    fn put_stdin(&mut self, process: ProcessId, input: &str) -> eyre::Result<()> {
        let mut world = self.world();
        let p = world
            .process_mut(process)
            .ok_or_else(|| eyre::eyre!("invalid process"))?;
        p.stdin.push_str(input);
        Ok(())
    }

    fn read_stdout(&mut self, process: ProcessId, max_bytes: usize) -> Option<String> {
        let mut world = self.world();
        let p = world.process_mut(process)?;
        take_chunk(&mut p.stdout, max_bytes)
    }

    fn read_stderr(&mut self, process: ProcessId, max_bytes: usize) -> Option<String> {
        let mut world = self.world();
        let p = world.process_mut(process)?;
        take_chunk(&mut p.stderr, max_bytes)
    }

    fn subscribe_target(&mut self, _target: TargetId, sink: EventSink) {
        let mut world = self.world();
        world.target_subscriptions += 1;
        world.target_sink = Some(sink);
    }

    fn subscribe_process(&mut self, process: ProcessId, sink: EventSink) {
        let mut world = self.world();
        world.process_subscriptions += 1;
        if let Some(p) = world.process_mut(process) {
            for event in p.pending.drain(..) {
                let _ = sink.send(event);
            }
            p.sink = Some(sink);
        }
    }

    fn terminate(&mut self) {
        let mut world = self.world();
        world.terminated = true;
        world.process = None;
        world.target = None;
    }
}

fn take_chunk(buffer: &mut String, max_bytes: usize) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }
    let mut end = max_bytes.min(buffer.len()).max(1);
    while !buffer.is_char_boundary(end) {
        end += 1;
    }
    let rest = buffer.split_off(end);
    Some(std::mem::replace(buffer, rest))
}

/// A call made to a [`RecordingEditor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCall {
    BufferForPath(PathBuf),
    ReplaceLines { buffer: BufferId, lines: Vec<String> },
    AppendLines { buffer: BufferId, lines: Vec<String> },
    PlaceMarker {
        id: MarkerId,
        style: MarkerStyle,
        buffer: BufferId,
        line: u32,
    },
    UnplaceMarker(MarkerId),
    JumpToMarker { buffer: BufferId, id: MarkerId },
    OpenPane(Pane),
    Status { message: String, severity: Severity },
}

#[derive(Debug, Default)]
struct EditorState {
    next_buffer: u64,
    calls: Vec<EditorCall>,
    files: HashMap<PathBuf, BufferId>,
    names: HashMap<BufferId, PathBuf>,
    panes: HashMap<Pane, BufferId>,
    contents: HashMap<BufferId, Vec<String>>,
    placed: BTreeMap<MarkerId, (MarkerStyle, BufferId, u32)>,
    opened: BTreeSet<Pane>,
}

impl EditorState {
    fn new_buffer(&mut self) -> BufferId {
        self.next_buffer += 1;
        let buffer = BufferId(self.next_buffer);
        // a fresh buffer holds one empty line
        self.contents.insert(buffer, vec![String::new()]);
        buffer
    }
}

/// Editor surface keeping virtual buffers and a log of every call
#[derive(Debug)]
pub struct RecordingEditor {
    state: Arc<Mutex<EditorState>>,
}

/// Test-side view of a [`RecordingEditor`]
#[derive(Debug, Clone)]
pub struct EditorHandle {
    state: Arc<Mutex<EditorState>>,
}

fn lock_editor(state: &Mutex<EditorState>) -> MutexGuard<'_, EditorState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl RecordingEditor {
    pub fn new() -> (Self, EditorHandle) {
        let state = Arc::new(Mutex::new(EditorState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            EditorHandle { state },
        )
    }

    fn state(&self) -> MutexGuard<'_, EditorState> {
        lock_editor(&self.state)
    }
}

impl EditorHandle {
    fn state(&self) -> MutexGuard<'_, EditorState> {
        lock_editor(&self.state)
    }

    /// Make a file visible to the editor, returning its buffer
    pub fn add_file(&self, path: impl Into<PathBuf>) -> BufferId {
        let path = path.into();
        let mut state = self.state();
        if let Some(buffer) = state.files.get(&path) {
            return *buffer;
        }
        let buffer = state.new_buffer();
        state.files.insert(path.clone(), buffer);
        state.names.insert(buffer, path);
        buffer
    }

    pub fn calls(&self) -> Vec<EditorCall> {
        self.state().calls.clone()
    }

    pub fn clear(&self) {
        self.state().calls.clear();
    }

    /// Marker place and unplace calls, in order
    pub fn marker_calls(&self) -> Vec<EditorCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, EditorCall::PlaceMarker { .. } | EditorCall::UnplaceMarker(_)))
            .collect()
    }

    pub fn jumps(&self) -> Vec<(BufferId, MarkerId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EditorCall::JumpToMarker { buffer, id } => Some((buffer, id)),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<(String, Severity)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EditorCall::Status { message, severity } => Some((message, severity)),
                _ => None,
            })
            .collect()
    }

    /// Number of times a path was looked up
    pub fn lookups(&self, path: &Path) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EditorCall::BufferForPath(p) if p == path))
            .count()
    }

    /// Markers currently placed: id → (style, buffer, line)
    pub fn placed(&self) -> BTreeMap<MarkerId, (MarkerStyle, BufferId, u32)> {
        self.state().placed.clone()
    }

    pub fn pane_lines(&self, pane: Pane) -> Vec<String> {
        let state = self.state();
        state
            .panes
            .get(&pane)
            .and_then(|buffer| state.contents.get(buffer))
            .cloned()
            .unwrap_or_default()
    }

    pub fn opened(&self) -> BTreeSet<Pane> {
        self.state().opened.clone()
    }
}

impl EditorSurface for RecordingEditor {
    fn buffer_for_path(&mut self, path: &Path) -> eyre::Result<Option<BufferId>> {
        let mut state = self.state();
        state.calls.push(EditorCall::BufferForPath(path.to_path_buf()));
        Ok(state.files.get(path).copied())
    }

    fn buffer_name(&mut self, buffer: BufferId) -> eyre::Result<Option<PathBuf>> {
        Ok(self.state().names.get(&buffer).cloned())
    }

    fn pane_buffer(&mut self, pane: Pane) -> eyre::Result<BufferId> {
        let mut state = self.state();
        if let Some(buffer) = state.panes.get(&pane) {
            return Ok(*buffer);
        }
        let buffer = state.new_buffer();
        state.panes.insert(pane, buffer);
        state.names.insert(buffer, PathBuf::from(format!("[lldb]{pane}")));
        Ok(buffer)
    }

    fn replace_lines(&mut self, buffer: BufferId, lines: &[String]) -> eyre::Result<()> {
        let mut state = self.state();
        state.calls.push(EditorCall::ReplaceLines {
            buffer,
            lines: lines.to_vec(),
        });
        let contents = state
            .contents
            .get_mut(&buffer)
            .ok_or_else(|| eyre::eyre!("no buffer {buffer}"))?;
        *contents = lines.to_vec();
        Ok(())
    }

    fn append_lines(&mut self, buffer: BufferId, lines: &[String]) -> eyre::Result<()> {
        let mut state = self.state();
        state.calls.push(EditorCall::AppendLines {
            buffer,
            lines: lines.to_vec(),
        });
        let contents = state
            .contents
            .get_mut(&buffer)
            .ok_or_else(|| eyre::eyre!("no buffer {buffer}"))?;
        let Some((first, rest)) = lines.split_first() else {
            return Ok(());
        };
        match contents.last_mut() {
            Some(last) => last.push_str(first),
            None => contents.push(first.clone()),
        }
        contents.extend(rest.iter().cloned());
        Ok(())
    }

    fn place_marker(
        &mut self,
        id: MarkerId,
        style: MarkerStyle,
        buffer: BufferId,
        line: u32,
    ) -> eyre::Result<()> {
        let mut state = self.state();
        state.calls.push(EditorCall::PlaceMarker {
            id,
            style,
            buffer,
            line,
        });
        state.placed.insert(id, (style, buffer, line));
        Ok(())
    }

    fn unplace_marker(&mut self, id: MarkerId) -> eyre::Result<()> {
        let mut state = self.state();
        state.calls.push(EditorCall::UnplaceMarker(id));
        state.placed.remove(&id);
        Ok(())
    }

    fn jump_to_marker(&mut self, buffer: BufferId, id: MarkerId) -> eyre::Result<()> {
        let mut state = self.state();
        eyre::ensure!(state.placed.contains_key(&id), "marker {id} is not placed");
        state.calls.push(EditorCall::JumpToMarker { buffer, id });
        Ok(())
    }

    fn open_pane(&mut self, pane: Pane) -> eyre::Result<()> {
        let mut state = self.state();
        state.calls.push(EditorCall::OpenPane(pane));
        state.opened.insert(pane);
        Ok(())
    }

    fn status(&mut self, message: &str, severity: Severity) -> eyre::Result<()> {
        self.state().calls.push(EditorCall::Status {
            message: message.to_string(),
            severity,
        });
        Ok(())
    }
}
