//! Renders debugger state into the editor.
//!
//! Each pass computes what the editor should show and hands the registry or cache only the
//! difference, so an unchanged debugger costs no editor calls at all.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use eyre::WrapErr;

use crate::backend::{self, DebuggerBackend};
use crate::content::{ContentCache, split_output};
use crate::editor::EditorSurface;
use crate::markers::{MarkerKey, MarkerRegistry};
use crate::source_map::SourceMap;
use crate::types::{BreakpointId, BufferId, Pane, TargetId};

pub struct UiReconciler {
    markers: MarkerRegistry,
    content: ContentCache,
    pane_commands: BTreeMap<Pane, String>,
    /// Where the cursor was last moved to follow the selected thread
    last_jump: Option<MarkerKey>,
    buffers: HashMap<PathBuf, Option<BufferId>>,
    pane_buffers: HashMap<Pane, BufferId>,
}

impl UiReconciler {
    pub fn new(pane_commands: BTreeMap<Pane, String>) -> Self {
        Self {
            markers: MarkerRegistry::new(),
            content: ContentCache::default(),
            pane_commands,
            last_jump: None,
            buffers: HashMap::new(),
            pane_buffers: HashMap::new(),
        }
    }

    pub fn markers(&self) -> &MarkerRegistry {
        &self.markers
    }

    pub fn pane_command(&self, pane: Pane) -> Option<&str> {
        self.pane_commands.get(&pane).map(String::as_str)
    }

    /// Change the query behind a pane. The next pane pass rewrites it.
    pub fn set_pane_command(&mut self, pane: Pane, command: impl Into<String>) {
        self.pane_commands.insert(pane, command.into());
        self.content.invalidate(pane);
    }

    /// Forget looked-up source buffers, e.g. because a new target may map paths differently
    pub fn forget_buffers(&mut self) {
        self.buffers.clear();
    }

    /// Forget paths the editor had no buffer for, so they are looked up again
    pub fn forget_missing_buffers(&mut self) {
        self.buffers.retain(|_, buffer| buffer.is_some());
    }

    /// Bring markers and panes up to date with the debugger
    pub fn update(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        editor: &mut dyn EditorSurface,
        target: Option<TargetId>,
    ) -> eyre::Result<()> {
        let target = target.filter(|t| backend.target_is_valid(*t));
        let source_map = match target {
            Some(_) => load_source_map(backend),
            None => SourceMap::default(),
        };
        self.update_program_counters(backend, editor, target, &source_map)
            .wrap_err("updating program counters")?;
        self.update_breakpoints(backend, editor, target, &source_map)
            .wrap_err("updating breakpoints")?;
        self.update_panes(backend, editor, target)
            .wrap_err("updating panes")?;
        Ok(())
    }

    fn update_program_counters(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        editor: &mut dyn EditorSurface,
        target: Option<TargetId>,
        source_map: &SourceMap,
    ) -> eyre::Result<()> {
        let process = target
            .and_then(|t| backend.target_process(t))
            .filter(|p| backend.process_is_valid(*p) && backend.process_state(*p).is_alive());

        let mut wanted = BTreeMap::new();
        if let Some(process) = process {
            let selected_thread = backend.selected_thread(process);
            for thread in backend.threads(process) {
                let Some(location) = thread.pc_location() else {
                    continue;
                };
                tracing::trace!(thread = thread.index_id, ?location, "program counter");
                let Some(buffer) = self.buffer_for(editor, &source_map.apply(&location.path))?
                else {
                    continue;
                };
                let selected = selected_thread == Some(thread.index_id);
                let key = MarkerKey::new(buffer, location.line);
                // two threads on one line: the selected one decides the style
                let entry = wanted.entry(key).or_insert(false);
                *entry |= selected;
            }
        }

        match self.markers.sync_program_counters(editor, &wanted)? {
            Some((key, id)) => {
                if self.last_jump != Some(key) {
                    tracing::debug!(
                        buffer = %key.buffer,
                        line = key.line,
                        "jumping to program counter"
                    );
                    editor
                        .jump_to_marker(key.buffer, id)
                        .wrap_err("jumping to program counter")?;
                    self.last_jump = Some(key);
                }
            }
            None => self.last_jump = None,
        }
        Ok(())
    }

    fn update_breakpoints(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        editor: &mut dyn EditorSurface,
        target: Option<TargetId>,
        source_map: &SourceMap,
    ) -> eyre::Result<()> {
        let mut wanted: BTreeMap<MarkerKey, Vec<BreakpointId>> = BTreeMap::new();
        if let Some(target) = target {
            for breakpoint in backend.breakpoints(target) {
                for location in breakpoint.locations.iter().filter(|l| l.line > 0) {
                    let Some(buffer) =
                        self.buffer_for(editor, &source_map.apply(&location.path))?
                    else {
                        continue;
                    };
                    wanted
                        .entry(MarkerKey::new(buffer, location.line))
                        .or_default()
                        .push(breakpoint.id);
                }
            }
        }
        self.markers.sync_breakpoints(editor, wanted)
    }

    fn update_panes(
        &mut self,
        backend: &mut dyn DebuggerBackend,
        editor: &mut dyn EditorSurface,
        target: Option<TargetId>,
    ) -> eyre::Result<()> {
        let status = backend::process_status(backend, target);
        for pane in Pane::QUERY_PANES {
            let Some(command) = self.pane_commands.get(&pane) else {
                continue;
            };
            let result = backend.query(command);
            let text = if !result.success && !status.is_empty() {
                status.as_str()
            } else {
                result.output.as_str()
            };
            let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
            if self.content.is_current(pane, &lines) {
                continue;
            }
            let buffer = self.pane_buffer(editor, pane)?;
            editor
                .replace_lines(buffer, &lines)
                .wrap_err_with(|| format!("writing {pane} pane"))?;
            self.content.store(pane, lines);
        }
        Ok(())
    }

    /// Append text to the log pane. Returns the number of lines completed.
    pub fn append_log(
        &mut self,
        editor: &mut dyn EditorSurface,
        text: &str,
        prefix: &str,
    ) -> eyre::Result<usize> {
        if text.is_empty() {
            return Ok(0);
        }
        let lines = split_output(text, prefix);
        let buffer = self.pane_buffer(editor, Pane::Logs)?;
        editor
            .append_lines(buffer, &lines)
            .wrap_err("appending to log pane")?;
        Ok(lines.len() - 1)
    }

    /// Breakpoints whose markers sit on a buffer line
    pub fn breakpoints_at(&self, buffer: BufferId, line: u32) -> Vec<BreakpointId> {
        self.markers
            .breakpoint_handles(MarkerKey::new(buffer, line))
            .to_vec()
    }

    fn buffer_for(
        &mut self,
        editor: &mut dyn EditorSurface,
        path: &Path,
    ) -> eyre::Result<Option<BufferId>> {
        if let Some(buffer) = self.buffers.get(path) {
            return Ok(*buffer);
        }
        let buffer = editor
            .buffer_for_path(path)
            .wrap_err_with(|| format!("getting buffer for {}", path.display()))?;
        self.buffers.insert(path.to_path_buf(), buffer);
        Ok(buffer)
    }

    fn pane_buffer(
        &mut self,
        editor: &mut dyn EditorSurface,
        pane: Pane,
    ) -> eyre::Result<BufferId> {
        if let Some(buffer) = self.pane_buffers.get(&pane) {
            return Ok(*buffer);
        }
        let buffer = editor
            .pane_buffer(pane)
            .wrap_err_with(|| format!("getting buffer for {pane} pane"))?;
        self.pane_buffers.insert(pane, buffer);
        Ok(buffer)
    }
}

fn load_source_map(backend: &mut dyn DebuggerBackend) -> SourceMap {
    let output = backend.query(SourceMap::QUERY);
    if !output.success {
        return SourceMap::default();
    }
    SourceMap::parse(&output.output)
}
