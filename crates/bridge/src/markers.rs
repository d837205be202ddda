//! Breakpoint and program counter markers placed in source buffers.
//!
//! The registry remembers every marker it has placed so that reconciliation can be expressed as
//! "make the editor look like this" and only the difference reaches the editor.

use std::collections::BTreeMap;

use eyre::WrapErr;

use crate::editor::{EditorSurface, MarkerStyle};
use crate::types::{BreakpointId, BufferId, MarkerId};

/// First id handed out. Low ids are left to signs the user or other plugins place.
const FIRST_MARKER_ID: u32 = 257;

/// A cell in the editor that can carry markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerKey {
    pub buffer: BufferId,
    pub line: u32,
}

impl MarkerKey {
    pub fn new(buffer: BufferId, line: u32) -> Self {
        Self { buffer, line }
    }
}

#[derive(Debug)]
struct Marker {
    id: MarkerId,
    style: MarkerStyle,
    shown: bool,
}

impl Marker {
    fn show(&mut self, editor: &mut dyn EditorSurface, key: MarkerKey) -> eyre::Result<()> {
        if self.shown {
            return Ok(());
        }
        editor
            .place_marker(self.id, self.style, key.buffer, key.line)
            .wrap_err_with(|| {
                format!("placing marker {} at {}:{}", self.id, key.buffer, key.line)
            })?;
        self.shown = true;
        Ok(())
    }

    fn hide(&mut self, editor: &mut dyn EditorSurface) -> eyre::Result<()> {
        if !self.shown {
            return Ok(());
        }
        editor
            .unplace_marker(self.id)
            .wrap_err_with(|| format!("removing marker {}", self.id))?;
        self.shown = false;
        Ok(())
    }
}

#[derive(Debug)]
struct BreakpointMarker {
    marker: Marker,
    breakpoints: Vec<BreakpointId>,
}

#[derive(Debug, Default)]
pub struct MarkerRegistry {
    next_id: u32,
    program_counters: BTreeMap<MarkerKey, Marker>,
    breakpoints: BTreeMap<MarkerKey, BreakpointMarker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_MARKER_ID,
            ..Default::default()
        }
    }

    fn allocate(&mut self) -> MarkerId {
        // `Default` leaves next_id at zero
        let id = self.next_id.max(FIRST_MARKER_ID);
        self.next_id = id + 1;
        MarkerId(id)
    }

    /// Make the program counter markers match `wanted` (cell → is the selected thread).
    ///
    /// Returns the cell and id of the selected marker, if any.
    pub fn sync_program_counters(
        &mut self,
        editor: &mut dyn EditorSurface,
        wanted: &BTreeMap<MarkerKey, bool>,
    ) -> eyre::Result<Option<(MarkerKey, MarkerId)>> {
        let stale: Vec<MarkerKey> = self
            .program_counters
            .keys()
            .filter(|key| !wanted.contains_key(key))
            .copied()
            .collect();
        for key in stale {
            if let Some(mut marker) = self.program_counters.remove(&key) {
                marker.hide(editor)?;
            }
        }

        let mut selected_marker = None;
        for (&key, &selected) in wanted {
            let style = if selected {
                MarkerStyle::PcSelected
            } else {
                MarkerStyle::PcUnselected
            };
            let id = match self.program_counters.get_mut(&key) {
                Some(marker) => {
                    if marker.style != style {
                        // placing an existing id again replaces its sign
                        marker.style = style;
                        marker.shown = false;
                    }
                    marker.show(editor, key)?;
                    marker.id
                }
                None => {
                    let mut marker = Marker {
                        id: self.allocate(),
                        style,
                        shown: false,
                    };
                    marker.show(editor, key)?;
                    let id = marker.id;
                    self.program_counters.insert(key, marker);
                    id
                }
            };
            if selected {
                selected_marker = Some((key, id));
            }
        }

        self.apply_yield(editor)?;
        Ok(selected_marker)
    }

    /// Make the breakpoint markers match `wanted` (cell → breakpoints resolving to it).
    ///
    /// Markers that already exist keep their identity and visibility.
    pub fn sync_breakpoints(
        &mut self,
        editor: &mut dyn EditorSurface,
        wanted: BTreeMap<MarkerKey, Vec<BreakpointId>>,
    ) -> eyre::Result<()> {
        let stale: Vec<MarkerKey> = self
            .breakpoints
            .keys()
            .filter(|key| !wanted.contains_key(key))
            .copied()
            .collect();
        for key in stale {
            if let Some(mut entry) = self.breakpoints.remove(&key) {
                entry.marker.hide(editor)?;
            }
        }

        for (key, mut handles) in wanted {
            handles.sort();
            handles.dedup();
            match self.breakpoints.get_mut(&key) {
                Some(entry) => entry.breakpoints = handles,
                None => {
                    let marker = Marker {
                        id: self.allocate(),
                        style: MarkerStyle::Breakpoint,
                        shown: false,
                    };
                    self.breakpoints.insert(
                        key,
                        BreakpointMarker {
                            marker,
                            breakpoints: handles,
                        },
                    );
                }
            }
        }

        self.apply_yield(editor)
    }

    /// A breakpoint marker is visible exactly when no program counter marker shares its cell.
    fn apply_yield(&mut self, editor: &mut dyn EditorSurface) -> eyre::Result<()> {
        for (key, entry) in self.breakpoints.iter_mut() {
            if self.program_counters.contains_key(key) {
                entry.marker.hide(editor)?;
            } else {
                entry.marker.show(editor, *key)?;
            }
        }
        Ok(())
    }

    /// Every breakpoint that resolved to `key`
    pub fn breakpoint_handles(&self, key: MarkerKey) -> &[BreakpointId] {
        self.breakpoints
            .get(&key)
            .map(|entry| entry.breakpoints.as_slice())
            .unwrap_or_default()
    }

    pub fn breakpoint_marker(&self, key: MarkerKey) -> Option<MarkerId> {
        self.breakpoints.get(&key).map(|entry| entry.marker.id)
    }

    pub fn breakpoint_visible(&self, key: MarkerKey) -> bool {
        self.breakpoints
            .get(&key)
            .is_some_and(|entry| entry.marker.shown)
    }

    pub fn program_counter_marker(&self, key: MarkerKey) -> Option<MarkerId> {
        self.program_counters.get(&key).map(|marker| marker.id)
    }

    pub fn num_program_counters(&self) -> usize {
        self.program_counters.len()
    }

    pub fn num_breakpoint_markers(&self) -> usize {
        self.breakpoints.len()
    }
}
