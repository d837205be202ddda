//! The editor seam.
//!
//! Every method is a remote procedure on the editor (neovim over msgpack-rpc in practice). The
//! worker thread owns the surface; nothing here is called from the editor's own thread.

use std::path::{Path, PathBuf};

use crate::types::{BufferId, MarkerId, Pane, Severity};

/// How a marker is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerStyle {
    Breakpoint,
    PcSelected,
    PcUnselected,
}

impl MarkerStyle {
    /// Name of the sign definition on the editor side
    pub fn sign_name(self) -> &'static str {
        match self {
            MarkerStyle::Breakpoint => "llsign_bpres",
            MarkerStyle::PcSelected => "llsign_pcsel",
            MarkerStyle::PcUnselected => "llsign_pcunsel",
        }
    }
}

pub trait EditorSurface: Send {
    /// Get or create the buffer for a source file. `None` if the file cannot be shown.
    fn buffer_for_path(&mut self, path: &Path) -> eyre::Result<Option<BufferId>>;

    fn buffer_name(&mut self, buffer: BufferId) -> eyre::Result<Option<PathBuf>>;

    /// Get or create the read-only buffer backing a pane
    fn pane_buffer(&mut self, pane: Pane) -> eyre::Result<BufferId>;

    /// Replace the whole content of a read-only buffer
    fn replace_lines(&mut self, buffer: BufferId, lines: &[String]) -> eyre::Result<()>;

    /// Append to a read-only buffer. The first line continues the buffer's current last line.
    fn append_lines(&mut self, buffer: BufferId, lines: &[String]) -> eyre::Result<()>;

    fn place_marker(
        &mut self,
        id: MarkerId,
        style: MarkerStyle,
        buffer: BufferId,
        line: u32,
    ) -> eyre::Result<()>;

    fn unplace_marker(&mut self, id: MarkerId) -> eyre::Result<()>;

    /// Move the cursor to a placed marker. The only call that changes editor focus.
    fn jump_to_marker(&mut self, buffer: BufferId, id: MarkerId) -> eyre::Result<()>;

    /// Make a pane visible
    fn open_pane(&mut self, pane: Pane) -> eyre::Result<()>;

    fn status(&mut self, message: &str, severity: Severity) -> eyre::Result<()>;
}
