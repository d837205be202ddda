//! Session file handling
//!
//! A session file describes named debugging *modes*. Each mode has an ordered list of actions
//! to run when the mode is entered (`setup`) and when it is left (`teardown`). The file is JSON
//! with comments allowed:
//!
//! ```jsonc
//! {
//!     "modes": {
//!         // build then load the program
//!         "debug": {
//!             "setup": [["sh", "make ab"], ["lldb", "target create ab"], ["bp", "ab.c:19"]],
//!             "teardown": [["lldb", "target delete"]]
//!         }
//!     }
//! }
//! ```

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use eyre::Context;
use serde::Deserialize;

/// File name searched for by [`find_session_file`]
pub const SESSION_FILE_NAME: &str = "debug-bridge.json";

/// A single step of a mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(String, String)")]
pub enum Action {
    /// Run a shell command, tagged `sh`
    Shell(String),
    /// Set a breakpoint at a file and line, tagged `bp` with a `file:line` value
    Breakpoint { path: PathBuf, line: u32 },
    /// Run a debugger command, tagged `lldb`
    Debugger(String),
}

impl TryFrom<(String, String)> for Action {
    type Error = eyre::Report;

    fn try_from((tag, value): (String, String)) -> Result<Self, Self::Error> {
        match tag.as_str() {
            "sh" => Ok(Action::Shell(value)),
            "lldb" => Ok(Action::Debugger(value)),
            "bp" => {
                let (path, line) = value
                    .rsplit_once(':')
                    .ok_or_else(|| {
                        eyre::eyre!("breakpoint `{value}` is not of the form file:line")
                    })?;
                let line = line
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid line number in breakpoint `{value}`"))?;
                Ok(Action::Breakpoint {
                    path: PathBuf::from(path),
                    line,
                })
            }
            other => eyre::bail!("unknown action tag `{other}`"),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Shell(command) => write!(f, "sh: {command}"),
            Action::Breakpoint { path, line } => write!(f, "bp: {}:{line}", path.display()),
            Action::Debugger(command) => write!(f, "lldb: {command}"),
        }
    }
}

/// Actions run when entering and leaving a mode
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Mode {
    #[serde(default)]
    pub setup: Vec<Action>,
    #[serde(default)]
    pub teardown: Vec<Action>,
}

/// Deserializable model for the session file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(default)]
    modes: BTreeMap<String, Mode>,
}

impl Session {
    pub fn mode(&self, name: &str) -> Option<&Mode> {
        self.modes.get(name)
    }

    /// Mode names in sorted order
    pub fn mode_names(&self) -> Vec<String> {
        self.modes.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Make relative breakpoint paths relative to `root` (usually the session file directory)
    pub fn resolve(&mut self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        for mode in self.modes.values_mut() {
            for action in mode.setup.iter_mut().chain(mode.teardown.iter_mut()) {
                if let Action::Breakpoint { path, .. } = action {
                    if path.is_relative() {
                        *path = root.join(&*path);
                    }
                }
            }
        }
    }
}

pub fn load(mut r: impl std::io::Read) -> eyre::Result<Session> {
    let mut contents = String::new();
    r.read_to_string(&mut contents)
        .wrap_err("reading session contents")?;
    from_str(&contents)
}

pub fn from_str(contents: &str) -> eyre::Result<Session> {
    let value = jsonc_parser::parse_to_serde_value(contents, &Default::default())
        .wrap_err("parsing jsonc session file")?;
    let Some(value) = value else {
        return Ok(Session::default());
    };
    let session = serde_json::from_value(value).wrap_err("deserializing session")?;
    Ok(session)
}

/// Load a session file, resolving relative breakpoint paths against its directory
pub fn load_from_path(path: impl AsRef<Path>) -> eyre::Result<Session> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening session file {}", path.display()))?;
    let mut session = load(f).context("loading session from given path")?;
    if let Some(root) = path.parent() {
        session.resolve(root);
    }
    tracing::debug!(path = %path.display(), modes = ?session.mode_names(), "loaded session");
    Ok(session)
}

/// Search `start` and its ancestors for a [`SESSION_FILE_NAME`] file
pub fn find_session_file(start: impl AsRef<Path>) -> Option<PathBuf> {
    start
        .as_ref()
        .ancestors()
        .map(|dir| dir.join(SESSION_FILE_NAME))
        .find(|candidate| candidate.is_file())
}
