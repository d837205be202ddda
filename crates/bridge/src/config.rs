use std::{collections::BTreeMap, path::Path, time::Duration};

use eyre::WrapErr;
use serde::Deserialize;

use crate::governor::FloodLimits;
use crate::types::Pane;

const MIN_QUEUE_CAPACITY: usize = 2;
const MIN_IDLE_TIMEOUT_MS: u64 = 100;

/// Tunables for the bridge, read from `<config dir>/debug-bridge/config.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Longest single wait of the worker loop
    pub idle_timeout_ms: u64,
    /// Consecutive idle timeouts after which the wait primitive is considered broken, provided
    /// that much idle time really passed
    pub max_idle_timeouts: u64,
    pub request_queue_capacity: usize,
    pub flood: FloodLimits,
    /// Debugger query run for each pane
    pub panes: BTreeMap<Pane, String>,
    pub complete_timeout_ms: u64,
    pub modes_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
            // two months of idle timeouts
            max_idle_timeouts: 172_800,
            request_queue_capacity: MIN_QUEUE_CAPACITY,
            flood: FloodLimits::default(),
            panes: default_panes(),
            complete_timeout_ms: 3_000,
            modes_timeout_ms: 1_000,
        }
    }
}

fn default_panes() -> BTreeMap<Pane, String> {
    Pane::QUERY_PANES
        .into_iter()
        .filter_map(|pane| Some((pane, pane.default_query()?.to_string())))
        .collect()
}

impl BridgeConfig {
    pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path)
            .wrap_err_with(|| format!("opening config file {}", path.display()))?;
        let config: BridgeConfig = serde_json::from_reader(f).wrap_err("parsing config file")?;
        Ok(config.normalised())
    }

    /// Load the user's config file, or the defaults if there is none
    pub fn load_default() -> eyre::Result<Self> {
        let Some(path) = dirs::config_dir().map(|d| d.join("debug-bridge").join("config.json"))
        else {
            return Ok(Self::default());
        };
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Enforce minimums and fill in panes the user did not configure
    pub fn normalised(mut self) -> Self {
        if self.request_queue_capacity < MIN_QUEUE_CAPACITY {
            tracing::warn!(
                capacity = self.request_queue_capacity,
                "request queue capacity too small, using {MIN_QUEUE_CAPACITY}"
            );
            self.request_queue_capacity = MIN_QUEUE_CAPACITY;
        }
        if self.idle_timeout_ms < MIN_IDLE_TIMEOUT_MS {
            tracing::warn!(
                idle_timeout_ms = self.idle_timeout_ms,
                "idle timeout too small, using {MIN_IDLE_TIMEOUT_MS}ms"
            );
            self.idle_timeout_ms = MIN_IDLE_TIMEOUT_MS;
        }
        self.panes.remove(&Pane::Logs);
        for (pane, query) in default_panes() {
            self.panes.entry(pane).or_insert(query);
        }
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Wall-clock idleness the stale-loop guard requires before giving up
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.saturating_mul(self.max_idle_timeouts))
    }

    pub fn complete_timeout(&self) -> Duration {
        Duration::from_millis(self.complete_timeout_ms)
    }

    pub fn modes_timeout(&self) -> Duration {
        Duration::from_millis(self.modes_timeout_ms)
    }
}
