use serde::{Deserialize, Serialize};

fn default_cooling_min_cycles() -> u32 {
    3
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Ticks a candidate must spend in COOLING before returning to DORMANT.
    #[serde(default = "default_cooling_min_cycles")]
    pub cooling_min_cycles: u32,
    /// Cadence of the server's tick loop.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            cooling_min_cycles: default_cooling_min_cycles(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}
