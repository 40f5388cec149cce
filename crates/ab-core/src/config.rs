use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RESPONSE;

/// Limits and switches for one bot. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Deepest chain of nested self-matches before the recursion sentinel.
    pub max_recursion_depth: usize,
    /// Total self-matches allowed while answering one sentence.
    pub max_recursion_count: usize,
    /// Iterations a looping condition may run.
    pub max_loops: usize,
    /// Capacity of every session history.
    pub max_history: usize,
    /// Identical consecutive inputs that count as repetition. 0 disables it.
    pub repetition_count: usize,
    /// Interned query tuples kept before the oldest are evicted.
    pub max_tuples: usize,
    /// Always choose the first `<random>` alternative.
    pub qa_test_mode: bool,
    /// Store categories with `that` and `topic` of `*` as shortcut leaves.
    pub enable_shortcuts: bool,
    /// Record each input that matched a category.
    pub track_matches: bool,
    /// Allow `<sraix>` to reach the external service.
    pub network_enabled: bool,
    /// Upper bound on one external-service call.
    pub service_timeout_ms: u64,
    /// Reply when nothing matches.
    pub default_response: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 128,
            max_recursion_count: 2048,
            max_loops: 100,
            max_history: 32,
            repetition_count: 2,
            max_tuples: 10_000,
            qa_test_mode: false,
            enable_shortcuts: true,
            track_matches: false,
            network_enabled: false,
            service_timeout_ms: 5_000,
            default_response: DEFAULT_RESPONSE.to_string(),
        }
    }
}

impl BotConfig {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }
}
