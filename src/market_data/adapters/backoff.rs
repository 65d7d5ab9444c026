use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Reconnect delays for an adapter session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { initial_delay_ms: 500, max_delay_ms: 30_000, multiplier: 2.0 }
    }
}

/// Exponential backoff with up to 20% jitter, capped at `max_delay_ms`.
#[derive(Debug)]
pub struct Backoff {
    config: ReconnectConfig,
    current_ms: u64,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_ms = config.initial_delay_ms;
        Self { config, current_ms, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current_ms = self.config.initial_delay_ms;
        self.attempts = 0;
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_ms;
        let jitter_range = base / 5;
        let jitter = if jitter_range == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_range) };

        let next = (self.current_ms as f64 * self.config.multiplier) as u64;
        self.current_ms = next.min(self.config.max_delay_ms);
        self.attempts += 1;

        Duration::from_millis((base + jitter).min(self.config.max_delay_ms))
    }
}
