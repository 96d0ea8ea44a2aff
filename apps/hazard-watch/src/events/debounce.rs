use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::HazardKind;

/// Per-camera cooldown gate. One instance per worker, never shared.
#[derive(Debug, Clone)]
pub struct Debouncer {
    cooldown: Duration,
    last_emission: HashMap<HazardKind, Instant>,
}

impl Debouncer {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_emission: HashMap::new(),
        }
    }

    /// Admit `kind` at `now` if its cooldown has elapsed. The timestamp is
    /// recorded on admission, whatever happens to the event afterwards.
    pub fn admit(&mut self, kind: HazardKind, now: Instant) -> bool {
        if let Some(last) = self.last_emission.get(&kind) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }

        // Monotonic per kind even if a caller hands in an older instant
        let stamp = match self.last_emission.get(&kind) {
            Some(last) if *last > now => *last,
            _ => now,
        };
        self.last_emission.insert(kind, stamp);
        true
    }

    pub fn last_emission(&self, kind: HazardKind) -> Option<Instant> {
        self.last_emission.get(&kind).copied()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
