use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{DownloadState, PodKey};

/// Admits at most one UI refresh per pod per interval.
///
/// Terminal states always pass so the final state shows up immediately.
#[derive(Debug)]
pub struct UpdateThrottle {
    interval: Duration,
    last_admitted: HashMap<PodKey, Instant>,
}

impl UpdateThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: HashMap::new(),
        }
    }

    pub fn admit(&mut self, key: &PodKey, state: DownloadState, now: Instant) -> bool {
        if !state.is_terminal()
            && let Some(last) = self.last_admitted.get(key)
            && now.saturating_duration_since(*last) < self.interval
        {
            return false;
        }

        self.last_admitted.insert(key.clone(), now);
        true
    }

    pub fn forget(&mut self, key: &PodKey) {
        self.last_admitted.remove(key);
    }

    pub fn rekey(&mut self, old: &PodKey, new: &PodKey) {
        if let Some(last) = self.last_admitted.remove(old) {
            self.last_admitted.insert(new.clone(), last);
        }
    }

    pub fn tracks(&self, key: &PodKey) -> bool {
        self.last_admitted.contains_key(key)
    }
}
