use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::models::PodKey;

/// Sent back to the owner when an autohide timer elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutohideFired {
    pub key: PodKey,
    pub generation: u64,
}

#[derive(Debug)]
struct Timer {
    handle: JoinHandle<()>,
    generation: u64,
    deadline: Instant,
}

/// Per-pod deferred removal.
///
/// Timers only post an [`AutohideFired`] message; the owner decides what a
/// fire means (grace window, detail-panel close). A fire whose generation
/// is no longer current belongs to a cancelled or replaced timer.
#[derive(Debug)]
pub struct AutohideScheduler<M> {
    delay: Duration,
    disabled: bool,
    timers: HashMap<PodKey, Timer>,
    next_generation: u64,
    sender: mpsc::UnboundedSender<M>,
}

impl<M> AutohideScheduler<M>
where
    M: From<AutohideFired> + Send + 'static,
{
    pub fn new(delay: Duration, disabled: bool, sender: mpsc::UnboundedSender<M>) -> Self {
        Self {
            delay,
            disabled,
            timers: HashMap::new(),
            next_generation: 0,
            sender,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// (Re)start the timer for `key` with the configured delay
    pub fn schedule(&mut self, key: &PodKey) -> bool {
        self.schedule_in(key, self.delay)
    }

    /// (Re)start the timer for `key` to fire after `delay`.
    /// A no-op returning `false` when autohide is disabled.
    pub fn schedule_in(&mut self, key: &PodKey, delay: Duration) -> bool {
        if self.disabled {
            trace!("Autohide disabled, not scheduling {}", key);
            return false;
        }
        self.start(key.clone(), Instant::now() + delay);
        debug!("Autohide for {} in {:?}", key, delay);
        true
    }

    fn start(&mut self, key: PodKey, deadline: Instant) {
        self.cancel(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        let sender = self.sender.clone();
        let fired_key = key.clone();

        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = sender.send(M::from(AutohideFired {
                key: fired_key,
                generation,
            }));
        });

        self.timers.insert(
            key,
            Timer {
                handle,
                generation,
                deadline,
            },
        );
    }

    /// Stop any timer for `key`
    pub fn cancel(&mut self, key: &PodKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                trace!("Cancelled autohide for {}", key);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    /// Move a pending timer to `new`, keeping its deadline
    pub fn rekey(&mut self, old: &PodKey, new: &PodKey) {
        if let Some(timer) = self.timers.remove(old) {
            timer.handle.abort();
            self.start(new.clone(), timer.deadline);
            debug!("Autohide moved from {} to {}", old, new);
        }
    }

    /// Accept a fire if it belongs to the live timer for its key,
    /// retiring that timer.
    pub fn take_fired(&mut self, fired: &AutohideFired) -> bool {
        match self.timers.get(&fired.key) {
            Some(timer) if timer.generation == fired.generation => {
                self.timers.remove(&fired.key);
                true
            }
            _ => {
                trace!("Ignoring stale autohide for {}", fired.key);
                false
            }
        }
    }

    pub fn is_scheduled(&self, key: &PodKey) -> bool {
        self.timers.contains_key(key)
    }

    pub fn deadline(&self, key: &PodKey) -> Option<Instant> {
        self.timers.get(key).map(|timer| timer.deadline)
    }

    pub fn scheduled_keys(&self) -> impl Iterator<Item = &PodKey> {
        self.timers.keys()
    }
}

impl<M> Drop for AutohideScheduler<M> {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}
