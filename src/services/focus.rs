use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::models::{DownloadState, PodKey};

/// Scroll direction over the pod stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

/// Ordered pod keys (oldest first) plus the single focused key.
///
/// `focused` is `None` only while `order` is empty.
#[derive(Debug, Default, Clone)]
pub struct FocusController {
    order: Vec<PodKey>,
    focused: Option<PodKey>,
    last_direction: Option<Direction>,
}

impl FocusController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> &[PodKey] {
        &self.order
    }

    pub fn focused(&self) -> Option<&PodKey> {
        self.focused.as_ref()
    }

    pub fn is_focused(&self, key: &PodKey) -> bool {
        self.focused.as_ref() == Some(key)
    }

    pub fn contains(&self, key: &PodKey) -> bool {
        self.order.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Non-focused keys, newest first
    pub fn pile(&self) -> Vec<PodKey> {
        self.order
            .iter()
            .rev()
            .filter(|key| Some(*key) != self.focused.as_ref())
            .cloned()
            .collect()
    }

    /// Append a new pod and apply the focus policy. Returns whether focus moved.
    ///
    /// With stable focus, an in-progress download keeps focus against another
    /// in-progress one; finished downloads always take focus.
    pub fn on_pod_created(
        &mut self,
        key: PodKey,
        new_state: DownloadState,
        focused_state: Option<DownloadState>,
        stable_focus: bool,
    ) -> bool {
        if self.order.contains(&key) {
            trace!("{} already in order", key);
            return false;
        }
        self.order.push(key.clone());

        let take_focus = match (&self.focused, focused_state) {
            (None, _) => true,
            _ if !stable_focus => true,
            _ if new_state == DownloadState::Succeeded => true,
            (Some(_), Some(state)) if state.is_terminal() => true,
            // Focus points at a key with no known state
            (Some(_), None) => true,
            _ => false,
        };

        if take_focus {
            debug!("Focusing new pod {}", key);
            self.focused = Some(key);
        }
        take_focus
    }

    /// Bring another pod into focus. Returns the new focus, or `None` when
    /// there is nothing to rotate to.
    pub fn rotate(&mut self, direction: Direction) -> Option<PodKey> {
        if self.order.len() < 2 {
            return None;
        }
        let old = self.focused.clone()?;
        let pile = self.pile();

        let new = match direction {
            Direction::Forward => pile.first()?.clone(),
            Direction::Backward => pile.last()?.clone(),
        };

        self.order.retain(|key| *key != old && *key != new);
        match direction {
            // Old focus goes to the oldest slot
            Direction::Forward => self.order.insert(0, old.clone()),
            // Old focus goes right before the newest slot
            Direction::Backward => self.order.push(old.clone()),
        }
        self.order.push(new.clone());

        debug!("Rotated {:?}: {} -> {}", direction, old, new);
        self.focused = Some(new.clone());
        self.last_direction = Some(direction);
        Some(new)
    }

    /// Direction of the last rotation, cleared once read
    pub fn take_last_direction(&mut self) -> Option<Direction> {
        self.last_direction.take()
    }

    /// Focus a specific pod. Returns whether focus moved.
    pub fn focus(&mut self, key: &PodKey) -> bool {
        if !self.order.contains(key) || self.is_focused(key) {
            return false;
        }
        self.focused = Some(key.clone());
        true
    }

    /// Drop `key`, refocusing by position if it held focus.
    /// Returns whether focus moved.
    pub fn on_pod_removed(&mut self, key: &PodKey) -> bool {
        let Some(index) = self.order.iter().position(|k| k == key) else {
            return false;
        };
        self.order.remove(index);

        if !self.is_focused(key) {
            return false;
        }

        self.focused = self
            .order
            .get(index)
            .or_else(|| index.checked_sub(1).and_then(|i| self.order.get(i)))
            .or_else(|| self.order.last())
            .cloned();

        debug!("Focus moved to {:?} after removing {}", self.focused, key);
        true
    }

    /// Replace `old` with `new` in place, carrying focus along
    pub fn on_rename(&mut self, old: &PodKey, new: &PodKey) {
        if old == new {
            return;
        }
        let Some(index) = self.order.iter().position(|k| k == old) else {
            return;
        };

        // An early entry for the new key would break uniqueness
        self.order.retain(|k| k != new);
        let index = self.order.iter().position(|k| k == old).unwrap_or(index);
        if let Some(slot) = self.order.get_mut(index) {
            *slot = new.clone();
        }

        if self.focused.as_ref() == Some(old) {
            self.focused = Some(new.clone());
        }
    }
}
