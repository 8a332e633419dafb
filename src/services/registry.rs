use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::identity::IdentityResolver;
use crate::models::{DownloadRecord, HostId, PodKey, PodState, RenameStatus};
use crate::utils::PodError;

/// Where an upsert came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// A host event; counts as activity on the pod
    External,
    /// A re-read of state we already had
    Silent,
}

/// Result of [`PodRegistry::upsert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub key: PodKey,
    pub created: bool,
    /// Set when the download was tracked under another key until now
    pub moved_from: Option<PodKey>,
}

/// Authoritative map from identity key to pod state.
///
/// Removal does not cascade: callers cancel timers and pipelines first.
#[derive(Debug, Default)]
pub struct PodRegistry {
    pods: HashMap<PodKey, PodState>,
}

fn same_download(a: &DownloadRecord, b: &DownloadRecord) -> bool {
    match (&a.host_id, &b.host_id) {
        (Some(a_id), Some(b_id)) => a_id == b_id,
        _ => a.source_url == b.source_url && a.started_at == b.started_at,
    }
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn contains(&self, key: &PodKey) -> bool {
        self.pods.contains_key(key)
    }

    pub fn get(&self, key: &PodKey) -> Option<&PodState> {
        self.pods.get(key)
    }

    pub fn get_mut(&mut self, key: &PodKey) -> Option<&mut PodState> {
        self.pods.get_mut(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PodKey> {
        self.pods.keys()
    }

    pub fn pods(&self) -> impl Iterator<Item = &PodState> {
        self.pods.values()
    }

    pub fn find_by_host_id(&self, id: &HostId) -> Option<&PodKey> {
        self.pods
            .iter()
            .find(|(_, pod)| pod.record.host_id.as_ref() == Some(id))
            .map(|(key, _)| key)
    }

    /// Key the same download was tracked under before its identity changed
    /// (a path got assigned, or an echo still carries a pre-rename path).
    fn previous_key(&self, record: &DownloadRecord, key: &PodKey) -> Option<PodKey> {
        if let Some(id) = &record.host_id
            && let Some(found) = self.find_by_host_id(id)
            && found != key
        {
            return Some(found.clone());
        }

        self.pods
            .iter()
            .find(|(k, pod)| {
                *k != key
                    && k.is_temporary()
                    && pod.record.source_url == record.source_url
                    && pod.record.started_at == record.started_at
            })
            .map(|(k, _)| k.clone())
    }

    /// Create or refresh the pod for `record`.
    pub fn upsert(
        &mut self,
        mut record: DownloadRecord,
        origin: UpdateOrigin,
        now: Instant,
    ) -> Upserted {
        let mut key = IdentityResolver::resolve(&record);
        let mut moved_from = None;

        if !self.pods.contains_key(&key)
            && let Some(previous) = self.previous_key(&record, &key)
        {
            let renamed = self.pods.get(&previous).is_some_and(|pod| {
                matches!(
                    pod.rename_status,
                    RenameStatus::Renaming | RenameStatus::Renamed
                )
            });

            if renamed {
                // Stale echo of the pre-rename path: the pod keeps its new name
                trace!("Ignoring pre-rename path for {}", previous);
                record.path = self.pods.get(&previous).and_then(|pod| pod.record.path.clone());
                key = previous;
            } else if let Some(pod) = self.pods.remove(&previous) {
                debug!("Download moved from {} to {}", previous, key);
                self.pods.insert(key.clone(), PodState { key: key.clone(), ..pod });
                moved_from = Some(previous);
            }
        }

        match self.pods.get_mut(&key) {
            Some(pod) => {
                if record.suggested_name.is_none() {
                    record.suggested_name = pod.record.suggested_name.take();
                }
                pod.phase = pod.phase.advance(record.state);
                pod.record = record;
                if origin == UpdateOrigin::External {
                    pod.last_interaction_at = now;
                }
                Upserted {
                    key,
                    created: false,
                    moved_from,
                }
            }
            None => {
                debug!("Tracking new download {}", key);
                let pod = PodState::new(key.clone(), record, now);
                self.pods.insert(key.clone(), pod);
                Upserted {
                    key,
                    created: true,
                    moved_from: None,
                }
            }
        }
    }

    pub fn remove(&mut self, key: &PodKey) -> bool {
        self.pods.remove(key).is_some()
    }

    /// Take a pod out of the registry, returning its last state
    pub fn take(&mut self, key: &PodKey) -> Option<PodState> {
        self.pods.remove(key)
    }

    /// Put back a previously taken pod under its own key
    pub fn insert(&mut self, pod: PodState) {
        self.pods.insert(pod.key.clone(), pod);
    }

    /// Move the entry at `old` to `new`.
    ///
    /// Fails with [`PodError::IdentityConflict`] when `new` already tracks a
    /// different download. An entry at `new` for the same download (an early
    /// host echo) is replaced.
    pub fn rekey(&mut self, old: &PodKey, new: &PodKey) -> Result<(), PodError> {
        if old == new {
            return Ok(());
        }

        let Some(pod) = self.pods.get(old) else {
            return Err(PodError::UnknownPod(old.clone()));
        };

        if let Some(existing) = self.pods.get(new)
            && !same_download(&existing.record, &pod.record)
        {
            warn!("Refusing to move {} onto {}", old, new);
            return Err(PodError::IdentityConflict {
                old: old.clone(),
                new: new.clone(),
            });
        }

        if let Some(mut pod) = self.pods.remove(old) {
            pod.key = new.clone();
            self.pods.insert(new.clone(), pod);
        }
        debug!("Rekeyed {} -> {}", old, new);
        Ok(())
    }
}
