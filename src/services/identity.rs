use std::path::Path;

use crate::models::{DownloadRecord, PodKey};

/// Derives the stable key a pod is tracked under.
///
/// Path first, then the host's own id, then a synthetic key from the source
/// URL and the start time. The synthetic key never depends on "now", so
/// repeated events for the same pathless download resolve to the same pod.
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn resolve(record: &DownloadRecord) -> PodKey {
        if let Some(path) = record.path.as_deref()
            && !path.as_os_str().is_empty()
        {
            return PodKey::from_path(path);
        }

        if let Some(id) = &record.host_id {
            return PodKey::new(format!("host:{}", id));
        }

        PodKey::new(format!(
            "temp:{}:{}",
            record.source_url,
            record.started_at.timestamp_millis()
        ))
    }

    /// Key of the same download after its file moved to `new_path`
    pub fn rekeyed(new_path: &Path) -> PodKey {
        PodKey::from_path(new_path)
    }
}
