use serde::{Deserialize, Serialize};

use crate::models::{PodKey, PodSnapshot};
use crate::services::layout::LayoutFrame;

/// Event broadcast by the session to UI glue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEvent {
    pub id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: EventSource,
    pub priority: EventPriority,
}

impl PodEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
            source: EventSource::Session,
            priority: EventPriority::Normal,
        }
    }

    pub fn with_source(mut self, source: EventSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Key of the pod the event is about, if any
    pub fn pod_key(&self) -> Option<&PodKey> {
        match &self.payload {
            EventPayload::Pod { key, .. } | EventPayload::Removed { key } => Some(key),
            EventPayload::Focus { key } => key.as_ref(),
            EventPayload::Rename { new_key, .. } => Some(new_key),
            EventPayload::Layout { .. } | EventPayload::System { .. } => None,
        }
    }
}

/// Event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    // Pod events
    PodCreated,
    PodUpdated,
    PodFocused,
    PodStatusChanged,
    PodDismissed,
    PodRestored,
    PodDeleted,

    // Rename events
    PodRenamed,
    PodRenameUndone,

    // Host events
    DownloadErased,

    // Presentation
    LayoutChanged,

    // System events
    AiRenamingDisabled,
}

/// Event payload containing specific data for each event type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Pod {
        key: PodKey,
        snapshot: Box<PodSnapshot>,
    },
    Focus {
        key: Option<PodKey>,
    },
    Rename {
        old_key: PodKey,
        new_key: PodKey,
        display_name: String,
    },
    Removed {
        key: PodKey,
    },
    Layout {
        frame: LayoutFrame,
    },
    System {
        message: String,
    },
}

/// Where the event originated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventSource {
    Session,
    Host,
    User,
    Pipeline,
    Autohide,
}

/// Event priority for processing order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
pub enum EventPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

impl EventType {
    /// Get a string representation for filtering/routing
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PodCreated => "pod.created",
            EventType::PodUpdated => "pod.updated",
            EventType::PodFocused => "pod.focused",
            EventType::PodStatusChanged => "pod.status_changed",
            EventType::PodDismissed => "pod.dismissed",
            EventType::PodRestored => "pod.restored",
            EventType::PodDeleted => "pod.deleted",
            EventType::PodRenamed => "pod.renamed",
            EventType::PodRenameUndone => "pod.rename_undone",
            EventType::DownloadErased => "download.erased",
            EventType::LayoutChanged => "layout.changed",
            EventType::AiRenamingDisabled => "system.ai_disabled",
        }
    }
}
