use super::types::{EventPayload, EventPriority, EventSource, EventType, PodEvent};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use crate::models::{PodKey, PodSnapshot};
use crate::services::layout::LayoutFrame;

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<PodEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    /// Create a new subscriber with an optional filter
    pub fn new(receiver: broadcast::Receiver<PodEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<PodEvent> {
        loop {
            let event = self.receiver.recv().await?;

            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<PodEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn accepts(&self, event: &PodEvent) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter.matches(event))
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    event_types: Option<Vec<EventType>>,
    sources: Option<Vec<EventSource>>,
    key: Option<PodKey>,
    min_priority: Option<EventPriority>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_sources(mut self, sources: Vec<EventSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Only events about one pod
    pub fn with_key(mut self, key: PodKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_min_priority(mut self, priority: EventPriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn matches(&self, event: &PodEvent) -> bool {
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }

        if let Some(ref sources) = self.sources
            && !sources.contains(&event.source)
        {
            return false;
        }

        if let Some(ref key) = self.key
            && event.pod_key() != Some(key)
        {
            return false;
        }

        if let Some(min_priority) = self.min_priority
            && event.priority < min_priority
        {
            return false;
        }

        true
    }
}

/// Broadcasts pod events to every interested listener
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<PodEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<PodEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size: 100,
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: PodEvent) -> Result<()> {
        trace!(
            "Publishing event: {} from {:?}",
            event.event_type.as_str(),
            event.source
        );

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());

            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        if self.sender.send(event).is_err() {
            // No subscribers is normal
            let mut stats = self.stats.write().await;
            stats.dropped_events += 1;
        }
        Ok(())
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    /// Subscribe to specific event types
    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::new().with_types(types))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let stats = self.stats.read().await;
        EventBusStats {
            subscriber_count: self.subscriber_count(),
            ..stats.clone()
        }
    }

    /// Get event history for debugging
    pub async fn get_history(&self) -> Vec<PodEvent> {
        self.event_history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }

    /// Emit an event carrying a pod snapshot
    pub async fn emit_pod(
        &self,
        event_type: EventType,
        snapshot: PodSnapshot,
        source: EventSource,
    ) -> Result<()> {
        let event = PodEvent::new(
            event_type,
            EventPayload::Pod {
                key: snapshot.key.clone(),
                snapshot: Box::new(snapshot),
            },
        )
        .with_source(source);
        self.publish(event).await
    }

    pub async fn emit_focus(&self, key: Option<PodKey>) -> Result<()> {
        let event = PodEvent::new(EventType::PodFocused, EventPayload::Focus { key });
        self.publish(event).await
    }

    /// Emit a renamed or rename-undone event
    pub async fn emit_rename(
        &self,
        event_type: EventType,
        old_key: PodKey,
        new_key: PodKey,
        display_name: String,
    ) -> Result<()> {
        let event = PodEvent::new(
            event_type,
            EventPayload::Rename {
                old_key,
                new_key,
                display_name,
            },
        )
        .with_source(EventSource::Pipeline);
        self.publish(event).await
    }

    /// Emit a removal-type event (deleted, erased from host)
    pub async fn emit_removed(
        &self,
        event_type: EventType,
        key: PodKey,
        source: EventSource,
    ) -> Result<()> {
        let event = PodEvent::new(event_type, EventPayload::Removed { key })
            .with_source(source)
            .with_priority(EventPriority::High);
        self.publish(event).await
    }

    pub async fn emit_layout(&self, frame: LayoutFrame) -> Result<()> {
        let event = PodEvent::new(EventType::LayoutChanged, EventPayload::Layout { frame })
            .with_priority(EventPriority::Low);
        self.publish(event).await
    }

    pub async fn emit_system(&self, event_type: EventType, message: impl Into<String>) -> Result<()> {
        let event = PodEvent::new(
            event_type,
            EventPayload::System {
                message: message.into(),
            },
        )
        .with_priority(EventPriority::High);
        self.publish(event).await
    }
}
