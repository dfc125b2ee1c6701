//! Lifecycle events
//!
//! Mutations emit `<entity>.<phase>` before and after persisting; reads emit
//! `<entity>.retrieved` after the append pass. The bus implementation is
//! supplied by the application.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Retrieved,
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
}

impl EventPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieved => "retrieved",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub entity: String,
    pub phase: EventPhase,
    /// Primary key of the affected record, for mutations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    /// Number of records returned, for reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(entity: impl Into<String>, phase: EventPhase, request_id: Uuid) -> Self {
        Self {
            entity: entity.into(),
            phase,
            key: None,
            records: None,
            request_id,
            timestamp: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = Some(records);
        self
    }

    /// `<entity>.<phase>`, e.g. `post.creating`
    pub fn name(&self) -> String {
        format!("{}.{}", self.entity, self.phase)
    }
}

/// A listener refused an event
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct EventRejected {
    pub reason: String,
}

impl EventRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Receives lifecycle events synchronously
pub trait EventBus: Send + Sync {
    fn dispatch(&self, event: &LifecycleEvent) -> Result<(), EventRejected>;
}

/// Bus that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn dispatch(&self, _event: &LifecycleEvent) -> Result<(), EventRejected> {
        Ok(())
    }
}

/// Bus that keeps every event, for tests
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: RwLock<Vec<LifecycleEvent>>,
    reject: Option<String>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects events with this name after recording them
    pub fn rejecting(name: impl Into<String>) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            reject: Some(name.into()),
        }
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded event names, in dispatch order
    pub fn names(&self) -> Vec<String> {
        self.events().iter().map(LifecycleEvent::name).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl EventBus for RecordingEventBus {
    fn dispatch(&self, event: &LifecycleEvent) -> Result<(), EventRejected> {
        self.events
            .write()
            .map_err(|_| EventRejected::new("event log poisoned"))?
            .push(event.clone());

        match &self.reject {
            Some(name) if *name == event.name() => {
                Err(EventRejected::new(format!("listener rejected {}", name)))
            }
            _ => Ok(()),
        }
    }
}
