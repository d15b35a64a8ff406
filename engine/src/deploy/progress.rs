//! Progress broadcaster
//!
//! Human-readable deployment progress per project. Display only: nothing in
//! the engine reads these events back to make a decision.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::deployment::{ProgressEvent, ProgressKind};
use crate::models::project::ProjectId;

/// Progress options
#[derive(Debug, Clone)]
pub struct ProgressOptions {
    /// How long events are kept
    pub retention: std::time::Duration,

    /// Events kept per project
    pub max_events: usize,

    /// Capacity of the live subscriber channel
    pub channel_capacity: usize,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            retention: std::time::Duration::from_secs(3600),
            max_events: 200,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Default)]
struct ProjectLog {
    events: Vec<ProgressEvent>,
    next_seq: u64,
}

/// Per-project event log with live fan-out
pub struct ProgressBroadcaster {
    logs: RwLock<HashMap<ProjectId, ProjectLog>>,
    sender: broadcast::Sender<ProgressEvent>,
    options: ProgressOptions,
}

impl ProgressBroadcaster {
    pub fn new(options: ProgressOptions) -> Self {
        let (sender, _) = broadcast::channel(options.channel_capacity.max(1));
        Self {
            logs: RwLock::new(HashMap::new()),
            sender,
            options,
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let retention = ChronoDuration::from_std(self.options.retention)
            .unwrap_or_else(|_| ChronoDuration::hours(1));
        now - retention
    }

    /// Append an event for a project
    pub fn publish(&self, project_id: ProjectId, kind: ProgressKind, message: &str) -> ProgressEvent {
        let now = Utc::now();
        let cutoff = self.cutoff(now);

        let event = {
            let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
            logs.retain(|_, log| {
                log.events.retain(|e| e.timestamp >= cutoff);
                !log.events.is_empty()
            });
            let log = logs.entry(project_id).or_default();

            log.next_seq += 1;
            let event = ProgressEvent {
                id: format!("{}_deploy_{}", project_id, log.next_seq),
                project_id,
                kind,
                message: message.to_string(),
                timestamp: now,
            };
            log.events.push(event.clone());

            if log.events.len() > self.options.max_events {
                let excess = log.events.len() - self.options.max_events;
                log.events.drain(..excess);
            }
            event
        };

        debug!("[{}] {}: {}", project_id, kind.as_str(), message);
        // No receivers is fine
        let _ = self.sender.send(event.clone());
        event
    }

    /// Append an action event
    pub fn action(&self, project_id: ProjectId, message: &str) -> ProgressEvent {
        self.publish(project_id, ProgressKind::Action, message)
    }

    /// Append an error event
    pub fn error(&self, project_id: ProjectId, message: &str) -> ProgressEvent {
        self.publish(project_id, ProgressKind::Error, message)
    }

    /// Events of a project still within retention, oldest first
    pub fn events(&self, project_id: ProjectId) -> Vec<ProgressEvent> {
        let cutoff = self.cutoff(Utc::now());
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        let Some(log) = logs.get_mut(&project_id) else {
            return Vec::new();
        };
        log.events.retain(|e| e.timestamp >= cutoff);
        let events = log.events.clone();
        if events.is_empty() {
            logs.remove(&project_id);
        }
        events
    }

    /// Subscribe to live events of every project
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(ProgressOptions::default())
    }
}
