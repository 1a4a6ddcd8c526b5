//! Bounded diagnostic log of received events

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::event::StreamEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedEvent {
    pub event: StreamEvent,
    pub received_at: DateTime<Utc>,
}

/// Ring buffer of the last `limit` non-heartbeat events
#[derive(Debug, Clone)]
pub struct EventHistory {
    limit: usize,
    events: VecDeque<ReceivedEvent>,
    last: Option<ReceivedEvent>,
}

impl EventHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            events: VecDeque::with_capacity(limit.min(1024)),
            last: None,
        }
    }

    /// Record an event; heartbeats are rejected
    pub fn record(&mut self, event: StreamEvent) -> bool {
        if event.is_heartbeat() {
            return false;
        }
        let received = ReceivedEvent {
            event,
            received_at: Utc::now(),
        };
        if self.limit > 0 {
            while self.events.len() >= self.limit {
                self.events.pop_front();
            }
            self.events.push_back(received.clone());
        }
        self.last = Some(received);
        true
    }

    /// Events in arrival order, oldest first
    pub fn events(&self) -> Vec<ReceivedEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&ReceivedEvent> {
        self.last.as_ref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.last = None;
    }
}
