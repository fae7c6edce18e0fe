//! Event bus for gateway-level notifications
//!
//! Bounded broadcast fan-out of connection lifecycle and connector status
//! events. Publishing never blocks the protocol path; a subscriber that
//! falls behind loses the oldest events and gets a lag warning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::connector::StatusEvent;

#[derive(Debug, Clone)]
pub enum Event {
    StationConnected {
        station_id: String,
        remote_addr: Option<String>,
        timestamp: DateTime<Utc>,
    },
    StationDisconnected {
        station_id: String,
        timestamp: DateTime<Utc>,
    },
    ConnectorStatusChanged(StatusEvent),
}

impl Event {
    pub fn station_id(&self) -> &str {
        match self {
            Self::StationConnected { station_id, .. }
            | Self::StationDisconnected { station_id, .. } => station_id,
            Self::ConnectorStatusChanged(event) => &event.station_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StationConnected { .. } => "station_connected",
            Self::StationDisconnected { .. } => "station_disconnected",
            Self::ConnectorStatusChanged(_) => "connector_status_changed",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

pub type SharedEventBus = Arc<EventBus>;

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(capacity: usize) -> SharedEventBus {
        Arc::new(Self::with_capacity(capacity))
    }

    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(subscribers) => debug!(kind, subscribers, "event published"),
            Err(_) => debug!(kind, "event published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<Event>,
}

impl EventSubscriber {
    /// Next event, skipping over any gap caused by lag. `None` when the bus
    /// is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(station: &str) -> Event {
        Event::StationConnected {
            station_id: station.into(),
            remote_addr: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::with_capacity(8);
        let mut sub = bus.subscribe();
        bus.publish(connected("st-1"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.station_id(), "st-1");
        assert_eq!(event.kind(), "station_connected");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_block() {
        let bus = EventBus::with_capacity(1);
        for _ in 0..100 {
            bus.publish(connected("st-1"));
        }
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_fresh_events() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();
        for i in 0..10 {
            bus.publish(connected(&format!("st-{}", i)));
        }
        // oldest events were dropped; the subscriber still makes progress
        let event = sub.recv().await.unwrap();
        assert!(event.station_id().starts_with("st-"));
    }
}
