use crate::prelude::*;

/// Requests into the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Shutdown,
    Refresh,
    Command(Command),
}

/// What the coordinator publishes after each operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Shutdown,
    Snapshot(serde_json::Value),
    CommandResult(String, Option<CommandOutcome>),
}

#[derive(Debug, Clone)]
pub struct Channels {
    pub to_coordinator: broadcast::Sender<ChannelData>,
    pub from_coordinator: broadcast::Sender<Event>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            to_coordinator: Self::channel(),
            from_coordinator: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
