use crate::prelude::*;

use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Asks the coordinator for a poll cycle every `interval`.
#[derive(Clone)]
pub struct Scheduler {
    interval: Duration,
    channels: Channels,
}

impl Scheduler {
    pub fn new(interval: Duration, channels: Channels) -> Self {
        Self { interval, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut receiver = self.channels.to_coordinator.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    trace!("scheduling poll cycle");
                    self.channels
                        .to_coordinator
                        .send(ChannelData::Refresh)
                        .map_err(|err| anyhow!("send(to_coordinator): {}", err))?;
                }
                message = receiver.recv() => {
                    if let Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) = message {
                        break;
                    }
                }
            }
        }

        info!("scheduler stopped");
        Ok(())
    }
}
