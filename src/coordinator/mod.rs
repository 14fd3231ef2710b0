use crate::prelude::*;

use crate::channels::Event;
use crate::fronius::client::CycleReport;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub block_failures: u64,
    pub commands_applied: u64,
    pub commands_ignored: u64,
    pub commands_rejected: u64,
    pub commands_failed: u64,
    pub commands_skipped: u64,
}

impl Stats {
    pub fn print_summary(&self) {
        info!("Statistics:");
        info!("  Poll cycles:");
        info!("    Run: {}", self.cycles_run);
        info!("    Failed: {}", self.cycles_failed);
        info!("    Skipped (busy): {}", self.cycles_skipped);
        info!("    Failed blocks: {}", self.block_failures);
        info!("  Commands:");
        info!("    Applied: {}", self.commands_applied);
        info!("    Ignored (mode): {}", self.commands_ignored);
        info!("    Rejected: {}", self.commands_rejected);
        info!("    Failed: {}", self.commands_failed);
        info!("    Skipped (busy): {}", self.commands_skipped);
    }
}

/// Serializes every register operation through one shared client.
///
/// Access is single-flight: a refresh or command that arrives while another
/// one holds the client is skipped, not queued, so a slow device never builds
/// up a backlog of stale work.
pub struct Coordinator<T: Transport> {
    client: Arc<tokio::sync::Mutex<FroniusClient<T>>>,
    channels: Channels,
    pub stats: Arc<Mutex<Stats>>,
}

impl<T: Transport> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            channels: self.channels.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T: Transport + 'static> Coordinator<T> {
    pub fn new(client: FroniusClient<T>, channels: Channels) -> Self {
        Self {
            client: Arc::new(tokio::sync::Mutex::new(client)),
            channels,
            stats: Arc::new(Mutex::new(Stats::default())),
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn update_stats(&self, f: impl FnOnce(&mut Stats)) {
        match self.stats.lock() {
            Ok(mut stats) => f(&mut stats),
            Err(_) => warn!("stats lock poisoned"),
        }
    }

    fn publish(&self, event: Event) {
        // no subscribers is fine
        let _ = self.channels.from_coordinator.send(event);
    }

    pub async fn start(&self) -> Result<()> {
        let mut receiver = self.channels.to_coordinator.subscribe();

        loop {
            match receiver.recv().await {
                Ok(ChannelData::Shutdown) => break,
                Ok(ChannelData::Refresh) => {
                    let coordinator = self.clone();
                    tokio::spawn(async move {
                        coordinator.refresh().await;
                    });
                }
                Ok(ChannelData::Command(command)) => {
                    let coordinator = self.clone();
                    tokio::spawn(async move {
                        if let Err(err) = coordinator.process_command(command).await {
                            error!("{:#}", err);
                        }
                    });
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("coordinator lagged, {} requests dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        info!("coordinator stopped");
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.to_coordinator.send(ChannelData::Shutdown);
        self.publish(Event::Shutdown);
    }

    /// Connect and read static device data. Waits for the client.
    pub async fn init(&self) -> Result<()> {
        self.client.lock().await.init_data().await
    }

    /// Exclusive access, waiting for any operation in flight.
    pub async fn client(&self) -> tokio::sync::MutexGuard<'_, FroniusClient<T>> {
        self.client.lock().await
    }

    pub async fn with_client<R>(&self, f: impl FnOnce(&mut FroniusClient<T>) -> R) -> R {
        let mut client = self.client.lock().await;
        f(&mut client)
    }

    /// One poll cycle, or `None` when the client is busy.
    pub async fn refresh(&self) -> Option<CycleReport> {
        let Ok(mut client) = self.client.clone().try_lock_owned() else {
            warn!("previous operation still running, skipping poll cycle");
            self.update_stats(|s| s.cycles_skipped += 1);
            return None;
        };

        let report = client.refresh().await;
        let snapshot = client.snapshot();
        drop(client);

        self.update_stats(|s| {
            s.cycles_run += 1;
            s.block_failures += report.failures() as u64;
            if !report.success() {
                s.cycles_failed += 1;
            }
        });
        self.publish(Event::Snapshot(snapshot));

        Some(report)
    }

    /// Run one command, or `Ok(None)` when the client is busy.
    pub async fn process_command(&self, command: Command) -> Result<Option<CommandOutcome>> {
        let topic = command.to_result_topic();

        let Ok(mut client) = self.client.clone().try_lock_owned() else {
            warn!("busy, skipping {}", topic);
            self.update_stats(|s| s.commands_skipped += 1);
            self.publish(Event::CommandResult(topic, None));
            return Ok(None);
        };

        let result = client.execute(&command).await;
        let snapshot = client.snapshot();
        drop(client);

        match result {
            Ok(outcome) => {
                info!("{}: {:?}", topic, outcome);
                self.update_stats(|s| match outcome {
                    CommandOutcome::Applied => s.commands_applied += 1,
                    CommandOutcome::Ignored => s.commands_ignored += 1,
                    CommandOutcome::Rejected => s.commands_rejected += 1,
                });
                self.publish(Event::CommandResult(topic, Some(outcome)));
                self.publish(Event::Snapshot(snapshot));
                Ok(Some(outcome))
            }
            Err(err) => {
                self.update_stats(|s| s.commands_failed += 1);
                self.publish(Event::CommandResult(topic.clone(), None));
                Err(err.context(format!("{} failed", topic)))
            }
        }
    }

    pub async fn close(&self) {
        self.client.lock().await.close();
    }
}
