use crate::prelude::*;

use crate::channels::Event;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Keeps the latest telemetry snapshot in a JSON file. The file is replaced
/// on every write; it is a current view, not a log.
#[derive(Debug, Clone)]
pub struct StatusWriter {
    path: PathBuf,
    snapshots_written: Arc<Mutex<u64>>,
}

impl StatusWriter {
    pub fn new(path: &str) -> Result<Self> {
        info!("Writing status snapshots to {}", path);

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            path: PathBuf::from(path),
            snapshots_written: Arc::new(Mutex::new(0)),
        })
    }

    pub fn write_snapshot(&self, snapshot: &serde_json::Value) -> Result<()> {
        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let mut json_data = serde_json::Map::new();
        json_data.insert("utc_timestamp".to_string(), serde_json::Value::Number(timestamp.into()));
        json_data.insert("data".to_string(), snapshot.clone());
        let json_string = serde_json::to_string_pretty(&serde_json::Value::Object(json_data))?;

        // write then rename so readers never see a half-written file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json_string)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .with_context(|| format!("Failed to write status file {}", self.path.display()))?;

        let mut written = self
            .snapshots_written
            .lock()
            .map_err(|_| anyhow!("Failed to lock snapshot counter"))?;
        *written += 1;
        debug!("status snapshot {} written to {}", *written, self.path.display());

        Ok(())
    }

    pub fn snapshots_written(&self) -> u64 {
        self.snapshots_written.lock().map(|n| *n).unwrap_or_default()
    }

    pub async fn start(&self, channels: Channels) -> Result<()> {
        let mut receiver = channels.from_coordinator.subscribe();

        loop {
            match receiver.recv().await {
                Ok(Event::Snapshot(snapshot)) => {
                    // a failed write is retried with the next snapshot
                    if let Err(e) = self.write_snapshot(&snapshot) {
                        warn!("{:#}", e);
                    }
                }
                Ok(Event::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                Ok(Event::CommandResult(..)) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("status writer skipped {} events", n);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn overwrites_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("status").join("fronius.json");
        let writer = StatusWriter::new(path.to_str().unwrap())?;

        writer.write_snapshot(&json!({"acpower": 1500.0, "soc": 55.5}))?;
        writer.write_snapshot(&json!({"acpower": 1600.0}))?;

        let contents = std::fs::read_to_string(&path)?;
        let json: serde_json::Value = serde_json::from_str(&contents)?;

        assert_eq!(json["data"]["acpower"], 1600.0);
        assert_eq!(json["data"]["soc"], serde_json::Value::Null);
        assert!(json["utc_timestamp"].as_u64().is_some());
        assert_eq!(writer.snapshots_written(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn follows_coordinator_events() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("fronius.json");
        let writer = StatusWriter::new(path.to_str().unwrap())?;
        let channels = Channels::new();

        let task = {
            let writer = writer.clone();
            let channels = channels.clone();
            tokio::spawn(async move { writer.start(channels).await })
        };

        // wait until the writer has subscribed
        while channels.from_coordinator.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        channels.from_coordinator.send(Event::Snapshot(json!({"load": 420.0})))?;
        channels.from_coordinator.send(Event::Shutdown)?;
        task.await??;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(json["data"]["load"], 420.0);

        Ok(())
    }

    #[tokio::test]
    async fn keeps_running_after_failed_write() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("fronius.json");
        let writer = StatusWriter::new(path.to_str().unwrap())?;
        let channels = Channels::new();

        // a directory in the way makes the rename fail
        std::fs::create_dir(&path)?;
        let err = writer.write_snapshot(&json!({"load": 1.0})).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to write status file"));

        let task = {
            let writer = writer.clone();
            let channels = channels.clone();
            tokio::spawn(async move { writer.start(channels).await })
        };

        while channels.from_coordinator.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }

        channels.from_coordinator.send(Event::Snapshot(json!({"load": 100.0})))?;
        channels.from_coordinator.send(Event::Snapshot(json!({"load": 200.0})))?;
        channels.from_coordinator.send(Event::Shutdown)?;
        task.await??;

        assert_eq!(writer.snapshots_written(), 0);
        assert!(path.is_dir());

        Ok(())
    }
}
