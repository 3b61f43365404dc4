use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::tracker::JobRecord;
use super::{JobBackend, JobEnvelope, QueueError};

struct Channel {
    tx: mpsc::UnboundedSender<JobEnvelope>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobEnvelope>>>,
}

/// Single-process backend on tokio channels. Delayed jobs sit in a sleeping
/// task until due.
#[derive(Default)]
pub struct MemoryBackend {
    channels: Mutex<HashMap<String, Channel>>,
    records: RwLock<HashMap<String, JobRecord>>,
    active: Mutex<HashMap<(String, String), String>>,
    dead: RwLock<HashMap<String, Vec<JobEnvelope>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, queue: &str) -> mpsc::UnboundedSender<JobEnvelope> {
        let mut channels = self.channels.lock();
        channels
            .entry(queue.to_string())
            .or_insert_with(Self::channel)
            .tx
            .clone()
    }

    fn receiver(&self, queue: &str) -> Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobEnvelope>>> {
        let mut channels = self.channels.lock();
        Arc::clone(&channels.entry(queue.to_string()).or_insert_with(Self::channel).rx)
    }

    fn channel() -> Channel {
        let (tx, rx) = mpsc::unbounded_channel();
        Channel {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

#[async_trait]
impl JobBackend for MemoryBackend {
    async fn push(&self, job: JobEnvelope, delay: Option<Duration>) -> Result<(), QueueError> {
        let tx = self.sender(&job.queue);
        match delay.filter(|d| !d.is_zero()) {
            None => tx
                .send(job)
                .map_err(|e| QueueError::Closed(e.0.queue)),
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = tx.send(job) {
                        tracing::warn!(queue = %e.0.queue, job_id = %e.0.id, "Delayed job dropped, queue closed");
                    }
                });
                Ok(())
            }
        }
    }

    async fn pop(&self, queue: &str, wait: Duration) -> Result<Option<JobEnvelope>, QueueError> {
        let rx = self.receiver(queue);
        let mut rx = rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(job) => Ok(job),
            Err(_) => Ok(None),
        }
    }

    async fn dead_letter(&self, job: JobEnvelope) -> Result<(), QueueError> {
        self.dead.write().entry(job.queue.clone()).or_default().push(job);
        Ok(())
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<JobEnvelope>, QueueError> {
        Ok(self.dead.read().get(queue).cloned().unwrap_or_default())
    }

    async fn put_record(&self, record: &JobRecord) -> Result<(), QueueError> {
        self.records.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_record(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.records.read().get(job_id).cloned())
    }

    async fn claim_active(&self, queue: &str, key: &str, job_id: &str) -> Result<Option<String>, QueueError> {
        let slot = (queue.to_string(), key.to_string());
        let mut active = self.active.lock();
        if let Some(existing) = active.get(&slot) {
            let live = self
                .records
                .read()
                .get(existing)
                .map(|r| !r.state.is_terminal())
                .unwrap_or(true);
            if live {
                return Ok(Some(existing.clone()));
            }
        }
        active.insert(slot, job_id.to_string());
        Ok(None)
    }

    async fn release_active(&self, queue: &str, key: &str, job_id: &str) -> Result<(), QueueError> {
        let slot = (queue.to_string(), key.to_string());
        let mut active = self.active.lock();
        if active.get(&slot).map(String::as_str) == Some(job_id) {
            active.remove(&slot);
        }
        Ok(())
    }
}
