// Redis-backed job queue
// Producers LPUSH JSON messages onto a list. Consumers LMOVE each message into
// a processing list, hand it to the local worker pool, then LREM it. A message
// only leaves Redis once the worker channel has accepted it.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use super::jobs::{JobQueue, PipelineMessage};
use crate::config::RedisConfig;
use crate::types::AppResult;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

async fn connect(config: &RedisConfig) -> AppResult<ConnectionManager> {
    let client = redis::Client::open(config.url.as_str())?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}

/// Messages claimed but not yet accepted by a worker channel.
pub fn processing_key(queue_key: &str) -> String {
    format!("{}:processing", queue_key)
}

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        let conn = connect(config).await?;
        info!(key = %config.queue_key, "Connected to Redis job queue");
        Ok(Self {
            conn,
            key: config.queue_key.clone(),
        })
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job_id: Uuid) -> AppResult<()> {
        let payload = PipelineMessage::new(job_id).encode()?;
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// List operations the consumer needs. Claimed payloads stay recoverable
/// until `ack` or `release`.
#[async_trait]
pub(crate) trait ClaimList: Send {
    /// Move the oldest queued payload into the processing list.
    async fn claim(&mut self) -> AppResult<Option<String>>;
    /// Drop a payload the worker channel has accepted.
    async fn ack(&mut self, payload: &str) -> AppResult<()>;
    /// Put a claimed payload back at the head of the queue.
    async fn release(&mut self, payload: &str) -> AppResult<()>;
    /// Return everything left in the processing list to the queue, oldest
    /// first. Used at startup after an unclean exit.
    async fn recover(&mut self) -> AppResult<usize>;
}

pub(crate) struct RedisClaimList {
    conn: ConnectionManager,
    key: String,
    processing: String,
}

#[async_trait]
impl ClaimList for RedisClaimList {
    async fn claim(&mut self) -> AppResult<Option<String>> {
        let payload: Option<String> = redis::cmd("LMOVE")
            .arg(&self.key)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut self.conn)
            .await?;
        Ok(payload)
    }

    async fn ack(&mut self, payload: &str) -> AppResult<()> {
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(payload)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn release(&mut self, payload: &str) -> AppResult<()> {
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(payload)
            .ignore()
            .cmd("RPUSH")
            .arg(&self.key)
            .arg(payload)
            .ignore()
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn recover(&mut self) -> AppResult<usize> {
        let mut moved = 0;
        loop {
            let payload: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut self.conn)
                .await?;
            match payload {
                Some(_) => moved += 1,
                None => return Ok(moved),
            }
        }
    }
}

/// Moves messages from the Redis list into the in-process worker channel.
pub struct RedisConsumer {
    list: RedisClaimList,
    sender: mpsc::Sender<PipelineMessage>,
}

impl RedisConsumer {
    pub async fn connect(config: &RedisConfig, sender: mpsc::Sender<PipelineMessage>) -> AppResult<Self> {
        Ok(Self {
            list: RedisClaimList {
                conn: connect(config).await?,
                key: config.queue_key.clone(),
                processing: processing_key(&config.queue_key),
            },
            sender,
        })
    }

    /// Poll until `shutdown` flips to true or the worker channel closes.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(key = %self.list.key, processing = %self.list.processing, "Redis consumer started");
        consume(self.list, self.sender, shutdown).await;
        info!("Redis consumer stopped");
    }
}

/// Shutdown is only honoured while idle or while waiting on a full worker
/// channel; in the latter case the claimed payload is released first.
pub(crate) async fn consume<L: ClaimList>(
    mut list: L,
    sender: mpsc::Sender<PipelineMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    match list.recover().await {
        Ok(0) => {}
        Ok(moved) => warn!(moved, "Re-queued messages left in processing"),
        Err(e) => warn!(error = %e, "Failed to recover processing list"),
    }

    let mut idle = MIN_POLL_INTERVAL;

    loop {
        if *shutdown.borrow() || sender.is_closed() {
            break;
        }

        let pause = match list.claim().await {
            Ok(Some(payload)) => {
                idle = MIN_POLL_INTERVAL;
                if !hand_off(&mut list, &sender, &mut shutdown, payload).await {
                    break;
                }
                continue;
            }
            Ok(None) => {
                let pause = idle;
                idle = (idle * 2).min(MAX_POLL_INTERVAL);
                pause
            }
            Err(e) => {
                warn!(error = %e, "Redis poll failed");
                MAX_POLL_INTERVAL
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

/// Returns false when the consumer should stop.
async fn hand_off<L: ClaimList>(
    list: &mut L,
    sender: &mpsc::Sender<PipelineMessage>,
    shutdown: &mut watch::Receiver<bool>,
    payload: String,
) -> bool {
    let message = match PipelineMessage::decode(&payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, payload = %payload, "Skipping invalid queue message");
            if let Err(e) = list.ack(&payload).await {
                warn!(error = %e, "Failed to drop invalid message");
            }
            return true;
        }
    };

    let delivered = tokio::select! {
        sent = sender.send(message) => sent.is_ok(),
        _ = shutdown.changed() => false,
    };

    let settled = if delivered {
        list.ack(&payload).await
    } else {
        warn!(payload = %payload, "Consumer stopping, re-queueing claimed message");
        list.release(&payload).await
    };
    if let Err(e) = settled {
        // Still in the processing list; recovered on next start
        warn!(error = %e, payload = %payload, "Failed to settle claimed message");
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Redis list semantics: index 0 is LEFT, the back is RIGHT.
    #[derive(Default)]
    struct Lists {
        queue: VecDeque<String>,
        processing: VecDeque<String>,
    }

    #[derive(Clone, Default)]
    struct MemoryClaimList {
        lists: Arc<Mutex<Lists>>,
    }

    impl MemoryClaimList {
        fn with_queue(payloads: &[String]) -> Self {
            let list = Self::default();
            // LPUSH in enqueue order
            for payload in payloads {
                list.lists.lock().unwrap().queue.push_front(payload.clone());
            }
            list
        }

        fn queue(&self) -> Vec<String> {
            self.lists.lock().unwrap().queue.iter().cloned().collect()
        }

        fn processing(&self) -> Vec<String> {
            self.lists.lock().unwrap().processing.iter().cloned().collect()
        }
    }

    #[async_trait]
    impl ClaimList for MemoryClaimList {
        async fn claim(&mut self) -> AppResult<Option<String>> {
            let mut lists = self.lists.lock().unwrap();
            let payload = lists.queue.pop_back();
            if let Some(p) = &payload {
                lists.processing.push_front(p.clone());
            }
            Ok(payload)
        }

        async fn ack(&mut self, payload: &str) -> AppResult<()> {
            let mut lists = self.lists.lock().unwrap();
            if let Some(pos) = lists.processing.iter().position(|p| p == payload) {
                lists.processing.remove(pos);
            }
            Ok(())
        }

        async fn release(&mut self, payload: &str) -> AppResult<()> {
            self.ack(payload).await?;
            self.lists.lock().unwrap().queue.push_back(payload.to_string());
            Ok(())
        }

        async fn recover(&mut self) -> AppResult<usize> {
            let mut lists = self.lists.lock().unwrap();
            let mut moved = 0;
            while let Some(payload) = lists.processing.pop_front() {
                lists.queue.push_back(payload);
                moved += 1;
            }
            Ok(moved)
        }
    }

    fn payloads(n: usize) -> (Vec<Uuid>, Vec<String>) {
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        let encoded = ids.iter().map(|id| PipelineMessage::new(*id).encode().unwrap()).collect();
        (ids, encoded)
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_processing_key() {
        assert_eq!(processing_key("guideline:jobs"), "guideline:jobs:processing");
    }

    #[tokio::test]
    async fn test_messages_are_acked_after_hand_off() {
        let (ids, encoded) = payloads(3);
        let list = MemoryClaimList::with_queue(&encoded);
        let (sender, mut receiver) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(consume(list.clone(), sender, shutdown_rx));

        for id in &ids {
            assert_eq!(receiver.recv().await.unwrap().job_id, *id);
        }
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        assert!(list.queue().is_empty());
        assert!(list.processing().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_full_channel_keeps_claimed_message() {
        let (ids, encoded) = payloads(2);
        let list = MemoryClaimList::with_queue(&encoded);
        let (sender, mut receiver) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(consume(list.clone(), sender, shutdown_rx));

        // First message fills the channel, second is claimed and stuck in send
        let observed = list.clone();
        wait_for(move || observed.queue().is_empty() && observed.processing().len() == 1).await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(list.queue(), vec![encoded[1].clone()]);
        assert!(list.processing().is_empty());
        assert_eq!(receiver.recv().await.unwrap().job_id, ids[0]);
    }

    #[tokio::test]
    async fn test_startup_recovers_processing_list() {
        let (ids, encoded) = payloads(2);
        let list = MemoryClaimList::default();
        {
            // Left behind by a consumer that died mid hand-off, newest first
            let mut lists = list.lists.lock().unwrap();
            lists.processing.push_front(encoded[0].clone());
            lists.processing.push_front(encoded[1].clone());
        }
        let (sender, mut receiver) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(consume(list.clone(), sender, shutdown_rx));

        assert_eq!(receiver.recv().await.unwrap().job_id, ids[0]);
        assert_eq!(receiver.recv().await.unwrap().job_id, ids[1]);
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(list.processing().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_dropped() {
        let (ids, mut encoded) = payloads(1);
        encoded.insert(0, "not json".to_string());
        let list = MemoryClaimList::with_queue(&encoded);
        let (sender, mut receiver) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(consume(list.clone(), sender, shutdown_rx));

        assert_eq!(receiver.recv().await.unwrap().job_id, ids[0]);
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(list.queue().is_empty());
        assert!(list.processing().is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_releases_message() {
        let (_ids, encoded) = payloads(1);
        let list = MemoryClaimList::with_queue(&encoded);
        let (sender, receiver) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(receiver);

        consume(list.clone(), sender, shutdown_rx).await;

        // Closed before the first claim: nothing is taken
        assert_eq!(list.queue(), encoded);
        assert!(list.processing().is_empty());
    }
}
