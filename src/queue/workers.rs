use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::{PipelineExecutor, PipelineOutcome};
use crate::queue::jobs::PipelineMessage;

/// Fixed set of tokio tasks sharing one receiver. Each message is handled by
/// exactly one worker; a worker runs one pipeline at a time.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

struct Worker {
    id: usize,
    executor: Arc<PipelineExecutor>,
    receiver: Arc<Mutex<mpsc::Receiver<PipelineMessage>>>,
}

impl Worker {
    async fn run(self) {
        info!(worker_id = self.id, "Worker started");

        loop {
            let message = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };

            match message {
                Some(message) => {
                    self.process_job(message).await;
                }
                None => break,
            }
        }

        info!(worker_id = self.id, "Worker stopped");
    }

    async fn process_job(&self, message: PipelineMessage) -> PipelineOutcome {
        info!(worker_id = self.id, job_id = %message.job_id, "Processing job");

        let outcome = self.executor.run(message.job_id).await;
        let job_id = outcome.job_id();
        match &outcome {
            PipelineOutcome::Failed { .. } => {
                error!(worker_id = self.id, job_id = %job_id, report = %outcome, "Pipeline run finished")
            }
            _ => info!(worker_id = self.id, job_id = %job_id, report = %outcome, "Pipeline run finished"),
        }
        outcome
    }
}

impl WorkerPool {
    pub fn spawn(
        executor: Arc<PipelineExecutor>,
        receiver: mpsc::Receiver<PipelineMessage>,
        workers: usize,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    executor: executor.clone(),
                    receiver: receiver.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Workers exit once all senders are
    /// dropped and the channel is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task aborted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::{JobStore, MemoryJobStore};
    use crate::models::JobStatus;
    use crate::pipeline::testing::{Reply, ScriptedGateway};
    use crate::queue::{ChannelQueue, JobQueue};

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let store = Arc::new(MemoryJobStore::new());
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Reply::Text("Summary one"),
            Reply::Text(r#"["a"]"#),
            Reply::Text("Summary two"),
            Reply::Text(r#"["b"]"#),
        ]));
        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            gateway.clone(),
            PipelineConfig::default(),
        ));

        let (queue, receiver) = ChannelQueue::new(8);
        // One worker keeps the scripted replies in submission order
        let pool = WorkerPool::spawn(executor, receiver, 1);
        assert_eq!(pool.size(), 1);

        let first = store.create("first").await.unwrap();
        let second = store.create("second").await.unwrap();
        queue.enqueue(first.id).await.unwrap();
        queue.enqueue(second.id).await.unwrap();
        drop(queue);
        pool.join().await;

        let first = store.get(first.id).await.unwrap();
        let second = store.get(second.id).await.unwrap();
        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(first.checklist, Some(vec!["a".to_string()]));
        assert_eq!(second.status, JobStatus::Completed);
        assert_eq!(second.checklist, Some(vec!["b".to_string()]));
        assert_eq!(gateway.call_count(), 4);
    }

    #[tokio::test]
    async fn test_pool_survives_failures_and_unknown_ids() {
        let store = Arc::new(MemoryJobStore::new());
        let gateway = Arc::new(ScriptedGateway::new(vec![
            Reply::Panic,
            Reply::Text("Summary"),
            Reply::Text("- only item"),
        ]));
        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            gateway,
            PipelineConfig::default(),
        ));

        let (queue, receiver) = ChannelQueue::new(8);
        let pool = WorkerPool::spawn(executor, receiver, 1);

        let crashing = store.create("crash").await.unwrap();
        let healthy = store.create("ok").await.unwrap();
        queue.enqueue(uuid::Uuid::new_v4()).await.unwrap();
        queue.enqueue(crashing.id).await.unwrap();
        queue.enqueue(healthy.id).await.unwrap();
        drop(queue);
        pool.join().await;

        assert_eq!(store.get(crashing.id).await.unwrap().status, JobStatus::Failed);
        let healthy = store.get(healthy.id).await.unwrap();
        assert_eq!(healthy.status, JobStatus::Completed);
        assert_eq!(healthy.checklist, Some(vec!["only item".to_string()]));
    }
}
