//! In-process task queue backed by a tokio channel

use async_trait::async_trait;
use tidemark_core::TaskQueue;
use tidemark_domain::{Result, SyncTask, TidemarkError};
use tokio::sync::mpsc;

/// Producer half; cheap to clone and share between dispatcher and worker
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::UnboundedSender<SyncTask>,
}

/// Consumer half, owned by exactly one [`super::SyncTaskWorker`]
#[derive(Debug)]
pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<SyncTask>,
}

impl ChannelTaskQueue {
    pub fn channel() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, TaskReceiver { receiver })
    }
}

impl TaskReceiver {
    pub async fn recv(&mut self) -> Option<SyncTask> {
        self.receiver.recv().await
    }
}

#[async_trait]
impl TaskQueue for ChannelTaskQueue {
    async fn enqueue(&self, task: SyncTask) -> Result<()> {
        self.sender
            .send(task)
            .map_err(|err| TidemarkError::Internal(format!("task queue closed: {}", err.0.task_id)))
    }
}
