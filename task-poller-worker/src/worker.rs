use std::sync::Arc;

use serde_json::Value;
use task_poller_core::Notification;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::{
  api::TaskApi,
  error::WorkerClosed,
  shutdown::{
    shutdown_manager::{Shutdown, ShutdownManager},
    shutdown_reason::ShutdownReason,
  },
  task_poller::{start_task_poller_fiber, TaskPoller},
  worker_config::WorkerConfig,
};

/// A background worker that tracks exactly one task.
///
/// The host talks to it only through messages: one request goes in through
/// [`TaskWorker::post_message`], notifications come out of the receiver
/// returned by [`TaskWorker::spawn`]. The receiver closes once the worker is
/// done.
pub struct TaskWorker {
  inbox: mpsc::UnboundedSender<Value>,
  shutdown: ShutdownManager<ShutdownReason>,
}

impl TaskWorker {
  pub async fn spawn<A: TaskApi>(
    api: A,
    config: &WorkerConfig,
  ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
    info!("Starting worker with config: {:?}", config);

    let (inbox, inbox_receiver) = mpsc::unbounded_channel();
    let (outbox, notifications) = mpsc::unbounded_channel();

    let shutdown_manager = ShutdownManager::new();

    let poller = TaskPoller::new(Arc::new(api), config.poll_interval, outbox);

    start_task_poller_fiber(
      poller,
      inbox_receiver,
      shutdown_manager.shutdown.clone(),
    )
    .await;

    (
      TaskWorker {
        inbox,
        shutdown: shutdown_manager,
      },
      notifications,
    )
  }

  /// Hands the worker its request. Only the first message is accepted.
  pub fn post_message(&self, message: Value) -> Result<(), WorkerClosed> {
    self.inbox.send(message).map_err(|_| WorkerClosed)
  }

  /// Handle the host can keep to terminate the worker while it awaits
  /// [`TaskWorker::await_shutdown`].
  pub fn terminator(&self) -> Arc<Shutdown<ShutdownReason>> {
    self.shutdown.shutdown.clone()
  }

  /// Aborts the worker wherever it is, including an in-flight request or
  /// the wait between two polls. Nothing is posted.
  pub async fn terminate(&self) {
    self.shutdown.shutdown.trigger(ShutdownReason::Terminated).await;
  }

  pub async fn await_shutdown(self) -> Result<ShutdownReason, oneshot::error::RecvError> {
    self.shutdown.await_shutdown().await
  }
}
