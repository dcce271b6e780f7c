use std::{future::Future, pin::Pin, sync::Arc};
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

type ShutdownTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Owns the receiving end of a worker's shutdown signal. The [`Shutdown`]
/// half is shared with every fiber that may end the worker.
pub struct ShutdownManager<A> {
  pub shutdown: Arc<Shutdown<A>>,
  receiver: oneshot::Receiver<A>,
}

impl<A> ShutdownManager<A> {
  pub fn new() -> Self {
    let (sender, receiver) = oneshot::channel();
    let shutdown = Arc::new(Shutdown {
      sender: Mutex::new(Some(sender)),
      tasks: Mutex::new(Vec::new()),
    });

    Self { shutdown, receiver }
  }

  pub async fn await_shutdown(self) -> Result<A, oneshot::error::RecvError> {
    self.receiver.await
  }
}

pub struct Shutdown<A> {
  sender: Mutex<Option<oneshot::Sender<A>>>,
  tasks: Mutex<Vec<(String, ShutdownTask)>>,
}

impl<A> Shutdown<A> {
  pub async fn register_shutdown_task<F>(&self, task: F, description: impl Into<String>)
  where
    F: FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
  {
    self
      .tasks
      .lock()
      .await
      .push((description.into(), Box::new(task)));
  }

  /// Runs the registered shutdown tasks, newest first, then resolves the
  /// manager with `value`. Only the first trigger has any effect; the return
  /// value tells whether this call was it.
  pub async fn trigger(&self, value: A) -> bool {
    let mut sender_guard = self.sender.lock().await;
    let Some(sender) = sender_guard.take() else {
      return false;
    };

    info!("Triggering shutdown signal");

    let tasks = {
      let mut tasks_guard = self.tasks.lock().await;
      std::mem::take(&mut *tasks_guard)
    };

    let total_tasks = tasks.len();

    for (index, (description, task)) in tasks.into_iter().rev().enumerate() {
      info!(
        "[{}/{}] Running shutdown task: {}",
        index + 1,
        total_tasks,
        description
      );
      task().await;
      info!(
        "[{}/{}] Shutdown task completed: {}",
        index + 1,
        total_tasks,
        description
      );
    }

    if sender.send(value).is_ok() {
      info!("Shutdown signal sent successfully");
    } else {
      warn!("Shutdown signal has no receiver");
    }

    true
  }
}
