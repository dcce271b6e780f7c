use std::{sync::Arc, time::Duration};

use serde_json::Value;
use task_poller_core::{
    reply::{SUBMISSION_REJECTED, TASK_FAILED},
    Notification, Request, RequestKind, SessionContext, StatusReply,
    SubmitReply, Task,
};
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    api::TaskApi,
    error::{ApiError, PollError},
    shutdown::{shutdown_manager::Shutdown, shutdown_reason::ShutdownReason},
};

/// Everything a worker knows about the one task it handles.
#[derive(Debug, Clone)]
pub struct TaskSession {
    pub context: SessionContext,
    pub task: Task,
}

/// Result of a single status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Complete,
}

pub struct TaskPoller<A> {
    api: Arc<A>,
    poll_interval: Duration,
    outbox: mpsc::UnboundedSender<Notification>,
}

impl<A: TaskApi> TaskPoller<A> {
    pub fn new(
        api: Arc<A>,
        poll_interval: Duration,
        outbox: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        Self {
            api,
            poll_interval,
            outbox,
        }
    }

    /// Drives one request to its end. Exactly one terminal notification is
    /// posted: `RESULT` on success, `ERROR` otherwise.
    pub async fn run(&self, request: Request) -> Result<Task, PollError> {
        let Request { context, kind } = request;
        info!("Handling {} request for tool {}", kind.name(), context.tool_name);

        let mut session = TaskSession {
            context,
            task: Task::unsubmitted(),
        };

        let outcome = self.drive(&mut session, kind).await;

        if let Err(error) = &outcome {
            error!("Task {:?} failed: {}", session.task.id, error);
            self.notify(Notification::Error {
                id: session.task.id.clone(),
                message: error.user_message().to_string(),
            });
        }

        outcome
    }

    async fn drive(&self, session: &mut TaskSession, kind: RequestKind) -> Result<Task, PollError> {
        match kind {
            RequestKind::New { form_data } => {
                let reply = self.api.submit(&session.context, &form_data).await;
                self.accept(session, reply)?;
                sleep(self.poll_interval).await;
            }
            RequestKind::Single { id, date } => {
                let reply = self
                    .api
                    .submit_single(&session.context, &id, &date)
                    .await;
                self.accept(session, reply)?;
                sleep(self.poll_interval).await;
            }
            RequestKind::History { id, title } => {
                session.task = Task::from_history(id, title);
                self.notify(Notification::Start {
                    task: session.task.clone(),
                });
            }
        }

        loop {
            match self.check_task(session).await? {
                PollState::Waiting => sleep(self.poll_interval).await,
                PollState::Complete => return Ok(session.task.clone()),
            }
        }
    }

    /// Adopts the id and title of an accepted submission and posts `START`.
    fn accept(
        &self,
        session: &mut TaskSession,
        reply: Result<Value, ApiError>,
    ) -> Result<(), PollError> {
        let reply = reply
            .and_then(|body| Ok(SubmitReply::from_value(body)?))
            .map_err(|error| PollError::from_api(error, SUBMISSION_REJECTED))?;

        match reply {
            SubmitReply::Accepted { id, title } => {
                info!("Server accepted task {} ({:?})", id, title);
                session.task.assign(id, title);
                self.notify(Notification::Start {
                    task: session.task.clone(),
                });
                Ok(())
            }
            SubmitReply::Rejected { message } => {
                // Refused submissions always surface the generic text.
                warn!("Server rejected submission: {:?}", message);
                Err(PollError::reported(None, SUBMISSION_REJECTED))
            }
        }
    }

    /// Asks the server once for the status of the session's task.
    ///
    /// Progress of a waiting task is posted as `UPDATE`. A finished task has
    /// the whole reply merged into its record and is posted as `RESULT`.
    pub async fn check_task(&self, session: &mut TaskSession) -> Result<PollState, PollError> {
        let Some(id) = session.task.id.clone() else {
            return Err(PollError::task_failed(None));
        };

        debug!("Checking status of task {}", id);

        let reply = self
            .api
            .check(&session.context, &id)
            .await
            .and_then(|body| Ok(StatusReply::from_value(body)?))
            .map_err(|error| PollError::from_api(error, TASK_FAILED))?;

        match reply {
            StatusReply::Failed { message } => Err(PollError::task_failed(message)),
            StatusReply::Waiting { progress } => {
                if let Some(value) = progress {
                    debug!("Task {} at {}%", id, value);
                    self.notify(Notification::Update {
                        id: Some(id),
                        value,
                    });
                }
                Ok(PollState::Waiting)
            }
            StatusReply::Complete { attributes } => {
                info!("Task {} complete", id);
                session.task.merge(attributes);
                self.notify(Notification::Result {
                    task: session.task.clone(),
                });
                Ok(PollState::Complete)
            }
        }
    }

    fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        if self.outbox.send(notification).is_err() {
            warn!("Host stopped listening, dropping {} notification", kind);
        }
    }
}

/// Spawns the fiber that waits for the host's request and runs it. The
/// fiber accepts a single message; the inbox is closed as soon as it arrives.
pub async fn start_task_poller_fiber<A: TaskApi>(
    poller: TaskPoller<A>,
    mut inbox: mpsc::UnboundedReceiver<Value>,
    shutdown: Arc<Shutdown<ShutdownReason>>,
) {
    let finalizer_shutdown = shutdown.clone();
    let fiber = tokio::spawn(async move {
        let message = inbox.recv().await;
        drop(inbox);

        let reason = match message {
            None => {
                info!("Host went away before posting a request");
                ShutdownReason::Terminated
            }
            Some(message) => match Request::from_value(message) {
                Err(error) => {
                    warn!("Ignoring request: {}", error);
                    ShutdownReason::Rejected(error)
                }
                Ok(request) => match poller.run(request).await {
                    Ok(_) => ShutdownReason::Completed,
                    Err(error) => ShutdownReason::Failed(error),
                },
            },
        };

        // Triggering runs the shutdown tasks, which abort and await this
        // fiber, so it has to happen outside of it.
        tokio::spawn(async move {
            shutdown.trigger(reason).await;
        });
    });

    finalizer_shutdown
        .register_shutdown_task(
            || {
                Box::pin(async {
                    fiber.abort();
                    info!("Aborted task poller fiber");
                    let exit = fiber.await;
                    info!("task poller exited: {:?}", exit);
                })
            },
            "task poller",
        )
        .await;
}
