use task_poller_core::EnvelopeError;

use crate::error::PollError;

/// Why a worker stopped. Only `Completed` and `Failed` are preceded by a
/// terminal notification.
#[derive(Debug)]
pub enum ShutdownReason {
  /// A `RESULT` was posted.
  Completed,
  /// An `ERROR` was posted.
  Failed(PollError),
  /// The posted message was not a request this worker handles.
  Rejected(EnvelopeError),
  /// The host terminated the worker or went away before posting a request.
  Terminated,
}
