use api::HttpTaskApi;
use futures_util::StreamExt;
use serde_json::Value;
use shutdown::shutdown_reason::ShutdownReason;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use worker::TaskWorker;
use worker_config::WorkerConfig;

mod api;
mod error;
mod shutdown;
mod task_poller;
mod worker;
mod worker_config;

/// Reads envelopes from stdin, one JSON object per line. Blank lines are
/// skipped. A line that is not JSON is passed on untouched so the worker
/// rejects it like any other malformed request.
async fn next_message<S>(lines: &mut S) -> Option<Value>
where
  S: futures_util::stream::Stream<Item = std::io::Result<String>> + Unpin,
{
  while let Some(line) = lines.next().await {
    match line {
      Ok(line) if line.trim().is_empty() => continue,
      Ok(line) => return Some(serde_json::from_str(&line).unwrap_or(Value::String(line))),
      Err(error) => {
        warn!("Failed to read from stdin: {}", error);
        return None;
      }
    }
  }
  None
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // stdout carries notifications, so logs go to stderr.
  let subscriber = tracing_subscriber::FmtSubscriber::builder()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .finish();

  tracing::subscriber::set_global_default(subscriber)?;

  let config = WorkerConfig::from_env()?;
  let dialect = config.dialect;
  let api = HttpTaskApi::new(&config)?;

  let (worker, mut notifications) = TaskWorker::spawn(api, &config).await;

  let writer = tokio::spawn(async move {
    let mut stdout = tokio::io::stdout();
    while let Some(notification) = notifications.recv().await {
      match notification.to_wire(dialect) {
        Ok(wire) => {
          stdout.write_all(format!("{}\n", wire).as_bytes()).await?;
          stdout.flush().await?;
        }
        Err(error) => error!("Failed to encode {} notification: {}", notification.kind(), error),
      }
    }
    Ok::<(), std::io::Error>(())
  });

  let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

  tokio::select! {
    message = next_message(&mut lines) => match message {
      Some(message) => worker.post_message(message)?,
      None => {
        info!("stdin closed before a request arrived");
        worker.terminate().await;
      }
    },
    _ = tokio::signal::ctrl_c() => {
      info!("Received Ctrl-C, terminating worker");
      worker.terminate().await;
    }
  }

  let terminator = worker.terminator();
  let interrupt = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("Received Ctrl-C, terminating worker");
      terminator.trigger(ShutdownReason::Terminated).await;
    }
  });

  let shutdown_reason = worker.await_shutdown().await?;
  interrupt.abort();

  info!("Shutting down due to: {:?}", shutdown_reason);

  writer.await??;

  Ok(())
}
