//! Session runner with channel-based input delivery.
//!
//! The `SessionRunner` owns an mpsc channel of inbound messages and resumes
//! the addressed sessions of one published workflow.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::ExecutionEngine;
use crate::error::EngineError;
use crate::events::{ExecutionNotifier, NoopNotifier};
use crate::publish::PublishedWorkflow;

/// Input addressed to a waiting session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
  pub session_id: String,
  pub input: serde_json::Value,
}

/// Resumes sessions of one workflow as inbound messages arrive.
///
/// # Usage
///
/// ```ignore
/// let runner = SessionRunner::new(engine, workflow);
///
/// // Hand the sender to whatever receives inbound messages
/// let sender = runner.sender();
///
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct SessionRunner<N: ExecutionNotifier = NoopNotifier> {
  sender: mpsc::Sender<InboundMessage>,
  receiver: mpsc::Receiver<InboundMessage>,
  engine: Arc<ExecutionEngine<N>>,
  workflow: Arc<PublishedWorkflow>,
}

impl<N: ExecutionNotifier> SessionRunner<N> {
  pub fn new(engine: Arc<ExecutionEngine<N>>, workflow: Arc<PublishedWorkflow>) -> Self {
    Self::with_buffer_size(engine, workflow, 100)
  }

  pub fn with_buffer_size(
    engine: Arc<ExecutionEngine<N>>,
    workflow: Arc<PublishedWorkflow>,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      engine,
      workflow,
    }
  }

  /// A sender handle for inbound messages.
  pub fn sender(&self) -> mpsc::Sender<InboundMessage> {
    self.sender.clone()
  }

  /// Queue an inbound message.
  pub async fn deliver(&self, message: InboundMessage) -> Result<(), EngineError> {
    self
      .sender
      .send(message)
      .await
      .map_err(|_| EngineError::ChannelClosed)
  }

  /// Resume sessions until the token is cancelled or every sender is gone.
  ///
  /// Messages are handled one at a time, so a session is never driven twice
  /// concurrently by the same runner.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    let workflow_id = self.workflow.workflow_id().to_string();
    info!(workflow_id = %workflow_id, "session_runner_started");

    // The runner's own sender would keep the channel open forever.
    drop(self.sender);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(workflow_id = %workflow_id, "session_runner_cancelled");
          break;
        }
        message = self.receiver.recv() => {
          let Some(message) = message else {
            info!(workflow_id = %workflow_id, "session_runner_channel_closed");
            break;
          };

          match self.engine.resume(&self.workflow, &message.session_id, message.input).await {
            Ok(session) => info!(
              workflow_id = %workflow_id,
              session_id = %session.session_id,
              status = ?session.status,
              "session_input_handled"
            ),
            Err(e @ (EngineError::NotWaiting { .. }
              | EngineError::SessionBusy { .. }
              | EngineError::WorkflowMismatch { .. }
              | EngineError::VersionMismatch { .. })) => warn!(
              workflow_id = %workflow_id,
              session_id = %message.session_id,
              error = %e,
              "session_input_rejected"
            ),
            Err(e) => error!(
              workflow_id = %workflow_id,
              session_id = %message.session_id,
              error = %e,
              "session_input_failed"
            ),
          }
        }
      }
    }

    Ok(())
  }
}
