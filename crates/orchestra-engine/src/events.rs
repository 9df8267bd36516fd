//! Execution events and notifiers for observability.
//!
//! Events are emitted while sessions are driven so consumers can observe
//! progress, stream it to a UI, or keep an audit trail.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a session is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  SessionStarted {
    session_id: String,
    workflow_id: String,
  },

  SessionResumed {
    session_id: String,
    node_id: String,
  },

  NodeStarted {
    session_id: String,
    node_id: String,
  },

  NodeCompleted {
    session_id: String,
    node_id: String,
    output: serde_json::Value,
  },

  NodeFailed {
    session_id: String,
    node_id: String,
    error: String,
  },

  /// The session is parked at `node_id` until input arrives.
  SessionWaiting {
    session_id: String,
    node_id: String,
  },

  SessionTransferred {
    session_id: String,
    node_id: String,
  },

  SessionCompleted { session_id: String },

  SessionFailed { session_id: String, error: String },
}

/// Receives execution events.
///
/// The engine calls `notify` for each event. Implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a session.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
