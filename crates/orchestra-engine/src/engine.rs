//! Session traversal.
//!
//! The engine walks a published workflow one node at a time. After every
//! node the session is saved, so a crash loses at most the node in flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use orchestra_config::EngineSettings;
use orchestra_store::SessionStore;
use orchestra_workflow::{SessionStatus, VisitOutcome, WorkflowSession};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::executor::{Flow, NodeContext};
use crate::interpolate::Interpolator;
use crate::publish::PublishedWorkflow;

/// Drives workflow sessions.
///
/// Generic over `N: ExecutionNotifier`. Use `ExecutionEngine::new()` for an
/// engine that discards events, or `with_notifier` to observe them.
pub struct ExecutionEngine<N: ExecutionNotifier = NoopNotifier> {
  sessions: Arc<dyn SessionStore>,
  settings: EngineSettings,
  interpolator: Interpolator,
  notifier: N,
  /// Sessions currently being resumed by this engine.
  resuming: Mutex<HashSet<String>>,
}

/// Marks a session as being resumed until dropped.
struct ResumeClaim<'a> {
  resuming: &'a Mutex<HashSet<String>>,
  session_id: String,
}

impl Drop for ResumeClaim<'_> {
  fn drop(&mut self) {
    self.resuming.lock().remove(&self.session_id);
  }
}

impl ExecutionEngine<NoopNotifier> {
  pub fn new(sessions: Arc<dyn SessionStore>, settings: EngineSettings) -> Self {
    Self::with_notifier(sessions, settings, NoopNotifier)
  }
}

impl<N: ExecutionNotifier> ExecutionEngine<N> {
  pub fn with_notifier(sessions: Arc<dyn SessionStore>, settings: EngineSettings, notifier: N) -> Self {
    Self {
      sessions,
      settings,
      interpolator: Interpolator::new(),
      notifier,
      resuming: Mutex::new(HashSet::new()),
    }
  }

  /// Create a session at the workflow's entry node and drive it until it
  /// waits, transfers, completes or fails.
  ///
  /// `input` is offered to the nodes of this drive like a resume input.
  pub async fn start(
    &self,
    workflow: &PublishedWorkflow,
    variables: Map<String, Value>,
    input: Option<Value>,
  ) -> Result<WorkflowSession, EngineError> {
    let session = WorkflowSession::new(workflow.workflow(), variables);
    self.sessions.save_session(&session).await?;

    info!(
      workflow_id = %session.workflow_id,
      session_id = %session.session_id,
      node_id = %session.current_node_id,
      "session_started"
    );
    self.notifier.notify(ExecutionEvent::SessionStarted {
      session_id: session.session_id.clone(),
      workflow_id: session.workflow_id.clone(),
    });

    self.drive(workflow, session, input).await
  }

  /// Resume a waiting session with inbound input, at the node it waits on.
  ///
  /// A session already being resumed by this engine is rejected with
  /// `SessionBusy`. The claim is in-process only: engines in separate
  /// processes sharing one store must route a session's input to one of them.
  pub async fn resume(
    &self,
    workflow: &PublishedWorkflow,
    session_id: &str,
    input: Value,
  ) -> Result<WorkflowSession, EngineError> {
    let _claim = self.claim(session_id)?;
    let mut session = self.sessions.get_session(session_id).await?;

    if session.workflow_id != workflow.workflow_id() {
      return Err(EngineError::WorkflowMismatch {
        session_id: session.session_id,
        expected: workflow.workflow_id().to_string(),
        actual: session.workflow_id,
      });
    }
    if session.workflow_version != workflow.workflow().version {
      return Err(EngineError::VersionMismatch {
        session_id: session.session_id,
        session_version: session.workflow_version,
        published_version: workflow.workflow().version,
      });
    }
    if session.status != SessionStatus::WaitingForInput {
      return Err(EngineError::NotWaiting {
        session_id: session.session_id,
        status: session.status,
      });
    }

    session.status = SessionStatus::Running;
    info!(
      workflow_id = %session.workflow_id,
      session_id = %session.session_id,
      node_id = %session.current_node_id,
      "session_resumed"
    );
    self.notifier.notify(ExecutionEvent::SessionResumed {
      session_id: session.session_id.clone(),
      node_id: session.current_node_id.clone(),
    });

    self.drive(workflow, session, Some(input)).await
  }

  fn claim(&self, session_id: &str) -> Result<ResumeClaim<'_>, EngineError> {
    if !self.resuming.lock().insert(session_id.to_string()) {
      return Err(EngineError::SessionBusy {
        session_id: session_id.to_string(),
      });
    }
    Ok(ResumeClaim {
      resuming: &self.resuming,
      session_id: session_id.to_string(),
    })
  }

  pub async fn get_session(&self, session_id: &str) -> Result<WorkflowSession, EngineError> {
    Ok(self.sessions.get_session(session_id).await?)
  }

  /// Run nodes while the session is running, saving after each one.
  ///
  /// Node failures fail the session; only store errors are returned.
  #[instrument(
    name = "session_drive",
    skip_all,
    fields(workflow_id = %workflow.workflow_id(), session_id = %session.session_id)
  )]
  async fn drive(
    &self,
    workflow: &PublishedWorkflow,
    mut session: WorkflowSession,
    mut input: Option<Value>,
  ) -> Result<WorkflowSession, EngineError> {
    let max_steps = self.settings.max_steps_per_run;
    let mut steps = 0;

    while session.status == SessionStatus::Running {
      if steps >= max_steps {
        let node_id = session.current_node_id.clone();
        warn!(
          workflow_id = %session.workflow_id,
          session_id = %session.session_id,
          node_id = %node_id,
          max_steps,
          "session_step_limit_exceeded"
        );
        self.fail(
          &mut session,
          &node_id,
          format!("exceeded {max_steps} node executions in one run"),
        );
        self.sessions.save_session(&session).await?;
        break;
      }
      steps += 1;

      self.step(workflow, &mut session, &mut input).await;
      self.sessions.save_session(&session).await?;
    }

    Ok(session)
  }

  /// Execute the current node and apply its result to the session.
  async fn step(
    &self,
    workflow: &PublishedWorkflow,
    session: &mut WorkflowSession,
    input: &mut Option<Value>,
  ) {
    let node_id = session.current_node_id.clone();
    let (Some(node), Some(executor)) = (
      workflow.workflow().get_node(&node_id),
      workflow.executor(&node_id),
    ) else {
      self.fail(session, &node_id, format!("node '{node_id}' is not part of the workflow"));
      return;
    };

    self.notifier.notify(ExecutionEvent::NodeStarted {
      session_id: session.session_id.clone(),
      node_id: node_id.clone(),
    });

    let started = Instant::now();
    let data = self.interpolator.interpolate(&node.data, &session.variables);
    let result = {
      let ctx = NodeContext {
        workflow_id: &session.workflow_id,
        session_id: &session.session_id,
        node,
        data: &data,
        variables: &session.variables,
        input: input.as_ref(),
        protection: workflow.protection(&node_id),
      };
      executor.execute(&ctx).await
    };
    if executor.consumes_input() {
      input.take();
    }
    let duration_ms = started.elapsed().as_millis() as u64;

    let result = match result {
      Ok(result) => result,
      Err(e) => {
        error!(
          workflow_id = %session.workflow_id,
          session_id = %session.session_id,
          node_id = %node_id,
          node_type = %node.kind,
          outcome = "failed",
          duration_ms,
          error = %e,
          "node_failed"
        );
        self.fail(session, &node_id, e.to_string());
        return;
      }
    };

    session.merge_output(&result.output);
    self.notifier.notify(ExecutionEvent::NodeCompleted {
      session_id: session.session_id.clone(),
      node_id: node_id.clone(),
      output: result.output,
    });

    let outcome = match result.flow {
      Flow::Continue => {
        let next = match result.next_node_id {
          Some(next) if !node.has_successor(&next) => {
            self.fail(
              session,
              &node_id,
              format!("executor chose '{next}', which is not a successor of '{node_id}'"),
            );
            return;
          }
          Some(next) => Some(next),
          None => node.default_next().map(str::to_string),
        };
        match next {
          Some(next) => {
            session.record_visit(&node_id, VisitOutcome::Continued);
            session.current_node_id = next;
            VisitOutcome::Continued
          }
          None => VisitOutcome::Completed,
        }
      }
      Flow::WaitForInput => VisitOutcome::WaitingForInput,
      Flow::TransferToHuman => VisitOutcome::Transferred,
      Flow::Complete => VisitOutcome::Completed,
    };
    if outcome != VisitOutcome::Continued {
      session.record_visit(&node_id, outcome);
    }

    info!(
      workflow_id = %session.workflow_id,
      session_id = %session.session_id,
      node_id = %node_id,
      node_type = %node.kind,
      outcome = ?outcome,
      duration_ms,
      "node_completed"
    );
    self.announce(session, &node_id, outcome);
  }

  fn announce(&self, session: &WorkflowSession, node_id: &str, outcome: VisitOutcome) {
    let session_id = session.session_id.clone();
    let node_id = node_id.to_string();
    let event = match outcome {
      VisitOutcome::Continued | VisitOutcome::Failed => return,
      VisitOutcome::WaitingForInput => {
        info!(
          workflow_id = %session.workflow_id,
          session_id = %session_id,
          node_id = %node_id,
          outcome = "waiting_for_input",
          "session_waiting"
        );
        ExecutionEvent::SessionWaiting {
          session_id,
          node_id,
        }
      }
      VisitOutcome::Transferred => {
        info!(
          workflow_id = %session.workflow_id,
          session_id = %session_id,
          node_id = %node_id,
          outcome = "transferred",
          "session_transferred"
        );
        ExecutionEvent::SessionTransferred {
          session_id,
          node_id,
        }
      }
      VisitOutcome::Completed => {
        info!(
          workflow_id = %session.workflow_id,
          session_id = %session_id,
          node_id = %node_id,
          outcome = "completed",
          steps_taken = session.steps_taken,
          "session_completed"
        );
        ExecutionEvent::SessionCompleted { session_id }
      }
    };
    self.notifier.notify(event);
  }

  fn fail(&self, session: &mut WorkflowSession, node_id: &str, error: String) {
    session.fail(node_id, error.clone());
    error!(
      workflow_id = %session.workflow_id,
      session_id = %session.session_id,
      node_id,
      error = %error,
      "session_failed"
    );
    self.notifier.notify(ExecutionEvent::NodeFailed {
      session_id: session.session_id.clone(),
      node_id: node_id.to_string(),
      error: error.clone(),
    });
    self.notifier.notify(ExecutionEvent::SessionFailed {
      session_id: session.session_id.clone(),
      error,
    });
  }
}
