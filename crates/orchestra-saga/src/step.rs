use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::SagaContext;
use crate::error::StepError;

/// One step of a saga: a forward action and its compensation.
#[async_trait]
pub trait SagaStep: Send + Sync {
  /// Name, unique within its definition.
  fn name(&self) -> &str;

  /// Run the forward action against the accumulated context. The output is
  /// merged into the context for later steps.
  async fn execute(&self, context: &SagaContext) -> Result<Value, StepError>;

  /// Undo or mitigate the forward action. Receives the context as it stood
  /// right after this step completed and the step's own output.
  ///
  /// Must be idempotent.
  async fn compensate(&self, context: &SagaContext, output: &Value) -> Result<(), StepError> {
    let _ = (context, output);
    Ok(())
  }

  /// Whether this step has anything to compensate.
  fn has_compensation(&self) -> bool {
    true
  }
}

type ExecuteFn = Box<dyn Fn(SagaContext) -> BoxFuture<'static, Result<Value, StepError>> + Send + Sync>;
type CompensateFn =
  Box<dyn Fn(SagaContext, Value) -> BoxFuture<'static, Result<(), StepError>> + Send + Sync>;

/// A step built from closures.
pub struct FnStep {
  name: String,
  execute: ExecuteFn,
  compensate: Option<CompensateFn>,
}

impl FnStep {
  pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
  where
    F: Fn(SagaContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      execute: Box::new(move |ctx| execute(ctx).boxed()),
      compensate: None,
    }
  }

  pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
  where
    F: Fn(SagaContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StepError>> + Send + 'static,
  {
    self.compensate = Some(Box::new(move |ctx, output| {
      compensate(ctx, output).boxed()
    }));
    self
  }
}

impl fmt::Debug for FnStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FnStep")
      .field("name", &self.name)
      .field("has_compensation", &self.compensate.is_some())
      .finish()
  }
}

#[async_trait]
impl SagaStep for FnStep {
  fn name(&self) -> &str {
    &self.name
  }

  async fn execute(&self, context: &SagaContext) -> Result<Value, StepError> {
    (self.execute)(context.clone()).await
  }

  async fn compensate(&self, context: &SagaContext, output: &Value) -> Result<(), StepError> {
    match &self.compensate {
      Some(compensate) => compensate(context.clone(), output.clone()).await,
      None => Ok(()),
    }
  }

  fn has_compensation(&self) -> bool {
    self.compensate.is_some()
  }
}
