//! Orchestra Resilience
//!
//! Protection for calls to unreliable collaborators (remote platforms,
//! messaging providers, webhooks).
//!
//! - [`CircuitBreaker`] is a three-state breaker (closed, open, half-open) with
//!   a per-call deadline. One instance exists per collaborator and is shared by
//!   every caller addressing it.
//! - [`BreakerRegistry`] owns the breakers. It is built once at startup and
//!   never creates breakers on demand.
//! - [`RetryPolicy`] retries errors that report themselves as [`Retryable`],
//!   with bounded backoff.
//! - [`ProtectedCall`] composes the two: retry on the outside, breaker on the
//!   inside, so an open circuit ends the retry loop immediately.

mod breaker;
mod error;
mod protected;
mod registry;
mod retry;

pub use breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use error::{CallError, CollaboratorError, ResilienceError, Retryable};
pub use protected::ProtectedCall;
pub use registry::{BreakerRegistry, BreakerRegistryBuilder};
pub use retry::{Backoff, RetryPolicy};
