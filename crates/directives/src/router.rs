use std::sync::Arc;

use async_trait::async_trait;

use crate::{BlockingPolicy, Directive, DirectiveCompletion};

/// The processor's view of whatever routes directives to their handlers.
///
/// None of these calls are made while the processor holds its internal lock,
/// so implementations may call back into a [`DirectiveCompletion`] from any
/// of them, synchronously or later from another task.
#[async_trait]
pub trait DirectiveRouter: Send + Sync {
    /// Validate and prepare a directive before it is queued.
    ///
    /// Returning `false` rejects the directive: it is never queued and no
    /// lifecycle events are emitted for it. The completion handle may be
    /// stored and used later, or consumed before returning.
    async fn pre_handle(&self, directive: Arc<Directive>, completion: DirectiveCompletion) -> bool;

    /// Blocking policy of the handler that owns this directive's kind.
    fn policy_for(&self, directive: &Directive) -> BlockingPolicy;

    /// Start executing a previously pre-handled directive.
    ///
    /// Long-running work must not be awaited here: return once the work has
    /// started and signal the outcome through the completion handle.
    async fn handle(&self, directive: Arc<Directive>) -> bool;

    /// Stop a directive that was superseded. Fire-and-forget.
    async fn cancel(&self, directive: Arc<Directive>);
}
