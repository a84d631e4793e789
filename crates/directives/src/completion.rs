use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{Directive, processor::Shared, state::Tracked};

/// One-shot result handle for a single submitted directive.
///
/// Handed to the router at pre-handle time. Consuming `self` means a handle
/// reports at most one outcome; reporting after the directive was already
/// canceled, or after the processor is gone, does nothing.
pub struct DirectiveCompletion {
    tracked: Tracked,
    processor: Weak<Shared>,
}

impl DirectiveCompletion {
    pub(crate) fn new(tracked: Tracked, processor: Weak<Shared>) -> Self {
        Self { tracked, processor }
    }

    pub fn directive(&self) -> &Arc<Directive> {
        &self.tracked.directive
    }

    /// Report successful completion and free the directive's mediums.
    pub fn complete(self) {
        if let Some(shared) = self.processor.upgrade() {
            shared.completed(&self.tracked);
        }
    }

    /// Report failure. With `cancel_all`, every other directive of the same
    /// dialog turn is canceled as well.
    pub fn fail(self, description: impl Into<String>, cancel_all: bool) {
        if let Some(shared) = self.processor.upgrade() {
            shared.failed(&self.tracked, &description.into(), cancel_all);
        }
    }
}

impl fmt::Debug for DirectiveCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveCompletion")
            .field("message_id", &self.tracked.directive.message_id)
            .finish()
    }
}
