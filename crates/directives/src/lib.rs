//! Directive dispatch core.
//!
//! Directives arrive already decoded from the transport and are fed to a
//! [`DirectiveProcessor`]. The processor asks a [`DirectiveRouter`] to
//! pre-handle each one, queues it with the router's [`BlockingPolicy`], and
//! runs a single background worker that dispatches queued directives as soon
//! as the mediums they need are free within their dialog turn.
//!
//! Every dispatched directive ends in exactly one of completed, failed, or
//! canceled. Listeners observe each transition through [`DirectiveListener`].

pub mod completion;
pub mod directive;
pub mod error;
pub mod listener;
pub mod policy;
pub mod processor;
pub mod registry;
pub mod router;
mod state;

pub use {
    completion::DirectiveCompletion,
    directive::{Directive, NamespaceAndName},
    error::{Error, Result},
    listener::{DirectiveEvent, DirectiveListener, EventBroadcaster},
    policy::{BlockingPolicy, Medium},
    processor::{DirectiveProcessor, DispatchSnapshot},
    registry::{DirectiveHandler, HandlerRegistry},
    router::DirectiveRouter,
};
