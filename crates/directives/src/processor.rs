//! The directive processor: submission, the dispatch worker, and turn
//! scrubbing.

use std::sync::{Arc, Mutex, MutexGuard};

use {
    serde::Serialize,
    tokio::{sync::Notify, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    vesper_config::DirectivesConfig,
};

#[cfg(feature = "metrics")]
use vesper_metrics::{counter, directives as directive_metrics, gauge, histogram, labels};

use crate::{
    Directive, DirectiveCompletion, DirectiveEvent, DirectiveListener, DirectiveRouter,
    listener::ListenerSet,
    state::{DispatchState, PreHandleSlot, Queued, ScrubScope, Tracked},
};

/// Point-in-time view of the processor's queues, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub enabled: bool,
    /// Message id of the directive currently being pre-handled.
    pub pre_handling: Option<String>,
    /// Directives waiting for their mediums.
    pub queued: usize,
    /// Message ids of directives currently holding a medium.
    pub claim_holders: Vec<String>,
    /// Directives scrubbed but not yet reported as canceled.
    pub canceling: usize,
}

/// State shared between the processor handle, its worker task, and every
/// outstanding [`DirectiveCompletion`].
pub(crate) struct Shared {
    router: Arc<dyn DirectiveRouter>,
    state: Mutex<DispatchState>,
    wake: Notify,
    listeners: ListenerSet,
    handle_failure_description: String,
    scrub_turn_on_handle_failure: bool,
    shutdown: CancellationToken,
}

impl Shared {
    /// The coarse lock. Never held across an `.await` or a call into the
    /// router or a listener.
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: DirectiveEvent) {
        self.listeners.emit(&event);
    }

    pub(crate) fn completed(&self, tracked: &Tracked) {
        if tracked.settle() {
            debug!(message_id = %tracked.directive.message_id, "directive completed");
            #[cfg(feature = "metrics")]
            counter!(directive_metrics::COMPLETED_TOTAL).increment(1);
            self.emit(DirectiveEvent::Completed {
                directive: Arc::clone(&tracked.directive),
            });
        }
        self.finish(tracked, None);
    }

    pub(crate) fn failed(&self, tracked: &Tracked, description: &str, cancel_all: bool) {
        if tracked.settle() {
            info!(
                message_id = %tracked.directive.message_id,
                dialog_request_id = %tracked.turn(),
                description,
                cancel_all,
                "directive failed"
            );
            #[cfg(feature = "metrics")]
            counter!(directive_metrics::FAILED_TOTAL).increment(1);
            self.emit(DirectiveEvent::Failed {
                directive: Arc::clone(&tracked.directive),
                description: description.to_string(),
            });
        }
        let scope = cancel_all.then(|| ScrubScope::for_turn(tracked.turn()));
        self.finish(tracked, scope);
    }

    /// Remove a settled directive everywhere, optionally scrub, and wake the
    /// worker if anything is still waiting.
    fn finish(&self, tracked: &Tracked, scrub: Option<ScrubScope>) {
        let pending = {
            let mut state = self.lock();
            state.remove(tracked);
            if let Some(scope) = &scrub {
                state.scrub(scope);
            }
            state.has_pending()
        };
        if pending {
            self.wake.notify_one();
        }
    }

    fn scrub(&self, scope: &ScrubScope) -> bool {
        let changed = self.lock().scrub(scope);
        if changed {
            debug!(?scope, "scrubbed directives");
            self.wake.notify_one();
        }
        changed
    }

    async fn run(self: Arc<Self>) {
        debug!("directive worker started");
        loop {
            self.drain().await;
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.wake.notified() => {},
            }
        }
        debug!("directive worker stopped");
    }

    /// Alternate between the cancellation and handling queues until a full
    /// pass makes no progress.
    async fn drain(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            let canceled = self.drain_cancellation().await;
            let handled = self.drain_handling().await;
            if !canceled && !handled {
                return;
            }
        }
    }

    async fn drain_cancellation(&self) -> bool {
        let batch = {
            let mut state = self.lock();
            state.take_canceling()
        };
        if batch.is_empty() {
            return false;
        }

        for tracked in batch {
            // Completed or failed while it sat in the queue.
            if !tracked.settle() {
                continue;
            }
            debug!(
                message_id = %tracked.directive.message_id,
                dialog_request_id = %tracked.turn(),
                "canceling directive"
            );
            self.router.cancel(Arc::clone(&tracked.directive)).await;
            #[cfg(feature = "metrics")]
            counter!(directive_metrics::CANCELED_TOTAL).increment(1);
            self.emit(DirectiveEvent::Canceled {
                directive: Arc::clone(&tracked.directive),
            });
        }
        true
    }

    async fn drain_handling(&self) -> bool {
        let mut progressed = false;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let next = {
                let mut state = self.lock();
                let next = state.take_next();
                #[cfg(feature = "metrics")]
                gauge!(directive_metrics::QUEUE_DEPTH).set(state.queued_len() as f64);
                next
            };
            let Some(Queued { tracked, policy }) = next else {
                break;
            };
            progressed = true;

            let directive = Arc::clone(&tracked.directive);
            debug!(
                message_id = %directive.message_id,
                dialog_request_id = %directive.dialog_request_id,
                namespace = %directive.namespace,
                name = %directive.name,
                %policy,
                "dispatching directive"
            );
            self.emit(DirectiveEvent::Requested {
                directive: Arc::clone(&directive),
            });

            #[cfg(feature = "metrics")]
            let started = std::time::Instant::now();
            let accepted = self.router.handle(Arc::clone(&directive)).await;
            #[cfg(feature = "metrics")]
            {
                counter!(
                    directive_metrics::DISPATCHED_TOTAL,
                    labels::NAMESPACE => directive.namespace.clone(),
                    labels::NAME => directive.name.clone()
                )
                .increment(1);
                histogram!(directive_metrics::HANDLE_DURATION_SECONDS)
                    .record(started.elapsed().as_secs_f64());
            }

            if !accepted && tracked.settle() {
                warn!(
                    message_id = %directive.message_id,
                    dialog_request_id = %directive.dialog_request_id,
                    "handler rejected directive"
                );
                #[cfg(feature = "metrics")]
                counter!(directive_metrics::FAILED_TOTAL).increment(1);
                self.emit(DirectiveEvent::Failed {
                    directive: Arc::clone(&directive),
                    description: self.handle_failure_description.clone(),
                });
            }

            {
                let mut state = self.lock();
                if !accepted || !policy.is_blocking() {
                    state.release_claims(&tracked);
                }
                if !accepted && self.scrub_turn_on_handle_failure {
                    state.scrub(&ScrubScope::for_turn(tracked.turn()));
                }
            }
        }
        progressed
    }
}

/// Accepts decoded directives and executes them through a
/// [`DirectiveRouter`], one dialog turn's mediums at a time.
///
/// Creating a processor spawns its worker on the current Tokio runtime.
/// Dropping it stops the worker; [`DirectiveProcessor::shutdown`] also
/// waits for the worker to exit.
pub struct DirectiveProcessor {
    shared: Arc<Shared>,
    submit_lock: tokio::sync::Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DirectiveProcessor {
    pub fn new(router: Arc<dyn DirectiveRouter>) -> Self {
        Self::with_config(router, &DirectivesConfig::default())
    }

    pub fn with_config(router: Arc<dyn DirectiveRouter>, config: &DirectivesConfig) -> Self {
        let shared = Arc::new(Shared {
            router,
            state: Mutex::new(DispatchState::default()),
            wake: Notify::new(),
            listeners: ListenerSet::default(),
            handle_failure_description: config.handle_failure_description.clone(),
            scrub_turn_on_handle_failure: config.scrub_turn_on_handle_failure,
            shutdown: CancellationToken::new(),
        });
        let worker = tokio::spawn(Arc::clone(&shared).run());
        Self {
            shared,
            submit_lock: tokio::sync::Mutex::new(()),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Pre-handle a directive and queue it for dispatch.
    ///
    /// Returns `false` if the router rejected it at pre-handle time or the
    /// processor has been shut down. Submissions are pre-handled strictly
    /// one at a time.
    pub async fn submit(&self, directive: impl Into<Arc<Directive>>) -> bool {
        let directive = directive.into();
        if self.shared.shutdown.is_cancelled() {
            warn!(message_id = %directive.message_id, "directive submitted after shutdown");
            return false;
        }

        let _submitting = self.submit_lock.lock().await;
        #[cfg(feature = "metrics")]
        counter!(directive_metrics::SUBMITTED_TOTAL).increment(1);

        let tracked = Tracked::new(Arc::clone(&directive));
        self.shared.lock().begin_pre_handle(tracked.clone());

        let completion = DirectiveCompletion::new(tracked.clone(), Arc::downgrade(&self.shared));
        let accepted = self
            .shared
            .router
            .pre_handle(Arc::clone(&directive), completion)
            .await;
        let policy = accepted.then(|| self.shared.router.policy_for(&directive));

        let mut state = self.shared.lock();
        let slot = state.finish_pre_handle(&tracked);
        let Some(policy) = policy else {
            drop(state);
            // Silent even if a scrub covered it meanwhile.
            tracked.settle();
            debug!(message_id = %directive.message_id, "directive rejected at pre-handle");
            #[cfg(feature = "metrics")]
            counter!(directive_metrics::REJECTED_TOTAL).increment(1);
            return false;
        };

        match slot {
            PreHandleSlot::Gone => {
                debug!(message_id = %directive.message_id, "directive settled during pre-handle");
                return true;
            },
            PreHandleSlot::Scrubbed => {
                debug!(
                    message_id = %directive.message_id,
                    dialog_request_id = %directive.dialog_request_id,
                    "directive scrubbed during pre-handle"
                );
                state.cancel(tracked);
            },
            PreHandleSlot::Present => {
                debug!(
                    message_id = %directive.message_id,
                    dialog_request_id = %directive.dialog_request_id,
                    %policy,
                    "directive queued"
                );
                state.enqueue(tracked, policy);
            },
        }
        drop(state);
        self.shared.wake.notify_one();
        true
    }

    /// Cancel every directive of one dialog turn that has not completed.
    /// An empty id cancels every turn. Returns whether anything was
    /// canceled.
    pub fn scrub(&self, dialog_request_id: &str) -> bool {
        self.shared.scrub(&ScrubScope::for_turn(dialog_request_id))
    }

    /// Cancel everything in flight and mark the processor disabled.
    ///
    /// Submissions are still accepted; callers decide what disabled means
    /// for new directives.
    pub fn disable(&self) {
        {
            let mut state = self.shared.lock();
            state.scrub(&ScrubScope::All);
            state.set_enabled(false);
        }
        info!("directive processor disabled");
        self.shared.wake.notify_one();
    }

    pub fn enable(&self) -> bool {
        self.shared.lock().set_enabled(true);
        info!("directive processor enabled");
        true
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.lock().is_enabled()
    }

    pub fn add_listener(&self, listener: Arc<dyn DirectiveListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DirectiveListener>) -> bool {
        self.shared.listeners.remove(listener)
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        let state = self.shared.lock();
        DispatchSnapshot {
            enabled: state.is_enabled(),
            pre_handling: state
                .pre_handling()
                .map(|t| t.directive.message_id.clone()),
            queued: state.queued_len(),
            claim_holders: state.claim_holders(),
            canceling: state.canceling_len(),
        }
    }

    /// Stop the worker and wait for it to exit. Directives still queued are
    /// left unreported.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.wake.notify_one();
        let worker = {
            let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
            worker.take()
        };
        if let Some(handle) = worker
            && let Err(e) = handle.await
        {
            warn!(error = %e, "directive worker ended abnormally");
        }
        info!("directive processor stopped");
    }
}

impl Drop for DirectiveProcessor {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
