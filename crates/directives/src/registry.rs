//! Routing table from directive kinds to handlers.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
};

use crate::{
    BlockingPolicy, Directive, DirectiveCompletion, DirectiveRouter, Error, NamespaceAndName,
    Result,
};

/// Executes one or more directive kinds (speech, audio playback, display
/// cards, volume, ...).
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    /// Handler name used in logs and conflict errors.
    fn name(&self) -> &str;

    /// Directive kinds this handler owns, with the policy each runs under.
    fn configuration(&self) -> Vec<(NamespaceAndName, BlockingPolicy)>;

    /// Prepare a directive. Keep the completion handle to report the outcome
    /// once [`DirectiveHandler::handle`] has finished the work.
    async fn pre_handle(&self, directive: Arc<Directive>, completion: DirectiveCompletion)
    -> bool;

    /// Start executing a pre-handled directive.
    async fn handle(&self, directive: Arc<Directive>) -> bool;

    /// Stop a pre-handled or executing directive and drop its completion.
    async fn cancel(&self, directive: Arc<Directive>);
}

#[derive(Clone)]
struct Route {
    handler: Arc<dyn DirectiveHandler>,
    policy: BlockingPolicy,
}

/// [`DirectiveRouter`] backed by registered [`DirectiveHandler`]s.
///
/// Directives of unregistered kinds are rejected at pre-handle.
#[derive(Default)]
pub struct HandlerRegistry {
    routes: RwLock<HashMap<NamespaceAndName, Route>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every kind the handler declares. Nothing is registered if
    /// any kind already belongs to another handler.
    pub fn add_handler(&self, handler: Arc<dyn DirectiveHandler>) -> Result<()> {
        let configuration = handler.configuration();
        if configuration.is_empty() {
            return Err(Error::empty_configuration(handler.name()));
        }

        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        for (kind, _) in &configuration {
            if let Some(existing) = routes.get(kind) {
                return Err(Error::duplicate_route(kind, existing.handler.name()));
            }
        }
        for (kind, policy) in configuration {
            debug!(handler = handler.name(), %kind, %policy, "directive route added");
            routes.insert(kind, Route {
                handler: Arc::clone(&handler),
                policy,
            });
        }
        info!(handler = handler.name(), "directive handler registered");
        Ok(())
    }

    /// Remove every route owned by the named handler. Returns whether any
    /// route was removed.
    pub fn remove_handler(&self, name: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        let before = routes.len();
        routes.retain(|_, route| route.handler.name() != name);
        let removed = routes.len() != before;
        if removed {
            info!(handler = name, "directive handler removed");
        }
        removed
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<NamespaceAndName> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let mut kinds: Vec<NamespaceAndName> = routes.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    fn route(&self, directive: &Directive) -> Option<Route> {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        routes.get(&directive.kind()).cloned()
    }
}

#[async_trait]
impl DirectiveRouter for HandlerRegistry {
    async fn pre_handle(&self, directive: Arc<Directive>, completion: DirectiveCompletion) -> bool {
        let Some(route) = self.route(&directive) else {
            warn!(
                message_id = %directive.message_id,
                kind = %directive.kind(),
                "no handler for directive"
            );
            return false;
        };
        route.handler.pre_handle(directive, completion).await
    }

    fn policy_for(&self, directive: &Directive) -> BlockingPolicy {
        self.route(directive)
            .map(|route| route.policy)
            .unwrap_or_default()
    }

    async fn handle(&self, directive: Arc<Directive>) -> bool {
        match self.route(&directive) {
            Some(route) => route.handler.handle(directive).await,
            None => {
                warn!(
                    message_id = %directive.message_id,
                    kind = %directive.kind(),
                    "handler removed before directive was handled"
                );
                false
            },
        }
    }

    async fn cancel(&self, directive: Arc<Directive>) {
        if let Some(route) = self.route(&directive) {
            route.handler.cancel(directive).await;
        } else {
            debug!(message_id = %directive.message_id, "cancel for unrouted directive ignored");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use {
        super::*,
        crate::{DirectiveEvent, DirectiveProcessor, EventBroadcaster, Medium},
    };

    /// Speaks for a fixed delay, then completes.
    struct Speaker {
        pending: Mutex<HashMap<String, DirectiveCompletion>>,
        canceled: Mutex<Vec<String>>,
    }

    impl Speaker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pending: Mutex::new(HashMap::new()),
                canceled: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DirectiveHandler for Speaker {
        fn name(&self) -> &str {
            "speaker"
        }

        fn configuration(&self) -> Vec<(NamespaceAndName, BlockingPolicy)> {
            vec![
                (
                    NamespaceAndName::new("SpeechSynthesizer", "Speak"),
                    BlockingPolicy::blocking([Medium::AUDIO]),
                ),
                (
                    NamespaceAndName::new("Speaker", "SetVolume"),
                    BlockingPolicy::non_blocking([Medium::AUDIO]),
                ),
            ]
        }

        async fn pre_handle(
            &self,
            directive: Arc<Directive>,
            completion: DirectiveCompletion,
        ) -> bool {
            self.pending
                .lock()
                .unwrap()
                .insert(directive.message_id.clone(), completion);
            true
        }

        async fn handle(&self, directive: Arc<Directive>) -> bool {
            let Some(completion) = self.pending.lock().unwrap().remove(&directive.message_id)
            else {
                return false;
            };
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                completion.complete();
            });
            true
        }

        async fn cancel(&self, directive: Arc<Directive>) {
            self.pending.lock().unwrap().remove(&directive.message_id);
            self.canceled
                .lock()
                .unwrap()
                .push(directive.message_id.clone());
        }
    }

    struct Silent;

    #[async_trait]
    impl DirectiveHandler for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn configuration(&self) -> Vec<(NamespaceAndName, BlockingPolicy)> {
            Vec::new()
        }

        async fn pre_handle(&self, _: Arc<Directive>, _: DirectiveCompletion) -> bool {
            true
        }

        async fn handle(&self, _: Arc<Directive>) -> bool {
            true
        }

        async fn cancel(&self, _: Arc<Directive>) {}
    }

    #[test]
    fn duplicate_kinds_are_rejected_atomically() {
        let registry = HandlerRegistry::new();
        registry.add_handler(Speaker::new()).unwrap();

        let err = registry.add_handler(Speaker::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { ref existing, .. } if existing == "speaker"));
        assert_eq!(registry.kinds().len(), 2);
    }

    #[test]
    fn empty_configuration_is_rejected() {
        let registry = HandlerRegistry::new();
        let err = registry.add_handler(Arc::new(Silent)).unwrap_err();
        assert_eq!(err.to_string(), "handler silent declares no directives");
    }

    #[test]
    fn remove_handler_drops_all_its_routes() {
        let registry = HandlerRegistry::new();
        registry.add_handler(Speaker::new()).unwrap();

        assert!(registry.remove_handler("speaker"));
        assert!(!registry.remove_handler("speaker"));
        assert!(registry.kinds().is_empty());
    }

    #[test]
    fn policy_lookup_falls_back_to_none() {
        let registry = HandlerRegistry::new();
        registry.add_handler(Speaker::new()).unwrap();

        let speak = Directive::new("SpeechSynthesizer", "Speak", "m");
        assert!(registry.policy_for(&speak).is_blocking());
        let unknown = Directive::new("Alerts", "SetAlert", "m");
        assert_eq!(registry.policy_for(&unknown), BlockingPolicy::none());
    }

    #[tokio::test]
    async fn unknown_directive_is_rejected_at_submit() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.add_handler(Speaker::new()).unwrap();
        let processor = DirectiveProcessor::new(registry);

        let unknown = Directive::new("Alerts", "SetAlert", "m").with_dialog_request_id("t1");
        assert!(!processor.submit(unknown).await);
    }

    #[tokio::test]
    async fn registry_drives_handlers_through_processor() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.add_handler(Speaker::new()).unwrap();
        let processor = DirectiveProcessor::new(registry);
        let events = Arc::new(EventBroadcaster::new(32));
        let mut rx = events.subscribe();
        processor.add_listener(events);

        for id in ["s1", "s2"] {
            let speak = Directive::new("SpeechSynthesizer", "Speak", id).with_dialog_request_id("t1");
            assert!(processor.submit(speak).await);
        }

        let mut seen = Vec::new();
        while seen.len() < 4 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(format!("{}:{}", event.label(), event.directive().message_id));
            if let DirectiveEvent::Failed { .. } | DirectiveEvent::Canceled { .. } = event {
                panic!("unexpected {event:?}");
            }
        }
        assert_eq!(seen, vec![
            "requested:s1",
            "completed:s1",
            "requested:s2",
            "completed:s2"
        ]);
    }

    #[tokio::test]
    async fn scrub_reaches_handler_cancel() {
        let registry = Arc::new(HandlerRegistry::new());
        let speaker = Speaker::new();
        registry.add_handler(speaker.clone()).unwrap();
        let processor = DirectiveProcessor::new(registry);
        let events = Arc::new(EventBroadcaster::new(32));
        let mut rx = events.subscribe();
        processor.add_listener(events);

        for id in ["s1", "s2"] {
            let speak = Directive::new("SpeechSynthesizer", "Speak", id).with_dialog_request_id("t1");
            assert!(processor.submit(speak).await);
        }
        processor.scrub("t1");

        let mut terminal = 0;
        while terminal < 2 {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if event.is_terminal() {
                terminal += 1;
            }
        }
        let snapshot = processor.snapshot();
        assert_eq!(snapshot.queued, 0);
        assert!(snapshot.claim_holders.is_empty());
        assert!(speaker.canceled.lock().unwrap().contains(&"s2".to_string()));
    }
}
