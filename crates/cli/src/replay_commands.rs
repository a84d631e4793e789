//! `vesper replay`: push a scripted sequence of directives through the
//! processor and print every lifecycle event.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    serde::Deserialize,
    tokio::sync::broadcast::error::RecvError,
    tracing::{info, warn},
    vesper_config::DirectivesConfig,
    vesper_directives::{
        BlockingPolicy, Directive, DirectiveCompletion, DirectiveEvent, DirectiveHandler,
        DirectiveProcessor, EventBroadcaster, HandlerRegistry, Medium, NamespaceAndName,
    },
};

/// A replay script.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Give up waiting for outstanding directives after this long.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Disable the processor (canceling everything) this long after the
    /// last submission.
    #[serde(default)]
    pub disable_after_ms: Option<u64>,
    #[serde(default)]
    pub handlers: Vec<ScriptedKind>,
    #[serde(default)]
    pub directives: Vec<ScriptedDirective>,
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// One directive kind and how its fake handler behaves.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedKind {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub mediums: Vec<String>,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub behavior: Behavior,
    /// Time between `handle` and the reported outcome.
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    #[default]
    Complete,
    Fail,
    FailCancelAll,
    RejectPreHandle,
    RejectHandle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptedDirective {
    pub message_id: String,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub dialog_request_id: String,
    #[serde(default)]
    pub referrer_dialog_request_id: Option<String>,
}

impl From<&ScriptedDirective> for Directive {
    fn from(d: &ScriptedDirective) -> Self {
        let directive = Directive::new(&d.namespace, &d.name, &d.message_id)
            .with_dialog_request_id(&d.dialog_request_id);
        match &d.referrer_dialog_request_id {
            Some(referrer) => directive.with_referrer_dialog_request_id(referrer),
            None => directive,
        }
    }
}

/// One printed line of replay output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub elapsed_ms: u128,
    pub label: &'static str,
    pub message_id: String,
    pub description: Option<String>,
}

impl EventRecord {
    fn new(event: &DirectiveEvent, started: Instant) -> Self {
        let description = match event {
            DirectiveEvent::Failed { description, .. } => Some(description.clone()),
            _ => None,
        };
        Self {
            elapsed_ms: started.elapsed().as_millis(),
            label: event.label(),
            message_id: event.directive().message_id.clone(),
            description,
        }
    }
}

/// Fake handler that reports a fixed outcome after a fixed delay.
struct ScriptedHandler {
    label: String,
    kind: ScriptedKind,
    pending: Mutex<HashMap<String, DirectiveCompletion>>,
}

impl ScriptedHandler {
    fn new(kind: ScriptedKind) -> Self {
        Self {
            label: NamespaceAndName::new(&kind.namespace, &kind.name).to_string(),
            kind,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, DirectiveCompletion>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DirectiveHandler for ScriptedHandler {
    fn name(&self) -> &str {
        &self.label
    }

    fn configuration(&self) -> Vec<(NamespaceAndName, BlockingPolicy)> {
        let mediums = self.kind.mediums.iter().map(Medium::new);
        let policy = if self.kind.blocking {
            BlockingPolicy::blocking(mediums)
        } else {
            BlockingPolicy::non_blocking(mediums)
        };
        vec![(
            NamespaceAndName::new(&self.kind.namespace, &self.kind.name),
            policy,
        )]
    }

    async fn pre_handle(&self, directive: Arc<Directive>, completion: DirectiveCompletion) -> bool {
        if self.kind.behavior == Behavior::RejectPreHandle {
            return false;
        }
        self.pending()
            .insert(directive.message_id.clone(), completion);
        true
    }

    async fn handle(&self, directive: Arc<Directive>) -> bool {
        if self.kind.behavior == Behavior::RejectHandle {
            return false;
        }
        let Some(completion) = self.pending().remove(&directive.message_id) else {
            return false;
        };
        let behavior = self.kind.behavior;
        let delay = Duration::from_millis(self.kind.delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match behavior {
                Behavior::Fail => completion.fail("scripted failure", false),
                Behavior::FailCancelAll => completion.fail("scripted failure", true),
                _ => completion.complete(),
            }
        });
        true
    }

    async fn cancel(&self, directive: Arc<Directive>) {
        self.pending().remove(&directive.message_id);
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid scenario {}", path.display()))
}

/// Run a scenario to completion and return the lifecycle events in order.
pub async fn run_scenario(scenario: &Scenario, config: &DirectivesConfig) -> Result<Vec<EventRecord>> {
    let registry = Arc::new(HandlerRegistry::new());
    for kind in &scenario.handlers {
        registry.add_handler(Arc::new(ScriptedHandler::new(kind.clone())))?;
    }

    let processor = Arc::new(DirectiveProcessor::with_config(registry, config));
    let events = Arc::new(EventBroadcaster::new(config.event_buffer));
    let mut rx = events.subscribe();
    processor.add_listener(events);

    let started = Instant::now();
    let mut accepted = 0;
    for scripted in &scenario.directives {
        if processor.submit(Directive::from(scripted)).await {
            accepted += 1;
        } else {
            info!(message_id = %scripted.message_id, "directive rejected at submit");
        }
    }

    if let Some(after) = scenario.disable_after_ms {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after)).await;
            processor.disable();
        });
    }

    let deadline = tokio::time::Instant::now() + Duration::from_millis(scenario.timeout_ms);
    let mut records = Vec::new();
    let mut settled = 0;
    while settled < accepted {
        let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "replay output fell behind; events dropped");
                continue;
            },
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {
                warn!(
                    outstanding = accepted - settled,
                    "timed out waiting for directives to settle"
                );
                break;
            },
        };
        if event.is_terminal() {
            settled += 1;
        }
        records.push(EventRecord::new(&event, started));
    }

    processor.shutdown().await;
    Ok(records)
}

pub async fn handle_replay(path: &Path, config: &DirectivesConfig) -> Result<()> {
    let scenario = load_scenario(path)?;
    let records = run_scenario(&scenario, config).await?;
    for record in &records {
        match &record.description {
            Some(description) => println!(
                "{:>6}ms  {:<9}  {}  ({description})",
                record.elapsed_ms, record.label, record.message_id
            ),
            None => println!(
                "{:>6}ms  {:<9}  {}",
                record.elapsed_ms, record.label, record.message_id
            ),
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn labels(records: &[EventRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| format!("{}:{}", r.label, r.message_id))
            .collect()
    }

    const SPEECH: &str = r#"
        [[handlers]]
        namespace = "SpeechSynthesizer"
        name = "Speak"
        mediums = ["audio"]
        blocking = true
        delay_ms = 5

        [[handlers]]
        namespace = "Alerts"
        name = "SetAlert"
        behavior = "reject_pre_handle"

        [[handlers]]
        namespace = "AudioPlayer"
        name = "Play"
        mediums = ["audio"]
        blocking = true
        behavior = "fail_cancel_all"
        delay_ms = 5
    "#;

    fn scenario(directives: &str) -> Scenario {
        toml::from_str(&format!("{SPEECH}\n{directives}")).unwrap()
    }

    #[tokio::test]
    async fn same_turn_speech_is_sequential() {
        let scenario = scenario(
            r#"
            [[directives]]
            message_id = "s1"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            dialog_request_id = "d1"

            [[directives]]
            message_id = "a1"
            namespace = "Alerts"
            name = "SetAlert"
            dialog_request_id = "d1"

            [[directives]]
            message_id = "s2"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            dialog_request_id = "d1"
            "#,
        );

        let records = run_scenario(&scenario, &DirectivesConfig::default())
            .await
            .unwrap();
        assert_eq!(labels(&records), vec![
            "requested:s1",
            "completed:s1",
            "requested:s2",
            "completed:s2",
        ]);
    }

    #[tokio::test]
    async fn failing_playback_cancels_its_turn() {
        let scenario = scenario(
            r#"
            [[directives]]
            message_id = "p1"
            namespace = "AudioPlayer"
            name = "Play"
            dialog_request_id = "d1"

            [[directives]]
            message_id = "s1"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            dialog_request_id = "d1"
            "#,
        );

        let records = run_scenario(&scenario, &DirectivesConfig::default())
            .await
            .unwrap();
        assert_eq!(labels(&records), vec![
            "requested:p1",
            "failed:p1",
            "canceled:s1"
        ]);
        assert_eq!(records[1].description.as_deref(), Some("scripted failure"));
    }

    #[tokio::test]
    async fn disable_cancels_outstanding_work() {
        let mut scenario = scenario(
            r#"
            disable_after_ms = 0

            [[directives]]
            message_id = "s1"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            dialog_request_id = "d1"
            "#,
        );
        scenario.handlers[0].delay_ms = 60_000;

        let records = run_scenario(&scenario, &DirectivesConfig::default())
            .await
            .unwrap();
        assert_eq!(records.last().unwrap().label, "canceled");
        assert_eq!(records.iter().filter(|r| r.label == "canceled").count(), 1);
    }

    #[test]
    fn scripted_directive_keeps_referrer() {
        let scenario = scenario(
            r#"
            [[directives]]
            message_id = "s1"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            dialog_request_id = "d2"
            referrer_dialog_request_id = "d1"

            [[directives]]
            message_id = "s2"
            namespace = "SpeechSynthesizer"
            name = "Speak"
            "#,
        );

        let first = Directive::from(&scenario.directives[0]);
        assert_eq!(first.dialog_request_id, "d2");
        assert_eq!(first.referrer_dialog_request_id.as_deref(), Some("d1"));

        let second = Directive::from(&scenario.directives[1]);
        assert_eq!(second.dialog_request_id, "");
        assert_eq!(second.referrer_dialog_request_id, None);
    }

    #[test]
    fn unknown_scenario_keys_are_rejected() {
        let err = toml::from_str::<Scenario>("speed = 2").unwrap_err();
        assert!(err.to_string().contains("speed"));
    }

    #[test]
    fn load_scenario_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, SPEECH).unwrap();

        let scenario = load_scenario(&path).unwrap();
        assert_eq!(scenario.handlers.len(), 3);
        assert_eq!(scenario.handlers[1].behavior, Behavior::RejectPreHandle);
        assert_eq!(scenario.timeout_ms, 5_000);
        assert!(scenario.directives.is_empty());
    }
}
