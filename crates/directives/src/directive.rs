use std::fmt;

use serde::{Deserialize, Serialize};

/// Directive kind used for routing (e.g. `SpeechSynthesizer.Speak`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceAndName {
    pub namespace: String,
    pub name: String,
}

impl NamespaceAndName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespaceAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// A server-issued instruction, already decoded by the transport.
///
/// Directives are shared as `Arc<Directive>` once submitted and never change
/// afterwards. The payload is opaque to the dispatch core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    /// Dialog turn this directive belongs to. Empty for directives that are
    /// not part of any turn.
    #[serde(default)]
    pub dialog_request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_dialog_request_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Directive {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            message_id: message_id.into(),
            dialog_request_id: String::new(),
            referrer_dialog_request_id: None,
            payload: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_dialog_request_id(mut self, id: impl Into<String>) -> Self {
        self.dialog_request_id = id.into();
        self
    }

    #[must_use]
    pub fn with_referrer_dialog_request_id(mut self, id: impl Into<String>) -> Self {
        self.referrer_dialog_request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn kind(&self) -> NamespaceAndName {
        NamespaceAndName::new(&self.namespace, &self.name)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}#{}", self.namespace, self.name, self.message_id)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_header_fields_in_camel_case() {
        let directive: Directive = serde_json::from_value(serde_json::json!({
            "namespace": "SpeechSynthesizer",
            "name": "Speak",
            "messageId": "m-1",
            "dialogRequestId": "d-1",
            "payload": {"token": "abc"},
        }))
        .unwrap();

        assert_eq!(directive.kind(), NamespaceAndName::new("SpeechSynthesizer", "Speak"));
        assert_eq!(directive.dialog_request_id, "d-1");
        assert_eq!(directive.referrer_dialog_request_id, None);
        assert_eq!(directive.payload["token"], "abc");
    }

    #[test]
    fn turnless_directive_has_empty_dialog_id() {
        let directive: Directive = serde_json::from_value(serde_json::json!({
            "namespace": "Speaker",
            "name": "SetVolume",
            "messageId": "m-2",
        }))
        .unwrap();
        assert!(directive.dialog_request_id.is_empty());
        assert!(directive.payload.is_null());
    }

    #[test]
    fn display_includes_message_id() {
        let directive = Directive::new("AudioPlayer", "Play", "m-3").with_dialog_request_id("d");
        assert_eq!(directive.to_string(), "AudioPlayer.Play#m-3");
        assert_eq!(directive.kind().to_string(), "AudioPlayer.Play");
    }
}
