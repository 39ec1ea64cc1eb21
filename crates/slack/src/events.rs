use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";

const URL_VERIFICATION: &str = "url_verification";
const EVENT_CALLBACK: &str = "event_callback";
const MESSAGE: &str = "message";
const BOT_MESSAGE: &str = "bot_message";

/// Outer Events API payload. Every field is optional so that partial or
/// unexpected payloads still classify instead of failing to parse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default, alias = "application_id")]
    pub api_app_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<MessageEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Redelivery markers sent as transport headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryMetadata {
    pub count: Option<String>,
    pub reason: Option<String>,
}

impl RetryMetadata {
    pub fn new(count: Option<String>, reason: Option<String>) -> Self {
        Self { count, reason }
    }

    pub fn is_retry(&self) -> bool {
        self.count.as_deref().is_some_and(|count| !count.trim().is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundRequest {
    pub envelope: EventEnvelope,
    pub retry: RetryMetadata,
}

impl InboundRequest {
    pub fn new(envelope: EventEnvelope, retry: RetryMetadata) -> Self {
        Self { envelope, retry }
    }

    pub fn parse(body: &[u8], retry: RetryMetadata) -> Result<Self, serde_json::Error> {
        let envelope = serde_json::from_slice(body)?;
        Ok(Self { envelope, retry })
    }

    /// Platform event id when present, otherwise a fresh id for log correlation.
    pub fn correlation_id(&self) -> String {
        match self.envelope.event_id.as_deref() {
            Some(event_id) if !event_id.is_empty() => event_id.to_owned(),
            _ => format!("req-{}", Uuid::new_v4().simple()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedType,
    MissingEvent,
    BotMessage,
    NotAMessage,
    EmptyText,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedType => "unsupported_type",
            Self::MissingEvent => "missing_event",
            Self::BotMessage => "bot_message",
            Self::NotAMessage => "not_a_message",
            Self::EmptyText => "empty_text",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Handshake { challenge: String },
    DuplicateRetry { count: String, reason: Option<String> },
    ApplicationMismatch { expected: String, received: Option<String> },
    NotActionable(IgnoreReason),
    Actionable { text: String },
}

impl Classification {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ApplicationMismatch { .. })
    }
}

/// Pure decision over one inbound request. Rules are checked in order and
/// the first match wins.
#[derive(Clone, Debug)]
pub struct EventClassifier {
    expected_app_id: String,
}

impl EventClassifier {
    pub fn new(expected_app_id: impl Into<String>) -> Self {
        Self { expected_app_id: expected_app_id.into() }
    }

    pub fn expected_app_id(&self) -> &str {
        &self.expected_app_id
    }

    pub fn classify(&self, request: &InboundRequest) -> Classification {
        let envelope = &request.envelope;

        if envelope.kind.as_deref() == Some(URL_VERIFICATION) {
            return Classification::Handshake {
                challenge: envelope.challenge.clone().unwrap_or_default(),
            };
        }

        if request.retry.is_retry() {
            return Classification::DuplicateRetry {
                count: request.retry.count.clone().unwrap_or_default(),
                reason: request.retry.reason.clone(),
            };
        }

        if envelope.api_app_id.as_deref() != Some(self.expected_app_id.as_str()) {
            return Classification::ApplicationMismatch {
                expected: self.expected_app_id.clone(),
                received: envelope.api_app_id.clone(),
            };
        }

        if envelope.kind.as_deref() != Some(EVENT_CALLBACK) {
            return Classification::NotActionable(IgnoreReason::UnsupportedType);
        }

        let Some(event) = envelope.event.as_ref() else {
            return Classification::NotActionable(IgnoreReason::MissingEvent);
        };

        if event.subtype.as_deref() == Some(BOT_MESSAGE) || event.bot_id.is_some() {
            return Classification::NotActionable(IgnoreReason::BotMessage);
        }

        if event.kind.as_deref() != Some(MESSAGE) {
            return Classification::NotActionable(IgnoreReason::NotAMessage);
        }

        match event.text.as_deref() {
            Some(text) if !text.is_empty() => Classification::Actionable { text: text.to_owned() },
            _ => Classification::NotActionable(IgnoreReason::EmptyText),
        }
    }
}
