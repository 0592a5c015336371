//! Wire events for the realtime channel
//!
//! Outbound client events and inbound server events are JSON objects
//! discriminated by a `type` field. Unknown inbound types deserialize to
//! [`ServerEvent::Other`] and are ignored by the dispatcher, so vendor
//! additions never break event processing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transcription model requested for inbound voice audio
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Session configuration sent in a `session.update` event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub instructions: String,
    pub modalities: Vec<String>,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionConfig {
    pub model: String,
}

/// Server-side voice activity detection parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub kind: String,
    pub threshold: f64,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// A user message item for `conversation.item.create`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// Build a user text message item
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            kind: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart {
                kind: "input_text".to_string(),
                text: text.into(),
            }],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Parameters for a `response.create` request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ResponseParams {
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl ResponseParams {
    /// Text-only response with an optional output token cap
    pub fn text(max_output_tokens: Option<u32>) -> Self {
        Self {
            modalities: vec!["text".to_string()],
            max_output_tokens,
        }
    }
}

/// Outbound events sent over the realtime channel
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        session: SessionConfig,
    },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        item: ConversationItem,
    },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        response: ResponseParams,
    },
}

impl ClientEvent {
    pub fn session_update(session: SessionConfig) -> Self {
        ClientEvent::SessionUpdate {
            event_id: None,
            session,
        }
    }

    pub fn item_create(item: ConversationItem) -> Self {
        ClientEvent::ConversationItemCreate {
            event_id: None,
            item,
        }
    }

    pub fn response_create(response: ResponseParams) -> Self {
        ClientEvent::ResponseCreate {
            event_id: None,
            response,
        }
    }

    /// The event type tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate { .. } => "response.create",
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::ConversationItemCreate { event_id, .. }
            | ClientEvent::ResponseCreate { event_id, .. } => event_id.as_deref(),
        }
    }

    /// Stamp a unique event id if one is not already present
    pub fn ensure_event_id(&mut self) {
        let slot = match self {
            ClientEvent::SessionUpdate { event_id, .. }
            | ClientEvent::ConversationItemCreate { event_id, .. }
            | ClientEvent::ResponseCreate { event_id, .. } => event_id,
        };
        if slot.is_none() {
            *slot = Some(Uuid::new_v4().to_string());
        }
    }
}

/// Authoritative token usage carried by `response.done`
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RealtimeUsage {
    #[serde(default)]
    pub input_text_tokens: u64,
    #[serde(default)]
    pub output_text_tokens: u64,
    #[serde(default)]
    pub input_audio_tokens: u64,
    #[serde(default)]
    pub output_audio_tokens: u64,
}

/// Summary payload of a completed response
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ResponseSummary {
    #[serde(default)]
    pub usage: Option<RealtimeUsage>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

impl ResponseSummary {
    /// Collect the text parts of all message output items, in order
    pub fn output_texts(&self) -> Vec<&str> {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "text")
            .map(|part| part.text.as_str())
            .collect()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct OutputContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

/// Error payload of an inbound `error` event
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiError {
    /// The "active response already exists" conflict is expected under
    /// concurrent-trigger coalescing and is swallowed rather than surfaced.
    pub fn is_benign_conflict(&self) -> bool {
        self.kind.as_deref() == Some("invalid_request_error")
            && self
                .message
                .as_deref()
                .is_some_and(|m| m.contains("active response"))
    }

    pub fn describe(&self) -> String {
        format!(
            "{}: {}",
            self.kind.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

/// Inbound events received over the realtime channel
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.text.done")]
    TextDone,
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone,
    #[serde(rename = "response.created")]
    ResponseCreated,
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseSummary,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.partial")]
    TranscriptionPartial {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.failed")]
    TranscriptionFailed,
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ApiError,
    },
    /// Any event type the dispatcher does not consume
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_serializes_with_type_tag() {
        let event = ClientEvent::response_create(ResponseParams::text(Some(500)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "response.create");
        assert_eq!(json["response"]["modalities"][0], "text");
        assert_eq!(json["response"]["max_output_tokens"], 500);
    }

    #[test]
    fn test_max_output_tokens_omitted_when_absent() {
        let event = ClientEvent::response_create(ResponseParams::text(None));
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("max_output_tokens"));
    }

    #[test]
    fn test_ensure_event_id_is_idempotent() {
        let mut event = ClientEvent::item_create(ConversationItem::user_text("hi"));
        assert!(event.event_id().is_none());

        event.ensure_event_id();
        let first = event.event_id().map(str::to_string);
        assert!(first.is_some());

        event.ensure_event_id();
        assert_eq!(event.event_id().map(str::to_string), first);
    }

    #[test]
    fn test_server_event_parses_delta() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.text.delta","delta":"Hel"}"#).unwrap();
        assert_eq!(
            event,
            ServerEvent::TextDelta {
                delta: "Hel".to_string()
            }
        );
    }

    #[test]
    fn test_server_event_parses_response_done_with_usage() {
        let json = r#"{
            "type": "response.done",
            "response": {
                "usage": {
                    "input_text_tokens": 10,
                    "output_text_tokens": 20,
                    "input_audio_tokens": 30,
                    "output_audio_tokens": 0
                },
                "output": [{
                    "type": "message",
                    "content": [{"type": "text", "text": "Hello"}]
                }]
            }
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::ResponseDone { response } => {
                assert_eq!(response.usage.as_ref().unwrap().output_text_tokens, 20);
                assert_eq!(response.output_texts(), vec!["Hello"]);
            }
            other => panic!("Expected ResponseDone, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_server_event_maps_to_other() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Other);
    }

    #[test]
    fn test_benign_conflict_detection() {
        let benign = ApiError {
            kind: Some("invalid_request_error".to_string()),
            message: Some("Conversation already has an active response".to_string()),
        };
        assert!(benign.is_benign_conflict());

        let real = ApiError {
            kind: Some("invalid_request_error".to_string()),
            message: Some("Missing required parameter".to_string()),
        };
        assert!(!real.is_benign_conflict());
    }
}
