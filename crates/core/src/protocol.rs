//! Control-channel wire protocol
//!
//! Frames are newline-free JSON text, each a tagged object
//! `{"type": "<dot.separated.kind>", ...}`. [`ClientEvent`] covers the
//! outbound kinds the session manager produces; [`ServerEvent`] covers the
//! inbound kinds it consumes. Unrecognized inbound kinds deserialize to
//! [`ServerEvent::Unknown`] so new server events never break the session.

use crate::transcript::Speaker;
use serde::{Deserialize, Serialize};

/// Events sent to the remote service over the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Push the session configuration. Sent exactly once per connection,
    /// immediately after the control channel opens; earlier sends are
    /// dropped by the remote.
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Configuration payload
        session: SessionUpdate,
    },

    /// Tell the remote to discard partially-buffered input audio. Sent on
    /// the unmuted-to-muted edge so a half-spoken utterance is not later
    /// misinterpreted.
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear {},
}

impl ClientEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::InputAudioBufferClear {} => "input_audio_buffer.clear",
        }
    }
}

/// Payload of [`ClientEvent::SessionUpdate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    /// Natural-language instructions for the assistant
    pub instructions: String,
    /// Synthesized-voice identifier
    pub voice: String,
    /// Input transcription request
    pub input_audio_transcription: InputAudioTranscription,
    /// Server-side voice-activity-detection policy
    pub turn_detection: TurnDetection,
}

/// Input transcription configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model identifier
    pub model: String,
}

/// Server-side voice-activity-detection policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDetection {
    /// Detection type; the remote currently recognizes `server_vad`
    #[serde(rename = "type")]
    pub kind: String,
    /// Speech-detection sensitivity, 0.0 to 1.0
    pub threshold: f32,
    /// Audio kept from before detected speech start, in milliseconds
    pub prefix_padding_ms: u32,
    /// Silence required to consider a turn finished, in milliseconds
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Events received from the remote service over the control channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session creation acknowledgement; informational
    #[serde(rename = "session.created")]
    SessionCreated {},

    /// Session configuration acknowledgement; informational
    #[serde(rename = "session.updated")]
    SessionUpdated {},

    /// A conversation item materialized. Carries a transcript-worthy
    /// message once content with text is present.
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        /// The created item
        item: ConversationItem,
    },

    /// Input-audio transcription finished for a user utterance
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        /// Final transcript of the user's speech
        transcript: String,
    },

    /// Final transcript of the assistant's synthesized speech
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        /// Complete transcript text
        transcript: String,
    },

    /// Final text of an assistant text response
    #[serde(rename = "response.text.done")]
    ResponseTextDone {
        /// Complete response text
        text: String,
    },

    /// Incremental assistant transcript fragment
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        /// Partial transcript text
        delta: String,
    },

    /// Incremental assistant text fragment
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta {
        /// Partial response text
        delta: String,
    },

    /// Remote-reported error; non-fatal for the session by itself
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ServerErrorDetail,
    },

    /// Any kind this client does not recognize; ignored
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::SessionCreated {} => "session.created",
            ServerEvent::SessionUpdated {} => "session.updated",
            ServerEvent::ConversationItemCreated { .. } => "conversation.item.created",
            ServerEvent::InputAudioTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::ResponseAudioTranscriptDone { .. } => "response.audio_transcript.done",
            ServerEvent::ResponseTextDone { .. } => "response.text.done",
            ServerEvent::ResponseAudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            ServerEvent::ResponseTextDelta { .. } => "response.text.delta",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Unknown => "unknown",
        }
    }
}

/// Error payload of [`ServerEvent::Error`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerErrorDetail {
    /// Error category reported by the remote
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Machine-readable error code, when present
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// A conversation item as carried by `conversation.item.created`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationItem {
    /// Item identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Who authored the item
    pub role: ItemRole,
    /// Item lifecycle status, when present
    #[serde(default)]
    pub status: Option<String>,
    /// Content parts; empty while the item is still being produced
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// Joined text of every content part that carries text, or `None` when
    /// the item has no textual content yet
    pub fn text(&self) -> Option<String> {
        let joined: String = self
            .content
            .iter()
            .filter_map(ContentPart::text)
            .collect::<Vec<_>>()
            .join("");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }

    /// Map the item role onto a transcript speaker; `None` for roles that
    /// never appear in the transcript (e.g. system)
    pub fn speaker(&self) -> Option<Speaker> {
        match self.role {
            ItemRole::User => Some(Speaker::User),
            ItemRole::Assistant => Some(Speaker::Assistant),
            ItemRole::System => None,
        }
    }
}

/// Author of a conversation item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    Assistant,
    System,
}

/// One content part of a conversation item
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Text typed or injected as user input
    #[serde(rename = "input_text")]
    InputText {
        #[serde(default)]
        text: String,
    },

    /// User audio; transcript is present once transcription finished
    #[serde(rename = "input_audio")]
    InputAudio {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Assistant text output
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },

    /// Assistant audio output with its transcript
    #[serde(rename = "audio")]
    Audio {
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Content kinds this client does not recognize
    #[serde(other)]
    Unknown,
}

impl ContentPart {
    /// Extract the human-readable text of this part, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentPart::InputText { text } | ContentPart::Text { text } => {
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            ContentPart::InputAudio { transcript } | ContentPart::Audio { transcript } => {
                transcript.as_deref().filter(|t| !t.is_empty())
            }
            ContentPart::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: "レストランの店員として話してください。".to_string(),
                voice: "alloy".to_string(),
                input_audio_transcription: InputAudioTranscription {
                    model: "whisper-1".to_string(),
                },
                turn_detection: TurnDetection::default(),
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["voice"], "alloy");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(
            json["session"]["input_audio_transcription"]["model"],
            "whisper-1"
        );
    }

    #[test]
    fn test_buffer_clear_serialization() {
        let json = serde_json::to_value(&ClientEvent::InputAudioBufferClear {}).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.clear");
    }

    #[test]
    fn test_server_event_with_extra_fields() {
        // Acknowledgements arrive with a full session object attached;
        // only the tag matters.
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"session.created","event_id":"ev_1","session":{"id":"sess_1"}}"#,
        )
        .unwrap();
        assert_eq!(event, ServerEvent::SessionCreated {});
    }

    #[test]
    fn test_item_created_deserialization() {
        let event: ServerEvent = serde_json::from_str(
            r#"{
                "type": "conversation.item.created",
                "item": {
                    "id": "item_1",
                    "role": "user",
                    "status": "completed",
                    "content": [{"type": "input_text", "text": "こんにちは"}]
                }
            }"#,
        )
        .unwrap();

        match event {
            ServerEvent::ConversationItemCreated { item } => {
                assert_eq!(item.speaker(), Some(Speaker::User));
                assert_eq!(item.text().as_deref(), Some("こんにちは"));
            }
            other => panic!("expected conversation.item.created, got {:?}", other),
        }
    }

    #[test]
    fn test_item_without_text_yields_none() {
        let event: ServerEvent = serde_json::from_str(
            r#"{
                "type": "conversation.item.created",
                "item": {
                    "role": "assistant",
                    "status": "in_progress",
                    "content": []
                }
            }"#,
        )
        .unwrap();

        match event {
            ServerEvent::ConversationItemCreated { item } => assert_eq!(item.text(), None),
            other => panic!("expected conversation.item.created, got {:?}", other),
        }
    }

    #[test]
    fn test_audio_item_transcript_extraction() {
        let item: ConversationItem = serde_json::from_str(
            r#"{
                "role": "assistant",
                "content": [{"type": "audio", "transcript": "いらっしゃいませ"}]
            }"#,
        )
        .unwrap();
        assert_eq!(item.text().as_deref(), Some("いらっしゃいませ"));
    }

    #[test]
    fn test_transcription_completed_deserialization() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"item_1","transcript":"こんにちは"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::InputAudioTranscriptionCompleted {
                transcript: "こんにちは".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_kind_tolerated() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"rate_limits.updated","rate_limits":[{"name":"requests"}]}"#,
        )
        .unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_delta_deserialization() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"response.audio_transcript.delta","delta":"いらっ"}"#)
                .unwrap();
        assert_eq!(
            event,
            ServerEvent::ResponseAudioTranscriptDelta {
                delta: "いらっ".to_string()
            }
        );
    }

    #[test]
    fn test_error_event_deserialization() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"error","error":{"type":"invalid_request_error","code":"bad_schema","message":"nope"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Error { error } => {
                assert_eq!(error.code.as_deref(), Some("bad_schema"));
                assert_eq!(error.message, "nope");
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }
}
