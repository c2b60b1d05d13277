//! Inbound protocol dispatch
//!
//! Every control-channel frame funnels through [`dispatch_frame`], the
//! single table that turns wire events into transcript entries and caller
//! events. One malformed frame never terminates the session.

use super::SharedState;
use kaiwa_core::{ErrorCode, ServerEvent, SessionError, SessionEvent, TranscriptEntry};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Parse and handle one inbound frame for the given attempt. Frames from a
/// superseded attempt are discarded before parsing.
pub(crate) async fn dispatch_frame(shared: &Arc<SharedState>, attempt: u64, raw: &str) {
    if !shared.is_current(attempt) {
        debug!("dropping control frame from stale attempt");
        return;
    }

    let event: ServerEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            // Per-frame failure, logged and swallowed.
            let err = SessionError::ProtocolParse(e.to_string());
            warn!(error = %err, "dropping malformed control frame");
            return;
        }
    };

    let name = event.name();
    trace!(event = name, "control event received");
    match event {
        ServerEvent::SessionCreated {} | ServerEvent::SessionUpdated {} => {
            debug!(event = name, "session acknowledged");
        }

        ServerEvent::ConversationItemCreated { item } => {
            if let (Some(speaker), Some(text)) = (item.speaker(), item.text()) {
                shared.append_entry(TranscriptEntry::new(speaker, text)).await;
            } else {
                trace!("conversation item without transcript text, skipping");
            }
        }

        ServerEvent::InputAudioTranscriptionCompleted { transcript } => {
            if !transcript.is_empty() {
                shared.append_entry(TranscriptEntry::user(transcript)).await;
            }
        }

        ServerEvent::ResponseAudioTranscriptDone { transcript } => {
            if !transcript.is_empty() {
                shared
                    .append_entry(TranscriptEntry::assistant(transcript))
                    .await;
            }
        }

        ServerEvent::ResponseTextDone { text } => {
            if !text.is_empty() {
                shared.append_entry(TranscriptEntry::assistant(text)).await;
            }
        }

        // Deltas are surfaced as streaming text only; the finalized entry
        // arrives with the matching done event and is never duplicated.
        ServerEvent::ResponseAudioTranscriptDelta { delta }
        | ServerEvent::ResponseTextDelta { delta } => {
            shared.emit(SessionEvent::AssistantDelta { text: delta });
        }

        ServerEvent::Error { error } => {
            warn!(
                code = error.code.as_deref().unwrap_or("unknown"),
                message = %error.message,
                "remote reported an error"
            );
            shared.emit(SessionEvent::Error {
                code: ErrorCode::Remote,
                message: error.message,
            });
        }

        ServerEvent::Unknown => {
            trace!("ignoring unrecognized control event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_shared;
    use super::*;
    use kaiwa_core::{SessionPhase, Speaker};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_malformed_frame_changes_nothing() {
        let (shared, mut rx) = test_shared();
        *shared.phase.write().await = SessionPhase::Active;
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(&shared, attempt, "{not json").await;
        dispatch_frame(&shared, attempt, "42").await;

        assert_eq!(shared.phase().await, SessionPhase::Active);
        assert!(shared.transcript.read().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_item_then_transcript_done_appends_in_order() {
        let (shared, _rx) = test_shared();
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"conversation.item.created","item":{"role":"user","status":"completed","content":[{"type":"input_text","text":"こんにちは"}]}}"#,
        )
        .await;
        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"response.audio_transcript.done","transcript":"いらっしゃいませ"}"#,
        )
        .await;

        let transcript = shared.transcript.read().await;
        let entries = transcript.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker, Speaker::User);
        assert_eq!(entries[0].text, "こんにちは");
        assert_eq!(entries[1].speaker, Speaker::Assistant);
        assert_eq!(entries[1].text, "いらっしゃいませ");
    }

    #[tokio::test]
    async fn test_input_transcription_completed_appends_user_entry() {
        let (shared, mut rx) = test_shared();
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i1","transcript":"すみません"}"#,
        )
        .await;

        let transcript = shared.transcript.read().await;
        assert_eq!(transcript.entries()[0].speaker, Speaker::User);
        assert_eq!(transcript.entries()[0].text, "すみません");

        match rx.try_recv().unwrap() {
            SessionEvent::TranscriptAppended { entry } => {
                assert_eq!(entry.speaker, Speaker::User)
            }
            other => panic!("expected transcript event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deltas_stream_without_touching_transcript() {
        let (shared, mut rx) = test_shared();
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"response.audio_transcript.delta","delta":"いらっ"}"#,
        )
        .await;
        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"response.audio_transcript.delta","delta":"しゃいませ"}"#,
        )
        .await;
        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"response.audio_transcript.done","transcript":"いらっしゃいませ"}"#,
        )
        .await;

        // Two streaming events, then exactly one transcript entry.
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::AssistantDelta { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::AssistantDelta { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::TranscriptAppended { .. }
        ));
        assert_eq!(shared.transcript.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_error_is_nonfatal_observable() {
        let (shared, mut rx) = test_shared();
        *shared.phase.write().await = SessionPhase::Active;
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad field"}}"#,
        )
        .await;

        match rx.try_recv().unwrap() {
            SessionEvent::Error { code, message } => {
                assert_eq!(code, ErrorCode::Remote);
                assert_eq!(message, "bad field");
            }
            other => panic!("expected error event, got {:?}", other),
        }
        assert_eq!(shared.phase().await, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_acks_and_unknown_kinds_are_ignored() {
        let (shared, mut rx) = test_shared();
        let attempt = shared.attempt.load(Ordering::SeqCst);

        dispatch_frame(&shared, attempt, r#"{"type":"session.created","session":{}}"#).await;
        dispatch_frame(&shared, attempt, r#"{"type":"session.updated","session":{}}"#).await;
        dispatch_frame(&shared, attempt, r#"{"type":"response.created"}"#).await;
        dispatch_frame(&shared, attempt, r#"{"type":"rate_limits.updated"}"#).await;

        assert!(shared.transcript.read().await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_attempt_frames_are_dropped() {
        let (shared, _rx) = test_shared();
        let attempt = shared.attempt.load(Ordering::SeqCst);
        shared.attempt.fetch_add(1, Ordering::SeqCst);

        dispatch_frame(
            &shared,
            attempt,
            r#"{"type":"response.text.done","text":"遅すぎる"}"#,
        )
        .await;

        assert!(shared.transcript.read().await.is_empty());
    }
}
