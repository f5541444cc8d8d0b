//! One prompt in, one document out.

use classgen_content::{parse_or_fallback, ContentKind, Resolved};
use tracing::{debug, info, warn};

use crate::assembler::FinalSource;
use crate::error::{EngineError, Result};
use crate::session::{ConnectionState, SessionEvent, SessionHandle};

/// The outcome of a finished generation.
#[derive(Debug, Clone)]
pub struct Generation<K: ContentKind> {
    /// The final generated text.
    pub text: String,
    /// Whether the text came from streamed fragments or the full response.
    pub source: FinalSource,
    /// The document resolved from the text.
    pub resolved: Resolved<K>,
}

/// Runs one generation on an open or opening session.
///
/// Waits for the session to open, sends `prompt`, passes every fragment to
/// `on_fragment`, and parses the final text into a `K` document. Text that
/// does not parse becomes the fallback document.
///
/// # Errors
///
/// - `Generation` if the service reports an error
/// - `Transport` if the connection drops mid-request; the request is
///   abandoned and no partial document is produced
/// - `SessionClosed` if the session closes first
/// - any error from [`SessionHandle::send`]
pub async fn generate<K, F>(
    handle: &mut SessionHandle,
    prompt: &str,
    metadata: K::Metadata,
    mut on_fragment: F,
) -> Result<Generation<K>>
where
    K: ContentKind,
    F: FnMut(&str),
{
    handle.wait_until_open().await?;
    handle.send(prompt).await?;
    info!(identity = %handle.identity(), kind = K::NAME, "Generation started");

    loop {
        match handle.next_event().await {
            Some(SessionEvent::Fragment(fragment)) => on_fragment(&fragment),
            Some(SessionEvent::Completed(final_text)) => {
                let resolved = parse_or_fallback::<K>(&final_text.text, metadata);
                for diagnostic in &resolved.diagnostics {
                    debug!(
                        segment = diagnostic.segment,
                        message = %diagnostic.message,
                        "Dropped segment"
                    );
                }
                if resolved.structured {
                    info!(kind = K::NAME, blocks = resolved.document.len(), "Generation parsed");
                } else {
                    warn!(
                        kind = K::NAME,
                        "Generated text has no recognizable structure, keeping it as raw text"
                    );
                }
                return Ok(Generation {
                    text: final_text.text,
                    source: final_text.source,
                    resolved,
                });
            }
            Some(SessionEvent::Failed(message)) => return Err(EngineError::generation(message)),
            Some(SessionEvent::State(ConnectionState::Reconnecting)) => {
                return Err(EngineError::transport(
                    "connection lost during generation, request abandoned",
                ));
            }
            Some(SessionEvent::State(_)) => {}
            None => return Err(EngineError::session_closed(handle.identity())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use classgen_content::{LessonMetadata, LessonPlan, Quiz, QuizMetadata};

    use super::*;
    use crate::config::PromptField;
    use crate::protocol::ServerFrame;
    use crate::session::testing::ScriptedConnector;
    use crate::session::{Identity, SessionOptions};

    fn spawn(connector: &ScriptedConnector, purpose: &str, field: PromptField) -> SessionHandle {
        SessionHandle::spawn(
            Identity::new("alice", purpose),
            SessionOptions {
                url: format!("ws://service.test/{purpose}/alice"),
                prompt_field: field,
                retry_delay: Duration::from_millis(2000),
                event_capacity: 64,
            },
            Arc::new(connector.clone()),
        )
    }

    const QUIZ_TEXT: &str = "Question 1: What is the powerhouse of the cell?\n\
        A) Nucleus\n\
        B) Mitochondria\n\
        Correct Answer: B\n";

    #[tokio::test(start_paused = true)]
    async fn test_generate_quiz_from_streamed_tokens() {
        let connector = ScriptedConnector::default();
        let mut remote = connector.accept();
        let mut handle = spawn(&connector, "quiz", PromptField::Prompt);

        let server = tokio::spawn(async move {
            let prompt = remote.prompt().await;
            for chunk in QUIZ_TEXT.split_inclusive('\n') {
                remote.frame(&ServerFrame::token(chunk));
            }
            remote.frame(&ServerFrame::done(None));
            (prompt, remote)
        });

        let mut fragments = 0;
        let generation = generate::<Quiz, _>(
            &mut handle,
            "cells",
            QuizMetadata::default(),
            |_| fragments += 1,
        )
        .await
        .unwrap();

        let (prompt, _remote) = server.await.unwrap();
        assert_eq!(prompt, r#"{"prompt":"cells"}"#);
        assert_eq!(fragments, 4);
        assert_eq!(generation.source, FinalSource::Buffer);
        assert!(generation.resolved.structured);
        assert_eq!(generation.resolved.document.len(), 1);
        assert_eq!(generation.text, QUIZ_TEXT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_lesson_from_full_response() {
        let connector = ScriptedConnector::default();
        let mut remote = connector.accept();
        let mut handle = spawn(&connector, "lesson-plan", PromptField::Message);

        let server = tokio::spawn(async move {
            let prompt = remote.prompt().await;
            remote.frame(&ServerFrame::done(Some("Talk about clouds.".to_string())));
            (prompt, remote)
        });

        let generation = generate::<LessonPlan, _>(
            &mut handle,
            "weather",
            LessonMetadata::default(),
            |_| {},
        )
        .await
        .unwrap();

        let (prompt, _remote) = server.await.unwrap();
        assert_eq!(prompt, r#"{"message":"weather"}"#);
        assert_eq!(generation.source, FinalSource::FullResponse);
        assert!(!generation.resolved.structured);
        assert_eq!(generation.resolved.document.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_reports_remote_error() {
        let connector = ScriptedConnector::default();
        let mut remote = connector.accept();
        let mut handle = spawn(&connector, "quiz", PromptField::Prompt);

        let server = tokio::spawn(async move {
            remote.prompt().await;
            remote.frame(&ServerFrame::error("model overloaded"));
            remote
        });

        let err = generate::<Quiz, _>(&mut handle, "cells", QuizMetadata::default(), |_| {})
            .await
            .unwrap_err();
        let _remote = server.await.unwrap();
        assert!(matches!(
            err,
            EngineError::Generation { ref message } if message == "model overloaded"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_abandons_request_on_transport_drop() {
        let connector = ScriptedConnector::default();
        let mut remote = connector.accept();
        let mut handle = spawn(&connector, "quiz", PromptField::Prompt);

        tokio::spawn(async move {
            remote.prompt().await;
            remote.frame(&ServerFrame::token("Question 1: "));
            drop(remote);
        });

        let err = generate::<Quiz, _>(&mut handle, "cells", QuizMetadata::default(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport { .. }), "{err}");
        assert!(err.is_transient());
    }
}
