//! Accumulates streamed fragments into the final generated text.

use std::mem;

/// Where the final text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalSource {
    /// The concatenated token fragments.
    Buffer,
    /// The `full_response` carried by the completion frame.
    FullResponse,
}

/// The finalized text of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalText {
    /// The generated text.
    pub text: String,
    /// Which input won.
    pub source: FinalSource,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Collecting(String),
    Finalized,
}

/// Collects the fragments of one request at a time.
///
/// A request moves `Idle -> Collecting -> Finalized`. Finalizing moves the
/// buffer out in a single step, so a late fragment can never reach a text
/// that has already been handed out.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    state: State,
}

impl StreamAssembler {
    /// Creates an idle assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new request with an empty buffer.
    pub fn begin(&mut self) {
        self.state = State::Collecting(String::new());
    }

    /// Returns `true` while a request is collecting fragments.
    #[must_use]
    pub const fn is_collecting(&self) -> bool {
        matches!(self.state, State::Collecting(_))
    }

    /// Returns the text collected so far for the active request.
    #[must_use]
    pub fn partial(&self) -> Option<&str> {
        match &self.state {
            State::Collecting(buffer) => Some(buffer),
            State::Idle | State::Finalized => None,
        }
    }

    /// Appends a fragment to the active request.
    ///
    /// Returns `false` (and appends nothing) when no request is collecting.
    pub fn on_fragment(&mut self, fragment: &str) -> bool {
        match &mut self.state {
            State::Collecting(buffer) => {
                buffer.push_str(fragment);
                true
            }
            State::Idle | State::Finalized => {
                tracing::debug!(len = fragment.len(), "Rejecting fragment outside a request");
                false
            }
        }
    }

    /// Finalizes the active request.
    ///
    /// A non-empty buffer wins; otherwise `full_response` is used. Returns
    /// `None` when no request is collecting.
    pub fn on_complete(&mut self, full_response: Option<String>) -> Option<FinalText> {
        match mem::replace(&mut self.state, State::Finalized) {
            State::Collecting(buffer) => {
                if let Some(full) = full_response.as_deref() {
                    if !buffer.is_empty() && full != buffer {
                        tracing::debug!(
                            buffer_len = buffer.len(),
                            full_len = full.len(),
                            "Streamed text differs from full response, keeping streamed text"
                        );
                    }
                }
                Some(match full_response {
                    Some(full) if buffer.is_empty() => FinalText {
                        text: full,
                        source: FinalSource::FullResponse,
                    },
                    _ => FinalText {
                        text: buffer,
                        source: FinalSource::Buffer,
                    },
                })
            }
            previous => {
                self.state = previous;
                None
            }
        }
    }

    /// Drops the active request, returning how many bytes were discarded.
    pub fn abandon(&mut self) -> usize {
        match mem::take(&mut self.state) {
            State::Collecting(buffer) => buffer.len(),
            State::Idle | State::Finalized => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_final_text() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assert!(assembler.on_fragment("Question 1: "));
        assert!(assembler.on_fragment("Why?"));
        assert_eq!(assembler.partial(), Some("Question 1: Why?"));

        let done = assembler.on_complete(None).unwrap();
        assert_eq!(done.text, "Question 1: Why?");
        assert_eq!(done.source, FinalSource::Buffer);
    }

    #[test]
    fn test_empty_buffer_uses_full_response() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        let done = assembler.on_complete(Some("whole".to_string())).unwrap();
        assert_eq!(done.text, "whole");
        assert_eq!(done.source, FinalSource::FullResponse);
    }

    #[test]
    fn test_non_empty_buffer_wins_over_full_response() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.on_fragment("streamed");
        let done = assembler.on_complete(Some("different".to_string())).unwrap();
        assert_eq!(done.text, "streamed");
        assert_eq!(done.source, FinalSource::Buffer);
    }

    #[test]
    fn test_finalize_happens_once() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.on_fragment("a");
        assert!(assembler.on_complete(None).is_some());

        assert!(!assembler.on_fragment("late"));
        assert!(assembler.on_complete(Some("again".to_string())).is_none());
    }

    #[test]
    fn test_fragments_without_request_are_rejected() {
        let mut assembler = StreamAssembler::new();
        assert!(!assembler.on_fragment("stray"));
        assert!(assembler.on_complete(None).is_none());
        assert!(!assembler.is_collecting());
    }

    #[test]
    fn test_begin_resets_buffer() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.on_fragment("old");
        assembler.begin();
        assembler.on_fragment("new");
        assert_eq!(assembler.on_complete(None).unwrap().text, "new");
    }

    #[test]
    fn test_abandon() {
        let mut assembler = StreamAssembler::new();
        assembler.begin();
        assembler.on_fragment("partial");
        assert_eq!(assembler.abandon(), 7);
        assert!(!assembler.is_collecting());
        assert!(!assembler.on_fragment("more"));
    }
}
