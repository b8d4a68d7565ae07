//! Error types for the conversation core.

/// Top-level error type for the turn-taking and speech resilience core.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// The recognition engine listened but heard nothing.
    ///
    /// Recoverable: the supervisor retries a bounded number of times before
    /// surfacing this.
    #[error("no speech detected")]
    NoSpeech,

    /// The recognition engine aborted its session.
    ///
    /// Recoverable via restart with backoff; repeated aborts downgrade the
    /// supervisor to the fallback recognition profile.
    #[error("recognition aborted: {0}")]
    Aborted(String),

    /// The recognition engine lost its network backend.
    #[error("recognition network error: {0}")]
    Network(String),

    /// Microphone permission was denied. Requires user action; never
    /// auto-retried.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable microphone. Requires user action; never auto-retried.
    #[error("no microphone available")]
    NoMicrophone,

    /// All automatic recovery budget is spent. Terminal until the supervisor
    /// is explicitly reset.
    #[error("speech recognition recovery exhausted")]
    RecoveryExhausted,

    /// Recognition engine start/stop error.
    #[error("recognition engine error: {0}")]
    Engine(String),

    /// Text-to-speech synthesis error. Aborts the current output entry only;
    /// the queue continues with the next one.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio playback error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeechError {
    /// Short user-facing phrasing for errors worth showing in a UI.
    ///
    /// Returns `None` for internal errors that should stay in the logs;
    /// callers display these instead of raw error codes.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Self::NoSpeech => Some("I didn't catch that. Try speaking again."),
            Self::Aborted(_) => Some("Listening hiccup, retrying."),
            Self::Network(_) => Some("Connection trouble, retrying shortly."),
            Self::PermissionDenied => {
                Some("Microphone access is blocked. Please allow it in your system settings.")
            }
            Self::NoMicrophone => Some("No microphone found. Please check your audio input."),
            Self::RecoveryExhausted => {
                Some("Speech recognition stopped working. Tap the microphone to try again.")
            }
            _ => None,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_cover_engine_errors_only() {
        assert!(SpeechError::NoSpeech.user_message().is_some());
        assert!(SpeechError::PermissionDenied.user_message().is_some());
        assert!(SpeechError::RecoveryExhausted.user_message().is_some());
        assert!(SpeechError::Config("bad".into()).user_message().is_none());
        assert!(
            SpeechError::Synthesis("backend".into())
                .user_message()
                .is_none()
        );
    }
}
