//! Runtime events emitted by the conversation core for the application,
//! UI, and telemetry.
//!
//! Intentionally lightweight so state machines can emit without blocking
//! their event loops.

use crate::conversation::state::ConversationState;
use crate::error::SpeechError;

/// Events from the recognition supervisor toward the application.
///
/// Regardless of how many times the underlying engine was restarted, this
/// stream stays clean: transcripts, mode changes, and errors the caller may
/// (but is never required to) react to.
#[derive(Debug)]
pub enum InputEvent {
    /// A transcription from the supervised engine.
    Transcript {
        /// Transcribed text.
        text: String,
        /// Whether this is a final result.
        is_final: bool,
    },
    /// Whether the supervisor currently has a live engine session.
    Listening {
        /// True when listening.
        active: bool,
    },
    /// The supervisor switched recognition profiles.
    ///
    /// Emitted once per switch; repeated errors inside a degraded mode are
    /// coalesced rather than re-notified. UIs typically phrase the
    /// degradation as "switching to a simpler listening mode" rather than
    /// surfacing the underlying error codes.
    ModeChanged {
        /// True when the degraded fallback profile is now active.
        fallback: bool,
    },
    /// An error surfaced for the caller. Recoverable errors are informational
    /// (the supervisor already handled them); `PermissionDenied`,
    /// `NoMicrophone`, and `RecoveryExhausted` require user action.
    Error(SpeechError),
}

/// Events from the speech output queue.
///
/// One `speak` request produces `Started`, then a `SentenceStarted` /
/// `SentenceEnded` pair per sentence in order, then exactly one of
/// `Finished`, `Failed`, or `Interrupted`. An interrupted entry never
/// receives `Finished`, and no further sentences of it start.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// The entry reached the head of the queue and began playing.
    Started {
        /// Entry id from `speak`.
        id: u64,
    },
    /// A sentence is about to be synthesized and played.
    SentenceStarted {
        /// Entry id.
        id: u64,
        /// Zero-based sentence index within the entry.
        index: usize,
        /// The sentence text, for display/highlighting.
        text: String,
    },
    /// A sentence finished playing.
    SentenceEnded {
        /// Entry id.
        id: u64,
        /// Zero-based sentence index within the entry.
        index: usize,
    },
    /// Every sentence of the entry played to completion.
    Finished {
        /// Entry id.
        id: u64,
    },
    /// Synthesis or playback failed; the entry was abandoned and the queue
    /// continues with the next one.
    Failed {
        /// Entry id.
        id: u64,
        /// Failure detail.
        reason: String,
    },
    /// The entry was cut off by `interrupt()`. Expected control flow, not a
    /// failure.
    Interrupted {
        /// Entry id.
        id: u64,
    },
}

/// Events from the conversation manager.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// Full state snapshot after a transition.
    ///
    /// Level-triggered: subscribers should compare against their own
    /// last-seen snapshot rather than assume one event per distinct change.
    StateChanged(ConversationState),
    /// A user utterance was confirmed complete by the pause timer.
    UserTurn {
        /// The buffered final transcript for the turn.
        text: String,
    },
    /// An assistant utterance completed.
    AssistantTurn {
        /// The text the assistant finished speaking.
        text: String,
    },
}
