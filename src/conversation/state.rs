//! Conversation state snapshot shared with subscribers.

use std::time::Duration;

/// A conversation party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The human user.
    User,
    /// The assistant.
    Assistant,
}

/// Activity state of one conversation party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeakerState {
    /// Not doing anything.
    #[default]
    Idle,
    /// Attending to the other party; the floor is open.
    Listening,
    /// Generating a response. Latency-hiding signal only, not a
    /// speaker-of-record state.
    Thinking,
    /// Actively speaking; may hold the floor.
    Speaking,
    /// Forcibly stopped mid-utterance by the other party. Distinct from
    /// `Idle` so the UI and output queue can react; relaxes to `Idle` when
    /// the interruption cooldown expires.
    Interrupted,
}

/// Versioned snapshot of the whole conversation.
///
/// One exists per session. It is mutated exclusively through
/// [`ConversationManager`](crate::conversation::ConversationManager)
/// operations; subscribers receive full clones after every transition,
/// never partial deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    /// The user's activity state.
    pub user_state: SpeakerState,
    /// The assistant's activity state.
    pub assistant_state: SpeakerState,
    /// Who holds the floor. At most one party; `Some(Speaker::User)` implies
    /// `user_state == Speaking` (symmetrically for the assistant).
    pub current_speaker: Option<Speaker>,
    /// Who spoke most recently. For logging and turn attribution only.
    pub last_speaker: Option<Speaker>,
    /// Measured silence between the user's last speech end and its
    /// confirmation as end-of-turn.
    pub user_pause: Duration,
    /// Measured silence between the assistant's last speech end and its
    /// confirmation as end-of-turn.
    pub assistant_pause: Duration,
    /// How many interruptions have occurred this session.
    pub interruption_count: u64,
    /// How many confirmed turns (non-empty utterances) have completed.
    pub conversation_turns: u64,
    /// True during the short window after an interruption while further
    /// interruptions are suppressed.
    pub processing_interruption: bool,
    /// Whether speech input is running the degraded recognition profile.
    pub fallback_mode: bool,
    /// Monotonically increasing snapshot version. Zeroed by `reset()`.
    pub version: u64,
}
