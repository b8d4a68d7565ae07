//! Conversation turn-taking state machine.
//!
//! Tracks who is speaking, converts momentary silences into confirmed
//! end-of-turn events via pause-confirmation timers, and arbitrates
//! interruptions between the user and the assistant.
//!
//! All transitions are serialized through one mutex-guarded core; timers
//! are the only asynchronous resumption sources, and each one re-checks
//! state when it fires so a superseded timer is a guaranteed no-op.

pub mod state;

use crate::config::TurnConfig;
use crate::output::OutputHandle;
use crate::runtime::ConversationEvent;
use crate::timer::TimerSlot;
use state::{ConversationState, Speaker, SpeakerState};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the conversation event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Turn-taking state machine for one conversation session.
///
/// Constructed per session and shared by cloning; never a global. Every
/// operation locks the core, mutates, and broadcasts a full snapshot.
#[derive(Clone)]
pub struct ConversationManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: TurnConfig,
    core: Mutex<Core>,
    events: broadcast::Sender<ConversationEvent>,
}

#[derive(Default)]
struct Core {
    state: ConversationState,
    /// Final transcripts buffered across stop/start bursts within one turn.
    user_buffer: String,
    /// Assistant speech accumulated sentence by sentence within one reply.
    assistant_buffer: String,
    /// The assistant sentence that was in flight when it was interrupted.
    /// Never auto-replayed; the application decides what to do with it.
    interrupted_speech: Option<String>,
    user_stopped_at: Option<Instant>,
    assistant_stopped_at: Option<Instant>,
    user_pause_timer: TimerSlot,
    assistant_pause_timer: TimerSlot,
    cooldown_timer: TimerSlot,
    output: Option<OutputHandle>,
}

impl ConversationManager {
    /// Create a manager with the given turn-taking configuration.
    pub fn new(config: TurnConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(Inner {
                config,
                core: Mutex::new(Core::default()),
                events,
            }),
        }
    }

    /// Subscribe to state snapshots and turn events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    /// Attach the speech output queue so interruptions can stop playback and
    /// capture the in-flight sentence.
    pub fn attach_output(&self, output: OutputHandle) {
        self.inner.lock().output = Some(output);
    }

    /// Immutable snapshot of the current state.
    pub fn state(&self) -> ConversationState {
        self.inner.lock().state.clone()
    }

    /// The assistant sentence cut off by the most recent interruption.
    pub fn interrupted_speech(&self) -> Option<String> {
        self.inner.lock().interrupted_speech.clone()
    }

    /// Voice activity first detected from the user.
    ///
    /// Interrupts the assistant if it is mid-utterance (and interruptions
    /// are enabled and not already being processed), takes the floor, and
    /// cancels any pending pause confirmation.
    pub fn user_starts_speaking(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        core.user_pause_timer.disarm();

        // Mid-reply covers the inter-sentence gaps too: the assistant's
        // state flickers to idle between sentences, but the output queue is
        // still working through the entry.
        let assistant_mid_reply = core.state.assistant_state == SpeakerState::Speaking
            || core.output.as_ref().is_some_and(OutputHandle::is_speaking);
        if assistant_mid_reply
            && inner.config.allow_interruptions
            && !core.state.processing_interruption
        {
            begin_interruption(inner, &mut core, Speaker::Assistant);
        }

        core.state.user_state = SpeakerState::Speaking;
        core.state.current_speaker = Some(Speaker::User);
        core.state.user_pause = Duration::ZERO;
        inner.notify(&mut core);
    }

    /// A pause or end-of-utterance detected in the user's speech.
    ///
    /// No-op unless the user is currently speaking. Buffers the transcript
    /// and arms the pause-confirmation timer; a new `user_starts_speaking`
    /// before it fires cancels the confirmation (debounce, not edge
    /// trigger).
    pub fn user_stops_speaking(&self, final_transcript: Option<&str>) {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state.user_state != SpeakerState::Speaking {
            return;
        }

        if let Some(text) = final_transcript {
            push_utterance(&mut core.user_buffer, text);
        }
        core.state.user_state = SpeakerState::Idle;
        core.state.last_speaker = Some(Speaker::User);
        if core.state.current_speaker == Some(Speaker::User) {
            core.state.current_speaker = None;
        }
        core.user_stopped_at = Some(Instant::now());

        let weak = Arc::downgrade(inner);
        let delay = Duration::from_millis(inner.config.user_pause_threshold_ms);
        core.user_pause_timer.arm(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_user_pause_complete();
            }
        });
        inner.notify(&mut core);
    }

    /// Voice activity first detected from the assistant (playback started).
    pub fn assistant_starts_speaking(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        core.assistant_pause_timer.disarm();

        if core.state.user_state == SpeakerState::Speaking
            && inner.config.allow_interruptions
            && !core.state.processing_interruption
        {
            begin_interruption(inner, &mut core, Speaker::User);
        }

        core.state.assistant_state = SpeakerState::Speaking;
        core.state.current_speaker = Some(Speaker::Assistant);
        core.state.assistant_pause = Duration::ZERO;
        inner.notify(&mut core);
    }

    /// A pause detected in the assistant's speech (a sentence ended).
    ///
    /// No-op unless the assistant is currently speaking. Inter-sentence
    /// gaps shorter than the assistant pause threshold supersede the timer,
    /// so one reply confirms as one turn.
    pub fn assistant_stops_speaking(&self, final_speech: Option<&str>) {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state.assistant_state != SpeakerState::Speaking {
            return;
        }

        if let Some(text) = final_speech {
            push_utterance(&mut core.assistant_buffer, text);
        }
        core.state.assistant_state = SpeakerState::Idle;
        core.state.last_speaker = Some(Speaker::Assistant);
        if core.state.current_speaker == Some(Speaker::Assistant) {
            core.state.current_speaker = None;
        }
        core.assistant_stopped_at = Some(Instant::now());

        let weak = Arc::downgrade(inner);
        let delay = Duration::from_millis(inner.config.assistant_pause_threshold_ms);
        core.assistant_pause_timer.arm(delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_assistant_pause_complete();
            }
        });
        inner.notify(&mut core);
    }

    /// The assistant began generating a response.
    pub fn assistant_starts_thinking(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state.assistant_state == SpeakerState::Speaking {
            // Generation kicked off while earlier audio still plays; the
            // speaking state wins until playback ends.
            return;
        }
        core.state.assistant_state = SpeakerState::Thinking;
        inner.notify(&mut core);
    }

    /// The assistant finished generating a response.
    pub fn assistant_stops_thinking(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state.assistant_state != SpeakerState::Thinking {
            return;
        }
        core.state.assistant_state = SpeakerState::Idle;
        inner.notify(&mut core);
    }

    /// Mirror the recognition supervisor's profile into the snapshot.
    pub fn set_fallback_mode(&self, fallback: bool) {
        let inner = &self.inner;
        let mut core = inner.lock();
        if core.state.fallback_mode != fallback {
            core.state.fallback_mode = fallback;
            inner.notify(&mut core);
        }
    }

    /// Cancel every pending timer, clear buffers, stop any playback, and
    /// restore the zero-value state.
    pub fn reset(&self) {
        let inner = &self.inner;
        let mut core = inner.lock();
        core.user_pause_timer.disarm();
        core.assistant_pause_timer.disarm();
        core.cooldown_timer.disarm();
        core.user_buffer.clear();
        core.assistant_buffer.clear();
        core.interrupted_speech = None;
        core.user_stopped_at = None;
        core.assistant_stopped_at = None;
        if let Some(output) = &core.output {
            output.interrupt();
        }
        core.state = ConversationState::default();
        info!("conversation state reset");
        let _ = inner
            .events
            .send(ConversationEvent::StateChanged(core.state.clone()));
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Bump the snapshot version and broadcast it.
    fn notify(&self, core: &mut Core) {
        core.state.version += 1;
        let _ = self
            .events
            .send(ConversationEvent::StateChanged(core.state.clone()));
    }

    /// Interruption cooldown expired: allow new interruptions and relax a
    /// still-interrupted party to idle.
    fn handle_cooldown_complete(&self, interrupted: Speaker) {
        let mut core = self.lock();
        core.state.processing_interruption = false;
        match interrupted {
            Speaker::Assistant if core.state.assistant_state == SpeakerState::Interrupted => {
                core.state.assistant_state = SpeakerState::Idle;
            }
            Speaker::User if core.state.user_state == SpeakerState::Interrupted => {
                core.state.user_state = SpeakerState::Idle;
            }
            _ => {}
        }
        self.notify(&mut core);
    }

    /// User pause-confirmation timer fired: the utterance is over.
    fn handle_user_pause_complete(&self) {
        let mut core = self.lock();
        // Superseded guard: the user resumed speaking after this timer was
        // armed and the disarm raced the firing.
        if core.state.user_state == SpeakerState::Speaking {
            return;
        }
        if let Some(stopped) = core.user_stopped_at.take() {
            core.state.user_pause = stopped.elapsed();
        }

        let text = std::mem::take(&mut core.user_buffer);
        let spoke = !text.trim().is_empty();
        if spoke {
            core.state.conversation_turns += 1;
        }
        if matches!(
            core.state.assistant_state,
            SpeakerState::Idle | SpeakerState::Listening
        ) {
            core.state.assistant_state = SpeakerState::Listening;
        }
        // Open the floor unless the assistant already took it (a reply that
        // started inside the confirmation window).
        if core.state.assistant_state != SpeakerState::Speaking {
            core.state.current_speaker = None;
        }
        debug!(
            "user pause confirmed after {:?} (turn {})",
            core.state.user_pause, core.state.conversation_turns
        );
        self.notify(&mut core);
        if spoke {
            let _ = self.events.send(ConversationEvent::UserTurn { text });
        }
    }

    /// Assistant pause-confirmation timer fired: the reply is over.
    fn handle_assistant_pause_complete(&self) {
        let mut core = self.lock();
        if core.state.assistant_state == SpeakerState::Speaking {
            return;
        }
        if let Some(stopped) = core.assistant_stopped_at.take() {
            core.state.assistant_pause = stopped.elapsed();
        }

        let text = std::mem::take(&mut core.assistant_buffer);
        let spoke = !text.trim().is_empty();
        if spoke {
            core.state.conversation_turns += 1;
        }
        if matches!(
            core.state.user_state,
            SpeakerState::Idle | SpeakerState::Listening
        ) {
            core.state.user_state = SpeakerState::Listening;
        }
        if core.state.user_state != SpeakerState::Speaking {
            core.state.current_speaker = None;
        }
        debug!(
            "assistant pause confirmed after {:?} (turn {})",
            core.state.assistant_pause, core.state.conversation_turns
        );
        self.notify(&mut core);
        if spoke {
            let _ = self.events.send(ConversationEvent::AssistantTurn { text });
        }
    }
}

/// The interruption protocol. Runs atomically within one core lock.
fn begin_interruption(inner: &Arc<Inner>, core: &mut Core, interrupted: Speaker) {
    core.state.interruption_count += 1;
    core.state.processing_interruption = true;

    match interrupted {
        Speaker::Assistant => {
            core.state.assistant_state = SpeakerState::Interrupted;
            // The reply is dead: its already-spoken sentences never confirm
            // as a turn, and the in-flight sentence moves to the
            // interrupted-speech slot.
            core.assistant_pause_timer.disarm();
            core.assistant_buffer.clear();
            if let Some(output) = &core.output {
                core.interrupted_speech = output.current_sentence();
                output.interrupt();
            }
        }
        Speaker::User => {
            core.state.user_state = SpeakerState::Interrupted;
        }
    }
    info!(
        "interruption #{}: {interrupted:?} cut off mid-utterance",
        core.state.interruption_count
    );

    let weak = Arc::downgrade(inner);
    let delay = Duration::from_millis(inner.config.interruption_cooldown_ms);
    core.cooldown_timer.arm(delay, move || {
        if let Some(inner) = weak.upgrade() {
            inner.handle_cooldown_complete(interrupted);
        }
    });
}

/// Append a transcript fragment to a turn buffer.
fn push_utterance(buffer: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(' ');
    }
    buffer.push_str(text);
}
