//! Session wiring: forwards engine-side events into the turn-taking core.
//!
//! These bridges keep the state machines decoupled: the supervisor and the
//! output queue know nothing about turn-taking, and the conversation
//! manager never touches an engine. Voice activity flows through here,
//! including the barge-in path (a partial transcript while the assistant is
//! speaking triggers the interruption protocol inside the manager).

use crate::conversation::ConversationManager;
use crate::conversation::state::SpeakerState;
use crate::runtime::{InputEvent, OutputEvent};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Forward recognition supervisor events into manager operations.
///
/// Partial transcripts mark the user as speaking (refreshing the pause
/// debounce); final transcripts end the utterance with its text. In
/// fallback mode there are no partials, so a final transcript also implies
/// the speech start it never got.
pub async fn run_transcript_bridge(
    mut input_rx: mpsc::UnboundedReceiver<InputEvent>,
    manager: ConversationManager,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = input_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    InputEvent::Transcript { text, is_final } => {
                        if manager.state().user_state != SpeakerState::Speaking {
                            manager.user_starts_speaking();
                        }
                        if is_final {
                            manager.user_stops_speaking(Some(&text));
                        }
                    }
                    InputEvent::ModeChanged { fallback } => {
                        manager.set_fallback_mode(fallback);
                    }
                    InputEvent::Listening { .. } => {}
                    InputEvent::Error(e) => {
                        warn!("speech input error: {e}");
                    }
                }
            }
        }
    }
}

/// Forward output queue events into assistant speaking transitions.
///
/// Sentence starts and ends map onto `assistant_starts_speaking` /
/// `assistant_stops_speaking`; because inter-sentence gaps are shorter than
/// the assistant pause threshold, a reply confirms as a single turn when
/// its last sentence's silence runs out the timer.
pub async fn run_playback_bridge(
    mut output_rx: broadcast::Receiver<OutputEvent>,
    manager: ConversationManager,
    cancel: CancellationToken,
) {
    // Text of the sentence currently in flight; handed to the manager when
    // the sentence completes so the confirmed turn carries the full reply.
    let mut in_flight: Option<String> = None;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = output_rx.recv() => {
                match event {
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("playback bridge lagged, skipped {skipped} events");
                    }
                    Ok(OutputEvent::SentenceStarted { text, .. }) => {
                        if manager.state().assistant_state != SpeakerState::Speaking {
                            manager.assistant_starts_speaking();
                        }
                        in_flight = Some(text);
                    }
                    Ok(OutputEvent::SentenceEnded { .. }) => {
                        manager.assistant_stops_speaking(in_flight.take().as_deref());
                    }
                    Ok(OutputEvent::Finished { .. } | OutputEvent::Failed { .. }) => {
                        // The last SentenceEnded already stopped the
                        // assistant; this is a no-op unless a failure cut
                        // the entry short mid-sentence.
                        in_flight = None;
                        manager.assistant_stops_speaking(None);
                    }
                    Ok(OutputEvent::Interrupted { .. }) => {
                        // The manager marked the assistant interrupted when
                        // it stopped playback; the cut-off sentence lives in
                        // its interrupted-speech slot, not the turn buffer.
                        in_flight = None;
                    }
                    Ok(OutputEvent::Started { .. }) => {}
                }
            }
        }
    }
}
