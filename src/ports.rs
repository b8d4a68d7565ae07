//! Engine boundary traits for speech input and output.
//!
//! The state machines in this crate never touch a real microphone, network
//! recognizer, or synthesis backend. They drive these ports; the application
//! supplies real engines and tests supply scripted fakes.

use crate::config::RecognitionProfile;
use crate::error::Result;
use async_trait::async_trait;

/// Raw error classification reported by the recognition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    /// The engine listened but heard nothing within its window.
    NoSpeech,
    /// The engine aborted its session.
    Aborted,
    /// The engine lost its network backend.
    Network,
    /// Microphone permission was denied.
    NotAllowed,
    /// Audio capture failed (no device, or the device went away).
    AudioCapture,
}

/// Events delivered by a recognition engine session.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The engine actually began listening.
    ///
    /// Engines are not required to pair every `start()` with one of these.
    Started,
    /// The engine session ended, expectedly or not.
    ///
    /// Engines are not required to deliver this after `stop()`.
    Ended,
    /// A transcription result.
    Result {
        /// Transcribed text.
        text: String,
        /// Whether this is a final result (vs interim/partial).
        is_final: bool,
    },
    /// An engine error.
    Error {
        /// Error classification.
        code: EngineErrorCode,
        /// Engine-provided detail for logging.
        message: String,
    },
}

/// Continuous speech recognition engine boundary.
///
/// Implementations deliver [`EngineEvent`]s on a channel supplied at
/// construction time. The microphone and its processing pipeline are a
/// singleton resource per session: `start` is never called while a previous
/// session is live — the supervisor always awaits `stop` first when
/// switching profiles.
#[async_trait]
pub trait SpeechInputPort: Send {
    /// Begin a recognition session with the given profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or capture pipeline cannot start.
    async fn start(&mut self, profile: &RecognitionProfile) -> Result<()>;

    /// End the current session and release the capture pipeline.
    ///
    /// Must be safe to call when no session is live.
    async fn stop(&mut self);
}

/// Synthesized audio ready for playback.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// f32 audio samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// Speech synthesis and playback boundary.
#[async_trait]
pub trait SpeechOutputPort: Send {
    /// Synthesize audio for one sentence of text.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis fails; the queue aborts only the
    /// current entry and continues with the next.
    async fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio>;

    /// Play a clip, resolving when playback completes.
    ///
    /// Dropping the returned future must stop audible output immediately;
    /// the output queue relies on this for mid-sentence interruption.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio device rejects the clip.
    async fn play(&mut self, audio: SynthesizedAudio) -> Result<()>;
}
