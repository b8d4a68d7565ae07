//! Parley: turn-taking and resilience core for real-time voice conversations.
//!
//! This crate is the state machinery between a speech recognition engine
//! and a speech synthesis engine, letting a user and an assistant hold a
//! spoken, interruptible conversation:
//!
//! - **ConversationManager**: tracks who is speaking/thinking/listening,
//!   converts momentary silences into confirmed end-of-turn events, and
//!   arbitrates interruptions.
//! - **RecognitionSupervisor**: keeps a flaky recognition engine alive
//!   through error classification, bounded retries, growing cooldowns, and
//!   a degraded fallback profile.
//! - **SpeechOutputQueue**: plays replies sentence by sentence so an
//!   interruption takes effect within one sentence's latency.
//!
//! # Architecture
//!
//! The pieces are independent actors connected by async channels:
//! microphone → `SpeechInputPort` → supervisor → manager → application →
//! manager → queue → `SpeechOutputPort` → speaker, with voice activity
//! short-circuiting back into the manager to trigger interruption. The
//! engines themselves live behind port traits; tests drive the whole core
//! with scripted fakes and a paused clock.

pub mod config;
pub mod conversation;
pub mod error;
pub mod output;
pub mod ports;
pub mod recognition;
pub mod runtime;
pub mod session;
mod timer;

pub use config::{
    FallbackConfig, RecognitionConfig, RecognitionProfile, SessionConfig, SynthesisConfig,
    TurnConfig,
};
pub use conversation::ConversationManager;
pub use conversation::state::{ConversationState, Speaker, SpeakerState};
pub use error::{Result, SpeechError};
pub use output::{OutputHandle, SpeakRequest, SpeechOutputQueue};
pub use ports::{
    EngineErrorCode, EngineEvent, SpeechInputPort, SpeechOutputPort, SynthesizedAudio,
};
pub use recognition::{RecognitionHandle, RecognitionSupervisor};
pub use runtime::{ConversationEvent, InputEvent, OutputEvent};
