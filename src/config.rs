//! Configuration types for the conversation core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for one conversation session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Turn-taking behaviour (pause thresholds, interruption policy).
    pub turn: TurnConfig,
    /// Speech recognition supervision (retries, backoff, fallback mode).
    pub recognition: RecognitionConfig,
    /// Speech synthesis output (sentence splitting, inter-sentence pauses).
    pub synthesis: SynthesisConfig,
}

/// Turn-taking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Silence in ms after user speech before the turn counts as over.
    ///
    /// This is a debounce, not an edge trigger: if the user resumes speaking
    /// before the window elapses, the pending confirmation is cancelled.
    pub user_pause_threshold_ms: u64,
    /// Silence in ms after assistant speech before its turn counts as over.
    ///
    /// Much shorter than the user threshold: the assistant's pauses are
    /// inter-sentence gaps, not thinking time. Must stay above
    /// `SynthesisConfig::pause_between_sentences_ms` or every sentence gap
    /// completes a turn.
    pub assistant_pause_threshold_ms: u64,
    /// Whether one party may interrupt the other mid-utterance.
    pub allow_interruptions: bool,
    /// Cooldown in ms after an interruption during which further
    /// interruptions are suppressed while audio hardware settles.
    pub interruption_cooldown_ms: u64,
    /// RMS energy threshold above which captured audio counts as voice
    /// activity. Passed through to the input port.
    pub voice_activity_threshold: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            user_pause_threshold_ms: 500,
            assistant_pause_threshold_ms: 100,
            allow_interruptions: true,
            interruption_cooldown_ms: 200,
            voice_activity_threshold: 0.01,
        }
    }
}

/// Speech recognition supervision configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Whether the engine runs in continuous-recognition mode.
    pub continuous: bool,
    /// Whether the engine delivers interim (partial) results.
    pub interim_results: bool,
    /// Engine-side pause threshold in ms for segmenting utterances.
    pub pause_threshold_ms: u64,
    /// How long in ms the engine may listen without hearing speech before it
    /// reports a no-speech error.
    pub no_speech_timeout_ms: u64,
    /// Automatic restarts after no-speech errors before the error surfaces.
    pub max_no_speech_retries: u32,
    /// Delay in ms before restarting after a no-speech error.
    pub no_speech_restart_delay_ms: u64,
    /// Consecutive aborted errors before switching to the fallback profile.
    pub consecutive_error_threshold: u32,
    /// Base cooldown in ms after an aborted error. The window grows with the
    /// consecutive error count, capped at 5x, and suppresses restarts while
    /// it runs.
    pub cooldown_base_ms: u64,
    /// Delay in ms before the single retry after a network error.
    pub network_retry_delay_ms: u64,
    /// Restart attempts before automatic recovery is abandoned entirely.
    pub max_restart_attempts: u32,
    /// Seconds without any engine error before error counters reset, so a
    /// transient noisy period doesn't permanently bias the supervisor toward
    /// fallback mode.
    pub idle_reset_secs: u64,
    /// Whether the noise filter runs in the capture pipeline.
    pub noise_filter: bool,
    /// Whether the speech enhancer runs in the capture pipeline.
    pub speech_enhancer: bool,
    /// Degraded recognition profile used after repeated engine failures.
    pub fallback: FallbackConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            pause_threshold_ms: 500,
            no_speech_timeout_ms: 8_000,
            max_no_speech_retries: 3,
            no_speech_restart_delay_ms: 300,
            consecutive_error_threshold: 3,
            cooldown_base_ms: 1_000,
            network_retry_delay_ms: 1_500,
            max_restart_attempts: 5,
            idle_reset_secs: 30,
            noise_filter: true,
            speech_enhancer: true,
            fallback: FallbackConfig::default(),
        }
    }
}

/// Fallback-mode tunables: stability traded for responsiveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Engine pause threshold in ms while degraded (longer than normal).
    pub pause_threshold_ms: u64,
    /// No-speech retry budget while degraded (smaller than normal).
    pub max_no_speech_retries: u32,
    /// Quiet time in ms after a successful transcript before switching back
    /// to the normal profile.
    ///
    /// Entry and exit are intentionally asymmetric: entry is counted in
    /// consecutive errors, exit in quiet time after success.
    pub exit_delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            pause_threshold_ms: 1_500,
            max_no_speech_retries: 1,
            exit_delay_ms: 5_000,
        }
    }
}

/// Immutable recognition profile handed to the input port on `start`.
///
/// A mode switch produces a new profile value; options are never patched in
/// place underneath a running engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionProfile {
    /// Continuous-recognition mode.
    pub continuous: bool,
    /// Deliver interim (partial) results.
    pub interim_results: bool,
    /// Engine-side pause threshold in ms.
    pub pause_threshold_ms: u64,
    /// Engine-side no-speech window in ms.
    pub no_speech_timeout_ms: u64,
    /// Run the noise filter in the capture pipeline.
    pub noise_filter: bool,
    /// Run the speech enhancer in the capture pipeline.
    pub speech_enhancer: bool,
    /// Voice activity threshold for the capture pipeline.
    pub voice_activity_threshold: f32,
}

impl RecognitionConfig {
    /// The primary recognition profile.
    pub fn normal_profile(&self, voice_activity_threshold: f32) -> RecognitionProfile {
        RecognitionProfile {
            continuous: self.continuous,
            interim_results: self.interim_results,
            pause_threshold_ms: self.pause_threshold_ms,
            no_speech_timeout_ms: self.no_speech_timeout_ms,
            noise_filter: self.noise_filter,
            speech_enhancer: self.speech_enhancer,
            voice_activity_threshold,
        }
    }

    /// The degraded profile: non-continuous, no interim results, longer
    /// pause threshold, DSP disabled.
    pub fn fallback_profile(&self, voice_activity_threshold: f32) -> RecognitionProfile {
        RecognitionProfile {
            continuous: false,
            interim_results: false,
            pause_threshold_ms: self.fallback.pause_threshold_ms,
            no_speech_timeout_ms: self.no_speech_timeout_ms,
            noise_filter: false,
            speech_enhancer: false,
            voice_activity_threshold,
        }
    }
}

/// Speech synthesis output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Pause in ms between consecutive sentences of one reply.
    ///
    /// Keep below `TurnConfig::assistant_pause_threshold_ms` so inter-sentence
    /// gaps supersede the assistant pause timer instead of completing a turn
    /// per sentence.
    pub pause_between_sentences_ms: u64,
    /// Characters that end a sentence.
    pub sentence_delimiters: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            pause_between_sentences_ms: 80,
            sentence_delimiters: ".!?\u{3002}\u{ff01}\u{ff1f}".to_owned(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::SpeechError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SpeechError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/parley/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("parley").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("parley")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/parley-config/config.toml")
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.turn.user_pause_threshold_ms > config.turn.assistant_pause_threshold_ms);
        assert!(config.turn.assistant_pause_threshold_ms > config.synthesis.pause_between_sentences_ms);
        assert!(config.recognition.max_restart_attempts > 0);
        assert!(config.recognition.consecutive_error_threshold > 0);
        assert!(!config.synthesis.sentence_delimiters.is_empty());
        assert!(config.turn.voice_activity_threshold > 0.0);
    }

    #[test]
    fn fallback_profile_is_degraded() {
        let config = RecognitionConfig::default();
        let normal = config.normal_profile(0.01);
        let fallback = config.fallback_profile(0.01);

        assert!(normal.continuous);
        assert!(normal.interim_results);
        assert!(!fallback.continuous);
        assert!(!fallback.interim_results);
        assert!(!fallback.noise_filter);
        assert!(!fallback.speech_enhancer);
        assert!(fallback.pause_threshold_ms > normal.pause_threshold_ms);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = SessionConfig::default();
        config.turn.user_pause_threshold_ms = 800;
        config.recognition.max_restart_attempts = 9;
        config.synthesis.sentence_delimiters = ".".to_owned();

        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::from_file(&path).unwrap();

        assert_eq!(loaded.turn.user_pause_threshold_ms, 800);
        assert_eq!(loaded.recognition.max_restart_attempts, 9);
        assert_eq!(loaded.synthesis.sentence_delimiters, ".");
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = SessionConfig::from_file(std::path::Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(SessionConfig::from_file(&path).is_err());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = SessionConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("parley"));
    }
}
