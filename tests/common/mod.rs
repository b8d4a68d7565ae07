//! Shared fakes for integration tests: scripted engine ports that never
//! touch real audio hardware.

#![allow(dead_code)]

use async_trait::async_trait;
use parley::{RecognitionProfile, Result, SpeechError, SynthesizedAudio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Initialise test logging once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the recognition port was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MicCall {
    Start(RecognitionProfile),
    Stop,
}

/// Fake speech input port that records start/stop calls. Engine events are
/// injected by the test through the channel it created the supervisor with.
#[derive(Clone, Default)]
pub struct FakeMic {
    pub calls: Arc<Mutex<Vec<MicCall>>>,
}

impl FakeMic {
    pub fn started_profiles(&self) -> Vec<RecognitionProfile> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MicCall::Start(p) => Some(p.clone()),
                MicCall::Stop => None,
            })
            .collect()
    }
}

#[async_trait]
impl parley::SpeechInputPort for FakeMic {
    async fn start(&mut self, profile: &RecognitionProfile) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MicCall::Start(profile.clone()));
        Ok(())
    }

    async fn stop(&mut self) {
        self.calls.lock().unwrap().push(MicCall::Stop);
    }
}

/// Fake speech output port with configurable latency and scripted failures.
pub struct FakeSpeaker {
    pub synth_delay: Duration,
    pub play_delay: Duration,
    pub fail_containing: Option<&'static str>,
    pub spoken: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeSpeaker {
    fn default() -> Self {
        Self {
            synth_delay: Duration::from_millis(10),
            play_delay: Duration::from_millis(300),
            fail_containing: None,
            spoken: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl parley::SpeechOutputPort for FakeSpeaker {
    async fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio> {
        tokio::time::sleep(self.synth_delay).await;
        if let Some(marker) = self.fail_containing {
            if text.contains(marker) {
                return Err(SpeechError::Synthesis("scripted failure".into()));
            }
        }
        self.spoken.lock().unwrap().push(text.to_owned());
        Ok(SynthesizedAudio {
            samples: vec![0.0; 240],
            sample_rate: 24_000,
        })
    }

    async fn play(&mut self, _audio: SynthesizedAudio) -> Result<()> {
        tokio::time::sleep(self.play_delay).await;
        Ok(())
    }
}
