//! Recovery behaviour of the recognition supervisor driven end-to-end:
//! scripted engine events in, clean transcript/mode/error stream out.

mod common;

use common::FakeMic;
use parley::{
    EngineErrorCode, EngineEvent, InputEvent, RecognitionSupervisor, SessionConfig, SpeechError,
};
use std::time::Duration;
use tokio::sync::mpsc;

struct Rig {
    engine_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<InputEvent>,
    handle: parley::RecognitionHandle,
    mic: FakeMic,
}

fn rig(config: SessionConfig) -> Rig {
    common::init_tracing();
    let mic = FakeMic::default();
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let (handle, events_rx) =
        RecognitionSupervisor::spawn(&config, Box::new(mic.clone()), engine_rx);
    Rig {
        engine_tx,
        events_rx,
        handle,
        mic,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<InputEvent>) -> InputEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("input event timeout")
        .expect("event channel closed")
}

fn abort_event() -> EngineEvent {
    EngineEvent::Error {
        code: EngineErrorCode::Aborted,
        message: "engine gave up".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_aborts_degrade_then_success_restores() {
    let mut r = rig(SessionConfig::default());
    r.handle.listen();

    // The engine comes up once.
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    // Three consecutive aborts push the supervisor into fallback mode.
    for _ in 0..3 {
        r.engine_tx.send(abort_event()).expect("supervisor alive");
    }
    loop {
        if let InputEvent::ModeChanged { fallback: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    // After the cooldown the engine restarts with the degraded profile.
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }
    let profiles = r.mic.started_profiles();
    let degraded = profiles.last().expect("a restart happened");
    assert!(!degraded.continuous);
    assert!(!degraded.interim_results);
    assert!(!degraded.noise_filter);
    assert!(profiles[0].continuous, "first start used the normal profile");

    // A successful transcript flows through and, after the exit delay,
    // the normal profile returns.
    r.engine_tx
        .send(EngineEvent::Result {
            text: "still here".into(),
            is_final: true,
        })
        .expect("supervisor alive");

    let mut saw_transcript = false;
    loop {
        match next_event(&mut r.events_rx).await {
            InputEvent::Transcript { ref text, is_final: true } if text == "still here" => {
                saw_transcript = true;
            }
            InputEvent::ModeChanged { fallback: false } => break,
            _ => {}
        }
    }
    assert!(saw_transcript);

    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }
    let profiles = r.mic.started_profiles();
    assert!(
        profiles.last().expect("restarted normal").continuous,
        "normal profile restored"
    );

    r.handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn no_speech_retries_silently_then_surfaces() {
    let mut r = rig(SessionConfig::default());
    r.handle.listen();
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    // Three quiet windows restart silently (default budget).
    for _ in 0..3 {
        r.engine_tx
            .send(EngineEvent::Error {
                code: EngineErrorCode::NoSpeech,
                message: String::new(),
            })
            .expect("supervisor alive");
        loop {
            match next_event(&mut r.events_rx).await {
                InputEvent::Listening { active: true } => break,
                InputEvent::Error(e) => panic!("retry must stay silent, got {e}"),
                _ => {}
            }
        }
    }

    // The fourth one surfaces.
    r.engine_tx
        .send(EngineEvent::Error {
            code: EngineErrorCode::NoSpeech,
            message: String::new(),
        })
        .expect("supervisor alive");
    loop {
        if let InputEvent::Error(SpeechError::NoSpeech) = next_event(&mut r.events_rx).await {
            break;
        }
    }

    r.handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn permission_denied_stops_listening_until_reset() {
    let mut r = rig(SessionConfig::default());
    r.handle.listen();
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    r.engine_tx
        .send(EngineEvent::Error {
            code: EngineErrorCode::NotAllowed,
            message: "denied".into(),
        })
        .expect("supervisor alive");

    loop {
        if let InputEvent::Error(SpeechError::PermissionDenied) =
            next_event(&mut r.events_rx).await
        {
            break;
        }
    }

    // No auto-retry, however long we wait.
    let starts_before = r.mic.started_profiles().len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(r.mic.started_profiles().len(), starts_before);

    // An explicit listen after the user fixed permissions works again.
    r.handle.listen();
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }
    assert_eq!(r.mic.started_profiles().len(), starts_before + 1);

    r.handle.shutdown();
}

#[tokio::test(start_paused = true)]
async fn restart_budget_exhaustion_is_terminal_until_reset() {
    let mut config = SessionConfig::default();
    config.recognition.max_restart_attempts = 2;
    // Keep the fallback threshold out of the way for this test.
    config.recognition.consecutive_error_threshold = 10;
    let mut r = rig(config);
    r.handle.listen();
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    for _ in 0..3 {
        r.engine_tx.send(abort_event()).expect("supervisor alive");
    }
    loop {
        if let InputEvent::Error(SpeechError::RecoveryExhausted) =
            next_event(&mut r.events_rx).await
        {
            break;
        }
    }

    // Reset restores a working supervisor.
    r.handle.reset();
    r.handle.listen();
    loop {
        if let InputEvent::Listening { active: true } = next_event(&mut r.events_rx).await {
            break;
        }
    }

    r.handle.shutdown();
}
