//! Speech-input resilience: supervision of a flaky recognition engine.
//!
//! The supervisor owns one [`SpeechInputPort`] session at a time and turns
//! the engine's raw error stream into a controlled retry/backoff/fallback
//! state machine. Upstream consumers see a clean transcript stream no
//! matter how many times the engine was restarted underneath.

use crate::config::{RecognitionConfig, SessionConfig};
use crate::error::SpeechError;
use crate::ports::{EngineErrorCode, EngineEvent, SpeechInputPort};
use crate::runtime::InputEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Commands accepted by a running supervisor.
enum SupervisorCommand {
    /// Begin (or resume) listening.
    Listen,
    /// Stop listening and release the capture pipeline.
    Stop,
    /// Full reset: counters, cooldowns, fallback mode, and the halt flag.
    Reset,
    /// Stop the supervisor task.
    Shutdown,
}

/// Cloneable handle to a running [`RecognitionSupervisor`].
#[derive(Clone)]
pub struct RecognitionHandle {
    cmd_tx: mpsc::UnboundedSender<SupervisorCommand>,
}

impl RecognitionHandle {
    /// Begin (or resume) listening.
    pub fn listen(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Listen);
    }

    /// Stop listening and release the capture pipeline.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Stop);
    }

    /// Clear all recovery state, including a terminal recovery failure.
    pub fn reset(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Reset);
    }

    /// Stop the supervisor task entirely.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SupervisorCommand::Shutdown);
    }
}

/// Retry bookkeeping. Reset to zero whenever a final transcript arrives.
#[derive(Debug, Default)]
struct RetryState {
    consecutive_errors: u32,
    restart_attempts: u32,
    no_speech_retries: u32,
    last_error_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    fallback_active: bool,
}

impl RetryState {
    fn in_cooldown(&self) -> bool {
        self.cooldown_until.is_some_and(|until| until > Instant::now())
    }
}

/// Actor supervising one speech recognition engine session at a time.
pub struct RecognitionSupervisor {
    config: RecognitionConfig,
    voice_activity_threshold: f32,
    port: Box<dyn SpeechInputPort>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    events_tx: mpsc::UnboundedSender<InputEvent>,
    cmd_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
    retry: RetryState,
    /// Whether the caller wants us listening right now.
    desired_listening: bool,
    /// Whether we believe an engine session is live.
    engine_live: bool,
    /// Terminal: recovery budget spent, waiting for an explicit reset.
    halted: bool,
    /// Single restart-backoff timer, as a deadline.
    restart_at: Option<Instant>,
    /// Scheduled return to the normal profile after quiet success.
    mode_exit_at: Option<Instant>,
}

impl RecognitionSupervisor {
    /// Create a supervisor over `port`, whose events arrive on `engine_rx`.
    ///
    /// Returns the supervisor (drive it with [`run`](Self::run)), its
    /// command handle, and the upward event stream.
    pub fn new(
        config: &SessionConfig,
        port: Box<dyn SpeechInputPort>,
        engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> (
        Self,
        RecognitionHandle,
        mpsc::UnboundedReceiver<InputEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                config: config.recognition.clone(),
                voice_activity_threshold: config.turn.voice_activity_threshold,
                port,
                engine_rx,
                events_tx,
                cmd_rx,
                retry: RetryState::default(),
                desired_listening: false,
                engine_live: false,
                halted: false,
                restart_at: None,
                mode_exit_at: None,
            },
            RecognitionHandle { cmd_tx },
            events_rx,
        )
    }

    /// Create a supervisor and run it on the current runtime.
    pub fn spawn(
        config: &SessionConfig,
        port: Box<dyn SpeechInputPort>,
        engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> (RecognitionHandle, mpsc::UnboundedReceiver<InputEvent>) {
        let (supervisor, handle, events_rx) = Self::new(config, port, engine_rx);
        tokio::spawn(supervisor.run());
        (handle, events_rx)
    }

    /// Drive the supervisor until shutdown.
    pub async fn run(mut self) {
        let mut watchdog =
            tokio::time::interval(Duration::from_secs(self.config.idle_reset_secs.max(1)));
        info!("recognition supervisor running");

        loop {
            let restart_at = self.restart_at;
            let restart_fut = async move {
                match restart_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            let exit_at = self.mode_exit_at;
            let exit_fut = async move {
                match exit_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(SupervisorCommand::Shutdown) => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                ev = self.engine_rx.recv() => match ev {
                    None => break,
                    Some(ev) => self.handle_engine_event(ev).await,
                },
                () = restart_fut => {
                    self.restart_at = None;
                    self.try_restart().await;
                }
                () = exit_fut => {
                    self.mode_exit_at = None;
                    self.exit_fallback().await;
                }
                _ = watchdog.tick() => self.watchdog_tick(),
            }
        }

        self.port.stop().await;
        info!("recognition supervisor stopped");
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Listen => {
                if self.halted {
                    warn!("listen requested while recovery is exhausted; reset required");
                    let _ = self
                        .events_tx
                        .send(InputEvent::Error(SpeechError::RecoveryExhausted));
                    return;
                }
                self.desired_listening = true;
                self.start_engine().await;
            }
            SupervisorCommand::Stop => {
                self.desired_listening = false;
                self.restart_at = None;
                self.stop_engine().await;
                let _ = self.events_tx.send(InputEvent::Listening { active: false });
            }
            SupervisorCommand::Reset => {
                info!("recognition supervisor reset");
                self.stop_engine().await;
                let was_fallback = self.retry.fallback_active;
                self.retry = RetryState::default();
                self.halted = false;
                self.desired_listening = false;
                self.restart_at = None;
                self.mode_exit_at = None;
                if was_fallback {
                    let _ = self.events_tx.send(InputEvent::ModeChanged { fallback: false });
                }
            }
            SupervisorCommand::Shutdown => {}
        }
    }

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started => {
                debug!("engine session started");
                self.engine_live = true;
            }
            EngineEvent::Ended => {
                self.engine_live = false;
                // Continuous engines end sessions on their own schedule; if
                // we still want to listen, treat it like any other restart.
                if self.desired_listening && !self.halted && self.restart_at.is_none() {
                    debug!("engine ended unexpectedly, scheduling restart");
                    self.schedule_restart(Duration::from_millis(
                        self.config.no_speech_restart_delay_ms,
                    ));
                }
            }
            EngineEvent::Result { text, is_final } => {
                if is_final {
                    self.on_final_transcript();
                }
                let _ = self
                    .events_tx
                    .send(InputEvent::Transcript { text, is_final });
            }
            EngineEvent::Error { code, message } => {
                self.retry.last_error_at = Some(Instant::now());
                self.handle_engine_error(code, message).await;
            }
        }
    }

    /// A successful final transcript clears the whole retry ledger.
    fn on_final_transcript(&mut self) {
        self.retry.consecutive_errors = 0;
        self.retry.restart_attempts = 0;
        self.retry.no_speech_retries = 0;
        if self.retry.fallback_active && self.mode_exit_at.is_none() {
            let delay = Duration::from_millis(self.config.fallback.exit_delay_ms);
            self.mode_exit_at = Some(Instant::now() + delay);
            info!(
                "transcript succeeded in fallback mode, normal profile in {}ms",
                self.config.fallback.exit_delay_ms
            );
        }
    }

    async fn handle_engine_error(&mut self, code: EngineErrorCode, message: String) {
        match code {
            EngineErrorCode::NoSpeech => {
                let budget = if self.retry.fallback_active {
                    self.config.fallback.max_no_speech_retries
                } else {
                    self.config.max_no_speech_retries
                };
                if self.retry.no_speech_retries < budget && !self.retry.in_cooldown() {
                    self.retry.no_speech_retries += 1;
                    info!(
                        "no speech detected, retry {}/{budget}",
                        self.retry.no_speech_retries
                    );
                    self.schedule_restart(Duration::from_millis(
                        self.config.no_speech_restart_delay_ms,
                    ));
                } else {
                    self.retry.no_speech_retries = 0;
                    let _ = self.events_tx.send(InputEvent::Error(SpeechError::NoSpeech));
                }
            }
            EngineErrorCode::Aborted => {
                self.retry.consecutive_errors += 1;
                let n = self.retry.consecutive_errors;
                // Growing cooldown window; restarts are suppressed until it
                // elapses so an instantly-aborting engine can't cause a
                // restart storm.
                let cooldown =
                    Duration::from_millis(self.config.cooldown_base_ms * u64::from(n.min(5)));
                self.retry.cooldown_until = Some(Instant::now() + cooldown);

                if n >= self.config.consecutive_error_threshold && !self.retry.fallback_active {
                    self.enter_fallback().await;
                } else if self.retry.fallback_active {
                    // Already degraded; don't re-notify on every abort.
                    debug!("engine aborted again in fallback mode ({n} consecutive)");
                } else {
                    warn!("engine aborted ({n} consecutive)");
                    let _ = self
                        .events_tx
                        .send(InputEvent::Error(SpeechError::Aborted(message)));
                }
                self.schedule_restart(cooldown);
            }
            EngineErrorCode::Network => {
                warn!("recognition network error: {message}");
                let _ = self
                    .events_tx
                    .send(InputEvent::Error(SpeechError::Network(message)));
                let delay = Duration::from_millis(self.config.network_retry_delay_ms);
                self.retry.cooldown_until = Some(Instant::now() + delay);
                self.schedule_restart(delay);
            }
            EngineErrorCode::NotAllowed => {
                error!("microphone permission denied");
                self.abandon_listening().await;
                let _ = self
                    .events_tx
                    .send(InputEvent::Error(SpeechError::PermissionDenied));
            }
            EngineErrorCode::AudioCapture => {
                error!("audio capture failed: {message}");
                self.abandon_listening().await;
                let _ = self
                    .events_tx
                    .send(InputEvent::Error(SpeechError::NoMicrophone));
            }
        }
    }

    /// Permission and capture failures need out-of-band user action; stop
    /// the engine and wait for an explicit `listen`.
    async fn abandon_listening(&mut self) {
        self.desired_listening = false;
        self.restart_at = None;
        self.stop_engine().await;
        let _ = self.events_tx.send(InputEvent::Listening { active: false });
    }

    /// Switch to the degraded recognition profile.
    async fn enter_fallback(&mut self) {
        self.retry.fallback_active = true;
        self.mode_exit_at = None;
        warn!(
            "entering fallback recognition profile after {} consecutive aborts",
            self.retry.consecutive_errors
        );
        let _ = self.events_tx.send(InputEvent::ModeChanged { fallback: true });
        // The capture pipeline is a singleton: fully release it here; the
        // scheduled restart reacquires it with the fallback profile.
        self.stop_engine().await;
    }

    /// Return to the normal profile after quiet success in fallback mode.
    async fn exit_fallback(&mut self) {
        if !self.retry.fallback_active || self.retry.consecutive_errors != 0 {
            return;
        }
        info!("returning to normal recognition profile");
        self.retry.fallback_active = false;
        let _ = self.events_tx.send(InputEvent::ModeChanged { fallback: false });
        if self.desired_listening {
            self.start_engine().await;
        }
    }

    /// Arm the single restart timer, respecting the cooldown window and the
    /// overall restart budget.
    fn schedule_restart(&mut self, delay: Duration) {
        if self.halted || !self.desired_listening {
            return;
        }
        if self.retry.restart_attempts >= self.config.max_restart_attempts {
            self.halt_recovery();
            return;
        }
        self.retry.restart_attempts += 1;
        let mut at = Instant::now() + delay;
        if let Some(cooldown) = self.retry.cooldown_until {
            if cooldown > at {
                at = cooldown;
            }
        }
        self.restart_at = Some(at);
    }

    fn halt_recovery(&mut self) {
        self.halted = true;
        self.restart_at = None;
        error!(
            "auto-recovery abandoned after {} restart attempts",
            self.retry.restart_attempts
        );
        let _ = self
            .events_tx
            .send(InputEvent::Error(SpeechError::RecoveryExhausted));
    }

    async fn try_restart(&mut self) {
        if !self.desired_listening || self.halted {
            return;
        }
        info!(
            "restarting recognition engine (attempt {})",
            self.retry.restart_attempts
        );
        self.start_engine().await;
    }

    /// Start an engine session with the profile for the current mode,
    /// stopping any live session first (the pipeline is never shared across
    /// two engine instances).
    async fn start_engine(&mut self) {
        self.stop_engine().await;
        let profile = if self.retry.fallback_active {
            self.config.fallback_profile(self.voice_activity_threshold)
        } else {
            self.config.normal_profile(self.voice_activity_threshold)
        };
        match self.port.start(&profile).await {
            Ok(()) => {
                self.engine_live = true;
                let _ = self.events_tx.send(InputEvent::Listening { active: true });
            }
            Err(e) => {
                warn!("engine start failed: {e}");
                self.schedule_restart(Duration::from_millis(
                    self.config.no_speech_restart_delay_ms,
                ));
            }
        }
    }

    async fn stop_engine(&mut self) {
        if self.engine_live {
            self.port.stop().await;
            self.engine_live = false;
        }
    }

    /// A quiet period clears the error counters so one noisy stretch does
    /// not permanently bias the supervisor toward fallback mode.
    fn watchdog_tick(&mut self) {
        if self.retry.consecutive_errors == 0 && self.retry.restart_attempts == 0 {
            return;
        }
        let idle = Duration::from_secs(self.config.idle_reset_secs);
        let quiet = self
            .retry
            .last_error_at
            .is_none_or(|at| at.elapsed() >= idle);
        if quiet {
            info!(
                "no recognition errors for {}s, clearing error counters",
                idle.as_secs()
            );
            self.retry.consecutive_errors = 0;
            self.retry.restart_attempts = 0;
        }
    }
}
