//! Speech output queue: sentence-by-sentence synthesis and playback with
//! guaranteed interruption.
//!
//! One reply is queued as one entry, split into sentences, and synthesized
//! one sentence at a time so an interruption takes effect within a single
//! sentence's latency instead of after the whole reply. Every long-running
//! step (synthesis, playback, inter-sentence pause) is raced against the
//! entry's cancellation token; a token checked only on entry would leave
//! playback uninterruptible.

mod sentence;

use crate::config::SynthesisConfig;
use crate::ports::SpeechOutputPort;
use crate::runtime::OutputEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the output event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// One "speak this text" request.
#[derive(Debug, Clone)]
pub struct SpeakRequest {
    /// Id returned by [`OutputHandle::speak`].
    pub id: u64,
    /// The full reply text; split into sentences when the entry plays.
    pub text: String,
}

enum OutputCommand {
    Speak(SpeakRequest),
    Interrupt,
    Shutdown,
}

struct Shared {
    speaking: AtomicBool,
    next_id: AtomicU64,
    current_sentence: Mutex<Option<String>>,
    /// Cancellation token for the in-flight entry. Rotated per entry.
    utterance_cancel: Mutex<CancellationToken>,
}

/// Cloneable handle to a running [`SpeechOutputQueue`].
#[derive(Clone)]
pub struct OutputHandle {
    cmd_tx: mpsc::UnboundedSender<OutputCommand>,
    events: broadcast::Sender<OutputEvent>,
    shared: Arc<Shared>,
}

impl OutputHandle {
    /// Queue a reply for playback. Returns the entry id used in events.
    pub fn speak(&self, text: impl Into<String>) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.cmd_tx.send(OutputCommand::Speak(SpeakRequest {
            id,
            text: text.into(),
        }));
        id
    }

    /// Stop the in-flight entry immediately and clear all pending entries.
    ///
    /// Idempotent: with nothing playing this is a no-op.
    pub fn interrupt(&self) {
        // Command before token: whichever the queue observes first, the
        // in-flight entry stops and pending entries are cleared.
        let _ = self.cmd_tx.send(OutputCommand::Interrupt);
        lock(&self.shared.utterance_cancel).cancel();
    }

    /// Stop the queue task, aborting any in-flight entry.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        lock(&self.shared.utterance_cancel).cancel();
    }

    /// Whether an entry is currently being synthesized/played.
    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::Relaxed)
    }

    /// The sentence currently in flight, for display and for interruption
    /// capture.
    pub fn current_sentence(&self) -> Option<String> {
        lock(&self.shared.current_sentence).clone()
    }

    /// Subscribe to playback lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.events.subscribe()
    }
}

/// How one entry's playback ended.
enum Outcome {
    Finished,
    Interrupted,
    Failed(String),
}

/// Queue actor owning one [`SpeechOutputPort`].
pub struct SpeechOutputQueue {
    config: SynthesisConfig,
    port: Box<dyn SpeechOutputPort>,
    cmd_rx: mpsc::UnboundedReceiver<OutputCommand>,
    events: broadcast::Sender<OutputEvent>,
    shared: Arc<Shared>,
    queue: VecDeque<SpeakRequest>,
}

impl SpeechOutputQueue {
    /// Create a queue and its handle. The queue does nothing until
    /// [`run`](Self::run) is awaited (usually via [`spawn`](Self::spawn)).
    pub fn new(config: SynthesisConfig, port: Box<dyn SpeechOutputPort>) -> (Self, OutputHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let shared = Arc::new(Shared {
            speaking: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            current_sentence: Mutex::new(None),
            utterance_cancel: Mutex::new(CancellationToken::new()),
        });
        let handle = OutputHandle {
            cmd_tx,
            events: events.clone(),
            shared: Arc::clone(&shared),
        };
        (
            Self {
                config,
                port,
                cmd_rx,
                events,
                shared,
                queue: VecDeque::new(),
            },
            handle,
        )
    }

    /// Create a queue and run it on the current runtime.
    pub fn spawn(config: SynthesisConfig, port: Box<dyn SpeechOutputPort>) -> OutputHandle {
        let (queue, handle) = Self::new(config, port);
        tokio::spawn(queue.run());
        handle
    }

    /// Drive the queue until shutdown.
    pub async fn run(mut self) {
        info!("speech output queue running");
        loop {
            match self.cmd_rx.recv().await {
                None | Some(OutputCommand::Shutdown) => break,
                Some(OutputCommand::Speak(req)) => self.queue.push_back(req),
                Some(OutputCommand::Interrupt) => self.queue.clear(),
            }

            let mut open = true;
            while open {
                let Some(entry) = self.queue.pop_front() else {
                    break;
                };
                open = self.speak_entry(entry).await;
            }
            if !open {
                break;
            }
        }
        self.shared.speaking.store(false, Ordering::Relaxed);
        info!("speech output queue stopped");
    }

    /// Pull queued commands without blocking. Returns false on shutdown.
    fn drain_commands(&mut self, token: &CancellationToken) -> bool {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                OutputCommand::Speak(req) => self.queue.push_back(req),
                OutputCommand::Interrupt => {
                    token.cancel();
                    self.queue.clear();
                }
                OutputCommand::Shutdown => return false,
            }
        }
        true
    }

    /// Play one entry to completion, interruption, or failure.
    ///
    /// Returns false when the queue should shut down.
    async fn speak_entry(&mut self, entry: SpeakRequest) -> bool {
        let token = CancellationToken::new();
        *lock(&self.shared.utterance_cancel) = token.clone();
        // Re-check commands now the fresh token is installed: an interrupt
        // that raced the rotation must still cover this entry.
        if !self.drain_commands(&token) {
            return false;
        }
        if token.is_cancelled() {
            self.emit(OutputEvent::Interrupted { id: entry.id });
            self.queue.clear();
            return true;
        }

        let sentences =
            sentence::split_sentences(&entry.text, &self.config.sentence_delimiters);
        self.emit(OutputEvent::Started { id: entry.id });
        if sentences.is_empty() {
            self.emit(OutputEvent::Finished { id: entry.id });
            return true;
        }

        self.shared.speaking.store(true, Ordering::Relaxed);
        let pause = Duration::from_millis(self.config.pause_between_sentences_ms);
        let total = sentences.len();
        let mut outcome = Outcome::Finished;

        for (index, text) in sentences.iter().enumerate() {
            *lock(&self.shared.current_sentence) = Some(text.clone());
            self.emit(OutputEvent::SentenceStarted {
                id: entry.id,
                index,
                text: text.clone(),
            });

            let synth = tokio::select! {
                () = token.cancelled() => {
                    outcome = Outcome::Interrupted;
                    break;
                }
                result = self.port.synthesize(text) => result,
            };
            let audio = match synth {
                Ok(audio) => audio,
                Err(e) => {
                    warn!("synthesis failed for entry {}: {e}", entry.id);
                    outcome = Outcome::Failed(e.to_string());
                    break;
                }
            };
            // The interrupt may have landed while synthesis was completing.
            if token.is_cancelled() {
                outcome = Outcome::Interrupted;
                break;
            }

            let played = tokio::select! {
                // Dropping the play future stops audible output (port
                // contract), so cancellation here is immediate.
                () = token.cancelled() => {
                    outcome = Outcome::Interrupted;
                    break;
                }
                result = self.port.play(audio) => result,
            };
            if let Err(e) = played {
                warn!("playback failed for entry {}: {e}", entry.id);
                outcome = Outcome::Failed(e.to_string());
                break;
            }

            self.emit(OutputEvent::SentenceEnded {
                id: entry.id,
                index,
            });

            if index + 1 < total {
                tokio::select! {
                    () = token.cancelled() => {
                        outcome = Outcome::Interrupted;
                        break;
                    }
                    () = tokio::time::sleep(pause) => {}
                }
            }
        }

        *lock(&self.shared.current_sentence) = None;
        self.shared.speaking.store(false, Ordering::Relaxed);

        match outcome {
            Outcome::Finished => self.emit(OutputEvent::Finished { id: entry.id }),
            Outcome::Failed(reason) => self.emit(OutputEvent::Failed {
                id: entry.id,
                reason,
            }),
            Outcome::Interrupted => {
                info!("speech entry {} interrupted", entry.id);
                self.emit(OutputEvent::Interrupted { id: entry.id });
                self.queue.clear();
            }
        }
        true
    }

    fn emit(&self, event: OutputEvent) {
        let _ = self.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
