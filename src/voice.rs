//! Speech capture modeled as an explicitly owned session.
//!
//! A [`VoiceSession`] is acquired from a [`SpeechEngine`] for one capture and
//! dropped when it ends. The worker behind a session emits at most one
//! `Transcript`, possibly an `Error`, and always finishes with `End`, so the
//! orchestrator has a single authoritative signal for releasing the
//! listening state.

use anyhow::{Result, anyhow};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// Notifications delivered by one capture session, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// The finalized transcript. Emitted at most once per session.
    Transcript(String),
    /// Capture failed; the reason is for the log, not the transcript.
    Error(String),
    /// Capture terminated. Always the last event, on every path.
    End,
}

/// One active capture session.
pub struct VoiceSession {
    events: mpsc::UnboundedReceiver<VoiceEvent>,
    stop: Option<oneshot::Sender<()>>,
}

impl VoiceSession {
    /// Wrap a channel the engine (or a test) drives.
    pub fn from_channel(
        events: mpsc::UnboundedReceiver<VoiceEvent>,
        stop: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            stop: Some(stop),
        }
    }

    /// Non-blocking poll for the next notification. A worker that went away
    /// without a farewell counts as `End`.
    pub fn try_next(&mut self) -> Option<VoiceEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(VoiceEvent::End),
        }
    }

    /// Ask the engine to stop capturing. `End` is still delivered through the
    /// event stream; this does not release the session by itself.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Boundary to whatever recognition capability is available.
pub trait SpeechEngine {
    fn start(&self) -> Result<VoiceSession>;
}

/// Engine backed by an external capture command (a whisper CLI wrapper, for
/// example). The command records until it exits; its trimmed stdout is the
/// finalized transcript.
pub struct CommandSpeechEngine {
    command: String,
}

impl CommandSpeechEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn start(&self) -> Result<VoiceSession> {
        if self.command.trim().is_empty() {
            return Err(anyhow!("speech command is empty"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let command = self.command.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                // Manual stop: discard the capture, no transcript.
                _ = &mut stop_rx => None,
                output = run_capture(&command) => Some(output),
            };

            match outcome {
                Some(Ok(transcript)) => {
                    let _ = tx.send(VoiceEvent::Transcript(transcript));
                }
                Some(Err(e)) => {
                    tracing::warn!("voice capture failed: {e:#}");
                    let _ = tx.send(VoiceEvent::Error(e.to_string()));
                }
                None => {}
            }
            let _ = tx.send(VoiceEvent::End);
        });

        Ok(VoiceSession::from_channel(rx, stop_tx))
    }
}

async fn run_capture(command: &str) -> Result<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(anyhow!("capture command exited with {}", output.status));
    }

    let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if transcript.is_empty() {
        return Err(anyhow!("capture command produced no transcript"));
    }
    Ok(transcript)
}
