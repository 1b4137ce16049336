//! The listen-respond loop for one user
//!
//! Listens for an utterance, runs a turn for it, and repeats until the user
//! says the exit keyword or the process is interrupted. Either way the
//! history is saved before returning.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::conversation::ConversationHistory;
use crate::error::CaptureError;
use crate::pipeline::{SpeechCapture, Transcriber, TurnOutcome, TurnPipeline};

/// Pause after an input device failure before listening again
const DEVICE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user said the exit keyword
    Keyword,
    /// Shutdown was requested (Ctrl-C)
    Interrupted,
}

/// What happened during a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub reason: ExitReason,
    /// Turns run, whatever their outcome
    pub turns: usize,
    /// Turns that ended in playback
    pub played: usize,
    /// Whether the final save succeeded
    pub saved: bool,
}

/// A conversation session bound to one user and one set of collaborators
pub struct Session {
    pipeline: TurnPipeline,
    capture: Arc<dyn SpeechCapture>,
    transcriber: Arc<dyn Transcriber>,
    exit_keyword: String,
}

impl Session {
    #[must_use]
    pub fn new(
        pipeline: TurnPipeline,
        capture: Arc<dyn SpeechCapture>,
        transcriber: Arc<dyn Transcriber>,
        exit_keyword: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            capture,
            transcriber,
            exit_keyword: exit_keyword.into(),
        }
    }

    /// Run until the exit keyword or Ctrl-C
    pub async fn run(&self) -> SessionSummary {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until the exit keyword or until `shutdown` completes
    ///
    /// Shutdown interrupts whatever the loop is waiting on, including a turn
    /// in progress; anything already appended to the history is still saved.
    pub async fn run_until<F>(&self, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        let user_id = self.pipeline.user_id().to_string();
        let store = self.pipeline.store();

        let mut history = store.load(&user_id);
        tracing::info!(
            user_id = %user_id,
            messages = history.len(),
            exit_keyword = %self.exit_keyword,
            "welcome to parley, start talking"
        );

        let mut turns = 0;
        let mut played = 0;

        tokio::pin!(shutdown);
        let reason = loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("interrupted");
                    break ExitReason::Interrupted;
                }
                step = self.step(&mut history) => match step {
                    Step::Exit => break ExitReason::Keyword,
                    Step::Skipped => {}
                    Step::Turn(outcome) => {
                        turns += 1;
                        if outcome == TurnOutcome::Played {
                            played += 1;
                        }
                    }
                },
            }
        };

        let saved = match store.save(&user_id, &history) {
            Ok(()) => {
                tracing::info!(user_id = %user_id, messages = history.len(), "history saved");
                true
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "failed to save history on exit");
                false
            }
        };

        SessionSummary {
            reason,
            turns,
            played,
            saved,
        }
    }

    /// Listen once and act on what was heard
    async fn step(&self, history: &mut ConversationHistory) -> Step {
        let text = match self.listen().await {
            Ok(text) => text,
            Err(e) => {
                match &e {
                    CaptureError::NoSpeech => tracing::info!("could not understand the audio"),
                    CaptureError::Unavailable(reason) => {
                        tracing::error!(
                            reason = %reason,
                            "speech recognition service request failed"
                        );
                    }
                    CaptureError::Device(reason) => {
                        tracing::error!(reason = %reason, "input device failed");
                        tokio::time::sleep(DEVICE_RETRY_DELAY).await;
                    }
                }
                return Step::Skipped;
            }
        };

        if self.is_exit(&text) {
            tracing::info!("exit keyword heard");
            return Step::Exit;
        }

        let outcome = self.pipeline.run_turn(history, &text).await;
        tracing::debug!(?outcome, messages = history.len(), "turn finished");
        Step::Turn(outcome)
    }

    /// Capture and transcribe one utterance
    async fn listen(&self) -> Result<String, CaptureError> {
        let utterance = self.capture.capture().await?;
        tracing::debug!(seconds = utterance.duration_secs(), "utterance captured");

        let text = self
            .transcriber
            .transcribe(&utterance)
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(CaptureError::NoSpeech);
        }

        tracing::info!(text = %text, "you said");
        Ok(text.to_string())
    }

    /// Transcribers punctuate single words ("Exit."), so surrounding
    /// punctuation is ignored along with case
    fn is_exit(&self, text: &str) -> bool {
        normalize(text) == normalize(&self.exit_keyword)
    }
}

fn normalize(text: &str) -> String {
    text.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

enum Step {
    Exit,
    Skipped,
    Turn(TurnOutcome),
}
