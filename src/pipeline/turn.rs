//! One conversational turn
//!
//! Compose, generate, filter, synthesize, resample, play. Each stage that
//! talks to the outside world can fail independently; a failure ends the
//! turn but never the session, and nothing already appended to the history
//! is rolled back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::collaborators::{AudioPlayer, AudioResampler, LanguageModel, Synthesizer};
use super::filter::ResponseFilter;
use crate::config::{Config, VoiceConfig};
use crate::conversation::{ConversationHistory, ConversationStore, HistoryWindow, Message};

/// File name used when the derived resample path cannot be written
const FALLBACK_RESAMPLED: &str = "resampled.wav";

/// A turn stage that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Synthesize,
    Resample,
    Play,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Synthesize => "synthesize",
            Self::Resample => "resample",
            Self::Play => "play",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was spoken
    Played,
    /// The reply filtered down to nothing, so there was nothing to speak
    Silent,
    /// A stage failed and the rest of the turn was skipped
    Aborted { stage: Stage, reason: String },
}

impl TurnOutcome {
    fn aborted(stage: Stage, err: &crate::Error) -> Self {
        tracing::error!(stage = %stage, error = %err, "turn aborted");
        Self::Aborted {
            stage,
            reason: err.to_string(),
        }
    }
}

/// External stages of a turn
#[derive(Clone)]
pub struct TurnStages {
    pub model: Arc<dyn LanguageModel>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub resampler: Arc<dyn AudioResampler>,
    pub player: Arc<dyn AudioPlayer>,
}

/// Runs turns for one user against injected collaborators
pub struct TurnPipeline {
    user_id: String,
    start_prompt: String,
    stages: TurnStages,
    filter: ResponseFilter,
    window: HistoryWindow,
    voice: VoiceConfig,
    store: ConversationStore,
}

impl TurnPipeline {
    #[must_use]
    pub fn new(config: &Config, store: ConversationStore, stages: TurnStages) -> Self {
        Self {
            user_id: config.session.user_id.clone(),
            start_prompt: config.start_prompt.clone(),
            stages,
            filter: ResponseFilter::new(
                &config.filter.allowed_symbols,
                &config.filter.forbidden_chars,
            ),
            window: HistoryWindow::new(config.history.window),
            voice: config.voice.clone(),
            store,
        }
    }

    /// Store used for checkpoints
    #[must_use]
    pub const fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// User whose history this pipeline appends to
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run one turn for a transcribed utterance
    ///
    /// The history gains the user message, and the assistant message when
    /// generation succeeds. It is checkpointed right after generation either
    /// way.
    pub async fn run_turn(
        &self,
        history: &mut ConversationHistory,
        utterance: &str,
    ) -> TurnOutcome {
        // Compose
        history.push(Message::user(format!("{}{utterance}", self.start_prompt)));

        // Generate
        let request = self.window.window(history);
        tracing::debug!(sent = request.len(), stored = history.len(), "generating reply");
        let generated = self.stages.model.generate(&request).await;
        if let Ok(reply) = &generated {
            history.push(Message::assistant(reply.clone()));
        }
        self.checkpoint(history);

        let reply = match generated {
            Ok(reply) => reply,
            Err(e) => return TurnOutcome::aborted(Stage::Generate, &e),
        };
        tracing::info!(reply = %reply, "assistant replied");

        // Filter
        let text = self.filter.apply(&reply);
        if text.trim().is_empty() {
            tracing::info!("reply has nothing speakable");
            return TurnOutcome::Silent;
        }

        // Synthesize
        let artifact = match self
            .stages
            .synthesizer
            .synthesize(
                &text,
                &self.voice,
                &self.voice.tts_output_path,
                &self.voice.rvc_output_path,
            )
            .await
        {
            Ok(path) => path,
            Err(e) => return TurnOutcome::aborted(Stage::Synthesize, &e),
        };

        // Resample
        let playable = match self.resample(&artifact).await {
            Ok(path) => path,
            Err(e) => return TurnOutcome::aborted(Stage::Resample, &e),
        };

        // Play
        if let Err(e) = self.stages.player.play(&playable).await {
            return TurnOutcome::aborted(Stage::Play, &e);
        }

        TurnOutcome::Played
    }

    /// Resample to the derived path, falling back to the fixed one
    async fn resample(&self, artifact: &Path) -> crate::Result<PathBuf> {
        let rate = self.voice.resample_rate;
        let derived = resampled_path(artifact);

        match self.stages.resampler.resample(artifact, rate, &derived).await {
            Ok(path) => Ok(path),
            Err(e) => {
                let fallback = fallback_path(artifact);
                tracing::warn!(
                    path = %derived.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "resample failed, retrying at fallback path"
                );
                self.stages.resampler.resample(artifact, rate, &fallback).await
            }
        }
    }

    fn checkpoint(&self, history: &ConversationHistory) {
        if let Err(e) = self.store.save(&self.user_id, history) {
            tracing::warn!(user_id = %self.user_id, error = %e, "history checkpoint failed");
        }
    }
}

/// `<dir>/<stem>_resampled.wav` next to the artifact
#[must_use]
pub fn resampled_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map_or_else(|| "audio".into(), |s| s.to_string_lossy());
    artifact.with_file_name(format!("{stem}_resampled.wav"))
}

fn fallback_path(artifact: &Path) -> PathBuf {
    artifact.with_file_name(FALLBACK_RESAMPLED)
}
