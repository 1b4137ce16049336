//! Shared test utilities
//!
//! Scripted stand-ins for every collaborator, so turns and sessions can run
//! without audio hardware or network services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley::config::VoiceConfig;
use parley::config::file::ParleyConfigFile;
use parley::pipeline::{
    AudioPlayer, AudioResampler, LanguageModel, RawUtterance, SpeechCapture, Synthesizer,
    Transcriber,
};
use parley::{
    CaptureError, Config, ConversationStore, Error, Message, Result, TurnPipeline, TurnStages,
};

/// Configuration rooted in `dir` with no start prompt and the given window
pub fn test_config(dir: &Path, window: usize) -> Config {
    let mut config = Config::from_sources(ParleyConfigFile::default(), |_| None, dir)
        .expect("default config is valid");
    config.start_prompt = String::new();
    config.history.window = window;
    config
}

/// One scripted listening attempt
#[derive(Debug, Clone)]
pub enum Heard {
    /// Capture succeeds and transcribes to this text
    Text(String),
    /// Capture fails with nothing heard
    Nothing,
    /// Capture fails at the device
    DeviceFailure,
    /// Capture succeeds but transcription fails
    ServiceDown,
}

pub fn said(text: &str) -> Heard {
    Heard::Text(text.to_string())
}

/// Capture and transcription driven by a script
///
/// Once the script runs out, capture waits forever.
pub struct ScriptedListener {
    script: Mutex<VecDeque<Heard>>,
    pending: Mutex<Option<Heard>>,
}

impl ScriptedListener {
    pub fn new(script: impl IntoIterator<Item = Heard>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            pending: Mutex::new(None),
        })
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechCapture for ScriptedListener {
    async fn capture(&self) -> std::result::Result<RawUtterance, CaptureError> {
        let next = self.script.lock().unwrap().pop_front();
        let Some(heard) = next else {
            return std::future::pending().await;
        };

        match heard {
            Heard::Nothing => Err(CaptureError::NoSpeech),
            Heard::DeviceFailure => Err(CaptureError::Device("unplugged".to_string())),
            other => {
                *self.pending.lock().unwrap() = Some(other);
                Ok(RawUtterance {
                    samples: vec![0.1; 1600],
                    sample_rate: 16_000,
                })
            }
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedListener {
    async fn transcribe(&self, _utterance: &RawUtterance) -> Result<String> {
        match self.pending.lock().unwrap().take() {
            Some(Heard::Text(text)) => Ok(text),
            _ => Err(Error::Transcription("service unavailable".to_string())),
        }
    }
}

/// Language model replying from a script and recording every request
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    /// Model that answers "reply 1", "reply 2", ... forever
    pub fn counting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            requests.len()
        };
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reply {n}")))
    }
}

/// Synthesizer that records the text it was given
#[derive(Default)]
pub struct RecordingSynthesizer {
    fail: bool,
    texts: Mutex<Vec<String>>,
}

impl RecordingSynthesizer {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceConfig,
        _tts_path: &Path,
        converted_path: &Path,
    ) -> Result<PathBuf> {
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(Error::Synthesis("Applio down".to_string()));
        }
        Ok(converted_path.to_path_buf())
    }
}

/// Resampler that fails for chosen output paths and records each attempt
#[derive(Default)]
pub struct RecordingResampler {
    fail_outputs: Vec<PathBuf>,
    fail_all: bool,
    outputs: Mutex<Vec<PathBuf>>,
}

impl RecordingResampler {
    pub fn failing_at(paths: impl IntoIterator<Item = PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            fail_outputs: paths.into_iter().collect(),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_all: true,
            ..Self::default()
        })
    }

    pub fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioResampler for RecordingResampler {
    async fn resample(&self, _input: &Path, _target_rate: u32, output: &Path) -> Result<PathBuf> {
        self.outputs.lock().unwrap().push(output.to_path_buf());
        if self.fail_all || self.fail_outputs.iter().any(|p| p == output) {
            return Err(Error::Resample(format!("cannot write {}", output.display())));
        }
        Ok(output.to_path_buf())
    }
}

/// Player that records what it played
#[derive(Default)]
pub struct RecordingPlayer {
    fail: bool,
    played: Mutex<Vec<PathBuf>>,
}

impl RecordingPlayer {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            played: Mutex::new(Vec::new()),
        })
    }

    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, artifact: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::Playback("device busy".to_string()));
        }
        self.played.lock().unwrap().push(artifact.to_path_buf());
        Ok(())
    }
}

/// Every collaborator of a turn, kept so tests can inspect them afterwards
pub struct Harness {
    pub config: Config,
    pub store: ConversationStore,
    pub model: Arc<ScriptedModel>,
    pub synthesizer: Arc<RecordingSynthesizer>,
    pub resampler: Arc<RecordingResampler>,
    pub player: Arc<RecordingPlayer>,
}

impl Harness {
    pub fn new(dir: &Path, window: usize) -> Self {
        let config = test_config(dir, window);
        let store = ConversationStore::new(&config.history.dir).unwrap();
        Self {
            config,
            store,
            model: ScriptedModel::counting(),
            synthesizer: Arc::new(RecordingSynthesizer::default()),
            resampler: Arc::new(RecordingResampler::default()),
            player: Arc::new(RecordingPlayer::default()),
        }
    }

    pub fn pipeline(&self) -> TurnPipeline {
        TurnPipeline::new(
            &self.config,
            self.store.clone(),
            TurnStages {
                model: self.model.clone(),
                synthesizer: self.synthesizer.clone(),
                resampler: self.resampler.clone(),
                player: self.player.clone(),
            },
        )
    }
}
