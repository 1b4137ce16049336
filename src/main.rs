use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley::llm::OllamaClient;
use parley::voice::{
    ApplioClient, AudioCapture, AudioPlayback, SpeechToText, WavResampler, list_devices,
};
use parley::{Config, ConversationStore, ExitReason, Session, TurnPipeline, TurnStages};

/// Parley - talk to a local language model and hear it answer
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to ~/.config/parley/config.toml)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// User whose conversation history is used
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored conversation history
    History {
        /// Delete the history instead of printing it
        #[arg(long)]
        clear: bool,
    },
    /// Play a test tone on the output device
    TestSpeaker,
    /// List audio devices and their indexes
    Devices,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(user) = cli.user {
        config.session.user_id = user;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::History { clear }) => show_history(&config, clear),
        Some(Command::TestSpeaker) => test_speaker(&config).await,
        Some(Command::Devices) => show_devices(),
        None => converse(config).await,
    }
}

async fn converse(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        user_id = %config.session.user_id,
        model = %config.llm.model,
        stt = ?config.stt.mode,
        "starting parley"
    );

    let store = ConversationStore::new(&config.history.dir)?;
    let capture = AudioCapture::new(config.audio.input_device)?;
    let transcriber = SpeechToText::from_config(&config.stt, &config.api_keys)?;

    let stages = TurnStages {
        model: Arc::new(OllamaClient::new(&config.llm)?),
        synthesizer: Arc::new(ApplioClient::new(&config.voice)?),
        resampler: Arc::new(WavResampler::new()),
        player: Arc::new(AudioPlayback::new(config.audio.output_device)),
    };

    let pipeline = TurnPipeline::new(&config, store, stages);
    let session = Session::new(
        pipeline,
        Arc::new(capture),
        Arc::new(transcriber),
        config.session.exit_keyword.clone(),
    );

    let summary = session.run().await;
    tracing::info!(
        reason = ?summary.reason,
        turns = summary.turns,
        played = summary.played,
        "session ended"
    );

    if !summary.saved && summary.reason == ExitReason::Keyword {
        anyhow::bail!("conversation history could not be saved");
    }
    Ok(())
}

fn show_history(config: &Config, clear: bool) -> anyhow::Result<()> {
    let store = ConversationStore::new(&config.history.dir)?;
    let user_id = &config.session.user_id;

    if clear {
        store.clear(user_id)?;
        println!("Cleared history for {user_id}");
        return Ok(());
    }

    let history = store.load(user_id);
    if history.is_empty() {
        println!("No history for {user_id}");
        return Ok(());
    }

    println!("{} ({} messages)\n", store.record_path(user_id).display(), history.len());
    for message in history.messages() {
        println!("{}: {}", message.role.as_str(), message.content);
    }
    Ok(())
}

async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new(config.audio.output_device);
    let rate = config.voice.resample_rate;
    tokio::task::spawn_blocking(move || playback.play_tone(440.0, Duration::from_secs(2), rate))
        .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

fn show_devices() -> anyhow::Result<()> {
    let (inputs, outputs) = list_devices()?;

    println!("Input devices:");
    for device in &inputs {
        println!("  [{}] {}", device.index, device.name);
    }
    println!("\nOutput devices:");
    for device in &outputs {
        println!("  [{}] {}", device.index, device.name);
    }
    Ok(())
}
