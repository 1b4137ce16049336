//! Voice processing module
//!
//! Handles microphone capture, transcription, Applio synthesis, resampling
//! and playback. Each piece implements one of the pipeline collaborator
//! traits.

mod audio_file;
mod capture;
mod device;
mod playback;
mod resample;
mod stt;
mod tts;
mod utterance;

pub use audio_file::{MonoAudio, read_mono, write_wav};
pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use device::{DeviceInfo, input_device, list_devices, output_device};
pub use playback::AudioPlayback;
pub use resample::{WavResampler, resample_samples};
pub use stt::SpeechToText;
pub use tts::ApplioClient;
pub use utterance::{DetectorState, UtteranceDetector};
