//! HTTP collaborator tests against mock servers

use std::path::PathBuf;
use std::time::Duration;

use parley::config::{ApiKeys, LlmConfig, SttConfig, TranscriptionMode, VoiceConfig};
use parley::llm::OllamaClient;
use parley::pipeline::{LanguageModel, RawUtterance, Synthesizer, Transcriber};
use parley::voice::{ApplioClient, SpeechToText};
use parley::{Error, Message};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

fn llm_config(url: &str) -> LlmConfig {
    LlmConfig {
        url: url.to_string(),
        model: "llama3".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn utterance() -> RawUtterance {
    RawUtterance {
        samples: vec![0.1; 1600],
        sample_rate: 16_000,
    }
}

#[tokio::test]
async fn test_ollama_chat_returns_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "Hello!"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&llm_config(&server.uri())).unwrap();
    let reply = client.generate(&[Message::user("hi")]).await.unwrap();

    assert_eq!(reply, "Hello!");
}

#[tokio::test]
async fn test_ollama_error_status_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&llm_config(&server.uri())).unwrap();
    let err = client.generate(&[Message::user("hi")]).await.unwrap_err();

    assert!(matches!(err, Error::Generation(ref msg) if msg.contains("model not found")));
}

#[tokio::test]
async fn test_ollama_malformed_body_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&llm_config(&server.uri())).unwrap();
    assert!(matches!(
        client.generate(&[Message::user("hi")]).await,
        Err(Error::Generation(_))
    ));
}

#[tokio::test]
async fn test_ollama_timeout_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": {"role": "assistant", "content": "late"}}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut config = llm_config(&server.uri());
    config.timeout = Duration::from_millis(100);
    let client = OllamaClient::new(&config).unwrap();

    assert!(matches!(
        client.generate(&[Message::user("hi")]).await,
        Err(Error::Generation(_))
    ));
}

fn voice_config(dir: &std::path::Path, applio_url: &str) -> VoiceConfig {
    VoiceConfig {
        tts_voice: "en-US-AriaNeural".to_string(),
        applio_url: applio_url.to_string(),
        pth_path: None,
        index_path: None,
        tts_output_path: dir.join("tts_output.wav"),
        rvc_output_path: dir.join("rvc_output.wav"),
        resample_rate: 44_100,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_applio_returns_converted_path() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/call/run_tts_script"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "evt42"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/call/run_tts_script/evt42"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "event: complete\ndata: [\"Text synthesized successfully.\", \"/tmp/rvc_output.wav\"]\n\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let voice = voice_config(dir.path(), &server.uri());
    let client = ApplioClient::new(&voice).unwrap();
    let artifact = client
        .synthesize(
            "Hello there",
            &voice,
            &voice.tts_output_path,
            &voice.rvc_output_path,
        )
        .await
        .unwrap();

    assert_eq!(artifact, dir.path().join("rvc_output.wav"));
}

#[tokio::test]
async fn test_applio_error_event_is_synthesis_error() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/call/run_tts_script"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "evt1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/call/run_tts_script/evt1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("event: error\ndata: null\n\n"))
        .mount(&server)
        .await;

    let voice = voice_config(dir.path(), &server.uri());
    let result = ApplioClient::new(&voice)
        .unwrap()
        .synthesize("hi", &voice, &voice.tts_output_path, &voice.rvc_output_path)
        .await;

    assert!(matches!(result, Err(Error::Synthesis(_))));
}

#[tokio::test]
async fn test_applio_unreachable_is_synthesis_error() {
    let dir = tempfile::tempdir().unwrap();
    let voice = voice_config(dir.path(), "http://127.0.0.1:9");
    let result = ApplioClient::new(&voice)
        .unwrap()
        .synthesize("hi", &voice, &voice.tts_output_path, &voice.rvc_output_path)
        .await;

    assert!(matches!(result, Err(Error::Synthesis(_))));
}

#[tokio::test]
async fn test_applio_stalled_stream_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/call/run_tts_script"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "slow"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/call/run_tts_script/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("event: complete\ndata: [\"late\"]\n\n")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut voice = voice_config(dir.path(), &server.uri());
    voice.timeout = Duration::from_millis(200);
    let started = std::time::Instant::now();
    let result = ApplioClient::new(&voice)
        .unwrap()
        .synthesize("hi", &voice, &voice.tts_output_path, &voice.rvc_output_path)
        .await;

    assert!(matches!(result, Err(Error::Synthesis(_))));
    assert!(started.elapsed() < Duration::from_secs(3));
}

fn stt_config(mode: TranscriptionMode, url: &str) -> SttConfig {
    SttConfig {
        mode,
        model: mode.default_model().to_string(),
        url: url.to_string(),
    }
}

#[tokio::test]
async fn test_local_whisper_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": " hello world \n"})))
        .expect(1)
        .mount(&server)
        .await;

    let stt = SpeechToText::from_config(
        &stt_config(TranscriptionMode::Local, &server.uri()),
        &ApiKeys::default(),
    )
    .unwrap();

    assert_eq!(stt.transcribe(&utterance()).await.unwrap(), "hello world");
}

#[tokio::test]
async fn test_openai_whisper_sends_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "Exit."})))
        .expect(1)
        .mount(&server)
        .await;

    let keys = ApiKeys {
        openai: Some("sk-test".to_string()),
        deepgram: None,
    };
    let stt = SpeechToText::from_config(&stt_config(TranscriptionMode::Whisper, ""), &keys)
        .unwrap()
        .with_base_url(server.uri());

    assert_eq!(stt.transcribe(&utterance()).await.unwrap(), "Exit.");
}

#[tokio::test]
async fn test_deepgram_transcription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/listen"))
        .and(query_param("model", "nova-2"))
        .and(header("authorization", "Token dg-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"channels": [{"alternatives": [{"transcript": "good morning"}]}]}
        })))
        .mount(&server)
        .await;

    let keys = ApiKeys {
        openai: None,
        deepgram: Some("dg-test".to_string()),
    };
    let stt = SpeechToText::from_config(&stt_config(TranscriptionMode::Deepgram, ""), &keys)
        .unwrap()
        .with_base_url(server.uri());

    assert_eq!(stt.transcribe(&utterance()).await.unwrap(), "good morning");
}

#[tokio::test]
async fn test_transcription_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let stt = SpeechToText::from_config(
        &stt_config(TranscriptionMode::Local, &server.uri()),
        &ApiKeys::default(),
    )
    .unwrap();

    assert!(matches!(
        stt.transcribe(&utterance()).await,
        Err(Error::Transcription(_))
    ));
}

#[test]
fn test_artifact_paths_default_under_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path(), 20);
    assert_eq!(
        config.voice.rvc_output_path,
        PathBuf::from(dir.path()).join("audio").join("rvc_output.wav")
    );
}
