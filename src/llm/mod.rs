//! Language model backends

mod ollama;

pub use ollama::OllamaClient;
