//! Remote text-generation client.
//!
//! The pipeline only depends on the [`InferenceClient`] contract; the
//! shipped implementation talks to an OpenAI-compatible chat-completions
//! endpoint with SSE streaming.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API key not configured")]
    MissingApiKey,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("stream ended without content")]
    EmptyStream,
}

/// Streaming text generation. `on_chunk` is invoked synchronously from the
/// network-read path for every text delta and must return promptly;
/// returning `false` stops the stream (cooperative cancellation, not an
/// error).
pub trait InferenceClient: Send + Sync {
    fn generate(
        &self,
        report_json: &str,
        context_json: &str,
        user_query: &str,
        on_chunk: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), RemoteError>;
}

const SYSTEM_PROMPT: &str = "You are an experienced mixing and mastering \
engineer. You receive a JSON report of an offline DSP analysis of a track, \
bus or full mix: frequency spectrum and band levels, a 1/3-octave EQ \
profile, spectral peaks and resonances, spectral features, loudness, \
dynamics, stereo image and transient behavior. Give concrete, prioritized \
mixing feedback grounded in those numbers: name the frequency ranges and dB \
values you are reacting to, suggest specific moves (EQ cuts/boosts with \
frequency and Q, compression settings, stereo adjustments), and keep the \
tone of a colleague at the console, not a textbook. If the user asked a \
specific question, answer it first.";

/// One parsed line of an SSE stream.
#[derive(Debug, PartialEq)]
pub(crate) enum StreamEvent {
    /// Not a data line, or a delta without text content.
    Ignore,
    Done,
    Delta(String),
}

pub(crate) fn parse_stream_line(line: &str) -> StreamEvent {
    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
        return StreamEvent::Ignore;
    };
    if payload.is_empty() {
        return StreamEvent::Ignore;
    }
    if payload == "[DONE]" {
        return StreamEvent::Done;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        log::debug!("unparseable stream event: {payload}");
        return StreamEvent::Ignore;
    };
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => StreamEvent::Delta(text.to_string()),
        _ => StreamEvent::Ignore,
    }
}

/// Blocking OpenAI-compatible client. One instance is shared across worker
/// threads for the life of the process.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RemoteError::MissingApiKey);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl InferenceClient for OpenAiClient {
    fn generate(
        &self,
        report_json: &str,
        context_json: &str,
        user_query: &str,
        on_chunk: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), RemoteError> {
        let mut messages = vec![
            json!({"role": "system", "content": SYSTEM_PROMPT}),
            json!({"role": "user", "content": format!("Audio analysis data:\n{report_json}")}),
        ];
        if !context_json.is_empty() {
            messages.push(json!({
                "role": "user",
                "content": format!("Track context:\n{context_json}")
            }));
        }
        if !user_query.is_empty() {
            messages.push(json!({
                "role": "user",
                "content": format!("User request: {user_query}")
            }));
        }

        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages,
        });

        log::info!("requesting mix feedback from {} ({})", self.base_url, self.model);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut received_content = false;
        let reader = BufReader::new(response);
        for line in reader.lines() {
            match parse_stream_line(&line?) {
                StreamEvent::Ignore => {}
                StreamEvent::Done => break,
                StreamEvent::Delta(text) => {
                    received_content = true;
                    if !on_chunk(&text) {
                        log::debug!("stream stopped by callback");
                        return Ok(());
                    }
                }
            }
        }

        if received_content {
            Ok(())
        } else {
            Err(RemoteError::EmptyStream)
        }
    }
}
