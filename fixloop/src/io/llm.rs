//! Language-model backend used by the generator.
//!
//! [`ChatModel`] is the seam: one system instruction plus one user message in,
//! free text out. [`OpenAiCompatClient`] speaks the OpenAI chat completions
//! protocol, which Groq, OpenAI, vLLM and Ollama all serve.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::config::ModelConfig;

/// One request to the model: a fixed instruction and the task-specific message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

/// Abstraction over text-generation backends.
pub trait ChatModel {
    /// Send the request and return the raw response text.
    ///
    /// Failures are infrastructure errors: callers do not retry them.
    fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// Classification of a failed model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Connection, DNS, TLS or HTTP timeout failure.
    Network,
    /// The backend rejected the credentials (401/403).
    Auth,
    /// The backend asked us to slow down (429).
    RateLimited,
    /// Any other non-success HTTP status.
    Api,
    /// The response body did not contain a completion.
    Malformed,
}

impl ModelErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelErrorKind::Network => "network",
            ModelErrorKind::Auth => "auth",
            ModelErrorKind::RateLimited => "rate_limited",
            ModelErrorKind::Api => "api",
            ModelErrorKind::Malformed => "malformed_response",
        }
    }
}

/// A model request that failed. Aborts the run; callers may `downcast_ref` to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequestError {
    pub kind: ModelErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ModelRequestError {
    fn new(kind: ModelErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for ModelRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model request failed ({})", self.kind.as_str())?;
        if let Some(status) = self.status {
            write!(f, " with status {status}")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ModelRequestError {}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for OpenAiCompatClient {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        debug!(endpoint = %self.endpoint, "sending chat completion request");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ModelRequestError::new(ModelErrorKind::Network, None, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ModelRequestError::new(ModelErrorKind::Network, None, e.to_string()))?;

        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), kind = err.kind.as_str(), "model request rejected");
            return Err(err.into());
        }

        let content = parse_completion(&text)?;
        debug!(bytes = content.len(), "received completion");
        Ok(content)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

/// Extract the first choice's message content from a chat completions response body.
fn parse_completion(body: &str) -> Result<String, ModelRequestError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        ModelRequestError::new(ModelErrorKind::Malformed, None, format!("parse response: {e}"))
    })?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        ModelRequestError::new(ModelErrorKind::Malformed, None, "no choices in response")
    })?;
    choice.message.content.ok_or_else(|| {
        ModelRequestError::new(ModelErrorKind::Malformed, None, "choice has no content")
    })
}

fn classify_status(status: StatusCode, body: &str) -> ModelRequestError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => ModelErrorKind::RateLimited,
        _ => ModelErrorKind::Api,
    };
    ModelRequestError::new(kind, Some(status.as_u16()), body.trim())
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;

    /// Serve one canned HTTP response on localhost and hand back the raw request.
    fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base_url = format!("http://{}/v1", listener.local_addr().expect("addr"));
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content length");
                    }
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("read body");
            reader
                .get_mut()
                .write_all(response.as_bytes())
                .expect("write response");
            head + &String::from_utf8_lossy(&body)
        });
        (base_url, handle)
    }

    fn client_for(base_url: &str) -> OpenAiCompatClient {
        let config = ModelConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 10,
            ..ModelConfig::default()
        };
        OpenAiCompatClient::new(&config, "test-key".to_string()).expect("client")
    }

    fn request() -> ChatRequest {
        ChatRequest {
            system: "write python".to_string(),
            user: "print 1".to_string(),
        }
    }

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "print(1)"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "print(2)"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }"#;
        assert_eq!(parse_completion(body).expect("parse"), "print(1)");
    }

    #[test]
    fn empty_choices_are_malformed() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Malformed);
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn null_content_is_malformed() {
        let err =
            parse_completion(r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#)
                .unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Malformed);
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_completion("<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind, ModelErrorKind::Malformed);
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "").kind,
            ModelErrorKind::Auth
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "").kind,
            ModelErrorKind::Auth
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "").kind,
            ModelErrorKind::RateLimited
        );
        let err = classify_status(StatusCode::BAD_GATEWAY, " upstream down \n");
        assert_eq!(err.kind, ModelErrorKind::Api);
        assert_eq!(err.status, Some(502));
        assert_eq!(
            err.to_string(),
            "model request failed (api) with status 502: upstream down"
        );
    }

    #[test]
    fn request_body_matches_wire_format() {
        let body = ChatCompletionRequest {
            model: "llama-3.3-70b-versatile",
            temperature: 0.0,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: "sys",
                },
                WireMessage {
                    role: "user",
                    content: "usr",
                },
            ],
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["model"], "llama-3.3-70b-versatile");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
    }

    #[test]
    fn client_builds_endpoint_from_base_url() {
        let config = ModelConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            ..ModelConfig::default()
        };
        let client = OpenAiCompatClient::new(&config, "key".to_string()).expect("client");
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn model_errors_survive_anyhow_context() {
        let err: anyhow::Error =
            ModelRequestError::new(ModelErrorKind::RateLimited, Some(429), "slow down").into();
        let err = err.context("generate attempt 2");
        let inner = err
            .downcast_ref::<ModelRequestError>()
            .expect("downcast through context");
        assert_eq!(inner.kind, ModelErrorKind::RateLimited);
    }

    #[test]
    fn posts_chat_completion_with_bearer_key() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"choices": [{"message": {"role": "assistant", "content": "print(1)"}}]}"#,
        );

        let content = client_for(&base_url).complete(&request()).expect("complete");
        let raw = server.join().expect("server thread");

        assert_eq!(content, "print(1)");
        assert!(raw.starts_with("POST /v1/chat/completions HTTP/1.1\r\n"), "{raw}");
        assert!(
            raw.to_ascii_lowercase().contains("authorization: bearer test-key\r\n"),
            "{raw}"
        );
        assert!(raw.contains(r#""content":"print 1""#), "{raw}");
        assert!(raw.contains(r#""role":"system""#), "{raw}");
    }

    #[test]
    fn error_status_becomes_model_request_error() {
        let (base_url, server) = serve_once("429 Too Many Requests", r#"{"error": "slow down"}"#);

        let err = client_for(&base_url).complete(&request()).unwrap_err();
        server.join().expect("server thread");

        let err = err
            .downcast_ref::<ModelRequestError>()
            .expect("typed model error");
        assert_eq!(err.kind, ModelErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("slow down"));
    }

    #[test]
    fn success_without_completion_is_malformed() {
        let (base_url, server) = serve_once("200 OK", r#"{"choices": []}"#);

        let err = client_for(&base_url).complete(&request()).unwrap_err();
        server.join().expect("server thread");

        let err = err
            .downcast_ref::<ModelRequestError>()
            .expect("typed model error");
        assert_eq!(err.kind, ModelErrorKind::Malformed);
    }

    #[test]
    fn unreachable_endpoint_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base_url = format!("http://{}/v1", listener.local_addr().expect("addr"));
        drop(listener);

        let err = client_for(&base_url).complete(&request()).unwrap_err();

        let err = err
            .downcast_ref::<ModelRequestError>()
            .expect("typed model error");
        assert_eq!(err.kind, ModelErrorKind::Network);
        assert_eq!(err.status, None);
    }
}
