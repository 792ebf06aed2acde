use std::path::PathBuf;

/// Why a REST call failed, which decides whether it is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection refused, DNS failure, reset, etc.
    Network,
    /// The per-request timeout elapsed.
    Timeout,
    /// 4xx: the request itself is wrong; never retried.
    Client,
    /// 5xx: backend outage.
    Server,
    /// Response body did not match the expected shape.
    Decode,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("api request failed ({kind:?}, status {status:?}): {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

const MAX_BODY_IN_ERROR: usize = 200;

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = if (500..600).contains(&status) {
            ApiErrorKind::Server
        } else {
            ApiErrorKind::Client
        };
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            truncate_body(body)
        };
        Self { kind, status: Some(status), message }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else if err.is_decode() {
            ApiErrorKind::Decode
        } else {
            ApiErrorKind::Network
        };
        Self { kind, status: err.status().map(|s| s.as_u16()), message: err.to_string() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self { kind: ApiErrorKind::Decode, status: None, message: message.into() }
    }

    /// Network errors, timeouts and 5xx are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network | ApiErrorKind::Timeout | ApiErrorKind::Server)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("stream endpoint returned HTTP {status}")]
    Status { status: u16 },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("stream ended by server")]
    Ended,
    #[error("gave up after {attempts} reconnect attempts")]
    MaxAttemptsExceeded { attempts: u32 },
    #[error("connection closed")]
    Closed,
}

impl StreamError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::MaxAttemptsExceeded { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid api url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}
