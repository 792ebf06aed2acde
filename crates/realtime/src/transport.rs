//! Event-stream transport: SSE framing plus the connection seam used by the
//! subscription loop.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use crate::error::StreamError;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// One dispatched EventSource message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    pub fn named(event: &str, data: impl Into<String>) -> Self {
        Self { event: Some(event.to_string()), data: data.into(), ..Default::default() }
    }

    /// Event name with the EventSource default applied.
    pub fn name(&self) -> &str {
        match self.event.as_deref() {
            Some(e) if !e.is_empty() => e,
            _ => common::DEFAULT_EVENT_NAME,
        }
    }
}

/// Incremental EventSource parser. Chunks may split lines, CRLF pairs or the
/// BOM anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    skip_lf: bool,
    bom_checked: bool,
    event: Option<String>,
    data: String,
    retry: Option<u64>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut out = Vec::new();
        for &b in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\r' => {
                    self.skip_lf = true;
                    self.end_line(&mut out);
                }
                b'\n' => self.end_line(&mut out),
                _ => {
                    self.line.push(b);
                    if !self.bom_checked {
                        if self.line.as_slice() == BOM {
                            self.line.clear();
                            self.bom_checked = true;
                        } else if !BOM.starts_with(&self.line) {
                            self.bom_checked = true;
                        }
                    }
                }
            }
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseFrame>) {
        self.bom_checked = true;
        let raw = std::mem::take(&mut self.line);
        let line = String::from_utf8_lossy(&raw);
        if line.is_empty() {
            if let Some(frame) = self.take_frame() {
                out.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.find(':') {
            Some(idx) => {
                let v = &line[idx + 1..];
                (&line[..idx], v.strip_prefix(' ').unwrap_or(v))
            }
            None => (line.as_ref(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if !value.is_empty() && value.bytes().all(|c| c.is_ascii_digit()) {
                    self.retry = value.parse().ok();
                }
            }
            other => debug!(field = %other, "ignoring unknown sse field"),
        }
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let retry = self.retry.take();
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseFrame { event, data, id: self.last_event_id.clone(), retry })
    }
}

pub type FrameStream = BoxStream<'static, Result<SseFrame, StreamError>>;

/// Opens one server-push connection. A returned stream yields frames until
/// it produces an error; `StreamError::Ended` marks a clean server close.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<FrameStream, StreamError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::Connect { url: String::new(), reason: e.to_string() })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

struct ReadState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    finished: bool,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, url: &str) -> Result<FrameStream, StreamError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| StreamError::Connect { url: url.to_string(), reason: e.to_string() })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::Status { status: status.as_u16() });
        }
        let state = ReadState {
            body: resp.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        };
        let frames = futures::stream::unfold(state, |mut st| async move {
            loop {
                if let Some(frame) = st.pending.pop_front() {
                    return Some((Ok(frame), st));
                }
                if st.finished {
                    return None;
                }
                match st.body.next().await {
                    Some(Ok(chunk)) => {
                        let frames = st.decoder.push(&chunk);
                        st.pending.extend(frames);
                    }
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((Err(StreamError::Read(e.to_string())), st));
                    }
                    None => {
                        st.finished = true;
                        return Some((Err(StreamError::Ended), st));
                    }
                }
            }
        });
        Ok(frames.boxed())
    }
}

/// An open stream. Dropping it releases the socket.
pub struct Connection {
    url: String,
    frames: Option<FrameStream>,
}

impl Connection {
    pub async fn open(transport: &dyn Transport, url: &str) -> Result<Self, StreamError> {
        let frames = transport.open(url).await?;
        Ok(Self { url: url.to_string(), frames: Some(frames) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.frames.is_some()
    }

    pub async fn next_frame(&mut self) -> Result<SseFrame, StreamError> {
        let frames = self.frames.as_mut().ok_or(StreamError::Closed)?;
        match frames.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                self.frames = None;
                Err(e)
            }
            None => {
                self.frames = None;
                Err(StreamError::Ended)
            }
        }
    }

    /// Returns false when the connection was already closed.
    pub fn close(&mut self) -> bool {
        self.frames.take().is_some()
    }
}
