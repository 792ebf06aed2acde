use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Path prefix of the per-user server-push stream; the user id is appended.
pub const STREAM_PATH_PREFIX: &str = "/api/realtime/events";
/// Control event the server emits once per connection.
pub const CONNECTED_EVENT: &str = "connected";
/// Event name the SSE framing assigns when a frame has no `event:` field.
pub const DEFAULT_EVENT_NAME: &str = "message";

// ===================== Call Records =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[serde(alias = "screened")]
    Screening,
    Blocked,
    Passed,
    #[serde(alias = "ended")]
    Completed,
}

impl CallStatus {
    /// Lifecycle rank: screening → {blocked | passed} → completed.
    pub fn rank(self) -> u8 {
        match self {
            CallStatus::Screening => 0,
            CallStatus::Blocked | CallStatus::Passed => 1,
            CallStatus::Completed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        next == self || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Screening => "screening",
            CallStatus::Blocked => "blocked",
            CallStatus::Passed => "passed",
            CallStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screening" | "screened" => Ok(CallStatus::Screening),
            "blocked" => Ok(CallStatus::Blocked),
            "passed" => Ok(CallStatus::Passed),
            "completed" | "ended" => Ok(CallStatus::Completed),
            other => Err(format!("unknown call status `{other}`")),
        }
    }
}

fn default_intent() -> String {
    "unknown".to_string()
}

fn default_status() -> CallStatus {
    CallStatus::Screening
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub caller_number: String,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default = "default_intent")]
    pub intent: String,
    #[serde(default)]
    pub scam_score: f64,
    #[serde(default = "default_status", alias = "outcome", alias = "action")]
    pub status: CallStatus,
    /// Seconds; zero while the call is still in progress.
    #[serde(default, alias = "duration_seconds")]
    pub duration: u64,
    #[serde(default, alias = "timestamp")]
    pub created_at: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CallRecord {
    /// A freshly announced call that the backend is still screening.
    pub fn screening(id: impl Into<String>, caller_number: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            caller_number: caller_number.into(),
            caller_name: None,
            intent: default_intent(),
            scam_score: 0.0,
            status: CallStatus::Screening,
            duration: 0,
            created_at: created_at.into(),
            summary: None,
            transcript: None,
            reason: None,
        }
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created_at)
    }
}

// ===================== Aggregate Statistics =====================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    #[default]
    Idle,
    Active,
    Blocked,
    Emergency,
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemStatus::Idle => "idle",
            SystemStatus::Active => "active",
            SystemStatus::Blocked => "blocked",
            SystemStatus::Emergency => "emergency",
        };
        f.write_str(s)
    }
}

/// Dashboard totals. Missing fields deserialize to zero/idle so a partial
/// backend response still yields a renderable snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStats {
    pub total_calls: u64,
    pub scams_blocked: u64,
    pub time_saved_minutes: f64,
    pub today_calls: u64,
    pub current_status: SystemStatus,
    pub block_rate: f64,
    pub avg_call_duration: f64,
}

impl AggregateStats {
    pub fn is_consistent(&self) -> bool {
        self.scams_blocked <= self.total_calls
    }

    pub fn recompute_block_rate(&mut self) {
        self.block_rate = if self.total_calls == 0 {
            0.0
        } else {
            self.scams_blocked as f64 / self.total_calls as f64
        };
    }

    /// Count one blocked call. Both counters move together so the
    /// blocked <= total invariant survives.
    pub fn record_block(&mut self) {
        self.total_calls = self.total_calls.saturating_add(1);
        self.scams_blocked = self.scams_blocked.saturating_add(1);
        self.recompute_block_rate();
    }

    /// Shallow merge, last write wins per field. The merge is rejected as a
    /// whole when the result would break blocked <= total.
    pub fn apply_patch(&mut self, patch: &AggregateStatsPatch) -> Result<(), String> {
        let mut next = self.clone();
        if let Some(v) = patch.total_calls {
            next.total_calls = v;
        }
        if let Some(v) = patch.scams_blocked {
            next.scams_blocked = v;
        }
        if let Some(v) = patch.time_saved_minutes {
            next.time_saved_minutes = v;
        }
        if let Some(v) = patch.today_calls {
            next.today_calls = v;
        }
        if let Some(v) = patch.current_status {
            next.current_status = v;
        }
        match patch.block_rate {
            Some(v) => next.block_rate = v,
            None if patch.total_calls.is_some() || patch.scams_blocked.is_some() => next.recompute_block_rate(),
            None => {}
        }
        if let Some(v) = patch.avg_call_duration {
            next.avg_call_duration = v;
        }
        if !next.is_consistent() {
            return Err(format!(
                "scams_blocked ({}) would exceed total_calls ({})",
                next.scams_blocked, next.total_calls
            ));
        }
        *self = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStatsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_calls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scams_blocked: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_saved_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_calls: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<SystemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_call_duration: Option<f64>,
}

impl AggregateStatsPatch {
    pub fn is_empty(&self) -> bool {
        *self == AggregateStatsPatch::default()
    }
}

// ===================== Stream Events =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    CallCreated,
    CallUpdated,
    ScamBlocked,
    ToolExecuted,
    AnalyticsUpdated,
    AiThinking,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::CallCreated,
        EventKind::CallUpdated,
        EventKind::ScamBlocked,
        EventKind::ToolExecuted,
        EventKind::AnalyticsUpdated,
        EventKind::AiThinking,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CallCreated => "call_created",
            EventKind::CallUpdated => "call_updated",
            EventKind::ScamBlocked => "scam_blocked",
            EventKind::ToolExecuted => "tool_executed",
            EventKind::AnalyticsUpdated => "analytics_updated",
            EventKind::AiThinking => "ai_thinking",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EventError::UnknownTag(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCreated {
    pub call_id: String,
    pub caller_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Partial CallRecord fields carried by `call_updated`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scam_score: Option<f64>,
    #[serde(alias = "outcome", alias = "action", skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(alias = "duration_seconds", skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallUpdated {
    #[serde(default, alias = "call_sid", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_number: Option<String>,
    #[serde(default)]
    pub updates: CallUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScamBlocked {
    #[serde(alias = "call_id")]
    pub call_sid: String,
    pub confidence: f64,
    pub scam_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecuted {
    pub tool: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiThinking {
    pub agent: String,
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    CallCreated(CallCreated),
    CallUpdated(CallUpdated),
    ScamBlocked(ScamBlocked),
    ToolExecuted(ToolExecuted),
    AnalyticsUpdated(AggregateStatsPatch),
    AiThinking(AiThinking),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::CallCreated(_) => EventKind::CallCreated,
            EventPayload::CallUpdated(_) => EventKind::CallUpdated,
            EventPayload::ScamBlocked(_) => EventKind::ScamBlocked,
            EventPayload::ToolExecuted(_) => EventKind::ToolExecuted,
            EventPayload::AnalyticsUpdated(_) => EventKind::AnalyticsUpdated,
            EventPayload::AiThinking(_) => EventKind::AiThinking,
        }
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            EventPayload::CallCreated(p) => serde_json::to_value(p),
            EventPayload::CallUpdated(p) => serde_json::to_value(p),
            EventPayload::ScamBlocked(p) => serde_json::to_value(p),
            EventPayload::ToolExecuted(p) => serde_json::to_value(p),
            EventPayload::AnalyticsUpdated(p) => serde_json::to_value(p),
            EventPayload::AiThinking(p) => serde_json::to_value(p),
        }
    }

    fn from_value(kind: EventKind, value: serde_json::Value) -> Result<Self, EventError> {
        let malformed = |source| EventError::Malformed { kind: kind.as_str().to_string(), source };
        let payload = match kind {
            EventKind::CallCreated => EventPayload::CallCreated(serde_json::from_value(value).map_err(malformed)?),
            EventKind::CallUpdated => EventPayload::CallUpdated(serde_json::from_value(value).map_err(malformed)?),
            EventKind::ScamBlocked => EventPayload::ScamBlocked(serde_json::from_value(value).map_err(malformed)?),
            EventKind::ToolExecuted => EventPayload::ToolExecuted(serde_json::from_value(value).map_err(malformed)?),
            EventKind::AnalyticsUpdated => {
                EventPayload::AnalyticsUpdated(serde_json::from_value(value).map_err(malformed)?)
            }
            EventKind::AiThinking => EventPayload::AiThinking(serde_json::from_value(value).map_err(malformed)?),
        };
        Ok(payload)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), EventError> {
        let invalid = |reason: &str| EventError::Invalid { kind: self.kind(), reason: reason.to_string() };
        match self {
            EventPayload::CallCreated(p) => {
                if p.call_id.trim().is_empty() {
                    return Err(invalid("empty call_id"));
                }
                if p.caller_number.trim().is_empty() {
                    return Err(invalid("empty caller_number"));
                }
            }
            EventPayload::CallUpdated(p) => {
                let has_id = p.call_id.as_deref().is_some_and(|s| !s.trim().is_empty());
                let has_number = p.caller_number.as_deref().is_some_and(|s| !s.trim().is_empty());
                if !has_id && !has_number {
                    return Err(invalid("neither call_id nor caller_number present"));
                }
                if let Some(score) = p.updates.scam_score {
                    if !is_unit_interval(score) {
                        return Err(invalid("scam_score outside [0, 1]"));
                    }
                }
            }
            EventPayload::ScamBlocked(p) => {
                if p.call_sid.trim().is_empty() {
                    return Err(invalid("empty call_sid"));
                }
                if !is_unit_interval(p.confidence) {
                    return Err(invalid("confidence outside [0, 1]"));
                }
            }
            EventPayload::ToolExecuted(p) => {
                if p.tool.trim().is_empty() {
                    return Err(invalid("empty tool name"));
                }
            }
            EventPayload::AnalyticsUpdated(p) => {
                let floats = [p.time_saved_minutes, p.block_rate, p.avg_call_duration];
                if floats.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(invalid("negative or non-finite statistic"));
                }
            }
            EventPayload::AiThinking(p) => {
                if p.agent.trim().is_empty() {
                    return Err(invalid("empty agent name"));
                }
            }
        }
        Ok(())
    }
}

fn is_unit_interval(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

/// A decoded and validated server-push message.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub payload: EventPayload,
    /// As sent by the server; see [`parse_timestamp`].
    pub timestamp: String,
}

impl StreamEvent {
    pub fn new(payload: EventPayload, timestamp: impl Into<String>) -> Self {
        Self { payload, timestamp: timestamp.into() }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("unrecognized event tag `{0}`")]
    UnknownTag(String),
    #[error("malformed `{kind}` payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid `{kind}` event: {reason}")]
    Invalid { kind: EventKind, reason: String },
    #[error("frame event `{frame}` does not match envelope type `{envelope}`")]
    TagMismatch { frame: String, envelope: String },
    #[error("event frame carries no type")]
    MissingTag,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

/// Decode one SSE frame body into a typed event.
///
/// `frame_event` is the frame's `event:` field, if any. The envelope's `type`
/// decides the tag when the frame has no name of its own; when both are
/// present they must agree.
pub fn decode_event(frame_event: Option<&str>, data: &str) -> Result<StreamEvent, EventError> {
    let frame_tag = frame_event.filter(|e| !e.is_empty() && *e != DEFAULT_EVENT_NAME);
    let envelope: Envelope = serde_json::from_str(data).map_err(|source| EventError::Malformed {
        kind: frame_tag.unwrap_or(DEFAULT_EVENT_NAME).to_string(),
        source,
    })?;

    let tag = match (frame_tag, envelope.kind.as_deref()) {
        (Some(frame), Some(env)) if frame != env => {
            return Err(EventError::TagMismatch { frame: frame.to_string(), envelope: env.to_string() })
        }
        (Some(frame), _) => frame,
        (None, Some(env)) => env,
        (None, None) => return Err(EventError::MissingTag),
    };
    let kind: EventKind = tag.parse()?;
    let payload = EventPayload::from_value(kind, envelope.data)?;
    payload.validate()?;

    let timestamp = envelope.timestamp.unwrap_or_else(now_iso8601);
    Ok(StreamEvent { payload, timestamp })
}

/// Encode an event in the envelope shape the server emits on the wire.
pub fn encode_event(event: &StreamEvent) -> serde_json::Result<String> {
    let envelope = Envelope {
        kind: Some(event.kind().as_str().to_string()),
        data: event.payload.to_value()?,
        timestamp: Some(event.timestamp.clone()),
    };
    serde_json::to_string(&envelope)
}

// ===================== REST Payloads =====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeUpdate {
    pub outcome: CallStatus,
}

fn default_caller() -> String {
    "Unknown".to_string()
}

/// Body of the call-logging endpoint used to persist a finished voice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogRequest {
    #[serde(default = "default_caller")]
    pub caller_number: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub scam_score: f64,
    #[serde(default = "default_intent")]
    pub intent: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogResponse {
    #[serde(default)]
    pub success: bool,
    pub call_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeHealth {
    pub status: String,
    #[serde(default)]
    pub active_connections: u64,
    #[serde(default)]
    pub active_users: u64,
}

// ===================== Helpers =====================

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO-8601 one taken as UTC
/// (the backend emits `datetime.utcnow().isoformat()`).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
