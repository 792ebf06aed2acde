use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use common::{
    AggregateStats, AiThinking, CallCreated, CallRecord, CallStatus, CallUpdated, EventPayload, ScamBlocked,
    StreamEvent, ToolExecuted,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_ACTIVITY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Tool,
    Thought,
}

/// Side-channel entry from `tool_executed` / `ai_thinking`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    /// Tool or agent name.
    pub source: String,
    pub text: String,
    pub detail: Option<serde_json::Value>,
    pub timestamp: String,
}

impl ActivityEntry {
    fn from_tool(p: &ToolExecuted, timestamp: &str) -> Self {
        let text = match &p.result {
            serde_json::Value::Null => format!("{} executed", p.tool),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            kind: ActivityKind::Tool,
            source: p.tool.clone(),
            text,
            detail: Some(p.result.clone()).filter(|v| !v.is_null()),
            timestamp: timestamp.to_string(),
        }
    }

    fn from_thought(p: &AiThinking, timestamp: &str) -> Self {
        Self {
            kind: ActivityKind::Thought,
            source: p.agent.clone(),
            text: p.thought.clone(),
            detail: p.data.clone(),
            timestamp: timestamp.to_string(),
        }
    }
}

/// Immutable view handed to renderers. Calls and activity are newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    pub calls: Vec<CallRecord>,
    pub stats: AggregateStats,
    pub activity: VecDeque<ActivityEntry>,
    /// Bumped on every applied change.
    pub version: u64,
}

impl DashboardState {
    pub fn call(&self, id: &str) -> Option<&CallRecord> {
        self.calls.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Inserted,
    /// `call_created` for an id we already hold.
    Duplicate,
    Updated { completed: bool },
    /// Matched a record but nothing changed.
    Unchanged,
    UnknownCall,
    Blocked { known: bool },
    AlreadyBlocked,
    StatsMerged,
    Rejected(String),
    Logged,
}

impl Reconciled {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Reconciled::Inserted
                | Reconciled::Updated { .. }
                | Reconciled::Blocked { .. }
                | Reconciled::StatsMerged
                | Reconciled::Logged
        )
    }
}

/// Sole owner of the call list and aggregate stats. Every change produces a
/// fresh `Arc<DashboardState>`; earlier snapshots are never mutated.
pub struct Reconciler {
    state: Arc<DashboardState>,
    activity_cap: usize,
    publisher: Option<watch::Sender<Arc<DashboardState>>>,
    counted_blocks: HashSet<String>,
}

impl Reconciler {
    pub fn new(activity_cap: usize) -> Self {
        Self {
            state: Arc::new(DashboardState::default()),
            activity_cap,
            publisher: None,
            counted_blocks: HashSet::new(),
        }
    }

    pub fn with_publisher(activity_cap: usize, publisher: watch::Sender<Arc<DashboardState>>) -> Self {
        let state = publisher.borrow().clone();
        let counted_blocks = blocked_ids(&state.calls);
        Self { state, activity_cap, publisher: Some(publisher), counted_blocks }
    }

    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.state.clone()
    }

    /// Replace stats and calls wholesale from a REST snapshot. Activity
    /// survives; duplicate ids keep their first (newest) occurrence.
    pub fn seed(&mut self, stats: AggregateStats, calls: Vec<CallRecord>) {
        let mut seen = HashSet::new();
        let calls: Vec<CallRecord> = calls.into_iter().filter(|c| seen.insert(c.id.clone())).collect();
        info!(calls = calls.len(), total = stats.total_calls, blocked = stats.scams_blocked, "seeded dashboard state");
        self.counted_blocks = blocked_ids(&calls);
        let state = Arc::make_mut(&mut self.state);
        state.stats = stats;
        state.calls = calls;
        self.commit();
    }

    pub fn replace_stats(&mut self, stats: AggregateStats) {
        if self.state.stats == stats {
            return;
        }
        Arc::make_mut(&mut self.state).stats = stats;
        self.commit();
    }

    pub fn clear_activity(&mut self) {
        if self.state.activity.is_empty() {
            return;
        }
        Arc::make_mut(&mut self.state).activity.clear();
        self.commit();
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Reconciled {
        let outcome = match &event.payload {
            EventPayload::CallCreated(p) => self.call_created(p, &event.timestamp),
            EventPayload::CallUpdated(p) => self.call_updated(p),
            EventPayload::ScamBlocked(p) => self.scam_blocked(p),
            EventPayload::AnalyticsUpdated(patch) => {
                if patch.is_empty() {
                    Reconciled::Unchanged
                } else {
                    let mut stats = self.state.stats.clone();
                    match stats.apply_patch(patch) {
                        Ok(()) => {
                            Arc::make_mut(&mut self.state).stats = stats;
                            Reconciled::StatsMerged
                        }
                        Err(reason) => {
                            warn!(%reason, "rejecting analytics update");
                            Reconciled::Rejected(reason)
                        }
                    }
                }
            }
            EventPayload::ToolExecuted(p) => self.log_activity(ActivityEntry::from_tool(p, &event.timestamp)),
            EventPayload::AiThinking(p) => self.log_activity(ActivityEntry::from_thought(p, &event.timestamp)),
        };
        if outcome.changed() {
            self.commit();
        }
        outcome
    }

    fn call_created(&mut self, p: &CallCreated, timestamp: &str) -> Reconciled {
        if self.state.call(&p.call_id).is_some() {
            debug!(call = %p.call_id, "duplicate call_created");
            return Reconciled::Duplicate;
        }
        let created_at = p.timestamp.as_deref().unwrap_or(timestamp);
        let record = CallRecord::screening(&p.call_id, &p.caller_number, created_at);
        Arc::make_mut(&mut self.state).calls.insert(0, record);
        Reconciled::Inserted
    }

    fn call_updated(&mut self, p: &CallUpdated) -> Reconciled {
        let by_id = p.call_id.as_deref().and_then(|id| self.state.calls.iter().position(|c| c.id == id));
        let number = p.caller_number.as_deref();
        let idx = by_id.or_else(|| number.and_then(|n| self.state.calls.iter().position(|c| c.caller_number == n)));
        let Some(idx) = idx else {
            debug!(call = ?p.call_id, caller = ?number, "call_updated for unknown call");
            return Reconciled::UnknownCall;
        };

        let current = &self.state.calls[idx];
        let mut next = current.clone();
        let u = &p.updates;
        if let Some(v) = &u.caller_number {
            next.caller_number = v.clone();
        }
        if u.caller_name.is_some() {
            next.caller_name = u.caller_name.clone();
        }
        if let Some(v) = &u.intent {
            next.intent = v.clone();
        }
        if let Some(v) = u.scam_score {
            next.scam_score = v;
        }
        if let Some(status) = u.status {
            if current.status.can_transition_to(status) {
                next.status = status;
            } else {
                debug!(call = %current.id, from = %current.status, to = %status, "ignoring status regression");
            }
        }
        if let Some(v) = u.duration {
            next.duration = v;
        }
        if u.summary.is_some() {
            next.summary = u.summary.clone();
        }
        if u.transcript.is_some() {
            next.transcript = u.transcript.clone();
        }
        if u.reason.is_some() {
            next.reason = u.reason.clone();
        }

        if next == *current {
            return Reconciled::Unchanged;
        }
        let completed = current.status != CallStatus::Completed && next.status == CallStatus::Completed;
        Arc::make_mut(&mut self.state).calls[idx] = next;
        Reconciled::Updated { completed }
    }

    /// Counts each call id at most once. A record that reached `blocked`
    /// through `call_updated` still gets counted and annotated here.
    fn scam_blocked(&mut self, p: &ScamBlocked) -> Reconciled {
        let idx = self.state.calls.iter().position(|c| c.id == p.call_sid);
        if self.counted_blocks.contains(&p.call_sid) {
            debug!(call = %p.call_sid, "repeated scam_blocked");
            return Reconciled::AlreadyBlocked;
        }
        self.counted_blocks.insert(p.call_sid.clone());
        info!(call = %p.call_sid, scam_type = %p.scam_type, confidence = p.confidence, "scam blocked");
        let state = Arc::make_mut(&mut self.state);
        if let Some(i) = idx {
            let record = &mut state.calls[i];
            record.status = CallStatus::Blocked;
            record.scam_score = p.confidence;
            record.intent = "scam".to_string();
            record.summary = Some(format!("{} scam blocked", p.scam_type));
        }
        state.stats.record_block();
        Reconciled::Blocked { known: idx.is_some() }
    }

    fn log_activity(&mut self, entry: ActivityEntry) -> Reconciled {
        if self.activity_cap == 0 {
            return Reconciled::Unchanged;
        }
        let activity = &mut Arc::make_mut(&mut self.state).activity;
        activity.push_front(entry);
        activity.truncate(self.activity_cap);
        Reconciled::Logged
    }

    fn commit(&mut self) {
        Arc::make_mut(&mut self.state).version += 1;
        if let Some(tx) = &self.publisher {
            tx.send_replace(self.state.clone());
        }
    }
}

fn blocked_ids(calls: &[CallRecord]) -> HashSet<String> {
    calls.iter().filter(|c| c.status == CallStatus::Blocked).map(|c| c.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{decode_event, AggregateStatsPatch, CallUpdate};

    fn ev(payload: EventPayload) -> StreamEvent {
        StreamEvent::new(payload, "2025-01-01T12:00:00")
    }

    fn created(id: &str, number: &str) -> StreamEvent {
        ev(EventPayload::CallCreated(CallCreated {
            call_id: id.into(),
            caller_number: number.into(),
            status: None,
            timestamp: None,
        }))
    }

    fn blocked(id: &str, confidence: f64) -> StreamEvent {
        ev(EventPayload::ScamBlocked(ScamBlocked {
            call_sid: id.into(),
            confidence,
            scam_type: "IRS impersonation".into(),
        }))
    }

    fn updated(id: Option<&str>, number: Option<&str>, updates: CallUpdate) -> StreamEvent {
        ev(EventPayload::CallUpdated(CallUpdated {
            call_id: id.map(Into::into),
            caller_number: number.map(Into::into),
            updates,
        }))
    }

    #[test]
    fn distinct_creates_are_newest_first() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        for i in 0..5 {
            assert_eq!(r.apply(&created(&format!("c{i}"), "+1")), Reconciled::Inserted);
        }
        let ids: Vec<_> = r.snapshot().calls.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["c4", "c3", "c2", "c1", "c0"]);
        assert!(r.snapshot().calls.iter().all(|c| c.status == CallStatus::Screening));
    }

    #[test]
    fn duplicate_create_is_idempotent() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        let before = r.snapshot();
        assert_eq!(r.apply(&created("c1", "+1")), Reconciled::Duplicate);
        assert_eq!(r.snapshot().calls.len(), 1);
        assert!(Arc::ptr_eq(&before, &r.snapshot()));
    }

    #[test]
    fn blocked_scenario() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.seed(AggregateStats { total_calls: 5, scams_blocked: 2, ..Default::default() }, vec![]);
        r.apply(&created("c1", "+15551234567"));
        assert_eq!(r.apply(&blocked("c1", 0.95)), Reconciled::Blocked { known: true });

        let s = r.snapshot();
        let c1 = s.call("c1").unwrap();
        assert_eq!(c1.status, CallStatus::Blocked);
        assert_eq!(c1.scam_score, 0.95);
        assert_eq!(c1.summary.as_deref(), Some("IRS impersonation scam blocked"));
        assert_eq!(s.stats.scams_blocked, 3);
        assert_eq!(s.stats.total_calls, 6);
        assert!(s.stats.is_consistent());
    }

    #[test]
    fn repeated_block_counts_once() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        r.apply(&blocked("c1", 0.9));
        assert_eq!(r.apply(&blocked("c1", 0.9)), Reconciled::AlreadyBlocked);
        assert_eq!(r.snapshot().stats.scams_blocked, 1);
    }

    #[test]
    fn block_after_blocked_status_update_still_counts() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.seed(AggregateStats { total_calls: 5, scams_blocked: 2, ..Default::default() }, vec![]);
        r.apply(&created("c1", "+1"));
        let marked = CallUpdate { status: Some(CallStatus::Blocked), ..Default::default() };
        r.apply(&updated(Some("c1"), None, marked));

        assert_eq!(r.apply(&blocked("c1", 0.95)), Reconciled::Blocked { known: true });
        let s = r.snapshot();
        assert_eq!(s.stats.scams_blocked, 3);
        assert_eq!(s.stats.total_calls, 6);
        let c1 = s.call("c1").unwrap();
        assert_eq!(c1.scam_score, 0.95);
        assert_eq!(c1.summary.as_deref(), Some("IRS impersonation scam blocked"));

        assert_eq!(r.apply(&blocked("c1", 0.95)), Reconciled::AlreadyBlocked);
        assert_eq!(r.snapshot().stats.scams_blocked, 3);
    }

    #[test]
    fn seeded_blocked_call_is_not_counted_again() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        let mut c1 = CallRecord::screening("c1", "+1", "t");
        c1.status = CallStatus::Blocked;
        r.seed(AggregateStats { total_calls: 1, scams_blocked: 1, ..Default::default() }, vec![c1]);
        assert_eq!(r.apply(&blocked("c1", 0.9)), Reconciled::AlreadyBlocked);
        assert_eq!(r.snapshot().stats.scams_blocked, 1);
    }

    #[test]
    fn number_change_does_not_match_another_call() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        r.apply(&created("c2", "+2"));
        let renumber = CallUpdate { caller_number: Some("+1".into()), ..Default::default() };
        assert_eq!(r.apply(&updated(Some("c9"), None, renumber)), Reconciled::UnknownCall);
        assert_eq!(r.snapshot().call("c1").unwrap().caller_number, "+1");

        let by_number = CallUpdate { caller_number: Some("+3".into()), ..Default::default() };
        assert_eq!(r.apply(&updated(None, Some("+2"), by_number)), Reconciled::Updated { completed: false });
        assert_eq!(r.snapshot().call("c2").unwrap().caller_number, "+3");
    }

    #[test]
    fn block_for_unknown_call_still_counts() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        assert_eq!(r.apply(&blocked("ghost", 0.8)), Reconciled::Blocked { known: false });
        assert_eq!(r.snapshot().stats.scams_blocked, 1);
        assert!(r.snapshot().calls.is_empty());
    }

    #[test]
    fn update_merges_partial_fields_and_falls_back_to_number() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1555"));
        let out = r.apply(&updated(
            None,
            Some("+1555"),
            CallUpdate { intent: Some("delivery".into()), duration: Some(42), ..Default::default() },
        ));
        assert_eq!(out, Reconciled::Updated { completed: false });
        let s = r.snapshot();
        let c1 = s.call("c1").unwrap();
        assert_eq!(c1.intent, "delivery");
        assert_eq!(c1.duration, 42);
        assert_eq!(c1.status, CallStatus::Screening);
    }

    #[test]
    fn update_for_unknown_call_is_a_noop() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        let version = r.snapshot().version;
        let out = r.apply(&updated(Some("c9"), None, CallUpdate { duration: Some(3), ..Default::default() }));
        assert_eq!(out, Reconciled::UnknownCall);
        assert_eq!(r.snapshot().version, version);
    }

    #[test]
    fn status_regressions_are_ignored() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        let done = CallUpdate { status: Some(CallStatus::Completed), ..Default::default() };
        assert_eq!(r.apply(&updated(Some("c1"), None, done)), Reconciled::Updated { completed: true });

        let back = CallUpdate { status: Some(CallStatus::Screening), duration: Some(9), ..Default::default() };
        r.apply(&updated(Some("c1"), None, back));
        let s = r.snapshot();
        let c1 = s.call("c1").unwrap();
        assert_eq!(c1.status, CallStatus::Completed);
        assert_eq!(c1.duration, 9);
    }

    #[test]
    fn analytics_merge_last_write_wins() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.seed(AggregateStats { total_calls: 5, scams_blocked: 2, ..Default::default() }, vec![]);
        let patch = AggregateStatsPatch { today_calls: Some(4), time_saved_minutes: Some(12.5), ..Default::default() };
        assert_eq!(r.apply(&ev(EventPayload::AnalyticsUpdated(patch))), Reconciled::StatsMerged);
        let s = r.snapshot();
        assert_eq!(s.stats.today_calls, 4);
        assert_eq!(s.stats.total_calls, 5);
        assert_eq!(s.stats.time_saved_minutes, 12.5);

        let bad = AggregateStatsPatch { scams_blocked: Some(50), ..Default::default() };
        assert!(matches!(r.apply(&ev(EventPayload::AnalyticsUpdated(bad))), Reconciled::Rejected(_)));
        assert_eq!(r.snapshot().stats.scams_blocked, 2);
    }

    #[test]
    fn activity_is_bounded_and_leaves_calls_alone() {
        let mut r = Reconciler::new(3);
        r.seed(AggregateStats { total_calls: 1, ..Default::default() }, vec![]);
        for i in 0..5 {
            r.apply(&ev(EventPayload::AiThinking(AiThinking {
                agent: "screener".into(),
                thought: format!("t{i}"),
                data: None,
            })));
        }
        r.apply(&ev(EventPayload::ToolExecuted(ToolExecuted {
            tool: "lookup".into(),
            result: serde_json::json!({"ok": true}),
        })));
        let s = r.snapshot();
        let texts: Vec<_> = s.activity.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec![r#"{"ok":true}"#, "t4", "t3"]);
        assert_eq!(s.activity[0].kind, ActivityKind::Tool);
        assert!(s.calls.is_empty());
        assert_eq!(s.stats.total_calls, 1);

        r.clear_activity();
        assert!(r.snapshot().activity.is_empty());
    }

    #[test]
    fn malformed_frame_leaves_state_untouched() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&created("c1", "+1"));
        let before = r.snapshot();
        assert!(decode_event(Some("scam_blocked"), r#"{"data":{"call_sid":"c1"}}"#).is_err());
        let ok = decode_event(Some("call_created"), r#"{"data":{"call_id":"c2","caller_number":"+2"}}"#).unwrap();
        r.apply(&ok);
        assert_eq!(before.calls.len(), 1);
        assert_eq!(r.snapshot().calls.len(), 2);
        assert_eq!(r.snapshot().stats, before.stats);
    }

    #[test]
    fn publishes_snapshots_without_mutating_old_ones() {
        let (tx, rx) = watch::channel(Arc::new(DashboardState::default()));
        let mut r = Reconciler::with_publisher(DEFAULT_ACTIVITY_CAP, tx);
        r.apply(&created("c1", "+1"));
        let first = rx.borrow().clone();
        r.apply(&created("c2", "+2"));
        assert_eq!(first.calls.len(), 1);
        assert_eq!(rx.borrow().calls.len(), 2);
        assert!(rx.borrow().version > first.version);
    }

    #[test]
    fn seed_dedupes_and_keeps_activity() {
        let mut r = Reconciler::new(DEFAULT_ACTIVITY_CAP);
        r.apply(&ev(EventPayload::AiThinking(AiThinking { agent: "a".into(), thought: "x".into(), data: None })));
        let calls = vec![
            CallRecord::screening("c1", "+1", "t"),
            CallRecord::screening("c1", "+1", "t"),
            CallRecord::screening("c2", "+2", "t"),
        ];
        r.seed(AggregateStats::default(), calls);
        assert_eq!(r.snapshot().calls.len(), 2);
        assert_eq!(r.snapshot().activity.len(), 1);
    }
}
