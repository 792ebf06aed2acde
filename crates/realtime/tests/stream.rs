use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use common::CallStatus;
use futures::stream::{self, BoxStream, StreamExt};
use realtime::live::ErrorObserver;
use realtime::{
    ClientConfig, ConnectionState, FetchPolicy, HttpTransport, LiveDashboard, Observers, ReconnectPolicy,
    StreamError,
};
use serde_json::{json, Value};

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

struct Backend {
    connections: AtomicUsize,
    /// Frames for the n-th connection; connections past the end get none.
    scripts: Vec<Vec<(String, String)>>,
    /// Keep the last scripted connection open instead of closing it.
    hold_last: bool,
    users: Mutex<Vec<String>>,
    stats_hits: AtomicUsize,
}

impl Backend {
    fn new(scripts: Vec<Vec<(String, String)>>, hold_last: bool) -> Arc<Self> {
        Arc::new(Self {
            connections: AtomicUsize::new(0),
            scripts,
            hold_last,
            users: Mutex::new(Vec::new()),
            stats_hits: AtomicUsize::new(0),
        })
    }
}

fn envelope(kind: &str, data: Value) -> (String, String) {
    let body = json!({"type": kind, "data": data, "timestamp": "2025-01-01T12:00:00.000001"});
    (kind.to_string(), body.to_string())
}

fn connected() -> (String, String) {
    envelope("connected", json!({"user_id": "demo_user", "status": "connected"}))
}

async fn events(State(b): State<Arc<Backend>>, Path(user): Path<String>) -> Sse<EventStream> {
    b.users.lock().unwrap().push(user);
    let n = b.connections.fetch_add(1, Ordering::SeqCst);
    let frames = b.scripts.get(n).cloned().unwrap_or_default();
    let body = stream::iter(
        frames.into_iter().map(|(name, data)| Ok::<_, Infallible>(Event::default().event(name).data(data))),
    );
    let stream: EventStream = if b.hold_last && n + 1 >= b.scripts.len() {
        body.chain(stream::pending()).boxed()
    } else {
        body.boxed()
    };
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
}

/// The first snapshot reports 5 calls, every later one 7.
async fn stats(State(b): State<Arc<Backend>>) -> Json<Value> {
    let total = if b.stats_hits.fetch_add(1, Ordering::SeqCst) == 0 { 5 } else { 7 };
    Json(json!({"total_calls": total, "scams_blocked": 2}))
}

async fn recent() -> Json<Value> {
    Json(json!([]))
}

async fn serve(backend: Arc<Backend>, with_stream: bool) -> SocketAddr {
    let mut app = Router::new()
        .route("/api/dashboard/stats", get(stats))
        .route("/api/calls/recent", get(recent));
    if with_stream {
        app = app.route("/api/realtime/events/:user", get(events));
    }
    let app = app.with_state(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config(addr: SocketAddr, reconnect: ReconnectPolicy) -> ClientConfig {
    let mut cfg = ClientConfig {
        api_url: format!("http://{addr}/"),
        reconnect,
        fetch: FetchPolicy { retry_base_ms: 5, timeout_ms: 2_000, ..Default::default() },
        ..Default::default()
    };
    cfg.validate().unwrap();
    cfg
}

fn transport() -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(Duration::from_secs(2)).unwrap())
}

fn fast_retry(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy { base_ms: 10, cap_ms: 40, max_attempts }
}

#[tokio::test]
async fn seeded_state_then_streamed_block() {
    let backend = Backend::new(
        vec![vec![
            connected(),
            envelope("call_created", json!({"call_id": "c1", "caller_number": "+15551234567"})),
            // missing confidence: dropped, stream continues
            envelope("scam_blocked", json!({"call_sid": "c1", "scam_type": "IRS impersonation"})),
            envelope("ai_thinking", json!({"agent": "screener", "thought": "caller claims to be the IRS"})),
            envelope("scam_blocked", json!({"call_sid": "c1", "confidence": 0.95, "scam_type": "IRS impersonation"})),
        ]],
        true,
    );
    let addr = serve(backend.clone(), true).await;

    let mut live = LiveDashboard::start(config(addr, ReconnectPolicy::default()), transport()).await.unwrap();
    let mut rx = live.subscribe_state();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.call("c1").is_some_and(|c| c.status == CallStatus::Blocked)),
    )
    .await
    .expect("timed out waiting for block")
    .unwrap()
    .clone();

    let c1 = state.call("c1").unwrap();
    assert_eq!(c1.scam_score, 0.95);
    assert_eq!(state.calls.len(), 1);
    assert_eq!(state.stats.scams_blocked, 3);
    assert_eq!(state.stats.total_calls, 6);
    assert_eq!(state.activity.len(), 1);
    assert!(live.status().is_connected());
    assert_eq!(*backend.users.lock().unwrap(), vec!["demo_user".to_string()]);

    live.close();
    assert_eq!(live.status(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnects_after_server_closes_stream() {
    let backend = Backend::new(
        vec![
            vec![connected()],
            vec![connected(), envelope("call_created", json!({"call_id": "c2", "caller_number": "+2"}))],
        ],
        true,
    );
    let addr = serve(backend.clone(), true).await;

    let live = LiveDashboard::start(config(addr, fast_retry(5)), transport()).await.unwrap();
    let mut rx = live.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.call("c2").is_some()))
        .await
        .expect("timed out waiting for reconnect")
        .unwrap();
    assert_eq!(backend.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gives_up_and_restarts_on_request() {
    let backend = Backend::new(vec![], false);
    let addr = serve(backend, false).await;

    let errors: Arc<Mutex<Vec<StreamError>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let on_error: ErrorObserver = Arc::new(move |e: &StreamError| sink.lock().unwrap().push(e.clone()));
    let observers = Observers { event: None, error: Some(on_error) };
    let mut live =
        LiveDashboard::start_with_observers(config(addr, fast_retry(2)), transport(), observers).await.unwrap();

    let mut status = live.subscribe_status();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.is_terminal()))
        .await
        .expect("never reached failed state")
        .unwrap();
    assert_eq!(live.status(), ConnectionState::Failed { attempts: 2 });
    {
        let errors = errors.lock().unwrap();
        assert!(errors.iter().any(|e| matches!(e, StreamError::Status { status: 404 })));
        assert_eq!(errors.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    // snapshot still rendered from REST
    assert_eq!(live.state().stats.total_calls, 5);

    live.restart_stream();
    let fatal_count = || errors.lock().unwrap().iter().filter(|e| e.is_terminal()).count();
    tokio::time::timeout(Duration::from_secs(5), async {
        while fatal_count() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("restarted stream never gave up");
}

#[tokio::test]
async fn completed_call_refreshes_stats() {
    let backend = Backend::new(
        vec![vec![
            connected(),
            envelope("call_created", json!({"call_id": "c3", "caller_number": "+3"})),
            envelope("call_updated", json!({"call_sid": "c3", "updates": {"status": "passed"}})),
            envelope("call_updated", json!({"call_id": "c3", "updates": {"status": "completed", "duration_seconds": 31}})),
        ]],
        true,
    );
    let addr = serve(backend.clone(), true).await;

    let live = LiveDashboard::start(config(addr, ReconnectPolicy::default()), transport()).await.unwrap();
    let mut rx = live.subscribe_state();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.stats.total_calls == 7))
        .await
        .expect("stats never refreshed")
        .unwrap()
        .clone();
    let c3 = state.call("c3").unwrap();
    assert_eq!(c3.status, CallStatus::Completed);
    assert_eq!(c3.duration, 31);
    assert_eq!(backend.stats_hits.load(Ordering::SeqCst), 2);
}
