//! Wires fetcher, subscription and reconciler together: a REST seed followed
//! by streamed events, all applied by a single reconciler task.

use std::sync::Arc;

use common::{AggregateStats, EventKind, StreamEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ConfigError, StreamError};
use crate::fetcher::{ApiClient, DashboardSnapshot};
use crate::reconciler::{DashboardState, Reconciled, Reconciler};
use crate::reconnect::ConnectionState;
use crate::subscription::{Subscription, SubscriptionHandle};
use crate::transport::Transport;

pub type EventObserver = Arc<dyn Fn(&StreamEvent) + Send + Sync>;
pub type ErrorObserver = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Observers {
    pub event: Option<EventObserver>,
    pub error: Option<ErrorObserver>,
}

enum ReconcileMsg {
    Event(StreamEvent),
    Seed(DashboardSnapshot),
    ReplaceStats(AggregateStats),
    ClearActivity,
}

pub struct LiveDashboard {
    config: ClientConfig,
    stream_url: String,
    api: ApiClient,
    transport: Arc<dyn Transport>,
    observers: Observers,
    tx: mpsc::UnboundedSender<ReconcileMsg>,
    state_rx: watch::Receiver<Arc<DashboardState>>,
    status: Arc<watch::Sender<ConnectionState>>,
    reconciler: JoinHandle<()>,
    subscription: Option<SubscriptionHandle>,
}

impl LiveDashboard {
    pub async fn start(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        Self::start_with_observers(config, transport, Observers::default()).await
    }

    /// Seed from REST, then open the stream. The seed is queued ahead of any
    /// streamed event.
    pub async fn start_with_observers(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observers: Observers,
    ) -> Result<Self, ConfigError> {
        let api = ApiClient::from_config(&config)?;
        let stream_url = config.stream_url()?.to_string();

        let (state_tx, state_rx) = watch::channel(Arc::new(DashboardState::default()));
        let reconciler = Reconciler::with_publisher(config.activity_cap, state_tx);
        let (tx, rx) = mpsc::unbounded_channel();
        let reconciler = tokio::spawn(run_reconciler(reconciler, rx, tx.downgrade(), api.clone()));

        let snapshot = api.load_snapshot(config.fetch.recent_limit).await;
        if snapshot.degraded {
            warn!("initial snapshot incomplete, showing fallback values");
        }
        let _ = tx.send(ReconcileMsg::Seed(snapshot));

        let (status, _) = watch::channel(ConnectionState::Disconnected);
        let mut live = Self {
            config,
            stream_url,
            api,
            transport,
            observers,
            tx,
            state_rx,
            status: Arc::new(status),
            reconciler,
            subscription: None,
        };
        live.subscription = Some(live.spawn_subscription());
        info!(user = %live.config.user_id, url = %live.stream_url, "live dashboard started");
        Ok(live)
    }

    fn spawn_subscription(&self) -> SubscriptionHandle {
        let mut sub = Subscription::new(self.transport.clone(), self.stream_url.clone(), self.config.reconnect);
        let dispatcher = sub.dispatcher_mut();
        for kind in EventKind::ALL {
            let tx = self.tx.clone();
            dispatcher.on(kind, move |ev| {
                let _ = tx.send(ReconcileMsg::Event(ev.clone()));
            });
        }
        if let Some(observer) = self.observers.event.clone() {
            dispatcher.on_any(move |ev| observer(ev));
        }
        if let Some(observer) = self.observers.error.clone() {
            sub.on_error(move |err| observer(err));
        }
        sub.spawn_with_status(self.status.clone())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> Arc<DashboardState> {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<Arc<DashboardState>> {
        self.state_rx.clone()
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    /// Refetch stats and calls and replace them wholesale. Returns whether
    /// the fetch degraded to fallback values.
    pub async fn reload(&self) -> bool {
        reload_into(self.api.clone(), self.tx.clone(), self.config.fetch.recent_limit).await
    }

    /// [`reload`](Self::reload) without waiting for it.
    pub fn spawn_reload(&self) -> JoinHandle<bool> {
        tokio::spawn(reload_into(self.api.clone(), self.tx.clone(), self.config.fetch.recent_limit))
    }

    /// Start a fresh subscription with a zeroed attempt counter. This is the
    /// way out of `ConnectionState::Failed`.
    pub fn restart_stream(&mut self) {
        if let Some(old) = self.subscription.take() {
            old.close();
        }
        info!(url = %self.stream_url, "restarting event stream");
        self.subscription = Some(self.spawn_subscription());
    }

    pub fn clear_activity(&self) {
        let _ = self.tx.send(ReconcileMsg::ClearActivity);
    }

    pub fn close(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.close();
        }
        self.reconciler.abort();
    }
}

impl Drop for LiveDashboard {
    fn drop(&mut self) {
        self.close();
    }
}

async fn reload_into(api: ApiClient, tx: mpsc::UnboundedSender<ReconcileMsg>, limit: usize) -> bool {
    let snapshot = api.load_snapshot(limit).await;
    let degraded = snapshot.degraded;
    let _ = tx.send(ReconcileMsg::Seed(snapshot));
    degraded
}

async fn run_reconciler(
    mut reconciler: Reconciler,
    mut rx: mpsc::UnboundedReceiver<ReconcileMsg>,
    tx: mpsc::WeakUnboundedSender<ReconcileMsg>,
    api: ApiClient,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            ReconcileMsg::Event(ev) => {
                let outcome = reconciler.apply(&ev);
                debug!(kind = %ev.kind(), outcome = ?outcome, "applied event");
                if let Reconciled::Updated { completed: true } = outcome {
                    if let Some(tx) = tx.upgrade() {
                        let api = api.clone();
                        tokio::spawn(async move {
                            if let Ok(stats) = api.dashboard_stats().await {
                                let _ = tx.send(ReconcileMsg::ReplaceStats(stats));
                            }
                        });
                    }
                }
            }
            ReconcileMsg::Seed(snapshot) => reconciler.seed(snapshot.stats, snapshot.calls),
            ReconcileMsg::ReplaceStats(stats) => reconciler.replace_stats(stats),
            ReconcileMsg::ClearActivity => reconciler.clear_activity(),
        }
    }
}
