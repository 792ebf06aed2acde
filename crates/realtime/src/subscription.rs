//! Supervised event-stream subscription: one task owns the transport, the
//! reconnect controller and the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::StreamError;
use crate::reconnect::{ConnectionState, Decision, ReconnectController, ReconnectPolicy};
use crate::transport::{Connection, Transport};

pub type ErrorHandler = Box<dyn FnMut(&StreamError) + Send>;

#[derive(Clone)]
struct StatusPublisher {
    tx: Arc<watch::Sender<ConnectionState>>,
    closed: Arc<AtomicBool>,
}

impl StatusPublisher {
    fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|cur| {
            if self.closed.load(Ordering::SeqCst) || *cur == state {
                return false;
            }
            *cur = state;
            true
        });
    }
}

pub struct Subscription {
    transport: Arc<dyn Transport>,
    url: String,
    policy: ReconnectPolicy,
    dispatcher: Dispatcher,
    on_error: Option<ErrorHandler>,
}

impl Subscription {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self { transport, url: url.into(), policy, dispatcher: Dispatcher::new(), on_error: None }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Called for every transport error and once more for the terminal
    /// `MaxAttemptsExceeded`.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: FnMut(&StreamError) + Send + 'static,
    {
        self.on_error = Some(Box::new(handler));
    }

    pub fn spawn(self) -> SubscriptionHandle {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        self.spawn_with_status(Arc::new(tx))
    }

    /// Spawn onto the current runtime, publishing state into `status`.
    pub fn spawn_with_status(self, status: Arc<watch::Sender<ConnectionState>>) -> SubscriptionHandle {
        let closed = Arc::new(AtomicBool::new(false));
        let publisher = StatusPublisher { tx: status.clone(), closed: closed.clone() };
        let task = tokio::spawn(self.run(publisher));
        SubscriptionHandle { status, closed, task }
    }

    async fn run(mut self, status: StatusPublisher) -> StreamError {
        let mut ctl = ReconnectController::new(self.policy);
        loop {
            status.set(ctl.begin_connect());
            info!(url = %self.url, attempt = ctl.attempt(), "connecting to event stream");
            let err = match Connection::open(self.transport.as_ref(), &self.url).await {
                Ok(mut conn) => {
                    status.set(ctl.opened());
                    self.pump(&mut conn, &mut ctl).await
                }
                Err(e) => e,
            };
            warn!(url = %self.url, error = %err, "event stream error");
            self.report(&err);

            match ctl.fail() {
                Decision::Retry(delay) => {
                    status.set(ctl.state());
                    info!(delay_ms = delay.as_millis() as u64, attempt = ctl.attempt(), "scheduling reconnect");
                    tokio::time::sleep(delay).await;
                }
                Decision::GiveUp { attempts } => {
                    let fatal = StreamError::MaxAttemptsExceeded { attempts };
                    error!(url = %self.url, attempts, "event stream failed permanently");
                    self.report(&fatal);
                    status.set(ctl.state());
                    return fatal;
                }
            }
        }
    }

    async fn pump(&mut self, conn: &mut Connection, ctl: &mut ReconnectController) -> StreamError {
        let mut confirmed = false;
        loop {
            let frame = match conn.next_frame().await {
                Ok(f) => f,
                Err(e) => return e,
            };
            if !confirmed {
                confirmed = true;
                if ctl.confirm() {
                    debug!(url = %conn.url(), "stream confirmed, reconnect counter reset");
                }
            }
            if let Dispatch::Control(name) = self.dispatcher.dispatch(&frame) {
                debug!(event = %name, "control event");
            }
        }
    }

    fn report(&mut self, err: &StreamError) {
        if let Some(handler) = self.on_error.as_mut() {
            handler(err);
        }
    }
}

/// Owner side of a running subscription. Dropping it cancels the task.
pub struct SubscriptionHandle {
    status: Arc<watch::Sender<ConnectionState>>,
    closed: Arc<AtomicBool>,
    task: JoinHandle<StreamError>,
}

impl SubscriptionHandle {
    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels any pending reconnect and drops the transport. Safe to call
    /// more than once; a terminal `Failed` state is left visible.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.task.abort();
        self.status.send_if_modified(|cur| {
            if cur.is_terminal() || *cur == ConnectionState::Disconnected {
                return false;
            }
            *cur = ConnectionState::Disconnected;
            true
        });
        debug!("subscription closed");
    }

    /// Wait for the task to end. `None` when it was cancelled.
    pub async fn join(mut self) -> Option<StreamError> {
        (&mut self.task).await.ok()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
