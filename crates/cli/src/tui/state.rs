use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::KeyEvent;
use ratatui::widgets::TableState;
use tokio::sync::mpsc;

use common::{CallRecord, CallStatus};
use realtime::{ConnectionState, DashboardState};

use crate::tui::draw::ThemeKind;

/// Maximum number of stream log lines to retain.
pub const EVENTS_CAP: usize = 500;
/// How long a notice stays on screen.
pub const OVERLAY_TTL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum View {
    Overview,
    Calls,
    Activity,
    Events,
}

impl View {
    pub const ALL: [View; 4] = [View::Overview, View::Calls, View::Activity, View::Events];

    pub fn index(self) -> usize {
        match self {
            View::Overview => 0,
            View::Calls => 1,
            View::Activity => 2,
            View::Events => 3,
        }
    }

    pub fn next(self) -> View {
        View::ALL[(self.index() + 1) % View::ALL.len()]
    }

    pub fn prev(self) -> View {
        View::ALL[(self.index() + View::ALL.len() - 1) % View::ALL.len()]
    }
}

/// Requests from the UI to the live dashboard, drained by the run loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveCommand {
    Reload,
    RestartStream,
    ClearActivity,
    SetOutcome { id: String, outcome: CallStatus },
}

#[derive(Clone, Debug)]
pub enum AppEvent {
    Tick,
    Key(KeyEvent),
    State(Arc<DashboardState>),
    Status(ConnectionState),
    Stream(String),
    StreamError(String),
    Notice(String),
}

pub struct AppState {
    pub theme: ThemeKind,
    pub view: View,
    pub user_id: String,
    pub api_url: String,
    pub dashboard: Arc<DashboardState>,
    pub status: ConnectionState,
    pub events: VecDeque<(Instant, String)>,
    pub calls_table_state: TableState,
    pub overlay_msg: Option<(Instant, String)>,
    /// Id of the call whose detail popup is open.
    pub detail: Option<String>,
    pub filter_input: Option<String>,
    pub call_filter: Option<String>,
    pub cmd_tx: mpsc::UnboundedSender<LiveCommand>,
}

impl AppState {
    pub fn new(user_id: String, api_url: String, cmd_tx: mpsc::UnboundedSender<LiveCommand>) -> Self {
        Self {
            theme: ThemeKind::Dark,
            view: View::Overview,
            user_id,
            api_url,
            dashboard: Arc::new(DashboardState::default()),
            status: ConnectionState::Disconnected,
            events: VecDeque::with_capacity(EVENTS_CAP),
            calls_table_state: TableState::default(),
            overlay_msg: None,
            detail: None,
            filter_input: None,
            call_filter: None,
            cmd_tx,
        }
    }

    pub fn push_event(&mut self, line: String) {
        if self.events.len() == EVENTS_CAP {
            self.events.pop_back();
        }
        self.events.push_front((Instant::now(), line));
    }

    pub fn notice(&mut self, msg: impl Into<String>) {
        self.overlay_msg = Some((Instant::now(), msg.into()));
    }

    /// Calls after the `/` filter, matched against id, number, name and intent.
    pub fn visible_calls(&self) -> Vec<&CallRecord> {
        let needle = self.call_filter.as_deref().map(str::to_lowercase);
        self.dashboard
            .calls
            .iter()
            .filter(|c| match &needle {
                None => true,
                Some(n) => {
                    c.id.to_lowercase().contains(n)
                        || c.caller_number.to_lowercase().contains(n)
                        || c.intent.to_lowercase().contains(n)
                        || c.caller_name.as_deref().is_some_and(|name| name.to_lowercase().contains(n))
                }
            })
            .collect()
    }

    pub fn selected_call(&self) -> Option<&CallRecord> {
        let idx = self.calls_table_state.selected()?;
        self.visible_calls().into_iter().nth(idx)
    }

    /// Move the table cursor by `delta`, clamped to the visible rows.
    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_calls().len();
        if len == 0 {
            self.calls_table_state.select(None);
            return;
        }
        let cur = self.calls_table_state.selected().unwrap_or(0) as isize;
        let next = (cur + delta).clamp(0, len as isize - 1) as usize;
        self.calls_table_state.select(Some(next));
    }

    /// Keep the cursor valid after the call list or filter changed.
    pub fn clamp_selection(&mut self) {
        let len = self.visible_calls().len();
        match self.calls_table_state.selected() {
            _ if len == 0 => self.calls_table_state.select(None),
            Some(i) if i >= len => self.calls_table_state.select(Some(len - 1)),
            None => self.calls_table_state.select(Some(0)),
            Some(_) => {}
        }
    }

    pub fn detail_call(&self) -> Option<&CallRecord> {
        self.detail.as_deref().and_then(|id| self.dashboard.call(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_calls(ids: &[(&str, &str)]) -> AppState {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut app = AppState::new("u".into(), "http://localhost:8000".into(), tx);
        let calls = ids.iter().map(|(id, num)| CallRecord::screening(*id, *num, "")).collect();
        app.dashboard = Arc::new(DashboardState { calls, ..Default::default() });
        app
    }

    #[test]
    fn events_are_bounded_newest_first() {
        let mut app = app_with_calls(&[]);
        for i in 0..EVENTS_CAP + 5 {
            app.push_event(format!("e{i}"));
        }
        assert_eq!(app.events.len(), EVENTS_CAP);
        assert_eq!(app.events.front().unwrap().1, format!("e{}", EVENTS_CAP + 4));
    }

    #[test]
    fn filter_narrows_calls_and_selection_follows() {
        let mut app = app_with_calls(&[("c1", "+1555"), ("c2", "+1666"), ("c3", "+1555999")]);
        app.clamp_selection();
        app.move_selection(5);
        assert_eq!(app.selected_call().unwrap().id, "c3");

        app.call_filter = Some("555".into());
        app.clamp_selection();
        assert_eq!(app.visible_calls().len(), 2);
        assert_eq!(app.selected_call().unwrap().id, "c3");

        app.call_filter = Some("nothing".into());
        app.clamp_selection();
        assert!(app.selected_call().is_none());
    }

    #[test]
    fn views_cycle() {
        assert_eq!(View::Events.next(), View::Overview);
        assert_eq!(View::Overview.prev(), View::Events);
    }
}
