use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use common::CallStatus;

use crate::tui::state::{AppEvent, AppState, LiveCommand, View, OVERLAY_TTL};

/// Apply one event to the UI state. Returns `true` when the user asked to quit.
pub fn handle_event(app: &mut AppState, evt: AppEvent) -> anyhow::Result<bool> {
    match evt {
        AppEvent::Key(key) => return Ok(handle_key(app, key)),
        AppEvent::Tick => {
            if let Some((at, _)) = &app.overlay_msg {
                if at.elapsed() > OVERLAY_TTL {
                    app.overlay_msg = None;
                }
            }
        }
        AppEvent::State(state) => {
            app.dashboard = state;
            app.clamp_selection();
            if app.detail.is_some() && app.detail_call().is_none() {
                app.detail = None;
            }
        }
        AppEvent::Status(status) => {
            if status != app.status {
                app.push_event(format!("stream {status}"));
                if status.is_terminal() {
                    app.notice("Event stream failed. Press R to reconnect.");
                }
            }
            app.status = status;
        }
        AppEvent::Stream(line) => app.push_event(line),
        AppEvent::StreamError(msg) => app.push_event(format!("error: {msg}")),
        AppEvent::Notice(msg) => app.notice(msg),
    }
    Ok(false)
}

fn handle_key(app: &mut AppState, key: KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    if let Some(buf) = &mut app.filter_input {
        match key.code {
            KeyCode::Esc => app.filter_input = None,
            KeyCode::Enter => {
                let needle = buf.trim().to_string();
                app.call_filter = (!needle.is_empty()).then_some(needle);
                app.filter_input = None;
                app.calls_table_state.select(None);
                app.clamp_selection();
            }
            KeyCode::Backspace => {
                buf.pop();
            }
            KeyCode::Char(c) => buf.push(c),
            _ => {}
        }
        return false;
    }

    if app.detail.is_some() {
        if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
            app.detail = None;
        }
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Esc => {
            if app.overlay_msg.take().is_none() && app.call_filter.take().is_some() {
                app.clamp_selection();
            }
        }
        KeyCode::Tab => app.view = app.view.next(),
        KeyCode::BackTab => app.view = app.view.prev(),
        KeyCode::Char(c @ '1'..='4') => app.view = View::ALL[(c as u8 - b'1') as usize],
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Enter => {
            if let Some(call) = app.selected_call() {
                app.detail = Some(call.id.clone());
            }
        }
        KeyCode::Char('b') => set_outcome(app, CallStatus::Blocked),
        KeyCode::Char('p') => set_outcome(app, CallStatus::Passed),
        KeyCode::Char('r') => {
            let _ = app.cmd_tx.send(LiveCommand::Reload);
            app.notice("Reloading dashboard...");
        }
        KeyCode::Char('R') => {
            let _ = app.cmd_tx.send(LiveCommand::RestartStream);
            app.notice("Reconnecting event stream...");
        }
        KeyCode::Char('c') => {
            let _ = app.cmd_tx.send(LiveCommand::ClearActivity);
            app.notice("Activity log cleared");
        }
        KeyCode::Char('t') => app.theme = app.theme.toggled(),
        KeyCode::Char('/') => {
            app.filter_input = Some(app.call_filter.clone().unwrap_or_default());
            app.overlay_msg = Some((Instant::now(), "Filter calls".into()));
        }
        _ => {}
    }
    false
}

fn set_outcome(app: &mut AppState, outcome: CallStatus) {
    let Some(id) = app.selected_call().map(|c| c.id.clone()) else {
        app.notice("No call selected");
        return;
    };
    let _ = app.cmd_tx.send(LiveCommand::SetOutcome { id: id.clone(), outcome });
    app.notice(format!("Marking {id} as {outcome}..."));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use common::CallRecord;
    use realtime::{ConnectionState, DashboardState};
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn app() -> (AppState, mpsc::UnboundedReceiver<LiveCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = AppState::new("u".into(), "http://localhost:8000".into(), tx);
        let calls = vec![CallRecord::screening("c2", "+2", ""), CallRecord::screening("c1", "+1", "")];
        handle_event(&mut app, AppEvent::State(Arc::new(DashboardState { calls, ..Default::default() }))).unwrap();
        (app, rx)
    }

    #[test]
    fn navigation_and_quit() {
        let (mut app, _rx) = app();
        assert!(!handle_event(&mut app, key(KeyCode::Tab)).unwrap());
        assert_eq!(app.view, View::Calls);
        handle_event(&mut app, key(KeyCode::Char('4'))).unwrap();
        assert_eq!(app.view, View::Events);
        handle_event(&mut app, key(KeyCode::BackTab)).unwrap();
        assert_eq!(app.view, View::Activity);
        assert!(handle_event(&mut app, key(KeyCode::Char('q'))).unwrap());
        let ctrl_c = AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(handle_event(&mut app, ctrl_c).unwrap());
    }

    #[test]
    fn outcome_keys_target_selected_call() {
        let (mut app, mut rx) = app();
        handle_event(&mut app, key(KeyCode::Down)).unwrap();
        handle_event(&mut app, key(KeyCode::Char('b'))).unwrap();
        assert_eq!(rx.try_recv().unwrap(), LiveCommand::SetOutcome { id: "c1".into(), outcome: CallStatus::Blocked });

        handle_event(&mut app, key(KeyCode::Char('c'))).unwrap();
        assert_eq!(rx.try_recv().unwrap(), LiveCommand::ClearActivity);
        handle_event(&mut app, key(KeyCode::Char('R'))).unwrap();
        assert_eq!(rx.try_recv().unwrap(), LiveCommand::RestartStream);
    }

    #[test]
    fn filter_input_captures_keys() {
        let (mut app, mut rx) = app();
        handle_event(&mut app, key(KeyCode::Char('/'))).unwrap();
        for c in "+2q".chars() {
            assert!(!handle_event(&mut app, key(KeyCode::Char(c))).unwrap());
        }
        handle_event(&mut app, key(KeyCode::Backspace)).unwrap();
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert_eq!(app.call_filter.as_deref(), Some("+2"));
        assert_eq!(app.visible_calls().len(), 1);
        assert!(rx.try_recv().is_err());

        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert_eq!(app.call_filter, None);
    }

    #[test]
    fn detail_popup_closes_when_call_disappears() {
        let (mut app, _rx) = app();
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert_eq!(app.detail.as_deref(), Some("c2"));
        // q closes the popup instead of quitting
        assert!(!handle_event(&mut app, key(KeyCode::Char('q'))).unwrap());
        assert!(app.detail.is_none());

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        handle_event(&mut app, AppEvent::State(Arc::new(DashboardState::default()))).unwrap();
        assert!(app.detail.is_none());
        assert!(app.calls_table_state.selected().is_none());
    }

    #[test]
    fn terminal_status_is_logged_once() {
        let (mut app, _rx) = app();
        let failed = ConnectionState::Failed { attempts: 10 };
        handle_event(&mut app, AppEvent::Status(failed)).unwrap();
        handle_event(&mut app, AppEvent::Status(failed)).unwrap();
        assert_eq!(app.events.len(), 1);
        assert!(app.overlay_msg.is_some());
    }
}
