use std::io::Stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossterm::{
    event::{self, Event as CEvent, KeyEvent},
    execute,
    style::ResetColor,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{CallRecord, StreamEvent};
use realtime::live::{ErrorObserver, EventObserver};
use realtime::{ClientConfig, HttpTransport, LiveDashboard, Observers, StreamError};

use crate::cmd::util::describe_event;
use crate::tui::draw::{
    draw_activity, draw_calls, draw_detail, draw_events, draw_footer, draw_header_tabs, draw_overlay,
    draw_overview, get_theme,
};
use crate::tui::events::handle_event;
use crate::tui::state::{AppEvent, AppState, LiveCommand, View};

type Term = Terminal<CrosstermBackend<Stdout>>;

pub async fn run_dashboard(config: ClientConfig) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<LiveCommand>();

    let tx_ev = tx.clone();
    let on_event: EventObserver = Arc::new(move |ev: &StreamEvent| {
        let _ = tx_ev.send(AppEvent::Stream(describe_event(ev)));
    });
    let tx_err = tx.clone();
    let on_error: ErrorObserver = Arc::new(move |err: &StreamError| {
        let _ = tx_err.send(AppEvent::StreamError(err.to_string()));
    });
    let observers = Observers { event: Some(on_event), error: Some(on_error) };

    eprintln!("loading dashboard from {} ...", config.api_url);
    let transport = Arc::new(HttpTransport::new(config.fetch.timeout()).context("building http client")?);
    let mut live = LiveDashboard::start_with_observers(config.clone(), transport, observers)
        .await
        .context("starting live dashboard")?;

    let mut app = AppState::new(config.user_id.clone(), config.api_url.clone(), cmd_tx);
    handle_event(&mut app, AppEvent::State(live.state()))?;
    handle_event(&mut app, AppEvent::Status(live.status()))?;

    // Tick task
    let tx_tick = tx.clone();
    tokio::spawn(async move {
        let mut intv = tokio::time::interval(Duration::from_millis(250));
        loop {
            intv.tick().await;
            if tx_tick.send(AppEvent::Tick).is_err() {
                break;
            }
        }
    });

    let mut terminal = match setup_terminal().context("terminal setup") {
        Ok(t) => t,
        Err(e) => {
            live.close();
            return Err(e);
        }
    };

    // Keyboard task
    let key_poller = KeyPoller::default();
    let tx_key = tx.clone();
    let stop = key_poller.flag();
    tokio::task::spawn_blocking(move || poll_keys(&stop, read_key, &tx_key));

    // State and connection status forwarders
    let mut state_rx = live.subscribe_state();
    let tx_state = tx.clone();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let snapshot = state_rx.borrow_and_update().clone();
            if tx_state.send(AppEvent::State(snapshot)).is_err() {
                break;
            }
        }
    });
    let mut status_rx = live.subscribe_status();
    let tx_status = tx.clone();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow_and_update();
            if tx_status.send(AppEvent::Status(status)).is_err() {
                break;
            }
        }
    });

    let result = event_loop(&mut terminal, &mut app, &mut live, &mut rx, &mut cmd_rx, &tx).await;
    drop(key_poller);
    let restored = restore_terminal(&mut terminal);
    live.close();
    info!("dashboard closed");
    result.and(restored)
}

/// Stops the blocking key poller when dropped, on every exit path.
#[derive(Default)]
struct KeyPoller {
    stop: Arc<AtomicBool>,
}

impl KeyPoller {
    fn flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }
}

impl Drop for KeyPoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn read_key() -> std::io::Result<Option<KeyEvent>> {
    if !event::poll(Duration::from_millis(50))? {
        return Ok(None);
    }
    match event::read()? {
        CEvent::Key(key) => Ok(Some(key)),
        _ => Ok(None),
    }
}

/// Forwards keys until stopped, the receiver goes away, or the terminal
/// stops answering.
fn poll_keys<F>(stop: &AtomicBool, mut next: F, tx: &mpsc::UnboundedSender<AppEvent>)
where
    F: FnMut() -> std::io::Result<Option<KeyEvent>>,
{
    while !stop.load(Ordering::Relaxed) {
        match next() {
            Ok(Some(key)) => {
                if tx.send(AppEvent::Key(key)).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "key polling stopped");
                break;
            }
        }
    }
}

fn setup_terminal() -> anyhow::Result<Term> {
    enable_raw_mode()?;
    let entered = enter_alternate_screen();
    if entered.is_err() {
        let _ = disable_raw_mode();
    }
    entered
}

fn enter_alternate_screen() -> anyhow::Result<Term> {
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, ResetColor)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn event_loop(
    terminal: &mut Term,
    app: &mut AppState,
    live: &mut LiveDashboard,
    rx: &mut mpsc::UnboundedReceiver<AppEvent>,
    cmd_rx: &mut mpsc::UnboundedReceiver<LiveCommand>,
    tx: &mpsc::UnboundedSender<AppEvent>,
) -> anyhow::Result<()> {
    loop {
        let Some(first) = rx.recv().await else {
            return Ok(());
        };
        let mut quit = handle_event(app, first)?;
        while let Ok(evt) = rx.try_recv() {
            quit |= handle_event(app, evt)?;
        }
        if quit {
            return Ok(());
        }
        while let Ok(cmd) = cmd_rx.try_recv() {
            apply_command(live, cmd, tx);
        }

        terminal.draw(|f| {
            let area = f.size();
            let theme = get_theme(app.theme);
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(1), Constraint::Length(3)])
                .split(area);
            draw_header_tabs(f, chunks[0], &app.view, &app.status, &app.user_id, &app.api_url, &theme);
            let body = chunks[1];
            let dashboard = app.dashboard.clone();
            match app.view {
                View::Overview => draw_overview(f, body, &dashboard, &app.status, &theme),
                View::Calls => {
                    let visible: Vec<CallRecord> = app.visible_calls().into_iter().cloned().collect();
                    let calls: Vec<&CallRecord> = visible.iter().collect();
                    let filter = app.call_filter.as_deref();
                    draw_calls(f, body, &calls, dashboard.calls.len(), filter, &mut app.calls_table_state, &theme);
                }
                View::Activity => draw_activity(f, body, &dashboard.activity, &theme),
                View::Events => draw_events(f, body, &app.events, &theme),
            }
            draw_footer(f, chunks[2], &theme);
            if let Some(call) = app.detail_call() {
                draw_detail(f, area, call, &theme);
            }
            if let Some(buf) = &app.filter_input {
                draw_overlay(f, area, &format!("/{buf}"), &theme);
            } else if let Some((_, msg)) = &app.overlay_msg {
                draw_overlay(f, area, msg, &theme);
            }
        })?;
    }
}

fn apply_command(live: &mut LiveDashboard, cmd: LiveCommand, tx: &mpsc::UnboundedSender<AppEvent>) {
    match cmd {
        LiveCommand::Reload => {
            let handle = live.spawn_reload();
            let tx = tx.clone();
            tokio::spawn(async move {
                let msg = match handle.await {
                    Ok(false) => "Dashboard reloaded".to_string(),
                    Ok(true) => "Backend unreachable, showing fallback values".to_string(),
                    Err(e) => format!("Reload failed: {e}"),
                };
                let _ = tx.send(AppEvent::Notice(msg));
            });
        }
        LiveCommand::RestartStream => live.restart_stream(),
        LiveCommand::ClearActivity => live.clear_activity(),
        LiveCommand::SetOutcome { id, outcome } => {
            let api = live.api().clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let msg = if api.try_update_call_outcome(&id, outcome).await {
                    format!("Call {id} marked {outcome}")
                } else {
                    format!("Could not update call {id}")
                };
                let _ = tx.send(AppEvent::Notice(msg));
            });
        }
    }
}
