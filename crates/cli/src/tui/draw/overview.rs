use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Gauge, List, ListItem, Paragraph},
};

use common::SystemStatus;
use realtime::{ConnectionState, DashboardState};

use crate::cmd::util::{format_duration, local_time, percent};

use super::ThemeColors;

fn card<'a>(title: &'a str, body: String, border: ratatui::style::Color, theme: &ThemeColors) -> Paragraph<'a> {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .title(title)
        .title_style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD));
    Paragraph::new(body).style(Style::default().fg(theme.text)).block(block).alignment(Alignment::Center)
}

pub fn draw_overview(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &DashboardState,
    status: &ConnectionState,
    theme: &ThemeColors,
) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(5), Constraint::Length(3), Constraint::Min(6)])
        .split(area);

    let cards_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(main_layout[0]);

    let stats = &state.stats;
    f.render_widget(
        card(
            "📞 Calls",
            format!("Total: {}\nToday: {}", stats.total_calls, stats.today_calls),
            theme.primary,
            theme,
        ),
        cards_layout[0],
    );
    f.render_widget(
        card(
            "🛡️ Scams Blocked",
            format!("{}\nRate: {}", stats.scams_blocked, percent(stats.block_rate)),
            if stats.scams_blocked > 0 { theme.error } else { theme.success },
            theme,
        ),
        cards_layout[1],
    );
    f.render_widget(
        card(
            "⏱️ Time Saved",
            format!("{:.1} min\nAvg call: {:.0}s", stats.time_saved_minutes, stats.avg_call_duration),
            theme.accent,
            theme,
        ),
        cards_layout[2],
    );
    let system_color = match stats.current_status {
        SystemStatus::Active => theme.success,
        SystemStatus::Blocked => theme.warning,
        SystemStatus::Emergency => theme.error,
        SystemStatus::Idle => theme.muted,
    };
    f.render_widget(
        card(
            "🏥 System",
            format!("Backend: {}\nStream: {}", stats.current_status, status.label()),
            if status.is_terminal() { theme.error } else { system_color },
            theme,
        ),
        cards_layout[3],
    );

    let rate = stats.block_rate.clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.muted))
                .title("Block rate"),
        )
        .gauge_style(Style::default().fg(theme.score(rate)))
        .ratio(rate)
        .label(format!("{} of {} calls", stats.scams_blocked, stats.total_calls));
    f.render_widget(gauge, main_layout[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_layout[2]);

    let recent: Vec<ListItem> = state
        .calls
        .iter()
        .take(bottom[0].height.saturating_sub(2) as usize)
        .map(|c| {
            ListItem::new(Line::from(vec![
                Span::styled(local_time(&c.created_at, "%H:%M:%S"), Style::default().fg(theme.muted)),
                Span::styled(" │ ", Style::default().fg(theme.muted)),
                Span::styled(format!("{:<9}", c.status.as_str()), Style::default().fg(theme.status(c.status))),
                Span::styled(format!(" {} ", c.caller_number), Style::default().fg(theme.text)),
                Span::styled(format_duration(c.duration), Style::default().fg(theme.muted)),
            ]))
        })
        .collect();
    let recent_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.primary))
        .title(format!("Recent calls ({})", state.calls.len()));
    f.render_widget(List::new(recent).block(recent_block), bottom[0]);

    let activity: Vec<ListItem> = state
        .activity
        .iter()
        .take(bottom[1].height.saturating_sub(2) as usize)
        .map(|a| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", a.source), Style::default().fg(theme.accent)),
                Span::styled(a.text.clone(), Style::default().fg(theme.text)),
            ]))
        })
        .collect();
    let activity_block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent))
        .title("Latest activity");
    f.render_widget(List::new(activity).block(activity_block), bottom[1]);
}
