use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Tabs},
};

use realtime::ConnectionState;

use crate::tui::state::View;

use super::ThemeColors;

pub fn draw_header_tabs(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    view: &View,
    status: &ConnectionState,
    user_id: &str,
    api_url: &str,
    theme: &ThemeColors,
) {
    let time = chrono::Local::now().format("%H:%M:%S");

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let muted = Style::default().fg(theme.muted);
    let status_line = Line::from(vec![
        Span::styled(format!(" gatekeeper │ {user_id} │ {api_url} │ "), muted),
        Span::styled("● ", Style::default().fg(theme.connection(status))),
        Span::styled(status.to_string(), Style::default().fg(theme.connection(status))),
        Span::styled(format!(" │ {time} "), muted),
    ]);
    f.render_widget(Paragraph::new(status_line).block(Block::default().borders(Borders::NONE)), chunks[0]);

    let tab_titles = vec!["📊 Overview", "📞 Calls", "🧠 Activity", "📝 Events"];

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_type(BorderType::Thick)
                .border_style(Style::default().fg(theme.primary)),
        )
        .style(muted)
        .highlight_style(Style::default().fg(theme.primary).add_modifier(Modifier::BOLD))
        .select(view.index());

    f.render_widget(tabs, chunks[1]);
}
