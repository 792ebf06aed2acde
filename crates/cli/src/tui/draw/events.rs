use std::collections::VecDeque;
use std::time::Instant;

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem},
};

use super::ThemeColors;

pub fn draw_events(f: &mut ratatui::Frame<'_>, area: Rect, events: &VecDeque<(Instant, String)>, theme: &ThemeColors) {
    let items: Vec<ListItem> = events
        .iter()
        .take(area.height.saturating_sub(2) as usize)
        .map(|(t, s)| {
            let elapsed = t.elapsed().as_secs();
            let age = if elapsed < 60 {
                format!("{:>2}s", elapsed)
            } else if elapsed < 3600 {
                format!("{:>2}m", elapsed / 60)
            } else {
                format!("{:>2}h", elapsed / 3600)
            };

            let color = if s.starts_with("error") || s.contains("failed") {
                theme.error
            } else if s.starts_with("stream") {
                theme.warning
            } else if s.starts_with("scam_blocked") {
                theme.accent
            } else {
                theme.text
            };

            ListItem::new(Line::from(vec![
                Span::styled(age, Style::default().fg(theme.muted)),
                Span::styled(" │ ", Style::default().fg(theme.muted)),
                Span::styled(s.as_str(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.primary))
        .title(format!("📝 Stream events ({})", events.len()));

    f.render_widget(List::new(items).block(block), area);
}
