use std::collections::VecDeque;

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem},
};

use realtime::{ActivityEntry, ActivityKind};

use crate::cmd::util::local_time;

use super::ThemeColors;

pub fn draw_activity(f: &mut ratatui::Frame<'_>, area: Rect, activity: &VecDeque<ActivityEntry>, theme: &ThemeColors) {
    let items: Vec<ListItem> = activity
        .iter()
        .map(|a| {
            let (icon, color) = match a.kind {
                ActivityKind::Tool => ("🔧", theme.primary),
                ActivityKind::Thought => ("💭", theme.accent),
            };
            ListItem::new(Line::from(vec![
                Span::styled(local_time(&a.timestamp, "%H:%M:%S"), Style::default().fg(theme.muted)),
                Span::styled(format!(" {icon} "), Style::default()),
                Span::styled(format!("{:<14}", a.source), Style::default().fg(color)),
                Span::styled(a.text.clone(), Style::default().fg(theme.text)),
            ]))
        })
        .collect();

    let title = if activity.is_empty() {
        "🧠 Agent activity (empty)".to_string()
    } else {
        format!("🧠 Agent activity ({})", activity.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.accent))
        .title(title);

    f.render_widget(List::new(items).block(block), area);
}
