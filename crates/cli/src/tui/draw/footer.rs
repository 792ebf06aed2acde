use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::ThemeColors;

const SHORTCUTS: [(&str, &str); 9] = [
    ("Tab/1-4", "Navigate"),
    ("↑↓", "Select"),
    ("Enter", "Details"),
    ("b/p", "Block/Pass"),
    ("r", "Reload"),
    ("R", "Reconnect"),
    ("c", "Clear activity"),
    ("/", "Filter"),
    ("q", "Quit"),
];

pub fn draw_footer(f: &mut ratatui::Frame<'_>, area: Rect, theme: &ThemeColors) {
    let help_text: Vec<Span> = SHORTCUTS
        .iter()
        .enumerate()
        .flat_map(|(i, (key, desc))| {
            let mut spans = vec![
                Span::styled(key.to_string(), Style::default().fg(theme.primary).add_modifier(Modifier::BOLD)),
                Span::styled(format!(" {desc}"), Style::default().fg(theme.muted)),
            ];
            if i < SHORTCUTS.len() - 1 {
                spans.push(Span::styled("  │  ", Style::default().fg(theme.muted)));
            }
            spans
        })
        .collect();

    let footer_block = Block::default().borders(Borders::TOP).border_style(Style::default().fg(theme.muted));

    let footer_para = Paragraph::new(Line::from(help_text))
        .alignment(Alignment::Center)
        .block(footer_block)
        .wrap(Wrap { trim: true });

    f.render_widget(footer_para, area);
}
