use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    text::Span,
    widgets::{Block, BorderType, Borders, Cell, Row, Table, TableState},
};

use common::CallRecord;

use crate::cmd::util::{format_duration, local_time};

use super::ThemeColors;

pub fn draw_calls(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    calls: &[&CallRecord],
    total: usize,
    filter: Option<&str>,
    table_state: &mut TableState,
    theme: &ThemeColors,
) {
    let header = Row::new(vec!["Time", "Caller", "Status", "Score", "Intent", "Duration", "Summary"])
        .style(Style::default().fg(theme.primary).add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let rows: Vec<Row> = calls
        .iter()
        .map(|c| {
            let caller = match &c.caller_name {
                Some(name) => format!("{} ({name})", c.caller_number),
                None => c.caller_number.clone(),
            };
            Row::new(vec![
                Cell::from(local_time(&c.created_at, "%m-%d %H:%M:%S")),
                Cell::from(caller),
                Cell::from(Span::styled(c.status.as_str(), Style::default().fg(theme.status(c.status)))),
                Cell::from(Span::styled(format!("{:.2}", c.scam_score), Style::default().fg(theme.score(c.scam_score)))),
                Cell::from(c.intent.clone()),
                Cell::from(format_duration(c.duration)),
                Cell::from(c.summary.clone().unwrap_or_default()),
            ])
            .style(Style::default().fg(theme.text))
        })
        .collect();

    let title = match filter {
        Some(f) => format!("📞 Calls ({}/{total}) 🔍 '{f}'", calls.len()),
        None => format!("📞 Calls ({total})"),
    };

    let widths = [
        Constraint::Length(15),
        Constraint::Length(24),
        Constraint::Length(10),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(9),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.primary))
                .title(title),
        )
        .highlight_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, table_state);
}
