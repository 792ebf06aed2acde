use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthStr;

use common::CallRecord;

use crate::cmd::stats::render_call;

use super::ThemeColors;

/// Popup centered horizontally and placed a third of the way down.
fn popup_rect(area: Rect, text: &str, max_width: u16) -> Rect {
    let widest = text.lines().map(|l| l.width()).max().unwrap_or(0) as u16;
    let width = (widest + 4).min(max_width).min(area.width);
    let inner = width.saturating_sub(2).max(1);
    let rows: u16 = text.lines().map(|l| (l.width() as u16).max(1).div_ceil(inner)).sum();
    let height = (rows + 2).min(area.height);
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 3,
        width,
        height,
    }
}

pub fn draw_overlay(f: &mut ratatui::Frame<'_>, area: Rect, text: &str, theme: &ThemeColors) {
    let popup = popup_rect(area, text, 64);
    f.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Thick)
        .border_style(Style::default().fg(theme.primary))
        .style(Style::default().bg(theme.surface));

    let content = Paragraph::new(text)
        .style(Style::default().fg(theme.text))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(block);

    f.render_widget(content, popup);
}

pub fn draw_detail(f: &mut ratatui::Frame<'_>, area: Rect, call: &CallRecord, theme: &ThemeColors) {
    let text = render_call(call);
    let popup = popup_rect(area, &text, area.width.saturating_sub(8).max(20));
    f.render_widget(Clear, popup);

    let lines: Vec<Line> = text
        .lines()
        .map(|l| match l.split_once(' ') {
            Some((label, rest)) if !l.starts_with(' ') => Line::from(vec![
                Span::styled(label.to_string(), Style::default().fg(theme.muted)),
                Span::styled(format!(" {rest}"), Style::default().fg(theme.text)),
            ]),
            _ => Line::from(Span::styled(l.to_string(), Style::default().fg(theme.text))),
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.status(call.status)))
        .title(format!(" Call {} ", call.id))
        .title_style(Style::default().fg(theme.text).add_modifier(Modifier::BOLD))
        .style(Style::default().bg(theme.surface));

    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }).block(block), popup);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_fits_inside_area() {
        let area = Rect::new(0, 0, 40, 10);
        let text = "a".repeat(200);
        let r = popup_rect(area, &text, 64);
        assert!(r.width <= area.width);
        assert!(r.height <= area.height);
        assert!(r.x + r.width <= area.width);

        let small = popup_rect(Rect::new(0, 0, 100, 30), "Activity log cleared", 64);
        assert_eq!(small.width, 24);
        assert_eq!(small.height, 3);
    }
}
