use crossterm::event::{Event, KeyCode};
use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Padding, Row, Table},
};

use crate::{
    env::{WidgetCtx, WidgetId},
    help::Entry,
    util::{fill_bg, pad},
    widgets::{Popup, WidgetInner, centered_rect, theme::Theme},
};

/// Popup listing every binding of the active widget with its long
/// description.
pub struct Widget {
    inner: WidgetInner,
    entries: Vec<Entry<'static>>,
}

impl Widget {
    const HELP: &'static [Entry<'static>] = &[Entry::new("h/esc", "close", "Close help")];

    pub fn new(entries: &[&Entry<'_>], parent: WidgetId) -> Self {
        Self {
            inner: WidgetInner::new::<Self>(parent),
            entries: entries.iter().map(|entry| entry.to_owned_entry()).collect(),
        }
    }
}

impl crate::widgets::Widget for Widget {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn help(&self) -> Option<&[Entry<'_>]> {
        Some(Self::HELP)
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        fill_bg(frame.buffer_mut(), area, theme.panel_bg());
        let title = Line::styled(
            pad("Help", 2),
            Style::default()
                .fg(theme.accent())
                .add_modifier(Modifier::BOLD),
        )
        .centered();
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(Style::default().fg(theme.border()))
            .style(Style::default().bg(theme.panel_bg()).fg(theme.text()))
            .padding(Padding::new(2, 2, 1, 1));

        let key_style = Style::default()
            .fg(theme.accent_alt())
            .add_modifier(Modifier::BOLD);
        let desc_style = Style::default().fg(theme.text());
        let cells = |entry: Option<&Entry<'static>>| {
            let key = entry
                .map(|e| Span::styled(format!("[{}]", e.keys), key_style))
                .unwrap_or_default();
            let desc = entry
                .map(|e| Span::styled(e.long.to_string(), desc_style))
                .unwrap_or_default();
            [Line::from(key), Line::from(desc)]
        };
        let rows: Vec<_> = self
            .entries
            .chunks(2)
            .map(|chunk| {
                let [left_key, left_desc] = cells(chunk.first());
                let [right_key, right_desc] = cells(chunk.get(1));
                Row::new(vec![left_key, left_desc, right_key, right_desc])
            })
            .collect();

        let widths = [
            Constraint::Length(12),
            Constraint::Fill(1),
            Constraint::Length(12),
            Constraint::Fill(1),
        ];
        let table = Table::new(rows, widths)
            .block(block)
            .style(Style::default().fg(theme.text()));
        frame.render_widget(table, area);
    }

    fn handle_event(&self, ctx: WidgetCtx, event: &Event) -> bool {
        if let Some(key) = event.as_key_press_event()
            && matches!(key.code, KeyCode::Char('h') | KeyCode::Esc)
        {
            ctx.dismiss_popup();
            ctx.invalidate();
        }
        true
    }
}

impl Popup for Widget {
    fn rect(&self, area: Rect) -> Rect {
        centered_rect(area, 0.6, 0.5, 60, 10)
    }
}
