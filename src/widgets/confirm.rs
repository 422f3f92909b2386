use std::cell::Cell;

use crossterm::event::{Event, KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, BorderType, Paragraph, Wrap},
};

use crate::{
    env::{WidgetCtx, WidgetId},
    help,
    util::{fill_bg, pad},
    widgets::{Popup, WidgetInner, centered_rect, theme::Theme},
};

/// Yes/no prompt. `on_decision` runs exactly once, with `true` only when the
/// user explicitly picked the confirm button or pressed the hotkey.
pub struct ConfirmPopup {
    inner: WidgetInner,
    title: String,
    message: String,
    confirm_label: String,
    cancel_label: String,
    on_decision: Box<dyn Fn(bool) + Send + 'static>,
    selection: Cell<Selection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Selection {
    Confirm,
    Cancel,
}

impl ConfirmPopup {
    const HELP: &'static [help::Entry<'static>] = &[
        help::Entry::new("tab/←/→", "move", "Move between buttons"),
        help::Entry::new("⏎", "select", "Select button"),
        help::Entry::new("^d/y", "delete", "Confirm deletion"),
        help::Entry::new("esc/n", "cancel", "Keep the record"),
    ];

    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        confirm_label: impl Into<String>,
        cancel_label: impl Into<String>,
        on_decision: impl Fn(bool) + Send + 'static,
        parent: WidgetId,
    ) -> Self {
        Self {
            inner: WidgetInner::new::<Self>(parent),
            title: title.into(),
            message: message.into(),
            confirm_label: confirm_label.into(),
            cancel_label: cancel_label.into(),
            on_decision: Box::new(on_decision),
            selection: Cell::new(Selection::Cancel),
        }
    }

    fn decide(&self, ctx: &WidgetCtx, confirmed: bool) {
        (self.on_decision)(confirmed);
        ctx.dismiss_popup();
        ctx.invalidate();
    }
}

impl crate::widgets::Widget for ConfirmPopup {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn help(&self) -> Option<&[help::Entry<'_>]> {
        Some(Self::HELP)
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        fill_bg(frame.buffer_mut(), area, theme.panel_bg());
        let title = Line::styled(
            pad(self.title.as_str(), 1),
            Style::default()
                .fg(theme.error())
                .add_modifier(Modifier::BOLD),
        )
        .centered();
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(Style::default().fg(theme.error()))
            .style(Style::default().bg(theme.panel_bg()).fg(theme.text()));

        frame.render_widget(block.clone(), area);
        let inner = block.inner(area).inner(Margin::new(1, 1));
        let [body_area, buttons_area] =
            inner.layout(&Layout::vertical([Constraint::Min(1), Constraint::Length(1)]));

        let lines: Vec<Line> = self
            .message
            .lines()
            .map(|line| Line::from(Span::styled(line, Style::default().fg(theme.text()))))
            .collect();
        let body = Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(body, body_area);

        let confirm_style = if self.selection.get() == Selection::Confirm {
            Style::default()
                .bg(theme.error())
                .fg(theme.selection_fg())
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(theme.error())
                .add_modifier(Modifier::BOLD)
        };
        let cancel_style = if self.selection.get() == Selection::Cancel {
            Style::default()
                .bg(theme.selection_bg())
                .fg(theme.selection_fg())
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text())
        };
        let buttons = Line::from(vec![
            Span::styled(format!("[ {} ]", self.confirm_label), confirm_style),
            Span::raw("  "),
            Span::styled(format!("[ {} ]", self.cancel_label), cancel_style),
        ]);
        frame.render_widget(
            Paragraph::new(buttons).alignment(Alignment::Center),
            buttons_area,
        );
    }

    fn handle_event(&self, ctx: WidgetCtx, event: &Event) -> bool {
        let Some(key) = event.as_key_press_event() else {
            return true;
        };

        match key.code {
            KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.decide(&ctx, true);
            }
            KeyCode::Char('y') => self.decide(&ctx, true),
            KeyCode::Char('n') | KeyCode::Esc => self.decide(&ctx, false),
            KeyCode::Enter => {
                let confirmed = self.selection.get() == Selection::Confirm;
                self.decide(&ctx, confirmed);
            }
            KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
                let next = match self.selection.get() {
                    Selection::Confirm => Selection::Cancel,
                    Selection::Cancel => Selection::Confirm,
                };
                self.selection.set(next);
                ctx.invalidate();
            }
            _ => {}
        }
        true
    }
}

impl Popup for ConfirmPopup {
    fn rect(&self, area: Rect) -> Rect {
        centered_rect(area, 0.4, 0.18, 34, 7)
    }
}
