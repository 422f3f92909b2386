use std::cell::RefCell;

use crossterm::event::{Event, KeyCode};
use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    prelude::StatefulWidget,
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, BorderType, HighlightSpacing, Row, Table, TableState},
};

use rolodex::query::CategoryFilter;

use crate::{
    env::{WidgetCtx, WidgetId},
    help,
    widgets::{Popup, WidgetInner, centered_rect, theme::Theme},
};

/// Lists "all" followed by every distinct category value.
pub struct CategoryPicker {
    inner: WidgetInner,
    title: String,
    options: Vec<CategoryFilter>,
    state: RefCell<TableState>,
    on_select: Box<dyn Fn(CategoryFilter) + Send + 'static>,
}

impl CategoryPicker {
    const HELP: &'static [help::Entry<'static>] = &[
        help::Entry::new("↑/↓/j/k", "move", "Move selection"),
        help::Entry::new("⏎", "select", "Filter by category"),
        help::Entry::new("esc", "close", "Close picker"),
    ];

    pub fn new(
        title: impl Into<String>,
        categories: &[String],
        current: &CategoryFilter,
        on_select: impl Fn(CategoryFilter) + Send + 'static,
        parent: WidgetId,
    ) -> Self {
        let options: Vec<CategoryFilter> = std::iter::once(CategoryFilter::All)
            .chain(categories.iter().cloned().map(CategoryFilter::Exact))
            .collect();
        let mut state = TableState::default();
        state.select(Some(
            options
                .iter()
                .position(|option| option == current)
                .unwrap_or(0),
        ));
        Self {
            inner: WidgetInner::new::<Self>(parent),
            title: title.into(),
            options,
            state: RefCell::new(state),
            on_select: Box::new(on_select),
        }
    }
}

impl crate::widgets::Widget for CategoryPicker {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn help(&self) -> Option<&[help::Entry<'_>]> {
        Some(Self::HELP)
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(Line::styled(
                format!(" {} ", self.title),
                Style::default()
                    .fg(theme.accent())
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(Style::default().fg(theme.border()))
            .style(Style::default().bg(theme.panel_bg()).fg(theme.text()));

        let rows = self.options.iter().map(|option| match option {
            CategoryFilter::All => Row::new(vec![Line::styled(
                "(all)",
                Style::default().fg(theme.text_muted()),
            )]),
            CategoryFilter::Exact(value) if value.is_empty() => Row::new(vec![Line::styled(
                "(empty)",
                Style::default().fg(theme.text_muted()),
            )]),
            CategoryFilter::Exact(value) => Row::new(vec![Line::from(value.as_str())]),
        });

        let table = Table::new(rows, [Constraint::Fill(1)])
            .block(block)
            .highlight_spacing(HighlightSpacing::Always)
            .highlight_symbol(">")
            .row_highlight_style(
                Style::default()
                    .bg(theme.selection_bg())
                    .fg(theme.selection_fg()),
            );

        let mut state = self.state.borrow_mut();
        StatefulWidget::render(table, area, frame.buffer_mut(), &mut state);
    }

    fn handle_event(&self, ctx: WidgetCtx, event: &Event) -> bool {
        let Some(key) = event.as_key_press_event() else {
            return true;
        };

        match key.code {
            KeyCode::Esc => {
                ctx.dismiss_popup();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.state.borrow_mut().select_previous();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let mut state = self.state.borrow_mut();
                let next = state
                    .selected()
                    .map_or(0, |index| (index + 1).min(self.options.len() - 1));
                state.select(Some(next));
            }
            KeyCode::Home => self.state.borrow_mut().select_first(),
            KeyCode::End => {
                self.state
                    .borrow_mut()
                    .select(Some(self.options.len() - 1));
            }
            KeyCode::Enter => {
                let selected = self.state.borrow().selected();
                if let Some(option) = selected.and_then(|index| self.options.get(index)) {
                    (self.on_select)(option.clone());
                }
                ctx.dismiss_popup();
            }
            _ => return true,
        }
        ctx.invalidate();
        true
    }
}

impl Popup for CategoryPicker {
    fn rect(&self, area: Rect) -> Rect {
        let wanted = (self.options.len() as u16).saturating_add(2);
        let rect = centered_rect(area, 0.4, 0.6, 32, 6);
        let height = rect.height.min(wanted.max(6));
        Rect {
            y: area.y + (area.height.saturating_sub(height)) / 2,
            height,
            ..rect
        }
    }
}
