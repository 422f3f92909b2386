use std::{cell::RefCell, sync::Arc};

use crossterm::event::{Event, KeyCode};
use ratatui::{
    Frame,
    layout::{Constraint, Rect},
    prelude::StatefulWidget,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, HighlightSpacing, Row, Table, TableState},
};

use rolodex::{role::Role, store::RecordStore};

use crate::{
    env::{WidgetCtx, WidgetId},
    help,
    widgets::{RecordsWidget, WidgetInner, theme::Theme},
};

/// First screen for role-gated entities: the session role is chosen here
/// and fixed for the records window it opens.
pub struct RolePicker {
    inner: WidgetInner,
    store: Arc<dyn RecordStore>,
    state: RefCell<TableState>,
}

impl RolePicker {
    const HELP: &'static [help::Entry<'static>] = &[
        help::Entry::new("↑/↓/j/k", "move", "Move selection"),
        help::Entry::new("⏎", "open", "Open records with the selected role"),
    ];

    pub fn new(store: Arc<dyn RecordStore>, parent: WidgetId) -> Self {
        Self {
            inner: WidgetInner::new::<Self>(parent),
            store,
            state: RefCell::new(TableState::default().with_selected(Some(0))),
        }
    }

    fn selected_role(&self) -> Option<Role> {
        self.state
            .borrow()
            .selected()
            .and_then(|index| Role::ALL.get(index).copied())
    }
}

impl crate::widgets::Widget for RolePicker {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn title(&self) -> Option<String> {
        Some(format!("{} · choose a role", self.store.schema().title))
    }

    fn help(&self) -> Option<&[help::Entry<'_>]> {
        Some(Self::HELP)
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(Line::styled(
                " Sign in as ",
                Style::default()
                    .fg(theme.accent())
                    .add_modifier(Modifier::BOLD),
            ))
            .border_style(Style::default().fg(theme.border()))
            .style(Style::default().bg(theme.panel_bg()).fg(theme.text()));

        let rows = Role::ALL.iter().map(|role| {
            Row::new(vec![
                Line::from(Span::styled(
                    role.label(),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::styled(role.description(), Style::default().fg(theme.text_muted())),
            ])
        });
        let table = Table::new(rows, [Constraint::Length(16), Constraint::Fill(1)])
            .block(block)
            .highlight_spacing(HighlightSpacing::Always)
            .highlight_symbol("> ")
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
            return false;
        };
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.state.borrow_mut().select_previous(),
            KeyCode::Down | KeyCode::Char('j') => {
                let mut state = self.state.borrow_mut();
                let next = state
                    .selected()
                    .map_or(0, |index| (index + 1).min(Role::ALL.len() - 1));
                state.select(Some(next));
            }
            KeyCode::Enter => {
                let Some(role) = self.selected_role() else {
                    return true;
                };
                tracing::info!(role = %role, "role_selected");
                ctx.push_widget(Box::new(RecordsWidget::new(
                    self.store.clone(),
                    Some(role),
                    self.inner.id(),
                )));
            }
            _ => return false,
        }
        ctx.invalidate();
        true
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyEvent, KeyModifiers};
    use rolodex::store::{SqliteStore, StoreConfig};

    use super::*;
    use crate::{
        env::{Env, Message},
        widgets::Widget,
    };

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn enter_opens_records_for_the_selected_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(
            StoreConfig::new(dir.path().join("roles.db")),
            &rolodex::entity::EMPLOYEE,
        )
        .unwrap();
        let picker = RolePicker::new(Arc::new(store), WidgetId::ROOT);
        let (env, mut rx) = Env::new();
        let ctx = env.ctx(picker.inner().id());

        assert!(picker.handle_event(ctx.clone(), &key(KeyCode::Down)));
        assert_eq!(picker.selected_role(), Some(Role::Manager));
        assert!(picker.handle_event(ctx, &key(KeyCode::Enter)));

        let pushed = std::iter::from_fn(|| rx.try_recv().ok())
            .find_map(|message| match message {
                Message::PushWidget(widget) => Some(widget),
                _ => None,
            })
            .expect("a records widget is pushed");
        assert_eq!(pushed.title().as_deref(), Some("Employees · Manager"));
    }
}
