use std::cell::RefCell;

use crossterm::event::{Event, KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
};

use rolodex::{
    entity::ColumnKind,
    form::{FormOutcome, RecordForm},
};

use crate::{
    env::{WidgetCtx, WidgetId},
    help,
    util::fill_bg,
    widgets::{Popup, WidgetInner, centered_rect, input::TextInput, theme::Theme},
};

const FIELD_HEIGHT: u16 = 3;

/// Popup editing one [`RecordForm`]. Nothing leaves the popup until the form
/// validates; the outcome is handed to `on_done` exactly once.
pub struct FormPopup {
    inner: WidgetInner,
    title: String,
    state: RefCell<FormState>,
    on_done: Box<dyn Fn(FormOutcome) + Send + 'static>,
}

struct FormState {
    form: RecordForm,
    inputs: Vec<TextInput>,
    focus: usize,
    scroll: usize,
    error: Option<String>,
}

impl FormState {
    fn set_focus(&mut self, index: usize) {
        if let Some(input) = self.inputs.get_mut(self.focus) {
            input.set_active(false);
        }
        self.focus = index.min(self.inputs.len().saturating_sub(1));
        if let Some(input) = self.inputs.get_mut(self.focus) {
            input.set_active(true);
        }
    }

    fn next(&mut self) {
        let next = (self.focus + 1) % self.inputs.len().max(1);
        self.set_focus(next);
    }

    fn previous(&mut self) {
        let len = self.inputs.len().max(1);
        self.set_focus((self.focus + len - 1) % len);
    }

    fn is_last(&self) -> bool {
        self.focus + 1 >= self.inputs.len()
    }

    /// Keeps the focused field inside a viewport of `visible` fields.
    fn scroll_to_focus(&mut self, visible: usize) {
        let visible = visible.max(1);
        if self.focus < self.scroll {
            self.scroll = self.focus;
        } else if self.focus >= self.scroll + visible {
            self.scroll = self.focus + 1 - visible;
        }
    }
}

impl FormPopup {
    const HELP: &'static [help::Entry<'static>] = &[
        help::Entry::new("tab/shift+tab", "move", "Next/previous field"),
        help::Entry::new("^s", "save", "Save the record"),
        help::Entry::new("⏎", "next/save", "Next field, save on the last one"),
        help::Entry::new("^u", "clear", "Clear the field"),
        help::Entry::new("esc", "cancel", "Discard changes"),
    ];

    pub fn new(
        form: RecordForm,
        on_done: impl Fn(FormOutcome) + Send + 'static,
        parent: WidgetId,
    ) -> Self {
        let schema = form.schema();
        let verb = if form.is_edit() { "Edit" } else { "New" };
        let title = format!("{verb} {}", schema.entity);
        let inputs = form
            .fields()
            .iter()
            .map(|field| {
                let placeholder = match (field.kind, field.required) {
                    (ColumnKind::Date, _) => "YYYY-MM-DD",
                    (ColumnKind::Text, true) => "(required)",
                    (ColumnKind::Text, false) => "",
                };
                TextInput::new(field.label, field.text.clone()).with_placeholder(placeholder)
            })
            .collect();
        let mut state = FormState {
            form,
            inputs,
            focus: 0,
            scroll: 0,
            error: None,
        };
        state.set_focus(0);
        Self {
            inner: WidgetInner::new::<Self>(parent),
            title,
            state: RefCell::new(state),
            on_done: Box::new(on_done),
        }
    }

    fn save(&self, ctx: &WidgetCtx) {
        let result = {
            let mut state = self.state.borrow_mut();
            let texts: Vec<String> = state
                .inputs
                .iter()
                .map(|input| input.value().to_string())
                .collect();
            for (index, text) in texts.into_iter().enumerate() {
                state.form.set_text(index, text);
            }
            state.form.confirm()
        };
        match result {
            Ok(record) => {
                (self.on_done)(FormOutcome::Submitted(record));
                ctx.dismiss_popup();
            }
            Err(err) => {
                tracing::debug!(field = err.field(), error = %err, "form_invalid");
                let mut state = self.state.borrow_mut();
                state.error = Some(err.to_string());
                state.set_focus(err.field());
            }
        }
        ctx.invalidate();
    }

    fn cancel(&self, ctx: &WidgetCtx) {
        (self.on_done)(FormOutcome::Cancelled);
        ctx.dismiss_popup();
        ctx.invalidate();
    }
}

impl crate::widgets::Widget for FormPopup {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn help(&self) -> Option<&[help::Entry<'_>]> {
        Some(Self::HELP)
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        fill_bg(frame.buffer_mut(), area, theme.panel_bg());
        let title = Line::from(vec![
            Span::raw(" "),
            Span::styled(
                self.title.as_str(),
                Style::default()
                    .fg(theme.accent())
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
        ])
        .centered();
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(Style::default().fg(theme.border()))
            .style(Style::default().bg(theme.panel_bg()).fg(theme.text()));
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area).inner(Margin::new(1, 0));
        let [fields_area, status_area] =
            inner.layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]));

        let mut state = self.state.borrow_mut();
        let visible = (fields_area.height / FIELD_HEIGHT) as usize;
        state.scroll_to_focus(visible);
        let rows = Layout::vertical(vec![Constraint::Length(FIELD_HEIGHT); visible.max(1)])
            .split(fields_area);
        for (input, row) in state.inputs.iter().skip(state.scroll).zip(rows.iter()) {
            input.render(frame, *row, theme);
        }

        let status = match state.error.as_ref() {
            Some(error) => Line::styled(error.as_str(), Style::default().fg(theme.error())),
            None => Line::styled(
                format!("field {} of {}", state.focus + 1, state.inputs.len()),
                Style::default().fg(theme.text_muted()),
            ),
        };
        frame.render_widget(Paragraph::new(status), status_area);
    }

    fn handle_event(&self, ctx: WidgetCtx, event: &Event) -> bool {
        let Some(key) = event.as_key_press_event() else {
            return true;
        };

        let on_last = self.state.borrow().is_last();
        match key.code {
            KeyCode::Esc => {
                self.cancel(&ctx);
                return true;
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.save(&ctx);
                return true;
            }
            KeyCode::Enter if on_last => {
                self.save(&ctx);
                return true;
            }
            KeyCode::Tab | KeyCode::Down | KeyCode::Enter => self.state.borrow_mut().next(),
            KeyCode::BackTab | KeyCode::Up => self.state.borrow_mut().previous(),
            _ => {
                let mut state = self.state.borrow_mut();
                let focus = state.focus;
                let consumed = state
                    .inputs
                    .get_mut(focus)
                    .is_some_and(|input| input.handle_event(event).consumed());
                if consumed {
                    state.error = None;
                }
            }
        }
        ctx.invalidate();
        true
    }
}

impl Popup for FormPopup {
    fn rect(&self, area: Rect) -> Rect {
        let fields = self.state.borrow().inputs.len() as u16;
        let rect = centered_rect(area, 0.6, 0.8, 48, 10);
        let wanted = fields * FIELD_HEIGHT + 3;
        let height = rect.height.min(wanted);
        Rect {
            y: area.y + (area.height.saturating_sub(height)) / 2,
            height,
            ..rect
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use crossterm::event::KeyEvent;
    use rolodex::entity::ITEM;

    use super::*;
    use crate::{env::Env, widgets::Widget};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn popup() -> (FormPopup, Arc<Mutex<Vec<FormOutcome>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let form = RecordForm::open(&ITEM, None, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let popup = FormPopup::new(
            form,
            move |outcome| sink.lock().unwrap().push(outcome),
            WidgetId::ROOT,
        );
        (popup, outcomes)
    }

    #[test]
    fn missing_required_field_keeps_the_popup_open() {
        let (popup, outcomes) = popup();
        let (env, _rx) = Env::new();
        let ctx = env.ctx(popup.inner().id());
        popup.handle_event(ctx.clone(), &key(KeyCode::Char('L'), KeyModifiers::NONE));
        popup.handle_event(ctx, &key(KeyCode::Char('s'), KeyModifiers::CONTROL));
        assert!(outcomes.lock().unwrap().is_empty());
        let state = popup.state.borrow();
        assert_eq!(state.focus, 1);
        assert!(state.error.as_deref().unwrap_or_default().contains("Description"));
    }

    #[test]
    fn enter_on_last_field_submits() {
        let (popup, outcomes) = popup();
        let (env, _rx) = Env::new();
        let ctx = env.ctx(popup.inner().id());
        for code in [
            KeyCode::Char('L'),
            KeyCode::Enter,
            KeyCode::Char('D'),
            KeyCode::Enter,
        ] {
            popup.handle_event(ctx.clone(), &key(code, KeyModifiers::NONE));
        }
        let outcomes = outcomes.lock().unwrap();
        let [FormOutcome::Submitted(record)] = outcomes.as_slice() else {
            panic!("expected one submitted record, got {outcomes:?}");
        };
        assert_eq!(record.text(0), "L");
        assert_eq!(record.text(1), "D");
    }

    #[test]
    fn escape_cancels() {
        let (popup, outcomes) = popup();
        let (env, _rx) = Env::new();
        popup.handle_event(
            env.ctx(popup.inner().id()),
            &key(KeyCode::Esc, KeyModifiers::NONE),
        );
        assert_eq!(*outcomes.lock().unwrap(), vec![FormOutcome::Cancelled]);
    }
}
