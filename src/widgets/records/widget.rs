use std::{
    cell::{Cell, RefCell},
    sync::Arc,
    time::Duration,
};

use chrono::{Local, NaiveDate};
use crossterm::event::{Event, KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, HighlightSpacing, Row, StatefulWidget, Table, TableState},
};
use unicode_width::UnicodeWidthStr;

use rolodex::{
    Error,
    form::{FormOutcome, RecordForm},
    query::CategoryFilter,
    record::RecordId,
    role::{Operation, Role},
    store::{RecordStore, StoreError, StoreOp},
    table::{DeleteTarget, Mutation, Phase, RecordTable, ReloadRequest, Snapshot},
};

use super::{category_picker::CategoryPicker, form::FormPopup};
use crate::{
    env::{AppEvent, Toast, ToastKind, WidgetCtx, WidgetId},
    help,
    util::{pad, truncate},
    widgets::{
        WidgetInner,
        confirm::ConfirmPopup,
        error::ErrorPopup,
        input::{Handled, TextInput},
        theme::Theme,
    },
};

const MAX_CELL_WIDTH: usize = 40;

/// Browses one entity table: search-as-you-type on the name column, an
/// optional category filter and role-gated create, edit and delete.
pub struct RecordsWidget {
    inner: WidgetInner,
    store: Arc<dyn RecordStore>,
    state: RefCell<RecordsState>,
    page_size: Cell<usize>,
    help_entries: Vec<help::Entry<'static>>,
}

struct RecordsState {
    table: RecordTable,
    search: TextInput,
    error: Option<String>,
}

struct ReloadEvent {
    id: u64,
    result: rolodex::Result<Snapshot>,
}

struct EditFormEvent {
    result: rolodex::Result<RecordForm>,
}

struct FormDone {
    outcome: FormOutcome,
}

struct DeleteDecision {
    target: DeleteTarget,
    confirmed: bool,
}

struct CategoryChosen {
    category: CategoryFilter,
}

struct MutationEvent {
    operation: Operation,
    result: rolodex::Result<Option<RecordId>>,
}

fn success_message(operation: Operation) -> &'static str {
    match operation {
        Operation::Create => "Record created",
        Operation::Edit => "Record updated",
        Operation::Delete => "Record deleted",
        Operation::View => "Records loaded",
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn join_store<E, F, G>(
    store: Arc<dyn RecordStore>,
    operation: StoreOp,
    job: F,
    failed: G,
) -> E
where
    E: Send + 'static,
    F: FnOnce(&dyn RecordStore) -> E + Send + 'static,
    G: FnOnce(Error) -> E,
{
    match tokio::task::spawn_blocking(move || job(store.as_ref())).await {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(%operation, error = %err, "store_task_failed");
            failed(Error::Store(StoreError::Shape {
                operation,
                reason: format!("background task failed: {err}"),
            }))
        }
    }
}

impl RecordsWidget {
    const HELP_SEARCH: &'static [help::Entry<'static>] = &[
        help::Entry::new("⏎", "done", "Keep the search and return to the table"),
        help::Entry::new("esc", "clear", "Clear the search"),
        help::Entry::new("^u", "erase", "Erase the search text"),
    ];

    pub fn new(store: Arc<dyn RecordStore>, role: Option<Role>, parent: WidgetId) -> Self {
        let schema = store.schema();
        let table = RecordTable::new(schema, role);

        let mut help_entries = vec![
            help::Entry::new("/", "search", "Search by name"),
            help::Entry::new("↑/↓/j/k", "move", "Move selection"),
        ];
        if schema.category_column.is_some() {
            help_entries.push(help::Entry::new("c", "category", "Filter by category"));
        }
        if table.can(Operation::Create) {
            help_entries.push(help::Entry::new("n", "new", "Create a record"));
        }
        if table.can(Operation::Edit) {
            help_entries.push(help::Entry::new("e/⏎", "edit", "Edit the selected record"));
        }
        if table.can(Operation::Delete) {
            help_entries.push(help::Entry::new("^d", "delete", "Delete the selected record"));
        }
        help_entries.push(help::Entry::new("r", "reload", "Reload records"));

        let search = TextInput::new(
            format!("Search {}", schema.name_column().label.to_lowercase()),
            "",
        );
        Self {
            inner: WidgetInner::new::<Self>(parent),
            store,
            state: RefCell::new(RecordsState {
                table,
                search,
                error: None,
            }),
            page_size: Cell::new(10),
            help_entries,
        }
    }

    /// Runs `job` against the store on the blocking pool and hands its
    /// result back to this widget as an event. A job that dies is reported
    /// through `failed`, so the table never stays busy waiting for it.
    fn run_store<E, F, G>(&self, ctx: &WidgetCtx, operation: StoreOp, job: F, failed: G)
    where
        E: Send + 'static,
        F: FnOnce(&dyn RecordStore) -> E + Send + 'static,
        G: FnOnce(Error) -> E + Send + 'static,
    {
        let store = self.store.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let event = join_store(store, operation, job, failed).await;
            ctx.emit_self(event);
        });
    }

    fn reload(&self, ctx: &WidgetCtx) {
        let request = self.state.borrow_mut().table.request_reload();
        match request {
            Ok(request) => self.spawn_reload(ctx, request),
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn spawn_reload(&self, ctx: &WidgetCtx, request: ReloadRequest) {
        ctx.invalidate();
        let id = request.id;
        self.run_store(
            ctx,
            StoreOp::List,
            move |store| ReloadEvent {
                id,
                result: request.run(store),
            },
            move |err| ReloadEvent {
                id,
                result: Err(err),
            },
        );
    }

    fn add(&self, ctx: &WidgetCtx) {
        let form = self.state.borrow().table.begin_add(today());
        match form {
            Ok(form) => self.open_form(ctx, form),
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn edit(&self, ctx: &WidgetCtx) {
        let request = self.state.borrow().table.begin_edit();
        match request {
            Ok(request) => {
                let today = today();
                self.run_store(
                    ctx,
                    StoreOp::Get,
                    move |store| EditFormEvent {
                        result: request.resolve(store, today),
                    },
                    |err| EditFormEvent { result: Err(err) },
                );
            }
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn open_form(&self, ctx: &WidgetCtx, form: RecordForm) {
        let ctx_for_form = ctx.clone();
        ctx.set_popup(Box::new(FormPopup::new(
            form,
            move |outcome| ctx_for_form.emit_self(FormDone { outcome }),
            self.inner.id(),
        )));
    }

    fn confirm_delete(&self, ctx: &WidgetCtx) {
        let target = self.state.borrow().table.begin_delete();
        let target = match target {
            Ok(target) => target,
            Err(err) => {
                self.show_error(ctx, &err);
                return;
            }
        };
        let message = format!("Delete {}?\nThis cannot be undone.", target.summary);
        let ctx_for_delete = ctx.clone();
        ctx.set_popup(Box::new(ConfirmPopup::new(
            "Delete record",
            message,
            "Delete",
            "Keep",
            move |confirmed| {
                ctx_for_delete.emit_self(DeleteDecision {
                    target: target.clone(),
                    confirmed,
                });
            },
            self.inner.id(),
        )));
    }

    fn show_category_picker(&self, ctx: &WidgetCtx) {
        let state = self.state.borrow();
        let Some(column) = state.table.schema().category_column() else {
            return;
        };
        let ctx_for_select = ctx.clone();
        ctx.set_popup(Box::new(CategoryPicker::new(
            column.label,
            state.table.categories(),
            &state.table.filter().category,
            move |category| ctx_for_select.emit_self(CategoryChosen { category }),
            self.inner.id(),
        )));
    }

    fn apply(&self, ctx: &WidgetCtx, mutation: Mutation) {
        let operation = mutation.operation();
        ctx.invalidate();
        let store_op = match operation {
            Operation::Create => StoreOp::Create,
            Operation::Edit => StoreOp::Update,
            Operation::Delete => StoreOp::Delete,
            Operation::View => StoreOp::List,
        };
        self.run_store(
            ctx,
            store_op,
            move |store| MutationEvent {
                operation,
                result: mutation.apply(store),
            },
            move |err| MutationEvent {
                operation,
                result: Err(err),
            },
        );
    }

    /// Warnings become toasts. Store failures open a popup while there is
    /// nothing on screen and a toast otherwise.
    fn show_error(&self, ctx: &WidgetCtx, err: &Error) {
        let message = err.to_string();
        if err.is_warning() {
            ctx.show_toast(Toast {
                message,
                kind: ToastKind::Warning,
                duration: Duration::from_secs(3),
            });
            return;
        }
        let is_empty = {
            let mut state = self.state.borrow_mut();
            state.error = Some(message.clone());
            state.table.records().is_empty()
        };
        if is_empty {
            ctx.set_popup(Box::new(ErrorPopup::new("Error", message, self.inner.id())));
        } else {
            ctx.show_toast(Toast {
                message,
                kind: ToastKind::Error,
                duration: Duration::from_secs(4),
            });
        }
        ctx.invalidate();
    }

    fn handle_search_key(&self, ctx: &WidgetCtx, event: &Event, code: KeyCode) -> bool {
        match code {
            KeyCode::Enter => {
                self.state.borrow_mut().search.set_active(false);
            }
            KeyCode::Esc => {
                {
                    let mut state = self.state.borrow_mut();
                    state.search.clear();
                    state.search.set_active(false);
                    state.table.set_name_filter("");
                }
                self.reload(ctx);
            }
            _ => {
                let changed = {
                    let mut state = self.state.borrow_mut();
                    let handled = state.search.handle_event(event);
                    if handled == Handled::Changed {
                        let text = state.search.value().to_string();
                        state.table.set_name_filter(text);
                    }
                    handled
                };
                match changed {
                    Handled::Changed => self.reload(ctx),
                    Handled::Moved => {}
                    Handled::No => return false,
                }
            }
        }
        ctx.invalidate();
        true
    }

    fn move_selection(&self, delta: isize) {
        let mut state = self.state.borrow_mut();
        let current = state.table.selected().unwrap_or(0);
        let target = current.saturating_add_signed(delta);
        state.table.select(Some(target));
    }

    fn on_reload(&self, ctx: &WidgetCtx, event: ReloadEvent) {
        let result = self
            .state
            .borrow_mut()
            .table
            .finish_reload(event.id, event.result);
        match result {
            Ok(true) => self.state.borrow_mut().error = None,
            Ok(false) => {}
            Err(err) => self.show_error(ctx, &err),
        }
        ctx.invalidate();
    }

    fn on_form_done(&self, ctx: &WidgetCtx, event: FormDone) {
        let submitted = self.state.borrow_mut().table.submit(event.outcome);
        match submitted {
            Ok(Some(mutation)) => self.apply(ctx, mutation),
            Ok(None) => {}
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn on_delete_decision(&self, ctx: &WidgetCtx, event: DeleteDecision) {
        let decided = self
            .state
            .borrow_mut()
            .table
            .confirm_delete(event.target, event.confirmed);
        match decided {
            Ok(Some(mutation)) => self.apply(ctx, mutation),
            Ok(None) => {}
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn on_mutation(&self, ctx: &WidgetCtx, event: MutationEvent) {
        let finished = self.state.borrow_mut().table.finish_mutation(event.result);
        match finished {
            Ok(request) => {
                ctx.show_toast(Toast {
                    message: success_message(event.operation).to_string(),
                    kind: ToastKind::Info,
                    duration: Duration::from_secs(3),
                });
                self.spawn_reload(ctx, request);
            }
            Err(err) => self.show_error(ctx, &err),
        }
    }

    fn title_line(&self, state: &RecordsState, theme: &Theme) -> Line<'static> {
        let (title, style) = match (state.table.phase(), state.error.as_ref()) {
            (Phase::Reloading, _) => ("Loading".to_string(), Style::default().fg(theme.warning())),
            (Phase::Mutating, _) => ("Saving".to_string(), Style::default().fg(theme.warning())),
            (Phase::Idle, Some(_)) => ("Error".to_string(), Style::default().fg(theme.error())),
            (Phase::Idle, None) => (
                state.table.schema().title.to_string(),
                Style::default()
                    .fg(theme.text())
                    .add_modifier(Modifier::BOLD),
            ),
        };
        Line::styled(pad(title, 1), style)
    }

    fn footer_line(&self, state: &RecordsState, theme: &Theme) -> Line<'static> {
        let table = &state.table;
        let mut parts = vec![format!("{} records", table.records().len())];
        if let Some(column) = table.schema().category_column() {
            parts.push(format!(
                "{}: {}",
                column.label.to_lowercase(),
                table.filter().category.label()
            ));
        }
        let role = match table.role() {
            Some(role) if table.schema().role_gated => role.label(),
            _ => "unrestricted",
        };
        Line::from(vec![
            Span::styled(
                pad(parts.join(" · "), 1),
                Style::default().fg(theme.text_muted()),
            ),
            Span::styled(
                pad(role, 1),
                Style::default()
                    .fg(theme.accent_alt())
                    .add_modifier(Modifier::BOLD),
            ),
        ])
    }

    fn render_table(&self, frame: &mut Frame, area: Rect, theme: &Theme, state: &RecordsState) {
        let schema = state.table.schema();
        let records = state.table.records();
        // Borders and header take three rows.
        self.page_size
            .set((area.height.saturating_sub(3) as usize).max(1));

        let header = Row::new(schema.columns.iter().map(|column| Line::from(column.label))).style(
            Style::default()
                .fg(theme.text_muted())
                .add_modifier(Modifier::BOLD),
        );
        let widths: Vec<Constraint> = schema
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let widest = records
                    .iter()
                    .filter_map(|record| record.value(index))
                    .map(|value| value.to_string().width())
                    .max()
                    .unwrap_or(0)
                    .min(MAX_CELL_WIDTH);
                Constraint::Min(widest.max(column.label.width() + 2) as u16)
            })
            .collect();
        let rows = records.iter().map(|record| {
            Row::new(
                record
                    .values
                    .iter()
                    .map(|value| truncate(&value.to_string(), MAX_CELL_WIDTH)),
            )
        });

        let border = if state.error.is_some() {
            theme.error()
        } else {
            theme.border()
        };
        let block = Block::bordered()
            .title_top(self.title_line(state, theme))
            .title_bottom(self.footer_line(state, theme))
            .border_style(Style::default().fg(border))
            .style(Style::default().bg(theme.panel_bg_alt()).fg(theme.text()));

        let table = Table::new(rows, widths)
            .block(block)
            .header(header)
            .highlight_spacing(HighlightSpacing::Always)
            .highlight_symbol(">>")
            .row_highlight_style(
                Style::default()
                    .bg(theme.selection_bg())
                    .fg(theme.selection_fg()),
            );
        let mut table_state = TableState::default().with_selected(state.table.selected());
        StatefulWidget::render(table, area, frame.buffer_mut(), &mut table_state);
    }
}

impl crate::widgets::Widget for RecordsWidget {
    fn inner(&self) -> &WidgetInner {
        &self.inner
    }

    fn title(&self) -> Option<String> {
        let state = self.state.borrow();
        let schema = state.table.schema();
        Some(match state.table.role() {
            Some(role) if schema.role_gated => format!("{} · {role}", schema.title),
            _ => schema.title.to_string(),
        })
    }

    fn start(&self, ctx: WidgetCtx) {
        self.reload(&ctx);
    }

    fn render(&self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let state = self.state.borrow();
        let show_search = state.search.is_active() || !state.search.value().is_empty();
        if show_search {
            let [search_area, table_area] =
                area.layout(&Layout::vertical([Constraint::Length(3), Constraint::Fill(1)]));
            state.search.render(frame, search_area, theme);
            self.render_table(frame, table_area, theme, &state);
        } else {
            self.render_table(frame, area, theme, &state);
        }
    }

    fn handle_event(&self, ctx: WidgetCtx, event: &Event) -> bool {
        let Some(key) = event.as_key_press_event() else {
            return false;
        };
        if self.state.borrow().search.is_active() {
            return self.handle_search_key(&ctx, event, key.code);
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('/') => {
                self.state.borrow_mut().search.set_active(true);
            }
            KeyCode::Char('c') if !ctrl => self.show_category_picker(&ctx),
            KeyCode::Char('n') if !ctrl => self.add(&ctx),
            KeyCode::Char('e') | KeyCode::Enter if !ctrl => self.edit(&ctx),
            KeyCode::Char('d') if ctrl => self.confirm_delete(&ctx),
            KeyCode::Char('r') if !ctrl => self.reload(&ctx),
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::PageDown => self.move_selection(self.page_size.get() as isize),
            KeyCode::PageUp => self.move_selection(-(self.page_size.get() as isize)),
            KeyCode::Home | KeyCode::Char('g') => self.state.borrow_mut().table.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') => {
                self.state.borrow_mut().table.select(Some(usize::MAX))
            }
            KeyCode::Esc if !self.state.borrow().search.value().is_empty() => {
                {
                    let mut state = self.state.borrow_mut();
                    state.search.clear();
                    state.table.set_name_filter("");
                }
                self.reload(&ctx);
            }
            _ => return false,
        }
        ctx.invalidate();
        true
    }

    fn help(&self) -> Option<&[help::Entry<'_>]> {
        if self.state.borrow().search.is_active() {
            Some(Self::HELP_SEARCH)
        } else {
            Some(self.help_entries.as_slice())
        }
    }

    fn on_self_event(&self, ctx: WidgetCtx, event: AppEvent) {
        let event = match event.downcast::<ReloadEvent>() {
            Ok(reload) => return self.on_reload(&ctx, reload),
            Err(event) => event,
        };
        let event = match event.downcast::<MutationEvent>() {
            Ok(mutation) => return self.on_mutation(&ctx, mutation),
            Err(event) => event,
        };
        let event = match event.downcast::<FormDone>() {
            Ok(done) => return self.on_form_done(&ctx, done),
            Err(event) => event,
        };
        let event = match event.downcast::<DeleteDecision>() {
            Ok(decision) => return self.on_delete_decision(&ctx, decision),
            Err(event) => event,
        };
        let event = match event.downcast::<EditFormEvent>() {
            Ok(EditFormEvent { result: Ok(form) }) => return self.open_form(&ctx, form),
            Ok(EditFormEvent { result: Err(err) }) => return self.show_error(&ctx, &err),
            Err(event) => event,
        };
        if let Ok(CategoryChosen { category }) = event.downcast::<CategoryChosen>() {
            self.state.borrow_mut().table.set_category(category);
            self.reload(&ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use rolodex::{
        entity::EMPLOYEE,
        store::{SqliteStore, StoreConfig},
    };

    use super::*;

    fn store(dir: &tempfile::TempDir) -> Arc<dyn RecordStore> {
        let config = StoreConfig::new(dir.path().join("widget.db"));
        Arc::new(SqliteStore::open(config, &EMPLOYEE).unwrap())
    }

    #[tokio::test]
    async fn crashed_mutation_still_reports_back() {
        let dir = tempfile::tempdir().unwrap();
        let event = join_store(
            store(&dir),
            StoreOp::Delete,
            |_| -> MutationEvent { panic!("store job crashed") },
            |err| MutationEvent {
                operation: Operation::Delete,
                result: Err(err),
            },
        )
        .await;

        assert_eq!(event.operation, Operation::Delete);
        assert!(matches!(
            event.result,
            Err(Error::Store(StoreError::Shape {
                operation: StoreOp::Delete,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn finished_job_result_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let event = join_store(
            store(&dir),
            StoreOp::List,
            |store| ReloadEvent {
                id: 4,
                result: store.list(&Default::default()).map(|_| Snapshot::default()),
            },
            |_| panic!("the job did not fail"),
        )
        .await;

        assert_eq!(event.id, 4);
        assert!(event.result.is_ok());
    }
}
