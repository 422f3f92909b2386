use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use crossterm::event::{Event, EventStream, KeyCode};
use directories::ProjectDirs;
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Clear, Paragraph, Wrap},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::StreamExt;
use unicode_width::UnicodeWidthStr;

use rolodex::{
    entity::Entity,
    role::Role,
    store::{RecordStore, SqliteStore, StoreConfig},
};

mod env;
mod help;
mod logging;
mod subcommands;
mod util;
mod widgets;

use env::{AppEvent, Env, Message, Toast, ToastKind, WidgetId};
use widgets::{Popup, RecordsWidget, RolePicker, Widget, theme::Theme};

const DATABASE_FILE: &str = "rolodex.db";

#[derive(clap::Parser)]
#[command(
    name = "rolodex",
    version,
    about = "Employee and item records in the terminal",
    long_about = None
)]
struct Cli {
    /// Increase log verbosity (-v, -vv, etc.)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Database to use: `sqlite://<path>` or a plain path
    #[arg(long, global = true, env = "ROLODEX_DATABASE")]
    database: Option<String>,

    /// Which records to manage
    #[arg(long, global = true, value_enum, default_value_t = Entity::Employee)]
    entity: Entity,

    /// Session role; employees ask for one at startup when omitted
    #[arg(long, global = true, value_enum)]
    role: Option<Role>,

    /// Write logs here instead of the data directory
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print records without starting the UI
    List {
        /// Case-insensitive substring of the name
        #[arg(long)]
        name: Option<String>,

        /// Exact company to list
        #[arg(long)]
        company: Option<String>,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },
}

fn data_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", "rolodex")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| eyre!("cannot determine a data directory, pass --database and --log-file"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = <Cli as clap::Parser>::parse();

    let data_dir = match (&cli.database, &cli.log_file) {
        (Some(_), Some(_)) => None,
        _ => Some(data_dir()?),
    };
    let log_dir = data_dir.as_deref().unwrap_or(Path::new("."));
    logging::init(cli.verbose, cli.log_file.as_deref(), log_dir)?;

    let config = match (&cli.database, &data_dir) {
        (Some(url), _) => StoreConfig::from_url(url)?,
        (None, Some(dir)) => StoreConfig::new(dir.join(DATABASE_FILE)),
        (None, None) => return Err(eyre!("no database configured")),
    };
    let schema = cli.entity.schema();
    let store = SqliteStore::open(config, schema)
        .wrap_err_with(|| format!("cannot open the {} store", cli.entity))?;
    let database = util::abbreviate_home(store.path());
    let store: Arc<dyn RecordStore> = Arc::new(store);

    match cli.command {
        Some(Commands::List {
            name,
            company,
            json,
        }) => {
            let options = subcommands::list::Options {
                name,
                company,
                role: cli.role,
                json,
            };
            subcommands::list::command(store.as_ref(), options)
        }
        None => {
            let (app, rx) = App::new(Theme::current(), database);
            app.run_tui(rx, store, cli.role).await
        }
    }
}

struct ActiveToast {
    toast: Toast,
    expires_at: Instant,
}

struct App {
    should_quit: bool,
    needs_redraw: bool,
    widgets: Vec<Box<dyn Widget>>,
    popup: Option<Box<dyn Popup>>,
    toast: Option<ActiveToast>,
    env: Env,
    theme: Theme,
    database: String,
}

impl App {
    const FRAMES_PER_SECOND: f32 = 30.0;

    const HELP: &'static [help::Entry<'static>] = &[
        help::Entry::new("h", "help", "Show every key binding"),
        help::Entry::new("esc", "back", "Go back, quit from the first screen"),
        help::Entry::new("q", "quit", "Quit"),
    ];

    fn new(theme: Theme, database: String) -> (Self, UnboundedReceiver<Message>) {
        let (env, rx) = Env::new();
        let app = Self {
            should_quit: false,
            needs_redraw: true,
            widgets: Vec::new(),
            popup: None,
            toast: None,
            env,
            theme,
            database,
        };
        (app, rx)
    }

    async fn run_tui(
        self,
        rx: UnboundedReceiver<Message>,
        store: Arc<dyn RecordStore>,
        role: Option<Role>,
    ) -> Result<()> {
        let first: Box<dyn Widget> = if store.schema().role_gated && role.is_none() {
            Box::new(RolePicker::new(store, WidgetId::ROOT))
        } else {
            Box::new(RecordsWidget::new(store, role, WidgetId::ROOT))
        };
        let terminal = ratatui::init();
        let app_result = self.run(terminal, rx, first).await;
        ratatui::restore();
        app_result
    }

    async fn run(
        mut self,
        mut terminal: DefaultTerminal,
        mut rx: UnboundedReceiver<Message>,
        first: Box<dyn Widget>,
    ) -> Result<()> {
        self.push_widget(first);

        let period = Duration::from_secs_f32(1.0 / Self::FRAMES_PER_SECOND);
        let mut interval = tokio::time::interval(period);
        let mut events = EventStream::new();

        while !self.should_quit {
            tokio::select! {
                _ = interval.tick() => {
                    self.expire_toast();
                    if self.needs_redraw {
                        terminal.draw(|frame| self.render(frame))?;
                        self.needs_redraw = false;
                    }
                },
                Some(Ok(event)) = events.next() => {
                    self.handle_event(&event);
                    self.needs_redraw = true;
                },
                Some(message) = rx.recv() => self.handle_message(message),
            }
        }
        tracing::info!("quit");
        Ok(())
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Invalidate => {}
            Message::PushWidget(widget) => self.push_widget(widget),
            Message::SetPopup(popup) => {
                tracing::debug!(popup = ?popup.inner().id(), "popup_open");
                self.popup = Some(popup);
            }
            Message::DismissPopup(id) => {
                if self.popup.as_ref().is_some_and(|popup| popup.inner().id() == id) {
                    self.popup = None;
                }
            }
            Message::ShowToast(toast) => {
                self.toast = Some(ActiveToast {
                    expires_at: Instant::now() + toast.duration,
                    toast,
                });
            }
            Message::Event(event) => self.route_event(event),
        }
        self.needs_redraw = true;
    }

    fn route_event(&self, event: AppEvent) {
        let target = event.target();
        let ctx = self.env.ctx(target);
        if let Some(popup) = self
            .popup
            .as_ref()
            .filter(|popup| popup.inner().id() == target)
        {
            popup.on_self_event(ctx, event);
        } else if let Some(widget) = self
            .widgets
            .iter()
            .rev()
            .find(|widget| widget.inner().id() == target)
        {
            widget.on_self_event(ctx, event);
        } else {
            tracing::trace!(?target, "event_dropped");
        }
    }

    fn push_widget(&mut self, widget: Box<dyn Widget>) {
        tracing::debug!(
            widget = ?widget.inner().id(),
            parent = ?widget.inner().parent(),
            "widget_push"
        );
        widget.start(self.env.ctx(widget.inner().id()));
        self.widgets.push(widget);
    }

    fn pop_widget(&mut self) {
        self.popup = None;
        self.widgets.pop();
        if self.widgets.is_empty() {
            self.should_quit = true;
        }
    }

    fn expire_toast(&mut self) {
        if self
            .toast
            .as_ref()
            .is_some_and(|toast| toast.expires_at <= Instant::now())
        {
            self.toast = None;
            self.needs_redraw = true;
        }
    }

    fn handle_event(&mut self, event: &Event) {
        if let Some(popup) = &self.popup {
            if popup.handle_event(self.env.ctx(popup.inner().id()), event) {
                return;
            }
        } else if let Some(widget) = self.widgets.last()
            && widget.handle_event(self.env.ctx(widget.inner().id()), event)
        {
            return;
        }

        let Some(key) = event.as_key_press_event() else {
            return;
        };
        match key.code {
            KeyCode::Char('h') => self.show_help(),
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => {
                if self.popup.take().is_none() {
                    self.pop_widget();
                }
            }
            _ => {}
        }
    }

    fn show_help(&mut self) {
        if self.popup.is_some() {
            return;
        }
        let popup = help::Widget::new(&self.help_entries(), WidgetId::ROOT);
        self.popup = Some(Box::new(popup));
    }

    fn help_entries(&self) -> Vec<&help::Entry<'_>> {
        let local = match &self.popup {
            Some(popup) => popup.help(),
            None => self.widgets.last().and_then(|widget| widget.help()),
        };
        let mut entries: Vec<&help::Entry<'_>> = local.into_iter().flatten().collect();
        if self.popup.is_none() {
            entries.extend(Self::HELP.iter());
        }
        entries
    }

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        util::fill_bg(frame.buffer_mut(), area, self.theme.bg());

        let entries = self.help_entries();
        let help_height = help::height(&entries, area, &self.theme);
        let layout = Layout::vertical([
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(help_height),
        ]);
        let [title_area, body_area, help_area] = area.layout(&layout);

        self.render_title(frame, title_area);
        if let Some(widget) = self.widgets.last() {
            widget.render(frame, body_area, &self.theme);
        }
        if let Some(popup) = &self.popup {
            let rect = popup.rect(body_area);
            frame.render_widget(Clear, rect);
            popup.render(frame, rect, &self.theme);
        }
        if let Some(toast) = &self.toast {
            self.render_toast(frame, body_area, &toast.toast);
        }
        help::render(&entries, frame, help_area, &self.theme);
    }

    fn render_title(&self, frame: &mut Frame, area: Rect) {
        let title = self
            .widgets
            .last()
            .and_then(|widget| widget.title())
            .unwrap_or_default();
        let left = Line::from(vec![
            Span::styled(
                " rolodex ",
                Style::default()
                    .fg(self.theme.accent())
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(title, Style::default().fg(self.theme.text())),
        ]);
        let right = Line::styled(
            format!("{} ", self.database),
            Style::default().fg(self.theme.text_muted()),
        )
        .right_aligned();
        frame.render_widget(left, area);
        frame.render_widget(right, area);
    }

    fn render_toast(&self, frame: &mut Frame, area: Rect, toast: &Toast) {
        let color = match toast.kind {
            ToastKind::Info => self.theme.success(),
            ToastKind::Warning => self.theme.warning(),
            ToastKind::Error => self.theme.error(),
        };
        let max_width = area.width.saturating_sub(2).max(1);
        let width = ((toast.message.width() + 4) as u16).min(max_width);
        let inner_width = width.saturating_sub(4).max(1) as usize;
        let lines = toast.message.width().div_ceil(inner_width).max(1) as u16;
        let height = (lines + 2).min(area.height);
        let rect = Rect {
            x: area.right().saturating_sub(width + 1),
            y: area.bottom().saturating_sub(height + 1),
            width,
            height,
        };
        let block = Block::bordered()
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(color))
            .style(Style::default().bg(self.theme.panel_bg()).fg(self.theme.text()));
        let message = Paragraph::new(toast.message.as_str())
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(Clear, rect);
        frame.render_widget(message, rect);
    }
}
