use std::{
    io,
    sync::{
        Arc,
        mpsc::{self, Receiver, Sender},
    },
    time::{Duration, Instant},
};

use chrono::NaiveDate;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use tokio::runtime::Handle;
use tracing::info;

use crate::{
    constants::TIME_SETTINGS,
    domain::{HabitTracker, today_local},
    error::Result,
    reminders::{ReminderScheduler, now_millis},
    services::Services,
    sync::SyncAdapter,
};

mod cloud_tasks;
mod event_handlers;
mod habit_state;
mod render_views;
mod reminder_modal_view;
mod terminal_notifier;
mod time_format;
mod ui_helpers;
mod view_style;

use cloud_tasks::NetEvent;
use terminal_notifier::TerminalNotifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HabitInput {
    Add,
    Rename,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReminderField {
    Interval,
    Title,
    Body,
    New,
}

impl ReminderField {
    fn label(self) -> &'static str {
        match self {
            ReminderField::Interval => "Interval (minutes)",
            ReminderField::Title => "Title",
            ReminderField::Body => "Message",
            ReminderField::New => "New reminder title",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UiMode {
    Main,
    HabitInput(HabitInput),
    ConfirmRemove,
    Reminders,
    ReminderInput(ReminderField),
}

struct App {
    services: Arc<Services>,
    runtime: Handle,
    tracker: HabitTracker,
    today: NaiveDate,
    scheduler: ReminderScheduler,
    notifier: TerminalNotifier,
    sync: SyncAdapter,
    net_tx: Sender<NetEvent>,
    net_rx: Receiver<NetEvent>,
    ui_mode: UiMode,
    selected_index: usize,
    reminder_index: usize,
    input: String,
    suggestion_index: usize,
    notice: Option<String>,
    render_needed: bool,
}

impl App {
    fn new(services: Arc<Services>, runtime: Handle) -> Self {
        let today = today_local();
        let loaded = services.store.load_habits(true, today);
        if !loaded.has_stored_payload {
            services.store.save_habits(&loaded.payload);
        }

        let now = now_millis();
        let mut scheduler = ReminderScheduler::new(services.store.load_reminders(now));
        let notifier = TerminalNotifier::new(
            services.config.reminders.notifications,
            services.permission_path(),
        );
        if scheduler.resume(&notifier, now) > 0 {
            services.store.save_reminders(&scheduler.payload());
        }

        let (net_tx, net_rx) = mpsc::channel();
        let debounce = Duration::from_millis(services.config.sync.debounce_ms);

        Self {
            services,
            runtime,
            tracker: HabitTracker::from_payload(loaded.payload),
            today,
            scheduler,
            notifier,
            sync: SyncAdapter::new(debounce),
            net_tx,
            net_rx,
            ui_mode: UiMode::Main,
            selected_index: 0,
            reminder_index: 0,
            input: String::new(),
            suggestion_index: 0,
            notice: None,
            render_needed: true,
        }
    }

    fn open_input(&mut self, mode: UiMode, prefill: String) {
        self.ui_mode = mode;
        self.input = prefill;
        self.suggestion_index = 0;
        self.notice = None;
        self.render_needed = true;
    }

    fn close_input(&mut self) {
        self.ui_mode = match self.ui_mode {
            UiMode::ReminderInput(_) => UiMode::Reminders,
            _ => UiMode::Main,
        };
        self.input.clear();
        self.render_needed = true;
    }

    fn open_reminders(&mut self) {
        self.ui_mode = UiMode::Reminders;
        self.reminder_index = self
            .reminder_index
            .min(self.scheduler.items().len().saturating_sub(1));
        self.scheduler.clear_error();
        self.render_needed = true;
    }

    fn close_reminders(&mut self) {
        self.ui_mode = UiMode::Main;
        self.scheduler.clear_error();
        self.render_needed = true;
    }

    fn in_reminders(&self) -> bool {
        matches!(self.ui_mode, UiMode::Reminders | UiMode::ReminderInput(_))
    }

    fn modal_rect(&self, terminal_size: Rect) -> Rect {
        self.modal_rect_ratio(terminal_size, 2, 3)
    }

    fn modal_rect_ratio(&self, terminal_size: Rect, numerator: u16, denominator: u16) -> Rect {
        let target_width = terminal_size.width.saturating_mul(numerator) / denominator;
        let target_height = (terminal_size.height.saturating_mul(numerator) / denominator).max(10);

        let max_width = terminal_size.width.saturating_sub(2).max(1);
        let max_height = terminal_size.height.saturating_sub(2).max(1);

        let modal_width = target_width.clamp(1, max_width);
        let modal_height = target_height.clamp(1, max_height);

        let modal_x = (terminal_size.width.saturating_sub(modal_width)) / 2;
        let modal_y = (terminal_size.height.saturating_sub(modal_height)) / 2;

        Rect::new(modal_x, modal_y, modal_width, modal_height)
    }

    /// One reminder poll. Fired items are persisted with their new fire times.
    fn tick_reminders(&mut self) {
        let fired = self.scheduler.tick(now_millis(), &mut self.notifier);
        if !fired.is_empty() {
            self.persist_reminders();
            self.render_needed = true;
        }
    }

    /// Drops an expired banner so the footer falls back to key hints.
    fn expire_banner(&mut self, now: Instant) {
        if self.notifier.expire_banner(now) {
            self.render_needed = true;
        }
    }
}

pub fn run_ui(services: Arc<Services>, runtime: Handle) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let poll_rate = Duration::from_secs(services.config.reminders.poll_secs.max(1));
    let mut app = App::new(services, runtime);
    app.start_cloud_session();
    info!("checklist UI started");

    let input_rate = Duration::from_millis(TIME_SETTINGS.input_poll_ms);
    let render_rate = Duration::from_millis(1000 / TIME_SETTINGS.target_fps);
    let clock_rate = Duration::from_secs(1);
    let mut last_poll = Instant::now();
    let mut last_render = Instant::now();
    let mut last_clock = Instant::now();

    loop {
        let now = Instant::now();

        if now.duration_since(last_poll) >= poll_rate {
            app.tick_reminders();
            last_poll = now;
        }

        if now.duration_since(last_clock) >= clock_rate {
            app.roll_day_if_needed(today_local());
            app.expire_banner(now);
            if app.in_reminders() {
                app.render_needed = true;
            }
            last_clock = now;
        }

        app.drain_net_events();
        app.flush_due_push(now);

        if last_render.elapsed() >= render_rate && app.render_needed {
            terminal.draw(|f| {
                app.draw_frame(f);
            })?;
            app.render_needed = false;
            last_render = Instant::now();
        }

        if event::poll(input_rate)?
            && let Event::Key(key) = event::read()?
            && app.handle_key(key)
        {
            break;
        }
    }

    info!("checklist UI closed");

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}
