use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    auth,
    domain::{CompletionStatus, HabitId, HabitTracker, today_local},
    error::{PulseError, Result},
    reminders::{self, ReminderScheduler, ReminderState, format_clock, now_millis},
    services::Services,
    storage,
    sync::{self, Identity, RemoteRow, SignInOutcome, SyncAdapter},
    templates::{self, ApplyOutcome, TEMPLATES},
};

#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(
    about = "Tiny daily habits with streaks, reminders and optional cloud sync",
    long_about = None
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to config.toml")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Open the checklist UI (default)")]
    Ui,

    #[command(about = "Show today's checklist")]
    List,

    #[command(about = "Add a habit")]
    Add {
        #[arg(help = "Habit name (max 20 characters)")]
        name: String,
    },

    #[command(about = "Rename a habit")]
    Rename {
        #[arg(help = "Habit name, id, or list number")]
        habit: String,
        #[arg(help = "New name")]
        name: String,
    },

    #[command(about = "Remove a habit")]
    Remove {
        #[arg(help = "Habit name, id, or list number")]
        habit: String,
    },

    #[command(about = "Set today's status of a habit")]
    Set {
        #[arg(help = "Habit name, id, or list number")]
        habit: String,
        #[arg(value_parser = parse_status, help = "New status: empty, partial, full (or 0/1/2)")]
        status: CompletionStatus,
    },

    #[command(about = "Cycle a habit: empty, partial, full")]
    Toggle {
        #[arg(help = "Habit name, id, or list number")]
        habit: String,
    },

    #[command(about = "Export stored habit data")]
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json, help = "Export format")]
        format: ExportFormat,

        #[arg(long, short, help = "Output path")]
        out: Option<PathBuf>,
    },

    #[command(about = "List habit templates")]
    Templates,

    #[command(about = "Replace your habits with a template")]
    ApplyTemplate {
        #[arg(help = "Template slug (study, fitness, focus)")]
        slug: String,

        #[arg(long, short, help = "Skip the overwrite confirmation")]
        yes: bool,
    },

    #[command(about = "Manage reminders")]
    Reminders {
        #[command(subcommand)]
        action: Option<ReminderCommand>,
    },

    #[command(about = "Run reminders in the foreground until Ctrl-C")]
    Remind,

    #[command(about = "Sign in and sync with the cloud")]
    Login,

    #[command(about = "Forget the stored session")]
    Logout,

    #[command(about = "Pull cloud data, or seed it from this device")]
    Sync,

    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum, help = "Shell type")]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReminderCommand {
    #[command(about = "List reminders")]
    List,
    #[command(about = "Enable a reminder")]
    Enable { reminder: String },
    #[command(about = "Disable a reminder")]
    Disable { reminder: String },
    #[command(about = "Set the interval in minutes (1-1440)")]
    Interval { reminder: String, minutes: f64 },
    #[command(about = "Set the notification title")]
    Title { reminder: String, title: String },
    #[command(about = "Set the notification body")]
    Body { reminder: String, body: String },
    #[command(about = "Add a custom reminder")]
    Add {
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long, default_value_t = 60.0, help = "Interval in minutes")]
        every: f64,
    },
    #[command(about = "Remove a reminder")]
    Remove { reminder: String },
}

fn parse_status(raw: &str) -> std::result::Result<CompletionStatus, String> {
    CompletionStatus::parse(raw).ok_or_else(|| format!("unknown status '{raw}'"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

fn status_mark(status: CompletionStatus) -> &'static str {
    match status {
        CompletionStatus::Empty => "[ ]",
        CompletionStatus::Partial => "[~]",
        CompletionStatus::Full => "[x]",
    }
}

/// Name, id, or 1-based list position.
pub fn resolve_habit(tracker: &HabitTracker, query: &str) -> Result<HabitId> {
    if let Some(habit) = tracker.find(query) {
        return Ok(habit.id.clone());
    }
    query
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|idx| tracker.habit_by_index(idx))
        .map(|habit| habit.id.clone())
        .ok_or_else(|| PulseError::NotFound(format!("No habit matching '{query}'")))
}

fn resolve_reminder(scheduler: &ReminderScheduler, query: &str) -> Result<String> {
    scheduler
        .find(query)
        .map(|r| r.id.clone())
        .ok_or_else(|| PulseError::NotFound(format!("No reminder matching '{query}'")))
}

pub fn render_checklist(tracker: &HabitTracker, today: NaiveDate) -> String {
    let header = format!(
        "Today {} · momentum {}% ({}/{} full, {} checked)",
        today.format("%Y-%m-%d"),
        tracker.momentum_percent(),
        tracker.completed_count(),
        tracker.habit_count(),
        tracker.checklist_done()
    );

    if tracker.habit_count() == 0 {
        return format!("{header}\nNo habits yet. Try `pulse add \"Drink Water\"`.");
    }

    let rows = tracker
        .habits()
        .iter()
        .enumerate()
        .map(|(idx, habit)| {
            format!(
                "{:>2}. {} {:20} streak {}",
                idx + 1,
                status_mark(tracker.status(&habit.id)),
                habit.name,
                tracker.streak(&habit.id)
            )
        })
        .join("\n");
    format!("{header}\n{rows}")
}

pub fn render_reminders(scheduler: &ReminderScheduler) -> String {
    scheduler
        .items()
        .iter()
        .map(|item| {
            let state = match item.state() {
                ReminderState::Disabled => "off".to_string(),
                ReminderState::Pending => "on (waiting for permission)".to_string(),
                ReminderState::Armed { next_fire_at } => {
                    format!("on, next at {}", format_clock(next_fire_at))
                }
            };
            format!(
                "{:18} every {:>4} min  {:28} {}",
                item.id, item.interval_minutes, item.title, state
            )
        })
        .join("\n")
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).is_ok() && answer.trim().eq_ignore_ascii_case("y")
}

async fn signed_in_identity(services: &Services) -> Option<Identity> {
    match services.active_session().await {
        Ok(session) => session.map(|s| s.identity()),
        Err(e) => {
            eprintln!("Warning: cloud session unavailable: {e}");
            None
        }
    }
}

/// Pushes the current local snapshot when signed in. Failures are reported, not fatal.
async fn push_snapshot(services: &Services, today: NaiveDate) {
    let Some(remote) = services.remote.clone() else {
        return;
    };
    let Some(identity) = signed_in_identity(services).await else {
        return;
    };

    let habits = services.store.load_habits(false, today).payload;
    let reminders = services.store.load_reminders(now_millis());
    let result = match RemoteRow::snapshot(&identity.user_id, &habits, &reminders) {
        Ok(row) => remote.upsert_row(&identity, &row).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Warning: cloud sync failed: {e}");
    }
}

/// Sign-in reconciliation: remote data wins, otherwise this device seeds the row.
pub async fn pull_or_seed(services: &Services, identity: Identity) -> Result<SignInOutcome> {
    let remote = services
        .remote
        .clone()
        .ok_or_else(|| PulseError::Config("cloud is not configured".to_string()))?;
    let today = today_local();

    let mut adapter = SyncAdapter::new(Duration::from_millis(services.config.sync.debounce_ms));
    let generation = adapter.begin_sign_in(identity.clone());
    let fetched = remote.fetch_row(&identity).await;
    let outcome = adapter.complete_sign_in(generation, fetched, today);

    match &outcome {
        SignInOutcome::ApplyRemote { habits, reminders } => {
            services.store.save_habits(habits);
            services.store.save_reminders(reminders);
        }
        SignInOutcome::SeedRemote => {
            let habits = services.store.load_habits(true, today).payload;
            let reminders = services.store.load_reminders(now_millis());
            let row = RemoteRow::snapshot(&identity.user_id, &habits, &reminders)?;
            let result = remote.upsert_row(&identity, &row).await;
            adapter.record_push_result(&result);
        }
        SignInOutcome::Failed | SignInOutcome::Stale => {}
    }

    match adapter.error() {
        Some(message) if outcome == SignInOutcome::Failed => {
            Err(PulseError::Rejected(format!("cloud sync failed: {message}")))
        }
        Some(message) => {
            eprintln!("Warning: {message}");
            Ok(outcome)
        }
        None => Ok(outcome),
    }
}

fn describe_outcome(outcome: &SignInOutcome) -> &'static str {
    match outcome {
        SignInOutcome::ApplyRemote { .. } => "Pulled cloud data into this device.",
        SignInOutcome::SeedRemote => "Cloud was empty; uploaded this device's data.",
        SignInOutcome::Failed => "Cloud sync failed.",
        SignInOutcome::Stale => "Sync result discarded.",
    }
}

fn mutate_habits(
    services: &Services,
    today: NaiveDate,
    apply: impl FnOnce(&mut HabitTracker) -> Result<String>,
) -> Result<()> {
    let loaded = services.store.load_habits(true, today);
    let mut tracker = HabitTracker::from_payload(loaded.payload);
    let message = apply(&mut tracker)?;
    services
        .store
        .try_save_habits(&tracker.to_payload(today))?;
    println!("{message}");
    Ok(())
}

fn mutate_reminders(
    services: &Services,
    apply: impl FnOnce(&mut ReminderScheduler) -> Result<String>,
) -> Result<()> {
    let mut scheduler = ReminderScheduler::new(services.store.load_reminders(now_millis()));
    let outcome = apply(&mut scheduler);
    services.store.try_save_reminders(&scheduler.payload())?;
    println!("{}", outcome?);
    Ok(())
}

fn export_data(
    services: &Services,
    format: ExportFormat,
    out: Option<PathBuf>,
    today: NaiveDate,
) -> Result<()> {
    let payload = services.store.export_payload();
    let default_name = storage::default_export_file_name(today);
    match format {
        ExportFormat::Json => {
            let path = out.unwrap_or_else(|| PathBuf::from(default_name));
            storage::export_json(&path, &payload)?;
            println!("Exported to {}", path.display());
        }
        ExportFormat::Csv => {
            let path = out.unwrap_or_else(|| PathBuf::from(default_name.replace(".json", ".csv")));
            storage::export_csv(&path, &payload)?;
            println!("Exported to {}", path.display());
        }
    }
    Ok(())
}

fn list_templates() -> String {
    TEMPLATES
        .iter()
        .map(|t| {
            format!(
                "{}: {}\n  {}\n  {}",
                t.slug,
                t.title,
                t.tagline,
                t.habits.iter().join(", ")
            )
        })
        .join("\n\n")
}

async fn apply_template(
    services: &Services,
    slug: &str,
    yes: bool,
    today: NaiveDate,
) -> Result<()> {
    let template = templates::require_template(slug)?;
    let outcome = templates::apply_template(
        &services.store,
        template,
        |count| {
            yes || confirm(&format!(
                "This will replace your current {count} habit(s) with \"{}\". Continue?",
                template.title
            ))
        },
        today,
    )?;

    let ApplyOutcome::Applied(payload) = outcome else {
        println!("Cancelled.");
        return Ok(());
    };
    println!("Applied \"{}\" ({} habits).", template.title, payload.habits.len());

    let identity = signed_in_identity(services).await;
    if let (Some(remote), Some(identity)) = (services.remote.clone(), identity) {
        let reminders = services.store.load_reminders(now_millis());
        let merged =
            sync::merge_habits_into_remote(remote.as_ref(), &identity, &payload, &reminders).await;
        if let Err(e) = merged {
            eprintln!("Warning: cloud update failed: {e}");
        }
    }
    Ok(())
}

async fn run_reminder_command(services: &Services, action: ReminderCommand) -> Result<()> {
    let now = now_millis();
    match action {
        ReminderCommand::List => {
            let scheduler = ReminderScheduler::new(services.store.load_reminders(now));
            println!("{}", render_reminders(&scheduler));
            return Ok(());
        }
        ReminderCommand::Enable { reminder } => {
            let mut notifier = services.console_notifier();
            mutate_reminders(services, |s| {
                let id = resolve_reminder(s, &reminder)?;
                if s.enable(&id, &mut notifier, now) {
                    Ok(format!("Enabled {id}."))
                } else {
                    Err(PulseError::Rejected(
                        s.error().unwrap_or("Could not enable reminder").to_string(),
                    ))
                }
            })?;
        }
        ReminderCommand::Disable { reminder } => mutate_reminders(services, |s| {
            let id = resolve_reminder(s, &reminder)?;
            s.disable(&id);
            Ok(format!("Disabled {id}."))
        })?,
        ReminderCommand::Interval { reminder, minutes } => mutate_reminders(services, |s| {
            let id = resolve_reminder(s, &reminder)?;
            s.set_interval(&id, minutes, now);
            let applied = s.find(&id).map_or(0, |r| r.interval_minutes);
            Ok(format!("{id} now fires every {applied} min."))
        })?,
        ReminderCommand::Title { reminder, title } => mutate_reminders(services, |s| {
            let id = resolve_reminder(s, &reminder)?;
            s.set_title(&id, &title, now);
            Ok(format!("Updated {id}."))
        })?,
        ReminderCommand::Body { reminder, body } => mutate_reminders(services, |s| {
            let id = resolve_reminder(s, &reminder)?;
            s.set_body(&id, &body, now);
            Ok(format!("Updated {id}."))
        })?,
        ReminderCommand::Add { title, body, every } => mutate_reminders(services, |s| {
            s.add_item(&title, &body, every)
                .map(|id| format!("Added {id}."))
                .ok_or_else(|| PulseError::Rejected("Reminder limit reached (20).".to_string()))
        })?,
        ReminderCommand::Remove { reminder } => mutate_reminders(services, |s| {
            let id = resolve_reminder(s, &reminder)?;
            s.remove_item(&id);
            Ok(format!("Removed {id}."))
        })?,
    }
    push_snapshot(services, today_local()).await;
    Ok(())
}

async fn login(services: &Services) -> Result<()> {
    let client = services
        .auth
        .as_ref()
        .ok_or_else(|| PulseError::Config("set [cloud] url and anon_key to sign in".to_string()))?;

    let session = auth::sign_in(client, services.config.cloud.callback_port, |url| {
        println!("Open this URL in your browser to sign in:\n\n  {url}\n");
    })
    .await?;
    auth::save_session(&services.session_path(), &session)?;
    println!("Signed in as {}.", session.display_name());
    info!(user = %session.user.id, "signed in");

    let outcome = pull_or_seed(services, session.identity()).await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

async fn sync_now(services: &Services) -> Result<()> {
    let identity = signed_in_identity(services)
        .await
        .ok_or_else(|| PulseError::Auth("not signed in, run `pulse login`".to_string()))?;
    let outcome = pull_or_seed(services, identity).await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub fn print_completions(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "pulse", &mut io::stdout());
}

/// Runs one non-UI command.
pub async fn run_command(services: &Services, command: Command) -> Result<()> {
    let today = today_local();
    let changes_habits = matches!(
        command,
        Command::Add { .. }
            | Command::Rename { .. }
            | Command::Remove { .. }
            | Command::Set { .. }
            | Command::Toggle { .. }
    );

    match command {
        Command::Ui => {}
        Command::List => {
            let loaded = services.store.load_habits(true, today);
            if !loaded.has_stored_payload {
                services.store.save_habits(&loaded.payload);
            }
            println!("{}", render_checklist(&HabitTracker::from_payload(loaded.payload), today));
        }
        Command::Add { name } => mutate_habits(services, today, |t| {
            if t.add_habit(&name) {
                Ok(format!("Added \"{}\".", t.habits()[0].name))
            } else {
                Err(PulseError::Rejected(
                    "Habit name is empty or already exists.".to_string(),
                ))
            }
        })?,
        Command::Rename { habit, name } => mutate_habits(services, today, |t| {
            let id = resolve_habit(t, &habit)?;
            if t.update_habit_name(&id, &name) {
                Ok("Renamed.".to_string())
            } else {
                Err(PulseError::Rejected(
                    "New name is empty or already used.".to_string(),
                ))
            }
        })?,
        Command::Remove { habit } => mutate_habits(services, today, |t| {
            let id = resolve_habit(t, &habit)?;
            t.remove_habit(&id);
            Ok("Removed.".to_string())
        })?,
        Command::Set { habit, status } => mutate_habits(services, today, |t| {
            let id = resolve_habit(t, &habit)?;
            t.set_status(&id, status, today);
            Ok(format!("{} · streak {}", t.status(&id).label(), t.streak(&id)))
        })?,
        Command::Toggle { habit } => mutate_habits(services, today, |t| {
            let id = resolve_habit(t, &habit)?;
            t.cycle_status(&id, today);
            Ok(format!("{} · streak {}", t.status(&id).label(), t.streak(&id)))
        })?,
        Command::Export { format, out } => export_data(services, format, out, today)?,
        Command::Templates => println!("{}", list_templates()),
        Command::ApplyTemplate { slug, yes } => apply_template(services, &slug, yes, today).await?,
        Command::Reminders { action } => {
            run_reminder_command(services, action.unwrap_or(ReminderCommand::List)).await?
        }
        Command::Remind => {
            let mut notifier = services.console_notifier();
            let scheduler = ReminderScheduler::new(services.store.load_reminders(now_millis()));
            println!("Reminders running. Press Ctrl-C to stop.");
            reminders::run_foreground(
                scheduler,
                &mut notifier,
                &services.store,
                Duration::from_secs(services.config.reminders.poll_secs.max(1)),
            )
            .await?;
        }
        Command::Login => login(services).await?,
        Command::Logout => {
            auth::clear_session(&services.session_path())?;
            println!("Signed out.");
        }
        Command::Sync => sync_now(services).await?,
        Command::Completions { shell } => print_completions(shell),
    }

    if changes_habits {
        push_snapshot(services, today).await;
    }
    Ok(())
}

pub fn report_error(e: &PulseError) -> ! {
    warn!(error = %e, "command failed");
    eprintln!("Error: {e}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::reminders::ReminderPayload;

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["pulse", "set", "Drink Water", "full"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Set {
                status: CompletionStatus::Full,
                ..
            })
        ));

        let cli = Cli::try_parse_from(["pulse", "toggle", "1"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Toggle { .. })));
        assert!(Cli::try_parse_from(["pulse", "set", "Walk", "later"]).is_err());

        let cli = Cli::try_parse_from(["pulse", "--config", "/tmp/c.toml"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));

        let cli = Cli::try_parse_from(["pulse", "reminders", "interval", "preset_eye_rest", "15"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Reminders {
                action: Some(ReminderCommand::Interval { .. })
            })
        ));

        assert!(Cli::try_parse_from(["pulse", "export", "--format", "ics"]).is_err());
    }

    #[test]
    fn test_resolve_habit_by_name_id_or_position() {
        let mut tracker = HabitTracker::new();
        tracker.add_habit("Walk");
        tracker.add_habit("Read");
        let walk = tracker.habits()[1].id.clone();

        assert_eq!(resolve_habit(&tracker, "walk").unwrap(), walk);
        assert_eq!(resolve_habit(&tracker, walk.as_str()).unwrap(), walk);
        assert_eq!(resolve_habit(&tracker, "2").unwrap(), walk);
        assert!(matches!(resolve_habit(&tracker, "3"), Err(PulseError::NotFound(_))));
        assert!(resolve_habit(&tracker, "0").is_err());
    }

    #[test]
    fn test_checklist_rendering() {
        let today = day("2026-08-01");
        let mut tracker = HabitTracker::new();
        assert!(render_checklist(&tracker, today).contains("No habits yet"));

        tracker.add_habit("Walk");
        let id = tracker.habits()[0].id.clone();
        tracker.set_status(&id, CompletionStatus::Full, today);
        let text = render_checklist(&tracker, today);
        assert!(text.starts_with("Today 2026-08-01 · momentum 100%"));
        assert!(text.contains(" 1. [x] Walk"));
        assert!(text.contains("streak 1"));
    }

    #[test]
    fn test_reminders_rendering_shows_state() {
        let scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let text = render_reminders(&scheduler);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("preset_hydration"));
        assert!(text.lines().all(|l| l.ends_with("off")));
    }

    #[test]
    fn test_templates_listing_includes_every_slug() {
        let text = list_templates();
        for template in &TEMPLATES {
            assert!(text.contains(template.slug));
            assert!(text.contains(template.tagline));
        }
    }
}
