use chrono::NaiveDate;

use crate::{
    domain::{DayKey, HabitId},
    reminders::{ReminderItem, ReminderState, format_clock},
};

use super::App;

const MINUTE_MS: i64 = 60_000;

/// Time left until `due`, rounded up to whole minutes.
pub fn format_countdown(now_ms: i64, due_ms: i64) -> String {
    let remaining = due_ms - now_ms;
    if remaining <= 0 {
        return "due".to_string();
    }
    let minutes = (remaining + MINUTE_MS - 1) / MINUTE_MS;
    if minutes < 60 {
        format!("in {minutes}m")
    } else {
        format!("in {}h {:02}m", minutes / 60, minutes % 60)
    }
}

pub fn format_interval(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("every {m}m"),
        (h, 0) => format!("every {h}h"),
        (h, m) => format!("every {h}h {m}m"),
    }
}

/// "today", "yesterday", or a short date for the last full completion.
pub fn format_last_done(day: DayKey, today: NaiveDate) -> Option<String> {
    let date = day.date()?;
    let label = match (today - date).num_days() {
        0 => "today".to_string(),
        1 => "yesterday".to_string(),
        _ => date.format("%b %-d").to_string(),
    };
    Some(label)
}

impl App {
    pub(super) fn reminder_schedule_label(&self, item: &ReminderItem, now_ms: i64) -> String {
        match item.state() {
            ReminderState::Disabled => "off".to_string(),
            ReminderState::Pending => "waiting".to_string(),
            ReminderState::Armed { next_fire_at } => format!(
                "{} ({})",
                format_countdown(now_ms, next_fire_at),
                format_clock(next_fire_at)
            ),
        }
    }

    pub(super) fn streak_label(&self, id: &HabitId) -> String {
        let streak = self.tracker.streak(id);
        match format_last_done(self.tracker.last_complete_date(id), self.today) {
            Some(last) if streak > 0 => format!("{streak}d streak · {last}"),
            Some(last) => format!("last {last}"),
            None => String::new(),
        }
    }

    pub(super) fn truncate_label(&self, value: &str, max_chars: usize) -> String {
        let count = value.chars().count();
        if count <= max_chars {
            return value.to_string();
        }

        if max_chars <= 3 {
            return value.chars().take(max_chars).collect();
        }

        let prefix: String = value.chars().take(max_chars - 3).collect();
        format!("{}...", prefix)
    }
}
