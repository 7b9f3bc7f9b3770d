use std::time::Instant;

use chrono::NaiveDate;
use tracing::info;

use crate::{
    constants::{
        HABIT_SUGGESTIONS, INTERVAL_STEP_MINUTES, NOTIFICATIONS_BLOCKED_MESSAGE, REMINDER_LIMITS,
    },
    domain::{CompletionStatus, Habit, HabitId, HabitTracker},
    reminders::{ReminderItem, now_millis},
    storage::hydrate_habit_payload,
};

use super::{App, ReminderField};

impl App {
    /// Local write first, then a debounced cloud push when signed in.
    pub(super) fn persist_habits(&mut self) {
        self.services
            .store
            .save_habits(&self.tracker.to_payload(self.today));
        self.sync.note_local_change(Instant::now());
        self.render_needed = true;
    }

    pub(super) fn persist_reminders(&mut self) {
        self.services.store.save_reminders(&self.scheduler.payload());
        self.sync.note_local_change(Instant::now());
        self.render_needed = true;
    }

    /// Re-hydrates when the local date changes so statuses reset for the new day.
    pub(super) fn roll_day_if_needed(&mut self, today: NaiveDate) {
        if today == self.today {
            return;
        }
        let Ok(raw) = serde_json::to_value(self.tracker.to_payload(self.today)) else {
            return;
        };
        info!(from = %self.today, to = %today, "new day, resetting statuses");
        self.today = today;
        self.tracker = HabitTracker::from_payload(hydrate_habit_payload(Some(&raw), false, today));
        self.persist_habits();
    }

    pub(super) fn selected_habit(&self) -> Option<&Habit> {
        self.tracker.habit_by_index(self.selected_index)
    }

    fn selected_habit_id(&self) -> Option<HabitId> {
        self.selected_habit().map(|habit| habit.id.clone())
    }

    pub(super) fn cycle_selected(&mut self) {
        let Some(id) = self.selected_habit_id() else {
            return;
        };
        if self.tracker.cycle_status(&id, self.today) {
            self.persist_habits();
        }
    }

    pub(super) fn set_selected_status(&mut self, status: CompletionStatus) {
        let Some(id) = self.selected_habit_id() else {
            return;
        };
        if self.tracker.status(&id) != status && self.tracker.set_status(&id, status, self.today) {
            self.persist_habits();
        }
    }

    pub(super) fn submit_new_habit(&mut self) -> bool {
        if self.tracker.add_habit(&self.input) {
            self.selected_index = 0;
            self.persist_habits();
            true
        } else {
            self.notice = Some("Name is empty or already on the list.".to_string());
            false
        }
    }

    pub(super) fn submit_rename(&mut self) -> bool {
        let Some(id) = self.selected_habit_id() else {
            return true;
        };
        if self.tracker.update_habit_name(&id, &self.input) {
            self.persist_habits();
            true
        } else {
            self.notice = Some("Name is empty or already used.".to_string());
            false
        }
    }

    pub(super) fn remove_selected(&mut self) {
        let Some(id) = self.selected_habit_id() else {
            return;
        };
        if self.tracker.remove_habit(&id) {
            let count = self.tracker.habit_count();
            if self.selected_index >= count {
                self.selected_index = count.saturating_sub(1);
            }
            self.persist_habits();
        }
    }

    /// Fills the add-habit input with the next suggestion not already on the list.
    pub(super) fn next_suggestion(&mut self) {
        let len = HABIT_SUGGESTIONS.len();
        for offset in 0..len {
            let candidate = HABIT_SUGGESTIONS[(self.suggestion_index + offset) % len];
            if self.tracker.find(candidate).is_none() {
                self.input = candidate.to_string();
                self.suggestion_index = (self.suggestion_index + offset + 1) % len;
                return;
            }
        }
    }

    pub(super) fn selected_reminder(&self) -> Option<&ReminderItem> {
        self.scheduler.items().get(self.reminder_index)
    }

    fn selected_reminder_id(&self) -> Option<String> {
        self.selected_reminder().map(|item| item.id.clone())
    }

    pub(super) fn toggle_selected_reminder(&mut self) {
        let Some(item) = self.selected_reminder() else {
            return;
        };
        let (id, enabled) = (item.id.clone(), item.enabled);
        let before = self.scheduler.payload();
        self.scheduler
            .set_enabled(&id, !enabled, &mut self.notifier, now_millis());
        if self.scheduler.payload() != before {
            self.persist_reminders();
        }
        self.render_needed = true;
    }

    pub(super) fn step_selected_interval(&mut self, direction: i64) {
        let Some(item) = self.selected_reminder() else {
            return;
        };
        let id = item.id.clone();
        let step = direction * i64::from(INTERVAL_STEP_MINUTES);
        let minutes = i64::from(item.interval_minutes) + step;
        if self.scheduler.set_interval(&id, minutes as f64, now_millis()) {
            self.persist_reminders();
        }
    }

    pub(super) fn remove_selected_reminder(&mut self) {
        let Some(id) = self.selected_reminder_id() else {
            return;
        };
        if self.scheduler.remove_item(&id) {
            let count = self.scheduler.items().len();
            if self.reminder_index >= count {
                self.reminder_index = count.saturating_sub(1);
            }
            self.persist_reminders();
        }
    }

    /// Applies the reminder input to the field being edited.
    pub(super) fn submit_reminder_field(&mut self, field: ReminderField) -> bool {
        let now = now_millis();
        if field == ReminderField::New {
            return match self.scheduler.add_item(
                &self.input,
                "",
                f64::from(REMINDER_LIMITS.fallback_interval_minutes),
            ) {
                Some(_) => {
                    self.reminder_index = self.scheduler.items().len().saturating_sub(1);
                    self.persist_reminders();
                    true
                }
                None => {
                    self.notice = Some("Reminder list is full.".to_string());
                    false
                }
            };
        }

        let Some(id) = self.selected_reminder_id() else {
            return true;
        };
        let changed = match field {
            ReminderField::Interval => match self.input.trim().parse::<f64>() {
                Ok(minutes) => self.scheduler.set_interval(&id, minutes, now),
                Err(_) => {
                    self.notice = Some("Interval must be a number of minutes.".to_string());
                    return false;
                }
            },
            ReminderField::Title => self.scheduler.set_title(&id, &self.input, now),
            ReminderField::Body => self.scheduler.set_body(&id, &self.input, now),
            ReminderField::New => false,
        };
        if changed {
            self.persist_reminders();
        }
        true
    }

    pub(super) fn reminder_error(&self) -> Option<&str> {
        self.scheduler.error()
    }

    pub(super) fn reminders_blocked(&self) -> bool {
        self.reminder_error() == Some(NOTIFICATIONS_BLOCKED_MESSAGE)
    }
}
