use chrono::NaiveDate;
use serde_json::Value;
use tracing::info;

use crate::{
    domain::HabitPayload,
    error::{PulseError, Result},
    storage::{LocalStore, build_payload_from_names},
};

#[derive(Debug, PartialEq, Eq)]
pub struct HabitTemplate {
    pub slug: &'static str,
    pub title: &'static str,
    pub tagline: &'static str,
    pub habits: &'static [&'static str],
}

pub const TEMPLATES: [HabitTemplate; 3] = [
    HabitTemplate {
        slug: "study",
        title: "Study Sprint",
        tagline: "A tiny daily routine for focused learning.",
        habits: &[
            "Read 10 minutes",
            "Flashcards (5 min)",
            "One practice problem",
            "Write 3-line summary",
            "Plan tomorrow (2 min)",
        ],
    },
    HabitTemplate {
        slug: "fitness",
        title: "Fitness Starter",
        tagline: "Minimal habits that stack into consistency.",
        habits: &[
            "Walk 10 minutes",
            "10 squats",
            "Stretch 2 minutes",
            "Drink water",
            "Sleep: lights out on time",
        ],
    },
    HabitTemplate {
        slug: "focus",
        title: "Focus & Calm",
        tagline: "Lower friction, clearer mind.",
        habits: &[
            "2-minute breathing",
            "Desk reset (1 min)",
            "No-phone first 10 minutes",
            "Write top 1 priority",
            "Short reflection",
        ],
    },
];

pub fn find_template(slug: &str) -> Option<&'static HabitTemplate> {
    let slug = slug.trim();
    TEMPLATES.iter().find(|t| t.slug.eq_ignore_ascii_case(slug))
}

pub fn require_template(slug: &str) -> Result<&'static HabitTemplate> {
    find_template(slug).ok_or_else(|| PulseError::Template(slug.to_string()))
}

#[derive(Debug, PartialEq)]
pub enum ApplyOutcome {
    Applied(HabitPayload),
    Cancelled,
}

/// Number of habits in the stored list, read loosely so a damaged file still counts.
fn stored_habit_count(store: &LocalStore) -> usize {
    store
        .raw_habits()
        .as_ref()
        .and_then(|raw| raw.get("habits"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Replaces the stored habits with the template's list.
///
/// `confirm` receives the number of habits about to be replaced and is only
/// called when that number is non-zero.
pub fn apply_template(
    store: &LocalStore,
    template: &HabitTemplate,
    confirm: impl FnOnce(usize) -> bool,
    today: NaiveDate,
) -> Result<ApplyOutcome> {
    let existing = stored_habit_count(store);
    if existing > 0 && !confirm(existing) {
        return Ok(ApplyOutcome::Cancelled);
    }

    let payload = build_payload_from_names(template.habits, today);
    store.try_save_habits(&payload).map_err(|e| {
        PulseError::Storage(format!("Could not save to local storage ({e})"))
    })?;

    info!(template = template.slug, habits = payload.habits.len(), "template applied");
    Ok(ApplyOutcome::Applied(payload))
}
