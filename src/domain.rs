use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::HABIT_NAME_MAX_CHARS;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(pub String);

impl HabitId {
    pub fn new(id: impl Into<String>) -> Self {
        HabitId(id.into())
    }

    pub fn generate() -> Self {
        HabitId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
}

/// Per-day completion level of a habit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CompletionStatus {
    #[default]
    Empty,
    Partial,
    Full,
}

impl CompletionStatus {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(CompletionStatus::Empty),
            1 => Some(CompletionStatus::Partial),
            2 => Some(CompletionStatus::Full),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            CompletionStatus::Empty => 0,
            CompletionStatus::Partial => 1,
            CompletionStatus::Full => 2,
        }
    }

    /// Tap order: empty, partial, full, back to empty.
    pub fn next(self) -> Self {
        match self {
            CompletionStatus::Empty => CompletionStatus::Partial,
            CompletionStatus::Partial => CompletionStatus::Full,
            CompletionStatus::Full => CompletionStatus::Empty,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CompletionStatus::Empty => "empty",
            CompletionStatus::Partial => "partial",
            CompletionStatus::Full => "full",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "0" | "empty" | "none" => Some(CompletionStatus::Empty),
            "1" | "partial" | "half" => Some(CompletionStatus::Partial),
            "2" | "full" | "done" => Some(CompletionStatus::Full),
            _ => None,
        }
    }
}

impl From<CompletionStatus> for u8 {
    fn from(status: CompletionStatus) -> Self {
        status.level()
    }
}

impl TryFrom<u8> for CompletionStatus {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        CompletionStatus::from_level(level).ok_or_else(|| format!("invalid status level {level}"))
    }
}

/// A local calendar day, or "never". Serialized as `YYYY-MM-DD` or `""`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(Option<NaiveDate>);

impl DayKey {
    pub const NONE: DayKey = DayKey(None);

    pub fn of(date: NaiveDate) -> Self {
        DayKey(Some(date))
    }

    /// Anything that is not a `YYYY-MM-DD` date reads as "never".
    pub fn parse(raw: &str) -> Self {
        DayKey(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
    }

    pub fn date(self) -> Option<NaiveDate> {
        self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            None => Ok(()),
        }
    }
}

impl Serialize for DayKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DayKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(DayKey::parse(&raw))
    }
}

/// Snapshot taken when a habit turns full, consumed if that is undone the same day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoBackup {
    pub prev_date: DayKey,
    pub prev_streak: u32,
}

/// The persisted unit for habit data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitPayload {
    pub date: DayKey,
    pub habits: Vec<Habit>,
    pub status_by_id: BTreeMap<HabitId, CompletionStatus>,
    pub streak_by_id: BTreeMap<HabitId, u32>,
    pub last_complete_date_by_id: BTreeMap<HabitId, DayKey>,
    pub today_backup_by_id: BTreeMap<HabitId, UndoBackup>,
}

impl HabitPayload {
    /// Rebuilds every per-id map from the habit list so no orphan keys survive.
    pub fn canonical(
        date: DayKey,
        habits: Vec<Habit>,
        status_by_id: &BTreeMap<HabitId, CompletionStatus>,
        streak_by_id: &BTreeMap<HabitId, u32>,
        last_complete_date_by_id: &BTreeMap<HabitId, DayKey>,
        today_backup_by_id: &BTreeMap<HabitId, UndoBackup>,
    ) -> Self {
        let mut payload = HabitPayload {
            date,
            ..HabitPayload::default()
        };

        for habit in &habits {
            let id = &habit.id;
            payload
                .status_by_id
                .insert(id.clone(), status_by_id.get(id).copied().unwrap_or_default());
            payload
                .streak_by_id
                .insert(id.clone(), streak_by_id.get(id).copied().unwrap_or(0));
            payload.last_complete_date_by_id.insert(
                id.clone(),
                last_complete_date_by_id.get(id).copied().unwrap_or_default(),
            );
            if let Some(backup) = today_backup_by_id.get(id) {
                payload.today_backup_by_id.insert(id.clone(), *backup);
            }
        }

        payload.habits = habits;
        payload
    }
}

pub fn local_day(now: &DateTime<Local>) -> NaiveDate {
    now.date_naive()
}

pub fn today_local() -> NaiveDate {
    local_day(&Local::now())
}

/// Trim, cut to the length limit, and drop whitespace the cut exposed.
pub fn normalize_habit_name(raw: &str) -> String {
    let truncated: String = raw.trim().chars().take(HABIT_NAME_MAX_CHARS).collect();
    truncated.trim_end().to_string()
}

/// In-memory owner of habit state. Every mutation returns whether it applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HabitTracker {
    habits: Vec<Habit>,
    status_by_id: BTreeMap<HabitId, CompletionStatus>,
    streak_by_id: BTreeMap<HabitId, u32>,
    last_complete_by_id: BTreeMap<HabitId, DayKey>,
    backup_by_id: BTreeMap<HabitId, UndoBackup>,
}

impl HabitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_payload(payload: HabitPayload) -> Self {
        let payload = HabitPayload::canonical(
            payload.date,
            payload.habits,
            &payload.status_by_id,
            &payload.streak_by_id,
            &payload.last_complete_date_by_id,
            &payload.today_backup_by_id,
        );

        Self {
            habits: payload.habits,
            status_by_id: payload.status_by_id,
            streak_by_id: payload.streak_by_id,
            last_complete_by_id: payload.last_complete_date_by_id,
            backup_by_id: payload.today_backup_by_id,
        }
    }

    pub fn to_payload(&self, today: NaiveDate) -> HabitPayload {
        HabitPayload::canonical(
            DayKey::of(today),
            self.habits.clone(),
            &self.status_by_id,
            &self.streak_by_id,
            &self.last_complete_by_id,
            &self.backup_by_id,
        )
    }

    pub fn habits(&self) -> &[Habit] {
        &self.habits
    }

    pub fn habit_count(&self) -> usize {
        self.habits.len()
    }

    pub fn habit_by_index(&self, index: usize) -> Option<&Habit> {
        self.habits.get(index)
    }

    /// Looks a habit up by exact id first, then by case-insensitive name.
    pub fn find(&self, query: &str) -> Option<&Habit> {
        let query = query.trim();
        self.habits
            .iter()
            .find(|h| h.id.as_str() == query)
            .or_else(|| {
                let lowered = query.to_lowercase();
                self.habits.iter().find(|h| h.name.to_lowercase() == lowered)
            })
    }

    pub fn status(&self, id: &HabitId) -> CompletionStatus {
        self.status_by_id.get(id).copied().unwrap_or_default()
    }

    pub fn streak(&self, id: &HabitId) -> u32 {
        self.streak_by_id.get(id).copied().unwrap_or(0)
    }

    pub fn last_complete_date(&self, id: &HabitId) -> DayKey {
        self.last_complete_by_id.get(id).copied().unwrap_or_default()
    }

    fn name_taken(&self, name: &str, except: Option<&HabitId>) -> bool {
        let lowered = name.to_lowercase();
        self.habits
            .iter()
            .filter(|h| Some(&h.id) != except)
            .any(|h| h.name.to_lowercase() == lowered)
    }

    pub fn add_habit(&mut self, raw_name: &str) -> bool {
        let name = normalize_habit_name(raw_name);
        if name.is_empty() || self.name_taken(&name, None) {
            return false;
        }

        let id = HabitId::generate();
        self.status_by_id.insert(id.clone(), CompletionStatus::Empty);
        self.streak_by_id.insert(id.clone(), 0);
        self.last_complete_by_id.insert(id.clone(), DayKey::NONE);
        self.habits.insert(0, Habit { id, name });
        true
    }

    pub fn update_habit_name(&mut self, id: &HabitId, raw_name: &str) -> bool {
        let name = normalize_habit_name(raw_name);
        if name.is_empty() || self.name_taken(&name, Some(id)) {
            return false;
        }

        match self.habits.iter_mut().find(|h| &h.id == id) {
            Some(habit) => {
                habit.name = name;
                true
            }
            None => false,
        }
    }

    pub fn remove_habit(&mut self, id: &HabitId) -> bool {
        let before = self.habits.len();
        self.habits.retain(|h| &h.id != id);
        self.status_by_id.remove(id);
        self.streak_by_id.remove(id);
        self.last_complete_by_id.remove(id);
        self.backup_by_id.remove(id);
        self.habits.len() != before
    }

    /// Applies `next` and runs the streak transition for `today`.
    pub fn set_status(&mut self, id: &HabitId, next: CompletionStatus, today: NaiveDate) -> bool {
        if !self.habits.iter().any(|h| &h.id == id) {
            return false;
        }

        let prev = self.status(id);
        let last_complete = self.last_complete_date(id);
        let prev_streak = self.streak(id);
        let today_key = DayKey::of(today);

        self.status_by_id.insert(id.clone(), next);

        let into_full = next == CompletionStatus::Full && prev != CompletionStatus::Full;
        let out_of_full = prev == CompletionStatus::Full && next != CompletionStatus::Full;

        if into_full {
            if last_complete == today_key {
                return true;
            }

            let yesterday = today.pred_opt().map(DayKey::of);
            let next_streak = if last_complete.date().is_some() && Some(last_complete) == yesterday
            {
                prev_streak.saturating_add(1)
            } else {
                1
            };

            self.backup_by_id.insert(
                id.clone(),
                UndoBackup {
                    prev_date: last_complete,
                    prev_streak,
                },
            );
            self.last_complete_by_id.insert(id.clone(), today_key);
            self.streak_by_id.insert(id.clone(), next_streak);
        } else if out_of_full && last_complete == today_key {
            let backup = self.backup_by_id.remove(id).unwrap_or_default();
            self.last_complete_by_id.insert(id.clone(), backup.prev_date);
            self.streak_by_id.insert(id.clone(), backup.prev_streak);
        }

        true
    }

    pub fn cycle_status(&mut self, id: &HabitId, today: NaiveDate) -> bool {
        let next = self.status(id).next();
        self.set_status(id, next, today)
    }

    /// Habits at full completion; partial ones do not count toward momentum.
    pub fn completed_count(&self) -> usize {
        self.habits
            .iter()
            .filter(|h| self.status(&h.id) == CompletionStatus::Full)
            .count()
    }

    pub fn checklist_done(&self) -> f32 {
        self.habits
            .iter()
            .map(|h| match self.status(&h.id) {
                CompletionStatus::Full => 1.0,
                CompletionStatus::Partial => 0.5,
                CompletionStatus::Empty => 0.0,
            })
            .sum()
    }

    pub fn momentum_percent(&self) -> u16 {
        let total = self.habits.len();
        if total == 0 {
            return 0;
        }
        let done = self.completed_count().min(total);
        ((done as f64 / total as f64) * 100.0).round() as u16
    }
}
