use std::{
    collections::{BTreeMap, HashSet},
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDate};
use directories::ProjectDirs;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    constants::{FILE_NAMES, MAX_BACKUPS, SEED_HABITS},
    domain::{
        CompletionStatus, DayKey, Habit, HabitId, HabitPayload, UndoBackup, normalize_habit_name,
    },
    error::{PulseError, Result},
    reminders::{ReminderPayload, decode_reminder_payload},
};

pub struct LoadedHabits {
    pub has_stored_payload: bool,
    pub payload: HabitPayload,
}

fn positive_count(value: Option<&Value>) -> u32 {
    match value.and_then(Value::as_f64) {
        Some(n) if n.is_finite() && n > 0.0 => n.floor().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn day_key(value: Option<&Value>) -> DayKey {
    value.and_then(Value::as_str).map(DayKey::parse).unwrap_or_default()
}

/// Coerces any decoded JSON into a canonical habit payload. Never fails.
pub fn normalize_habit_payload(raw: &Value) -> HabitPayload {
    let Some(obj) = raw.as_object() else {
        return HabitPayload::default();
    };

    let mut seen = HashSet::new();
    let habits: Vec<Habit> = obj
        .get("habits")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = normalize_habit_name(item.get("name")?.as_str()?);
                    if name.is_empty() {
                        return None;
                    }
                    let id = match item.get("id").and_then(Value::as_str) {
                        Some(id) if !id.is_empty() => HabitId::new(id),
                        _ => HabitId::generate(),
                    };
                    seen.insert(id.clone()).then_some(Habit { id, name })
                })
                .collect()
        })
        .unwrap_or_default();

    let field = |key: &str| obj.get(key).and_then(Value::as_object);
    let mut status_by_id = BTreeMap::new();
    let mut streak_by_id = BTreeMap::new();
    let mut last_by_id = BTreeMap::new();
    let mut backup_by_id = BTreeMap::new();

    for habit in &habits {
        let key = habit.id.as_str();

        let status = field("statusById")
            .and_then(|m| m.get(key))
            .and_then(Value::as_f64)
            .filter(|n| n.fract() == 0.0 && (1.0..=2.0).contains(n))
            .and_then(|n| CompletionStatus::from_level(n as u8))
            .unwrap_or_default();
        status_by_id.insert(habit.id.clone(), status);

        streak_by_id.insert(
            habit.id.clone(),
            positive_count(field("streakById").and_then(|m| m.get(key))),
        );
        last_by_id.insert(
            habit.id.clone(),
            day_key(field("lastCompleteDateById").and_then(|m| m.get(key))),
        );

        if let Some(backup) = field("todayBackupById")
            .and_then(|m| m.get(key))
            .and_then(Value::as_object)
        {
            backup_by_id.insert(
                habit.id.clone(),
                UndoBackup {
                    prev_date: day_key(backup.get("prevDate")),
                    prev_streak: positive_count(backup.get("prevStreak")),
                },
            );
        }
    }

    HabitPayload::canonical(
        day_key(obj.get("date")),
        habits,
        &status_by_id,
        &streak_by_id,
        &last_by_id,
        &backup_by_id,
    )
}

/// Fresh payload: new ids, every status empty.
pub fn build_payload_from_names<S: AsRef<str>>(names: &[S], today: NaiveDate) -> HabitPayload {
    let mut seen = HashSet::new();
    let habits: Vec<Habit> = names
        .iter()
        .map(|name| normalize_habit_name(name.as_ref()))
        .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
        .map(|name| Habit {
            id: HabitId::generate(),
            name,
        })
        .collect();

    HabitPayload::canonical(
        DayKey::of(today),
        habits,
        &BTreeMap::new(),
        &BTreeMap::new(),
        &BTreeMap::new(),
        &BTreeMap::new(),
    )
}

/// Normalizes and rolls the payload forward to `today`.
///
/// A stored date other than today clears statuses and undo backups; streaks,
/// last completion dates and ids survive. An empty list gets the starter
/// habits when `seed_if_empty` is set.
pub fn hydrate_habit_payload(
    raw: Option<&Value>,
    seed_if_empty: bool,
    today: NaiveDate,
) -> HabitPayload {
    let mut payload = raw.map(normalize_habit_payload).unwrap_or_default();
    let today_key = DayKey::of(today);

    if payload.date != today_key {
        payload
            .status_by_id
            .values_mut()
            .for_each(|status| *status = CompletionStatus::Empty);
        payload.today_backup_by_id.clear();
    }

    if payload.habits.is_empty() && seed_if_empty {
        payload = build_payload_from_names(&SEED_HABITS, today);
    }

    payload.date = today_key;
    payload
}

/// Owns the two JSON blobs in the data directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn habits_path(&self) -> PathBuf {
        self.dir.join(FILE_NAMES.habits)
    }

    pub fn reminders_path(&self) -> PathBuf {
        self.dir.join(FILE_NAMES.reminders)
    }

    fn read_value(&self, path: &Path) -> Option<Value> {
        if !path.exists() {
            return None;
        }
        match read_json::<Value>(path) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read stored data");
                None
            }
        }
    }

    /// Stored habit JSON as written, if any and parseable.
    pub fn raw_habits(&self) -> Option<Value> {
        self.read_value(&self.habits_path())
    }

    pub fn load_habits(&self, seed_if_empty: bool, today: NaiveDate) -> LoadedHabits {
        let raw = self.raw_habits();
        LoadedHabits {
            has_stored_payload: raw.is_some(),
            payload: hydrate_habit_payload(raw.as_ref(), seed_if_empty, today),
        }
    }

    pub fn try_save_habits(&self, payload: &HabitPayload) -> Result<()> {
        ensure_dir(&self.dir)?;
        write_json_atomic(&self.habits_path(), payload)
            .map_err(|e| PulseError::Storage(format!("could not save habits: {e}")))?;
        debug!(habits = payload.habits.len(), "saved habit payload");
        Ok(())
    }

    pub fn save_habits(&self, payload: &HabitPayload) {
        if let Err(e) = self.try_save_habits(payload) {
            warn!(error = %e, "habit save failed, continuing in memory");
        }
    }

    pub fn load_reminders(&self, now_ms: i64) -> ReminderPayload {
        match self.read_value(&self.reminders_path()) {
            Some(raw) => decode_reminder_payload(&raw, now_ms),
            None => ReminderPayload::defaults(),
        }
    }

    pub fn try_save_reminders(&self, payload: &ReminderPayload) -> Result<()> {
        ensure_dir(&self.dir)?;
        write_json_atomic(&self.reminders_path(), payload)
            .map_err(|e| PulseError::Storage(format!("could not save reminders: {e}")))?;
        debug!(items = payload.items.len(), "saved reminder payload");
        Ok(())
    }

    pub fn save_reminders(&self, payload: &ReminderPayload) {
        if let Err(e) = self.try_save_reminders(payload) {
            warn!(error = %e, "reminder save failed, continuing in memory");
        }
    }

    /// Stored habits normalized but not rolled forward; the empty shape when missing or corrupt.
    pub fn export_payload(&self) -> HabitPayload {
        self.raw_habits()
            .map(|raw| normalize_habit_payload(&raw))
            .unwrap_or_default()
    }
}

pub fn default_export_file_name(today: NaiveDate) -> String {
    format!("pulseDaily_backup_{}.json", today.format("%Y%m%d"))
}

pub fn export_json(path: &Path, payload: &HabitPayload) -> Result<()> {
    let json = serde_json::to_string_pretty(payload)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn export_csv(path: &Path, payload: &HabitPayload) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    writer
        .write_record(["id", "name", "status", "streak", "last_complete_date"])
        .map_err(csv_error)?;

    for habit in &payload.habits {
        let status = payload
            .status_by_id
            .get(&habit.id)
            .copied()
            .unwrap_or_default();
        let streak = payload.streak_by_id.get(&habit.id).copied().unwrap_or(0);
        let last = payload
            .last_complete_date_by_id
            .get(&habit.id)
            .copied()
            .unwrap_or_default();

        writer
            .write_record([
                habit.id.as_str(),
                habit.name.as_str(),
                status.label(),
                &streak.to_string(),
                &last.to_string(),
            ])
            .map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}

fn csv_error(e: csv::Error) -> PulseError {
    PulseError::Storage(format!("csv export failed: {e}"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "pulse", "pulse")
}

/// Resolution order: configured override, a data file in the working
/// directory, the platform data dir.
pub fn get_data_dir(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        fs::create_dir_all(dir).ok();
        return dir.to_path_buf();
    }

    if Path::new(".").join(FILE_NAMES.habits).exists() {
        return PathBuf::from(".");
    }

    if let Some(proj_dirs) = project_dirs() {
        let data_dir = proj_dirs.data_dir().to_path_buf();
        fs::create_dir_all(&data_dir).ok();
        data_dir
    } else {
        PathBuf::from(".")
    }
}

pub fn get_state_dir() -> PathBuf {
    if let Some(proj_dirs) = project_dirs()
        && let Some(state_dir) = proj_dirs.state_dir()
    {
        let dir = state_dir.to_path_buf();
        fs::create_dir_all(&dir).ok();
        return dir;
    }
    get_data_dir(None)
}

pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, &json)
}

pub fn delete_file_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn create_backup(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let backup_dir = path.parent().unwrap_or(Path::new(".")).join("backups");
    fs::create_dir_all(&backup_dir)?;

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    fs::copy(path, backup_dir.join(format!("{file_name}.{timestamp}")))?;

    let mut backups: Vec<_> = fs::read_dir(&backup_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(&format!("{file_name}."))
        })
        .collect();
    backups.sort_by_key(|e| e.file_name());

    let excess = backups.len().saturating_sub(MAX_BACKUPS);
    for oldest in backups.iter().take(excess) {
        let _ = fs::remove_file(oldest.path());
    }

    Ok(())
}

/// Writes JSON through a temp file without keeping backups of the old content.
pub fn write_json_no_backup<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    replace_file(path, &json)
}

/// Deletes every rotated backup of `path`.
pub fn remove_backups(path: &Path) -> Result<()> {
    let backup_dir = path.parent().unwrap_or(Path::new(".")).join("backups");
    if !backup_dir.exists() {
        return Ok(());
    }
    let prefix = format!("{}.", path.file_name().unwrap_or_default().to_string_lossy());
    for entry in fs::read_dir(&backup_dir)?.filter_map(|e| e.ok()) {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        create_backup(path)?;
    }
    replace_file(path, content)
}

fn replace_file(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(content.as_bytes())?;
    tmp_file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;

    use super::*;
    use crate::domain::HabitTracker;

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_normalize_drops_malformed_entries() {
        let raw = json!({
            "date": "2026-03-01",
            "habits": [
                {"id": "a", "name": "  Drink Water "},
                {"id": "b", "name": "   "},
                {"id": 7, "name": "Numeric id"},
                {"name": 12},
                "not an object",
                {"id": "a", "name": "Duplicate id"}
            ],
            "statusById": {"a": 2, "ghost": 1},
            "streakById": {"a": 4.7, "ghost": 9},
            "lastCompleteDateById": {"a": "2026-03-01"},
            "todayBackupById": {"a": {"prevDate": 5, "prevStreak": -2}}
        });

        let payload = normalize_habit_payload(&raw);
        assert_eq!(payload.habits.len(), 2);
        assert_eq!(payload.habits[0].id, HabitId::new("a"));
        assert_eq!(payload.habits[0].name, "Drink Water");
        assert_eq!(payload.habits[1].name, "Numeric id");
        assert_ne!(payload.habits[1].id.as_str(), "7");

        let a = HabitId::new("a");
        assert_eq!(payload.status_by_id[&a], CompletionStatus::Full);
        assert_eq!(payload.streak_by_id[&a], 4);
        assert_eq!(payload.today_backup_by_id[&a], UndoBackup::default());
        assert!(!payload.status_by_id.contains_key(&HabitId::new("ghost")));
        assert_eq!(payload.status_by_id.len(), 2);
    }

    #[test]
    fn test_missing_ids_are_minted_until_saved() {
        let raw = json!({"date": "2026-03-01", "habits": [{"name": "Walk"}]});

        let first = normalize_habit_payload(&raw);
        let second = normalize_habit_payload(&raw);
        assert!(!first.habits[0].id.as_str().is_empty());
        assert_ne!(first.habits[0].id, second.habits[0].id);

        let stored = serde_json::to_value(&first).unwrap();
        assert_eq!(normalize_habit_payload(&stored), first);
    }

    #[test]
    fn test_normalize_clamps_bad_values() {
        let raw = json!({
            "habits": [{"id": "x", "name": "Walk"}],
            "statusById": {"x": 3},
            "streakById": {"x": "12"},
            "lastCompleteDateById": {"x": 20260301}
        });

        let payload = normalize_habit_payload(&raw);
        let x = HabitId::new("x");
        assert_eq!(payload.status_by_id[&x], CompletionStatus::Empty);
        assert_eq!(payload.streak_by_id[&x], 0);
        assert_eq!(payload.last_complete_date_by_id[&x], DayKey::NONE);
        assert_eq!(payload.date, DayKey::NONE);
    }

    #[test]
    fn test_normalize_non_object_yields_empty_shape() {
        for raw in [json!(null), json!([1, 2]), json!("text")] {
            assert_eq!(normalize_habit_payload(&raw), HabitPayload::default());
        }
    }

    #[test]
    fn test_hydrate_seeds_when_empty() {
        let payload = hydrate_habit_payload(None, true, day("2026-04-01"));
        let names: Vec<&str> = payload.habits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Drink Water", "Read 1 Page"]);
        assert_eq!(payload.date, DayKey::of(day("2026-04-01")));

        let unseeded = hydrate_habit_payload(None, false, day("2026-04-01"));
        assert!(unseeded.habits.is_empty());
    }

    #[test]
    fn test_hydrate_same_day_is_idempotent() {
        let today = day("2026-04-01");
        let mut tracker = HabitTracker::from_payload(hydrate_habit_payload(None, true, today));
        let id = tracker.habits()[0].id.clone();
        tracker.set_status(&id, CompletionStatus::Full, today);

        let value = serde_json::to_value(tracker.to_payload(today)).unwrap();
        let once = hydrate_habit_payload(Some(&value), true, today);
        let twice = hydrate_habit_payload(
            Some(&serde_json::to_value(&once).unwrap()),
            true,
            today,
        );
        assert_eq!(once, twice);
        assert_eq!(once.status_by_id[&id], CompletionStatus::Full);
        assert!(once.today_backup_by_id.contains_key(&id));
    }

    #[test]
    fn test_hydrate_new_day_resets_statuses_only() {
        let yesterday = day("2026-04-01");
        let today = day("2026-04-02");
        let mut tracker = HabitTracker::from_payload(hydrate_habit_payload(None, true, yesterday));
        let id = tracker.habits()[0].id.clone();
        tracker.set_status(&id, CompletionStatus::Full, yesterday);
        let value = serde_json::to_value(tracker.to_payload(yesterday)).unwrap();

        let rolled = hydrate_habit_payload(Some(&value), true, today);
        assert_eq!(rolled.date, DayKey::of(today));
        assert_eq!(rolled.habits, tracker.habits());
        assert_eq!(rolled.status_by_id[&id], CompletionStatus::Empty);
        assert_eq!(rolled.streak_by_id[&id], 1);
        assert_eq!(rolled.last_complete_date_by_id[&id], DayKey::of(yesterday));
        assert!(rolled.today_backup_by_id.is_empty());
    }

    #[test]
    fn test_build_payload_from_names() {
        let payload = build_payload_from_names(
            &["  Walk 10 minutes ", "", "walk 10 minutes", "A name that is far too long"],
            day("2026-04-01"),
        );
        let names: Vec<&str> = payload.habits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Walk 10 minutes", "A name that is far t"]);
        assert!(
            payload
                .status_by_id
                .values()
                .all(|s| *s == CompletionStatus::Empty)
        );
    }

    #[test]
    fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let today = day("2026-04-01");

        let loaded = store.load_habits(true, today);
        assert!(!loaded.has_stored_payload);
        store.try_save_habits(&loaded.payload).unwrap();

        let reloaded = store.load_habits(true, today);
        assert!(reloaded.has_stored_payload);
        assert_eq!(reloaded.payload, loaded.payload);
    }

    #[test]
    fn test_corrupt_store_loads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        fs::write(store.habits_path(), "{not json").unwrap();

        let loaded = store.load_habits(false, day("2026-04-01"));
        assert!(!loaded.has_stored_payload);
        assert!(loaded.payload.habits.is_empty());
        assert_eq!(store.export_payload(), HabitPayload::default());
    }

    #[test]
    fn test_save_to_unwritable_dir_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a dir").unwrap();
        let store = LocalStore::new(blocker.join("nested"));

        let payload = build_payload_from_names(&["Walk"], day("2026-04-01"));
        assert!(store.try_save_habits(&payload).is_err());
        store.save_habits(&payload);
    }

    #[test]
    fn test_atomic_write_keeps_bounded_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "v0").unwrap();

        let backup_dir = dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();
        for i in 0..(MAX_BACKUPS + 3) {
            fs::write(backup_dir.join(format!("data.json.20200101_0000{i:02}")), "old").unwrap();
        }

        atomic_write(&path, "v1").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "v1");
        assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), MAX_BACKUPS);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_export_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let today = day("2026-04-01");
        let mut tracker = HabitTracker::from_payload(build_payload_from_names(&["Walk"], today));
        let id = tracker.habits()[0].id.clone();
        tracker.set_status(&id, CompletionStatus::Full, today);
        let payload = tracker.to_payload(today);

        let json_path = dir.path().join(default_export_file_name(today));
        assert!(json_path.ends_with("pulseDaily_backup_20260401.json"));
        export_json(&json_path, &payload).unwrap();
        let back: HabitPayload = read_json(&json_path).unwrap();
        assert_eq!(back, payload);

        let csv_path = dir.path().join("habits.csv");
        export_csv(&csv_path, &payload).unwrap();
        let text = fs::read_to_string(&csv_path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("id,name,status,streak,last_complete_date"));
        assert_eq!(lines.next(), Some(format!("{id},Walk,full,1,2026-04-01").as_str()));
    }
}
