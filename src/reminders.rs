//! Reminder records, their versioned storage envelope, and the polling scheduler.

use std::{
    io::{self, BufRead, IsTerminal, Write},
    path::PathBuf,
    time::Duration,
};

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    config::NotificationPolicy,
    constants::{
        EYE_REST_PRESET, HYDRATION_PRESET, NOTIFICATIONS_BLOCKED_MESSAGE, REMINDER_LIMITS,
        REMINDER_STORAGE_VERSION, ReminderPreset,
    },
    error::Result,
    storage::{self, LocalStore},
};

const MINUTE_MS: i64 = 60 * 1000;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local wall-clock `HH:MM` for an epoch-millisecond timestamp.
pub fn format_clock(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(at) => at.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderItem {
    pub id: String,
    pub enabled: bool,
    #[serde(rename = "intervalMin")]
    pub interval_minutes: u32,
    pub title: String,
    pub body: String,
    #[serde(rename = "nextAt")]
    pub next_fire_at: Option<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReminderState {
    Disabled,
    /// Enabled but waiting for permission before it is scheduled.
    Pending,
    Armed { next_fire_at: i64 },
}

impl ReminderItem {
    fn from_preset(preset: &ReminderPreset) -> Self {
        Self {
            id: preset.id.to_string(),
            enabled: false,
            interval_minutes: preset.interval_minutes,
            title: preset.title.to_string(),
            body: preset.body.to_string(),
            next_fire_at: None,
        }
    }

    pub fn state(&self) -> ReminderState {
        match (self.enabled, self.next_fire_at) {
            (false, _) => ReminderState::Disabled,
            (true, None) => ReminderState::Pending,
            (true, Some(next_fire_at)) => ReminderState::Armed { next_fire_at },
        }
    }

    pub fn interval_ms(&self) -> i64 {
        i64::from(self.interval_minutes) * MINUTE_MS
    }

    fn arm(&mut self, now_ms: i64) {
        self.next_fire_at = Some(now_ms + self.interval_ms());
    }

    fn rearm_if_armed(&mut self, now_ms: i64) {
        if self.next_fire_at.is_some() {
            self.arm(now_ms);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub version: u32,
    pub items: Vec<ReminderItem>,
}

impl ReminderPayload {
    pub fn defaults() -> Self {
        Self {
            version: REMINDER_STORAGE_VERSION,
            items: vec![
                ReminderItem::from_preset(&HYDRATION_PRESET),
                ReminderItem::from_preset(&EYE_REST_PRESET),
            ],
        }
    }
}

/// JavaScript `Number(...)` coercion; `None` stands for an absent field.
fn js_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [only] => js_number(Some(only)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Rounds half up, then clamps into `[1, 1440]`. Non-finite input gives `fallback`.
pub fn clamp_interval(minutes: f64, fallback: u32) -> u32 {
    if !minutes.is_finite() {
        return fallback;
    }
    let rounded = (minutes + 0.5).floor();
    rounded.clamp(
        f64::from(REMINDER_LIMITS.min_interval_minutes),
        f64::from(REMINDER_LIMITS.max_interval_minutes),
    ) as u32
}

pub fn clamp_interval_minutes(value: Option<&Value>, fallback: u32) -> u32 {
    clamp_interval(js_number(value), fallback)
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

pub fn sanitize_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        REMINDER_LIMITS.fallback_title.to_string()
    } else {
        truncate_chars(trimmed, REMINDER_LIMITS.title_max_chars)
    }
}

pub fn sanitize_body(raw: &str) -> String {
    truncate_chars(raw.trim(), REMINDER_LIMITS.body_max_chars)
}

fn sanitize_text(value: Option<&Value>, fallback: &str, max: usize) -> String {
    match value.and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => truncate_chars(text, max),
        _ => fallback.to_string(),
    }
}

fn timestamp(value: Option<&Value>) -> Option<i64> {
    value
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map(|n| n as i64)
}

fn sanitize_item(raw: &Value, fallback_id: String) -> ReminderItem {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let id = match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => fallback_id,
    };

    ReminderItem {
        id,
        enabled: truthy(obj.get("enabled")),
        interval_minutes: clamp_interval_minutes(
            obj.get("intervalMin"),
            REMINDER_LIMITS.fallback_interval_minutes,
        ),
        title: sanitize_text(
            obj.get("title"),
            REMINDER_LIMITS.fallback_title,
            REMINDER_LIMITS.title_max_chars,
        ),
        body: obj
            .get("body")
            .and_then(Value::as_str)
            .map(sanitize_body)
            .unwrap_or_default(),
        next_fire_at: timestamp(obj.get("nextAt")),
    }
}

/// Shape of a stored reminder blob.
#[derive(Debug)]
pub enum ReminderEnvelope<'a> {
    Current(&'a Value),
    Legacy(&'a Map<String, Value>),
    Unknown,
}

impl<'a> ReminderEnvelope<'a> {
    pub fn detect(raw: &'a Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return ReminderEnvelope::Unknown;
        };

        let versioned = obj.get("version").and_then(Value::as_u64)
            == Some(u64::from(REMINDER_STORAGE_VERSION));
        if versioned || obj.get("items").is_some_and(Value::is_array) {
            ReminderEnvelope::Current(raw)
        } else if obj.contains_key("hydrationEnabled") || obj.contains_key("eyeRestEnabled") {
            ReminderEnvelope::Legacy(obj)
        } else {
            ReminderEnvelope::Unknown
        }
    }

    pub fn decode(self, now_ms: i64) -> ReminderPayload {
        match self {
            ReminderEnvelope::Current(raw) => normalize_reminder_payload(raw),
            ReminderEnvelope::Legacy(obj) => decode_legacy(obj, now_ms),
            ReminderEnvelope::Unknown => ReminderPayload::defaults(),
        }
    }
}

pub fn decode_reminder_payload(raw: &Value, now_ms: i64) -> ReminderPayload {
    ReminderEnvelope::detect(raw).decode(now_ms)
}

/// Version 2 decoder; also applied to reminder data fetched from the cloud.
pub fn normalize_reminder_payload(raw: &Value) -> ReminderPayload {
    let Some(items) = raw.get("items").and_then(Value::as_array) else {
        return ReminderPayload::defaults();
    };

    ReminderPayload {
        version: REMINDER_STORAGE_VERSION,
        items: items
            .iter()
            .take(REMINDER_LIMITS.max_items)
            .enumerate()
            .map(|(idx, item)| sanitize_item(item, format!("r_{idx}")))
            .collect(),
    }
}

/// The two-toggle shape written before reminders became a list.
fn decode_legacy(obj: &Map<String, Value>, now_ms: i64) -> ReminderPayload {
    let migrate = |preset: &ReminderPreset, prefix: &str| {
        let enabled = truthy(obj.get(&format!("{prefix}Enabled")));
        let interval_minutes = clamp_interval_minutes(
            obj.get(&format!("{prefix}IntervalMin")),
            preset.interval_minutes,
        );
        let body = sanitize_text(
            obj.get(&format!("{prefix}Body")),
            preset.body,
            REMINDER_LIMITS.body_max_chars,
        );
        let next_fire_at = match obj.get(&format!("{prefix}NextAt")) {
            Some(Value::Number(n)) => n.as_f64().map(|n| n as i64),
            _ if enabled => Some(now_ms + i64::from(interval_minutes) * MINUTE_MS),
            _ => None,
        };

        ReminderItem {
            id: preset.id.to_string(),
            enabled,
            interval_minutes,
            title: preset.title.to_string(),
            body,
            next_fire_at,
        }
    };

    ReminderPayload {
        version: REMINDER_STORAGE_VERSION,
        items: vec![
            migrate(&HYDRATION_PRESET, "hydration"),
            migrate(&EYE_REST_PRESET, "eyeRest"),
        ],
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// Not decided yet; asking is allowed.
    Prompt,
    /// No way to ask, e.g. stdin is not a terminal.
    Unsupported,
}

/// Surface that shows reminders to the user.
pub trait Notifier {
    fn permission(&self) -> Permission;

    /// Asks the user once. Implementations must not prompt again after a denial.
    fn request_permission(&mut self) -> Permission;

    fn notify(&mut self, title: &str, body: &str);

    /// Audible cue played alongside a notification.
    fn chime(&mut self);
}

fn ensure_permission(notifier: &mut dyn Notifier) -> bool {
    match notifier.permission() {
        Permission::Granted => true,
        Permission::Denied | Permission::Unsupported => false,
        Permission::Prompt => notifier.request_permission() == Permission::Granted,
    }
}

/// Owns the reminder list and advances it one `tick` at a time.
#[derive(Clone, Debug, PartialEq)]
pub struct ReminderScheduler {
    items: Vec<ReminderItem>,
    error: Option<String>,
}

impl ReminderScheduler {
    pub fn new(payload: ReminderPayload) -> Self {
        Self {
            items: payload.items,
            error: None,
        }
    }

    pub fn items(&self) -> &[ReminderItem] {
        &self.items
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn payload(&self) -> ReminderPayload {
        ReminderPayload {
            version: REMINDER_STORAGE_VERSION,
            items: self.items.clone(),
        }
    }

    /// Replaces every item, e.g. with reminder data pulled from the cloud.
    pub fn replace(&mut self, payload: ReminderPayload) {
        self.items = payload.items;
        self.error = None;
    }

    /// Finds by exact id, then by case-insensitive title.
    pub fn find(&self, query: &str) -> Option<&ReminderItem> {
        let query = query.trim();
        self.items.iter().find(|r| r.id == query).or_else(|| {
            let lowered = query.to_lowercase();
            self.items.iter().find(|r| r.title.to_lowercase() == lowered)
        })
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut ReminderItem> {
        self.items.iter_mut().find(|r| r.id == id)
    }

    pub fn next_due(&self) -> Option<i64> {
        self.items
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|r| r.next_fire_at)
            .min()
    }

    /// Arms enabled items that lost their schedule, but only under an existing grant.
    /// Stored fire times are kept so reminders pick up where they left off.
    pub fn resume(&mut self, notifier: &dyn Notifier, now_ms: i64) -> usize {
        if notifier.permission() != Permission::Granted {
            return 0;
        }
        let mut armed = 0;
        for item in self.items.iter_mut().filter(|r| r.enabled) {
            if item.next_fire_at.is_none() {
                item.arm(now_ms);
                armed += 1;
            }
        }
        armed
    }

    pub fn set_enabled(
        &mut self,
        id: &str,
        enabled: bool,
        notifier: &mut dyn Notifier,
        now_ms: i64,
    ) -> bool {
        if enabled {
            self.enable(id, notifier, now_ms)
        } else {
            self.disable(id)
        }
    }

    /// Enabling asks for permission at most once; a refusal reverts the item.
    pub fn enable(&mut self, id: &str, notifier: &mut dyn Notifier, now_ms: i64) -> bool {
        self.error = None;
        if self.item_mut(id).is_none() {
            return false;
        }

        let granted = ensure_permission(notifier);
        let Some(item) = self.item_mut(id) else {
            return false;
        };

        if !granted {
            item.enabled = false;
            item.next_fire_at = None;
            self.error = Some(NOTIFICATIONS_BLOCKED_MESSAGE.to_string());
            info!(reminder = id, "reminder enable refused, notifications blocked");
            return false;
        }

        item.enabled = true;
        item.arm(now_ms);
        info!(reminder = id, "reminder armed");
        true
    }

    pub fn disable(&mut self, id: &str) -> bool {
        self.error = None;
        match self.item_mut(id) {
            Some(item) => {
                item.enabled = false;
                item.next_fire_at = None;
                true
            }
            None => false,
        }
    }

    pub fn set_interval(&mut self, id: &str, minutes: f64, now_ms: i64) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.interval_minutes = clamp_interval(minutes, item.interval_minutes);
                item.rearm_if_armed(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn set_title(&mut self, id: &str, title: &str, now_ms: i64) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.title = sanitize_title(title);
                item.rearm_if_armed(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn set_body(&mut self, id: &str, body: &str, now_ms: i64) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.body = sanitize_body(body);
                item.rearm_if_armed(now_ms);
                true
            }
            None => false,
        }
    }

    /// Adds a disabled custom reminder and returns its id, or `None` at the item limit.
    pub fn add_item(&mut self, title: &str, body: &str, minutes: f64) -> Option<String> {
        if self.items.len() >= REMINDER_LIMITS.max_items {
            return None;
        }

        let id = (self.items.len()..)
            .map(|n| format!("r_{n}"))
            .find(|candidate| self.items.iter().all(|r| &r.id != candidate))?;

        self.items.push(ReminderItem {
            id: id.clone(),
            enabled: false,
            interval_minutes: clamp_interval(minutes, REMINDER_LIMITS.fallback_interval_minutes),
            title: sanitize_title(title),
            body: sanitize_body(body),
            next_fire_at: None,
        });
        Some(id)
    }

    pub fn remove_item(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|r| r.id != id);
        self.items.len() != before
    }

    /// One poll: fires due items and reschedules them from `now_ms`.
    /// Returns the ids that fired. Nothing fires without a grant.
    pub fn tick(&mut self, now_ms: i64, notifier: &mut dyn Notifier) -> Vec<String> {
        if notifier.permission() != Permission::Granted {
            return Vec::new();
        }

        let mut fired = Vec::new();
        for item in self.items.iter_mut().filter(|r| r.enabled) {
            match item.next_fire_at {
                None => item.arm(now_ms),
                Some(due) if now_ms >= due => {
                    notifier.notify(&item.title, &item.body);
                    notifier.chime();
                    item.arm(now_ms);
                    fired.push(item.id.clone());
                }
                Some(_) => {}
            }
        }

        if !fired.is_empty() {
            debug!(count = fired.len(), "reminders fired");
        }
        fired
    }
}

pub fn load_permission(path: &std::path::Path) -> Option<Permission> {
    if !path.exists() {
        return None;
    }
    storage::read_json(path)
        .map_err(|e| warn!(error = %e, "could not read notification decision"))
        .ok()
}

pub fn save_permission(path: &std::path::Path, permission: Permission) -> Result<()> {
    storage::write_json_no_backup(path, &permission)
}

/// Prints reminders to stdout and rings the terminal bell.
pub struct ConsoleNotifier {
    decision: Permission,
    decision_path: PathBuf,
}

impl ConsoleNotifier {
    pub fn new(policy: NotificationPolicy, decision_path: PathBuf) -> Self {
        let decision = match policy {
            NotificationPolicy::Granted => Permission::Granted,
            NotificationPolicy::Denied => Permission::Denied,
            NotificationPolicy::Ask => load_permission(&decision_path).unwrap_or_else(|| {
                if io::stdin().is_terminal() {
                    Permission::Prompt
                } else {
                    Permission::Unsupported
                }
            }),
        };
        Self {
            decision,
            decision_path,
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn permission(&self) -> Permission {
        self.decision
    }

    fn request_permission(&mut self) -> Permission {
        if self.decision != Permission::Prompt {
            return self.decision;
        }

        print!("Allow pulse to show reminder notifications? [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        let answered = io::stdin().lock().read_line(&mut answer).is_ok();

        self.decision = if answered && answer.trim().eq_ignore_ascii_case("y") {
            Permission::Granted
        } else {
            Permission::Denied
        };
        if let Err(e) = save_permission(&self.decision_path, self.decision) {
            warn!(error = %e, "could not persist notification decision");
        }
        self.decision
    }

    fn notify(&mut self, title: &str, body: &str) {
        println!("[{}] {title}: {body}", format_clock(now_millis()));
    }

    fn chime(&mut self) {
        print!("\x07");
        let _ = io::stdout().flush();
    }
}

/// Foreground reminder loop used by `pulse remind`; stops on Ctrl-C.
pub async fn run_foreground(
    mut scheduler: ReminderScheduler,
    notifier: &mut dyn Notifier,
    store: &LocalStore,
    poll: Duration,
) -> Result<()> {
    if scheduler.resume(notifier, now_millis()) > 0 {
        store.save_reminders(&scheduler.payload());
    }

    let mut interval = tokio::time::interval(poll);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    info!(poll_secs = poll.as_secs(), "reminder loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let before = scheduler.payload();
                scheduler.tick(now_millis(), notifier);
                if scheduler.payload() != before {
                    store.save_reminders(&scheduler.payload());
                }
            }
            _ = &mut shutdown => {
                info!("reminder loop stopped");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;

    use super::*;

    struct FakeNotifier {
        permission: Permission,
        answer: Permission,
        requests: usize,
        shown: Vec<(String, String)>,
        chimes: usize,
    }

    impl FakeNotifier {
        fn with(permission: Permission) -> Self {
            Self {
                permission,
                answer: Permission::Granted,
                requests: 0,
                shown: Vec::new(),
                chimes: 0,
            }
        }
    }

    impl Notifier for FakeNotifier {
        fn permission(&self) -> Permission {
            self.permission
        }

        fn request_permission(&mut self) -> Permission {
            self.requests += 1;
            self.permission = self.answer;
            self.permission
        }

        fn notify(&mut self, title: &str, body: &str) {
            self.shown.push((title.to_string(), body.to_string()));
        }

        fn chime(&mut self) {
            self.chimes += 1;
        }
    }

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_clamp_interval_edges() {
        assert_eq!(clamp_interval_minutes(Some(&json!(0)), 60), 1);
        assert_eq!(clamp_interval_minutes(Some(&json!(20000)), 60), 1440);
        assert_eq!(clamp_interval_minutes(Some(&json!(2.5)), 60), 3);
        assert_eq!(clamp_interval_minutes(Some(&json!(" 45 ")), 60), 45);
        assert_eq!(clamp_interval_minutes(Some(&json!("soon")), 60), 60);
        assert_eq!(clamp_interval_minutes(Some(&json!(null)), 60), 1);
        assert_eq!(clamp_interval_minutes(None, 20), 20);
        assert_eq!(clamp_interval(f64::INFINITY, 7), 7);
    }

    #[test]
    fn test_defaults_have_two_disabled_presets() {
        let payload = ReminderPayload::defaults();
        assert_eq!(payload.version, 2);
        assert_eq!(payload.items.len(), 2);
        assert_eq!(payload.items[0].id, "preset_hydration");
        assert_eq!(payload.items[0].interval_minutes, 60);
        assert_eq!(payload.items[1].title, "Eye Rest");
        assert!(payload.items.iter().all(|r| r.state() == ReminderState::Disabled));
    }

    #[test]
    fn test_current_envelope_is_sanitized() {
        let long_title = "t".repeat(80);
        let raw = json!({
            "version": 2,
            "items": [
                {
                    "id": "", "enabled": 1, "intervalMin": 0,
                    "title": long_title, "body": "  hi  ", "nextAt": 5
                },
                {"id": "keep", "enabled": false, "title": "   ", "body": 3, "nextAt": "later"},
                "junk"
            ]
        });

        let payload = decode_reminder_payload(&raw, NOW);
        assert_eq!(payload.items.len(), 3);
        assert_eq!(payload.items[0].id, "r_0");
        assert!(payload.items[0].enabled);
        assert_eq!(payload.items[0].interval_minutes, 1);
        assert_eq!(payload.items[0].title.chars().count(), 60);
        assert_eq!(payload.items[0].body, "hi");
        assert_eq!(payload.items[0].next_fire_at, Some(5));
        assert_eq!(payload.items[1].title, "Reminder");
        assert_eq!(payload.items[1].body, "");
        assert_eq!(payload.items[1].next_fire_at, None);
        assert_eq!(payload.items[2].id, "r_2");
        assert_eq!(payload.items[2].interval_minutes, 60);
    }

    #[test]
    fn test_current_envelope_caps_item_count() {
        let items: Vec<Value> = (0..30).map(|i| json!({"id": format!("x{i}")})).collect();
        let payload = decode_reminder_payload(&json!({ "items": items }), NOW);
        assert_eq!(payload.items.len(), 20);
    }

    #[test]
    fn test_version_without_items_falls_back_to_defaults() {
        let payload = decode_reminder_payload(&json!({"version": 2}), NOW);
        assert_eq!(payload, ReminderPayload::defaults());
    }

    #[test]
    fn test_legacy_envelope_migrates() {
        let raw = json!({
            "hydrationEnabled": true,
            "hydrationIntervalMin": 45,
            "hydrationBody": "Sip!",
            "eyeRestEnabled": false,
            "eyeRestNextAt": 1234
        });

        let payload = decode_reminder_payload(&raw, NOW);
        let hydration = &payload.items[0];
        assert_eq!(hydration.id, "preset_hydration");
        assert!(hydration.enabled);
        assert_eq!(hydration.interval_minutes, 45);
        assert_eq!(hydration.body, "Sip!");
        assert_eq!(hydration.title, "Hydration Reminder");
        assert_eq!(hydration.next_fire_at, Some(NOW + 45 * MINUTE_MS));

        let eye = &payload.items[1];
        assert!(!eye.enabled);
        assert_eq!(eye.interval_minutes, 20);
        assert_eq!(eye.body, "Time to rest your eyes for 20 seconds.");
        assert_eq!(eye.next_fire_at, Some(1234));
    }

    #[test]
    fn test_unknown_envelope_gives_defaults() {
        for raw in [json!({"foo": 1}), json!([1, 2]), json!("x")] {
            assert_eq!(decode_reminder_payload(&raw, NOW), ReminderPayload::defaults());
        }
    }

    #[test]
    fn test_enable_with_denied_permission_reverts() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Denied);

        assert!(!scheduler.enable("preset_hydration", &mut notifier, NOW));
        assert_eq!(notifier.requests, 0);
        assert_eq!(scheduler.error(), Some(NOTIFICATIONS_BLOCKED_MESSAGE));
        assert_eq!(scheduler.items()[0].state(), ReminderState::Disabled);
    }

    #[test]
    fn test_enable_prompts_once_then_arms() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Prompt);

        assert!(scheduler.enable("preset_eye_rest", &mut notifier, NOW));
        assert!(scheduler.enable("preset_hydration", &mut notifier, NOW));
        assert_eq!(notifier.requests, 1);
        assert_eq!(
            scheduler.items()[1].state(),
            ReminderState::Armed {
                next_fire_at: NOW + 20 * MINUTE_MS
            }
        );
        assert_eq!(scheduler.error(), None);
    }

    #[test]
    fn test_prompt_refusal_sets_error() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Prompt);
        notifier.answer = Permission::Denied;

        assert!(!scheduler.enable("preset_hydration", &mut notifier, NOW));
        assert!(!scheduler.enable("preset_hydration", &mut notifier, NOW));
        assert_eq!(notifier.requests, 1);
        assert!(scheduler.error().is_some());
    }

    #[test]
    fn test_tick_fires_due_items_and_reschedules() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Granted);
        scheduler.enable("preset_eye_rest", &mut notifier, NOW);

        assert!(scheduler.tick(NOW + 19 * MINUTE_MS, &mut notifier).is_empty());

        let later = NOW + 20 * MINUTE_MS + 5_000;
        let fired = scheduler.tick(later, &mut notifier);
        assert_eq!(fired, vec!["preset_eye_rest".to_string()]);
        assert_eq!(notifier.shown[0].0, "Eye Rest");
        assert_eq!(notifier.chimes, 1);
        assert_eq!(scheduler.next_due(), Some(later + 20 * MINUTE_MS));
    }

    #[test]
    fn test_tick_without_grant_does_nothing() {
        let mut payload = ReminderPayload::defaults();
        payload.items[0].enabled = true;
        payload.items[0].next_fire_at = Some(NOW - 1);
        let mut scheduler = ReminderScheduler::new(payload);
        let mut notifier = FakeNotifier::with(Permission::Prompt);

        assert!(scheduler.tick(NOW, &mut notifier).is_empty());
        assert!(notifier.shown.is_empty());
        assert_eq!(notifier.requests, 0);
    }

    #[test]
    fn test_disable_clears_schedule() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Granted);
        scheduler.enable("preset_hydration", &mut notifier, NOW);

        assert!(scheduler.disable("preset_hydration"));
        assert_eq!(scheduler.items()[0].next_fire_at, None);
        assert!(!scheduler.disable("missing"));
    }

    #[test]
    fn test_edits_while_armed_reschedule_from_now() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let mut notifier = FakeNotifier::with(Permission::Granted);
        scheduler.enable("preset_hydration", &mut notifier, NOW);

        let later = NOW + 10 * MINUTE_MS;
        assert!(scheduler.set_interval("preset_hydration", 5000.0, later));
        assert_eq!(scheduler.items()[0].interval_minutes, 1440);
        assert_eq!(scheduler.items()[0].next_fire_at, Some(later + 1440 * MINUTE_MS));

        assert!(scheduler.set_title("preset_hydration", "  Water ", NOW));
        assert_eq!(scheduler.items()[0].title, "Water");
        assert_eq!(scheduler.items()[0].next_fire_at, Some(NOW + 1440 * MINUTE_MS));

        assert!(scheduler.set_body("preset_eye_rest", "Look away", NOW));
        assert_eq!(scheduler.items()[1].next_fire_at, None);
    }

    #[test]
    fn test_resume_only_with_existing_grant() {
        let mut payload = ReminderPayload::defaults();
        payload.items[0].enabled = true;
        payload.items[1].enabled = true;
        payload.items[1].next_fire_at = Some(NOW + 99);

        let mut scheduler = ReminderScheduler::new(payload.clone());
        assert_eq!(scheduler.resume(&FakeNotifier::with(Permission::Prompt), NOW), 0);
        assert_eq!(scheduler.items()[0].state(), ReminderState::Pending);

        assert_eq!(scheduler.resume(&FakeNotifier::with(Permission::Granted), NOW), 1);
        assert_eq!(scheduler.items()[0].next_fire_at, Some(NOW + 60 * MINUTE_MS));
        assert_eq!(scheduler.items()[1].next_fire_at, Some(NOW + 99));
    }

    #[test]
    fn test_add_and_remove_custom_items() {
        let mut scheduler = ReminderScheduler::new(ReminderPayload::defaults());
        let id = scheduler.add_item("Stand up", "", 45.0).unwrap();
        assert_eq!(id, "r_2");
        assert_eq!(scheduler.find("stand up").map(|r| r.id.as_str()), Some("r_2"));

        while scheduler.items().len() < 20 {
            assert!(scheduler.add_item("x", "", 10.0).is_some());
        }
        assert!(scheduler.add_item("overflow", "", 10.0).is_none());

        assert!(scheduler.remove_item(&id));
        assert!(!scheduler.remove_item(&id));
        let next = scheduler.add_item("again", "", 10.0).unwrap();
        assert!(scheduler.items().iter().filter(|r| r.id == next).count() == 1);
    }

    #[test]
    fn test_permission_decision_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notification_permission.json");
        assert_eq!(load_permission(&path), None);

        save_permission(&path, Permission::Denied).unwrap();
        assert_eq!(load_permission(&path), Some(Permission::Denied));

        let notifier = ConsoleNotifier::new(NotificationPolicy::Ask, path.clone());
        assert_eq!(notifier.permission(), Permission::Denied);
        let forced = ConsoleNotifier::new(NotificationPolicy::Granted, path);
        assert_eq!(forced.permission(), Permission::Granted);
    }

    #[test]
    fn test_payload_serializes_wire_names() {
        let json = serde_json::to_value(ReminderPayload::defaults()).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["items"][0]["intervalMin"], 60);
        assert!(json["items"][0]["nextAt"].is_null());
    }
}
