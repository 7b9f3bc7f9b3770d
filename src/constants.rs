use ratatui::style::Color;

pub const HABIT_NAME_MAX_CHARS: usize = 20;

pub const SEED_HABITS: [&str; 2] = ["Drink Water", "Read 1 Page"];

pub const HABIT_SUGGESTIONS: [&str; 3] = ["Drink Water", "Read 1 Page", "Walk 5 Min"];

pub const FILE_NAMES: FileNames = FileNames {
    habits: "pulse_daily_data.json",
    reminders: "pulse_daily_reminders.json",
    session: "session.json",
    permission: "notification_permission.json",
    log: "pulse.log",
    config: "config.toml",
};

pub const REMINDER_LIMITS: ReminderLimits = ReminderLimits {
    max_items: 20,
    min_interval_minutes: 1,
    max_interval_minutes: 24 * 60,
    title_max_chars: 60,
    body_max_chars: 160,
    fallback_interval_minutes: 60,
    fallback_title: "Reminder",
};

pub const REMINDER_STORAGE_VERSION: u32 = 2;

pub const HYDRATION_PRESET: ReminderPreset = ReminderPreset {
    id: "preset_hydration",
    interval_minutes: 60,
    title: "Hydration Reminder",
    body: "Time to drink water!",
};

pub const EYE_REST_PRESET: ReminderPreset = ReminderPreset {
    id: "preset_eye_rest",
    interval_minutes: 20,
    title: "Eye Rest",
    body: "Time to rest your eyes for 20 seconds.",
};

pub const NOTIFICATIONS_BLOCKED_MESSAGE: &str =
    "Notifications are blocked. Allow notifications to enable reminders.";

pub const TIME_SETTINGS: TimeSettings = TimeSettings {
    input_poll_ms: 50,
    target_fps: 12,
    banner_secs: 8,
};

pub const STATUS_COLORS: [Color; 3] = [
    Color::Rgb(148, 163, 184),
    Color::Rgb(251, 191, 36),
    Color::Rgb(16, 185, 129),
];

pub const MAX_BACKUPS: usize = 10;

pub const INTERVAL_STEP_MINUTES: u32 = 5;

pub struct FileNames {
    pub habits: &'static str,
    pub reminders: &'static str,
    pub session: &'static str,
    pub permission: &'static str,
    pub log: &'static str,
    pub config: &'static str,
}

pub struct ReminderLimits {
    pub max_items: usize,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    pub title_max_chars: usize,
    pub body_max_chars: usize,
    pub fallback_interval_minutes: u32,
    pub fallback_title: &'static str,
}

pub struct ReminderPreset {
    pub id: &'static str,
    pub interval_minutes: u32,
    pub title: &'static str,
    pub body: &'static str,
}

pub struct TimeSettings {
    pub input_poll_ms: u64,
    pub target_fps: u64,
    pub banner_secs: u64,
}
