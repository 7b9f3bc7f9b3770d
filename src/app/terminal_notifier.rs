use std::{
    io::{self, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{
    config::NotificationPolicy,
    constants::TIME_SETTINGS,
    reminders::{self, Notifier, Permission},
};

/// A reminder shown in the footer until it times out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Banner {
    pub title: String,
    pub body: String,
    shown_at: Instant,
}

/// Shows reminders as a footer banner and rings the terminal bell.
///
/// Under the `ask` policy the keypress that enables a reminder counts as
/// consent; the decision is written to the state dir and reused.
pub(super) struct TerminalNotifier {
    decision: Permission,
    decision_path: PathBuf,
    banner: Option<Banner>,
}

impl TerminalNotifier {
    pub(super) fn new(policy: NotificationPolicy, decision_path: PathBuf) -> Self {
        let decision = match policy {
            NotificationPolicy::Granted => Permission::Granted,
            NotificationPolicy::Denied => Permission::Denied,
            NotificationPolicy::Ask => {
                reminders::load_permission(&decision_path).unwrap_or(Permission::Prompt)
            }
        };
        Self {
            decision,
            decision_path,
            banner: None,
        }
    }

    pub(super) fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    /// Returns true when a banner was cleared.
    pub(super) fn expire_banner(&mut self, now: Instant) -> bool {
        let lifetime = Duration::from_secs(TIME_SETTINGS.banner_secs);
        match &self.banner {
            Some(banner) if now.duration_since(banner.shown_at) >= lifetime => {
                self.banner = None;
                true
            }
            _ => false,
        }
    }

    pub(super) fn dismiss(&mut self) -> bool {
        self.banner.take().is_some()
    }
}

impl Notifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        self.decision
    }

    fn request_permission(&mut self) -> Permission {
        if self.decision != Permission::Prompt {
            return self.decision;
        }
        self.decision = Permission::Granted;
        info!("notifications allowed from the checklist UI");
        if let Err(e) = reminders::save_permission(&self.decision_path, self.decision) {
            warn!(error = %e, "could not persist notification decision");
        }
        self.decision
    }

    fn notify(&mut self, title: &str, body: &str) {
        self.banner = Some(Banner {
            title: title.to_string(),
            body: body.to_string(),
            shown_at: Instant::now(),
        });
    }

    fn chime(&mut self) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(b"\x07");
        let _ = stdout.flush();
    }
}
