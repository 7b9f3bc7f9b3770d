use std::{sync::mpsc::TryRecvError, time::Instant};

use tracing::{debug, warn};

use crate::{
    auth::AuthSession,
    domain::HabitTracker,
    error::Result,
    reminders::now_millis,
    sync::{Identity, RemoteRow, SignInOutcome},
};

use super::App;

/// Completed network work reported back to the UI loop.
pub(super) enum NetEvent {
    Session(Result<Option<AuthSession>>),
    Fetched {
        generation: u64,
        result: Result<Option<RemoteRow>>,
    },
    Pushed(Result<()>),
}

impl App {
    /// Picks up a stored session, if any, and starts the sign-in fetch.
    pub(super) fn start_cloud_session(&mut self) {
        if self.services.remote.is_none() {
            return;
        }
        let services = self.services.clone();
        let tx = self.net_tx.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(NetEvent::Session(services.active_session().await));
        });
    }

    pub(super) fn drain_net_events(&mut self) {
        loop {
            match self.net_rx.try_recv() {
                Ok(event) => self.handle_net_event(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return,
            }
        }
    }

    fn handle_net_event(&mut self, event: NetEvent) {
        match event {
            NetEvent::Session(Ok(Some(session))) => self.begin_sign_in(session.identity()),
            NetEvent::Session(Ok(None)) => debug!("no stored session, staying local"),
            NetEvent::Session(Err(e)) => {
                warn!(error = %e, "stored session unusable");
                self.notice = Some(format!("Cloud sign-in failed: {e}"));
            }
            NetEvent::Fetched { generation, result } => {
                let outcome = self.sync.complete_sign_in(generation, result, self.today);
                self.apply_sign_in_outcome(outcome);
            }
            NetEvent::Pushed(result) => self.sync.record_push_result(&result),
        }
        self.render_needed = true;
    }

    fn begin_sign_in(&mut self, identity: Identity) {
        let Some(remote) = self.services.remote.clone() else {
            return;
        };
        let generation = self.sync.begin_sign_in(identity.clone());
        let tx = self.net_tx.clone();
        self.runtime.spawn(async move {
            let result = remote.fetch_row(&identity).await;
            let _ = tx.send(NetEvent::Fetched { generation, result });
        });
    }

    fn apply_sign_in_outcome(&mut self, outcome: SignInOutcome) {
        match outcome {
            SignInOutcome::ApplyRemote { habits, reminders } => {
                self.tracker = HabitTracker::from_payload(habits);
                self.scheduler.replace(reminders);
                self.scheduler.resume(&self.notifier, now_millis());
                self.selected_index = self
                    .selected_index
                    .min(self.tracker.habit_count().saturating_sub(1));
                self.reminder_index = 0;
                self.services.store.save_habits(&self.tracker.to_payload(self.today));
                self.services.store.save_reminders(&self.scheduler.payload());
            }
            SignInOutcome::SeedRemote => {
                if let Some(identity) = self.sync.identity().cloned() {
                    self.spawn_push(identity);
                }
            }
            SignInOutcome::Failed | SignInOutcome::Stale => {}
        }
    }

    /// Sends the latest snapshot once the debounce window has passed.
    pub(super) fn flush_due_push(&mut self, now: Instant) {
        if let Some(identity) = self.sync.take_due(now) {
            self.spawn_push(identity);
        }
    }

    fn spawn_push(&self, identity: Identity) {
        let Some(remote) = self.services.remote.clone() else {
            return;
        };
        let habits = self.tracker.to_payload(self.today);
        let reminders = self.scheduler.payload();
        let tx = self.net_tx.clone();
        self.runtime.spawn(async move {
            let result = match RemoteRow::snapshot(&identity.user_id, &habits, &reminders) {
                Ok(row) => remote.upsert_row(&identity, &row).await,
                Err(e) => Err(e),
            };
            let _ = tx.send(NetEvent::Pushed(result));
        });
    }
}
