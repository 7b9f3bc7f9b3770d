use std::{path::PathBuf, sync::Arc};

use tracing::{debug, warn};

use crate::{
    auth::{self, AuthClient, AuthSession},
    config::PulseConfig,
    constants::FILE_NAMES,
    error::Result,
    reminders::ConsoleNotifier,
    storage::{self, LocalStore},
    sync::{RemoteStore, SupabaseStore},
};

/// Everything built once at startup and handed to the CLI or the TUI.
pub struct Services {
    pub config: PulseConfig,
    pub store: LocalStore,
    pub state_dir: PathBuf,
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub auth: Option<AuthClient>,
}

impl Services {
    pub fn build(config: PulseConfig) -> Self {
        let store = LocalStore::new(storage::get_data_dir(config.data_dir.as_deref()));
        let state_dir = storage::get_state_dir();

        let (remote, auth) = if config.cloud.is_configured() {
            let remote = SupabaseStore::new(&config.cloud)
                .map(|store| Arc::new(store) as Arc<dyn RemoteStore>)
                .map_err(|e| warn!(error = %e, "cloud store unavailable"))
                .ok();
            let auth = AuthClient::new(&config.cloud)
                .map_err(|e| warn!(error = %e, "auth client unavailable"))
                .ok();
            (remote, auth)
        } else {
            (None, None)
        };

        debug!(
            data_dir = %store.dir().display(),
            state_dir = %state_dir.display(),
            cloud = remote.is_some(),
            "services ready"
        );

        Self {
            config,
            store,
            state_dir,
            remote,
            auth,
        }
    }

    pub fn session_path(&self) -> PathBuf {
        auth::session_path(&self.state_dir)
    }

    pub fn permission_path(&self) -> PathBuf {
        self.state_dir.join(FILE_NAMES.permission)
    }

    pub fn console_notifier(&self) -> ConsoleNotifier {
        ConsoleNotifier::new(self.config.reminders.notifications, self.permission_path())
    }

    /// Stored session, refreshed if its token is about to lapse.
    pub async fn active_session(&self) -> Result<Option<AuthSession>> {
        let Some(session) = auth::load_session(&self.session_path()) else {
            return Ok(None);
        };
        match &self.auth {
            Some(client) => auth::ensure_fresh(client, &self.session_path(), session)
                .await
                .map(Some),
            None => Ok(Some(session)),
        }
    }
}
