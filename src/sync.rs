//! Cloud sync: one remote row per user, pulled on sign-in and pushed after edits.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::CloudConfig,
    domain::HabitPayload,
    error::{PulseError, Result},
    reminders::{ReminderPayload, normalize_reminder_payload},
    storage::hydrate_habit_payload,
};

/// Who is signed in and the bearer token their row access is authorized with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub access_token: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub habits_data: Value,
    #[serde(default)]
    pub reminders_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RemoteRow {
    pub fn snapshot(
        user_id: &str,
        habits: &HabitPayload,
        reminders: &ReminderPayload,
    ) -> Result<Self> {
        Ok(Self {
            user_id: user_id.to_string(),
            habits_data: serde_json::to_value(habits)?,
            reminders_data: serde_json::to_value(reminders)?,
            updated_at: Some(Utc::now().to_rfc3339()),
        })
    }

    /// Empty objects count; null, false, zero and "" do not.
    pub fn has_habit_data(&self) -> bool {
        match &self.habits_data {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }
}

/// Point lookup and upsert of the per-user row.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_row(&self, identity: &Identity) -> Result<Option<RemoteRow>>;

    async fn upsert_row(&self, identity: &Identity, row: &RemoteRow) -> Result<()>;
}

/// PostgREST client for the hosted table.
#[derive(Clone, Debug)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    anon_key: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(PulseError::Config(
                "cloud url and anon_key must be set to use sync".to_string(),
            ));
        }
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        identity: &Identity,
    ) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", identity.access_token))
    }
}

pub(crate) async fn remote_error(response: reqwest::Response) -> PulseError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            ["message", "error_description", "msg", "error"]
                .iter()
                .find_map(|key| body.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });
    PulseError::Remote {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn fetch_row(&self, identity: &Identity) -> Result<Option<RemoteRow>> {
        let request = self.client.get(self.table_url()).query(&[
            ("select", "user_id,habits_data,reminders_data,updated_at".to_string()),
            ("user_id", format!("eq.{}", identity.user_id)),
        ]);
        let response = self.authorize(request, identity).send().await?;

        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }

        let mut rows: Vec<RemoteRow> = response.json().await?;
        if rows.len() > 1 {
            return Err(PulseError::Remote {
                status: StatusCode::NOT_ACCEPTABLE.as_u16(),
                message: "multiple rows returned for user".to_string(),
            });
        }
        Ok(rows.pop())
    }

    async fn upsert_row(&self, identity: &Identity, row: &RemoteRow) -> Result<()> {
        let request = self
            .client
            .post(self.table_url())
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        let response = self.authorize(request, identity).send().await?;

        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }
        debug!(user = %identity.user_id, "remote row upserted");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloudStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl CloudStatus {
    pub fn label(self) -> &'static str {
        match self {
            CloudStatus::Idle => "idle",
            CloudStatus::Loading => "loading",
            CloudStatus::Ready => "ready",
            CloudStatus::Error => "error",
        }
    }
}

/// What the caller must do once the sign-in fetch resolves.
#[derive(Debug, PartialEq)]
pub enum SignInOutcome {
    /// Remote wins: replace local state and mirror it to disk.
    ApplyRemote {
        habits: HabitPayload,
        reminders: ReminderPayload,
    },
    /// No remote data: push the local snapshot as the first row.
    SeedRemote,
    Failed,
    /// The result belongs to an earlier sign-in and was dropped.
    Stale,
}

/// Sync bookkeeping with no I/O of its own; callers run the network work it asks for.
#[derive(Debug)]
pub struct SyncAdapter {
    status: CloudStatus,
    error: Option<String>,
    identity: Option<Identity>,
    debounce: Duration,
    push_due_at: Option<Instant>,
    generation: u64,
}

impl SyncAdapter {
    pub fn new(debounce: Duration) -> Self {
        Self {
            status: CloudStatus::Idle,
            error: None,
            identity: None,
            debounce,
            push_due_at: None,
            generation: 0,
        }
    }

    pub fn status(&self) -> CloudStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn has_pending_push(&self) -> bool {
        self.push_due_at.is_some()
    }

    /// Starts a sign-in and returns the generation its fetch result must carry.
    pub fn begin_sign_in(&mut self, identity: Identity) -> u64 {
        self.generation += 1;
        info!(user = %identity.user_id, "cloud sign-in started");
        self.identity = Some(identity);
        self.status = CloudStatus::Loading;
        self.error = None;
        self.push_due_at = None;
        self.generation
    }

    pub fn complete_sign_in(
        &mut self,
        generation: u64,
        fetched: Result<Option<RemoteRow>>,
        today: NaiveDate,
    ) -> SignInOutcome {
        if generation != self.generation || self.identity.is_none() {
            return SignInOutcome::Stale;
        }

        match fetched {
            Err(e) => {
                warn!(error = %e, "cloud fetch failed");
                self.error = Some(e.to_string());
                self.status = CloudStatus::Error;
                SignInOutcome::Failed
            }
            Ok(Some(row)) if row.has_habit_data() => {
                self.status = CloudStatus::Ready;
                info!("cloud data applied");
                SignInOutcome::ApplyRemote {
                    habits: hydrate_habit_payload(Some(&row.habits_data), false, today),
                    reminders: normalize_reminder_payload(&row.reminders_data),
                }
            }
            Ok(_) => {
                self.status = CloudStatus::Ready;
                info!("no cloud data, seeding from local state");
                SignInOutcome::SeedRemote
            }
        }
    }

    /// Schedules a push; a newer change replaces the pending deadline.
    pub fn note_local_change(&mut self, now: Instant) {
        if self.status == CloudStatus::Ready && self.identity.is_some() {
            self.push_due_at = Some(now + self.debounce);
        }
    }

    /// Returns the identity to push for once the quiet period has elapsed.
    pub fn take_due(&mut self, now: Instant) -> Option<Identity> {
        match self.push_due_at {
            Some(due) if now >= due => {
                self.push_due_at = None;
                self.identity.clone()
            }
            _ => None,
        }
    }

    pub fn record_push_result(&mut self, result: &Result<()>) {
        match result {
            Ok(()) => self.error = None,
            Err(e) => {
                warn!(error = %e, "cloud push failed");
                self.error = Some(e.to_string());
            }
        }
    }

    pub fn sign_out(&mut self) {
        self.generation += 1;
        self.identity = None;
        self.status = CloudStatus::Idle;
        self.error = None;
        self.push_due_at = None;
    }
}

/// Replaces the habit column of the user's row, keeping whatever reminder data it holds.
pub async fn merge_habits_into_remote(
    store: &dyn RemoteStore,
    identity: &Identity,
    habits: &HabitPayload,
    local_reminders: &ReminderPayload,
) -> Result<()> {
    let existing = store.fetch_row(identity).await?;
    let reminders_data = match existing {
        Some(row) if !row.reminders_data.is_null() => row.reminders_data,
        _ => serde_json::to_value(local_reminders)?,
    };

    let row = RemoteRow {
        user_id: identity.user_id.clone(),
        habits_data: serde_json::to_value(habits)?,
        reminders_data,
        updated_at: Some(Utc::now().to_rfc3339()),
    };
    store.upsert_row(identity, &row).await?;
    info!("template merged into cloud row");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::{collections::HashMap, sync::Mutex};

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, Request, ResponseTemplate,
        matchers::{body_partial_json, header as header_is, method, path, query_param},
    };

    use super::*;
    use crate::storage::build_payload_from_names;

    /// In-memory row table.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub rows: Mutex<HashMap<String, RemoteRow>>,
        pub fail_with: Option<u16>,
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        async fn fetch_row(&self, identity: &Identity) -> Result<Option<RemoteRow>> {
            if let Some(status) = self.fail_with {
                return Err(PulseError::Remote {
                    status,
                    message: "unavailable".to_string(),
                });
            }
            Ok(self.rows.lock().unwrap().get(&identity.user_id).cloned())
        }

        async fn upsert_row(&self, identity: &Identity, row: &RemoteRow) -> Result<()> {
            if let Some(status) = self.fail_with {
                return Err(PulseError::Remote {
                    status,
                    message: "unavailable".to_string(),
                });
            }
            self.rows
                .lock()
                .unwrap()
                .insert(identity.user_id.clone(), row.clone());
            Ok(())
        }
    }

    pub(crate) fn identity() -> Identity {
        Identity {
            user_id: "user-1".to_string(),
            access_token: "token-1".to_string(),
        }
    }

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn cloud_config(url: String) -> CloudConfig {
        CloudConfig {
            url,
            anon_key: "anon".to_string(),
            ..CloudConfig::default()
        }
    }

    #[test]
    fn test_sign_in_with_remote_data_applies_it() {
        let today = day("2026-06-01");
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        let generation = adapter.begin_sign_in(identity());
        assert_eq!(adapter.status(), CloudStatus::Loading);

        let row = RemoteRow {
            user_id: "user-1".to_string(),
            habits_data: json!({
                "date": "2026-05-31",
                "habits": [{"id": "h1", "name": "Walk"}],
                "statusById": {"h1": 2}
            }),
            reminders_data: json!(null),
            updated_at: None,
        };

        match adapter.complete_sign_in(generation, Ok(Some(row)), today) {
            SignInOutcome::ApplyRemote { habits, reminders } => {
                assert_eq!(habits.habits.len(), 1);
                assert_eq!(habits.status_by_id.values().next().map(|s| s.level()), Some(0));
                assert_eq!(reminders, ReminderPayload::defaults());
            }
            other => panic!("expected ApplyRemote, got {other:?}"),
        }
        assert_eq!(adapter.status(), CloudStatus::Ready);
    }

    #[test]
    fn test_remote_empty_habit_list_is_not_reseeded() {
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        let generation = adapter.begin_sign_in(identity());
        let row = RemoteRow {
            user_id: "user-1".to_string(),
            habits_data: json!({"habits": []}),
            reminders_data: json!({"version": 2, "items": []}),
            updated_at: None,
        };

        match adapter.complete_sign_in(generation, Ok(Some(row)), day("2026-06-01")) {
            SignInOutcome::ApplyRemote { habits, reminders } => {
                assert!(habits.habits.is_empty());
                assert!(reminders.items.is_empty());
            }
            other => panic!("expected ApplyRemote, got {other:?}"),
        }
    }

    #[test]
    fn test_sign_in_without_row_seeds() {
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        let generation = adapter.begin_sign_in(identity());
        assert_eq!(
            adapter.complete_sign_in(generation, Ok(None), day("2026-06-01")),
            SignInOutcome::SeedRemote
        );
        assert_eq!(adapter.status(), CloudStatus::Ready);
    }

    #[test]
    fn test_sign_in_failure_sets_error() {
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        let generation = adapter.begin_sign_in(identity());
        let failed = Err(PulseError::Remote {
            status: 500,
            message: "boom".to_string(),
        });

        assert_eq!(
            adapter.complete_sign_in(generation, failed, day("2026-06-01")),
            SignInOutcome::Failed
        );
        assert_eq!(adapter.status(), CloudStatus::Error);
        assert_eq!(adapter.error(), Some("remote error (HTTP 500): boom"));
    }

    #[test]
    fn test_stale_sign_in_result_is_dropped() {
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        let first = adapter.begin_sign_in(identity());
        adapter.sign_out();
        assert_eq!(
            adapter.complete_sign_in(first, Ok(None), day("2026-06-01")),
            SignInOutcome::Stale
        );
        assert_eq!(adapter.status(), CloudStatus::Idle);
    }

    #[test]
    fn test_debounce_keeps_only_latest_change() {
        let start = Instant::now();
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        adapter.note_local_change(start);
        assert!(!adapter.has_pending_push(), "not ready yet");

        let generation = adapter.begin_sign_in(identity());
        adapter.complete_sign_in(generation, Ok(None), day("2026-06-01"));

        adapter.note_local_change(start);
        adapter.note_local_change(start + Duration::from_millis(400));
        assert!(adapter.take_due(start + Duration::from_millis(700)).is_none());
        assert_eq!(
            adapter.take_due(start + Duration::from_millis(1000)),
            Some(identity())
        );
        assert!(adapter.take_due(start + Duration::from_millis(2000)).is_none());
    }

    #[test]
    fn test_push_results_set_and_clear_error() {
        let mut adapter = SyncAdapter::new(Duration::from_millis(600));
        adapter.record_push_result(&Err(PulseError::Auth("expired".to_string())));
        assert_eq!(adapter.error(), Some("auth error: expired"));
        adapter.record_push_result(&Ok(()));
        assert_eq!(adapter.error(), None);
    }

    #[tokio::test]
    async fn test_merge_keeps_remote_reminders() {
        let store = MemoryStore::default();
        let existing = RemoteRow {
            user_id: "user-1".to_string(),
            habits_data: json!({"habits": [{"id": "old", "name": "Old"}]}),
            reminders_data: json!({"version": 2, "items": [{"id": "keep"}]}),
            updated_at: None,
        };
        store.rows.lock().unwrap().insert("user-1".to_string(), existing);

        let habits = build_payload_from_names(&["Walk 10 minutes"], day("2026-06-01"));
        merge_habits_into_remote(&store, &identity(), &habits, &ReminderPayload::defaults())
            .await
            .unwrap();

        let row = store.rows.lock().unwrap()["user-1"].clone();
        assert_eq!(row.reminders_data["items"][0]["id"], "keep");
        assert_eq!(row.habits_data["habits"][0]["name"], "Walk 10 minutes");
    }

    #[tokio::test]
    async fn test_merge_without_row_uses_local_reminders() {
        let store = MemoryStore::default();
        let habits = build_payload_from_names(&["Walk"], day("2026-06-01"));
        merge_habits_into_remote(&store, &identity(), &habits, &ReminderPayload::defaults())
            .await
            .unwrap();

        let row = store.rows.lock().unwrap()["user-1"].clone();
        assert_eq!(row.reminders_data["items"][0]["id"], "preset_hydration");
    }

    #[tokio::test]
    async fn test_supabase_fetch_returns_single_row() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/pulse_user_data"))
            .and(query_param("user_id", "eq.user-1"))
            .and(header_is("apikey", "anon"))
            .and(header_is("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "user-1", "habits_data": {"habits": []}, "reminders_data": null}
            ])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&cloud_config(server.uri())).unwrap();
        let row = store.fetch_row(&identity()).await.unwrap().unwrap();
        assert_eq!(row.user_id, "user-1");
        assert!(row.has_habit_data());
    }

    #[tokio::test]
    async fn test_supabase_fetch_empty_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/pulse_user_data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&cloud_config(server.uri())).unwrap();
        assert!(store.fetch_row(&identity()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_supabase_upsert_sends_merge_preference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/pulse_user_data"))
            .and(|request: &Request| {
                request
                    .headers
                    .get("prefer")
                    .and_then(|value| value.to_str().ok())
                    == Some("resolution=merge-duplicates,return=minimal")
            })
            .and(body_partial_json(json!([{"user_id": "user-1"}])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&cloud_config(server.uri())).unwrap();
        let habits = build_payload_from_names(&["Walk"], day("2026-06-01"));
        let row = RemoteRow::snapshot("user-1", &habits, &ReminderPayload::defaults()).unwrap();
        store.upsert_row(&identity(), &row).await.unwrap();
    }

    #[tokio::test]
    async fn test_supabase_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/pulse_user_data"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "JWT expired"})),
            )
            .mount(&server)
            .await;

        let store = SupabaseStore::new(&cloud_config(server.uri())).unwrap();
        let habits = build_payload_from_names(&["Walk"], day("2026-06-01"));
        let row = RemoteRow::snapshot("user-1", &habits, &ReminderPayload::defaults()).unwrap();
        let err = store.upsert_row(&identity(), &row).await.unwrap_err();
        assert_eq!(err.to_string(), "remote error (HTTP 401): JWT expired");
    }

    #[test]
    fn test_unconfigured_cloud_is_rejected() {
        assert!(SupabaseStore::new(&CloudConfig::default()).is_err());
    }
}
