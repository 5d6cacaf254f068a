use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use http_body_util::BodyExt;
use postpilot::audience::{AudienceError, MailingList};
use postpilot::auth::jwt::JwtService;
use postpilot::db::{self, PgPool, StoreResult};
use postpilot::entitlement::{EntitlementProvider, EntitlementStatus};
use postpilot::generation::{
    ContentGenerator, GenerationError, GenerationProvider, GenerationRequest,
};
use postpilot::history::{ClaimOutcome, DeliveryLedger, HistoryRecord};
use postpilot::mailer::{MailTransport, OutgoingMail, TransportError};
use postpilot::occasion::Occasion;
use postpilot::preferences::{validate_email, PreferenceDraft, PreferenceRecord, PreferenceStore};
use postpilot::routes;
use postpilot::state::AppState;
use postpilot::{DispatchSettings, Dispatcher};
use diesel::connection::SimpleConnection;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

pub const DISPATCH_SECRET: &str = "test-dispatch-secret";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct MemoryPreferenceStore {
    records: Mutex<BTreeMap<String, PreferenceRecord>>,
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<PreferenceRecord>> {
        Ok(self.records.lock().await.get(user_id).cloned())
    }

    async fn upsert(&self, mut record: PreferenceRecord) -> StoreResult<PreferenceRecord> {
        let mut guard = self.records.lock().await;
        if let Some(existing) = guard.get(&record.user_id) {
            record.created_at = existing.created_at;
        }
        guard.insert(record.user_id.clone(), record.clone());
        Ok(record)
    }

    async fn list_all(&self) -> StoreResult<Vec<PreferenceRecord>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

#[derive(Clone)]
struct ClaimState {
    status: &'static str,
    claimed_at: DateTime<Utc>,
}

/// Mirrors the claim rules of the Postgres ledger.
#[derive(Default)]
pub struct MemoryLedger {
    claims: Mutex<HashMap<(String, NaiveDate), ClaimState>>,
    history: Mutex<Vec<HistoryRecord>>,
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn try_claim(
        &self,
        occasion: &Occasion,
        now: DateTime<Utc>,
        lease: ChronoDuration,
    ) -> StoreResult<ClaimOutcome> {
        let mut claims = self.claims.lock().await;
        let key = (occasion.user_id.clone(), occasion.date);
        match claims.get(&key) {
            Some(claim) if claim.status == "delivered" => Ok(ClaimOutcome::AlreadyDelivered),
            Some(claim) if claim.status == "claimed" && claim.claimed_at > now - lease => {
                Ok(ClaimOutcome::InFlight)
            }
            _ => {
                claims.insert(
                    key,
                    ClaimState {
                        status: "claimed",
                        claimed_at: now,
                    },
                );
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn record_delivery(&self, record: HistoryRecord) -> StoreResult<HistoryRecord> {
        if let Some(date) = record.occasion_date {
            let mut claims = self.claims.lock().await;
            if let Some(claim) = claims.get_mut(&(record.user_id.clone(), date)) {
                claim.status = "delivered";
            }
        }
        self.history.lock().await.push(record.clone());
        Ok(record)
    }

    async fn release_claim(&self, occasion: &Occasion, _reason: &str) -> StoreResult<()> {
        let mut claims = self.claims.lock().await;
        if let Some(claim) = claims.get_mut(&(occasion.user_id.clone(), occasion.date)) {
            if claim.status == "claimed" {
                claim.status = "released";
            }
        }
        Ok(())
    }

    async fn recent_history(&self, user_id: &str, limit: i64) -> StoreResult<Vec<HistoryRecord>> {
        let history = self.history.lock().await;
        Ok(history
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }
}

impl MemoryLedger {
    pub async fn history(&self) -> Vec<HistoryRecord> {
        self.history.lock().await.clone()
    }

    /// Marks a claim as taken by a pass that never finished.
    #[allow(dead_code)]
    pub async fn plant_claim(&self, user_id: &str, date: NaiveDate, claimed_at: DateTime<Utc>) {
        self.claims.lock().await.insert(
            (user_id.to_string(), date),
            ClaimState {
                status: "claimed",
                claimed_at,
            },
        );
    }
}

#[derive(Default)]
pub struct FakeEntitlements {
    statuses: Mutex<HashMap<String, EntitlementStatus>>,
}

#[async_trait]
impl EntitlementProvider for FakeEntitlements {
    async fn status(&self, email: &str) -> StoreResult<EntitlementStatus> {
        Ok(self
            .statuses
            .lock()
            .await
            .get(&email.to_ascii_lowercase())
            .copied()
            .unwrap_or(EntitlementStatus::Inactive))
    }
}

impl FakeEntitlements {
    pub async fn set(&self, email: &str, status: EntitlementStatus) {
        self.statuses
            .lock()
            .await
            .insert(email.to_ascii_lowercase(), status);
    }
}

/// Returns a headline plus body per request; industries listed in
/// `failing` get a provider error instead.
#[derive(Default)]
pub struct ScriptedProvider {
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.lock().await.contains(&request.industry) {
            return Err(GenerationError::Provider {
                status: 500,
                message: "upstream exploded".to_string(),
            });
        }
        Ok(format!(
            "## {industry} idea {call}\n\
             Three things {industry} teams should watch this week.\n\
             Start small & measure <everything>.",
            industry = request.industry,
        ))
    }
}

impl ScriptedProvider {
    pub async fn fail_for(&self, industry: &str) {
        self.failing.lock().await.insert(industry.to_string());
    }

    #[allow(dead_code)]
    pub async fn recover(&self, industry: &str) {
        self.failing.lock().await.remove(industry);
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    rejecting: Mutex<HashSet<String>>,
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        if self.rejecting.lock().await.contains(&mail.to) {
            return Err(TransportError::Rejected {
                status: 422,
                message: "mailbox unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(mail.clone());
        Ok(())
    }
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().await.clone()
    }

    #[allow(dead_code)]
    pub async fn reject(&self, address: &str) {
        self.rejecting.lock().await.insert(address.to_string());
    }
}

#[derive(Default)]
pub struct FakeMailingList {
    members: Mutex<Vec<(String, Option<String>)>>,
}

#[async_trait]
impl MailingList for FakeMailingList {
    async fn subscribe(&self, email: &str, first_name: Option<&str>) -> Result<(), AudienceError> {
        let email = validate_email(email)?;
        self.members
            .lock()
            .await
            .push((email, first_name.map(str::to_string)));
        Ok(())
    }
}

impl FakeMailingList {
    #[allow(dead_code)]
    pub async fn members(&self) -> Vec<(String, Option<String>)> {
        self.members.lock().await.clone()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub preferences: Arc<MemoryPreferenceStore>,
    pub ledger: Arc<MemoryLedger>,
    pub entitlements: Arc<FakeEntitlements>,
    pub provider: Arc<ScriptedProvider>,
    pub mailer: Arc<RecordingMailer>,
    pub mailing_list: Arc<FakeMailingList>,
    router: Router,
    jwt: JwtService,
}

impl TestApp {
    pub fn new() -> Self {
        let preferences = Arc::new(MemoryPreferenceStore::default());
        let ledger = Arc::new(MemoryLedger::default());
        let entitlements = Arc::new(FakeEntitlements::default());
        let provider = Arc::new(ScriptedProvider::default());
        let mailer = Arc::new(RecordingMailer::default());
        let mailing_list = Arc::new(FakeMailingList::default());

        let dispatcher = Dispatcher::new(
            preferences.clone(),
            ledger.clone(),
            entitlements.clone(),
            ContentGenerator::new(provider.clone()),
            mailer.clone(),
            DispatchSettings::default(),
        );
        let jwt = JwtService::new("test-secret", "test-issuer", "test-audience");
        let state = AppState::new(
            dispatcher,
            mailing_list.clone(),
            jwt.clone(),
            Some(DISPATCH_SECRET.to_string()),
        );
        let router = routes::create_router(state.clone());

        Self {
            state,
            preferences,
            ledger,
            entitlements,
            provider,
            mailer,
            mailing_list,
            router,
            jwt,
        }
    }

    pub fn token(&self, user_id: &str, email: &str) -> Result<String> {
        self.jwt
            .generate_token(user_id, email, ChronoDuration::minutes(30))
    }

    /// Stores preferences directly, bypassing the HTTP entitlement gate.
    pub async fn seed_user(&self, user_id: &str, draft: PreferenceDraft) -> Result<PreferenceRecord> {
        let email = format!("{user_id}@example.com");
        let record = draft
            .into_record(user_id, &email, Utc::now().naive_utc())
            .context("seed draft must be valid")?;
        Ok(self.preferences.upsert(record).await?)
    }

    pub async fn entitle(&self, email: &str) {
        self.entitlements.set(email, EntitlementStatus::Active).await;
    }

    pub async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&T>,
        token: Option<&str>,
        extra_headers: &[(&str, &str)],
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        let body = match payload {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(payload)?)
            }
            None => Body::empty(),
        };
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Some(payload), token, &[]).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::PUT, path, Some(payload), token, &[]).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send::<()>(Method::GET, path, None, token, &[]).await
    }
}

pub fn draft(industry: &str, delivery_time: &str, timezone: &str) -> PreferenceDraft {
    PreferenceDraft {
        industry: industry.to_string(),
        tone: Some("professional".to_string()),
        template: Some("bullet-points-style-x-style".to_string()),
        temperature: Some(0.7),
        delivery_time: Some(delivery_time.to_string()),
        timezone: Some(timezone.to_string()),
        auto_generate: true,
    }
}

/// 2024-03-14 13:02 UTC, which is 09:02 in New York (EDT).
pub fn new_york_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 13, 2, 0).unwrap()
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body.collect().await?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let bytes = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// Migrated and emptied pool for the Postgres-backed tests, or `None` when
/// `TEST_DATABASE_URL` is not set.
#[allow(dead_code)]
pub async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };
    let pool = db::init_pool_with_size(&database_url, 2)?;
    let setup_pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&setup_pool)?;
        let mut conn = setup_pool
            .get()
            .context("failed to get setup connection")?;
        conn.batch_execute(
            "TRUNCATE delivery_history, occasion_claims, subscriptions, user_preferences",
        )
        .context("failed to truncate tables")?;
        Ok(())
    })
    .await
    .context("setup task panicked")??;
    Ok(Some(pool))
}
