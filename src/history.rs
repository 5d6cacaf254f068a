//! Append-only delivery history plus the per-occasion claims that keep a
//! scheduled delivery from going out twice on the same local day.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::{with_conn, PgPool, StoreError, StoreResult},
    generation::ContentArtifact,
    models::{HistoryRow, NewHistoryRow, NewOccasionClaim, OccasionClaim},
    occasion::Occasion,
    schema::{delivery_history, occasion_claims},
    template::Template,
    tone::Tone,
};

pub const CLAIM_CLAIMED: &str = "claimed";
pub const CLAIM_DELIVERED: &str = "delivered";
pub const CLAIM_RELEASED: &str = "released";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryTrigger {
    Scheduled,
    Forced,
    Manual,
}

impl DeliveryTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryTrigger::Scheduled => "scheduled",
            DeliveryTrigger::Forced => "forced",
            DeliveryTrigger::Manual => "manual",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "scheduled" => Some(DeliveryTrigger::Scheduled),
            "forced" => Some(DeliveryTrigger::Forced),
            "manual" => Some(DeliveryTrigger::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub title: String,
    pub body: String,
    pub template: Template,
    pub tone: Tone,
    pub trigger: DeliveryTrigger,
    pub occasion_date: Option<NaiveDate>,
    pub content_digest: String,
    pub sent_at: NaiveDateTime,
}

impl HistoryRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        email: &str,
        industry: &str,
        artifact: &ContentArtifact,
        template: Template,
        tone: &Tone,
        trigger: DeliveryTrigger,
        occasion_date: Option<NaiveDate>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            industry: industry.to_string(),
            title: artifact.title.clone(),
            body: artifact.body.clone(),
            template,
            tone: tone.clone(),
            trigger,
            occasion_date,
            content_digest: content_digest(&artifact.body),
            sent_at: sent_at.naive_utc(),
        }
    }
}

pub fn content_digest(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The caller owns the occasion and must either record or release it.
    Claimed,
    AlreadyDelivered,
    /// Another pass holds a live claim.
    InFlight,
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync + 'static {
    async fn try_claim(
        &self,
        occasion: &Occasion,
        now: DateTime<Utc>,
        lease: ChronoDuration,
    ) -> StoreResult<ClaimOutcome>;

    /// Appends `record`. Records tied to an occasion also mark its claim
    /// delivered in the same transaction.
    async fn record_delivery(&self, record: HistoryRecord) -> StoreResult<HistoryRecord>;

    async fn release_claim(&self, occasion: &Occasion, reason: &str) -> StoreResult<()>;

    async fn recent_history(&self, user_id: &str, limit: i64) -> StoreResult<Vec<HistoryRecord>>;
}

pub struct PgDeliveryLedger {
    pool: PgPool,
}

impl PgDeliveryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLedger for PgDeliveryLedger {
    async fn try_claim(
        &self,
        occasion: &Occasion,
        now: DateTime<Utc>,
        lease: ChronoDuration,
    ) -> StoreResult<ClaimOutcome> {
        let occasion = occasion.clone();
        let now = now.naive_utc();
        let stale_before = now - lease;

        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let inserted = diesel::insert_into(occasion_claims::table)
                    .values(&NewOccasionClaim {
                        user_id: occasion.user_id.clone(),
                        occasion_date: occasion.date,
                        status: CLAIM_CLAIMED.to_string(),
                        attempts: 1,
                        claimed_at: now,
                        updated_at: now,
                    })
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                if inserted == 1 {
                    return Ok(ClaimOutcome::Claimed);
                }

                let existing: OccasionClaim = occasion_claims::table
                    .find((occasion.user_id.clone(), occasion.date))
                    .for_update()
                    .first(conn)?;

                match existing.status.as_str() {
                    CLAIM_DELIVERED => Ok(ClaimOutcome::AlreadyDelivered),
                    CLAIM_CLAIMED if existing.claimed_at > stale_before => {
                        Ok(ClaimOutcome::InFlight)
                    }
                    _ => {
                        diesel::update(
                            occasion_claims::table.find((occasion.user_id.clone(), occasion.date)),
                        )
                        .set((
                            occasion_claims::status.eq(CLAIM_CLAIMED),
                            occasion_claims::attempts.eq(existing.attempts + 1),
                            occasion_claims::claimed_at.eq(now),
                            occasion_claims::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                        Ok(ClaimOutcome::Claimed)
                    }
                }
            })
            .map_err(StoreError::from)
        })
        .await
    }

    async fn record_delivery(&self, record: HistoryRecord) -> StoreResult<HistoryRecord> {
        with_conn(&self.pool, move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(delivery_history::table)
                    .values(&NewHistoryRow::from(&record))
                    .execute(conn)?;

                if let Some(date) = record.occasion_date {
                    diesel::update(occasion_claims::table.find((record.user_id.clone(), date)))
                        .set((
                            occasion_claims::status.eq(CLAIM_DELIVERED),
                            occasion_claims::last_error.eq::<Option<String>>(None),
                            occasion_claims::updated_at.eq(record.sent_at),
                        ))
                        .execute(conn)?;
                }
                Ok(())
            })?;
            Ok(record)
        })
        .await
    }

    async fn release_claim(&self, occasion: &Occasion, reason: &str) -> StoreResult<()> {
        let occasion = occasion.clone();
        let reason = reason.to_string();
        with_conn(&self.pool, move |conn| {
            diesel::update(
                occasion_claims::table
                    .find((occasion.user_id, occasion.date))
                    .filter(occasion_claims::status.eq(CLAIM_CLAIMED)),
            )
            .set((
                occasion_claims::status.eq(CLAIM_RELEASED),
                occasion_claims::last_error.eq(Some(reason)),
                occasion_claims::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn recent_history(&self, user_id: &str, limit: i64) -> StoreResult<Vec<HistoryRecord>> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, move |conn| {
            let rows: Vec<HistoryRow> = delivery_history::table
                .filter(delivery_history::user_id.eq(&user_id))
                .order(delivery_history::sent_at.desc())
                .limit(limit.max(1))
                .load(conn)?;
            rows.into_iter().map(HistoryRecord::try_from).collect()
        })
        .await
    }
}

impl From<&HistoryRecord> for NewHistoryRow {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id.clone(),
            email: record.email.clone(),
            industry: record.industry.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            template_format: record.template.format.as_str().to_string(),
            template_style: record.template.style.as_str().to_string(),
            tone: record.tone.to_string(),
            trigger_kind: record.trigger.as_str().to_string(),
            occasion_date: record.occasion_date,
            content_digest: record.content_digest.clone(),
            sent_at: record.sent_at,
        }
    }
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let template = Template::from_parts(&row.template_format, &row.template_style)
            .map_err(|err| StoreError::Corrupt(format!("history {}: {err}", row.id)))?;
        let trigger = DeliveryTrigger::parse(&row.trigger_kind).ok_or_else(|| {
            StoreError::Corrupt(format!("history {}: unknown trigger {}", row.id, row.trigger_kind))
        })?;
        let tone = Tone::parse(&row.tone)
            .ok_or_else(|| StoreError::Corrupt(format!("history {}: blank tone", row.id)))?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            industry: row.industry,
            title: row.title,
            body: row.body,
            template,
            tone,
            trigger,
            occasion_date: row.occasion_date,
            content_digest: row.content_digest,
            sent_at: row.sent_at,
        })
    }
}
