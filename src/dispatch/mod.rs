use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    db::{PgPool, StoreError},
    entitlement::{EntitlementProvider, PgEntitlements},
    generation::{openai::OpenAiProvider, ContentGenerator, GenerationError},
    history::{ClaimOutcome, DeliveryLedger, DeliveryTrigger, HistoryRecord, PgDeliveryLedger},
    mailer::{HttpMailTransport, MailTransport, OutgoingMail, TransportError},
    occasion::{self, Occasion},
    preferences::{PgPreferenceStore, PreferenceRecord, PreferenceStore},
    render::{render_delivery, RenderError},
};

pub mod manual;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_CLAIM_LEASE_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Mail went out but the history append failed.
    #[error("delivery sent but not recorded: {0}")]
    Unrecorded(StoreError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to load preferences: {0}")]
    Preferences(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub user_ids: Option<Vec<String>>,
    #[serde(default)]
    pub force_send_today: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDelivery {
    pub user_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub evaluated: usize,
    pub due: usize,
    pub processed: usize,
    pub already_delivered: usize,
    pub not_entitled: usize,
    pub failed: Vec<FailedDelivery>,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub claim_lease: ChronoDuration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            claim_lease: ChronoDuration::minutes(DEFAULT_CLAIM_LEASE_MINUTES),
        }
    }
}

enum UserOutcome {
    Delivered,
    AlreadyDelivered,
    NotEntitled,
    Failed(String),
}

#[derive(Clone)]
pub struct Dispatcher {
    preferences: Arc<dyn PreferenceStore>,
    ledger: Arc<dyn DeliveryLedger>,
    entitlements: Arc<dyn EntitlementProvider>,
    generator: ContentGenerator,
    mailer: Arc<dyn MailTransport>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        ledger: Arc<dyn DeliveryLedger>,
        entitlements: Arc<dyn EntitlementProvider>,
        generator: ContentGenerator,
        mailer: Arc<dyn MailTransport>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            preferences,
            ledger,
            entitlements,
            generator,
            mailer,
            settings,
        }
    }

    /// Wires the Postgres stores and the HTTP clients named in `config`.
    pub fn from_config(config: &AppConfig, pool: PgPool) -> anyhow::Result<Self> {
        let provider = OpenAiProvider::new(
            &config.openai_api_url,
            &config.openai_api_key,
            &config.openai_model,
            config.openai_max_tokens,
        )?;
        let mailer = HttpMailTransport::new(
            &config.mail_api_url,
            &config.mail_api_key,
            &config.mail_from,
        );

        Ok(Self::new(
            Arc::new(PgPreferenceStore::new(pool.clone())),
            Arc::new(PgDeliveryLedger::new(pool.clone())),
            Arc::new(PgEntitlements::new(pool)),
            ContentGenerator::new(Arc::new(provider)),
            Arc::new(mailer),
            DispatchSettings {
                concurrency: config.dispatch_concurrency,
                claim_lease: ChronoDuration::minutes(config.dispatch_claim_lease_minutes),
            },
        ))
    }

    pub fn preferences(&self) -> Arc<dyn PreferenceStore> {
        self.preferences.clone()
    }

    pub fn ledger(&self) -> Arc<dyn DeliveryLedger> {
        self.ledger.clone()
    }

    pub fn entitlements(&self) -> Arc<dyn EntitlementProvider> {
        self.entitlements.clone()
    }

    /// Runs one periodic pass over every stored preference.
    pub async fn run_scheduled_pass(&self, now: DateTime<Utc>) -> Result<PassReport, DispatchError> {
        self.run(DispatchRequest::default(), now).await
    }

    pub async fn run(
        &self,
        request: DispatchRequest,
        now: DateTime<Utc>,
    ) -> Result<PassReport, DispatchError> {
        let records = self.preferences.list_all().await?;
        let selected: Vec<PreferenceRecord> = match &request.user_ids {
            Some(ids) => records
                .into_iter()
                .filter(|record| ids.contains(&record.user_id))
                .collect(),
            None => records,
        };

        let mut report = PassReport {
            evaluated: selected.len(),
            ..PassReport::default()
        };

        let due: Vec<(PreferenceRecord, Occasion, DeliveryTrigger)> = selected
            .into_iter()
            .filter_map(|record| {
                if request.force_send_today {
                    let occasion = Occasion::for_forced(&record, now);
                    return Some((record, occasion, DeliveryTrigger::Forced));
                }
                if !occasion::is_due(&record, now) {
                    return None;
                }
                let occasion = Occasion::for_record(&record, now)?;
                Some((record, occasion, DeliveryTrigger::Scheduled))
            })
            .collect();
        report.due = due.len();

        info!(
            evaluated = report.evaluated,
            due = report.due,
            forced = request.force_send_today,
            "starting delivery pass"
        );

        let outcomes: Vec<(String, UserOutcome)> = stream::iter(due)
            .map(|(record, occasion, trigger)| async move {
                let outcome = self.process_occasion(&record, &occasion, trigger, now).await;
                (record.user_id, outcome)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (user_id, outcome) in outcomes {
            match outcome {
                UserOutcome::Delivered => report.processed += 1,
                UserOutcome::AlreadyDelivered => report.already_delivered += 1,
                UserOutcome::NotEntitled => report.not_entitled += 1,
                UserOutcome::Failed(error) => report.failed.push(FailedDelivery { user_id, error }),
            }
        }
        report.failed.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        info!(
            processed = report.processed,
            already_delivered = report.already_delivered,
            not_entitled = report.not_entitled,
            failed = report.failed.len(),
            "delivery pass finished"
        );
        Ok(report)
    }

    async fn process_occasion(
        &self,
        record: &PreferenceRecord,
        occasion: &Occasion,
        trigger: DeliveryTrigger,
        now: DateTime<Utc>,
    ) -> UserOutcome {
        match self.entitlements.status(&record.email).await {
            Ok(status) if status.is_active() => {}
            Ok(status) => {
                info!(user_id = %record.user_id, ?status, "skipping user without active entitlement");
                return UserOutcome::NotEntitled;
            }
            Err(err) => {
                warn!(user_id = %record.user_id, error = %err, "entitlement lookup failed");
                return UserOutcome::Failed(err.to_string());
            }
        }

        match self
            .ledger
            .try_claim(occasion, now, self.settings.claim_lease)
            .await
        {
            Ok(ClaimOutcome::Claimed) => {}
            Ok(outcome) => {
                info!(user_id = %record.user_id, date = %occasion.date, ?outcome, "occasion already handled");
                return UserOutcome::AlreadyDelivered;
            }
            Err(err) => {
                warn!(user_id = %record.user_id, error = %err, "failed to claim occasion");
                return UserOutcome::Failed(err.to_string());
            }
        }

        match self.deliver_batch(record, occasion, trigger, now).await {
            Ok(history) => {
                info!(
                    user_id = %record.user_id,
                    date = %occasion.date,
                    history_id = %history.id,
                    "delivered scheduled content"
                );
                UserOutcome::Delivered
            }
            Err(err) => {
                error!(user_id = %record.user_id, date = %occasion.date, error = %err, "delivery failed");
                if !matches!(err, DeliveryError::Unrecorded(_)) {
                    if let Err(release_err) =
                        self.ledger.release_claim(occasion, &err.to_string()).await
                    {
                        warn!(user_id = %record.user_id, error = %release_err, "failed to release claim");
                    }
                }
                UserOutcome::Failed(err.to_string())
            }
        }
    }

    async fn deliver_batch(
        &self,
        record: &PreferenceRecord,
        occasion: &Occasion,
        trigger: DeliveryTrigger,
        now: DateTime<Utc>,
    ) -> Result<HistoryRecord, DeliveryError> {
        let artifacts = self
            .generator
            .generate_batch(&record.industry, &record.tone, record.temperature)
            .await?;
        let chosen = artifacts.first().ok_or(GenerationError::Empty)?;

        let rendered = render_delivery(
            record.template,
            &record.tone,
            &record.industry,
            &artifacts,
            occasion.date,
        )?;
        self.mailer
            .send(&OutgoingMail {
                to: record.email.clone(),
                subject: rendered.subject,
                html: rendered.html,
                text: rendered.text,
            })
            .await?;

        let history = HistoryRecord::new(
            &record.user_id,
            &record.email,
            &record.industry,
            chosen,
            record.template,
            &record.tone,
            trigger,
            Some(occasion.date),
            now,
        );
        self.ledger
            .record_delivery(history)
            .await
            .map_err(DeliveryError::Unrecorded)
    }
}
