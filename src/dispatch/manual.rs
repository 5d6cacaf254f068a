use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{DeliveryError, Dispatcher};
use crate::{
    generation::ContentArtifact,
    history::{DeliveryTrigger, HistoryRecord},
    mailer::OutgoingMail,
    occasion,
    preferences::PreferenceRecord,
    render::render_delivery,
};

impl Dispatcher {
    /// Generates and mails a single artifact right away, outside any
    /// occasion. The caller is responsible for the entitlement check.
    ///
    /// A history append failure after the mail went out is logged and the
    /// artifact is still returned.
    pub async fn send_now(
        &self,
        record: &PreferenceRecord,
        now: DateTime<Utc>,
    ) -> Result<ContentArtifact, DeliveryError> {
        let artifact = self
            .generator
            .generate(&record.industry, &record.tone, record.temperature)
            .await?;

        let date = occasion::local_date(record, now).unwrap_or_else(|| now.date_naive());
        let rendered = render_delivery(
            record.template,
            &record.tone,
            &record.industry,
            std::slice::from_ref(&artifact),
            date,
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
            &artifact,
            record.template,
            &record.tone,
            DeliveryTrigger::Manual,
            None,
            now,
        );
        match self.ledger.record_delivery(history).await {
            Ok(history) => {
                info!(user_id = %record.user_id, history_id = %history.id, "manual delivery sent")
            }
            Err(err) => {
                warn!(user_id = %record.user_id, error = %err, "manual delivery sent but not recorded")
            }
        }
        Ok(artifact)
    }
}
