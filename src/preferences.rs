use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db::{with_conn, PgPool, StoreError, StoreResult},
    models::{PreferenceRow, UpsertPreferenceRow},
    occasion::{parse_delivery_time, parse_timezone},
    schema::user_preferences,
    template::Template,
    tone::Tone,
};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("email address `{0}` is invalid")]
    InvalidEmail(String),
    #[error("delivery_time `{0}` must be a 24-hour HH:MM time")]
    InvalidDeliveryTime(String),
    #[error("timezone `{0}` is not a known IANA zone")]
    InvalidTimezone(String),
    #[error("temperature must be a finite number")]
    InvalidTemperature,
    #[error("{0}")]
    Template(#[from] crate::template::TemplateError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRecord {
    pub user_id: String,
    pub email: String,
    pub industry: String,
    pub tone: Tone,
    pub template: Template,
    pub temperature: f64,
    pub delivery_time: Option<String>,
    pub timezone: Option<String>,
    pub auto_generate: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Unvalidated preference submission from the editor.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceDraft {
    pub industry: String,
    pub tone: Option<String>,
    pub template: Option<String>,
    pub temperature: Option<f64>,
    pub delivery_time: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub auto_generate: bool,
}

/// Clamps a finite temperature into `[0.0, 1.0]`.
pub fn clamp_temperature(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidTemperature);
    }
    Ok(value.clamp(0.0, 1.0))
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing("email"));
    }
    // Display-name forms such as `Ada <ada@example.com>` parse too, but only
    // the bare address can be a delivery target.
    match EmailAddress::from_str(trimmed) {
        Ok(parsed) if parsed.email() == trimmed => Ok(trimmed.to_string()),
        _ => Err(ValidationError::InvalidEmail(trimmed.to_string())),
    }
}

impl PreferenceDraft {
    /// Validates the draft for `user_id`/`email` and produces the record that
    /// will be upserted. Timestamps are filled by the store.
    pub fn into_record(
        self,
        user_id: &str,
        email: &str,
        now: NaiveDateTime,
    ) -> Result<PreferenceRecord, ValidationError> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::Missing("user_id"));
        }
        let email = validate_email(email)?;

        let industry = self.industry.trim().to_string();
        if industry.is_empty() {
            return Err(ValidationError::Missing("industry"));
        }

        let tone = match self.tone.as_deref() {
            Some(raw) => Tone::parse(raw).ok_or(ValidationError::Missing("tone"))?,
            None => Tone::Professional,
        };

        let template = match self.template.as_deref() {
            Some(raw) => Template::parse_legacy(raw)?,
            None => Template::default(),
        };

        let temperature = clamp_temperature(self.temperature.unwrap_or(DEFAULT_TEMPERATURE))?;

        let delivery_time = normalize_optional(self.delivery_time);
        if let Some(raw) = &delivery_time {
            if parse_delivery_time(raw).is_none() {
                return Err(ValidationError::InvalidDeliveryTime(raw.clone()));
            }
        }

        let timezone = normalize_optional(self.timezone);
        if let Some(raw) = &timezone {
            if parse_timezone(raw).is_none() {
                return Err(ValidationError::InvalidTimezone(raw.clone()));
            }
        }

        if self.auto_generate {
            if delivery_time.is_none() {
                return Err(ValidationError::Missing("delivery_time"));
            }
            if timezone.is_none() {
                return Err(ValidationError::Missing("timezone"));
            }
        }

        Ok(PreferenceRecord {
            user_id: user_id.to_string(),
            email,
            industry,
            tone,
            template,
            temperature,
            delivery_time,
            timezone,
            auto_generate: self.auto_generate,
            created_at: now,
            updated_at: now,
        })
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

/// Per-request overrides for a manual send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentOverrides {
    pub industry: Option<String>,
    pub template: Option<String>,
    pub tone: Option<String>,
    pub temperature: Option<f64>,
}

impl ContentOverrides {
    /// Layers the overrides over the stored record. Without a stored record the
    /// overrides must at least name an industry.
    pub fn resolve(
        self,
        stored: Option<PreferenceRecord>,
        user_id: &str,
        email: &str,
        now: NaiveDateTime,
    ) -> Result<PreferenceRecord, ValidationError> {
        let Some(mut record) = stored else {
            return PreferenceDraft {
                industry: self.industry.unwrap_or_default(),
                tone: self.tone,
                template: self.template,
                temperature: self.temperature,
                delivery_time: None,
                timezone: None,
                auto_generate: false,
            }
            .into_record(user_id, email, now);
        };

        if let Some(industry) = normalize_optional(self.industry) {
            record.industry = industry;
        }
        if let Some(raw) = self.tone.as_deref() {
            record.tone = Tone::parse(raw).ok_or(ValidationError::Missing("tone"))?;
        }
        if let Some(raw) = self.template.as_deref() {
            record.template = Template::parse_legacy(raw)?;
        }
        if let Some(temperature) = self.temperature {
            record.temperature = clamp_temperature(temperature)?;
        }
        Ok(record)
    }
}

#[async_trait]
pub trait PreferenceStore: Send + Sync + 'static {
    async fn get(&self, user_id: &str) -> StoreResult<Option<PreferenceRecord>>;

    /// Inserts or replaces the record keyed by `user_id`, returning the stored
    /// row. `created_at` of an existing row is preserved.
    async fn upsert(&self, record: PreferenceRecord) -> StoreResult<PreferenceRecord>;

    async fn list_all(&self) -> StoreResult<Vec<PreferenceRecord>>;
}

pub struct PgPreferenceStore {
    pool: PgPool,
}

impl PgPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceStore for PgPreferenceStore {
    async fn get(&self, user_id: &str) -> StoreResult<Option<PreferenceRecord>> {
        let user_id = user_id.to_string();
        with_conn(&self.pool, move |conn| {
            let row = user_preferences::table
                .find(user_id)
                .first::<PreferenceRow>(conn)
                .optional()?;
            row.map(PreferenceRecord::try_from).transpose()
        })
        .await
    }

    async fn upsert(&self, record: PreferenceRecord) -> StoreResult<PreferenceRecord> {
        with_conn(&self.pool, move |conn| {
            let row = UpsertPreferenceRow::from(&record);
            let stored: PreferenceRow = diesel::insert_into(user_preferences::table)
                .values(&row)
                .on_conflict(user_preferences::user_id)
                .do_update()
                .set(&row)
                .get_result(conn)?;
            PreferenceRecord::try_from(stored)
        })
        .await
    }

    async fn list_all(&self) -> StoreResult<Vec<PreferenceRecord>> {
        with_conn(&self.pool, |conn| {
            let rows: Vec<PreferenceRow> = user_preferences::table
                .order(user_preferences::user_id.asc())
                .load(conn)?;
            rows.into_iter().map(PreferenceRecord::try_from).collect()
        })
        .await
    }
}

impl From<&PreferenceRecord> for UpsertPreferenceRow {
    fn from(record: &PreferenceRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            email: record.email.clone(),
            industry: record.industry.clone(),
            tone: record.tone.to_string(),
            template_format: record.template.format.as_str().to_string(),
            template_style: record.template.style.as_str().to_string(),
            temperature: record.temperature,
            delivery_time: record.delivery_time.clone(),
            timezone: record.timezone.clone(),
            auto_generate: record.auto_generate,
            updated_at: Utc::now().naive_utc(),
        }
    }
}

impl TryFrom<PreferenceRow> for PreferenceRecord {
    type Error = StoreError;

    fn try_from(row: PreferenceRow) -> Result<Self, Self::Error> {
        let template = Template::from_parts(&row.template_format, &row.template_style)
            .map_err(|err| StoreError::Corrupt(format!("user {}: {err}", row.user_id)))?;
        let tone = Tone::parse(&row.tone)
            .ok_or_else(|| StoreError::Corrupt(format!("user {}: blank tone", row.user_id)))?;

        Ok(Self {
            user_id: row.user_id,
            email: row.email,
            industry: row.industry,
            tone,
            template,
            temperature: row.temperature.clamp(0.0, 1.0),
            delivery_time: row.delivery_time,
            timezone: row.timezone,
            auto_generate: row.auto_generate,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
