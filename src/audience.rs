//! Marketing audience subscription (Mailchimp members API).

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::preferences::{validate_email, ValidationError};

#[derive(Debug, Error)]
pub enum AudienceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("mailing list provider returned {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("mailing list request failed: {0}")]
    Network(String),
}

#[async_trait]
pub trait MailingList: Send + Sync + 'static {
    async fn subscribe(&self, email: &str, first_name: Option<&str>) -> Result<(), AudienceError>;
}

/// Member id the provider expects: hex MD5 of the lower-cased address.
pub fn subscriber_hash(email: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct MailchimpClient {
    client: Client,
    api_base: String,
    api_key: String,
    list_id: String,
}

impl MailchimpClient {
    /// The data center is taken from the key suffix (`...-us21`).
    pub fn new(api_key: impl Into<String>, list_id: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let data_center = api_key
            .rsplit_once('-')
            .map(|(_, dc)| dc.to_string())
            .unwrap_or_else(|| "us1".to_string());
        Self {
            client: Client::new(),
            api_base: format!("https://{data_center}.api.mailchimp.com/3.0"),
            api_key,
            list_id: list_id.into(),
        }
    }

    fn member_url(&self, email: &str) -> String {
        format!(
            "{}/lists/{}/members/{}",
            self.api_base,
            self.list_id,
            subscriber_hash(email)
        )
    }
}

#[derive(Serialize)]
struct MemberUpsert<'a> {
    email_address: &'a str,
    status_if_new: &'static str,
    merge_fields: serde_json::Value,
}

#[async_trait]
impl MailingList for MailchimpClient {
    async fn subscribe(&self, email: &str, first_name: Option<&str>) -> Result<(), AudienceError> {
        let email = validate_email(email)?;
        let merge_fields = match first_name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => json!({ "FNAME": name }),
            None => json!({}),
        };

        let response = self
            .client
            .put(self.member_url(&email))
            .basic_auth("postpilot", Some(&self.api_key))
            .json(&MemberUpsert {
                email_address: &email,
                status_if_new: "subscribed",
                merge_fields,
            })
            .send()
            .await
            .map_err(|err| AudienceError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %message, "mailing list subscribe failed");
            return Err(AudienceError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(member = %subscriber_hash(&email), "subscribed to mailing list");
        Ok(())
    }
}

/// Used when no mailing list is configured.
pub struct DisabledMailingList;

#[async_trait]
impl MailingList for DisabledMailingList {
    async fn subscribe(&self, email: &str, _first_name: Option<&str>) -> Result<(), AudienceError> {
        validate_email(email)?;
        info!("mailing list not configured; skipping subscribe");
        Ok(())
    }
}
