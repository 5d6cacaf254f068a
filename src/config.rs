use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::{
    db::DEFAULT_MAX_POOL_SIZE,
    dispatch::{DEFAULT_CLAIM_LEASE_MINUTES, DEFAULT_CONCURRENCY},
    generation::openai::{DEFAULT_API_URL, DEFAULT_MODEL},
    mailer::DEFAULT_MAIL_API_URL,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub cors_allowed_origin: Option<String>,
    pub openai_api_key: String,
    pub openai_api_url: String,
    pub openai_model: String,
    pub openai_max_tokens: Option<u32>,
    pub mail_api_key: String,
    pub mail_api_url: String,
    pub mail_from: String,
    pub dispatch_secret: Option<String>,
    pub dispatch_concurrency: usize,
    pub dispatch_claim_lease_minutes: i64,
    pub mailchimp: Option<MailchimpConfig>,
}

#[derive(Clone, Debug)]
pub struct MailchimpConfig {
    pub api_key: String,
    pub list_id: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "postpilot".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "postpilot-clients".to_string());
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let openai_api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let openai_api_url =
            env::var("OPENAI_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let openai_model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let openai_max_tokens = match env::var("OPENAI_MAX_TOKENS") {
            Ok(value) => Some(
                value
                    .parse()
                    .context("OPENAI_MAX_TOKENS must be an integer")?,
            ),
            Err(_) => None,
        };
        let mail_api_key = env::var("MAIL_API_KEY").context("MAIL_API_KEY must be set")?;
        let mail_api_url =
            env::var("MAIL_API_URL").unwrap_or_else(|_| DEFAULT_MAIL_API_URL.to_string());
        let mail_from = env::var("MAIL_FROM").context("MAIL_FROM must be set")?;
        let dispatch_secret = env::var("DISPATCH_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let dispatch_concurrency = env::var("DISPATCH_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|value: &usize| *value > 0)
            .unwrap_or(DEFAULT_CONCURRENCY);
        let dispatch_claim_lease_minutes = match env::var("DISPATCH_CLAIM_LEASE_MINUTES") {
            Ok(value) => value
                .parse()
                .context("DISPATCH_CLAIM_LEASE_MINUTES must be an integer")?,
            Err(_) => DEFAULT_CLAIM_LEASE_MINUTES,
        };
        let mailchimp = match (env::var("MAILCHIMP_API_KEY"), env::var("MAILCHIMP_LIST_ID")) {
            (Ok(api_key), Ok(list_id)) => Some(MailchimpConfig { api_key, list_id }),
            _ => None,
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            cors_allowed_origin,
            openai_api_key,
            openai_api_url,
            openai_model,
            openai_max_tokens,
            mail_api_key,
            mail_api_url,
            mail_from,
            dispatch_secret,
            dispatch_concurrency,
            dispatch_claim_lease_minutes,
            mailchimp,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
