use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::{
    db::{with_conn, PgPool, StoreResult},
    models::SubscriptionRow,
    schema::subscriptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementStatus {
    Active,
    Inactive,
    Expired,
}

impl EntitlementStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, EntitlementStatus::Active)
    }

    /// Derives the status from a billing row as written by the payment
    /// integration.
    pub fn from_subscription(
        status: &str,
        current_period_end: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Self {
        let period_over = current_period_end.is_some_and(|end| end <= now);
        match status.to_ascii_lowercase().as_str() {
            "active" | "trialing" if !period_over => EntitlementStatus::Active,
            "active" | "trialing" | "canceled" | "expired" if period_over => {
                EntitlementStatus::Expired
            }
            "expired" => EntitlementStatus::Expired,
            _ => EntitlementStatus::Inactive,
        }
    }
}

#[async_trait]
pub trait EntitlementProvider: Send + Sync + 'static {
    async fn status(&self, email: &str) -> StoreResult<EntitlementStatus>;
}

/// Reads the `subscriptions` table maintained by the billing integration,
/// which stores addresses lower-cased.
pub struct PgEntitlements {
    pool: PgPool,
}

impl PgEntitlements {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementProvider for PgEntitlements {
    async fn status(&self, email: &str) -> StoreResult<EntitlementStatus> {
        let email = email.trim().to_ascii_lowercase();
        with_conn(&self.pool, move |conn| {
            let row = subscriptions::table
                .filter(subscriptions::email.eq(&email))
                .first::<SubscriptionRow>(conn)
                .optional()?;
            let now = Utc::now().naive_utc();
            Ok(row
                .map(|row| {
                    EntitlementStatus::from_subscription(&row.status, row.current_period_end, now)
                })
                .unwrap_or(EntitlementStatus::Inactive))
        })
        .await
    }
}
