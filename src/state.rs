use std::sync::Arc;

use crate::{
    audience::MailingList,
    auth::jwt::JwtService,
    dispatch::Dispatcher,
    entitlement::EntitlementProvider,
    error::{AppError, AppResult},
    history::DeliveryLedger,
    preferences::PreferenceStore,
};

#[derive(Clone)]
pub struct AppState {
    pub preferences: Arc<dyn PreferenceStore>,
    pub ledger: Arc<dyn DeliveryLedger>,
    pub entitlements: Arc<dyn EntitlementProvider>,
    pub mailing_list: Arc<dyn MailingList>,
    pub dispatcher: Dispatcher,
    pub jwt: JwtService,
    pub dispatch_secret: Option<Arc<str>>,
}

impl AppState {
    /// Shares the dispatcher's stores so routes and passes see the same data.
    pub fn new(
        dispatcher: Dispatcher,
        mailing_list: Arc<dyn MailingList>,
        jwt: JwtService,
        dispatch_secret: Option<String>,
    ) -> Self {
        Self {
            preferences: dispatcher.preferences(),
            ledger: dispatcher.ledger(),
            entitlements: dispatcher.entitlements(),
            mailing_list,
            dispatcher,
            jwt,
            dispatch_secret: dispatch_secret.map(Arc::from),
        }
    }

    /// Fails with 403 unless the address has an active entitlement.
    pub async fn require_entitlement(&self, email: &str) -> AppResult<()> {
        let status = self.entitlements.status(email).await?;
        if status.is_active() {
            Ok(())
        } else {
            Err(AppError::forbidden("an active subscription is required"))
        }
    }
}
