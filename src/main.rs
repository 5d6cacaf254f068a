use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::make::Shared;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use postpilot::audience::{DisabledMailingList, MailchimpClient, MailingList};
use postpilot::auth::jwt::JwtService;
use postpilot::config::AppConfig;
use postpilot::db;
use postpilot::routes;
use postpilot::state::AppState;
use postpilot::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        openai_model = %config.openai_model,
        dispatch_trigger_enabled = config.dispatch_secret.is_some(),
        mailing_list_enabled = config.mailchimp.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let dispatcher = Dispatcher::from_config(&config, pool)?;
    let mailing_list: Arc<dyn MailingList> = match &config.mailchimp {
        Some(mailchimp) => Arc::new(MailchimpClient::new(&mailchimp.api_key, &mailchimp.list_id)),
        None => Arc::new(DisabledMailingList),
    };
    let jwt = JwtService::from_config(&config);
    let cors = routes::cors_layer(config.cors_allowed_origin.as_deref())?;
    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(dispatcher, mailing_list, jwt, config.dispatch_secret.clone());
    let router = routes::create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, Shared::new(router)).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
