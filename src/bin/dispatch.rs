use anyhow::Context;
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use postpilot::config::AppConfig;
use postpilot::db;
use postpilot::{DispatchRequest, Dispatcher};

/// One delivery pass, meant to be run by cron every few minutes.
///
/// Usage: `dispatch [--force-today] [USER_ID...]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let request = parse_args(std::env::args().skip(1))?;
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "dispatch",
        database_url = %config.redacted_database_url(),
        concurrency = config.dispatch_concurrency,
        claim_lease_minutes = config.dispatch_claim_lease_minutes,
        forced = request.force_send_today,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(
        &config.database_url,
        config.database_max_pool_size.max(config.dispatch_concurrency as u32),
    )?;
    db::run_migrations(&pool)?;

    let dispatcher = Dispatcher::from_config(&config, pool)?;
    let report = dispatcher
        .run(request, Utc::now())
        .await
        .context("delivery pass failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    for failure in &report.failed {
        tracing::warn!(user_id = %failure.user_id, error = %failure.error, "delivery failed");
    }
    Ok(())
}

fn parse_args(args: impl Iterator<Item = String>) -> anyhow::Result<DispatchRequest> {
    let mut request = DispatchRequest::default();
    let mut user_ids = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--force-today" => request.force_send_today = true,
            flag if flag.starts_with("--") => anyhow::bail!("unknown flag {flag}"),
            _ => user_ids.push(arg),
        }
    }
    if !user_ids.is_empty() {
        request.user_ids = Some(user_ids);
    }
    Ok(request)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
