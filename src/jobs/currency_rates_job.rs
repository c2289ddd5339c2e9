// ==================== CURRENCY RATES SCHEDULER ====================
// Keeps the currencies collection fresh: one refresh at startup, then one
// every 12 hours.

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::{config::AppConfig, database::MongoDB, services::currency_service};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Spawns the refresh loop and returns immediately.
pub async fn start_currency_rates_scheduler(db: MongoDB, config: &AppConfig) {
    log::info!("💱 Starting currency rates scheduler (every {}h)", REFRESH_INTERVAL.as_secs() / 3600);

    let api_url = config.exchange_rate_api_url.clone();
    let base = config.base_currency.clone();

    tokio::spawn(async move {
        let mut ticker = interval(REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // first tick completes immediately, which gives the startup refresh
            ticker.tick().await;
            run_once(&db, &api_url, &base).await;
        }
    });

    log::info!("✅ Currency rates scheduler started successfully");
}

async fn run_once(db: &MongoDB, api_url: &str, base: &str) {
    match currency_service::refresh_rates(db, api_url, base).await {
        Ok(count) => log::info!("✅ Currency rates refreshed: {} currencies", count),
        // stale rates stay usable until the next tick
        Err(e) => log::error!("❌ Currency rates refresh failed: {}", e),
    }
}
