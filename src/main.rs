use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use matchwatch::notify::status_bot;
use matchwatch::{
    BrowsingSession, ContestStore, Notifier, SelectorConfig, StatusTracker, WatchConfig, Watcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = WatchConfig::from_env()?;
    let selectors = SelectorConfig::load(&config.selectors_path)?;
    info!("watching {} every {} ms", config.base_url, config.interval.as_millis());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let notifier = Notifier::new(http_client, &config.telegram);
    let status = Arc::new(StatusTracker::new());

    notifier.notify_started().await;

    // Independent failure domain: the status bot supervises itself, and the
    // outer join only exists to log an abnormal death. Neither task can take
    // the other down.
    {
        let bot = tokio::spawn(status_bot::run(
            config.telegram.clone(),
            Arc::clone(&status),
        ));
        tokio::spawn(async move {
            if let Err(e) = bot.await {
                error!("status bot task terminated abnormally: {}", e);
            }
        });
    }

    let session = match BrowsingSession::launch(config.headless).await {
        Ok(session) => session,
        Err(e) => {
            notifier.notify_error("startup", &format!("{e:#}")).await;
            return Err(e);
        }
    };

    let store = ContestStore::new(config.contests_path());
    let watcher = Watcher::new(config, selectors, store, status, notifier.clone());

    if let Err(e) = watcher.run(session).await {
        notifier.notify_error("fatal", &format!("{e:#}")).await;
        return Err(e);
    }

    info!("watcher stopped cleanly");
    Ok(())
}
