//! The orchestrating watch loop.
//!
//! Strictly sequential: one iteration — ensure login, open the list,
//! collect, diff, notify, record — fully completes or fails before the next
//! begins. Failures are recorded and reported, then classified: a
//! crash-classified error replaces the browsing session; anything else keeps
//! it, and the next tick's login check sorts out whatever state the page is
//! in. The loop only exits on the shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::distr::{Distribution, Uniform};
use tracing::{error, info};

use crate::core::config::{SelectorConfig, WatchConfig};
use crate::features::detector;
use crate::features::login::SessionManager;
use crate::features::status::StatusTracker;
use crate::features::store::ContestStore;
use crate::notify::telegram::Notifier;
use crate::scraping::browser_manager::{is_crash_error, BrowsingSession};
use crate::scraping::collector;

pub struct Watcher {
    config: WatchConfig,
    selectors: SelectorConfig,
    session_manager: SessionManager,
    store: ContestStore,
    status: Arc<StatusTracker>,
    notifier: Notifier,
}

impl Watcher {
    pub fn new(
        config: WatchConfig,
        selectors: SelectorConfig,
        store: ContestStore,
        status: Arc<StatusTracker>,
        notifier: Notifier,
    ) -> Self {
        let session_manager = SessionManager::new(&config.state_dir);
        Self {
            config,
            selectors,
            session_manager,
            store,
            status,
            notifier,
        }
    }

    /// Run until the shutdown signal. Consumes the initial browsing session
    /// and respawns it after crash-classified failures.
    pub async fn run(mut self, mut session: BrowsingSession) -> Result<()> {
        loop {
            info!("-----------------------------");
            info!("new iteration");

            if let Err(err) = self.run_once(&session).await {
                error!("iteration failed: {err:#}");
                self.notifier.notify_error("watch iteration", &err).await;

                if is_crash_error(&err) {
                    error!("crash detected — restarting browser");
                    session.close().await;
                    session = match BrowsingSession::launch(self.config.headless).await {
                        Ok(fresh) => {
                            info!("browser recreated successfully");
                            fresh
                        }
                        Err(e) => {
                            // Without a browser there is nothing left to poll.
                            return Err(anyhow!("browser respawn failed: {e:#}"));
                        }
                    };
                }
            }

            let delay = self.config.interval + poll_jitter();
            info!("sleeping for {} ms", delay.as_millis());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        session.close().await;
        self.notifier.notify_stopped().await;
        Ok(())
    }

    /// One full poll iteration against the given session.
    async fn run_once(&mut self, session: &BrowsingSession) -> Result<usize> {
        self.status.mark_run_start();
        let result = self.run_once_inner(session).await;
        match &result {
            Ok(count) => self.status.mark_run_success(*count),
            Err(e) => self.status.mark_run_error(format!("{e:#}")),
        }
        result
    }

    async fn run_once_inner(&mut self, session: &BrowsingSession) -> Result<usize> {
        let driver = session.driver();

        self.session_manager
            .ensure_logged_in(
                driver,
                &self.config.base_url,
                &self.selectors.login,
                &self.config.credentials,
            )
            .await?;
        info!("logged in");

        collector::open_contest_list(driver, &self.selectors.game).await?;
        let snapshot = collector::collect(driver, &self.selectors.game).await?;

        let fresh = detector::detect(&snapshot, &self.store)?;
        if fresh.is_empty() {
            info!("no new contests");
        } else {
            info!("{} new contests found", fresh.len());
            self.notifier.notify_new_contests(&fresh).await;
        }

        Ok(fresh.len())
    }
}

/// Small random offset so polls never land on an exact cadence.
fn poll_jitter() -> Duration {
    let mut rng = rand::rng();
    let dist = Uniform::new(0u64, 750).unwrap();
    Duration::from_millis(dist.sample(&mut rng))
}
