//! Login-wall session management.
//!
//! [`SessionManager`] decides before each scrape whether the browsing session
//! is still authenticated and, when it is not, drives the site's modal login
//! flow through the abstract [`PageDriver`] capabilities. Two independent
//! signals mean "already logged in": landing on the authenticated path prefix
//! of the same origin, or the post-login sentinel element being visible —
//! either alone is accepted, tolerating partially-rendered pages.
//!
//! Every failure here is terminal for the current iteration; the watch loop
//! retries naturally on its next tick.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::core::config::LoginSelectors;
use crate::core::types::{Credentials, SessionState};
use crate::scraping::driver::PageDriver;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login_modal_not_visible")]
    ModalNotVisible,

    #[error("login_failed")]
    LoginFailed,

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// Phases of the modal login flow, logged as the machine advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginPhase {
    SeekingModal,
    ModalVisible,
    FormFilled,
    Submitted,
    Resolved,
}

fn log_phase(phase: LoginPhase) {
    info!("login_phase={:?}", phase);
}

/// Bounded waits and pauses for the login flow. Defaults match the target
/// site's observed animation and validation latencies; tests shrink them.
#[derive(Debug, Clone)]
pub struct LoginTiming {
    /// Post-navigation settle budget.
    pub settle: Duration,
    pub post_navigation_pause: Duration,
    /// Pause after clicking a modal trigger before re-checking visibility.
    pub trigger_pause: Duration,
    /// Pause after force-revealing the modal.
    pub reveal_pause: Duration,
    /// Per-field visibility wait inside the modal.
    pub field_timeout: Duration,
    /// Total budget for the submit control to become enabled.
    pub submit_enable_budget: Duration,
    /// Pause between enablement polls (focus/Tab nudges).
    pub nudge_pause: Duration,
    /// Budget for each post-submit completion signal.
    pub resolve_timeout: Duration,
    /// Pause for redirects/animations after submission resolves.
    pub post_submit_pause: Duration,
    /// Pause between the overlay-dismissing Escape presses.
    pub escape_pause: Duration,
}

impl Default for LoginTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(10),
            post_navigation_pause: Duration::from_millis(500),
            trigger_pause: Duration::from_millis(300),
            reveal_pause: Duration::from_millis(250),
            field_timeout: Duration::from_secs(15),
            submit_enable_budget: Duration::from_secs(6),
            nudge_pause: Duration::from_millis(150),
            resolve_timeout: Duration::from_secs(8),
            post_submit_pause: Duration::from_secs(5),
            escape_pause: Duration::from_millis(400),
        }
    }
}

pub struct SessionManager {
    state: SessionState,
    timing: LoginTiming,
    /// Root for saved cookies and diagnostic screenshots.
    state_dir: PathBuf,
}

impl SessionManager {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self::with_timing(state_dir, LoginTiming::default())
    }

    pub fn with_timing(state_dir: impl Into<PathBuf>, timing: LoginTiming) -> Self {
        Self {
            state: SessionState::LoggedOut,
            timing,
            state_dir: state_dir.into(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Make sure the session is authenticated, logging in when needed.
    pub async fn ensure_logged_in(
        &mut self,
        driver: &dyn PageDriver,
        base_url: &str,
        selectors: &LoginSelectors,
        credentials: &Credentials,
    ) -> Result<(), LoginError> {
        driver.navigate(base_url).await.map_err(LoginError::Driver)?;
        tokio::time::sleep(self.timing.post_navigation_pause).await;
        driver.settle(self.timing.settle).await;

        if self.already_logged_in(driver, base_url, selectors).await {
            self.state = SessionState::LoggedIn;
            info!("session still authenticated");
            return Ok(());
        }

        info!("session expired — running login flow");
        self.state = SessionState::LoggingIn;
        match self.login_with_modal(driver, selectors, credentials).await {
            Ok(()) => {
                self.state = SessionState::LoggedIn;
                // Cookie reuse is a nicety; the loop never depends on it.
                self.persist_session_state(driver).await;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::LoginFailed;
                Err(e)
            }
        }
    }

    async fn already_logged_in(
        &self,
        driver: &dyn PageDriver,
        base_url: &str,
        selectors: &LoginSelectors,
    ) -> bool {
        let on_authed_path = match (driver.current_url().await, Url::parse(base_url)) {
            (Ok(current), Ok(base)) => Url::parse(&current)
                .map(|u| {
                    u.origin() == base.origin()
                        && u.path().starts_with(&selectors.authed_path_prefix)
                })
                .unwrap_or(false),
            _ => false,
        };
        on_authed_path || driver.is_visible(&selectors.post_login_sentinel).await
    }

    async fn login_with_modal(
        &mut self,
        driver: &dyn PageDriver,
        selectors: &LoginSelectors,
        credentials: &Credentials,
    ) -> Result<(), LoginError> {
        let t = self.timing.clone();

        // ── SeekingModal ─────────────────────────────────────────────────
        log_phase(LoginPhase::SeekingModal);
        let mut modal_visible = driver.is_visible(&selectors.modal_root).await;

        if !modal_visible {
            for trigger in &selectors.triggers {
                if driver.is_visible(trigger).await {
                    let _ = driver.click(trigger).await;
                    tokio::time::sleep(t.trigger_pause).await;
                    modal_visible = driver.is_visible(&selectors.modal_root).await;
                    if modal_visible {
                        break;
                    }
                }
            }
        }

        if !modal_visible {
            let _ = driver.force_reveal(&selectors.modal_root).await;
            tokio::time::sleep(t.reveal_pause).await;
            modal_visible = driver.is_visible(&selectors.modal_root).await;
        }

        if !modal_visible {
            self.capture_diagnostic(driver).await;
            return Err(LoginError::ModalNotVisible);
        }

        // ── ModalVisible → FormFilled ────────────────────────────────────
        log_phase(LoginPhase::ModalVisible);
        driver.wait_visible(&selectors.form, t.field_timeout).await?;
        driver
            .wait_visible(&selectors.username, t.field_timeout)
            .await?;
        driver
            .wait_visible(&selectors.password, t.field_timeout)
            .await?;

        driver.fill(&selectors.username, &credentials.username).await?;
        driver.fill(&selectors.password, &credentials.password).await?;
        // Framework-bound validation only reacts to real input events.
        driver
            .flush_input_events(&[selectors.username.as_str(), selectors.password.as_str()])
            .await?;

        if let Some(age) = &selectors.age_checkbox {
            if driver.is_visible(age).await {
                let _ = driver.set_checked(age).await;
            }
        }
        log_phase(LoginPhase::FormFilled);

        // ── FormFilled → Submitted ───────────────────────────────────────
        // Poll for the submit control to enable, nudging focus/Tab between
        // polls to kick debounced validation.
        let deadline = Instant::now() + t.submit_enable_budget;
        let mut enabled = false;
        while Instant::now() < deadline {
            if driver.is_visible(&selectors.submit_within_form).await
                && driver.is_enabled(&selectors.submit_within_form).await
            {
                enabled = true;
                break;
            }
            let _ = driver.focus(&selectors.password).await;
            let _ = driver.press_key("Tab").await;
            tokio::time::sleep(t.nudge_pause).await;
        }

        if enabled {
            let _ = driver.click(&selectors.submit_within_form).await;
        } else {
            warn!("submit control never enabled — falling back to programmatic submit");
            driver.submit_form(&selectors.form).await?;
        }
        log_phase(LoginPhase::Submitted);

        // ── Submitted → Resolved ─────────────────────────────────────────
        // Accept whichever completion signal lands first; if neither does,
        // continue optimistically and let the error check decide.
        tokio::select! {
            _ = driver.wait_hidden(&selectors.modal_root, t.resolve_timeout) => {}
            _ = driver.wait_visible(&selectors.post_login_sentinel, t.resolve_timeout) => {}
        }

        tokio::time::sleep(t.post_submit_pause).await;
        for _ in 0..3 {
            let _ = driver.press_key("Escape").await;
            tokio::time::sleep(t.escape_pause).await;
        }

        log_phase(LoginPhase::Resolved);
        if driver.is_visible(&selectors.error_text).await {
            return Err(LoginError::LoginFailed);
        }
        Ok(())
    }

    async fn capture_diagnostic(&self, driver: &dyn PageDriver) {
        let shot = self.state_dir.join("debug").join(format!(
            "login-modal-not-visible-{}.png",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        match driver.screenshot(&shot).await {
            Ok(()) => warn!("saved diagnostic screenshot to {}", shot.display()),
            Err(e) => warn!("diagnostic screenshot failed: {}", e),
        }
    }

    async fn persist_session_state(&self, driver: &dyn PageDriver) {
        match driver.export_cookies().await {
            Ok(cookies) => {
                let path = self.session_state_path();
                if let Err(e) = write_json(&path, &cookies) {
                    warn!("failed to save session cookies to {}: {}", path.display(), e);
                } else {
                    info!("🍪 session cookies saved to {}", path.display());
                }
            }
            Err(e) => warn!("cookie export failed (non-fatal): {}", e),
        }
    }

    fn session_state_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
