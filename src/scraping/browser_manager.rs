//! Browser process management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable Chromium-family executable (env override → PATH scan →
//!   OS-specific well-known paths).
//! * [`BrowsingSession`] — one browser process + CDP handler task + page,
//!   exclusively owned by the watch loop and replaced wholesale after a
//!   crash-classified fault.
//! * Crash classification: deciding whether a failure message means the
//!   underlying session died (respawn) or was an ordinary scrape hiccup
//!   (retry on the same session next tick).

use std::path::Path;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::scraping::driver::CdpDriver;

const VIEWPORT_WIDTH: u32 = 1300;
const VIEWPORT_HEIGHT: u32 = 850;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` sized for the target site's desktop layout.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag; the rest keep the browser quiet in
/// long-running and containerised environments.
fn build_browser_config(exe: &str, headless: bool) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-background-networking")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled");

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

// ── Crash classification ─────────────────────────────────────────────────────

/// Failure-message fragments that mean the browsing session itself is gone,
/// as opposed to an ordinary navigation/timeout failure.
const CRASH_INDICATORS: &[&str] = &[
    "Page crashed",
    "Target crashed",
    "Target closed",
    "browser has been closed",
    "Browser closed",
    "channel closed",
    "connection closed",
    "CRASHED",
];

pub fn message_indicates_crash(message: &str) -> bool {
    CRASH_INDICATORS.iter().any(|p| message.contains(p))
}

/// Classify an iteration failure, looking through the whole error chain.
pub fn is_crash_error(err: &anyhow::Error) -> bool {
    message_indicates_crash(&format!("{err:#}"))
}

// ── Browsing session ─────────────────────────────────────────────────────────

/// One live browser process with its CDP event pump and a single page.
///
/// The watch loop owns exactly one of these at a time. After a
/// crash-classified failure the old session is torn down best-effort and a
/// fresh one launched in its place.
pub struct BrowsingSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    driver: CdpDriver,
}

impl BrowsingSession {
    pub async fn launch(headless: bool) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "no Chromium-family browser found; install Chrome/Chromium or set CHROME_EXECUTABLE"
            )
        })?;

        info!("🚀 launching browser (headless={}, exe={})", headless, exe);
        let config = build_browser_config(&exe, headless)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("failed to open page: {}", e))?;

        Ok(Self {
            browser,
            handler_task,
            driver: CdpDriver::new(page),
        })
    }

    pub fn driver(&self) -> &CdpDriver {
        &self.driver
    }

    /// Best-effort teardown; errors are logged and swallowed.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_indicators_match() {
        assert!(message_indicates_crash("Page crashed during navigation"));
        assert!(message_indicates_crash(
            "CDP error: Target closed before response"
        ));
        assert!(message_indicates_crash("the browser has been closed"));
        assert!(message_indicates_crash("renderer: CRASHED"));
    }

    #[test]
    fn test_ordinary_failures_are_not_crashes() {
        assert!(!message_indicates_crash(
            "timed out after 15s waiting for \".match-list\" to become visible"
        ));
        assert!(!message_indicates_crash("login_failed"));
        assert!(!message_indicates_crash("navigation to https://x failed: 503"));
    }

    #[test]
    fn test_is_crash_error_sees_through_context_chain() {
        let root = anyhow::anyhow!("Target closed");
        let wrapped = root.context("collect step");
        assert!(is_crash_error(&wrapped));
    }
}
