//! Abstract page-automation capability and its CDP implementation.
//!
//! The login state machine and the collector depend only on [`PageDriver`] —
//! navigate, visibility, fill, click, wait. Site-framework quirks (forced
//! modal reveal, synthetic input events to wake framework-bound validation)
//! are expressed as trait capabilities so callers stay free of DOM specifics,
//! and so tests can drive the full flow with a scripted fake.
//!
//! [`CdpDriver`] is the production implementation over a live
//! `chromiumoxide::Page`. DOM probes run as evaluated scripts; key presses go
//! through `Input.dispatchKeyEvent` so the page sees trusted events.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use tracing::info;

/// Cadence for visibility polling.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Best-effort wait for the page network to go quiet. Never fails.
    async fn settle(&self, timeout: Duration);

    async fn current_url(&self) -> Result<String>;

    /// Visibility probe; probe failures read as "not visible".
    async fn is_visible(&self, selector: &str) -> bool;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn is_enabled(&self, selector: &str) -> bool;

    async fn focus(&self, selector: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Tick a checkbox-like element, firing its change event.
    async fn set_checked(&self, selector: &str) -> Result<()>;

    /// Last-resort reveal of an element the page keeps hidden, via a direct
    /// display/class override.
    async fn force_reveal(&self, selector: &str) -> Result<()>;

    /// Dispatch synthetic input/change/blur events so framework-bound
    /// validation notices programmatic fills.
    async fn flush_input_events(&self, selectors: &[&str]) -> Result<()>;

    /// Programmatic form submission fallback.
    async fn submit_form(&self, selector: &str) -> Result<()>;

    /// Run an extraction script and return its JSON result.
    async fn extract_json(&self, script: &str) -> Result<serde_json::Value>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Export the session cookie jar as JSON.
    async fn export_cookies(&self) -> Result<serde_json::Value>;

    /// Poll until `selector` is visible or `timeout` elapses.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.is_visible(selector).await {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(anyhow!(
                    "timed out after {:?} waiting for \"{}\" to become visible",
                    timeout,
                    selector
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until `selector` is hidden (or gone) or `timeout` elapses.
    async fn wait_hidden(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            if !self.is_visible(selector).await {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(anyhow!(
                    "timed out after {:?} waiting for \"{}\" to become hidden",
                    timeout,
                    selector
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

// ── CDP implementation ───────────────────────────────────────────────────────

pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Embed `s` as a JS string literal. JSON string encoding is valid JS.
    fn js_string(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
    }

    async fn eval_bool(&self, script: String) -> bool {
        self.page
            .evaluate(script)
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_bool())
            .unwrap_or(false)
    }

    /// Run a script that returns `true` when the target element existed.
    async fn eval_on_element(&self, script: String, selector: &str, action: &str) -> Result<()> {
        let found = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("{} \"{}\" failed: {}", action, selector, e))?
            .into_value::<serde_json::Value>()
            .ok()
            .and_then(|j| j.as_bool())
            .unwrap_or(false);
        if !found {
            return Err(anyhow!("{}: no element matches \"{}\"", action, selector));
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("navigation to {} failed: {}", url, e))?;
        Ok(())
    }

    async fn settle(&self, timeout: Duration) {
        // Playwright-style networkidle heuristic: poll the resource entry
        // count until it stops growing while the document is complete.
        let quiet = Duration::from_millis(1_000);
        let start = Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = Instant::now();

        loop {
            if start.elapsed() >= timeout {
                return;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready || count != last_count {
                last_count = count;
                stable_since = Instant::now();
            } else if stable_since.elapsed() >= quiet {
                info!(
                    "page settled after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                return;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| anyhow!("failed to read page url: {}", e))?
            .ok_or_else(|| anyhow!("page reports no url"))
    }

    async fn is_visible(&self, selector: &str) -> bool {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                if (!style || style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
                const rect = el.getBoundingClientRect();
                return !!rect && rect.width >= 2 && rect.height >= 2;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_bool(script).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_on_element(script, selector, "click").await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                el.value = {val};
                return true;
            }})()"#,
            sel = Self::js_string(selector),
            val = Self::js_string(value)
        );
        self.eval_on_element(script, selector, "fill").await
    }

    async fn is_enabled(&self, selector: &str) -> bool {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return !!el && !el.disabled;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_bool(script).await
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                return true;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_on_element(script, selector, "focus").await
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::input::{
            DispatchKeyEventParams, DispatchKeyEventType,
        };

        let down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .build()
            .map_err(|e| anyhow!("key event build failed: {}", e))?;
        self.page
            .execute(down)
            .await
            .map_err(|e| anyhow!("keydown \"{}\" failed: {}", key, e))?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .build()
            .map_err(|e| anyhow!("key event build failed: {}", e))?;
        self.page
            .execute(up)
            .await
            .map_err(|e| anyhow!("keyup \"{}\" failed: {}", key, e))?;
        Ok(())
    }

    async fn set_checked(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                if (!el.checked) {{
                    el.checked = true;
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                }}
                return true;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_on_element(script, selector, "check").await
    }

    async fn force_reveal(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.style.display = 'block';
                el.classList.add('show');
                el.setAttribute('aria-modal', 'true');
                el.removeAttribute('aria-hidden');
                return true;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_on_element(script, selector, "force-reveal").await
    }

    async fn flush_input_events(&self, selectors: &[&str]) -> Result<()> {
        let sels = serde_json::to_string(selectors)
            .map_err(|e| anyhow!("selector list serialization failed: {}", e))?;
        let script = format!(
            r#"(() => {{
                const dispatch = el => {{
                    if (!el) return;
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('blur', {{ bubbles: true }}));
                }};
                for (const s of {sels}) dispatch(document.querySelector(s));
                return true;
            }})()"#,
            sels = sels
        );
        self.page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("input event dispatch failed: {}", e))?;
        Ok(())
    }

    async fn submit_form(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                if (typeof el.requestSubmit === 'function') el.requestSubmit();
                else el.submit();
                return true;
            }})()"#,
            sel = Self::js_string(selector)
        );
        self.eval_on_element(script, selector, "submit").await
    }

    async fn extract_json(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script.to_string())
            .await
            .map_err(|e| anyhow!("extraction script failed: {}", e))?
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow!("extraction result was not JSON: {}", e))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        use chromiumoxide::page::ScreenshotParams;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow!("failed to create {}: {}", parent.display(), e))?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| anyhow!("screenshot to {} failed: {}", path.display(), e))?;
        Ok(())
    }

    async fn export_cookies(&self) -> Result<serde_json::Value> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| anyhow!("cookie export failed: {}", e))?;
        serde_json::to_value(cookies).map_err(|e| anyhow!("cookie serialization failed: {}", e))
    }
}
