#![allow(dead_code)] // each integration test binary uses a subset of the mock

//! Scripted in-memory [`PageDriver`] used by the flow tests.
//!
//! Visibility is a mutable set of selectors; clicks can be scripted to show
//! or hide other selectors, which is enough to walk the login machine through
//! its phases without a browser. Every call is recorded for assertions.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use matchwatch::PageDriver;

#[derive(Default)]
pub struct MockState {
    pub visible: HashSet<String>,
    pub enabled: HashSet<String>,
    pub url: String,
    pub calls: Vec<String>,
    pub screenshots: Vec<PathBuf>,
    /// selector clicked → selectors to show.
    pub click_shows: HashMap<String, Vec<String>>,
    /// selector clicked → selectors to hide.
    pub click_hides: HashMap<String, Vec<String>>,
    /// Payload returned by `extract_json`, popped front-first; the last entry
    /// repeats once the queue drains.
    pub extractions: Vec<serde_json::Value>,
    /// navigate target → URL the mock "lands on" (simulated redirect).
    pub redirects: HashMap<String, String>,
}

#[derive(Default)]
pub struct MockDriver {
    pub state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, selector: &str) {
        self.state.lock().unwrap().visible.insert(selector.to_string());
    }

    pub fn enable(&self, selector: &str) {
        self.state.lock().unwrap().enabled.insert(selector.to_string());
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn on_click_show(&self, clicked: &str, shown: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .click_shows
            .insert(clicked.to_string(), shown.iter().map(|s| s.to_string()).collect());
    }

    pub fn on_click_hide(&self, clicked: &str, hidden: &[&str]) {
        self.state
            .lock()
            .unwrap()
            .click_hides
            .insert(clicked.to_string(), hidden.iter().map(|s| s.to_string()).collect());
    }

    pub fn push_extraction(&self, value: serde_json::Value) {
        self.state.lock().unwrap().extractions.push(value);
    }

    pub fn on_navigate_redirect(&self, from: &str, to: &str) {
        self.state
            .lock()
            .unwrap()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate:{url}"));
        let mut state = self.state.lock().unwrap();
        state.url = state
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn settle(&self, _timeout: Duration) {}

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn is_visible(&self, selector: &str) -> bool {
        self.state.lock().unwrap().visible.contains(selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.record(format!("click:{selector}"));
        let mut state = self.state.lock().unwrap();
        if let Some(shown) = state.click_shows.get(selector).cloned() {
            state.visible.extend(shown);
        }
        if let Some(hidden) = state.click_hides.get(selector).cloned() {
            for sel in hidden {
                state.visible.remove(&sel);
            }
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.record(format!("fill:{selector}={value}"));
        Ok(())
    }

    async fn is_enabled(&self, selector: &str) -> bool {
        self.state.lock().unwrap().enabled.contains(selector)
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        self.record(format!("focus:{selector}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.record(format!("press:{key}"));
        Ok(())
    }

    async fn set_checked(&self, selector: &str) -> Result<()> {
        self.record(format!("check:{selector}"));
        Ok(())
    }

    async fn force_reveal(&self, selector: &str) -> Result<()> {
        self.record(format!("force_reveal:{selector}"));
        Ok(())
    }

    async fn flush_input_events(&self, selectors: &[&str]) -> Result<()> {
        self.record(format!("flush_input_events:{}", selectors.join(",")));
        Ok(())
    }

    async fn submit_form(&self, selector: &str) -> Result<()> {
        self.record(format!("submit_form:{selector}"));
        Ok(())
    }

    async fn extract_json(&self, _script: &str) -> Result<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        if state.extractions.len() > 1 {
            Ok(state.extractions.remove(0))
        } else {
            Ok(state
                .extractions
                .first()
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.state.lock().unwrap().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn export_cookies(&self) -> Result<serde_json::Value> {
        Ok(serde_json::json!([
            { "name": "sid", "value": "mock", "domain": "example.test" }
        ]))
    }
}

/// Selector config used across the flow tests.
pub fn test_selectors() -> matchwatch::SelectorConfig {
    serde_json::from_value(serde_json::json!({
        "login": {
            "triggers": ["a.login-btn"],
            "modalRoot": "#login",
            "form": ".login-form",
            "username": "input.user",
            "password": "input.pass",
            "submitWithinForm": "button.submit",
            "errorText": ".login-error",
            "postLoginSentinel": ".user-balance"
        },
        "game": {
            "lobbyUrl": "https://example.test/games",
            "lobbyContainer": ".lobby",
            "gameCard": ".game-card",
            "playIcon": ".game-card .play",
            "matchListContainer": ".match-list"
        }
    }))
    .expect("valid test selectors")
}

/// Login timing shrunk so a full modal walk runs in milliseconds.
pub fn fast_timing() -> matchwatch::LoginTiming {
    matchwatch::LoginTiming {
        settle: Duration::from_millis(1),
        post_navigation_pause: Duration::from_millis(1),
        trigger_pause: Duration::from_millis(1),
        reveal_pause: Duration::from_millis(1),
        field_timeout: Duration::from_millis(50),
        submit_enable_budget: Duration::from_millis(50),
        nudge_pause: Duration::from_millis(5),
        resolve_timeout: Duration::from_millis(50),
        post_submit_pause: Duration::from_millis(1),
        escape_pause: Duration::from_millis(1),
    }
}
