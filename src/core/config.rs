//! Configuration surface.
//!
//! Two sources, loaded once at startup:
//! * Environment variables (a `.env` file is honoured via `dotenvy` in `main`)
//!   for credentials, cadence and transport settings.
//! * A JSON selector file describing *where* to click and read on the target
//!   site. The selector blob is treated as data: it is validated for presence
//!   and passed through to the driver-facing edges untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::core::types::Credentials;

pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_USERNAME: &str = "USERNAME";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_INTERVAL_MS: &str = "INTERVAL_MS";
pub const ENV_HEADLESS: &str = "HEADLESS";
pub const ENV_SELECTORS_PATH: &str = "SELECTORS_PATH";
pub const ENV_STATE_DIR: &str = "MATCHWATCH_STATE_DIR";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_TELEGRAM_CHAT_IDS: &str = "TELEGRAM_CHAT_IDS";
pub const ENV_TELEGRAM_API_BASE: &str = "TELEGRAM_API_BASE";

// ── Env helpers ──────────────────────────────────────────────────────────────

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_env(key: &str) -> Result<String> {
    env_string(key).ok_or_else(|| anyhow!("{} missing from environment / .env", key))
}

fn env_flag(key: &str) -> Option<bool> {
    let v = env_string(key)?.to_ascii_lowercase();
    Some(matches!(v.as_str(), "1" | "true" | "yes" | "on"))
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse().ok())
}

/// Split a comma-separated chat id list, dropping empty segments.
pub fn parse_chat_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

// ── Telegram ─────────────────────────────────────────────────────────────────

/// Telegram transport settings. The chat id list doubles as the allow-list
/// for inbound status queries.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_ids: Vec<String>,
    pub api_base: String,
}

impl TelegramConfig {
    fn from_env() -> Self {
        Self {
            bot_token: env_string(ENV_TELEGRAM_BOT_TOKEN),
            chat_ids: parse_chat_ids(&env_string(ENV_TELEGRAM_CHAT_IDS).unwrap_or_default()),
            api_base: env_string(ENV_TELEGRAM_API_BASE)
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
        }
    }
}

// ── Watcher config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub base_url: String,
    pub credentials: Credentials,
    pub interval: Duration,
    pub headless: bool,
    pub selectors_path: PathBuf,
    /// Root for durable state: known-contest store, saved session cookies,
    /// diagnostic screenshots.
    pub state_dir: PathBuf,
    pub telegram: TelegramConfig,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = required_env(ENV_BASE_URL)?;
        let credentials = Credentials {
            username: required_env(ENV_USERNAME)?,
            password: required_env(ENV_PASSWORD)?,
        };

        let interval = Duration::from_millis(env_u64(ENV_INTERVAL_MS).unwrap_or(10_000));
        let headless = env_flag(ENV_HEADLESS).unwrap_or(false);

        let selectors_path = env_string(ENV_SELECTORS_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config/selectors.json"));

        let state_dir = env_string(ENV_STATE_DIR)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".matchwatch")))
            .unwrap_or_else(|| PathBuf::from(".matchwatch"));

        Ok(Self {
            base_url,
            credentials,
            interval,
            headless,
            selectors_path,
            state_dir,
            telegram: TelegramConfig::from_env(),
        })
    }

    pub fn contests_path(&self) -> PathBuf {
        self.state_dir.join("contests.json")
    }
}

// ── Selector file ────────────────────────────────────────────────────────────

fn default_authed_path_prefix() -> String {
    "/sport".to_string()
}

fn default_match_type_sel() -> String {
    ".match-type div".to_string()
}

fn default_team_left_sel() -> String {
    ".team-name.team-left".to_string()
}

fn default_team_right_sel() -> String {
    ".team-name.team-right".to_string()
}

fn default_time_left_sel() -> String {
    ".time-left".to_string()
}

/// Selectors for the login-wall flow.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSelectors {
    /// Elements that open the login modal, tried in order.
    pub triggers: Vec<String>,
    pub modal_root: String,
    pub form: String,
    pub username: String,
    pub password: String,
    pub submit_within_form: String,
    pub error_text: String,
    /// Element that only exists once authenticated.
    pub post_login_sentinel: String,
    /// Optional age/consent checkbox inside the form.
    #[serde(default)]
    pub age_checkbox: Option<String>,
    /// URL path prefix of the authenticated area, same origin as the base URL.
    #[serde(default = "default_authed_path_prefix")]
    pub authed_path_prefix: String,
}

/// Selectors for reaching and reading the contest list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSelectors {
    pub lobby_url: String,
    pub lobby_container: String,
    pub game_card: String,
    pub play_icon: String,
    /// Iframe hosting the contest list, when the site embeds it.
    #[serde(default)]
    pub frame: Option<String>,
    pub match_list_container: String,
    #[serde(default = "default_match_type_sel")]
    pub match_type: String,
    #[serde(default = "default_team_left_sel")]
    pub team_left: String,
    #[serde(default = "default_team_right_sel")]
    pub team_right: String,
    #[serde(default = "default_time_left_sel")]
    pub time_left: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    pub login: LoginSelectors,
    pub game: GameSelectors,
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("selector \"{}\" is missing or empty", name));
    }
    Ok(())
}

impl SelectorConfig {
    /// Load and validate the selector file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read selector file {}: {}", path.display(), e))?;
        let config: SelectorConfig = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("failed to parse selector file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Presence check with the offending key named in the error.
    pub fn validate(&self) -> Result<()> {
        if self.login.triggers.is_empty() {
            return Err(anyhow!("selector list \"login.triggers\" is missing or empty"));
        }
        for (i, trigger) in self.login.triggers.iter().enumerate() {
            require(&format!("login.triggers[{}]", i), trigger)?;
        }
        require("login.modalRoot", &self.login.modal_root)?;
        require("login.form", &self.login.form)?;
        require("login.username", &self.login.username)?;
        require("login.password", &self.login.password)?;
        require("login.submitWithinForm", &self.login.submit_within_form)?;
        require("login.errorText", &self.login.error_text)?;
        require("login.postLoginSentinel", &self.login.post_login_sentinel)?;
        require("login.authedPathPrefix", &self.login.authed_path_prefix)?;

        require("game.lobbyUrl", &self.game.lobby_url)?;
        require("game.lobbyContainer", &self.game.lobby_container)?;
        require("game.gameCard", &self.game.game_card)?;
        require("game.playIcon", &self.game.play_icon)?;
        require("game.matchListContainer", &self.game.match_list_container)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_selectors() -> SelectorConfig {
        serde_json::from_value(serde_json::json!({
            "login": {
                "triggers": ["a.login-btn", "header .signin"],
                "modalRoot": "#login",
                "form": ".login-form",
                "username": "input[placeholder='Enter Username']",
                "password": "input[placeholder='Enter Password']",
                "submitWithinForm": "button[type='submit']",
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
        .unwrap()
    }

    #[test]
    fn test_selector_defaults_applied() {
        let config = sample_selectors();
        assert_eq!(config.login.authed_path_prefix, "/sport");
        assert_eq!(config.game.team_left, ".team-name.team-left");
        assert!(config.game.frame.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_names_offending_key() {
        let mut config = sample_selectors();
        config.login.modal_root = "  ".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("login.modalRoot"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_empty_trigger_list() {
        let mut config = sample_selectors();
        config.login.triggers.clear();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("login.triggers"));
    }

    #[test]
    fn test_parse_chat_ids_trims_and_drops_empties() {
        assert_eq!(
            parse_chat_ids(" 1001 ,, 1002,"),
            vec!["1001".to_string(), "1002".to_string()]
        );
        assert!(parse_chat_ids("").is_empty());
    }
}
