//! Contest list navigation and extraction.
//!
//! Everything site-shaped lives here: the lobby click-through that reaches
//! the embedded contest list, and the anchor-extraction script built from the
//! selector config. The watch loop only sees `Vec<Contest>` or a
//! [`CollectError`]. Extraction is read-only and deterministic for a given
//! page state — durable state is the detector's business.

use std::time::{Duration, Instant};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::config::GameSelectors;
use crate::core::types::Contest;
use crate::scraping::driver::PageDriver;

const LOBBY_TIMEOUT: Duration = Duration::from_secs(15);
const CARD_TIMEOUT: Duration = Duration::from_secs(10);
const PLAY_TIMEOUT: Duration = Duration::from_secs(8);
const FRAME_TIMEOUT: Duration = Duration::from_secs(20);
const LIST_TIMEOUT: Duration = Duration::from_secs(15);
const RENDER_PAUSE: Duration = Duration::from_millis(400);
const LIST_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("selector \"{0}\" is missing or empty")]
    MissingSelector(&'static str),

    #[error("contest list container \"{0}\" did not become visible in time")]
    ContainerNotVisible(String),

    #[error("contest extraction returned malformed data: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

// ── Id extraction ────────────────────────────────────────────────────────────

fn contest_id_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"league/contests/(\d+)/contests").expect("valid contest id pattern")
    })
}

/// Extract the stable contest id from an anchor href.
///
/// Falls back to the raw href when the structured id is absent. Fallback ids
/// can collide or drift between runs; downstream treats equal ids as one
/// contest either way.
pub fn contest_id_from_href(href: &str) -> String {
    contest_id_pattern()
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| href.to_string())
}

// ── Lobby navigation ─────────────────────────────────────────────────────────

/// Click through the lobby to the contest list.
///
/// Bounded waits at every hop; the embedded frame (when configured) must be
/// attached before this returns, but the list inside it is the collector's
/// concern.
pub async fn open_contest_list(
    driver: &dyn PageDriver,
    game: &GameSelectors,
) -> Result<(), CollectError> {
    if game.lobby_url.trim().is_empty() {
        return Err(CollectError::MissingSelector("game.lobbyUrl"));
    }

    driver.navigate(&game.lobby_url).await?;
    driver.settle(Duration::from_secs(10)).await;

    driver.wait_visible(&game.lobby_container, LOBBY_TIMEOUT).await?;
    driver.wait_visible(&game.game_card, CARD_TIMEOUT).await?;
    driver.wait_visible(&game.play_icon, PLAY_TIMEOUT).await?;
    driver.click(&game.play_icon).await?;

    if let Some(frame) = frame_selector(game) {
        driver.wait_visible(frame, FRAME_TIMEOUT).await?;
    }

    tokio::time::sleep(RENDER_PAUSE).await;
    Ok(())
}

fn frame_selector(game: &GameSelectors) -> Option<&str> {
    game.frame
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Raw anchor data as produced by the extraction script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnchor {
    #[serde(default)]
    href: String,
    #[serde(default)]
    match_type: String,
    #[serde(default)]
    team_left: String,
    #[serde(default)]
    team_right: String,
    #[serde(default)]
    time_left: String,
}

/// Script returning `null` while the container is absent, else the anchor
/// array. When a frame is configured the lookup descends into its document —
/// same-origin embeds only, which is what the target site uses.
fn extraction_script(game: &GameSelectors) -> String {
    let frame = match frame_selector(game) {
        Some(f) => serde_json::to_string(f).unwrap_or_else(|_| "null".to_string()),
        None => "null".to_string(),
    };
    let quote = |s: &str| serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());

    format!(
        r#"(() => {{
            const frameSel = {frame};
            let root = document;
            if (frameSel) {{
                const frame = document.querySelector(frameSel);
                if (!frame || !frame.contentDocument) return null;
                root = frame.contentDocument;
            }}
            const container = root.querySelector({container});
            if (!container) return null;
            const anchors = Array.from(container.querySelectorAll('a'));
            const text = (scope, sel) => {{
                const el = scope.querySelector(sel);
                return el ? el.textContent.trim() : '';
            }};
            return anchors.map(a => ({{
                href: a.getAttribute('href') || '',
                matchType: text(a, {match_type}),
                teamLeft: text(a, {team_left}),
                teamRight: text(a, {team_right}),
                timeLeft: text(a, {time_left}),
            }}));
        }})()"#,
        frame = frame,
        container = quote(&game.match_list_container),
        match_type = quote(&game.match_type),
        team_left = quote(&game.team_left),
        team_right = quote(&game.team_right),
        time_left = quote(&game.time_left),
    )
}

fn anchor_to_contest(anchor: RawAnchor) -> Contest {
    Contest {
        id: contest_id_from_href(&anchor.href),
        href: anchor.href,
        match_type: anchor.match_type,
        team_left: anchor.team_left,
        team_right: anchor.team_right,
        time_left: anchor.time_left,
    }
}

/// Produce the current snapshot of listed contests.
pub async fn collect(
    driver: &dyn PageDriver,
    game: &GameSelectors,
) -> Result<Vec<Contest>, CollectError> {
    let container = game.match_list_container.trim();
    if container.is_empty() {
        return Err(CollectError::MissingSelector("game.matchListContainer"));
    }

    // When the list sits in the top document we can wait on visibility
    // directly; inside a frame the extraction script itself is the probe.
    if frame_selector(game).is_none() {
        driver
            .wait_visible(container, LIST_TIMEOUT)
            .await
            .map_err(|_| CollectError::ContainerNotVisible(container.to_string()))?;
        tokio::time::sleep(RENDER_PAUSE).await;
    }

    let script = extraction_script(game);
    let start = Instant::now();
    loop {
        let raw = driver.extract_json(&script).await?;
        if !raw.is_null() {
            let anchors: Vec<RawAnchor> =
                serde_json::from_value(raw).map_err(CollectError::Malformed)?;
            debug!("extraction found {} anchors", anchors.len());
            let contests: Vec<Contest> = anchors.into_iter().map(anchor_to_contest).collect();
            info!("scraped {} contests", contests.len());
            return Ok(contests);
        }
        if start.elapsed() >= LIST_TIMEOUT {
            return Err(CollectError::ContainerNotVisible(container.to_string()));
        }
        tokio::time::sleep(LIST_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_id_extracted_from_href() {
        assert_eq!(
            contest_id_from_href("https://play.example/league/contests/48213/contests"),
            "48213"
        );
        assert_eq!(contest_id_from_href("/league/contests/7/contests?tab=all"), "7");
    }

    #[test]
    fn test_missing_id_falls_back_to_raw_href() {
        assert_eq!(
            contest_id_from_href("/league/specials/today"),
            "/league/specials/today"
        );
        assert_eq!(contest_id_from_href(""), "");
    }

    #[test]
    fn test_anchor_mapping_uses_fallback_id() {
        let anchor: RawAnchor = serde_json::from_value(serde_json::json!({
            "href": "/somewhere/else",
            "matchType": "ODI",
            "teamLeft": "X",
            "teamRight": "Y",
            "timeLeft": "5m"
        }))
        .unwrap();
        let contest = anchor_to_contest(anchor);
        assert_eq!(contest.id, "/somewhere/else");
        assert_eq!(contest.match_type, "ODI");
    }

    #[test]
    fn test_extraction_script_embeds_selectors_safely() {
        let game: GameSelectors = serde_json::from_value(serde_json::json!({
            "lobbyUrl": "https://example.test/games",
            "lobbyContainer": ".lobby",
            "gameCard": ".card",
            "playIcon": ".card .play",
            "frame": "iframe[src*=\"embed\"]",
            "matchListContainer": ".match-list"
        }))
        .unwrap();
        let script = extraction_script(&game);
        assert!(script.contains(r#""iframe[src*=\"embed\"]""#));
        assert!(script.contains(r#"".match-list""#));
        assert!(script.contains(r#"".time-left""#));
    }
}
