use serde::{Deserialize, Serialize};

/// One contest entry discovered on the match list page.
///
/// Identity is by `id` alone — the remaining fields are display strings and
/// may be empty depending on how much of the card markup was present when the
/// list rendered. Two contests with equal `id` are the same contest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contest {
    pub id: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub match_type: String,
    #[serde(default)]
    pub team_left: String,
    #[serde(default)]
    pub team_right: String,
    #[serde(default)]
    pub time_left: String,
}

/// Login credentials for the target site. The password is never logged.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Ephemeral authentication state of the browsing session. Never persisted —
/// the next iteration re-derives it from the live page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
    LoginFailed,
}
