pub mod core;
pub mod features;
pub mod notify;
pub mod scraping;
pub mod watch;

// --- Primary exports ---
pub use core::config::{GameSelectors, LoginSelectors, SelectorConfig, TelegramConfig, WatchConfig};
pub use core::types::{Contest, Credentials, SessionState};
pub use features::detector::detect;
pub use features::login::{LoginError, LoginTiming, SessionManager};
pub use features::status::{format_report, StatusSnapshot, StatusTracker};
pub use features::store::{ContestStore, StoreError};
pub use notify::telegram::Notifier;
pub use scraping::browser_manager::{is_crash_error, BrowsingSession};
pub use scraping::collector::{collect, contest_id_from_href, open_contest_list, CollectError};
pub use scraping::driver::{CdpDriver, PageDriver};
pub use watch::Watcher;
