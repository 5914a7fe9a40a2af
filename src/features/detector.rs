//! Snapshot diffing against the durable store.
//!
//! `detect` is the idempotent heart of the watcher: the same snapshot run
//! twice reports nothing new the second time, and the persisted set always
//! mirrors the latest snapshot (subject to the store's empty-overwrite
//! guard). Contests that vanish from the page age out of the known set, so a
//! listing that disappears and later reappears notifies again — intended
//! behavior for this domain.

use std::collections::HashSet;

use crate::core::types::Contest;
use crate::features::store::{ContestStore, StoreError};

/// Diff `snapshot` against the known set, persist the snapshot's ids, and
/// return the contests not seen before.
pub fn detect(snapshot: &[Contest], store: &ContestStore) -> Result<Vec<Contest>, StoreError> {
    let known = store.load();

    let fresh: Vec<Contest> = snapshot
        .iter()
        .filter(|c| !known.contains(&c.id))
        .cloned()
        .collect();

    let current: HashSet<String> = snapshot.iter().map(|c| c.id.clone()).collect();
    store.save(&current)?;

    Ok(fresh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_store() -> ContestStore {
        let dir = std::env::temp_dir().join(format!(
            "matchwatch-detector-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        ContestStore::new(dir.join("contests.json"))
    }

    fn contest(id: &str) -> Contest {
        Contest {
            id: id.to_string(),
            href: format!("/league/contests/{id}/contests"),
            match_type: "T20".into(),
            team_left: "AAA".into(),
            team_right: "BBB".into(),
            time_left: "2h".into(),
        }
    }

    #[test]
    fn test_first_run_reports_everything() {
        let store = temp_store();
        let snapshot = vec![contest("1"), contest("2")];
        let fresh = detect(&snapshot, &store).unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_idempotent_on_unchanged_snapshot() {
        let store = temp_store();
        let snapshot = vec![contest("1"), contest("2")];
        detect(&snapshot, &store).unwrap();

        let again = detect(&snapshot, &store).unwrap();
        assert!(again.is_empty());
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn test_new_items_are_exactly_snapshot_minus_known() {
        let store = temp_store();
        detect(&[contest("1"), contest("2")], &store).unwrap();

        let fresh = detect(&[contest("2"), contest("3"), contest("4")], &store).unwrap();
        let fresh_ids: Vec<&str> = fresh.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fresh_ids, vec!["3", "4"]);

        // Post-call known set is exactly the snapshot's ids — "1" aged out.
        let known = store.load();
        assert_eq!(known.len(), 3);
        assert!(!known.contains("1"));
    }

    #[test]
    fn test_reappearance_notifies_again() {
        let store = temp_store();
        let fresh = detect(&[contest("1")], &store).unwrap();
        assert_eq!(fresh.len(), 1);

        detect(&[contest("2")], &store).unwrap();

        let fresh = detect(&[contest("1"), contest("2")], &store).unwrap();
        let fresh_ids: Vec<&str> = fresh.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(fresh_ids, vec!["1"]);
    }

    #[test]
    fn test_colliding_fallback_ids_are_one_contest() {
        let store = temp_store();
        let mut a = contest("same-href");
        a.team_left = "AAA".into();
        let mut b = contest("same-href");
        b.team_left = "CCC".into();

        // Both entries surface on the first run (neither id is known yet)...
        let fresh = detect(&[a.clone(), b.clone()], &store).unwrap();
        assert_eq!(fresh.len(), 2);

        // ...but they collapse to a single known id, and neither is new again.
        assert_eq!(store.load().len(), 1);
        assert!(detect(&[a, b], &store).unwrap().is_empty());
    }
}
