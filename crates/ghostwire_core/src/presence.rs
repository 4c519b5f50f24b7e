//! Online player tracking.
//!
//! The tracker keeps the raw presence table (every account seen joining
//! without a matching leave) and the hidden set. The visible projection is
//! never stored; it is computed from the two on every read.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// One online account as seen by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub hidden: bool,
}

#[derive(Debug, Default)]
struct PresenceState {
    online: HashMap<String, DateTime<Utc>>,
    hidden: HashSet<String>,
}

/// Authoritative map of online game accounts and their join times.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    state: Arc<RwLock<PresenceState>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a join. A repeated join overwrites the join time.
    pub async fn join(&self, name: &str, at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        if state.online.insert(name.to_string(), at).is_some() {
            debug!("Re-entrant join for {}, join time reset", name);
        }
    }

    /// Records a leave and returns how long the account was online.
    /// Leaving while offline is a no-op and returns `None`.
    pub async fn leave(&self, name: &str, at: DateTime<Utc>) -> Option<Duration> {
        let mut state = self.state.write().await;
        state.online.remove(name).map(|joined_at| at - joined_at)
    }

    pub async fn join_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.state.read().await.online.get(name).copied()
    }

    pub async fn is_online(&self, name: &str) -> bool {
        self.state.read().await.online.contains_key(name)
    }

    pub async fn hide(&self, name: &str) {
        self.state.write().await.hidden.insert(name.to_string());
    }

    /// Removes `name` from the hidden set. Returns whether it was hidden.
    pub async fn unhide(&self, name: &str) -> bool {
        self.state.write().await.hidden.remove(name)
    }

    pub async fn is_hidden(&self, name: &str) -> bool {
        self.state.read().await.hidden.contains(name)
    }

    /// Online accounts minus hidden ones, sorted by name.
    pub async fn visible(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<_> = self
            .all()
            .await
            .into_iter()
            .filter(|entry| !entry.hidden)
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Every online account including hidden ones, sorted by name.
    pub async fn all(&self) -> Vec<PresenceEntry> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .online
            .iter()
            .map(|(name, joined_at)| PresenceEntry {
                name: name.clone(),
                joined_at: *joined_at,
                hidden: state.hidden.contains(name),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Whether the name of any hidden account appears anywhere in `line`.
    ///
    /// This is a plain substring match: a hidden account called `Al` also
    /// suppresses lines mentioning `Alice`.
    pub async fn hidden_mentioned_in(&self, line: &str) -> bool {
        let state = self.state.read().await;
        state
            .hidden
            .iter()
            .any(|name| !name.is_empty() && line.contains(name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_join_leave_cycle() {
        let tracker = PresenceTracker::new();
        tracker.join("Alice", t0()).await;
        assert!(tracker.is_online("Alice").await);

        let elapsed = tracker.leave("Alice", t0() + Duration::seconds(75)).await;
        assert_eq!(elapsed, Some(Duration::seconds(75)));
        assert!(!tracker.is_online("Alice").await);
    }

    #[tokio::test]
    async fn test_leave_while_offline_is_noop() {
        let tracker = PresenceTracker::new();
        assert_eq!(tracker.leave("Ghost", t0()).await, None);
        assert!(tracker.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_overwrites_join_time() {
        let tracker = PresenceTracker::new();
        tracker.join("Alice", t0()).await;
        tracker.join("Alice", t0() + Duration::seconds(5)).await;
        assert_eq!(
            tracker.join_time("Alice").await,
            Some(t0() + Duration::seconds(5))
        );
        assert_eq!(tracker.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_hidden_accounts_stay_in_raw_table() {
        let tracker = PresenceTracker::new();
        tracker.join("Alice", t0()).await;
        tracker.join("Bob", t0()).await;
        tracker.hide("Alice").await;

        let visible: Vec<_> = tracker.visible().await.into_iter().map(|e| e.name).collect();
        assert_eq!(visible, vec!["Bob".to_string()]);

        let all = tracker.all().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| e.name == "Alice" && e.hidden));

        assert!(tracker.unhide("Alice").await);
        assert!(!tracker.unhide("Alice").await);
        assert_eq!(tracker.visible().await.len(), 2);
    }

    #[tokio::test]
    async fn test_hidden_mentioned_in_is_substring_match() {
        let tracker = PresenceTracker::new();
        tracker.hide("Al").await;
        assert!(tracker.hidden_mentioned_in("2025 [CHAT] Alice: hi").await);
        assert!(!tracker.hidden_mentioned_in("2025 [CHAT] Bob: hi").await);
    }
}
