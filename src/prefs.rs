use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::Store;

pub const DEFAULT_POST_HISTORY_DAYS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_post_history")]
    pub post_history: u32,
    #[serde(default)]
    pub ignored_users: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            post_history: DEFAULT_POST_HISTORY_DAYS,
            ignored_users: Vec::new(),
        }
    }
}

fn default_post_history() -> u32 {
    DEFAULT_POST_HISTORY_DAYS
}

impl Preferences {
    pub fn with_post_history(days: u32) -> Self {
        Self {
            post_history: days.max(1),
            ..Self::default()
        }
    }

    pub fn is_listed(&self, user: &str) -> bool {
        self.position(user).is_some()
    }

    fn position(&self, user: &str) -> Option<usize> {
        let user = user.to_lowercase();
        self.ignored_users
            .iter()
            .position(|entry| entry.to_lowercase() == user)
    }
}

#[derive(Clone)]
pub struct PreferenceManager {
    store: Arc<Store>,
}

impl PreferenceManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Preferences {
        self.store.preferences()
    }

    pub fn ignored_users(&self) -> Vec<String> {
        self.get().ignored_users
    }

    pub fn post_history_days(&self) -> u32 {
        self.get().post_history
    }

    pub fn ignore_user(&self, user: &str) -> bool {
        let user = user.trim();
        let mut prefs = self.get();
        if user.is_empty() || prefs.is_listed(user) {
            return false;
        }
        prefs.ignored_users.push(user.to_string());
        self.store.store_preferences(&prefs);
        true
    }

    pub fn unignore_user(&self, user: &str) -> bool {
        let mut prefs = self.get();
        let Some(idx) = prefs.position(user.trim()) else {
            return false;
        };
        prefs.ignored_users.remove(idx);
        self.store.store_preferences(&prefs);
        true
    }

    /// Zero leaves the current value in place.
    pub fn set_post_history_days(&self, days: u32) -> u32 {
        let mut prefs = self.get();
        if days > 0 && days != prefs.post_history {
            prefs.post_history = days;
            self.store.store_preferences(&prefs);
        }
        prefs.post_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryArea;
    use crate::store::StoreOptions;

    fn manager() -> PreferenceManager {
        let store = Store::open(
            Arc::new(MemoryArea::default()),
            Arc::new(ManualClock::new()),
            StoreOptions::default(),
        );
        PreferenceManager::new(Arc::new(store))
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let prefs = Preferences {
            post_history: 5,
            ignored_users: vec!["Bob".into()],
        };
        let json = serde_json::to_string(&prefs).unwrap();
        assert_eq!(json, r#"{"postHistory":5,"ignoredUsers":["Bob"]}"#);
        let parsed: Preferences = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, Preferences::default());
    }

    #[test]
    fn ignore_list_is_case_insensitive() {
        let prefs = manager();
        assert!(prefs.ignore_user("TrollKing"));
        assert!(!prefs.ignore_user("trollking"));
        assert_eq!(prefs.ignored_users(), vec!["TrollKing".to_string()]);

        assert!(prefs.unignore_user("TROLLKING"));
        assert!(!prefs.unignore_user("TrollKing"));
        assert!(prefs.ignored_users().is_empty());
    }

    #[test]
    fn history_days_ignore_zero() {
        let prefs = manager();
        assert_eq!(prefs.post_history_days(), DEFAULT_POST_HISTORY_DAYS);
        assert_eq!(prefs.set_post_history_days(0), DEFAULT_POST_HISTORY_DAYS);
        assert_eq!(prefs.set_post_history_days(14), 14);
        assert_eq!(prefs.post_history_days(), 14);
    }
}
