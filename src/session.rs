use std::rc::Rc;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::animation::Scheduler;
use crate::clock::Clock;
use crate::comments::{CommentSource, Registry};
use crate::navigation::{NavStatus, Navigator, NavigatorConfig, Viewport};
use crate::prefs::PreferenceManager;
use crate::read_state::ReadState;
use crate::store::Store;

pub const DEFAULT_POST_URL_PATTERN: &str = r"^https?://(?:\w+\.)*housingbubble\.blog/\?p=(\d+)";

static DEFAULT_POST_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_POST_URL_PATTERN).expect("valid post url regex"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no post id in {0:?}")]
    MissingPostId(String),
}

pub fn post_id_from_url(url: &str, pattern: Option<&Regex>) -> Result<String, SessionError> {
    let pattern = pattern.unwrap_or(&*DEFAULT_POST_URL_RE);
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| SessionError::MissingPostId(url.to_string()))
}

pub fn comment_count_label(total: usize, read: usize) -> Option<String> {
    if total == 0 {
        return None;
    }
    let noun = if total > 1 { "Comments" } else { "Comment" };
    let new = total.saturating_sub(read);
    Some(format!("{total} {noun} ({new} New)"))
}

#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<Store>,
    pub scheduler: Scheduler,
    pub clock: Arc<dyn Clock>,
    pub navigation: NavigatorConfig,
}

pub struct ThreadSession {
    prefs: PreferenceManager,
    registry: Registry,
    navigator: Navigator,
}

impl ThreadSession {
    pub fn open(
        ctx: &SessionContext,
        post_id: &str,
        source: &(impl CommentSource + ?Sized),
        viewport: Rc<dyn Viewport>,
        anchor: Option<&str>,
    ) -> Result<Self, SessionError> {
        if post_id.is_empty() {
            return Err(SessionError::MissingPostId(post_id.to_string()));
        }

        let prefs = PreferenceManager::new(ctx.store.clone());
        let read_state = ReadState::load(ctx.store.clone(), post_id);

        let mut registry = Registry::parse(source);
        let unread = registry.apply_read_state(&read_state.read_comments());
        let ignored = registry.apply_ignore_list(&prefs.ignored_users());
        log::debug!(
            "session: post {post_id}: {} comments, {} unread, {ignored} ignored",
            registry.len(),
            unread.len()
        );

        let mut navigator = Navigator::new(
            unread,
            read_state,
            viewport,
            ctx.scheduler.clone(),
            ctx.clock.clone(),
            ctx.navigation.clone(),
        );
        navigator.start(anchor);
        Ok(Self {
            prefs,
            registry,
            navigator,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn status(&self) -> NavStatus {
        self.navigator.status()
    }

    /// Adds `author` to the ignore list, or removes them if already listed,
    /// then re-evaluates ignore flags. Unread state is left as it is.
    /// Returns true if the author is now ignored.
    pub fn toggle_ignore(&mut self, author: &str) -> bool {
        let now_ignored = if self.prefs.get().is_listed(author) {
            self.prefs.unignore_user(author);
            false
        } else {
            self.prefs.ignore_user(author)
        };
        self.refresh_ignored();
        now_ignored
    }

    pub fn refresh_ignored(&mut self) -> usize {
        self.registry
            .apply_ignore_list(&self.prefs.ignored_users())
    }
}
