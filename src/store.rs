use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::codec;
use crate::comments::CommentId;
use crate::prefs::{Preferences, DEFAULT_POST_HISTORY_DAYS};
use crate::storage::{AreaChange, StorageArea};
use crate::throttle::Throttle;

pub const PREFS_KEY: &str = "prefs";
pub const POST_KEY_PREFIX: &str = "p_";

/// Lowest write throttle accepted; the backing area rejects faster writers.
pub const MIN_WRITE_THROTTLE: Duration = Duration::from_millis(1500);

const MS_IN_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub write_throttle: Duration,
    pub incognito: bool,
    pub default_post_history: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            write_throttle: Duration::from_millis(1500),
            incognito: false,
            default_post_history: DEFAULT_POST_HISTORY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(default)]
    pub read_comments: String,
    #[serde(default)]
    pub time: i64,
}

pub fn post_key(post_id: &str) -> String {
    format!("{POST_KEY_PREFIX}{post_id}")
}

type Batch = BTreeMap<String, String>;

struct State {
    prefs: Preferences,
    posts: BTreeMap<String, PostRecord>,
    writes: Throttle<Batch>,
    /// Change notifications still expected for our own writes.
    own_changes: usize,
}

pub struct Store {
    area: Arc<dyn StorageArea>,
    clock: Arc<dyn Clock>,
    opts: StoreOptions,
    changes: Receiver<AreaChange>,
    state: Mutex<State>,
}

impl Store {
    pub fn open(area: Arc<dyn StorageArea>, clock: Arc<dyn Clock>, opts: StoreOptions) -> Self {
        let changes = area.subscribe();
        if opts.write_throttle < MIN_WRITE_THROTTLE {
            warn!(
                "store: write throttle {:?} is below the storage rate limit, using {:?}",
                opts.write_throttle, MIN_WRITE_THROTTLE
            );
        }
        let opts = StoreOptions {
            write_throttle: opts.write_throttle.max(MIN_WRITE_THROTTLE),
            ..opts
        };
        let state = State {
            prefs: Preferences::with_post_history(opts.default_post_history),
            posts: BTreeMap::new(),
            writes: Throttle::new(opts.write_throttle),
            own_changes: 0,
        };
        let store = Self {
            area,
            clock,
            opts,
            changes,
            state: Mutex::new(state),
        };
        {
            let mut state = store.state.lock();
            store.load(&mut state);
        }
        store
    }

    pub fn preferences(&self) -> Preferences {
        self.sync();
        self.state.lock().prefs.clone()
    }

    pub fn read_comments(&self, post_id: &str) -> Vec<CommentId> {
        self.sync();
        let state = self.state.lock();
        let Some(record) = state.posts.get(&post_key(post_id)) else {
            return Vec::new();
        };
        codec::decode(&record.read_comments).unwrap_or_else(|err| {
            warn!("store: discarding unreadable read state for post {post_id}: {err}");
            Vec::new()
        })
    }

    pub fn store_preferences(&self, prefs: &Preferences) {
        let mut state = self.state.lock();
        state.prefs = prefs.clone();
        match serde_json::to_string(&state.prefs) {
            Ok(json) => self.queue(&mut state, PREFS_KEY.to_string(), json),
            Err(err) => warn!("store: failed to encode preferences: {err}"),
        }

        // a shorter history may have expired some posts
        self.expire(&mut state);
    }

    pub fn store_read_comments(&self, post_id: &str, ids: &[CommentId]) {
        if post_id.is_empty() {
            return;
        }
        let key = post_key(post_id);
        let record = PostRecord {
            read_comments: codec::encode(ids),
            time: self.clock.wall().timestamp_millis(),
        };

        let mut state = self.state.lock();
        if !self.opts.incognito {
            match serde_json::to_string(&record) {
                Ok(json) => self.queue(&mut state, key.clone(), json),
                Err(err) => warn!("store: failed to encode post {post_id}: {err}"),
            }
        }
        state.posts.insert(key, record);
    }

    pub fn clear_post_data(&self) {
        let mut state = self.state.lock();
        let keys: Vec<String> = std::mem::take(&mut state.posts).into_keys().collect();
        if let Some(pending) = state.writes.pending_mut() {
            pending.retain(|key, _| !key.starts_with(POST_KEY_PREFIX));
        }
        self.remove(&mut state, keys);
    }

    pub fn tick(&self) -> bool {
        self.sync();
        let mut state = self.state.lock();
        match state.writes.poll(self.clock.now()) {
            Some(batch) => self.write(&mut state, batch),
            None => false,
        }
    }

    /// Writes the pending batch without waiting for its window to close. Still
    /// refuses while the previous write is less than a throttle window old.
    pub fn flush(&self) -> bool {
        let mut state = self.state.lock();
        match state.writes.flush(self.clock.now()) {
            Some(batch) => self.write(&mut state, batch),
            None => false,
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        self.state.lock().writes.pending().is_some()
    }

    pub fn sync(&self) {
        if let Err(err) = self.area.poll_changes() {
            warn!("store: failed to poll for storage changes: {err:#}");
        }

        let mut state = self.state.lock();
        let mut external = false;
        for change in self.changes.try_iter() {
            if state.own_changes > 0 {
                state.own_changes -= 1;
                continue;
            }
            external = true;
        }

        if external {
            debug!("store: storage changed elsewhere, reloading");
            self.load(&mut state);
        }
    }

    fn load(&self, state: &mut State) {
        let items = self.area.get_all().unwrap_or_else(|err| {
            warn!("store: failed to read storage, treating as empty: {err:#}");
            Batch::new()
        });

        state.prefs = Preferences::with_post_history(self.opts.default_post_history);
        state.posts.clear();
        for (key, value) in &items {
            apply_item(state, key, value);
        }

        if let Some(pending) = state.writes.pending().cloned() {
            for (key, value) in &pending {
                apply_item(state, key, value);
            }
        }

        self.expire(state);
    }

    fn expire(&self, state: &mut State) {
        let days = state.prefs.post_history;
        if days == 0 {
            return;
        }
        let lifetime = i64::from(days) * MS_IN_DAY;
        let now = self.clock.wall().timestamp_millis();

        let expired: Vec<String> = state
            .posts
            .iter()
            .filter(|(_, record)| record.time != 0 && now - record.time > lifetime)
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return;
        }

        debug!("store: expiring {} posts older than {days} days", expired.len());
        for key in &expired {
            state.posts.remove(key);
        }
        if let Some(pending) = state.writes.pending_mut() {
            pending.retain(|key, _| !expired.contains(key));
        }
        self.remove(state, expired);
    }

    fn queue(&self, state: &mut State, key: String, value: String) {
        let batch = Batch::from([(key, value)]);
        state
            .writes
            .merge(self.clock.now(), batch, |pending, batch| pending.extend(batch));
    }

    fn write(&self, state: &mut State, batch: Batch) -> bool {
        if batch.is_empty() {
            return false;
        }
        let count = batch.len();
        match self.area.set(batch) {
            Ok(()) => {
                state.own_changes += 1;
                debug!("store: wrote {count} items");
                true
            }
            Err(err) => {
                warn!("store: dropping write of {count} items: {err:#}");
                false
            }
        }
    }

    fn remove(&self, state: &mut State, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        match self.area.remove(&keys) {
            Ok(()) => state.own_changes += 1,
            Err(err) => warn!("store: failed to remove {} items: {err:#}", keys.len()),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.flush() && self.has_pending_writes() {
            warn!("store: closing with unsaved changes inside the write window");
        }
    }
}

fn apply_item(state: &mut State, key: &str, value: &str) {
    if key == PREFS_KEY {
        match serde_json::from_str::<Preferences>(value) {
            Ok(prefs) => state.prefs = prefs,
            Err(err) => warn!("store: ignoring unreadable preferences: {err}"),
        }
    } else if key.starts_with(POST_KEY_PREFIX) {
        match serde_json::from_str::<PostRecord>(value) {
            Ok(record) => {
                state.posts.insert(key.to_string(), record);
            }
            Err(err) => warn!("store: ignoring unreadable record {key}: {err}"),
        }
    }
}
