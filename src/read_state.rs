use std::sync::Arc;

use crate::comments::CommentId;
use crate::store::Store;

/// Read comments of one post: a durable snapshot taken when the page was
/// opened plus whatever has been read since.
///
/// The durable part is never re-read during the session, so a save can not race
/// a reload and drop ids that were already stored.
pub struct ReadState {
    store: Arc<Store>,
    post_id: String,
    durable: Vec<CommentId>,
    session: Vec<CommentId>,
}

impl ReadState {
    pub fn load(store: Arc<Store>, post_id: impl Into<String>) -> Self {
        let post_id = post_id.into();
        let durable = store.read_comments(&post_id);
        Self {
            store,
            post_id,
            durable,
            session: Vec::new(),
        }
    }

    pub fn durable(&self) -> &[CommentId] {
        &self.durable
    }

    pub fn session(&self) -> &[CommentId] {
        &self.session
    }

    pub fn read_comments(&self) -> Vec<CommentId> {
        let mut ids = Vec::with_capacity(self.durable.len() + self.session.len());
        ids.extend_from_slice(&self.durable);
        ids.extend_from_slice(&self.session);
        ids
    }

    pub fn set_read_comments(&mut self, ids: Vec<CommentId>) {
        self.session = ids;
        self.store
            .store_read_comments(&self.post_id, &self.read_comments());
    }
}
