use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ignore;

pub type CommentId = i64;

// matches "comment-1604370" and "div-comment-1604370"
static COMMENT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|-)comment-(\d+)$").expect("comment id pattern is valid")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("comment node has no element id")]
    MissingId,
    #[error("element id {0:?} has no numeric comment suffix")]
    MalformedId(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentNode {
    pub element_id: Option<String>,
    pub author: Option<String>,
}

pub trait CommentSource {
    fn comment_nodes(&self) -> Vec<CommentNode>;
}

impl CommentSource for [CommentNode] {
    fn comment_nodes(&self) -> Vec<CommentNode> {
        self.to_vec()
    }
}

impl CommentSource for Vec<CommentNode> {
    fn comment_nodes(&self) -> Vec<CommentNode> {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    id: CommentId,
    author: String,
    ignored: bool,
    is_new: bool,
}

impl Comment {
    pub fn id(&self) -> CommentId {
        self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

pub fn parse_comment_id(element_id: &str) -> Result<CommentId, ParseError> {
    let element_id = element_id.trim().trim_start_matches('#');
    if element_id.is_empty() {
        return Err(ParseError::MissingId);
    }
    COMMENT_ID_RE
        .captures(element_id)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<CommentId>().ok())
        .ok_or_else(|| ParseError::MalformedId(element_id.to_string()))
}

#[derive(Debug, Default)]
pub struct Registry {
    comments: Vec<Comment>,
    index: HashMap<CommentId, usize>,
}

impl Registry {
    pub fn parse(source: &(impl CommentSource + ?Sized)) -> Self {
        let mut registry = Self::default();
        for node in source.comment_nodes() {
            let id = match node
                .element_id
                .as_deref()
                .map_or(Err(ParseError::MissingId), parse_comment_id)
            {
                Ok(id) => id,
                Err(err) => {
                    log::debug!("comments: skipping node: {err}");
                    continue;
                }
            };
            let author = node.author.map(|a| a.trim().to_string()).unwrap_or_default();
            // a repeated id keeps its first position but takes the later node
            if let Some(existing) = registry.get_mut(id) {
                log::debug!("comments: duplicate comment {id}");
                existing.author = author;
                continue;
            }
            registry.index.insert(id, registry.comments.len());
            registry.comments.push(Comment {
                id,
                author,
                ignored: false,
                is_new: false,
            });
        }
        registry
    }

    pub fn get(&self, id: CommentId) -> Option<&Comment> {
        self.index.get(&id).map(|&idx| &self.comments[idx])
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter()
    }

    pub fn apply_read_state(&mut self, read: &[CommentId]) -> Vec<CommentId> {
        let read: HashSet<CommentId> = read.iter().copied().collect();
        let mut unread = Vec::new();
        for comment in &mut self.comments {
            comment.is_new = !read.contains(&comment.id);
            if comment.is_new {
                unread.push(comment.id);
            }
        }
        unread
    }

    pub fn apply_ignore_list(&mut self, ignored_users: &[String]) -> usize {
        let mut changed = 0;
        for comment in &mut self.comments {
            let ignored = ignore::is_ignored(&comment.author, ignored_users);
            if comment.ignored != ignored {
                comment.ignored = ignored;
                changed += 1;
            }
        }
        changed
    }

    fn get_mut(&mut self, id: CommentId) -> Option<&mut Comment> {
        let idx = *self.index.get(&id)?;
        self.comments.get_mut(idx)
    }
}
