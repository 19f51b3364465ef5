use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::comments::{parse_comment_id, CommentId, CommentNode, CommentSource};
use crate::navigation::Viewport;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotComment {
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub offset: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ThreadSnapshot {
    pub url: String,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub header_height: Option<f64>,
    #[serde(default)]
    pub scroll_y: Option<f64>,
    #[serde(default)]
    pub comments: Vec<SnapshotComment>,
    #[serde(skip)]
    position: Cell<f64>,
    #[serde(skip)]
    offsets: HashMap<CommentId, f64>,
}

impl ThreadSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        let mut snapshot: Self =
            serde_json::from_str(json).context("failed to parse thread snapshot")?;
        snapshot.index_layout();
        Ok(snapshot)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("invalid snapshot {}", path.display()))
    }

    fn index_layout(&mut self) {
        self.position.set(self.scroll_y.unwrap_or(0.0));
        self.offsets = self
            .comments
            .iter()
            .filter_map(|comment| {
                let id = parse_comment_id(comment.element_id.as_deref()?).ok()?;
                Some((id, comment.offset?))
            })
            .collect();
    }
}

impl CommentSource for ThreadSnapshot {
    fn comment_nodes(&self) -> Vec<CommentNode> {
        self.comments
            .iter()
            .map(|comment| CommentNode {
                element_id: comment.element_id.clone(),
                author: comment.author.clone(),
            })
            .collect()
    }
}

impl Viewport for ThreadSnapshot {
    fn scroll_y(&self) -> f64 {
        self.position.get()
    }

    fn scroll_to(&self, y: f64) {
        self.position.set(y);
    }

    fn comment_offset(&self, id: CommentId) -> Option<f64> {
        self.offsets.get(&id).copied()
    }

    fn header_height(&self) -> f64 {
        self.header_height.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r##"{
        "url": "https://example.blog/?p=12",
        "anchor": "#comment-2",
        "header_height": 60,
        "comments": [
            { "element_id": "comment-1", "author": "ann", "offset": 400 },
            { "element_id": "div-comment-2", "author": "bob", "offset": 900.5 },
            { "author": "no id" },
            { "element_id": "comment-3" }
        ]
    }"##;

    #[test]
    fn parses_nodes_and_layout() {
        let snapshot = ThreadSnapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(snapshot.comment_nodes().len(), 4);
        assert_eq!(snapshot.comment_offset(2), Some(900.5));
        assert_eq!(snapshot.comment_offset(3), None);
        assert_eq!(snapshot.header_height(), 60.0);
        assert_eq!(snapshot.scroll_y(), 0.0);

        snapshot.scroll_to(120.0);
        assert_eq!(snapshot.scroll_y(), 120.0);
    }

    #[test]
    fn minimal_snapshot() {
        let snapshot = ThreadSnapshot::from_json(r#"{"url": "x", "scroll_y": 30}"#).unwrap();
        assert!(snapshot.comment_nodes().is_empty());
        assert_eq!(snapshot.scroll_y(), 30.0);
        assert!(ThreadSnapshot::from_json("{}").is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread.json");
        fs::write(&path, "[1, 2]").unwrap();
        let err = ThreadSnapshot::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("thread.json"));
    }
}
