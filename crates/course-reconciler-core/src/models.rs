//! Core data models shared by every reconciliation component.
//!
//! A course outline is a three-level tree. All three levels use the same
//! [`ContentNode`] shape; the level is carried by the [`NodeBody`] variant,
//! so matching and rebuilding are written once over the shared shape.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tree level of a [`ContentNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Lesson,
    Unit,
}

impl NodeKind {
    /// The kind a node of this kind may own, if any.
    pub fn child_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Module => Some(NodeKind::Lesson),
            NodeKind::Lesson => Some(NodeKind::Unit),
            NodeKind::Unit => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Module => "module",
            NodeKind::Lesson => "lesson",
            NodeKind::Unit => "unit",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific mutable fields of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Module {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    Lesson {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
    },
    Unit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<u32>,
    },
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Module { .. } => NodeKind::Module,
            NodeBody::Lesson { .. } => NodeKind::Lesson,
            NodeBody::Unit { .. } => NodeKind::Unit,
        }
    }

    /// Empty body for a kind.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Module => NodeBody::Module {
                description: None,
                image_url: None,
            },
            NodeKind::Lesson => NodeBody::Lesson {
                description: None,
                video_url: None,
            },
            NodeKind::Unit => NodeBody::Unit {
                content: None,
                video_url: None,
                file_url: None,
                duration_minutes: None,
            },
        }
    }

    /// Description text for containers; units have none.
    pub fn description(&self) -> Option<&str> {
        match self {
            NodeBody::Module { description, .. } | NodeBody::Lesson { description, .. } => {
                description.as_deref()
            }
            NodeBody::Unit { .. } => None,
        }
    }
}

/// A module, lesson or unit.
///
/// `id` is `None` for nodes the editor created and that have never been
/// persisted. `sort_position` on a submitted node is informational only;
/// writers always assign the node's index within its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub sort_position: i64,
    #[serde(flatten)]
    pub body: NodeBody,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(body: NodeBody, title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            sort_position: 0,
            body,
            children: Vec::new(),
        }
    }

    pub fn module(title: impl Into<String>) -> Self {
        Self::new(NodeBody::empty(NodeKind::Module), title)
    }

    pub fn lesson(title: impl Into<String>) -> Self {
        Self::new(NodeBody::empty(NodeKind::Lesson), title)
    }

    pub fn unit(title: impl Into<String>) -> Self {
        Self::new(NodeBody::empty(NodeKind::Unit), title)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_children(mut self, children: Vec<ContentNode>) -> Self {
        self.children = children;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    /// Title used for matching: trimmed and lowercased.
    pub fn match_key(&self) -> String {
        normalize_title(&self.title)
    }

    /// Write payload for this node at the given sibling index.
    pub fn draft(&self, sort_position: i64) -> NodeDraft {
        NodeDraft {
            title: self.title.clone(),
            sort_position,
            body: self.body.clone(),
        }
    }

    /// True when a write of `draft` would not change this node.
    pub fn matches_draft(&self, draft: &NodeDraft) -> bool {
        self.title == draft.title
            && self.sort_position == draft.sort_position
            && self.body == draft.body
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ContentNode::subtree_len).sum::<usize>()
    }
}

/// Trim and lowercase a title for case-insensitive comparison.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Payload for creating or updating a single node (children excluded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub title: String,
    pub sort_position: i64,
    pub body: NodeBody,
}

impl NodeDraft {
    pub fn kind(&self) -> NodeKind {
        self.body.kind()
    }
}

/// Course-level fields edited alongside the outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMetadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: String,
    pub metadata: CourseMetadata,
    pub updated_at: DateTime<Utc>,
}

/// `(module title, lesson title, unit title)` locating a unit in its course.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TitlePath {
    pub module: String,
    pub lesson: String,
    pub unit: String,
}

impl TitlePath {
    pub fn new(module: &str, lesson: &str, unit: &str) -> Self {
        Self {
            module: module.to_string(),
            lesson: lesson.to_string(),
            unit: unit.to_string(),
        }
    }
}

impl fmt::Display for TitlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {} : {}", self.module, self.lesson, self.unit)
    }
}

/// A quiz-to-unit reference owned by the quiz subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub unit_id: String,
    pub title: String,
    #[serde(default)]
    pub deleted: bool,
}

/// How submitted content replaces persisted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Delete the whole subtree and insert the submission fresh.
    Destructive,
    /// Match, patch in place, create the delta, soft-preserve the rest.
    Incremental,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Destructive => f.write_str("destructive"),
            Strategy::Incremental => f.write_str("incremental"),
        }
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "destructive" => Ok(Strategy::Destructive),
            "incremental" => Ok(Strategy::Incremental),
            other => bail!(
                "Unknown strategy: '{}'. Must be destructive or incremental.",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_json_shape() {
        let json = r#"{
            "title": "Intro",
            "kind": "module",
            "description": "Start here",
            "children": [
                { "title": "Basics", "kind": "lesson",
                  "children": [ { "id": "u-1", "title": "Hello", "kind": "unit", "duration_minutes": 5 } ] }
            ]
        }"#;
        let node: ContentNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind(), NodeKind::Module);
        assert_eq!(node.body.description(), Some("Start here"));
        let unit = &node.children[0].children[0];
        assert_eq!(unit.id.as_deref(), Some("u-1"));
        assert_eq!(
            unit.body,
            NodeBody::Unit {
                content: None,
                video_url: None,
                file_url: None,
                duration_minutes: Some(5),
            }
        );
        assert_eq!(node.subtree_len(), 3);
    }

    #[test]
    fn test_match_key_trims_and_lowercases() {
        assert_eq!(ContentNode::unit("  Hello World ").match_key(), "hello world");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Destructive".parse::<Strategy>().unwrap(), Strategy::Destructive);
        assert_eq!("incremental".parse::<Strategy>().unwrap(), Strategy::Incremental);
        assert!("merge".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_title_path_display() {
        let p = TitlePath::new("M", "L", "U1");
        assert_eq!(p.to_string(), "M : L : U1");
    }
}
