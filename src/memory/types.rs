//! Core memory type definitions.
//!
//! Defines [`MemoryType`] (the role a memory plays), [`MemoryDocument`] (the
//! stored record), [`MemoryPatch`] (a partial edit), [`MemoryFilters`] (the
//! conjunctive filters every listing and search accepts), and
//! [`memory_mapping`] (the index layout).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::dates;
use crate::store::mapping::{FieldMapping, IndexMapping};
use crate::store::query::Query;

/// What a memory is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Unprocessed user input awaiting enrichment.
    Raw,
    /// A distilled preference or fact.
    Insight,
    Project,
    /// A project task; `summary` carries its status.
    Task,
    Diary,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Archived,
}

impl MemoryType {
    pub const ALL: [MemoryType; 10] = [
        Self::Raw,
        Self::Insight,
        Self::Project,
        Self::Task,
        Self::Diary,
        Self::Weekly,
        Self::Monthly,
        Self::Quarterly,
        Self::Yearly,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Insight => "insight",
            Self::Project => "project",
            Self::Task => "task",
            Self::Diary => "diary",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown memory type: {s}"))
    }
}

/// A memory record as stored in the index.
///
/// `id` is never written into the document body; it is filled in from the
/// store on reads. Optional fields are omitted when unset, so a stored body
/// decodes and re-encodes to the same JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDocument {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub content: String,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: Vec<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short preview; for tasks this is the task status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(with = "dates::serde_timestamp")]
    pub created_at: DateTime<FixedOffset>,
    #[serde(with = "dates::serde_timestamp")]
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub processed: bool,
}

impl MemoryDocument {
    /// A new, unprocessed memory stamped with the current time in UTC.
    pub fn new(content: impl Into<String>, memory_type: MemoryType, user_id: impl Into<String>) -> Self {
        let now = dates::now(dates::utc());
        Self {
            id: None,
            content: content.into(),
            memory_type,
            tags: Vec::new(),
            user_id: user_id.into(),
            title: None,
            summary: None,
            parent_id: None,
            related_ids: Vec::new(),
            embedding: None,
            created_at: now,
            updated_at: now,
            processed: false,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set both timestamps.
    pub fn with_created_at(mut self, ts: DateTime<FixedOffset>) -> Self {
        self.created_at = ts;
        self.updated_at = ts;
        self
    }

    /// Drop the vector, as every default read and search projection does.
    pub fn without_embedding(mut self) -> Self {
        self.embedding = None;
        self
    }
}

/// A partial edit of a memory. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub parent_id: Option<String>,
    pub related_ids: Option<Vec<String>>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `doc`. Returns `true` when the content changed.
    pub fn apply(self, doc: &mut MemoryDocument) -> bool {
        let mut content_changed = false;
        if let Some(content) = self.content {
            content_changed = content != doc.content;
            doc.content = content;
        }
        if self.title.is_some() {
            doc.title = self.title;
        }
        if self.summary.is_some() {
            doc.summary = self.summary;
        }
        if let Some(tags) = self.tags {
            doc.tags = tags;
        }
        if self.parent_id.is_some() {
            doc.parent_id = self.parent_id;
        }
        if let Some(related_ids) = self.related_ids {
            doc.related_ids = related_ids;
        }
        content_changed
    }
}

/// Layout of the memory index. `dims` is the embedding model's dimension.
pub fn memory_mapping(dims: usize) -> IndexMapping {
    IndexMapping::new()
        .field("title", FieldMapping::Text)
        .field("summary", FieldMapping::Text)
        .field("content", FieldMapping::Text)
        .field("tags", FieldMapping::Keyword)
        .field("memory_type", FieldMapping::Keyword)
        .field("created_at", FieldMapping::Date)
        .field("updated_at", FieldMapping::Date)
        .field("user_id", FieldMapping::Keyword)
        .field("parent_id", FieldMapping::Keyword)
        .field("related_ids", FieldMapping::Keyword)
        .field("processed", FieldMapping::Boolean)
        .field("embedding", FieldMapping::dense_vector(dims))
}

/// Conjunctive filters. Unset fields do not constrain; `tags` matches any-of.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilters {
    pub user_id: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub parent_id: Option<String>,
    pub tags: Vec<String>,
}

impl MemoryFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none()
            && self.memory_type.is_none()
            && self.parent_id.is_none()
            && self.tags.is_empty()
    }

    /// One exact-match clause per set filter.
    pub fn clauses(&self) -> Vec<Query> {
        let mut clauses = Vec::new();
        if let Some(user_id) = &self.user_id {
            clauses.push(Query::term("user_id", user_id.as_str()));
        }
        if let Some(memory_type) = self.memory_type {
            clauses.push(Query::term("memory_type", memory_type.as_str()));
        }
        if let Some(parent_id) = &self.parent_id {
            clauses.push(Query::term("parent_id", parent_id.as_str()));
        }
        if !self.tags.is_empty() {
            clauses.push(Query::terms("tags", self.tags.iter().map(String::as_str)));
        }
        clauses
    }
}
