//! Records shared by the stores, the collection manager and the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DmsError, DmsResult};

pub type UserId = u64;

pub const PRIVATE_COLOR: &str = "16a085";
pub const PUBLIC_COLOR: &str = "f1c40f";

/// Where a collection came from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    #[default]
    Generic,
    Folder,
    Project,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
        }
    }

    pub fn conventional_color(&self) -> &'static str {
        match self {
            Visibility::Private => PRIVATE_COLOR,
            Visibility::Public => PUBLIC_COLOR,
        }
    }
}

/// A named node of the collection forest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub owner: UserId,
    pub is_private: bool,
    pub parent_id: Option<Uuid>,
    pub depth: u32,
    pub position: i64,
    #[serde(default)]
    pub kind: CollectionType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Insertion order, breaks ties between siblings sharing a position.
    #[serde(default)]
    pub seq: u64,
}

impl Collection {
    pub fn new(name: String, owner: UserId, is_private: bool) -> Self {
        let now = Utc::now();
        let visibility = if is_private {
            Visibility::Private
        } else {
            Visibility::Public
        };
        Self {
            id: Uuid::new_v4(),
            name,
            color: visibility.conventional_color().to_string(),
            owner,
            is_private,
            parent_id: None,
            depth: 0,
            position: 0,
            kind: CollectionType::Generic,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            seq: 0,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn visibility(&self) -> Visibility {
        if self.is_private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Facet tag pushed to the index for documents in this collection.
    pub fn tag(&self) -> String {
        if self.is_private {
            format!("{}:{}", self.owner, self.id)
        } else {
            format!("0:{}", self.id)
        }
    }
}

/// Indexing state of a document.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Pending,
    Indexed,
    Error,
    UploadCompleted,
    Removing,
    NotIndexed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentDescriptor {
    pub id: Uuid,
    pub title: String,
    pub owner: UserId,
    pub institution: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub content: Option<String>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DocumentDescriptor {
    pub fn new(title: &str, owner: UserId, institution: &str, visibility: Visibility) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            owner,
            institution: institution.to_string(),
            visibility,
            content: None,
            status: DocumentStatus::UploadCompleted,
            deleted_at: None,
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Text sent to the index, the title when nothing was extracted.
    pub fn index_content(&self) -> &str {
        match &self.content {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.title,
        }
    }
}

/// Nested view of a collection and its live children.
#[derive(Clone, Debug, Serialize)]
pub struct CollectionNode {
    pub collection: Collection,
    pub children: Vec<CollectionNode>,
}

/// Trim and HTML-escape a collection name.
pub fn sanitize_name(raw: &str) -> DmsResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DmsError::invalid("collection name cannot be empty"));
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    Ok(out)
}
