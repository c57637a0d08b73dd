//! In-memory article documents and their mutation surface.

use crate::frontmatter::{self, CategoryPath, FieldValue, FrontMatter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid value for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Not present: {0}")]
    NotFound(String),
}

/// Article identity: the stable source path of the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArticleId(pub String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The repository's owned document set, keyed by article identity.
pub type DocumentSet = std::collections::BTreeMap<ArticleId, ArticleDocument>;

/// Hex blake3 checksum of file text, used for save-time conflict detection.
pub fn content_checksum(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// One article held in memory: front matter plus raw Markdown body.
///
/// Every mutation flips the dirty flag and hands back the prior value so a
/// caller can maintain its own undo stack. Adds are idempotent; removals of
/// absent entries fail.
#[derive(Debug, Clone)]
pub struct ArticleDocument {
    id: ArticleId,
    front_matter: FrontMatter,
    body: String,
    dirty: bool,
    last_saved_checksum: Option<String>,
}

impl ArticleDocument {
    /// A document freshly parsed from file text; clean, checksum recorded.
    pub fn from_file_text(id: ArticleId, front_matter: FrontMatter, body: String, text: &str) -> Self {
        Self {
            id,
            front_matter,
            body,
            dirty: false,
            last_saved_checksum: Some(content_checksum(text)),
        }
    }

    /// A new article that has never been written to disk.
    pub fn new_draft(id: ArticleId, front_matter: FrontMatter) -> Self {
        Self {
            id,
            front_matter,
            body: String::new(),
            dirty: true,
            last_saved_checksum: None,
        }
    }

    pub fn id(&self) -> &ArticleId {
        &self.id
    }

    pub fn front_matter(&self) -> &FrontMatter {
        &self.front_matter
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_saved_checksum(&self) -> Option<&str> {
        self.last_saved_checksum.as_deref()
    }

    /// Full file text for this document.
    pub fn render(&self) -> String {
        frontmatter::serialize(&self.front_matter, &self.body)
    }

    pub(crate) fn mark_saved(&mut self, checksum: String) {
        self.last_saved_checksum = Some(checksum);
        self.dirty = false;
    }

    /// Set a field by name, validating known-field type rules. Returns the
    /// prior value. The document is left untouched on failure.
    pub fn set_field(
        &mut self,
        name: &str,
        value: FieldValue,
    ) -> Result<Option<FieldValue>, DocumentError> {
        let prior = self.front_matter.field_value(name);
        match name {
            "title" => {
                let title = value
                    .as_scalar()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| DocumentError::Validation {
                        field: name.to_string(),
                        reason: "title must be a non-empty string".to_string(),
                    })?;
                self.front_matter.set_title(title);
            }
            "date" => {
                let ts = scalar_timestamp(&value).ok_or_else(|| DocumentError::Validation {
                    field: name.to_string(),
                    reason: "date must be an ISO date or date-time".to_string(),
                })?;
                self.front_matter.set_date(ts);
            }
            "updated" => {
                let ts = scalar_timestamp(&value).ok_or_else(|| DocumentError::Validation {
                    field: name.to_string(),
                    reason: "updated must be an ISO date or date-time".to_string(),
                })?;
                self.front_matter.set_updated(ts);
            }
            "categories" => {
                let paths = frontmatter::category_paths(name, &value).map_err(|e| {
                    DocumentError::Validation {
                        field: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                self.front_matter.set_categories(paths);
            }
            "tags" => {
                let tags = frontmatter::tag_names(name, &value).map_err(|e| {
                    DocumentError::Validation {
                        field: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                self.front_matter.set_tags(tags);
            }
            _ => {
                self.front_matter.set_unknown(name, value);
            }
        }
        self.dirty = true;
        Ok(prior)
    }

    /// Replace the body. Returns the prior body.
    pub fn set_body(&mut self, text: String) -> String {
        self.dirty = true;
        std::mem::replace(&mut self.body, text)
    }

    /// Add a category path; a no-op when already present. Returns the prior
    /// category list.
    pub fn add_category(&mut self, path: CategoryPath) -> Vec<CategoryPath> {
        let prior = self.front_matter.categories().to_vec();
        if self.front_matter.add_category(path) {
            self.dirty = true;
        }
        prior
    }

    /// Remove a category path. Fails when absent.
    pub fn remove_category(&mut self, path: &CategoryPath) -> Result<Vec<CategoryPath>, DocumentError> {
        let prior = self.front_matter.categories().to_vec();
        if !self.front_matter.remove_category(path) {
            return Err(DocumentError::NotFound(format!("category '{}'", path)));
        }
        self.dirty = true;
        Ok(prior)
    }

    /// Add a tag; a no-op when already present. Returns the prior tag list.
    pub fn add_tag(&mut self, tag: &str) -> Vec<String> {
        let prior = self.front_matter.tags().to_vec();
        if self.front_matter.add_tag(tag) {
            self.dirty = true;
        }
        prior
    }

    /// Remove a tag. Fails when absent.
    pub fn remove_tag(&mut self, tag: &str) -> Result<Vec<String>, DocumentError> {
        let prior = self.front_matter.tags().to_vec();
        if !self.front_matter.remove_tag(tag) {
            return Err(DocumentError::NotFound(format!("tag '{}'", tag)));
        }
        self.dirty = true;
        Ok(prior)
    }

    /// Rewrite every category path starting with `old` to start with `new`
    /// instead. Returns true when anything changed.
    pub(crate) fn reprefix_categories(&mut self, old: &CategoryPath, new: &CategoryPath) -> bool {
        let current = self.front_matter.categories().to_vec();
        let rewritten: Vec<CategoryPath> = current
            .iter()
            .map(|p| p.reprefixed(old, new).unwrap_or_else(|| p.clone()))
            .collect();
        if rewritten == current {
            return false;
        }
        self.front_matter.set_categories(rewritten);
        self.dirty = true;
        true
    }

    /// Drop every category path starting with `prefix`. Returns true when
    /// anything changed.
    pub(crate) fn remove_categories_with_prefix(&mut self, prefix: &CategoryPath) -> bool {
        let current = self.front_matter.categories().to_vec();
        let kept: Vec<CategoryPath> = current
            .iter()
            .filter(|p| !p.starts_with(prefix))
            .cloned()
            .collect();
        if kept.len() == current.len() {
            return false;
        }
        self.front_matter.set_categories(kept);
        self.dirty = true;
        true
    }

    /// Replace tag `old` with `new` (collapsing when `new` already exists).
    /// Returns true when anything changed.
    pub(crate) fn replace_tag(&mut self, old: &str, new: &str) -> bool {
        let current = self.front_matter.tags().to_vec();
        if !current.iter().any(|t| t == old) {
            return false;
        }
        let rewritten: Vec<String> = current
            .iter()
            .map(|t| if t == old { new.to_string() } else { t.clone() })
            .collect();
        self.front_matter.set_tags(rewritten);
        self.dirty = true;
        true
    }

    /// Drop a tag if present. Returns true when anything changed.
    pub(crate) fn drop_tag(&mut self, tag: &str) -> bool {
        if self.front_matter.remove_tag(tag) {
            self.dirty = true;
            return true;
        }
        false
    }
}

fn scalar_timestamp(value: &FieldValue) -> Option<chrono::NaiveDateTime> {
    match value {
        FieldValue::Timestamp(ts) => Some(*ts),
        FieldValue::Scalar(s) => frontmatter::parse_timestamp(s),
        _ => None,
    }
}
