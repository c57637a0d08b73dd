//! # inkpost-core
//!
//! Content-model engine for the inkpost blog editor.
//!
//! This crate provides the fundamental building blocks for parsing article
//! front matter, mutating documents, and keeping the shared category/tag
//! taxonomy consistent with the on-disk corpus.

pub mod config;
pub mod document;
pub mod frontmatter;
pub mod repository;
pub mod resolver;
pub mod taxonomy;
pub mod vfs;

pub use config::{ConfigError, WorkspaceConfig};
pub use document::{ArticleDocument, ArticleId, DocumentError, DocumentSet};
pub use frontmatter::{CategoryPath, FieldValue, FrontMatter, HeaderError, RawField};
pub use repository::{ArticleRepository, RepoError};
pub use resolver::{scan_duplicates, DepthWarning, DuplicateGroup, DuplicateReport, MergeProposal};
pub use taxonomy::{CategoryNode, TagEntry, TaxonomyError, TaxonomyIndex};
pub use vfs::{DiskVfs, Vfs};
