//! Article repository - orchestrates loading, saving, and index upkeep.
//!
//! The repository owns the document set and the taxonomy index. Every
//! successful load/save/create/delete folds the affected document into the
//! index, and the taxonomy operations that rewrite front matter run against
//! both sides in one unit, so a reader never observes them diverged.

use crate::config::WorkspaceConfig;
use crate::document::{
    content_checksum, ArticleDocument, ArticleId, DocumentError, DocumentSet,
};
use crate::frontmatter::{self, CategoryPath, FrontMatter, HeaderError};
use crate::resolver::{self, DuplicateReport};
use crate::taxonomy::{TaxonomyError, TaxonomyIndex};
use crate::vfs::{DiskVfs, Vfs};
use chrono::Timelike;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed header in {id}: {source}")]
    Header {
        id: ArticleId,
        #[source]
        source: HeaderError,
    },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not loaded: {0}")]
    NotFound(String),
}

/// Owns the loaded articles and the taxonomy derived from them.
pub struct ArticleRepository<V: Vfs = DiskVfs> {
    vfs: V,
    config: WorkspaceConfig,
    documents: DocumentSet,
    index: TaxonomyIndex,
    /// Front matter as last folded into the index, per article.
    indexed: BTreeMap<ArticleId, FrontMatter>,
}

impl ArticleRepository<DiskVfs> {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self::with_vfs(config, DiskVfs)
    }
}

impl<V: Vfs> ArticleRepository<V> {
    pub fn with_vfs(config: WorkspaceConfig, vfs: V) -> Self {
        Self {
            vfs,
            config,
            documents: DocumentSet::new(),
            index: TaxonomyIndex::new(),
            indexed: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> &TaxonomyIndex {
        &self.index
    }

    pub fn document(&self, id: &ArticleId) -> Option<&ArticleDocument> {
        self.documents.get(id)
    }

    /// Hand out a document for editing. Edits are folded into the index at
    /// the next save (or taxonomy operation).
    pub fn document_mut(&mut self, id: &ArticleId) -> Option<&mut ArticleDocument> {
        self.documents.get_mut(id)
    }

    /// Discover and load every article under the posts directory.
    ///
    /// Articles with malformed headers are loaded body-only with a warning,
    /// never dropped.
    pub fn scan(&mut self) -> Result<usize, RepoError> {
        let posts_dir = self.config.posts_dir();
        let ignores = compile_ignore_patterns(&self.config.ignore_patterns);

        self.documents.clear();
        self.indexed.clear();

        for path in self.vfs.list_markdown(&posts_dir)? {
            let rel = path
                .strip_prefix(&posts_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            if should_ignore(&rel, &ignores) {
                tracing::debug!("Ignoring {} due to ignore_patterns", rel);
                continue;
            }

            let raw = self.vfs.read(&path)?;
            let id = ArticleId::new(rel);
            let doc = match frontmatter::parse(&raw) {
                Ok((fm, body)) => ArticleDocument::from_file_text(id.clone(), fm, body, &raw),
                Err(e) => {
                    tracing::warn!("Malformed header in {}: {}; loading body only", id, e);
                    ArticleDocument::from_file_text(
                        id.clone(),
                        FrontMatter::default(),
                        raw.clone(),
                        &raw,
                    )
                }
            };
            self.documents.insert(id, doc);
        }

        self.index.rebuild(self.documents.values());
        self.indexed = self
            .documents
            .iter()
            .map(|(id, doc)| (id.clone(), doc.front_matter().clone()))
            .collect();

        tracing::info!("Scanned {} articles from {}", self.documents.len(), posts_dir.display());
        Ok(self.documents.len())
    }

    /// Load (or reload) one article by posts-relative path.
    pub fn load(&mut self, rel: &str) -> Result<&ArticleDocument, RepoError> {
        let id = ArticleId::new(rel);
        let raw = self.vfs.read(&self.full_path(rel))?;
        let (fm, body) = frontmatter::parse(&raw).map_err(|source| RepoError::Header {
            id: id.clone(),
            source,
        })?;
        let doc = ArticleDocument::from_file_text(id.clone(), fm, body, &raw);

        let old = self.indexed.remove(&id).unwrap_or_default();
        self.index.apply_delta(&id, &old, doc.front_matter());
        self.indexed.insert(id.clone(), doc.front_matter().clone());
        self.documents.insert(id.clone(), doc);
        Ok(&self.documents[&id])
    }

    /// Create a new, unsaved article. The date defaults to now when the
    /// initial fields carry none.
    pub fn create(&mut self, rel: &str, initial: FrontMatter) -> Result<&ArticleDocument, RepoError> {
        let id = ArticleId::new(rel);
        if self.documents.contains_key(&id) {
            return Err(RepoError::Conflict(format!("article '{}' is already loaded", id)));
        }
        let full = self.full_path(rel);
        if self.vfs.exists(&full) {
            return Err(RepoError::Conflict(format!(
                "file '{}' already exists",
                full.display()
            )));
        }

        let mut fm = initial;
        if fm.title().map_or(true, |t| t.trim().is_empty()) {
            return Err(RepoError::Document(DocumentError::Validation {
                field: "title".to_string(),
                reason: "a new article needs a non-empty title".to_string(),
            }));
        }
        if fm.date().is_none() {
            let now = chrono::Local::now().naive_local();
            fm.set_date(now.with_nanosecond(0).unwrap_or(now));
        }

        let doc = ArticleDocument::new_draft(id.clone(), fm);
        self.index
            .apply_delta(&id, &FrontMatter::default(), doc.front_matter());
        self.indexed.insert(id.clone(), doc.front_matter().clone());
        self.documents.insert(id.clone(), doc);

        tracing::info!("Created article {}", id);
        Ok(&self.documents[&id])
    }

    /// Write one article back to storage.
    ///
    /// Fails with a conflict when the on-disk content no longer matches the
    /// checksum recorded at load/save time (external modification).
    pub fn save(&mut self, id: &ArticleId) -> Result<(), RepoError> {
        let doc = self
            .documents
            .get(id)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        let full = self.full_path(id.as_str());
        let text = doc.render();

        if self.vfs.exists(&full) {
            let on_disk = self.vfs.read(&full)?;
            let disk_sum = content_checksum(&on_disk);
            match doc.last_saved_checksum() {
                Some(prev) if prev == disk_sum.as_str() => {}
                _ => {
                    return Err(RepoError::Conflict(format!(
                        "'{}' changed on disk since it was loaded",
                        id
                    )))
                }
            }
        }

        self.vfs.write(&full, &text)?;
        let sum = content_checksum(&text);
        let doc = self.documents.get_mut(id).expect("present above");
        doc.mark_saved(sum);

        let current = doc.front_matter().clone();
        let old = self.indexed.remove(id).unwrap_or_default();
        self.index.apply_delta(id, &old, &current);
        self.indexed.insert(id.clone(), current);

        tracing::debug!("Saved article {}", id);
        Ok(())
    }

    /// Save every document with unsaved changes. Returns how many were
    /// written.
    pub fn save_all_dirty(&mut self) -> Result<usize, RepoError> {
        let dirty: Vec<ArticleId> = self
            .documents
            .iter()
            .filter(|(_, doc)| doc.is_dirty())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dirty {
            self.save(id)?;
        }
        Ok(dirty.len())
    }

    /// Remove an article from storage and from the document set.
    pub fn delete(&mut self, id: &ArticleId) -> Result<(), RepoError> {
        if !self.documents.contains_key(id) {
            return Err(RepoError::NotFound(id.to_string()));
        }
        let full = self.full_path(id.as_str());
        if self.vfs.exists(&full) {
            self.vfs.remove(&full)?;
        }

        let old = self.indexed.remove(id).unwrap_or_default();
        self.index.apply_delta(id, &old, &FrontMatter::default());
        self.documents.remove(id);

        tracing::info!("Deleted article {}", id);
        Ok(())
    }

    /// Every loaded article, newest first (undated articles last), ties by
    /// identity.
    pub fn list_all(&self) -> Vec<&ArticleDocument> {
        let mut out: Vec<&ArticleDocument> = self.documents.values().collect();
        out.sort_by(|a, b| {
            b.front_matter()
                .date()
                .cmp(&a.front_matter().date())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    /// Case-insensitive title substring search, in `list_all` order.
    pub fn search_titles(&self, query: &str) -> Vec<&ArticleDocument> {
        let needle = query.to_lowercase();
        self.list_all()
            .into_iter()
            .filter(|doc| {
                doc.front_matter()
                    .title()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .collect()
    }

    pub fn duplicate_report(&self) -> DuplicateReport {
        resolver::scan_duplicates(&self.index)
    }

    pub fn rename_category(
        &mut self,
        old: &CategoryPath,
        new: &CategoryPath,
    ) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.rename_category(&mut self.documents, old, new)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    pub fn merge_categories(
        &mut self,
        source: &CategoryPath,
        dest: &CategoryPath,
    ) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.merge_categories(&mut self.documents, source, dest)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    pub fn delete_category(
        &mut self,
        path: &CategoryPath,
        cascade: bool,
    ) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.delete_category(&mut self.documents, path, cascade)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    pub fn rename_tag(&mut self, old: &str, new: &str) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.rename_tag(&mut self.documents, old, new)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    pub fn merge_tags(&mut self, source: &str, dest: &str) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.merge_tags(&mut self.documents, source, dest)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    pub fn delete_tag(&mut self, name: &str, cascade: bool) -> Result<Vec<ArticleId>, RepoError> {
        self.sync_pending();
        let affected = self.index.delete_tag(&mut self.documents, name, cascade)?;
        self.refresh_snapshots(&affected);
        Ok(affected)
    }

    fn full_path(&self, rel: &str) -> PathBuf {
        self.config.posts_dir().join(rel)
    }

    /// Fold any front matter edits made since the last sync point into the
    /// index, so taxonomy operations see the current state.
    fn sync_pending(&mut self) {
        let pending: Vec<(ArticleId, FrontMatter)> = self
            .documents
            .iter()
            .filter(|(id, doc)| self.indexed.get(*id) != Some(doc.front_matter()))
            .map(|(id, doc)| (id.clone(), doc.front_matter().clone()))
            .collect();
        for (id, current) in pending {
            let old = self.indexed.remove(&id).unwrap_or_default();
            self.index.apply_delta(&id, &old, &current);
            self.indexed.insert(id, current);
        }
    }

    fn refresh_snapshots(&mut self, ids: &[ArticleId]) {
        for id in ids {
            if let Some(doc) = self.documents.get(id) {
                self.indexed.insert(id.clone(), doc.front_matter().clone());
            }
        }
    }
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pat in patterns {
        match Regex::new(pat) {
            Ok(re) => compiled.push(re),
            Err(err) => tracing::warn!("Invalid ignore pattern '{}': {}", pat, err),
        }
    }
    compiled
}

fn should_ignore(path: &str, ignores: &[Regex]) -> bool {
    ignores.iter().any(|re| re.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_post(dir: &std::path::Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn repo_in(dir: &std::path::Path) -> ArticleRepository {
        ArticleRepository::new(WorkspaceConfig::for_posts_dir(dir))
    }

    #[test]
    fn test_scan_loads_corpus_and_builds_index() {
        let dir = tempfile::tempdir().unwrap();
        write_post(
            dir.path(),
            "a.md",
            "---\ntitle: A\ndate: 2024-01-02 10:00:00\ncategories:\n  - Tech\ntags: [rust]\n---\nA body.\n",
        );
        write_post(
            dir.path(),
            "nested/b.md",
            "---\ntitle: B\ndate: 2024-01-01\ntags: [rust, blog]\n---\nB body.\n",
        );

        let mut repo = repo_in(dir.path());
        assert_eq!(repo.scan().unwrap(), 2);
        assert_eq!(repo.index().tag_usage("rust"), 2);
        assert_eq!(
            repo.index()
                .category_usage(&CategoryPath::from_display("Tech")),
            1
        );
    }

    #[test]
    fn test_scan_keeps_malformed_article_body_only() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "bad.md", "---\ntitle: Broken\nnever closed\n");

        let mut repo = repo_in(dir.path());
        assert_eq!(repo.scan().unwrap(), 1);
        let doc = repo.document(&ArticleId::new("bad.md")).unwrap();
        assert!(doc.front_matter().is_empty());
        assert_eq!(doc.body(), "---\ntitle: Broken\nnever closed\n");
    }

    #[test]
    fn test_load_is_strict_about_malformed_headers() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "bad.md", "---\ntitle: Broken\n");

        let mut repo = repo_in(dir.path());
        assert!(matches!(
            repo.load("bad.md"),
            Err(RepoError::Header { .. })
        ));
    }

    #[test]
    fn test_save_roundtrips_and_clears_dirty() {
        let dir = tempfile::tempdir().unwrap();
        write_post(
            dir.path(),
            "a.md",
            "---\ntitle: A\ndate: 2024-01-01\n---\nOriginal.\n",
        );

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let id = ArticleId::new("a.md");
        repo.document_mut(&id).unwrap().set_body("Edited.\n".to_string());
        repo.save(&id).unwrap();

        assert!(!repo.document(&id).unwrap().is_dirty());
        let on_disk = fs::read_to_string(dir.path().join("a.md")).unwrap();
        assert_eq!(on_disk, "---\ntitle: A\ndate: 2024-01-01\n---\nEdited.\n");
    }

    #[test]
    fn test_save_conflicts_on_external_modification() {
        let dir = tempfile::tempdir().unwrap();
        write_post(
            dir.path(),
            "a.md",
            "---\ntitle: A\ndate: 2024-01-01\n---\nBody.\n",
        );

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let id = ArticleId::new("a.md");
        repo.document_mut(&id).unwrap().set_body("Mine.\n".to_string());

        // Someone else writes the file behind our back.
        write_post(dir.path(), "a.md", "---\ntitle: A\ndate: 2024-01-01\n---\nTheirs.\n");

        assert!(matches!(repo.save(&id), Err(RepoError::Conflict(_))));
        // The external content was not clobbered.
        let on_disk = fs::read_to_string(dir.path().join("a.md")).unwrap();
        assert!(on_disk.contains("Theirs."));
    }

    #[test]
    fn test_create_defaults_date_and_refuses_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();

        let mut fm = FrontMatter::default();
        fm.set_title("Fresh".to_string());
        let doc = repo.create("fresh.md", fm.clone()).unwrap();
        assert!(doc.front_matter().date().is_some());
        assert!(doc.is_dirty());

        assert!(matches!(
            repo.create("fresh.md", fm.clone()),
            Err(RepoError::Conflict(_))
        ));

        let untitled = FrontMatter::default();
        assert!(matches!(
            repo.create("untitled.md", untitled),
            Err(RepoError::Document(DocumentError::Validation { .. }))
        ));
    }

    #[test]
    fn test_delete_removes_file_and_index_usage() {
        let dir = tempfile::tempdir().unwrap();
        write_post(
            dir.path(),
            "a.md",
            "---\ntitle: A\ndate: 2024-01-01\ntags: [only]\n---\n",
        );

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let id = ArticleId::new("a.md");
        repo.delete(&id).unwrap();

        assert!(repo.document(&id).is_none());
        assert!(repo.index().tag("only").is_none());
        assert!(!dir.path().join("a.md").exists());
    }

    #[test]
    fn test_list_all_is_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "old.md", "---\ntitle: Old\ndate: 2020-01-01\n---\n");
        write_post(dir.path(), "new.md", "---\ntitle: New\ndate: 2024-06-01\n---\n");
        write_post(dir.path(), "undated.md", "No header at all.\n");

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let order: Vec<&str> = repo.list_all().iter().map(|d| d.id().as_str()).collect();
        assert_eq!(order, vec!["new.md", "old.md", "undated.md"]);
    }

    #[test]
    fn test_search_titles_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "a.md", "---\ntitle: Rust Memory Model\ndate: 2024-01-01\n---\n");
        write_post(dir.path(), "b.md", "---\ntitle: Gardening\ndate: 2024-01-02\n---\n");

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let hits = repo.search_titles("rust");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id().as_str(), "a.md");
    }

    #[test]
    fn test_rename_category_then_save_persists_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.md", "b.md", "c.md"] {
            write_post(
                dir.path(),
                name,
                "---\ntitle: T\ndate: 2024-01-01\ncategories:\n  - Tech\n---\n",
            );
        }

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let affected = repo
            .rename_category(
                &CategoryPath::from_display("Tech"),
                &CategoryPath::from_display("Technology"),
            )
            .unwrap();
        assert_eq!(affected.len(), 3);
        assert_eq!(
            repo.index()
                .category_usage(&CategoryPath::from_display("Technology")),
            3
        );
        assert_eq!(repo.save_all_dirty().unwrap(), 3);

        let on_disk = fs::read_to_string(dir.path().join("a.md")).unwrap();
        assert!(on_disk.contains("- Technology"));
        assert!(!on_disk.contains("- Tech\n"));
    }

    #[test]
    fn test_unsaved_edits_are_synced_before_taxonomy_ops() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "a.md", "---\ntitle: A\ndate: 2024-01-01\n---\n");

        let mut repo = repo_in(dir.path());
        repo.scan().unwrap();
        let id = ArticleId::new("a.md");
        repo.document_mut(&id).unwrap().add_tag("Draft");

        // The pending edit is visible to the rename, and the rewrite lands
        // in the same document.
        repo.rename_tag("Draft", "draft").unwrap();
        assert_eq!(repo.index().tag_usage("draft"), 1);
        assert_eq!(
            repo.document(&id).unwrap().front_matter().tags(),
            &["draft".to_string()]
        );
    }

    #[test]
    fn test_scan_respects_ignore_patterns() {
        let dir = tempfile::tempdir().unwrap();
        write_post(dir.path(), "keep.md", "---\ntitle: K\ndate: 2024-01-01\n---\n");
        write_post(dir.path(), "drafts/skip.md", "---\ntitle: S\ndate: 2024-01-01\n---\n");

        let mut config = WorkspaceConfig::for_posts_dir(dir.path());
        config.ignore_patterns = vec!["^drafts/".to_string()];
        let mut repo = ArticleRepository::new(config);
        assert_eq!(repo.scan().unwrap(), 1);
        assert!(repo.document(&ArticleId::new("keep.md")).is_some());
    }
}
