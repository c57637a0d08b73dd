//! The shared category tree and tag registry.
//!
//! The index is a materialized view over the loaded documents: every usage
//! it records corresponds to a category path or tag actually present in a
//! document's front matter, and operations that rewrite articles update
//! both sides in one unit. Articles are referenced by identity, never by
//! document handle.

use crate::document::{ArticleDocument, ArticleId, DocumentSet};
use crate::frontmatter::{CategoryPath, FrontMatter};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// One segment in the category hierarchy. Children are unique by name and
/// kept sorted; usages hold the articles tagged with the exact path ending
/// here.
#[derive(Debug, Clone, Default)]
pub struct CategoryNode {
    name: String,
    children: Vec<CategoryNode>,
    usages: BTreeSet<ArticleId>,
}

impl CategoryNode {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[CategoryNode] {
        &self.children
    }

    pub fn usages(&self) -> &BTreeSet<ArticleId> {
        &self.usages
    }

    /// Articles tagged with exactly this node's path.
    pub fn article_count(&self) -> usize {
        self.usages.len()
    }

    /// Articles tagged with this node's path or any descendant path.
    pub fn subtree_count(&self) -> usize {
        self.usages.len() + self.children.iter().map(|c| c.subtree_count()).sum::<usize>()
    }

    fn child_index(&self, name: &str) -> Option<usize> {
        self.children
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
    }

    fn child(&self, name: &str) -> Option<&CategoryNode> {
        self.child_index(name).map(|i| &self.children[i])
    }

    fn ensure_child(&mut self, name: &str) -> &mut CategoryNode {
        match self.children.binary_search_by(|c| c.name.as_str().cmp(name)) {
            Ok(i) => &mut self.children[i],
            Err(i) => {
                self.children.insert(i, CategoryNode::named(name));
                &mut self.children[i]
            }
        }
    }

    fn take_child(&mut self, name: &str) -> Option<CategoryNode> {
        self.child_index(name).map(|i| self.children.remove(i))
    }

    fn collect_ids(&self, out: &mut BTreeSet<ArticleId>) {
        out.extend(self.usages.iter().cloned());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    fn collect_paths(&self, prefix: &mut Vec<String>, out: &mut Vec<(CategoryPath, usize)>) {
        for child in &self.children {
            prefix.push(child.name.clone());
            out.push((CategoryPath::new(prefix.clone()), child.article_count()));
            child.collect_paths(prefix, out);
            prefix.pop();
        }
    }
}

/// A flat tag and the articles using it.
#[derive(Debug, Clone, Default)]
pub struct TagEntry {
    name: String,
    usages: BTreeSet<ArticleId>,
}

impl TagEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usages(&self) -> &BTreeSet<ArticleId> {
        &self.usages
    }

    pub fn article_count(&self) -> usize {
        self.usages.len()
    }
}

/// Lowercased, whitespace-collapsed form used for similarity lookups.
pub(crate) fn normalized(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn normalized_path(path: &CategoryPath) -> Vec<String> {
    path.segments().iter().map(|s| normalized(s)).collect()
}

/// Category tree plus tag registry, derived from the loaded documents.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    root: CategoryNode,
    tags: BTreeMap<String, TagEntry>,
}

impl TaxonomyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The synthetic root; its children are the top-level categories.
    pub fn root(&self) -> &CategoryNode {
        &self.root
    }

    pub fn category(&self, path: &CategoryPath) -> Option<&CategoryNode> {
        let mut cur = &self.root;
        for seg in path.segments() {
            cur = cur.child(seg)?;
        }
        Some(cur)
    }

    pub fn tag(&self, name: &str) -> Option<&TagEntry> {
        self.tags.get(name)
    }

    /// Direct usage count of a category path; zero when absent.
    pub fn category_usage(&self, path: &CategoryPath) -> usize {
        self.category(path).map_or(0, |n| n.article_count())
    }

    pub fn tag_usage(&self, name: &str) -> usize {
        self.tags.get(name).map_or(0, |t| t.article_count())
    }

    /// Every category path with its direct usage count, in listing order.
    pub fn list_categories(&self) -> Vec<(CategoryPath, usize)> {
        let mut out = Vec::new();
        self.root.collect_paths(&mut Vec::new(), &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        out
    }

    /// Every tag with its usage count, in listing order.
    pub fn list_tags(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> = self
            .tags
            .values()
            .map(|t| (t.name.clone(), t.article_count()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        out
    }

    /// Discard and reconstruct the index from a document set. The result is
    /// structurally identical regardless of traversal order.
    pub fn rebuild<'a, I>(&mut self, documents: I)
    where
        I: IntoIterator<Item = &'a ArticleDocument>,
    {
        self.root = CategoryNode::default();
        self.tags.clear();
        for doc in documents {
            self.index_document(doc.id(), doc.front_matter());
        }
    }

    /// Incremental update after one document's front matter changed.
    pub fn apply_delta(&mut self, id: &ArticleId, old: &FrontMatter, new: &FrontMatter) {
        for path in old.categories() {
            if !new.categories().contains(path) {
                self.remove_category_usage(path, id);
            }
        }
        for path in new.categories() {
            if !old.categories().contains(path) {
                self.add_category_usage(path, id);
            }
        }
        for tag in old.tags() {
            if !new.tags().contains(tag) {
                self.remove_tag_usage(tag, id);
            }
        }
        for tag in new.tags() {
            if !old.tags().contains(tag) {
                self.add_tag_usage(tag, id);
            }
        }
    }

    fn index_document(&mut self, id: &ArticleId, fm: &FrontMatter) {
        for path in fm.categories() {
            self.add_category_usage(path, id);
        }
        for tag in fm.tags() {
            self.add_tag_usage(tag, id);
        }
    }

    fn add_category_usage(&mut self, path: &CategoryPath, id: &ArticleId) {
        let mut cur = &mut self.root;
        for seg in path.segments() {
            cur = cur.ensure_child(seg);
        }
        cur.usages.insert(id.clone());
    }

    /// Remove a usage and prune nodes left with no usages and no children.
    /// Empty interior nodes keep their place as structural placeholders.
    fn remove_category_usage(&mut self, path: &CategoryPath, id: &ArticleId) {
        fn remove_at(node: &mut CategoryNode, segments: &[String], id: &ArticleId) {
            let Some((first, rest)) = segments.split_first() else {
                node.usages.remove(id);
                return;
            };
            let Some(idx) = node.child_index(first) else {
                return;
            };
            remove_at(&mut node.children[idx], rest, id);
            if node.children[idx].usages.is_empty() && node.children[idx].children.is_empty() {
                node.children.remove(idx);
            }
        }
        remove_at(&mut self.root, path.segments(), id);
    }

    fn add_tag_usage(&mut self, tag: &str, id: &ArticleId) {
        let entry = self.tags.entry(tag.to_string()).or_insert_with(|| TagEntry {
            name: tag.to_string(),
            usages: BTreeSet::new(),
        });
        entry.usages.insert(id.clone());
    }

    fn remove_tag_usage(&mut self, tag: &str, id: &ArticleId) {
        if let Some(entry) = self.tags.get_mut(tag) {
            entry.usages.remove(id);
            if entry.usages.is_empty() {
                self.tags.remove(tag);
            }
        }
    }

    /// Relocate the subtree at `old` to `new`, rewriting every affected
    /// article's front matter. Fails when `new` is already taken (merge
    /// instead) or when one path contains the other.
    pub fn rename_category(
        &mut self,
        documents: &mut DocumentSet,
        old: &CategoryPath,
        new: &CategoryPath,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        if old.is_empty() || new.is_empty() {
            return Err(TaxonomyError::NotFound("empty category path".to_string()));
        }
        if old == new {
            return Ok(Vec::new());
        }
        if new.starts_with(old) || old.starts_with(new) {
            return Err(TaxonomyError::Conflict(format!(
                "cannot relocate '{}' into '{}'",
                old, new
            )));
        }
        let Some(node) = self.category(old) else {
            return Err(TaxonomyError::NotFound(format!("category '{}'", old)));
        };
        if self.category(new).is_some() {
            return Err(TaxonomyError::Conflict(format!(
                "category '{}' already exists; merge instead",
                new
            )));
        }

        let mut affected = BTreeSet::new();
        node.collect_ids(&mut affected);

        let mut subtree = self.detach(old).expect("checked above");
        subtree.name = new.segments().last().expect("non-empty path").clone();
        let parent = self.ensure_parent(new);
        let pos = parent
            .children
            .binary_search_by(|c| c.name.cmp(&subtree.name))
            .unwrap_err();
        parent.children.insert(pos, subtree);
        self.prune_chain(old);

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.reprefix_categories(old, new);
            }
        }

        tracing::info!(
            "Renamed category '{}' to '{}' across {} articles",
            old,
            new,
            affected.len()
        );
        Ok(affected.into_iter().collect())
    }

    /// Union the subtree at `source` into `dest` and remove the source,
    /// rewriting every affected article. The destination's display names
    /// survive.
    pub fn merge_categories(
        &mut self,
        documents: &mut DocumentSet,
        source: &CategoryPath,
        dest: &CategoryPath,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        if source.is_empty() || dest.is_empty() {
            return Err(TaxonomyError::NotFound("empty category path".to_string()));
        }
        if source == dest {
            return Ok(Vec::new());
        }
        if self.category(source).is_none() {
            return Err(TaxonomyError::NotFound(format!("category '{}'", source)));
        }
        if self.category(dest).is_none() {
            return Err(TaxonomyError::NotFound(format!("category '{}'", dest)));
        }
        if dest.starts_with(source) {
            return Err(TaxonomyError::Conflict(format!(
                "cannot merge '{}' into its own subtree '{}'",
                source, dest
            )));
        }

        let mut affected = BTreeSet::new();
        self.category(source)
            .expect("checked above")
            .collect_ids(&mut affected);

        let subtree = self.detach(source).expect("checked above");
        let dest_node = self
            .node_mut(dest)
            .expect("destination checked above");
        merge_subtree(dest_node, subtree);
        self.prune_chain(source);

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.reprefix_categories(source, dest);
            }
        }

        tracing::info!(
            "Merged category '{}' into '{}' across {} articles",
            source,
            dest,
            affected.len()
        );
        Ok(affected.into_iter().collect())
    }

    /// Delete a category. With usages anywhere in the subtree this fails
    /// unless `cascade` is set, in which case the references are removed
    /// from every article first.
    pub fn delete_category(
        &mut self,
        documents: &mut DocumentSet,
        path: &CategoryPath,
        cascade: bool,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        if path.is_empty() {
            return Err(TaxonomyError::NotFound("empty category path".to_string()));
        }
        let Some(node) = self.category(path) else {
            return Err(TaxonomyError::NotFound(format!("category '{}'", path)));
        };
        let mut affected = BTreeSet::new();
        node.collect_ids(&mut affected);
        if !affected.is_empty() && !cascade {
            return Err(TaxonomyError::Conflict(format!(
                "category '{}' is used by {} articles",
                path,
                affected.len()
            )));
        }

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.remove_categories_with_prefix(path);
            }
        }
        self.detach(path);
        self.prune_chain(path);

        tracing::info!(
            "Deleted category '{}' ({} articles updated)",
            path,
            affected.len()
        );
        Ok(affected.into_iter().collect())
    }

    /// Rename a tag. Fails when the new name is already in use.
    pub fn rename_tag(
        &mut self,
        documents: &mut DocumentSet,
        old: &str,
        new: &str,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        if old == new {
            return Ok(Vec::new());
        }
        if !self.tags.contains_key(old) {
            return Err(TaxonomyError::NotFound(format!("tag '{}'", old)));
        }
        if self.tags.contains_key(new) {
            return Err(TaxonomyError::Conflict(format!(
                "tag '{}' already exists; merge instead",
                new
            )));
        }

        let mut entry = self.tags.remove(old).expect("checked above");
        entry.name = new.to_string();
        let affected: Vec<ArticleId> = entry.usages.iter().cloned().collect();
        self.tags.insert(new.to_string(), entry);

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.replace_tag(old, new);
            }
        }

        tracing::info!("Renamed tag '{}' to '{}' across {} articles", old, new, affected.len());
        Ok(affected)
    }

    /// Union `source`'s usages into `dest` and remove `source`, rewriting
    /// every affected article. The destination name survives.
    pub fn merge_tags(
        &mut self,
        documents: &mut DocumentSet,
        source: &str,
        dest: &str,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        if source == dest {
            return Ok(Vec::new());
        }
        if !self.tags.contains_key(source) {
            return Err(TaxonomyError::NotFound(format!("tag '{}'", source)));
        }
        if !self.tags.contains_key(dest) {
            return Err(TaxonomyError::NotFound(format!("tag '{}'", dest)));
        }

        let entry = self.tags.remove(source).expect("checked above");
        let affected: Vec<ArticleId> = entry.usages.iter().cloned().collect();
        self.tags
            .get_mut(dest)
            .expect("checked above")
            .usages
            .extend(entry.usages);

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.replace_tag(source, dest);
            }
        }

        tracing::info!(
            "Merged tag '{}' into '{}' across {} articles",
            source,
            dest,
            affected.len()
        );
        Ok(affected)
    }

    /// Delete a tag. Fails when still in use unless `cascade` removes it
    /// from every referencing article first.
    pub fn delete_tag(
        &mut self,
        documents: &mut DocumentSet,
        name: &str,
        cascade: bool,
    ) -> Result<Vec<ArticleId>, TaxonomyError> {
        let Some(entry) = self.tags.get(name) else {
            return Err(TaxonomyError::NotFound(format!("tag '{}'", name)));
        };
        let affected: Vec<ArticleId> = entry.usages.iter().cloned().collect();
        if !affected.is_empty() && !cascade {
            return Err(TaxonomyError::Conflict(format!(
                "tag '{}' is used by {} articles",
                name,
                affected.len()
            )));
        }

        for id in &affected {
            if let Some(doc) = documents.get_mut(id) {
                doc.drop_tag(name);
            }
        }
        self.tags.remove(name);

        tracing::info!("Deleted tag '{}' ({} articles updated)", name, affected.len());
        Ok(affected)
    }

    /// Tags whose normalized form matches the query's, in listing order.
    pub fn find_similar_tags(&self, name: &str) -> Vec<String> {
        let wanted = normalized(name);
        let mut matches: Vec<(String, usize)> = self
            .tags
            .values()
            .filter(|t| normalized(&t.name) == wanted)
            .map(|t| (t.name.clone(), t.article_count()))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        matches.into_iter().map(|(name, _)| name).collect()
    }

    /// Category paths whose normalized segments match the query's, in
    /// listing order.
    pub fn find_similar_categories(&self, path: &CategoryPath) -> Vec<CategoryPath> {
        let wanted = normalized_path(path);
        let mut matches: Vec<(CategoryPath, usize)> = self
            .list_categories()
            .into_iter()
            .filter(|(p, _)| normalized_path(p) == wanted)
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        matches.into_iter().map(|(p, _)| p).collect()
    }

    fn node_mut(&mut self, path: &CategoryPath) -> Option<&mut CategoryNode> {
        let mut cur = &mut self.root;
        for seg in path.segments() {
            let idx = cur.child_index(seg)?;
            cur = &mut cur.children[idx];
        }
        Some(cur)
    }

    fn ensure_parent(&mut self, path: &CategoryPath) -> &mut CategoryNode {
        let mut cur = &mut self.root;
        for seg in &path.segments()[..path.segments().len() - 1] {
            cur = cur.ensure_child(seg);
        }
        cur
    }

    fn detach(&mut self, path: &CategoryPath) -> Option<CategoryNode> {
        let (last, parents) = path.segments().split_last()?;
        let parent = self.node_mut(&CategoryPath::new(parents.to_vec()))?;
        parent.take_child(last)
    }

    /// Remove empty-leaf ancestors left behind after a detach.
    fn prune_chain(&mut self, path: &CategoryPath) {
        fn prune(node: &mut CategoryNode, segments: &[String]) {
            let Some((first, rest)) = segments.split_first() else {
                return;
            };
            let Some(idx) = node.child_index(first) else {
                return;
            };
            prune(&mut node.children[idx], rest);
            if node.children[idx].usages.is_empty() && node.children[idx].children.is_empty() {
                node.children.remove(idx);
            }
        }
        if path.segments().len() > 1 {
            let parents = &path.segments()[..path.segments().len() - 1];
            prune(&mut self.root, parents);
        }
    }
}

fn merge_subtree(dest: &mut CategoryNode, source: CategoryNode) {
    dest.usages.extend(source.usages);
    for child in source.children {
        let target = dest.ensure_child(&child.name);
        merge_subtree(target, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter;

    fn doc(id: &str, raw: &str) -> ArticleDocument {
        let (fm, body) = frontmatter::parse(raw).unwrap();
        ArticleDocument::from_file_text(ArticleId::new(id), fm, body, raw)
    }

    fn corpus(entries: &[(&str, &str)]) -> DocumentSet {
        entries
            .iter()
            .map(|(id, raw)| (ArticleId::new(*id), doc(id, raw)))
            .collect()
    }

    fn path(display: &str) -> CategoryPath {
        CategoryPath::from_display(display)
    }

    #[test]
    fn test_rebuild_is_order_independent() {
        let a = doc("a.md", "---\ntitle: A\ncategories:\n  - Tech\ntags: [rust]\n---\n");
        let b = doc("b.md", "---\ntitle: B\ncategories:\n  - [Tech, Dev]\ntags: [rust, blog]\n---\n");
        let c = doc("c.md", "---\ntitle: C\ncategories:\n  - Life\n---\n");

        let mut first = TaxonomyIndex::new();
        first.rebuild([&a, &b, &c]);
        let mut second = TaxonomyIndex::new();
        second.rebuild([&c, &b, &a]);

        assert_eq!(first.list_categories(), second.list_categories());
        assert_eq!(first.list_tags(), second.list_tags());
        assert_eq!(
            first.list_categories(),
            vec![
                (path("Life"), 1),
                (path("Tech"), 1),
                (path("Tech/Dev"), 1),
            ]
        );
    }

    #[test]
    fn test_apply_delta_prunes_empty_leaves_keeps_interior() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - [Tech, Dev]\n---\n"),
            ("b.md", "---\ntitle: B\ncategories:\n  - Tech\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        // Drop a.md's Tech/Dev; the Dev leaf goes away, Tech survives with
        // b.md's direct usage.
        let a = docs.get_mut(&ArticleId::new("a.md")).unwrap();
        let old = a.front_matter().clone();
        a.remove_category(&path("Tech/Dev")).unwrap();
        let new = a.front_matter().clone();
        index.apply_delta(&ArticleId::new("a.md"), &old, &new);

        assert!(index.category(&path("Tech/Dev")).is_none());
        assert_eq!(index.category_usage(&path("Tech")), 1);

        // Dropping b.md's Tech too removes the whole branch.
        let b = docs.get_mut(&ArticleId::new("b.md")).unwrap();
        let old = b.front_matter().clone();
        b.remove_category(&path("Tech")).unwrap();
        let new = b.front_matter().clone();
        index.apply_delta(&ArticleId::new("b.md"), &old, &new);
        assert!(index.category(&path("Tech")).is_none());
    }

    #[test]
    fn test_interior_node_with_children_is_retained() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - Tech\n  - [Tech, Dev]\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        let a = docs.get_mut(&ArticleId::new("a.md")).unwrap();
        let old = a.front_matter().clone();
        a.remove_category(&path("Tech")).unwrap();
        let new = a.front_matter().clone();
        index.apply_delta(&ArticleId::new("a.md"), &old, &new);

        // Tech has no direct usages left but still holds Dev.
        assert_eq!(index.category_usage(&path("Tech")), 0);
        assert!(index.category(&path("Tech")).is_some());
        assert_eq!(index.category_usage(&path("Tech/Dev")), 1);
    }

    #[test]
    fn test_rename_category_rewrites_articles() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - Tech\n---\n"),
            ("b.md", "---\ntitle: B\ncategories:\n  - Tech\n---\n"),
            ("c.md", "---\ntitle: C\ncategories:\n  - Tech\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        let affected = index
            .rename_category(&mut docs, &path("Tech"), &path("Technology"))
            .unwrap();
        assert_eq!(affected.len(), 3);
        assert!(index.category(&path("Tech")).is_none());
        assert_eq!(index.category_usage(&path("Technology")), 3);
        for doc in docs.values() {
            assert_eq!(doc.front_matter().categories(), &[path("Technology")]);
            assert!(doc.is_dirty());
        }
    }

    #[test]
    fn test_rename_category_to_existing_conflicts() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - Tech\n  - Dev\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        let err = index.rename_category(&mut docs, &path("Tech"), &path("Dev"));
        assert!(matches!(err, Err(TaxonomyError::Conflict(_))));
        // Nothing changed.
        assert_eq!(index.category_usage(&path("Tech")), 1);
        assert!(!docs.values().any(|d| d.is_dirty()));
    }

    #[test]
    fn test_rename_relocates_whole_subtree() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - [Tech, Dev, Rust]\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        index
            .rename_category(&mut docs, &path("Tech"), &path("Topics"))
            .unwrap();
        assert_eq!(index.category_usage(&path("Topics/Dev/Rust")), 1);
        assert_eq!(
            docs[&ArticleId::new("a.md")].front_matter().categories(),
            &[path("Topics/Dev/Rust")]
        );
    }

    #[test]
    fn test_merge_categories_unions_usages() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - Tech\n---\n"),
            ("b.md", "---\ntitle: B\ncategories:\n  - Technology\n---\n"),
            ("c.md", "---\ntitle: C\ncategories:\n  - Tech\n  - Technology\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        index
            .merge_categories(&mut docs, &path("Tech"), &path("Technology"))
            .unwrap();
        assert!(index.category(&path("Tech")).is_none());
        assert_eq!(index.category_usage(&path("Technology")), 3);
        // c.md's two entries collapse into one.
        assert_eq!(
            docs[&ArticleId::new("c.md")].front_matter().categories(),
            &[path("Technology")]
        );
    }

    #[test]
    fn test_merge_effect_is_commutative() {
        let entries = [
            ("a.md", "---\ntitle: A\ntags: [draft]\n---\n"),
            ("b.md", "---\ntitle: B\ntags: [Draft]\n---\n"),
            ("c.md", "---\ntitle: C\ntags: [draft, Draft]\n---\n"),
        ];

        let mut docs_ab = corpus(&entries);
        let mut index_ab = TaxonomyIndex::new();
        index_ab.rebuild(docs_ab.values());
        index_ab.merge_tags(&mut docs_ab, "draft", "Draft").unwrap();

        let mut docs_ba = corpus(&entries);
        let mut index_ba = TaxonomyIndex::new();
        index_ba.rebuild(docs_ba.values());
        index_ba.merge_tags(&mut docs_ba, "Draft", "draft").unwrap();

        // Same usage sets either way; only the surviving name differs.
        let usages_ab: Vec<_> = index_ab.tag("Draft").unwrap().usages().iter().collect();
        let usages_ba: Vec<_> = index_ba.tag("draft").unwrap().usages().iter().collect();
        assert_eq!(usages_ab, usages_ba);
        assert_eq!(index_ab.list_tags().len(), 1);
        assert_eq!(index_ba.list_tags().len(), 1);
    }

    #[test]
    fn test_delete_tag_requires_cascade_when_used() {
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ntags: [draft, rust]\n---\n"),
            ("b.md", "---\ntitle: B\ntags: [draft]\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        let err = index.delete_tag(&mut docs, "draft", false);
        assert!(matches!(err, Err(TaxonomyError::Conflict(_))));
        assert_eq!(index.tag_usage("draft"), 2);

        let affected = index.delete_tag(&mut docs, "draft", true).unwrap();
        assert_eq!(affected.len(), 2);
        assert!(index.tag("draft").is_none());
        for doc in docs.values() {
            assert!(!doc.front_matter().tags().contains(&"draft".to_string()));
        }
        assert_eq!(
            docs[&ArticleId::new("a.md")].front_matter().tags(),
            &["rust".to_string()]
        );
    }

    #[test]
    fn test_rename_tag_conflicts_with_existing() {
        let mut docs = corpus(&[("a.md", "---\ntitle: A\ntags: [a, b]\n---\n")]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        assert!(matches!(
            index.rename_tag(&mut docs, "a", "b"),
            Err(TaxonomyError::Conflict(_))
        ));
        assert!(matches!(
            index.rename_tag(&mut docs, "missing", "c"),
            Err(TaxonomyError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_similar_tags_groups_variants() {
        let docs = corpus(&[
            ("a.md", "---\ntitle: A\ntags: [Tech]\n---\n"),
            ("b.md", "---\ntitle: B\ntags: [tech]\n---\n"),
            ("c.md", "---\ntitle: C\ntags: [' Tech ']\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        let similar = index.find_similar_tags("tech");
        assert_eq!(similar.len(), 3);
        assert!(similar.contains(&"Tech".to_string()));
        assert!(similar.contains(&"tech".to_string()));
        assert!(similar.contains(&" Tech ".to_string()));
    }

    #[test]
    fn test_index_matches_documents_after_operations() {
        // Consistency invariant: every recorded usage exists in the
        // document, and vice versa.
        let mut docs = corpus(&[
            ("a.md", "---\ntitle: A\ncategories:\n  - Tech\ntags: [rust, draft]\n---\n"),
            ("b.md", "---\ntitle: B\ncategories:\n  - [Tech, Dev]\ntags: [draft]\n---\n"),
        ]);
        let mut index = TaxonomyIndex::new();
        index.rebuild(docs.values());

        index
            .rename_category(&mut docs, &path("Tech"), &path("Technology"))
            .unwrap();
        index.merge_tags(&mut docs, "draft", "rust").unwrap();

        let mut fresh = TaxonomyIndex::new();
        fresh.rebuild(docs.values());
        assert_eq!(index.list_categories(), fresh.list_categories());
        assert_eq!(index.list_tags(), fresh.list_tags());
    }
}
