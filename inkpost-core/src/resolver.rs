//! Duplicate detection over the taxonomy.
//!
//! Detection is pure: the resolver only computes groups and proposals.
//! Executing a proposal goes through the taxonomy's merge operations.

use crate::document::ArticleId;
use crate::frontmatter::CategoryPath;
use crate::taxonomy::{normalized, normalized_path, TaxonomyIndex};
use std::collections::BTreeMap;

/// Entries whose normalized forms collide, plus the suggested survivor.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup<T> {
    pub members: Vec<T>,
    pub survivor: T,
}

/// One executable merge step: fold `source` into `survivor`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeProposal<T> {
    pub a: T,
    pub b: T,
    pub survivor: T,
}

/// A category name recurring at different depths, e.g. `Rust` and
/// `Tech/Rust`. Report-only; never auto-merged.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthWarning {
    pub shallow: CategoryPath,
    pub deep: CategoryPath,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub tag_groups: Vec<DuplicateGroup<String>>,
    pub category_groups: Vec<DuplicateGroup<CategoryPath>>,
    pub depth_warnings: Vec<DepthWarning>,
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        self.tag_groups.is_empty()
            && self.category_groups.is_empty()
            && self.depth_warnings.is_empty()
    }

    /// Pair every non-survivor with its group's survivor.
    pub fn tag_proposals(&self) -> Vec<MergeProposal<String>> {
        proposals_from(&self.tag_groups)
    }

    pub fn category_proposals(&self) -> Vec<MergeProposal<CategoryPath>> {
        proposals_from(&self.category_groups)
    }
}

fn proposals_from<T: Clone + PartialEq>(groups: &[DuplicateGroup<T>]) -> Vec<MergeProposal<T>> {
    let mut out = Vec::new();
    for group in groups {
        for member in &group.members {
            if *member != group.survivor {
                out.push(MergeProposal {
                    a: member.clone(),
                    b: group.survivor.clone(),
                    survivor: group.survivor.clone(),
                });
            }
        }
    }
    out
}

/// Scan the index for case/whitespace duplicates and depth collisions.
pub fn scan_duplicates(index: &TaxonomyIndex) -> DuplicateReport {
    DuplicateReport {
        tag_groups: tag_groups(index),
        category_groups: category_groups(index),
        depth_warnings: depth_warnings(index),
    }
}

fn tag_groups(index: &TaxonomyIndex) -> Vec<DuplicateGroup<String>> {
    let mut by_form: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, _) in index.list_tags() {
        by_form.entry(normalized(&name)).or_default().push(name);
    }

    by_form
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| {
            let survivor = pick_survivor(&members, |name| {
                (
                    index.tag_usage(name),
                    index.tag(name).and_then(|t| t.usages().iter().next().cloned()),
                )
            });
            DuplicateGroup { members, survivor }
        })
        .collect()
}

fn category_groups(index: &TaxonomyIndex) -> Vec<DuplicateGroup<CategoryPath>> {
    let mut by_form: BTreeMap<Vec<String>, Vec<CategoryPath>> = BTreeMap::new();
    for (path, _) in index.list_categories() {
        by_form.entry(normalized_path(&path)).or_default().push(path);
    }

    by_form
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|members| {
            let survivor = pick_survivor(&members, |path| {
                (
                    index.category_usage(path),
                    index
                        .category(path)
                        .and_then(|n| n.usages().iter().next().cloned()),
                )
            });
            DuplicateGroup { members, survivor }
        })
        .collect()
}

/// Larger usage count wins; ties go to the earliest first use (lowest
/// article id, which follows creation order of the scanned corpus).
fn pick_survivor<T, F>(members: &[T], stats: F) -> T
where
    T: Clone + Ord,
    F: Fn(&T) -> (usize, Option<ArticleId>),
{
    members
        .iter()
        .max_by(|a, b| {
            let (count_a, first_a) = stats(a);
            let (count_b, first_b) = stats(b);
            count_a
                .cmp(&count_b)
                .then_with(|| match (first_a, first_b) {
                    // Lower first-use id is better, so reverse.
                    (Some(ia), Some(ib)) => ib.cmp(&ia),
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| b.cmp(a))
        })
        .expect("groups are non-empty")
        .clone()
}

fn depth_warnings(index: &TaxonomyIndex) -> Vec<DepthWarning> {
    let paths: Vec<CategoryPath> = index
        .list_categories()
        .into_iter()
        .map(|(p, _)| p)
        .collect();

    let mut out = Vec::new();
    for shallow in &paths {
        for deep in &paths {
            if shallow.segments().len() < deep.segments().len()
                && deep.segments().ends_with(shallow.segments())
            {
                out.push(DepthWarning {
                    shallow: shallow.clone(),
                    deep: deep.clone(),
                });
            }
        }
    }
    out
}
