//! Nested catalog view built from flat store records.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::{Bundle, Group, GroupId};
use crate::natural_sort::natural_cmp;

/// Summary statistics for a catalog tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    /// Groups reachable from the root, root included.
    pub total_groups: u64,
    /// Bundles reachable from the root.
    pub total_bundles: u64,
    /// Sum of page counts of reachable bundles.
    pub total_pages: u64,
    /// Deepest group level (root = 0).
    pub max_depth: u32,
    /// Records whose parent is not part of the tree.
    pub orphaned: u64,
}

/// A group together with its bundles and sub-groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupNode {
    pub group: Group,
    /// Bundles directly under this group, in natural name order.
    pub bundles: Vec<Bundle>,
    /// Sub-groups, in natural name order.
    pub children: Vec<GroupNode>,
}

impl GroupNode {
    fn build(
        group: Group,
        groups_by_parent: &mut HashMap<GroupId, Vec<Group>>,
        bundles_by_parent: &mut HashMap<GroupId, Vec<Bundle>>,
        depth: u32,
        stats: &mut CatalogStats,
    ) -> Self {
        stats.total_groups += 1;
        stats.max_depth = stats.max_depth.max(depth);

        let mut bundles = bundles_by_parent.remove(&group.id).unwrap_or_default();
        bundles.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        stats.total_bundles += bundles.len() as u64;
        stats.total_pages += bundles.iter().map(|b| b.page_count as u64).sum::<u64>();

        let mut child_groups = groups_by_parent.remove(&group.id).unwrap_or_default();
        child_groups.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        let children = child_groups
            .into_iter()
            .map(|child| {
                GroupNode::build(child, groups_by_parent, bundles_by_parent, depth + 1, stats)
            })
            .collect();

        Self {
            group,
            bundles,
            children,
        }
    }

    fn collect_bundles<'a>(&'a self, out: &mut Vec<&'a Bundle>) {
        out.extend(self.bundles.iter());
        for child in &self.children {
            child.collect_bundles(out);
        }
    }

    fn collect_groups<'a>(&'a self, out: &mut Vec<&'a Group>) {
        out.push(&self.group);
        for child in &self.children {
            child.collect_groups(out);
        }
    }
}

/// A library's catalog as a tree rooted at its root group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTree {
    pub root: GroupNode,
    pub stats: CatalogStats,
}

impl CatalogTree {
    /// Assemble a tree from the flat records of one library.
    ///
    /// Returns `None` when there is no root group (a group without parent).
    pub fn build(groups: Vec<Group>, bundles: Vec<Bundle>) -> Option<Self> {
        let mut root = None;
        let mut groups_by_parent: HashMap<GroupId, Vec<Group>> = HashMap::new();
        for group in groups {
            match group.parent_id.clone() {
                None if root.is_none() => root = Some(group),
                None => groups_by_parent.entry(GroupId::new("")).or_default().push(group),
                Some(parent) => groups_by_parent.entry(parent).or_default().push(group),
            }
        }
        let root = root?;

        let mut unparented = 0u64;
        let mut bundles_by_parent: HashMap<GroupId, Vec<Bundle>> = HashMap::new();
        for bundle in bundles {
            match bundle.parent_id.clone() {
                Some(parent) => bundles_by_parent.entry(parent).or_default().push(bundle),
                None => unparented += 1,
            }
        }

        let mut stats = CatalogStats::default();
        let root = GroupNode::build(root, &mut groups_by_parent, &mut bundles_by_parent, 0, &mut stats);

        stats.orphaned = unparented
            + groups_by_parent.values().map(|v| v.len() as u64).sum::<u64>()
            + bundles_by_parent.values().map(|v| v.len() as u64).sum::<u64>();

        Some(Self { root, stats })
    }

    /// Bundles in depth-first order (a group's own bundles before its sub-groups').
    pub fn flatten_bundles(&self) -> Vec<&Bundle> {
        let mut out = Vec::new();
        self.root.collect_bundles(&mut out);
        out
    }

    /// Groups in depth-first order, root first.
    pub fn flatten_groups(&self) -> Vec<&Group> {
        let mut out = Vec::new();
        self.root.collect_groups(&mut out);
        out
    }

    /// Root directory of the library.
    pub fn root_path(&self) -> &PathBuf {
        &self.root.group.path
    }
}
