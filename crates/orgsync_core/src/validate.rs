//! Consistency checks across a tree and its satellite data.
//!
//! None of these checks reject data; they only report. The engine keeps
//! orphaned positions on purpose, since a node can be recreated later.

use crate::model::{Connection, OrgTree, PositionMap};
use crate::positions::{detail_parent, orphaned_positions};
use std::collections::{BTreeMap, BTreeSet};

/// Findings of [`validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Ids used by more than one record.
    pub duplicate_ids: Vec<String>,
    /// Position ids matching no record.
    pub orphaned_positions: Vec<String>,
    /// Connections with a missing endpoint, as `(source, target)`.
    pub dangling_connections: Vec<(String, String)>,
}

impl ValidationReport {
    /// Returns true if nothing was found.
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty()
            && self.orphaned_positions.is_empty()
            && self.dangling_connections.is_empty()
    }
}

/// Ids that appear on more than one unit or person.
pub fn duplicate_ids(tree: &OrgTree) -> Vec<String> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    tree.visit_ids(|id| *seen.entry(id).or_insert(0) += 1);
    seen.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Connections whose source or target is not a node of the tree.
pub fn dangling_connections<'c>(tree: &OrgTree, connections: &'c [Connection]) -> Vec<&'c Connection> {
    let mut ids = BTreeSet::new();
    tree.visit_ids(|id| {
        ids.insert(id);
    });
    let known = |id: &str| ids.contains(id) || detail_parent(id).is_some_and(|p| ids.contains(p));

    connections
        .iter()
        .filter(|c| !known(&c.source) || !known(&c.target))
        .collect()
}

/// Runs every check that the available data allows.
pub fn validate(
    tree: &OrgTree,
    positions: Option<&PositionMap>,
    connections: Option<&[Connection]>,
) -> ValidationReport {
    ValidationReport {
        duplicate_ids: duplicate_ids(tree),
        orphaned_positions: positions
            .map(|p| orphaned_positions(tree, p))
            .unwrap_or_default(),
        dangling_connections: connections
            .map(|c| {
                dangling_connections(tree, c)
                    .into_iter()
                    .map(|c| (c.source.clone(), c.target.clone()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}
