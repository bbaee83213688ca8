//! Position reconciler.
//!
//! Layout coordinates live in two shapes: embedded `position` fields on
//! tree records, and a flat id → position map kept by the realtime store.
//! The map is a projection of the tree plus synthetic entries for expanded
//! detail nodes:
//!
//! ```text
//! unit "ops" at (x, y)  ->  "ops"        : (x, y)
//!                           "ops-detail" : (x, y + 200)
//! ```
//!
//! Detail entries only ever flow from tree to map.

use crate::model::{CollectionKind, OrgTree, Position, PositionMap, Unit};
use std::collections::BTreeSet;

/// Vertical distance between a unit and its expanded detail node.
pub const DETAIL_OFFSET_Y: f64 = 200.0;

/// Suffix appended to a parent id to form its detail-node id.
pub const DETAIL_SUFFIX: &str = "-detail";

/// Returns the detail-node id for a parent id.
pub fn detail_id(parent_id: &str) -> String {
    format!("{parent_id}{DETAIL_SUFFIX}")
}

/// Returns the parent id if `id` names a detail node.
pub fn detail_parent(id: &str) -> Option<&str> {
    id.strip_suffix(DETAIL_SUFFIX).filter(|parent| !parent.is_empty())
}

/// Returns the position of a detail node derived from its parent.
pub fn detail_position(parent: Position) -> Position {
    parent.offset_y(DETAIL_OFFSET_Y)
}

/// A position field that [`apply_positions`] overwrote.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    /// Record id.
    pub id: String,
    /// Value before the write, if the record had one.
    pub before: Option<Position>,
    /// Value written.
    pub after: Position,
}

/// Projects a tree onto a flat position map.
///
/// Every unit or person carrying a `position` contributes its own entry.
/// Each positioned unit that supports an expanded view also contributes a
/// detail entry, unless a real record already owns that id.
pub fn extract_positions(tree: &OrgTree) -> PositionMap {
    let mut positions = PositionMap::new();
    let mut details = Vec::new();

    fn walk(unit: &Unit, positions: &mut PositionMap, details: &mut Vec<(String, Position)>) {
        if let Some(position) = unit.position {
            positions.insert(unit.id.clone(), position);
            if unit.supports_detail() {
                details.push((detail_id(&unit.id), detail_position(position)));
            }
        }
        for person in unit.people() {
            if let Some(position) = person.position {
                positions.insert(person.id.clone(), position);
            }
        }
        for sub in unit.sub_units() {
            walk(sub, positions, details);
        }
    }

    for (_, unit) in tree.units() {
        walk(unit, &mut positions, &mut details);
    }

    for (id, position) in details {
        positions.entry(id).or_insert(position);
    }

    positions
}

/// Writes incoming positions into the tree's `position` fields.
///
/// A record is touched only when `positions` holds its id and the
/// coordinates differ from the current value. Returns the changes made.
pub fn apply_positions_in_place(tree: &mut OrgTree, positions: &PositionMap) -> Vec<PositionChange> {
    let mut changes = Vec::new();

    fn update(
        id: &str,
        slot: &mut Option<Position>,
        positions: &PositionMap,
        changes: &mut Vec<PositionChange>,
    ) {
        if let Some(incoming) = positions.get(id) {
            if *slot != Some(*incoming) {
                changes.push(PositionChange {
                    id: id.to_string(),
                    before: *slot,
                    after: *incoming,
                });
                *slot = Some(*incoming);
            }
        }
    }

    fn walk(unit: &mut Unit, positions: &PositionMap, changes: &mut Vec<PositionChange>) {
        update(&unit.id, &mut unit.position, positions, changes);
        if let Some(people) = unit.people.as_mut() {
            for person in people.iter_mut() {
                update(&person.id, &mut person.position, positions, changes);
            }
        }
        if let Some(subs) = unit.sub_units.as_mut() {
            for sub in subs.iter_mut() {
                walk(sub, positions, changes);
            }
        }
    }

    for kind in CollectionKind::ALL {
        for unit in tree.collection_mut(kind).iter_mut() {
            walk(unit, positions, &mut changes);
        }
    }

    changes
}

/// Returns a copy of `tree` with `positions` applied.
pub fn apply_positions(tree: &OrgTree, positions: &PositionMap) -> OrgTree {
    let mut updated = tree.clone();
    apply_positions_in_place(&mut updated, positions);
    updated
}

/// Merges two position maps.
///
/// The result holds the union of both key sets. Where both sides have an
/// entry, `source` wins: precedence comes from transfer direction since no
/// timestamps are tracked. Entries for ids unknown to any tree are kept.
pub fn reconcile(destination: &PositionMap, source: &PositionMap) -> PositionMap {
    let mut merged = destination.clone();
    for (id, position) in source {
        merged.insert(id.clone(), *position);
    }
    merged
}

/// Ids whose value in `source` differs from (or is missing in) `destination`.
pub fn changed_ids(destination: &PositionMap, source: &PositionMap) -> Vec<String> {
    source
        .iter()
        .filter(|(id, position)| destination.get(id.as_str()) != Some(position))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Position ids that match no record of the tree.
///
/// A detail id counts as matched while its parent exists.
pub fn orphaned_positions(tree: &OrgTree, positions: &PositionMap) -> Vec<String> {
    let mut ids = BTreeSet::new();
    tree.visit_ids(|id| {
        ids.insert(id);
    });

    positions
        .keys()
        .filter(|id| {
            !ids.contains(id.as_str())
                && !detail_parent(id).is_some_and(|parent| ids.contains(parent))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Person;
    use proptest::prelude::*;

    fn map(entries: &[(&str, f64, f64)]) -> PositionMap {
        entries
            .iter()
            .map(|(id, x, y)| (id.to_string(), Position::new(*x, *y)))
            .collect()
    }

    fn sample_tree() -> OrgTree {
        let mut tree = OrgTree::new();
        tree.coordinators.push(
            Unit::new("a", "A")
                .with_position(Position::new(10.0, 20.0))
                .with_person(Person::new("p1", "Ana", "Lead")),
        );
        tree.executives.push(Unit::new("e", "E"));
        tree.management.push(
            Unit::new("m", "M")
                .with_position(Position::new(0.0, 0.0))
                .with_sub_unit(Unit::new("s", "S").with_position(Position::new(5.0, 5.0))),
        );
        tree
    }

    #[test]
    fn extract_adds_detail_nodes_for_expandable_units() {
        let positions = extract_positions(&sample_tree());
        assert_eq!(positions["a"], Position::new(10.0, 20.0));
        assert_eq!(positions["a-detail"], Position::new(10.0, 220.0));
        assert_eq!(positions["m-detail"], Position::new(0.0, 200.0));
        assert_eq!(positions["s"], Position::new(5.0, 5.0));
        assert!(!positions.contains_key("s-detail"));
        assert!(!positions.contains_key("e"));
    }

    #[test]
    fn detail_entry_never_shadows_real_node() {
        let mut tree = sample_tree();
        tree.city_personnel
            .push(Unit::new("a-detail", "Real").with_position(Position::new(1.0, 1.0)));
        let positions = extract_positions(&tree);
        assert_eq!(positions["a-detail"], Position::new(1.0, 1.0));
    }

    #[test]
    fn apply_only_touches_differing_records() {
        let mut tree = sample_tree();
        let incoming = map(&[("a", 10.0, 20.0), ("s", 7.0, 8.0), ("p1", 1.0, 2.0), ("zz", 0.0, 0.0)]);
        let changes = apply_positions_in_place(&mut tree, &incoming);

        let ids: Vec<_> = changes.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "s"]);
        assert_eq!(changes[0].before, None);
        assert_eq!(changes[1].before, Some(Position::new(5.0, 5.0)));
        assert_eq!(tree.management[0].sub_units()[0].position, Some(Position::new(7.0, 8.0)));
    }

    #[test]
    fn detail_ids_are_not_written_back() {
        let tree = sample_tree();
        let updated = apply_positions(&tree, &map(&[("a-detail", 99.0, 99.0)]));
        assert_eq!(updated, tree);
    }

    #[test]
    fn reconcile_prefers_source_and_keeps_orphans() {
        let destination = map(&[("a", 50.0, 20.0), ("b", 0.0, 0.0)]);
        let source = map(&[("a", 10.0, 20.0)]);
        let merged = reconcile(&destination, &source);
        assert_eq!(merged, map(&[("a", 10.0, 20.0), ("b", 0.0, 0.0)]));
    }

    #[test]
    fn changed_ids_lists_new_and_moved() {
        let destination = map(&[("a", 1.0, 1.0), ("b", 2.0, 2.0)]);
        let source = map(&[("a", 1.0, 1.0), ("b", 3.0, 2.0), ("c", 0.0, 0.0)]);
        assert_eq!(changed_ids(&destination, &source), vec!["b", "c"]);
    }

    #[test]
    fn orphans_exclude_live_detail_nodes() {
        let tree = sample_tree();
        let positions = map(&[("a", 0.0, 0.0), ("a-detail", 0.0, 0.0), ("gone", 0.0, 0.0), ("gone-detail", 0.0, 0.0)]);
        assert_eq!(orphaned_positions(&tree, &positions), vec!["gone", "gone-detail"]);
    }

    #[test]
    fn detail_parent_parsing() {
        assert_eq!(detail_parent("ops-detail"), Some("ops"));
        assert_eq!(detail_parent("-detail"), None);
        assert_eq!(detail_parent("ops"), None);
    }

    fn position_map() -> impl Strategy<Value = PositionMap> {
        prop::collection::btree_map(
            "[a-z]{1,4}",
            (-1000i32..1000, -1000i32..1000).prop_map(|(x, y)| Position::new(x.into(), y.into())),
            0..12,
        )
    }

    proptest! {
        #[test]
        fn reconcile_identities(a in position_map()) {
            prop_assert_eq!(reconcile(&a, &a), a.clone());
            prop_assert_eq!(reconcile(&a, &PositionMap::new()), a);
        }

        #[test]
        fn detail_offset_is_fixed(x in -1e6f64..1e6, y in -1e6f64..1e6) {
            let derived = detail_position(Position::new(x, y));
            prop_assert_eq!(derived, Position::new(x, y + 200.0));
        }

        #[test]
        fn apply_then_extract_keeps_overrides(p in position_map()) {
            let mut tree = OrgTree::new();
            for id in p.keys() {
                tree.coordinators.push(Unit::new(id.clone(), "unit"));
            }
            let extracted = extract_positions(&apply_positions(&tree, &p));
            for (id, position) in &p {
                prop_assert_eq!(extracted.get(id), Some(position));
            }
        }
    }
}
