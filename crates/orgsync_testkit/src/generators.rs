//! Property-based test generators using proptest.
//!
//! Generated trees keep the id-uniqueness invariant: ids are derived from
//! the record's place in the tree, never drawn at random.

use orgsync_core::{CollectionKind, OrgTree, Person, Position, PositionMap, Unit};
use proptest::prelude::*;

/// Strategy for generating coordinates on a plausible canvas.
pub fn position_strategy() -> impl Strategy<Value = Position> {
    (-2000i32..2000, -2000i32..2000).prop_map(|(x, y)| Position::new(f64::from(x), f64::from(y)))
}

/// Strategy for generating position maps over short ids.
pub fn position_map_strategy() -> impl Strategy<Value = PositionMap> {
    prop::collection::btree_map("[a-z]{1,6}", position_strategy(), 0..12)
}

/// Shape of one generated unit before ids are assigned.
#[derive(Debug, Clone)]
struct UnitShape {
    position: Option<Position>,
    sub_units: Vec<Option<Position>>,
    people: usize,
}

fn unit_shape_strategy() -> impl Strategy<Value = UnitShape> {
    (
        prop::option::of(position_strategy()),
        prop::collection::vec(prop::option::of(position_strategy()), 0..3),
        0usize..3,
    )
        .prop_map(|(position, sub_units, people)| UnitShape {
            position,
            sub_units,
            people,
        })
}

fn build_unit(id: String, shape: UnitShape) -> Unit {
    let mut unit = Unit::new(id.clone(), format!("Unit {id}"));
    unit.position = shape.position;
    for (i, position) in shape.sub_units.into_iter().enumerate() {
        let mut sub = Unit::new(format!("{id}-s{i}"), format!("Sub-unit {i}"));
        sub.position = position;
        unit = unit.with_sub_unit(sub);
    }
    for i in 0..shape.people {
        unit = unit.with_person(Person::new(format!("{id}-p{i}"), format!("Person {i}"), "Staff"));
    }
    unit
}

/// Strategy for generating trees with unique ids across all collections.
pub fn org_tree_strategy() -> impl Strategy<Value = OrgTree> {
    prop::collection::vec(prop::collection::vec(unit_shape_strategy(), 0..4), 5).prop_map(
        |collections| {
            let mut tree = OrgTree::new();
            for (kind, shapes) in CollectionKind::ALL.into_iter().zip(collections) {
                let units = tree.collection_mut(kind);
                for (i, shape) in shapes.into_iter().enumerate() {
                    units.push(build_unit(format!("{}-{i}", kind.key()), shape));
                }
            }
            tree
        },
    )
}
