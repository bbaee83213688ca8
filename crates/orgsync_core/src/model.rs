//! Organizational chart data model.
//!
//! The canonical in-memory shape produced by the normalizer. Every
//! collection is an ordered sequence here; legacy keyed-mapping encodings
//! never make it past [`crate::normalize`].

use crate::normalize;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The five top-level record collections of an [`OrgTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    /// `coordinators`
    Coordinators,
    /// `executives`
    Executives,
    /// `mainCoordinators`
    MainCoordinators,
    /// `management`
    Management,
    /// `cityPersonnel`
    CityPersonnel,
}

impl CollectionKind {
    /// All collections in document order.
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Coordinators,
        CollectionKind::Executives,
        CollectionKind::MainCoordinators,
        CollectionKind::Management,
        CollectionKind::CityPersonnel,
    ];

    /// Returns the key used for this collection in stored documents.
    pub fn key(&self) -> &'static str {
        match self {
            CollectionKind::Coordinators => "coordinators",
            CollectionKind::Executives => "executives",
            CollectionKind::MainCoordinators => "mainCoordinators",
            CollectionKind::Management => "management",
            CollectionKind::CityPersonnel => "cityPersonnel",
        }
    }

    /// Looks up a collection by its document key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A 2-D layout coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns this position moved down by `dy`.
    #[must_use]
    pub fn offset_y(self, dy: f64) -> Self {
        Self {
            x: self.x,
            y: self.y + dy,
        }
    }
}

/// Flat node id → position mapping.
pub type PositionMap = BTreeMap<String, Position>;

/// A leaf personnel record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    /// Unique id within the tree's id-space.
    pub id: String,
    /// Display name.
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub name: String,
    /// Job title.
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub title: String,
    /// Layout position, if the person is drawn as its own node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Free-form attributes, preserved verbatim.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Person {
    /// Creates a person with no position and no extra attributes.
    pub fn new(id: impl Into<String>, name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            title: title.into(),
            position: None,
            attributes: Map::new(),
        }
    }
}

/// A unit record: an organizational box on the chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Unique id within the tree's id-space.
    pub id: String,
    /// Display title.
    #[serde(default, deserialize_with = "normalize::deserialize_text")]
    pub title: String,
    /// Layout position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Nested units.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "normalize::deserialize_sub_units"
    )]
    pub sub_units: Option<Vec<Unit>>,
    /// Personnel attached to this unit.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "normalize::deserialize_people"
    )]
    pub people: Option<Vec<Person>>,
    /// Free-form attributes, preserved verbatim.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Unit {
    /// Creates a unit with no position, children or extra attributes.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            position: None,
            sub_units: None,
            people: None,
            attributes: Map::new(),
        }
    }

    /// Sets the position.
    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Appends a nested unit.
    #[must_use]
    pub fn with_sub_unit(mut self, unit: Unit) -> Self {
        self.sub_units.get_or_insert_with(Vec::new).push(unit);
        self
    }

    /// Appends a person.
    #[must_use]
    pub fn with_person(mut self, person: Person) -> Self {
        self.people.get_or_insert_with(Vec::new).push(person);
        self
    }

    /// Whether the chart can show an expanded detail node for this unit.
    pub fn supports_detail(&self) -> bool {
        self.people.as_ref().is_some_and(|p| !p.is_empty())
            || self.sub_units.as_ref().is_some_and(|u| !u.is_empty())
    }

    /// Nested units (empty slice if none).
    pub fn sub_units(&self) -> &[Unit] {
        self.sub_units.as_deref().unwrap_or(&[])
    }

    /// Attached people (empty slice if none).
    pub fn people(&self) -> &[Person] {
        self.people.as_deref().unwrap_or(&[])
    }
}

/// The canonical organizational dataset.
///
/// Deserializing an `OrgTree` runs the full normalizer, so legacy keyed
/// encodings are accepted anywhere a tree is decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgTree {
    /// Coordinator units.
    pub coordinators: Vec<Unit>,
    /// Executive units.
    pub executives: Vec<Unit>,
    /// Main coordinator units.
    pub main_coordinators: Vec<Unit>,
    /// Management units.
    pub management: Vec<Unit>,
    /// City personnel units.
    pub city_personnel: Vec<Unit>,
    /// Any other top-level keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrgTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the records of one collection.
    pub fn collection(&self, kind: CollectionKind) -> &[Unit] {
        match kind {
            CollectionKind::Coordinators => &self.coordinators,
            CollectionKind::Executives => &self.executives,
            CollectionKind::MainCoordinators => &self.main_coordinators,
            CollectionKind::Management => &self.management,
            CollectionKind::CityPersonnel => &self.city_personnel,
        }
    }

    /// Returns the records of one collection, mutably.
    pub fn collection_mut(&mut self, kind: CollectionKind) -> &mut Vec<Unit> {
        match kind {
            CollectionKind::Coordinators => &mut self.coordinators,
            CollectionKind::Executives => &mut self.executives,
            CollectionKind::MainCoordinators => &mut self.main_coordinators,
            CollectionKind::Management => &mut self.management,
            CollectionKind::CityPersonnel => &mut self.city_personnel,
        }
    }

    /// Iterates over every top-level record with its collection.
    pub fn units(&self) -> impl Iterator<Item = (CollectionKind, &Unit)> {
        CollectionKind::ALL
            .into_iter()
            .flat_map(move |kind| self.collection(kind).iter().map(move |u| (kind, u)))
    }

    /// Per-collection record counts.
    pub fn counts(&self) -> CollectionCounts {
        let mut counts = CollectionCounts::default();
        for kind in CollectionKind::ALL {
            counts.0.insert(kind, self.collection(kind).len());
        }
        counts
    }

    /// Returns true if every collection is empty.
    pub fn is_empty(&self) -> bool {
        CollectionKind::ALL
            .into_iter()
            .all(|kind| self.collection(kind).is_empty())
    }

    /// Visits every id in the tree: units, nested units and people.
    pub fn visit_ids<'a>(&'a self, mut f: impl FnMut(&'a str)) {
        fn walk<'a>(unit: &'a Unit, f: &mut impl FnMut(&'a str)) {
            f(&unit.id);
            for person in unit.people() {
                f(&person.id);
            }
            for sub in unit.sub_units() {
                walk(sub, f);
            }
        }
        for (_, unit) in self.units() {
            walk(unit, &mut f);
        }
    }

    /// Returns true if a unit or person with this id exists.
    pub fn contains_id(&self, id: &str) -> bool {
        let mut found = false;
        self.visit_ids(|candidate| found |= candidate == id);
        found
    }
}

impl<'de> Deserialize<'de> for OrgTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        normalize::normalize(value).map_err(serde::de::Error::custom)
    }
}

/// Record counts per top-level collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionCounts(pub BTreeMap<CollectionKind, usize>);

impl CollectionCounts {
    /// Count for one collection.
    pub fn get(&self, kind: CollectionKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Sum across all collections.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Collections whose counts differ between `self` and `other`.
    pub fn differing(&self, other: &CollectionCounts) -> Vec<CollectionKind> {
        CollectionKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind) != other.get(*kind))
            .collect()
    }
}

impl fmt::Display for CollectionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in CollectionKind::ALL {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", kind, self.get(kind))?;
        }
        Ok(())
    }
}

/// A routed link between two chart nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Handle on the source node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Handle on the target node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// Manual routing points; `None` means the route is computed.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "normalize::deserialize_waypoints"
    )]
    pub waypoints: Option<Vec<Position>>,
    /// Free-form attributes, preserved verbatim.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Connection {
    /// Creates an automatically routed connection.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            waypoints: None,
            attributes: Map::new(),
        }
    }
}
