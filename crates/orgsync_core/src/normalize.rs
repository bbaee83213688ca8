//! Schema normalizer.
//!
//! Stores have written the same logical collections in two encodings over
//! time: an ordered sequence, and a keyed mapping produced by writes that do
//! not preserve array identity. Both are decoded here, once, into the
//! canonical [`OrgTree`] shape:
//!
//! ```text
//! "coordinators": [ {..}, {..} ]              -> Sequence
//! "coordinators": { "x1": {..}, "x2": {..} }  -> Keyed (key order kept)
//! "coordinators": null / missing              -> Absent (empty)
//! ```
//!
//! `null` holes in a sequence are left behind by sparse writes and are
//! skipped. Anything else (a string, a number) is a [`CoreError::MalformedTree`].

use crate::error::{CoreError, CoreResult};
use crate::model::{CollectionKind, Connection, OrgTree, Position, PositionMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

/// The encodings accepted for a record collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEncoding {
    /// Missing or `null`.
    Absent,
    /// An ordered sequence.
    Sequence(Vec<Value>),
    /// A keyed mapping, in the store's key iteration order.
    Keyed(Map<String, Value>),
}

impl CollectionEncoding {
    /// Classifies a raw collection value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedTree`] for scalars.
    pub fn classify(path: &str, value: Value) -> CoreResult<Self> {
        match value {
            Value::Null => Ok(Self::Absent),
            Value::Array(items) => Ok(Self::Sequence(items)),
            Value::Object(map) => Ok(Self::Keyed(map)),
            other => Err(CoreError::malformed(
                path,
                format!(
                    "expected sequence or keyed mapping, got {}",
                    type_name(&other)
                ),
            )),
        }
    }

    /// Returns true for the legacy keyed-mapping encoding.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed(_))
    }

    /// Decodes entries together with their keys.
    ///
    /// Sequence entries are keyed by their index.
    pub fn decode_keyed<T: DeserializeOwned>(self, path: &str) -> CoreResult<Vec<(String, T)>> {
        let entries: Vec<(String, Value)> = match self {
            Self::Absent => return Ok(Vec::new()),
            Self::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Self::Keyed(map) => map.into_iter().collect(),
        };

        entries
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| {
                let record = serde_json::from_value(value)
                    .map_err(|e| CoreError::malformed(format!("{path}[{key}]"), e.to_string()))?;
                Ok((key, record))
            })
            .collect()
    }

    /// Decodes entries into an ordered sequence, dropping keys.
    pub fn decode<T: DeserializeOwned>(self, path: &str) -> CoreResult<Vec<T>> {
        Ok(self
            .decode_keyed(path)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Normalizes a decoded payload into a canonical [`OrgTree`].
///
/// Missing collections become empty sequences. Top-level keys that are not
/// collections are carried in [`OrgTree::extra`]. Pure; normalizing an
/// already canonical tree returns an equal tree.
///
/// # Errors
///
/// Returns [`CoreError::MalformedTree`] if the root is not a mapping, a
/// collection is a scalar, or a record cannot be decoded.
pub fn normalize(value: Value) -> CoreResult<OrgTree> {
    let root = match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(CoreError::malformed(
                "<root>",
                format!("expected mapping, got {}", type_name(&other)),
            ))
        }
    };

    let mut raw: Vec<(CollectionKind, Value)> = Vec::with_capacity(CollectionKind::ALL.len());
    let mut extra = Map::new();
    for (key, value) in root {
        match CollectionKind::from_key(&key) {
            Some(kind) => raw.push((kind, value)),
            None => {
                extra.insert(key, value);
            }
        }
    }

    let mut tree = OrgTree::new();
    for (kind, value) in raw {
        let encoding = CollectionEncoding::classify(kind.key(), value)?;
        if encoding.is_keyed() {
            debug!(collection = kind.key(), "converting keyed mapping to sequence");
        }
        *tree.collection_mut(kind) = encoding.decode(kind.key())?;
    }
    tree.extra = extra;

    Ok(tree)
}

/// Normalizes a JSON document into a canonical [`OrgTree`].
pub fn normalize_str(json: &str) -> CoreResult<OrgTree> {
    let value: Value = serde_json::from_str(json)?;
    normalize(value)
}

/// Normalizes a position mapping.
///
/// Accepts the same encodings as collections: stores that coerce
/// integer-like keys may hand back a sequence.
pub fn normalize_positions(value: Value) -> CoreResult<PositionMap> {
    let encoding = CollectionEncoding::classify("positions", value)?;
    Ok(encoding
        .decode_keyed::<Position>("positions")?
        .into_iter()
        .collect())
}

/// Normalizes a connection list.
pub fn normalize_connections(value: Value) -> CoreResult<Vec<Connection>> {
    CollectionEncoding::classify("connections", value)?.decode("connections")
}

/// Decodes a nested collection, labelling errors with its field name.
fn decode_nested<'de, D, T>(field: &str, deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    CollectionEncoding::classify(field, value)
        .and_then(|encoding| encoding.decode(field))
        .map(Some)
        .map_err(|e| match e {
            // The enclosing record adds the "malformed tree" prefix.
            CoreError::MalformedTree { collection, reason } => {
                serde::de::Error::custom(format!("{collection}: {reason}"))
            }
            other => serde::de::Error::custom(other),
        })
}

/// `deserialize_with` helper for `subUnits`, which is subject to the same
/// legacy encodings as top-level collections.
pub(crate) fn deserialize_sub_units<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    decode_nested("subUnits", deserializer)
}

/// `deserialize_with` helper for `people`.
pub(crate) fn deserialize_people<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    decode_nested("people", deserializer)
}

/// `deserialize_with` helper for connection `waypoints`.
pub(crate) fn deserialize_waypoints<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    decode_nested("waypoints", deserializer)
}

/// `deserialize_with` helper for text fields: `null` reads as empty.
pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
