use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::Value;

/// Name of the synthetic identity field. `Document::get(ID_FIELD)` yields the
/// store-assigned id as an integer value, so lookups and filters can address
/// the id like any other field.
pub const ID_FIELD: &str = "$id";

/// Field map of a document, without identity or metadata.
pub type Fields = BTreeMap<String, Value>;

/// Bookkeeping stamped onto every document by its collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub revision: u64,
}

impl DocMeta {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
            revision: 0,
        }
    }
}

/// A flat record with a store-assigned identity.
///
/// Documents are created by [`Collection::insert`](crate::store::Collection::insert)
/// and only mutated through collection operations; consumers of live queries
/// receive clones inside shared immutable snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub(crate) id: u64,
    pub(crate) meta: DocMeta,
    pub(crate) fields: Fields,
}

impl Document {
    pub(crate) fn new(id: u64, fields: Fields) -> Self {
        Self {
            id,
            meta: DocMeta::new(),
            fields,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn meta(&self) -> &DocMeta {
        &self.meta
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Read a field. `ID_FIELD` resolves to the document id, a missing field
    /// to `None`.
    pub fn get(&self, field: &str) -> Option<Value> {
        if field == ID_FIELD {
            return Some(Value::Integer(self.id as i64));
        }
        self.fields.get(field).cloned()
    }

    /// Copy of the document with `fields` replaced, keeping identity and
    /// metadata. Feed the result to `Collection::update`.
    pub fn with_fields(&self, fields: Fields) -> Self {
        Self {
            id: self.id,
            meta: self.meta.clone(),
            fields,
        }
    }

    /// Copy of the document with one field set.
    pub fn with_field(&self, field: &str, value: impl Into<Value>) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(field.to_string(), value.into());
        self.with_fields(fields)
    }

    pub(crate) fn matches_key(&self, field: &str, key: &Value) -> bool {
        self.get(field).as_ref() == Some(key)
    }
}

/// Build a [`Fields`] map from `"name" => value` pairs.
///
/// ```
/// use livedocs::fields;
/// let f = fields! { "name" => "Alice", "age" => 30 };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::core::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::core::Fields::new();
        $(map.insert($key.to_string(), $crate::core::Value::from($value));)+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_field_lookup() {
        let doc = Document::new(7, fields! { "name" => "Ada" });
        assert_eq!(doc.get(ID_FIELD), Some(Value::Integer(7)));
        assert_eq!(doc.get("name"), Some(Value::Text("Ada".into())));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn test_with_field_keeps_identity() {
        let doc = Document::new(3, fields! { "count" => 1 });
        let updated = doc.with_field("count", 2);
        assert_eq!(updated.id(), 3);
        assert_eq!(updated.get("count"), Some(Value::Integer(2)));
    }
}
