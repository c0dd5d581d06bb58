use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json, json};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::core::{DbError, Document, Result, Value};
use crate::store::view::SimpleSort;
use crate::store::{Collection, CollectionOptions, Find, FindValue, Pattern, ViewOptions};

/// Reserved marker key for tagged serialized values. An object of the form
/// `{ TYPE_KEY: { "type": <name>, "value": <canonical string> } }` is
/// reconstructed through the registered type's codec on read-back.
pub const TYPE_KEY: &str = "4b786861-238d-429b-b67f-a41645eaeffa";

/// Codec for one serializable type. `serialize` claims a filter value and
/// renders its canonical string form; `deserialize` parses that form back.
/// Both return `None` when the value is not theirs.
pub struct SerialType {
    pub serialize: Box<dyn Fn(&FindValue) -> Option<String> + Send + Sync>,
    pub deserialize: Box<dyn Fn(&str) -> Option<FindValue> + Send + Sync>,
}

/// Open registry of tagged serializable types, keyed by type name.
///
/// `RegExp` is built in. Unknown type names encountered during
/// deserialization are never an error: the tagged object passes through
/// unchanged, so data written by newer writers survives a round trip.
pub struct SerializableTypes {
    entries: RwLock<BTreeMap<String, SerialType>>,
}

impl SerializableTypes {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let types = Self::new();
        types.register(
            "RegExp",
            SerialType {
                serialize: Box::new(|value| match value {
                    FindValue::Regex(pattern) => Some(pattern.to_canonical()),
                    _ => None,
                }),
                deserialize: Box::new(|text| match Pattern::parse(text) {
                    Some(Ok(pattern)) => Some(FindValue::Regex(pattern)),
                    _ => None,
                }),
            },
        );
        types
    }

    pub fn register(&self, name: &str, codec: SerialType) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(name.to_string(), codec);
    }

    /// Tagged encoding for values a registered codec claims.
    fn encode_special(&self, value: &FindValue) -> Option<Json> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        for (name, codec) in entries.iter() {
            if let Some(canonical) = (codec.serialize)(value) {
                return Some(json!({
                    TYPE_KEY: { "type": name, "value": canonical }
                }));
            }
        }
        None
    }

    /// Reconstruct a tagged object; `None` when the tag is unknown or
    /// malformed (the caller passes the object through unchanged).
    fn decode_tagged(&self, object: &Map<String, Json>) -> Option<FindValue> {
        if object.len() != 1 {
            return None;
        }
        let inner = object.get(TYPE_KEY)?.as_object()?;
        let type_name = inner.get("type")?.as_str()?;
        let canonical = inner.get("value")?.as_str()?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let codec = entries.get(type_name)?;
        (codec.deserialize)(canonical)
    }
}

impl Default for SerializableTypes {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ----------------------------------------------------------------------
// Filter value <-> JSON
// ----------------------------------------------------------------------

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(i) => json!(i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s.clone()),
        Value::Boolean(b) => Json::Bool(*b),
    }
}

fn json_to_value(json: &Json) -> Result<Value> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else {
                Ok(Value::Float(n.as_f64().unwrap_or(f64::NAN)))
            }
        }
        Json::String(s) => Ok(Value::Text(s.clone())),
        other => Err(DbError::SerializationError(format!(
            "expected a scalar, got {}",
            other
        ))),
    }
}

fn encode_find_value(types: &SerializableTypes, value: &FindValue) -> Json {
    if let Some(tagged) = types.encode_special(value) {
        return tagged;
    }
    match value {
        FindValue::Value(v) => value_to_json(v),
        FindValue::Regex(pattern) => {
            // no codec claimed the pattern; keep at least the canonical text
            log::warn!("no serializable type registered for patterns");
            Json::String(pattern.to_canonical())
        }
        FindValue::List(values) => Json::Array(values.iter().map(value_to_json).collect()),
        FindValue::Ops(ops) => {
            let mut object = Map::new();
            for (key, nested) in ops {
                object.insert(key.clone(), encode_find_value(types, nested));
            }
            Json::Object(object)
        }
    }
}

fn decode_find_value(types: &SerializableTypes, json: &Json) -> FindValue {
    match json {
        Json::Object(object) => {
            if let Some(decoded) = types.decode_tagged(object) {
                return decoded;
            }
            // plain operator map, or an unrecognized tag passing through
            let mut ops = BTreeMap::new();
            for (key, nested) in object {
                ops.insert(key.clone(), decode_find_value(types, nested));
            }
            FindValue::Ops(ops)
        }
        Json::Array(items) => FindValue::List(
            items
                .iter()
                .map(|item| json_to_value(item).unwrap_or(Value::Null))
                .collect(),
        ),
        other => match json_to_value(other) {
            Ok(value) => FindValue::Value(value),
            Err(_) => {
                log::warn!("unsupported filter value {}, keeping text form", other);
                FindValue::Value(Value::Text(other.to_string()))
            }
        },
    }
}

pub(crate) fn find_to_json(types: &SerializableTypes, find: &Find) -> Json {
    let mut object = Map::new();
    for (field, value) in &find.0 {
        object.insert(field.clone(), encode_find_value(types, value));
    }
    Json::Object(object)
}

pub(crate) fn find_from_json(types: &SerializableTypes, json: &Json) -> Result<Find> {
    let Json::Object(object) = json else {
        return Err(DbError::SerializationError(format!(
            "find filter must be an object, got {}",
            json
        )));
    };
    let mut find = Find::new();
    for (field, value) in object {
        find.0.insert(field.clone(), decode_find_value(types, value));
    }
    Ok(find)
}

// ----------------------------------------------------------------------
// Persisted database shape
// ----------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
pub(crate) struct DbState {
    pub name: String,
    pub collections: Vec<CollectionState>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct CollectionState {
    pub name: String,
    pub unique: Vec<String>,
    pub disable_freeze: bool,
    pub next_id: u64,
    pub docs: Vec<Document>,
    pub views: Vec<ViewState>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct ViewState {
    pub name: String,
    pub filters: Vec<FilterState>,
    pub sort: Option<SimpleSort>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct FilterState {
    pub uid: String,
    pub find: Json,
}

pub(crate) fn collection_state(
    collection: &Arc<Collection>,
    types: &SerializableTypes,
) -> CollectionState {
    let views = collection
        .dynamic_views()
        .into_iter()
        .map(|view| {
            let filters = view
                .find_filters()
                .into_iter()
                .filter_map(|(uid, find)| match find {
                    Some(find) => Some(FilterState {
                        uid,
                        find: find_to_json(types, &find),
                    }),
                    None => {
                        log::warn!(
                            "skipping function filter '{}' of view '{}': not serializable",
                            uid,
                            view.name()
                        );
                        None
                    }
                })
                .collect();
            let sort = view.get_simple_sort();
            ViewState {
                name: view.name().to_string(),
                filters,
                sort: if sort.field.is_empty() { None } else { Some(sort) },
            }
        })
        .collect();

    CollectionState {
        name: collection.name().to_string(),
        unique: collection.unique_fields().to_vec(),
        disable_freeze: collection.disable_freeze(),
        next_id: collection.peek_next_id(),
        docs: collection.doc_snapshot(),
        views,
    }
}

pub(crate) fn restore_collection(
    state: CollectionState,
    types: &SerializableTypes,
) -> Result<Arc<Collection>> {
    let options = CollectionOptions {
        unique: state.unique,
        disable_freeze: state.disable_freeze,
    };
    let collection = Collection::restore(&state.name, options, state.next_id, state.docs)?;
    for view_state in state.views {
        let view = collection.add_dynamic_view(
            &view_state.name,
            ViewOptions {
                simple_sort: view_state.sort,
            },
        );
        for filter in view_state.filters {
            view.apply_find(&filter.uid, find_from_json(types, &filter.find)?);
        }
    }
    Ok(collection)
}
