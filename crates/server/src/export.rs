//! JSON export of downloaded collections.

use crate::error::ExportError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

/// Rebuild every object with its keys in sorted order.
///
/// `serde_json::Map` is already ordered unless `preserve_order` is enabled
/// somewhere in the dependency graph, in which case insertion order wins;
/// inserting sorted keeps the output stable either way.
pub fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Pretty-print with a four space indent.
pub fn to_pretty_json(value: &Value) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `items` as a sorted, pretty-printed JSON array, replacing any existing file.
#[tracing::instrument(skip(items), fields(count = items.len()))]
pub async fn write_collection(path: &str, items: &[Value]) -> Result<(), ExportError> {
    let value = sort_keys(Value::Array(items.to_vec()));
    let json = to_pretty_json(&value)?;
    tokio::fs::write(Path::new(path), json)
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_string(),
            source,
        })?;
    info!("Wrote {path}");
    Ok(())
}
