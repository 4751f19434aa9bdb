//! Resource items and the per-integration capability contract.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use super::error::{AuthoringError, Result};
use super::status::Status;

/// Origin path used for items that only exist on the remote service.
pub const REMOTE_PATH: &str = "Remote";

/// On-disk format of a declarative resource file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Yaml,
    Json,
}

/// Capabilities an integration provides so a single engine can reconcile it.
///
/// A declarative file is a top-level mapping from resource name to a
/// service-specific payload. The engine never looks inside the payload; it
/// only asks the schema for an identifier, an equality verdict, and a
/// serializer.
pub trait ResourceSchema: Send + Sync + 'static {
    type Payload: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Service name shown in reports (e.g. "leaderboards").
    fn service(&self) -> &str;

    /// Resource type shown in reports (e.g. "Leaderboard").
    fn type_name(&self) -> &str;

    /// File extension without the leading dot.
    fn file_extension(&self) -> &str;

    fn format(&self) -> FileFormat {
        FileFormat::Yaml
    }

    /// Identifier used to match local and remote resources.
    fn identifier(&self, name: &str, _payload: &Self::Payload) -> String {
        name.to_string()
    }

    /// Structural equality between a local and a remote payload.
    fn content_eq(&self, local: &Self::Payload, remote: &Self::Payload) -> bool;

    /// Serializes entries of one file, preserving their order.
    fn serialize(&self, entries: &[(&str, &Self::Payload)]) -> Result<String> {
        serialize_entries(self.format(), entries)
    }

    /// Parses a file into `(name, payload)` entries in document order.
    fn deserialize(&self, text: &str, path: &Path) -> Result<Vec<(String, Self::Payload)>> {
        deserialize_entries(self.format(), text, path)
    }
}

/// Writes `name -> payload` entries as a single mapping document.
pub fn serialize_entries<P: Serialize>(
    format: FileFormat,
    entries: &[(&str, &P)],
) -> Result<String> {
    match format {
        FileFormat::Yaml => {
            let mut mapping = serde_yaml::Mapping::new();
            for (name, payload) in entries {
                let value = serde_yaml::to_value(payload)
                    .map_err(|e| AuthoringError::Serialize(e.to_string()))?;
                mapping.insert(serde_yaml::Value::String((*name).to_string()), value);
            }
            serde_yaml::to_string(&mapping).map_err(|e| AuthoringError::Serialize(e.to_string()))
        }
        FileFormat::Json => {
            let mut map = serde_json::Map::new();
            for (name, payload) in entries {
                let value = serde_json::to_value(payload)
                    .map_err(|e| AuthoringError::Serialize(e.to_string()))?;
                map.insert((*name).to_string(), value);
            }
            let mut text = serde_json::to_string_pretty(&serde_json::Value::Object(map))
                .map_err(|e| AuthoringError::Serialize(e.to_string()))?;
            text.push('\n');
            Ok(text)
        }
    }
}

/// Reads a mapping document into ordered entries.
///
/// An empty document yields no entries.
pub fn deserialize_entries<P: DeserializeOwned>(
    format: FileFormat,
    text: &str,
    path: &Path,
) -> Result<Vec<(String, P)>> {
    match format {
        FileFormat::Yaml => deserialize_yaml(text, path),
        FileFormat::Json => deserialize_json(text, path),
    }
}

fn parse_error(path: &Path, message: String) -> AuthoringError {
    AuthoringError::ParseContent {
        path: path.to_path_buf(),
        message,
    }
}

fn deserialize_yaml<P: DeserializeOwned>(text: &str, path: &Path) -> Result<Vec<(String, P)>> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| parse_error(path, e.to_string()))?;

    let mapping = match document {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => {
            return Err(parse_error(
                path,
                format!(
                    "expected a mapping of resource name to definition, found {}",
                    value_kind(&other)
                ),
            ))
        }
    };

    let mut entries = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            serde_yaml::Value::String(name) => name,
            other => {
                return Err(parse_error(
                    path,
                    format!("resource names must be strings, found {}", value_kind(&other)),
                ))
            }
        };
        let payload: P = serde_yaml::from_value(value)
            .map_err(|e| parse_error(path, format!("resource '{}': {}", name, e)))?;
        entries.push((name, payload));
    }

    Ok(entries)
}

fn deserialize_json<P: DeserializeOwned>(text: &str, path: &Path) -> Result<Vec<(String, P)>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: serde_json::Value =
        serde_json::from_str(text).map_err(|e| parse_error(path, e.to_string()))?;

    let map = match document {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Object(map) => map,
        other => {
            return Err(parse_error(
                path,
                format!(
                    "expected a mapping of resource name to definition, found {}",
                    json_kind(&other)
                ),
            ))
        }
    };

    let mut entries = Vec::with_capacity(map.len());
    for (name, value) in map {
        let payload: P = serde_json::from_value(value)
            .map_err(|e| parse_error(path, format!("resource '{}': {}", name, e)))?;
        entries.push((name, payload));
    }

    Ok(entries)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}

fn value_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

/// One resource taking part in a deploy or fetch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem<P> {
    /// Identifier, unique within one accepted run.
    pub id: String,
    /// Display name.
    pub name: String,
    /// File the item was loaded from, or [`REMOTE_PATH`].
    pub path: PathBuf,
    /// The payload; absent only when the file failed to load.
    #[serde(skip)]
    pub content: Option<P>,
    /// Server-side handle copied from the remote listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<String>,
    pub status: Status,
}

impl<P> ResourceItem<P> {
    /// Creates an item loaded from a local file.
    pub fn local(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        content: P,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            content: Some(content),
            remote_ref: None,
            status: Status::pending(),
        }
    }

    /// Creates an item returned by a remote listing.
    pub fn remote(id: impl Into<String>, name: impl Into<String>, content: P) -> Self {
        Self::local(id, name, REMOTE_PATH, content)
    }

    /// Creates an item standing for a file that could not be loaded.
    pub fn failed(path: impl Into<PathBuf>, status: Status) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: name.clone(),
            name,
            path,
            content: None,
            remote_ref: None,
            status,
        }
    }

    /// Sets the server-side handle.
    pub fn with_remote_ref(mut self, remote_ref: impl Into<String>) -> Self {
        self.remote_ref = Some(remote_ref.into());
        self
    }

    pub fn is_remote(&self) -> bool {
        self.path.as_os_str() == REMOTE_PATH
    }

    pub fn content(&self) -> Option<&P> {
        self.content.as_ref()
    }
}

impl<P> std::fmt::Display for ResourceItem<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_remote() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} in '{}'", self.name, self.path.display())
        }
    }
}

/// A schema for integrations whose payload is free-form structured data.
///
/// Equality is structural equality of the parsed JSON value, so key order and
/// formatting differences in the file do not count as changes.
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    service: String,
    type_name: String,
    extension: String,
    format: FileFormat,
}

impl DocumentSchema {
    pub fn new(
        service: impl Into<String>,
        type_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            type_name: type_name.into(),
            extension: extension.into(),
            format: FileFormat::Yaml,
        }
    }

    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }
}

impl ResourceSchema for DocumentSchema {
    type Payload = serde_json::Value;

    fn service(&self) -> &str {
        &self.service
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn file_extension(&self) -> &str {
        &self.extension
    }

    fn format(&self) -> FileFormat {
        self.format
    }

    fn content_eq(&self, local: &Self::Payload, remote: &Self::Payload) -> bool {
        local == remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> DocumentSchema {
        DocumentSchema::new("leaderboards", "Leaderboard", "lb")
    }

    #[test]
    fn test_deserialize_compound_file_keeps_order() {
        let text = "zeta:\n  sortOrder: asc\nalpha:\n  sortOrder: desc\n";
        let entries = schema().deserialize(text, Path::new("boards.lb")).unwrap();

        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(entries[1].1, json!({"sortOrder": "desc"}));
    }

    #[test]
    fn test_deserialize_empty_document() {
        let entries = schema().deserialize("", Path::new("empty.lb")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_sequence() {
        let err = schema()
            .deserialize("- a\n- b\n", Path::new("list.lb"))
            .unwrap_err();
        assert!(err.is_content_error());
        assert!(err.to_string().contains("list.lb"));
        assert!(err.to_string().contains("a sequence"));
    }

    #[test]
    fn test_deserialize_accepts_json() {
        let text = r#"{"daily": {"resetHour": 4}}"#;
        let entries = schema().deserialize(text, Path::new("daily.lb")).unwrap();
        assert_eq!(entries, vec![("daily".to_string(), json!({"resetHour": 4}))]);
    }

    #[test]
    fn test_serialize_then_parse_preserves_content() {
        let a = json!({"tiers": [1, 2, 3]});
        let b = json!({"enabled": true});
        let text = schema().serialize(&[("b", &b), ("a", &a)]).unwrap();

        let entries = schema().deserialize(&text, Path::new("x.lb")).unwrap();
        assert_eq!(entries, vec![("b".to_string(), b), ("a".to_string(), a)]);
    }

    #[test]
    fn test_json_format_output() {
        let json_schema = schema().with_format(FileFormat::Json);
        let payload = json!({"value": 1});
        let text = json_schema.serialize(&[("key", &payload)]).unwrap();
        assert!(text.starts_with('{'));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_json_format_reads_surrogate_escapes() {
        let json_schema = schema().with_format(FileFormat::Json);
        let text = r#"{"zeta": {"value": "hi \ud83d\ude00"}, "alpha": {}}"#;
        let entries = json_schema.deserialize(text, Path::new("greeting.lb")).unwrap();

        assert_eq!(entries[0].0, "zeta");
        assert_eq!(entries[0].1, json!({"value": "hi \u{1F600}"}));
        assert_eq!(entries[1].0, "alpha");
    }

    #[test]
    fn test_json_format_rejects_non_mapping() {
        let json_schema = schema().with_format(FileFormat::Json);
        assert!(json_schema
            .deserialize("  \n", Path::new("empty.lb"))
            .unwrap()
            .is_empty());

        let err = json_schema
            .deserialize("[1, 2]", Path::new("list.lb"))
            .unwrap_err();
        assert!(err.is_content_error());
        assert!(err.to_string().contains("a sequence"));
    }

    #[test]
    fn test_item_display() {
        let local = ResourceItem::local("a", "a", "configs/a.lb", json!({}));
        let remote = ResourceItem::remote("b", "b", json!({}));
        assert_eq!(local.to_string(), "a in 'configs/a.lb'");
        assert_eq!(remote.to_string(), "b");
        assert!(remote.is_remote());
    }

    #[test]
    fn test_failed_item_uses_file_name() {
        let item: ResourceItem<serde_json::Value> =
            ResourceItem::failed("configs/broken.lb", Status::failed_to_read("bad"));
        assert_eq!(item.name, "broken.lb");
        assert!(item.content.is_none());
        assert!(item.status.is_error());
    }
}
