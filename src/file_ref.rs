//! File references arriving through the workflow context.
//!
//! Upload steps hand files downstream in several shapes: a descriptor
//! mapping, a list holding one descriptor, a typed descriptor, or a bare path
//! string. [`FileRef`] normalises all of them at the context boundary so
//! steps only ever call [`FileRef::path`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Candidate keys for a file's storage path, in priority order.
pub const PATH_KEYS: &[&str] = &["file_path", "path"];

/// Candidate keys for a file's display name.
pub const NAME_KEYS: &[&str] = &["name", "file_name", "filename"];

/// Candidate keys for a file's content type.
pub const CONTENT_TYPE_KEYS: &[&str] = &["content_type", "type", "mime_type"];

/// Metadata an upload step attaches to a stored file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl FileDescriptor {
    /// Read a descriptor out of a JSON mapping.
    ///
    /// Unknown keys are ignored and mistyped fields are treated as absent, so
    /// this never fails on an object.
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let value = Value::Object(map.clone());
        Self {
            file_path: pick_field(&value, &["file_path"]),
            path: pick_field(&value, &["path"]),
            name: pick_field(&value, NAME_KEYS),
            size: ["size", "file_size"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_u64)),
            content_type: pick_field(&value, CONTENT_TYPE_KEYS),
        }
    }

    /// The storage path, `file_path` before `path`.
    pub fn path(&self) -> Option<&str> {
        non_empty(self.file_path.as_deref()).or_else(|| non_empty(self.path.as_deref()))
    }
}

/// A normalised reference to a file handed over by an upstream step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// A descriptor with named fields.
    Descriptor(FileDescriptor),
    /// A bare path string.
    Path(String),
}

impl FileRef {
    /// Normalise a context value.
    ///
    /// | Shape | Result |
    /// |-------|--------|
    /// | object | `Descriptor` |
    /// | array | the first element, normalised |
    /// | non-empty string | `Path` |
    /// | anything else | `None` |
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(FileRef::Descriptor(FileDescriptor::from_map(map))),
            Value::Array(items) => items.first().and_then(FileRef::from_value),
            Value::String(s) if !s.trim().is_empty() => Some(FileRef::Path(s.clone())),
            _ => None,
        }
    }

    /// The storage path, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            FileRef::Descriptor(d) => d.path(),
            FileRef::Path(p) => Some(p.as_str()),
        }
    }

    /// The storage path, or `{upload_dir}/{name}` for a descriptor that only
    /// carries a display name.
    pub fn path_or_named(&self, upload_dir: &str) -> Option<String> {
        if let Some(p) = self.path() {
            return Some(p.to_string());
        }
        match self {
            FileRef::Descriptor(d) => non_empty(d.name.as_deref())
                .map(|n| format!("{}/{}", upload_dir.trim_end_matches('/'), n)),
            FileRef::Path(_) => None,
        }
    }

    /// A file name suitable for display: the descriptor name, else the path's basename.
    pub fn display_name(&self) -> Option<String> {
        if let FileRef::Descriptor(d) = self {
            if let Some(n) = non_empty(d.name.as_deref()) {
                return Some(n.to_string());
            }
        }
        self.path().and_then(basename)
    }
}

impl From<FileDescriptor> for FileRef {
    fn from(d: FileDescriptor) -> Self {
        FileRef::Descriptor(d)
    }
}

impl From<&str> for FileRef {
    fn from(s: &str) -> Self {
        FileRef::Path(s.to_string())
    }
}

/// Extract the first present field among `candidates`.
///
/// Arrays are looked through to their first element and a bare string is
/// returned as-is, so a caller that only wants "the path" gets it whatever
/// the upstream shape. Empty strings count as absent. Numbers and booleans
/// are rendered as text.
pub fn pick_field(value: &Value, candidates: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => candidates.iter().find_map(|key| match map.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        }),
        Value::Array(items) => items.first().and_then(|v| pick_field(v, candidates)),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Final path component of a `/`-separated storage path.
pub fn basename(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Human-readable name of a JSON value's shape, for error messages.
pub fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
