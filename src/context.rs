//! The workflow context: named values passed between steps.
//!
//! A step reads from a [`WorkflowContext`] and collects what it produces in
//! a [`StepOutputs`]. Each output name can be written once per step; the
//! caller then applies the outputs to the context for the next step.

use crate::error::StepError;
use crate::file_ref::{shape_name, FileRef};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Named values shared by the steps of one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WorkflowContext {
    vars: BTreeMap<String, Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, StepError> {
        match value {
            Value::Object(map) => Ok(Self {
                vars: map.into_iter().collect(),
            }),
            other => Err(StepError::invalid(
                "context",
                format!("expected a mapping, got {}", shape_name(&other)),
            )),
        }
    }

    /// Set a value directly, replacing any previous one.
    ///
    /// Used to seed inputs; steps write through [`StepOutputs`].
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Raw lookup.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// A value that must be present and non-null.
    pub fn require(&self, name: &str) -> Result<&Value, StepError> {
        match self.vars.get(name) {
            None | Some(Value::Null) => Err(StepError::missing(name)),
            Some(v) => Ok(v),
        }
    }

    /// A required text value.
    pub fn require_str(&self, name: &str) -> Result<&str, StepError> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| {
            StepError::invalid(name, format!("expected text, got {}", shape_name(value)))
        })
    }

    /// An optional text value; absent and null are both `None`.
    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, StepError> {
        match self.vars.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(StepError::invalid(
                name,
                format!("expected text, got {}", shape_name(other)),
            )),
        }
    }

    /// A required list of strings.
    pub fn require_str_list(&self, name: &str) -> Result<Vec<String>, StepError> {
        let value = self.require(name)?;
        let items = value.as_array().ok_or_else(|| {
            StepError::invalid(name, format!("expected a list, got {}", shape_name(value)))
        })?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    StepError::invalid(
                        name,
                        format!("item {i} should be text, got {}", shape_name(item)),
                    )
                })
            })
            .collect()
    }

    /// A required file reference, normalised from whatever shape it arrived in.
    pub fn file_ref(&self, name: &str) -> Result<FileRef, StepError> {
        let value = self.require(name)?;
        FileRef::from_value(value).ok_or_else(|| {
            StepError::invalid(
                name,
                format!("cannot read a file reference from a {}", shape_name(value)),
            )
        })
    }

    /// Merge a step's outputs, replacing earlier values of the same names.
    pub fn apply(&mut self, outputs: StepOutputs) {
        for (name, value) in outputs.values {
            debug!("context ← {}", name);
            self.vars.insert(name, value);
        }
    }

    /// The whole context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.vars.clone().into_iter().collect::<Map<_, _>>())
    }
}

/// Severity prefix of a diagnostic output variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    Debug,
    Info,
    Warning,
    Error,
}

impl Diagnostic {
    fn prefix(&self) -> &'static str {
        match self {
            Diagnostic::Debug => "_debug",
            Diagnostic::Info => "_info",
            Diagnostic::Warning => "_warning",
            Diagnostic::Error => "_error",
        }
    }

    /// Output variable name for `topic`, e.g. `_info_extraction`.
    pub fn var_name(&self, topic: &str) -> String {
        format!("{}_{}", self.prefix(), topic)
    }
}

/// Values produced by one step, each name written at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepOutputs {
    values: BTreeMap<String, Value>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an output.
    ///
    /// # Errors
    /// [`StepError::OutputConflict`] if `name` was already written.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), StepError> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(StepError::OutputConflict { name });
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Write a diagnostic variable such as `_warning_empty`.
    ///
    /// `None` is written as null so the variable is always defined.
    pub fn diagnostic(
        &mut self,
        level: Diagnostic,
        topic: &str,
        message: Option<String>,
    ) -> Result<(), StepError> {
        self.set(level.var_name(topic), message.map_or(Value::Null, Value::String))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(v: Value) -> WorkflowContext {
        WorkflowContext::from_value(v).unwrap()
    }

    #[test]
    fn context_must_be_a_mapping() {
        assert!(WorkflowContext::from_value(json!([1, 2])).is_err());
        assert!(WorkflowContext::from_value(json!({})).unwrap().is_empty());
    }

    #[test]
    fn require_treats_null_as_missing() {
        let c = ctx(json!({"a": null}));
        assert!(matches!(c.require("a"), Err(StepError::MissingInput { .. })));
        assert!(matches!(c.require("b"), Err(StepError::MissingInput { .. })));
    }

    #[test]
    fn require_str_rejects_other_shapes() {
        let c = ctx(json!({"n": 5, "s": "ok"}));
        assert_eq!(c.require_str("s").unwrap(), "ok");
        let err = c.require_str("n").unwrap_err();
        assert!(err.to_string().contains("number"), "got: {err}");
    }

    #[test]
    fn optional_str_allows_absence() {
        let c = ctx(json!({"x": null, "y": "v"}));
        assert_eq!(c.optional_str("x").unwrap(), None);
        assert_eq!(c.optional_str("z").unwrap(), None);
        assert_eq!(c.optional_str("y").unwrap(), Some("v"));
    }

    #[test]
    fn str_list_reports_bad_item() {
        let c = ctx(json!({"images": ["a.png", 3]}));
        let err = c.require_str_list("images").unwrap_err();
        assert!(err.to_string().contains("item 1"), "got: {err}");
    }

    #[test]
    fn file_ref_rejects_unusable_value() {
        let c = ctx(json!({"media_data": 12}));
        assert!(matches!(
            c.file_ref("media_data"),
            Err(StepError::InvalidInput { .. })
        ));
    }

    #[test]
    fn outputs_are_write_once() {
        let mut out = StepOutputs::new();
        out.set("file_path", "a.pdf").unwrap();
        let err = out.set("file_path", "b.pdf").unwrap_err();
        assert!(matches!(err, StepError::OutputConflict { .. }));
        assert_eq!(out.get("file_path"), Some(&json!("a.pdf")));
    }

    #[test]
    fn diagnostics_use_prefixed_names() {
        let mut out = StepOutputs::new();
        out.diagnostic(Diagnostic::Warning, "empty", None).unwrap();
        out.diagnostic(Diagnostic::Info, "process", Some("done".into()))
            .unwrap();
        assert_eq!(out.get("_warning_empty"), Some(&Value::Null));
        assert_eq!(out.get("_info_process"), Some(&json!("done")));
    }

    #[test]
    fn apply_merges_into_context() {
        let mut c = ctx(json!({"media_data": "x", "file_path": "old"}));
        let mut out = StepOutputs::new();
        out.set("file_path", "new").unwrap();
        c.apply(out);
        assert_eq!(c.get("file_path"), Some(&json!("new")));
        assert_eq!(c.len(), 2);
        assert_eq!(c.to_value(), json!({"media_data": "x", "file_path": "new"}));
    }
}
