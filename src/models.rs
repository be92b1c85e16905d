//! Data models for forms, responses and analytics.
//!
//! This module contains the core data structures shared by the store,
//! the aggregator, the broker glue and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Rating scale used when a rating field does not declare one.
pub const DEFAULT_RATING_MAX: u32 = 5;

/// Largest rating scale a field may declare.
pub const MAX_RATING_SCALE: u32 = 100;

/// Generate a new opaque identifier for forms, fields and responses.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Free-text answer
    #[serde(rename = "text")]
    Text,
    /// Exactly one of the declared options
    #[serde(rename = "multiple_choice")]
    SingleChoice,
    /// Any subset of the declared options
    #[serde(rename = "checkbox")]
    MultiChoice,
    /// Numeric rating on a 1..=max scale
    #[serde(rename = "rating")]
    Rating,
}

impl FieldKind {
    /// Whether answers are picked from the field's declared options.
    pub fn has_options(&self) -> bool {
        matches!(self, FieldKind::SingleChoice | FieldKind::MultiChoice)
    }
}

/// One question in a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Identifier, unique within the form and stable across edits.
    #[serde(default)]
    pub id: String,
    /// Question type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Label shown to respondents.
    #[serde(default)]
    pub label: String,
    /// Allowed options (choice fields only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Whether an answer must be supplied.
    #[serde(default)]
    pub required: bool,
    /// Maximum rating value (rating fields only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Field {
    /// Effective rating scale, falling back to the default when unset or
    /// zero and capped at [`MAX_RATING_SCALE`].
    pub fn rating_scale(&self) -> u32 {
        match self.max {
            Some(max) if max >= 1 => max.min(MAX_RATING_SCALE),
            _ => DEFAULT_RATING_MAX,
        }
    }

    /// Whether `option` is one of this field's declared options.
    pub fn allows(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// A form definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: String,
    pub title: String,
    /// Fields in display order.
    pub fields: Vec<Field>,
    pub created_at: DateTime<Utc>,
}

/// Client-supplied form content, before ids and defaults are filled in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// A stored submission for a form.
///
/// Answers keep their raw JSON shape; they are decoded against the field
/// type only when read (see [`Answer::decode`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub form_id: String,
    pub answers: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Response {
    /// Creates a new response stamped with the current time.
    pub fn new(form_id: impl Into<String>, answers: BTreeMap<String, Value>) -> Self {
        Self {
            id: new_id(),
            form_id: form_id.into(),
            answers,
            created_at: Utc::now(),
        }
    }

    /// Raw answer for a field, treating JSON `null` as unanswered.
    pub fn answer(&self, field_id: &str) -> Option<&Value> {
        self.answers.get(field_id).filter(|v| !v.is_null())
    }
}

/// A decoded answer value.
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Free text.
    Text(String),
    /// A single selected option.
    Choice(String),
    /// A list of selected options. Non-string entries are dropped.
    Choices(Vec<String>),
    /// A rating, whatever its numeric encoding was on the wire.
    Rating(f64),
}

impl Answer {
    /// Decode a raw value according to the field type.
    ///
    /// Returns `None` when the value does not have the shape the field
    /// type requires.
    pub fn decode(kind: FieldKind, value: &Value) -> Option<Answer> {
        match (kind, value) {
            (FieldKind::Text, Value::String(s)) => Some(Answer::Text(s.clone())),
            (FieldKind::SingleChoice, Value::String(s)) => Some(Answer::Choice(s.clone())),
            (FieldKind::MultiChoice, Value::Array(items)) => Some(Answer::Choices(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(String::from))
                    .collect(),
            )),
            (FieldKind::Rating, Value::Number(n)) => {
                n.as_f64().filter(|v| v.is_finite()).map(Answer::Rating)
            }
            _ => None,
        }
    }
}

/// Per-field statistics: string key to numeric value.
pub type FieldStats = BTreeMap<String, f64>;

/// Analytics snapshot for a form at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub form_id: String,
    pub by_field: BTreeMap<String, FieldStats>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
impl Snapshot {
    /// Statistics for one field, if the form declares it.
    pub fn field(&self, field_id: &str) -> Option<&FieldStats> {
        self.by_field.get(field_id)
    }

    /// Single statistic value, `None` if the field or key is absent.
    pub fn stat(&self, field_id: &str, key: &str) -> Option<f64> {
        self.by_field.get(field_id).and_then(|s| s.get(key)).copied()
    }
}
