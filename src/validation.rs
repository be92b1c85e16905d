//! Validation of form definitions and submitted answers.
//!
//! Forms are normalized before they are stored (ids assigned, defaults
//! filled in) and answers are checked against the field schema before a
//! response is recorded. The aggregator relies on this having happened
//! but still tolerates anything that slips through.

use crate::models::{
    new_id, Answer, Field, FieldKind, FormDraft, DEFAULT_RATING_MAX, MAX_RATING_SCALE,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Title given to forms submitted without one.
pub const DEFAULT_FORM_TITLE: &str = "Untitled Form";

/// Reasons a form definition or a submission is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("field {0} is required")]
    Required(String),

    #[error("field {0} must be string")]
    NotAString(String),

    #[error("field {0} must be one of options")]
    NotAnOption(String),

    #[error("field {0} must be array of strings")]
    NotAnArray(String),

    #[error("field {0} invalid checkbox options")]
    InvalidOptions(String),

    #[error("field {0} must be number")]
    NotANumber(String),

    #[error("field {label} rating must be 1..{max}")]
    RatingOutOfRange { label: String, max: u32 },

    #[error("duplicate field id: {0}")]
    DuplicateFieldId(String),

    #[error("field {label} rating max must be between 1 and {limit}")]
    InvalidRatingMax { label: String, limit: u32 },
}

/// Normalize a client-supplied form definition.
///
/// Assigns ids to fields that lack one, defaults the title and rating
/// scale, and rejects duplicate field ids.
pub fn normalize_form(draft: FormDraft) -> Result<(String, Vec<Field>), ValidationError> {
    let title = if draft.title.trim().is_empty() {
        DEFAULT_FORM_TITLE.to_string()
    } else {
        draft.title
    };

    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(draft.fields.len());

    for mut field in draft.fields {
        if field.id.is_empty() {
            field.id = new_id();
        }
        if !seen.insert(field.id.clone()) {
            return Err(ValidationError::DuplicateFieldId(field.id));
        }

        match field.kind {
            FieldKind::Rating => match field.max {
                None => field.max = Some(DEFAULT_RATING_MAX),
                Some(max) if max == 0 || max > MAX_RATING_SCALE => {
                    return Err(ValidationError::InvalidRatingMax {
                        label: field.label,
                        limit: MAX_RATING_SCALE,
                    })
                }
                Some(_) => {}
            },
            // Scale is meaningless outside rating fields
            _ => field.max = None,
        }
        if !field.kind.has_options() {
            field.options.clear();
        }

        fields.push(field);
    }

    Ok((title, fields))
}

/// Check a submitted answer document against the form's fields.
///
/// Returns the answers for declared fields only; unknown keys are
/// discarded.
pub fn validate_answers(
    fields: &[Field],
    body: &Value,
) -> Result<BTreeMap<String, Value>, ValidationError> {
    let submitted = body.as_object().ok_or(ValidationError::NotAnObject)?;
    let mut accepted = BTreeMap::new();

    for field in fields {
        let value = match submitted.get(&field.id) {
            Some(Value::Null) | None => {
                if field.required {
                    return Err(ValidationError::Required(field.label.clone()));
                }
                continue;
            }
            Some(value) => value,
        };

        check_answer(field, value)?;
        accepted.insert(field.id.clone(), value.clone());
    }

    Ok(accepted)
}

/// Validate a single answer against its field.
fn check_answer(field: &Field, value: &Value) -> Result<(), ValidationError> {
    let label = || field.label.clone();

    match (field.kind, Answer::decode(field.kind, value)) {
        (FieldKind::Text, Some(Answer::Text(_))) => Ok(()),
        (FieldKind::Text, _) => Err(ValidationError::NotAString(label())),

        (FieldKind::SingleChoice, Some(Answer::Choice(option))) if field.allows(&option) => Ok(()),
        (FieldKind::SingleChoice, _) => Err(ValidationError::NotAnOption(label())),

        (FieldKind::MultiChoice, Some(Answer::Choices(options))) => {
            // Decoding drops non-string entries, so a length mismatch means one was present
            let all_strings = value.as_array().map_or(0, |a| a.len()) == options.len();
            if all_strings && options.iter().all(|o| field.allows(o)) {
                Ok(())
            } else {
                Err(ValidationError::InvalidOptions(label()))
            }
        }
        (FieldKind::MultiChoice, _) => Err(ValidationError::NotAnArray(label())),

        (FieldKind::Rating, Some(Answer::Rating(rating))) => {
            let max = field.rating_scale();
            if rating < 1.0 || rating.trunc() > max as f64 {
                Err(ValidationError::RatingOutOfRange {
                    label: label(),
                    max,
                })
            } else {
                Ok(())
            }
        }
        (FieldKind::Rating, _) => Err(ValidationError::NotANumber(label())),
    }
}
