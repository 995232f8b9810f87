use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Encoding, PAIR_SEPARATOR};
use crate::field::{ChoiceSource, Field};
use crate::key::FieldKey;
use crate::lookup;
use crate::model::ItemType;
use crate::state::FormState;
use crate::visibility::resolve_visibility;

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}(-(0[1-9]|1[0-2])(-(0[1-9]|[12]\d|3[01]))?)?$").expect("valid pattern")
});
static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d(:([0-5]\d|60)(\.\d+)?)?$").expect("valid pattern")
});
static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d{4}-\d{2}-\d{2}T([01]\d|2[0-3]):[0-5]\d(:[0-5]\d(\.\d+)?)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("valid pattern")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field_key: Option<String>,
    pub message: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub missing_required: Vec<String>,
    pub unknown_fields: Vec<String>,
}

/// Checks the visible, enabled fields of a form: required values present,
/// values lexically valid for their type, lengths within `maxLength`.
pub fn validate(fields: &[Field], state: &FormState) -> ValidationResult {
    let visibility = resolve_visibility(fields, state);

    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    state.walk(fields, |field, key| {
        if !visibility.get(key).copied().unwrap_or(true) || field.is_disabled(state, key) {
            return;
        }
        let values: Vec<&str> = state
            .get(key)
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();

        if values.is_empty() {
            if field.required {
                missing_required.push(key.to_string());
            }
            return;
        }
        errors.extend(
            values
                .into_iter()
                .find_map(|value| validate_value(field, key, value)),
        );
    });

    let unknown_fields: Vec<String> = state
        .values()
        .keys()
        .filter(|key| lookup::field_for_key(fields, key).is_none())
        .map(FieldKey::to_string)
        .collect();

    ValidationResult {
        valid: errors.is_empty() && missing_required.is_empty() && unknown_fields.is_empty(),
        errors,
        missing_required,
        unknown_fields,
    }
}

fn validate_value(field: &Field, key: &FieldKey, value: &str) -> Option<ValidationError> {
    if !matches_type(field.encoding(), value) {
        return Some(base_error(key, "type mismatch", "type_mismatch"));
    }

    if let Some(max_length) = field.max_length
        && value.chars().count() > max_length as usize
    {
        return Some(base_error(
            key,
            "string longer than max length",
            "max_length",
        ));
    }

    if field.kind == ItemType::Choice
        && let ChoiceSource::Options(options) = &field.choices
        && !options
            .iter()
            .filter_map(codec::option_form_value)
            .any(|option| option == value)
    {
        return Some(base_error(key, "invalid answer option", "option_mismatch"));
    }

    None
}

fn matches_type(encoding: Encoding, value: &str) -> bool {
    match encoding {
        Encoding::Integer => value.trim().parse::<i64>().is_ok(),
        Encoding::Decimal => value.trim().parse::<f64>().is_ok(),
        Encoding::Boolean => value == "true" || value == "false",
        Encoding::Date => DATE.is_match(value),
        Encoding::Time => TIME.is_match(value),
        Encoding::DateTime => DATE_TIME.is_match(value),
        Encoding::Quantity => value
            .split(PAIR_SEPARATOR)
            .next()
            .is_some_and(|amount| amount.trim().parse::<f64>().is_ok()),
        Encoding::Attachment => serde_json::from_str::<serde_json::Value>(value)
            .is_ok_and(|payload| payload.is_object()),
        Encoding::String
        | Encoding::Url
        | Encoding::Coding
        | Encoding::MissingChoices
        | Encoding::Unsupported => true,
    }
}

fn base_error(key: &FieldKey, message: &str, code: &str) -> ValidationError {
    ValidationError {
        field_key: Some(key.to_string()),
        message: message.into(),
        code: Some(code.into()),
    }
}
