//! Conversion between the string values held in form state and typed
//! answers. Every form value is a string; the empty string means "no value".

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use thiserror::Error;

use crate::field::ChoiceSource;
use crate::model::{Answer, AnswerOption, Attachment, Coding, ItemType, Quantity};

/// Separator between the two halves of coding and quantity form values.
pub const PAIR_SEPARATOR: char = '|';

static MINUTE_DATE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}$").expect("valid pattern"));
static SECOND_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?$").expect("valid pattern")
});
static UTC_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<minute>\d{4}-\d{2}-\d{2}T\d{2}:\d{2})(:\d{2}(\.\d+)?)?(Z|\+00:00)$")
        .expect("valid pattern")
});

/// Answer encoding selected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Time,
    DateTime,
    Url,
    Coding,
    Quantity,
    Attachment,
    /// Choice field without inline options or value set: always no answer.
    MissingChoices,
    /// Type the engine cannot encode; writes are skipped.
    Unsupported,
}

impl Encoding {
    pub fn for_field(kind: &ItemType, choices: &ChoiceSource) -> Encoding {
        match kind {
            ItemType::String | ItemType::Text => Encoding::String,
            ItemType::Integer => Encoding::Integer,
            ItemType::Decimal => Encoding::Decimal,
            ItemType::Boolean => Encoding::Boolean,
            ItemType::Date => Encoding::Date,
            ItemType::Time => Encoding::Time,
            ItemType::DateTime => Encoding::DateTime,
            ItemType::Url => Encoding::Url,
            ItemType::Coding => Encoding::Coding,
            ItemType::Quantity => Encoding::Quantity,
            ItemType::Attachment => Encoding::Attachment,
            ItemType::Choice | ItemType::OpenChoice => match choices {
                ChoiceSource::ValueSet(_) => Encoding::Coding,
                ChoiceSource::Options(options) => match options.first() {
                    Some(first) => option_encoding(first),
                    None => Encoding::MissingChoices,
                },
                ChoiceSource::None => Encoding::MissingChoices,
            },
            ItemType::Group
            | ItemType::Display
            | ItemType::Question
            | ItemType::Reference
            | ItemType::Other(_) => Encoding::Unsupported,
        }
    }
}

/// Inline options are assumed homogeneous, so the first one decides.
fn option_encoding(option: &AnswerOption) -> Encoding {
    if option.value_coding.is_some() {
        Encoding::Coding
    } else if option.value_integer.is_some() {
        Encoding::Integer
    } else if option.value_date.is_some() {
        Encoding::Date
    } else if option.value_time.is_some() {
        Encoding::Time
    } else if option.value_string.is_some() {
        Encoding::String
    } else {
        Encoding::Unsupported
    }
}

/// Form value an inline option stands for.
pub fn option_form_value(option: &AnswerOption) -> Option<String> {
    if let Some(coding) = &option.value_coding {
        return Some(coding_to_form(coding));
    }
    option
        .value_integer
        .map(|value| value.to_string())
        .or_else(|| option.value_time.clone())
        .or_else(|| option.value_date.clone())
        .or_else(|| option.value_string.clone())
}

pub fn coding_to_form(coding: &Coding) -> String {
    format!(
        "{}{PAIR_SEPARATOR}{}",
        coding.system.as_deref().unwrap_or_default(),
        coding.code.as_deref().unwrap_or_default()
    )
}

/// Decimal rendering that drops a trailing `.0` (`1000.0` becomes `1000`).
pub fn decimal_to_form(value: f64) -> String {
    value.to_string()
}

/// Decodes one answer into its form value. A type mismatch between the
/// answer and the encoding yields the empty string.
pub fn decode(answer: &Answer, encoding: Encoding) -> String {
    match (encoding, answer) {
        (Encoding::String, Answer::String(text)) => text.clone(),
        (Encoding::Integer, Answer::Integer(value)) => value.to_string(),
        (Encoding::Decimal, Answer::Decimal(value)) => decimal_to_form(*value),
        (Encoding::Boolean, Answer::Boolean(value)) => value.to_string(),
        (Encoding::Date, Answer::Date(text)) => text.clone(),
        (Encoding::Time, Answer::Time(text)) => text.clone(),
        (Encoding::DateTime, Answer::DateTime(text)) => date_time_to_form(text),
        (Encoding::Url, Answer::Uri(text)) => text.clone(),
        (Encoding::Coding, Answer::Coding(coding)) => coding_to_form(coding),
        (Encoding::Quantity, Answer::Quantity(quantity)) => format!(
            "{}{PAIR_SEPARATOR}{}",
            quantity.value.map(decimal_to_form).unwrap_or_default(),
            quantity.unit.as_deref().unwrap_or_default()
        ),
        (Encoding::Attachment, Answer::Attachment(attachment)) => {
            serde_json::to_string(&AttachmentPayload::from(attachment)).unwrap_or_default()
        }
        (Encoding::Unsupported | Encoding::MissingChoices, answer) => {
            answer.as_string().map(str::to_string).unwrap_or_default()
        }
        _ => String::new(),
    }
}

/// Strips a UTC zone marker (and seconds) so the value fits a minute
/// precision date-time input. Other offsets are left untouched.
fn date_time_to_form(text: &str) -> String {
    match UTC_DATE_TIME.captures(text) {
        Some(captures) => captures["minute"].to_string(),
        None => text.to_string(),
    }
}

fn date_time_from_form(text: &str) -> String {
    if MINUTE_DATE_TIME.is_match(text) {
        format!("{text}:00Z")
    } else if SECOND_DATE_TIME.is_match(text) {
        format!("{text}Z")
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("'{0}' is not an integer")]
    InvalidInteger(String),
    #[error("'{0}' is not a decimal number")]
    InvalidDecimal(String),
    #[error("'{0}' is not a value|unit quantity")]
    InvalidQuantity(String),
    #[error("attachment is not valid JSON: {0}")]
    InvalidAttachment(String),
    #[error("answers of this type cannot be encoded")]
    Unsupported,
}

/// Encodes one form value. `Ok(None)` is "no answer" (empty input).
pub fn encode(value: &str, encoding: Encoding) -> Result<Option<Answer>, CodecError> {
    if value.is_empty() {
        return Ok(None);
    }
    let answer = match encoding {
        Encoding::String => Answer::String(value.to_string()),
        Encoding::Integer => Answer::Integer(
            value
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidInteger(value.to_string()))?,
        ),
        Encoding::Decimal => Answer::Decimal(
            value
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidDecimal(value.to_string()))?,
        ),
        Encoding::Boolean => Answer::Boolean(value == "true"),
        Encoding::Date => Answer::Date(value.to_string()),
        Encoding::Time => Answer::Time(value.to_string()),
        Encoding::DateTime => Answer::DateTime(date_time_from_form(value)),
        Encoding::Url => Answer::Uri(value.to_string()),
        Encoding::Coding => {
            let (system, code) = match value.split_once(PAIR_SEPARATOR) {
                Some((system, code)) => (non_empty(system), non_empty(code)),
                None => (None, non_empty(value)),
            };
            Answer::Coding(Coding {
                system,
                code,
                display: None,
                extra: Map::new(),
            })
        }
        Encoding::Quantity => {
            let (amount, unit) = value.split_once(PAIR_SEPARATOR).unwrap_or((value, ""));
            let amount = amount
                .trim()
                .parse::<f64>()
                .map_err(|_| CodecError::InvalidQuantity(value.to_string()))?;
            Answer::Quantity(Quantity {
                value: Some(amount),
                unit: non_empty(unit),
                extra: Map::new(),
            })
        }
        Encoding::Attachment => {
            let payload: AttachmentPayload = serde_json::from_str(value)
                .map_err(|err| CodecError::InvalidAttachment(err.to_string()))?;
            Answer::Attachment(payload.into())
        }
        Encoding::MissingChoices => return Ok(None),
        Encoding::Unsupported => return Err(CodecError::Unsupported),
    };
    Ok(Some(answer))
}

/// Encodes a whole value list. Values that fail to encode are skipped and
/// reported; an empty result is `None` so the node's answers get cleared.
pub fn encode_all(
    values: &[String],
    encoding: Encoding,
) -> (Option<Vec<Answer>>, Vec<(String, CodecError)>) {
    let mut answers = Vec::new();
    let mut failures = Vec::new();
    for value in values {
        match encode(value, encoding) {
            Ok(Some(answer)) => answers.push(answer),
            Ok(None) => {}
            Err(err) => failures.push((value.clone(), err)),
        }
    }
    let answers = if answers.is_empty() { None } else { Some(answers) };
    (answers, failures)
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The attachment members carried through a form value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

impl From<&Attachment> for AttachmentPayload {
    fn from(attachment: &Attachment) -> Self {
        Self {
            content_type: attachment.content_type.clone(),
            data: attachment.data.clone(),
            title: attachment.title.clone(),
        }
    }
}

impl From<AttachmentPayload> for Attachment {
    fn from(payload: AttachmentPayload) -> Self {
        Attachment {
            content_type: payload.content_type,
            data: payload.data,
            title: payload.title,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: &str, encoding: Encoding) -> String {
        let answer = encode(value, encoding).unwrap().unwrap();
        decode(&answer, encoding)
    }

    #[test]
    fn quantity_round_trips() {
        let answer = encode("1000|ng/ml", Encoding::Quantity).unwrap().unwrap();
        assert_eq!(
            answer,
            Answer::Quantity(Quantity {
                value: Some(1000.0),
                unit: Some("ng/ml".into()),
                extra: Map::new(),
            })
        );
        assert_eq!(decode(&answer, Encoding::Quantity), "1000|ng/ml");
    }

    #[test]
    fn date_time_gains_and_loses_zone() {
        let answer = encode("2000-02-10T10:00", Encoding::DateTime).unwrap().unwrap();
        assert_eq!(answer, Answer::DateTime("2000-02-10T10:00:00Z".into()));
        assert_eq!(decode(&answer, Encoding::DateTime), "2000-02-10T10:00");
    }

    #[test]
    fn date_time_with_offset_is_kept() {
        let answer = Answer::DateTime("2000-02-10T10:00:00+02:00".into());
        assert_eq!(
            decode(&answer, Encoding::DateTime),
            "2000-02-10T10:00:00+02:00"
        );
    }

    #[test]
    fn scalar_values_round_trip() {
        assert_eq!(round_trip("42", Encoding::Integer), "42");
        assert_eq!(round_trip("2.5", Encoding::Decimal), "2.5");
        assert_eq!(round_trip("true", Encoding::Boolean), "true");
        assert_eq!(round_trip("false", Encoding::Boolean), "false");
        assert_eq!(round_trip("2024-01-31", Encoding::Date), "2024-01-31");
        assert_eq!(round_trip("08:30:00", Encoding::Time), "08:30:00");
        assert_eq!(round_trip("urn:dicom:uid", Encoding::Url), "urn:dicom:uid");
        assert_eq!(
            round_trip("http://snomed.info/sct|86273004", Encoding::Coding),
            "http://snomed.info/sct|86273004"
        );
    }

    #[test]
    fn attachment_round_trips_through_json() {
        let value = r#"{"contentType":"text/plain","data":"aGVsbG8=","title":"note.txt"}"#;
        assert_eq!(round_trip(value, Encoding::Attachment), value);
        assert!(matches!(
            encode("not json", Encoding::Attachment),
            Err(CodecError::InvalidAttachment(_))
        ));
    }

    #[test]
    fn empty_values_encode_to_nothing() {
        let (answers, failures) = encode_all(&["".into(), "".into()], Encoding::String);
        assert!(answers.is_none());
        assert!(failures.is_empty());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let (answers, failures) = encode_all(&["7".into(), "seven".into()], Encoding::Integer);
        assert_eq!(answers, Some(vec![Answer::Integer(7)]));
        assert_eq!(
            failures,
            vec![("seven".to_string(), CodecError::InvalidInteger("seven".into()))]
        );
    }

    #[test]
    fn choice_encoding_follows_first_option() {
        let options = vec![AnswerOption {
            value_integer: Some(1),
            ..AnswerOption::default()
        }];
        assert_eq!(
            Encoding::for_field(&ItemType::Choice, &ChoiceSource::Options(options)),
            Encoding::Integer
        );
        assert_eq!(
            Encoding::for_field(&ItemType::Choice, &ChoiceSource::ValueSet("vs".into())),
            Encoding::Coding
        );
        assert_eq!(
            Encoding::for_field(&ItemType::Choice, &ChoiceSource::None),
            Encoding::MissingChoices
        );
    }

    #[test]
    fn unsupported_types_fall_back_to_string_on_decode() {
        let answer = Answer::String("free text".into());
        assert_eq!(decode(&answer, Encoding::Unsupported), "free text");
        assert_eq!(encode("x", Encoding::Unsupported), Err(CodecError::Unsupported));
    }
}
