use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::datatype::{Coding, Extension, Quantity};

/// Top-level questionnaire definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Questionnaire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One question or group node of a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub kind: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_behavior: Option<EnableBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_display: Option<DisabledDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value_set: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionnaireItem {
    pub fn new(link_id: impl Into<String>, kind: ItemType) -> Self {
        Self {
            link_id: link_id.into(),
            prefix: None,
            text: None,
            kind,
            required: None,
            read_only: None,
            repeats: None,
            max_length: None,
            enable_when: Vec::new(),
            enable_behavior: None,
            disabled_display: None,
            answer_value_set: None,
            answer_option: Vec::new(),
            extension: Vec::new(),
            item: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn extension(&self, url: &str) -> Option<&Extension> {
        self.extension.iter().find(|extension| extension.url == url)
    }
}

/// Value type tag of a questionnaire item. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    Group,
    Display,
    Question,
    Boolean,
    Decimal,
    Integer,
    Date,
    DateTime,
    Time,
    String,
    Text,
    Url,
    Coding,
    Choice,
    OpenChoice,
    Attachment,
    Reference,
    Quantity,
    Other(String),
}

impl ItemType {
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Group => "group",
            ItemType::Display => "display",
            ItemType::Question => "question",
            ItemType::Boolean => "boolean",
            ItemType::Decimal => "decimal",
            ItemType::Integer => "integer",
            ItemType::Date => "date",
            ItemType::DateTime => "dateTime",
            ItemType::Time => "time",
            ItemType::String => "string",
            ItemType::Text => "text",
            ItemType::Url => "url",
            ItemType::Coding => "coding",
            ItemType::Choice => "choice",
            ItemType::OpenChoice => "open-choice",
            ItemType::Attachment => "attachment",
            ItemType::Reference => "reference",
            ItemType::Quantity => "quantity",
            ItemType::Other(tag) => tag,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, ItemType::Choice | ItemType::OpenChoice)
    }
}

impl From<String> for ItemType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "group" => ItemType::Group,
            "display" => ItemType::Display,
            "question" => ItemType::Question,
            "boolean" => ItemType::Boolean,
            "decimal" => ItemType::Decimal,
            "integer" => ItemType::Integer,
            "date" => ItemType::Date,
            "dateTime" => ItemType::DateTime,
            "time" => ItemType::Time,
            "string" => ItemType::String,
            "text" => ItemType::Text,
            "url" => ItemType::Url,
            "coding" => ItemType::Coding,
            "choice" => ItemType::Choice,
            "open-choice" => ItemType::OpenChoice,
            "attachment" => ItemType::Attachment,
            "reference" => ItemType::Reference,
            "quantity" => ItemType::Quantity,
            _ => ItemType::Other(tag),
        }
    }
}

impl From<ItemType> for String {
    fn from(kind: ItemType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which an item is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnableWhen {
    pub question: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_boolean: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_decimal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_reference: Option<Value>,
}

impl EnableWhen {
    pub fn new(question: impl Into<String>, operator: Operator) -> Self {
        Self {
            question: question.into(),
            operator,
            answer_boolean: None,
            answer_decimal: None,
            answer_integer: None,
            answer_date: None,
            answer_date_time: None,
            answer_time: None,
            answer_string: None,
            answer_coding: None,
            answer_quantity: None,
            answer_reference: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Operator {
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Exists => "exists",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnableBehavior {
    All,
    #[default]
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DisabledDisplay {
    Hidden,
    Protected,
}

/// Inline answer choice. One `value[x]` is expected to be populated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_coding: Option<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_reference: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_selected: Option<bool>,
}

impl AnswerOption {
    pub fn coding(coding: Coding) -> Self {
        Self {
            value_coding: Some(coding),
            ..Self::default()
        }
    }

    pub fn is_initially_selected(&self) -> bool {
        self.initial_selected.unwrap_or(false)
    }
}
