use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::datatype::{Attachment, Coding, Quantity};
use crate::model::questionnaire::Questionnaire;

/// Answers recorded against a questionnaire.
///
/// Everything the engine does not interpret (`meta`, `subject`, `contained`,
/// ...) is kept in `extra` so it survives a round trip untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QuestionnaireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionnaireResponse {
    /// Returns the contained questionnaire referenced by a local `#id`
    /// canonical, if the response carries one.
    pub fn contained_questionnaire(&self) -> Result<Option<Questionnaire>, serde_json::Error> {
        let Some(local_id) = self
            .questionnaire
            .as_deref()
            .and_then(|canonical| canonical.strip_prefix('#'))
        else {
            return Ok(None);
        };
        let Some(contained) = self.extra.get("contained").and_then(Value::as_array) else {
            return Ok(None);
        };

        contained
            .iter()
            .find(|resource| {
                resource.get("resourceType").and_then(Value::as_str) == Some("Questionnaire")
                    && resource.get("id").and_then(Value::as_str) == Some(local_id)
            })
            .map(|resource| serde_json::from_value(resource.clone()))
            .transpose()
    }
}

/// One node of the response tree. Repeated group instances are siblings
/// sharing the same `link_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponseItem {
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Vec<QuestionnaireResponseAnswer>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireResponseItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionnaireResponseItem {
    pub fn new(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            answer: None,
            item: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_answers(mut self, answers: Vec<Answer>) -> Self {
        self.answer = Some(answers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_items(mut self, items: Vec<QuestionnaireResponseItem>) -> Self {
        self.item = items;
        self
    }

    pub fn first_answer(&self) -> Option<&Answer> {
        self.answer
            .as_ref()
            .and_then(|answers| answers.first())
            .map(|answer| &answer.value)
    }

    /// The typed values of this node's answers, without their extra members.
    pub fn answer_values(&self) -> Option<Vec<Answer>> {
        self.answer
            .as_ref()
            .map(|answers| answers.iter().map(|answer| answer.value.clone()).collect())
    }

    /// Drops the answers of this node and of every descendant.
    pub fn clear_answers(&mut self) {
        let mut stack: Vec<&mut QuestionnaireResponseItem> = vec![self];
        while let Some(node) = stack.pop() {
            node.answer = None;
            stack.extend(node.item.iter_mut());
        }
    }
}

/// One entry of a node's `answer` list: the `value[x]` member plus whatever
/// else the entry carries (`extension`, nested `item`, ...), kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionnaireResponseAnswer {
    #[serde(flatten)]
    pub value: Answer,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Answer> for QuestionnaireResponseAnswer {
    fn from(value: Answer) -> Self {
        Self {
            value,
            extra: Map::new(),
        }
    }
}

/// One typed answer value, serialized as its `value[x]` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum Answer {
    #[serde(rename = "valueBoolean")]
    Boolean(bool),
    #[serde(rename = "valueDecimal")]
    Decimal(f64),
    #[serde(rename = "valueInteger")]
    Integer(i64),
    #[serde(rename = "valueDate")]
    Date(String),
    #[serde(rename = "valueDateTime")]
    DateTime(String),
    #[serde(rename = "valueTime")]
    Time(String),
    #[serde(rename = "valueString")]
    String(String),
    #[serde(rename = "valueUri")]
    Uri(String),
    #[serde(rename = "valueAttachment")]
    Attachment(Attachment),
    #[serde(rename = "valueCoding")]
    Coding(Coding),
    #[serde(rename = "valueQuantity")]
    Quantity(Quantity),
    #[serde(rename = "valueReference")]
    Reference(Value),
}

impl Answer {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Answer::String(text) => Some(text),
            _ => None,
        }
    }
}
