use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A code from a terminology system.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
            extra: Map::new(),
        }
    }
}

/// A measured amount with its unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Inline or referenced binary content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extension carrying one `value[x]` entry next to its url.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Extension {
    pub url: String,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl Extension {
    pub fn value_boolean(&self) -> Option<bool> {
        self.value.get("valueBoolean").and_then(Value::as_bool)
    }

    /// First populated scalar `value[x]`, rendered as text.
    pub fn value_text(&self) -> Option<String> {
        [
            "valueString",
            "valueBoolean",
            "valueCode",
            "valueUri",
            "valuePositiveInt",
            "valueDecimal",
        ]
        .iter()
        .find_map(|name| self.value.get(*name))
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }
}
