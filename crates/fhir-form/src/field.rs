use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec::{self, Encoding};
use crate::enablement::Enablement;
use crate::key::{FieldKey, Scope};
use crate::model::{AnswerOption, ItemType};
use crate::state::FormState;

/// Where the answer choices of a field come from.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum ChoiceSource {
    #[default]
    None,
    /// Canonical of an externally resolved value set.
    ValueSet(String),
    Options(Vec<AnswerOption>),
}

/// UI-agnostic description of one renderable question.
///
/// `id` is always the schema link id; scoping for repeated group instances
/// is applied by whoever walks the tree (see [`Field::key_in`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub label: String,
    pub kind: ItemType,
    pub required: bool,
    pub read_only: bool,
    pub repeat: bool,
    pub hidden: bool,
    pub hide_on_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    pub initial_value: String,
    pub choices: ChoiceSource,
    pub enablement: Enablement,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rendering: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Field>,
}

impl Field {
    pub fn is_group(&self) -> bool {
        self.kind == ItemType::Group
    }

    pub fn is_repeating_group(&self) -> bool {
        self.is_group() && self.repeat
    }

    /// Key of this field inside `scope`.
    pub fn key_in(&self, scope: &Scope) -> FieldKey {
        FieldKey::scoped(scope.clone(), self.id.clone())
    }

    /// Evaluates the disabled predicate for the instance addressed by `key`.
    pub fn is_disabled(&self, state: &FormState, key: &FieldKey) -> bool {
        !self.enablement.is_enabled(state, key)
    }

    pub fn encoding(&self) -> Encoding {
        Encoding::for_field(&self.kind, &self.choices)
    }

    /// Form value of the first `initialSelected` inline option, or empty.
    pub fn option_default(&self) -> String {
        if !self.kind.is_choice() {
            return String::new();
        }
        match &self.choices {
            ChoiceSource::Options(options) => options
                .iter()
                .find(|option| option.is_initially_selected())
                .and_then(codec::option_form_value)
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}
