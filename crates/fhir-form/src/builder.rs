use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec;
use crate::diagnostics::Diagnostics;
use crate::enablement::Enablement;
use crate::field::{ChoiceSource, Field};
use crate::lookup;
use crate::model::{
    DisabledDisplay, ItemType, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseItem,
};

/// Title used when the questionnaire has none.
pub const DEFAULT_TITLE: &str = "Questionnaire Title";

pub const HIDDEN_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-hidden";
pub const WIDTH_EXTENSION: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-widthPercentage";

/// Output of [`build`]: the field tree plus anything worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldTree {
    pub title: String,
    pub fields: Vec<Field>,
    pub diagnostics: Diagnostics,
}

/// Flattens `questionnaire` into form fields, taking initial values from
/// `response`. In read-only mode every field is disabled.
pub fn build(
    questionnaire: &Questionnaire,
    response: &QuestionnaireResponse,
    read_only_mode: bool,
) -> FieldTree {
    let mut builder = Builder {
        answers: &response.item,
        read_only_mode,
        diagnostics: Diagnostics::new(),
    };
    let fields = builder.fields(&questionnaire.item);
    tracing::debug!(
        target: "fhir_form",
        fields = fields.len(),
        read_only_mode,
        "built field tree"
    );

    FieldTree {
        title: questionnaire
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        fields,
        diagnostics: builder.diagnostics,
    }
}

struct Builder<'a> {
    answers: &'a [QuestionnaireResponseItem],
    read_only_mode: bool,
    diagnostics: Diagnostics,
}

impl Builder<'_> {
    fn fields(&mut self, items: &[QuestionnaireItem]) -> Vec<Field> {
        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            let field = self.field(item);
            let is_group = field.is_group();
            fields.push(field);
            // Children of a non-group item are rendered after it, as peers.
            if !is_group && !item.item.is_empty() {
                fields.extend(self.fields(&item.item));
            }
        }
        fields
    }

    fn field(&mut self, item: &QuestionnaireItem) -> Field {
        let (enablement, diagnostics) = Enablement::compile(item, self.read_only_mode);
        for diagnostic in diagnostics {
            self.diagnostics.push(diagnostic);
        }
        if let ItemType::Other(tag) = &item.kind {
            tracing::debug!(target: "fhir_form", field = %item.link_id, kind = %tag, "unrecognized item type");
        }

        let children = if item.kind == ItemType::Group {
            self.fields(&item.item)
        } else {
            Vec::new()
        };

        let mut field = Field {
            id: item.link_id.clone(),
            prefix: item.prefix.clone(),
            label: item.text.clone().unwrap_or_default(),
            kind: item.kind.clone(),
            required: item.required.unwrap_or(false),
            read_only: item.read_only.unwrap_or(false),
            repeat: item.repeats.unwrap_or(false),
            hidden: item
                .extension(HIDDEN_EXTENSION)
                .and_then(|extension| extension.value_boolean())
                .unwrap_or(false),
            hide_on_disabled: !self.read_only_mode
                && item.disabled_display != Some(DisabledDisplay::Protected),
            max_length: item.max_length,
            initial_value: String::new(),
            choices: choice_source(item),
            enablement,
            rendering: rendering_hints(item),
            children,
        };
        field.initial_value = self
            .initial_answer(&field)
            .unwrap_or_else(|| field.option_default());
        field
    }

    fn initial_answer(&self, field: &Field) -> Option<String> {
        let node = lookup::find(self.answers, &field.id)?;
        let answer = node.first_answer()?;
        Some(codec::decode(answer, field.encoding()))
    }
}

fn choice_source(item: &QuestionnaireItem) -> ChoiceSource {
    if let Some(value_set) = &item.answer_value_set {
        ChoiceSource::ValueSet(value_set.clone())
    } else if !item.answer_option.is_empty() {
        ChoiceSource::Options(item.answer_option.clone())
    } else {
        ChoiceSource::None
    }
}

fn rendering_hints(item: &QuestionnaireItem) -> BTreeMap<String, String> {
    let mut hints = BTreeMap::new();
    if let Some(width) = item
        .extension(WIDTH_EXTENSION)
        .and_then(|extension| extension.value_text())
    {
        hints.insert("width".to_string(), width);
    }
    hints
}
