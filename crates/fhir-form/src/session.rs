//! A form bound to one questionnaire and response: the edit loop, reset,
//! and submission through caller-supplied hooks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::{self, FieldTree};
use crate::diagnostics::Diagnostics;
use crate::field::Field;
use crate::key::FieldKey;
use crate::lookup;
use crate::model::{Questionnaire, QuestionnaireResponse};
use crate::render::{RenderActions, RenderPayload, build_render_payload};
use crate::serialize::{Serialized, serialize};
use crate::state::{FormState, StateError};
use crate::validate::{ValidationResult, validate};

pub const SUBMIT_LABEL_KEY: &str = "button.validate";
pub const RESET_LABEL_KEY: &str = "button.reset";
pub const DEFAULT_SUBMIT_LABEL: &str = "Validate";
pub const DEFAULT_RESET_LABEL: &str = "Reset";

/// Caller-facing configuration of a form session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FormOptions {
    /// Disable every field and refuse edits.
    #[serde(default)]
    pub read_only: bool,
    /// Overrides the translated submit button label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_label: Option<String>,
    /// Overrides the translated reset button label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_label: Option<String>,
}

/// Looks up a UI string by key; `None` falls back to the built-in label.
pub type Translator = Box<dyn Fn(&str) -> Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("the form is read-only")]
    ReadOnly,
    #[error("field [{0}] is read-only")]
    ReadOnlyField(String),
    #[error("field [{0}] is disabled")]
    Disabled(String),
    #[error("no field with key [{0}]")]
    UnknownField(String),
    #[error("response is bound to questionnaire '{found}', not '{expected}'")]
    QuestionnaireMismatch { expected: String, found: String },
    #[error(transparent)]
    State(#[from] StateError),
}

/// Callbacks fired by [`FormSession::submit`].
pub trait SubmitHooks {
    fn on_submit(&mut self, response: &QuestionnaireResponse);

    fn on_error(&mut self, _error: &FormError) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The response was handed to `on_submit`.
    Submitted(Serialized),
    /// Required or typed fields failed; nothing was submitted.
    Invalid(ValidationResult),
}

pub struct FormSession {
    questionnaire: Questionnaire,
    response: QuestionnaireResponse,
    tree: FieldTree,
    initial: FormState,
    state: FormState,
    options: FormOptions,
    translator: Option<Translator>,
    validated: bool,
}

impl FormSession {
    pub fn new(
        questionnaire: Questionnaire,
        response: QuestionnaireResponse,
        options: FormOptions,
    ) -> Self {
        let tree = builder::build(&questionnaire, &response, options.read_only);
        let initial = FormState::hydrate(&tree.fields, &response).massage_for_disabled(&tree.fields);
        Self {
            questionnaire,
            response,
            tree,
            state: initial.clone(),
            initial,
            options,
            translator: None,
            validated: false,
        }
    }

    pub fn with_translator(
        mut self,
        translator: impl Fn(&str) -> Option<String> + 'static,
    ) -> Self {
        self.translator = Some(Box::new(translator));
        self
    }

    pub fn title(&self) -> &str {
        &self.tree.title
    }

    pub fn fields(&self) -> &[Field] {
        &self.tree.fields
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    /// Diagnostics raised while building the field tree.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.tree.diagnostics
    }

    /// Whether a submit has been attempted since the last reset.
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn submit_label(&self) -> String {
        self.label(
            self.options.submit_label.as_deref(),
            SUBMIT_LABEL_KEY,
            DEFAULT_SUBMIT_LABEL,
        )
    }

    pub fn reset_label(&self) -> String {
        self.label(
            self.options.reset_label.as_deref(),
            RESET_LABEL_KEY,
            DEFAULT_RESET_LABEL,
        )
    }

    fn label(&self, configured: Option<&str>, key: &str, fallback: &str) -> String {
        configured
            .map(str::to_string)
            .or_else(|| self.translator.as_ref().and_then(|translate| translate(key)))
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn field(&self, key: &FieldKey) -> Option<&Field> {
        lookup::field_for_key(&self.tree.fields, key)
    }

    /// Replaces the values of one field instance, then resets whatever the
    /// edit disabled.
    pub fn update(&mut self, key: &FieldKey, values: Vec<String>) -> Result<(), FormError> {
        if self.options.read_only {
            return Err(FormError::ReadOnly);
        }
        let field = self
            .field(key)
            .filter(|field| !field.is_group() && self.state.get(key).is_some())
            .ok_or_else(|| FormError::UnknownField(key.to_string()))?;
        if field.read_only {
            return Err(FormError::ReadOnlyField(key.to_string()));
        }
        if field.is_disabled(&self.state, key) {
            return Err(FormError::Disabled(key.to_string()));
        }
        let next = self.state.set_values(key, values);
        self.state = next.massage_for_disabled(&self.tree.fields);
        Ok(())
    }

    /// Adds an instance of the repeating group named by `group_key` and
    /// returns its index.
    pub fn add_group_instance(&mut self, group_key: &FieldKey) -> Result<usize, FormError> {
        if self.options.read_only {
            return Err(FormError::ReadOnly);
        }
        let group = self
            .field(group_key)
            .ok_or_else(|| FormError::UnknownField(group_key.to_string()))?;
        let (next, index) = self.state.add_group_instance(group, group_key.scope())?;
        self.state = next.massage_for_disabled(&self.tree.fields);
        Ok(index)
    }

    pub fn remove_group_instance(
        &mut self,
        group_key: &FieldKey,
        index: usize,
    ) -> Result<(), FormError> {
        if self.options.read_only {
            return Err(FormError::ReadOnly);
        }
        let next = self.state.remove_group_instance(group_key, index)?;
        self.state = next.massage_for_disabled(&self.tree.fields);
        Ok(())
    }

    /// Restores the snapshot the session started from.
    pub fn reset(&mut self) {
        self.state = self.initial.clone();
        self.validated = false;
    }

    pub fn validate(&self) -> ValidationResult {
        validate(&self.tree.fields, &self.state)
    }

    pub fn render(&self) -> RenderPayload {
        build_render_payload(
            &self.tree.title,
            &self.tree.fields,
            &self.state,
            RenderActions {
                submit: self.submit_label(),
                reset: self.reset_label(),
            },
        )
    }

    /// Validates and serializes the form. A valid form goes to
    /// `on_submit`; failures that are not the user's go to `on_error`.
    pub fn submit(&mut self, hooks: &mut impl SubmitHooks) -> Result<SubmitOutcome, FormError> {
        if let Err(error) = self.check_binding() {
            tracing::error!(target: "fhir_form", %error, "submission withheld");
            hooks.on_error(&error);
            return Err(error);
        }

        self.validated = true;
        let validation = self.validate();
        if !validation.valid {
            tracing::debug!(
                target: "fhir_form",
                missing = validation.missing_required.len(),
                errors = validation.errors.len(),
                "form is not valid"
            );
            return Ok(SubmitOutcome::Invalid(validation));
        }

        let serialized = serialize(&self.response, &self.state, &self.tree.fields);
        hooks.on_submit(&serialized.response);
        Ok(SubmitOutcome::Submitted(serialized))
    }

    /// The response must reference this questionnaire by canonical url
    /// (optionally versioned) or by local `#id`. An unbound response is fine.
    fn check_binding(&self) -> Result<(), FormError> {
        let Some(found) = self.response.questionnaire.as_deref() else {
            return Ok(());
        };
        let canonical = found.split('|').next().unwrap_or(found);
        let by_url = self.questionnaire.url.as_deref() == Some(canonical);
        let by_id = canonical
            .strip_prefix('#')
            .is_some_and(|id| self.questionnaire.id.as_deref() == Some(id));
        let unidentified = self.questionnaire.url.is_none() && self.questionnaire.id.is_none();
        if by_url || by_id || unidentified {
            return Ok(());
        }
        Err(FormError::QuestionnaireMismatch {
            expected: self
                .questionnaire
                .url
                .clone()
                .or_else(|| self.questionnaire.id.clone())
                .unwrap_or_default(),
            found: found.to_string(),
        })
    }
}
