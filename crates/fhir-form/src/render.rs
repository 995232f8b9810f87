use serde_json::{Map, Value, json};

use crate::codec;
use crate::field::{ChoiceSource, Field};
use crate::key::{FieldKey, Scope};
use crate::state::FormState;
use crate::validate::validate;
use crate::visibility::resolve_visibility;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A required, enabled field is still empty or a value is invalid.
    NeedInput,
    /// The form can be submitted.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Progress counters exposed to renderers.
#[derive(Debug, Clone)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

/// Labels of the two form actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderActions {
    pub submit: String,
    pub reset: String,
}

/// One field instance as the widget layer sees it.
#[derive(Debug, Clone)]
pub struct RenderField {
    pub key: FieldKey,
    pub prefix: Option<String>,
    pub label: String,
    pub kind: String,
    pub required: bool,
    pub disabled: bool,
    pub read_only: bool,
    pub visible: bool,
    pub repeat: bool,
    pub values: Vec<String>,
    pub choices: Option<Vec<String>>,
    pub value_set: Option<String>,
    pub width: Option<String>,
}

/// A repeating group inside one scope, with its live instance indices.
#[derive(Debug, Clone)]
pub struct RenderGroup {
    pub key: FieldKey,
    pub label: String,
    pub instances: Vec<usize>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub form_title: String,
    pub status: RenderStatus,
    pub progress: RenderProgress,
    pub fields: Vec<RenderField>,
    pub groups: Vec<RenderGroup>,
    pub actions: RenderActions,
}

/// Build the renderer payload from the field tree and the current snapshot.
pub fn build_render_payload(
    title: &str,
    fields: &[Field],
    state: &FormState,
    actions: RenderActions,
) -> RenderPayload {
    let visibility = resolve_visibility(fields, state);
    let validation = validate(fields, state);

    let mut rendered = Vec::new();
    state.walk(fields, |field, key| {
        rendered.push(render_field(
            field,
            key,
            state,
            visibility.get(key).copied().unwrap_or(true),
        ));
    });

    let answerable: Vec<&RenderField> = rendered
        .iter()
        .filter(|field| field.visible && !field.disabled && field.kind != "display")
        .collect();
    let answered = answerable
        .iter()
        .filter(|field| field.values.iter().any(|value| !value.is_empty()))
        .count();

    let status = if validation.valid {
        RenderStatus::Complete
    } else {
        RenderStatus::NeedInput
    };

    RenderPayload {
        form_title: title.to_string(),
        status,
        progress: RenderProgress {
            answered,
            total: answerable.len(),
        },
        fields: rendered,
        groups: repeating_groups(fields, state),
        actions,
    }
}

fn render_field(field: &Field, key: &FieldKey, state: &FormState, visible: bool) -> RenderField {
    let (choices, value_set) = match &field.choices {
        ChoiceSource::Options(options) => (
            Some(options.iter().filter_map(codec::option_form_value).collect()),
            None,
        ),
        ChoiceSource::ValueSet(url) => (None, Some(url.clone())),
        ChoiceSource::None => (None, None),
    };
    RenderField {
        key: key.clone(),
        prefix: field.prefix.clone(),
        label: field.label.clone(),
        kind: field.kind.to_string(),
        required: field.required,
        disabled: field.is_disabled(state, key),
        read_only: field.read_only,
        visible,
        repeat: field.repeat,
        values: state.get(key).map(<[String]>::to_vec).unwrap_or_default(),
        choices,
        value_set,
        width: field.rendering.get("width").cloned(),
    }
}

fn repeating_groups(fields: &[Field], state: &FormState) -> Vec<RenderGroup> {
    let mut groups = Vec::new();
    let mut stack: Vec<(&Field, Scope)> = fields
        .iter()
        .rev()
        .map(|field| (field, Scope::root()))
        .collect();
    while let Some((field, scope)) = stack.pop() {
        if !field.is_group() {
            continue;
        }
        if !field.repeat {
            stack.extend(field.children.iter().rev().map(|child| (child, scope.clone())));
            continue;
        }
        let key = field.key_in(&scope);
        let instances = state
            .instances(&key)
            .map(|registry| registry.live().to_vec())
            .unwrap_or_default();
        for index in instances.iter().rev() {
            let inner = key.instance_scope(*index);
            stack.extend(field.children.iter().rev().map(|child| (child, inner.clone())));
        }
        groups.push(RenderGroup {
            key,
            label: field.label.clone(),
            instances,
        });
    }
    groups
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert("key".into(), Value::String(field.key.to_string()));
            map.insert("id".into(), Value::String(field.key.id().to_string()));
            map.insert("label".into(), Value::String(field.label.clone()));
            if let Some(prefix) = &field.prefix {
                map.insert("prefix".into(), Value::String(prefix.clone()));
            }
            map.insert("type".into(), Value::String(field.kind.clone()));
            map.insert("required".into(), Value::Bool(field.required));
            map.insert("disabled".into(), Value::Bool(field.disabled));
            map.insert("read_only".into(), Value::Bool(field.read_only));
            map.insert("visible".into(), Value::Bool(field.visible));
            map.insert("repeat".into(), Value::Bool(field.repeat));
            map.insert(
                "values".into(),
                Value::Array(field.values.iter().cloned().map(Value::String).collect()),
            );
            if let Some(choices) = &field.choices {
                map.insert(
                    "choices".into(),
                    Value::Array(choices.iter().cloned().map(Value::String).collect()),
                );
            }
            if let Some(value_set) = &field.value_set {
                map.insert("value_set".into(), Value::String(value_set.clone()));
            }
            if let Some(width) = &field.width {
                map.insert("width".into(), Value::String(width.clone()));
            }
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    let groups = payload
        .groups
        .iter()
        .map(|group| {
            json!({
                "key": group.key.to_string(),
                "label": group.label,
                "instances": group.instances,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "form_title": payload.form_title,
        "status": payload.status.as_str(),
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
        },
        "fields": fields,
        "groups": groups,
        "actions": {
            "submit": payload.actions.submit,
            "reset": payload.actions.reset,
        },
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {}", payload.form_title));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));

    for group in &payload.groups {
        lines.push(format!(
            "Group {} ({}): instances {:?}",
            group.key, group.label, group.instances
        ));
    }

    lines.push("Visible fields:".to_string());
    for field in payload.fields.iter().filter(|field| field.visible) {
        let mut entry = match &field.prefix {
            Some(prefix) => format!(" - {} {} ({})", field.key, prefix, field.label),
            None => format!(" - {} ({})", field.key, field.label),
        };
        if field.required {
            entry.push_str(" [required]");
        }
        if field.disabled {
            entry.push_str(" [disabled]");
        }
        let values: Vec<&str> = field
            .values
            .iter()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if !values.is_empty() {
            entry.push_str(&format!(" = {}", values.join(", ")));
        }
        lines.push(entry);
    }

    lines.push(format!(
        "Actions: [{}] [{}]",
        payload.actions.submit, payload.actions.reset
    ));
    lines.join("\n")
}
