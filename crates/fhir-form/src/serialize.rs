//! Writes form state back into a copy of a response record.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::codec::{self, Encoding};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::field::Field;
use crate::key::{FieldKey, Scope};
use crate::lookup::{self, ItemPath};
use crate::model::{
    Answer, QuestionnaireResponse, QuestionnaireResponseAnswer, QuestionnaireResponseItem,
};
use crate::state::FormState;

/// Updated response record plus the keys that could not be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Serialized {
    pub response: QuestionnaireResponse,
    pub diagnostics: Diagnostics,
}

/// Merges `state` into a clone of `response`. The input is left untouched.
pub fn serialize(
    response: &QuestionnaireResponse,
    state: &FormState,
    fields: &[Field],
) -> Serialized {
    let mut response = response.clone();
    let mut diagnostics = Diagnostics::new();

    prune_removed_instances(&mut response.item, state);

    for (key, values) in state.values() {
        let Some(field) = lookup::field_for_key(fields, key) else {
            diagnostics.push(Diagnostic::UnknownField {
                key: key.to_string(),
            });
            continue;
        };
        write_field(&mut response.item, state, field, key, values, &mut diagnostics);
    }

    Serialized {
        response,
        diagnostics,
    }
}

fn write_field(
    items: &mut Vec<QuestionnaireResponseItem>,
    state: &FormState,
    field: &Field,
    key: &FieldKey,
    values: &[String],
    diagnostics: &mut Diagnostics,
) {
    let encoding = field.encoding();
    if encoding == Encoding::Unsupported {
        if values.iter().any(|value| !value.is_empty()) {
            diagnostics.push(Diagnostic::UnsupportedType {
                key: key.to_string(),
                kind: field.kind.to_string(),
            });
        }
        return;
    }

    let Some(container) = resolve_scope(items, state, key, diagnostics) else {
        return;
    };
    let Some(path) = lookup::find_first(items, &container, key.id()) else {
        diagnostics.push(Diagnostic::MissingResponseItem {
            key: key.to_string(),
        });
        return;
    };

    if encoding == Encoding::MissingChoices {
        diagnostics.push(Diagnostic::ChoiceWithoutOptions {
            key: key.to_string(),
        });
    }
    let (answers, failures) = codec::encode_all(values, encoding);
    for (value, error) in failures {
        diagnostics.push(Diagnostic::InvalidValue {
            key: key.to_string(),
            value,
            reason: error.to_string(),
        });
    }
    if let Some(node) = lookup::node_mut(items, &path) {
        let previous = node.answer.take();
        node.answer = answers.map(|answers| merge_answers(previous, answers));
    }
}

/// Entries whose value is unchanged keep their extra members.
fn merge_answers(
    previous: Option<Vec<QuestionnaireResponseAnswer>>,
    answers: Vec<Answer>,
) -> Vec<QuestionnaireResponseAnswer> {
    let mut previous = previous.unwrap_or_default().into_iter();
    answers
        .into_iter()
        .map(|value| match previous.next() {
            Some(entry) if entry.value == value => entry,
            _ => value.into(),
        })
        .collect()
}

/// Walks the key's scope chain, materializing missing group instances from
/// a blank copy of the first sibling. Returns the path of the innermost
/// instance.
fn resolve_scope(
    items: &mut Vec<QuestionnaireResponseItem>,
    state: &FormState,
    key: &FieldKey,
    diagnostics: &mut Diagnostics,
) -> Option<ItemPath> {
    let mut container = ItemPath::root();
    for (depth, (group, index)) in key.scope().levels().iter().enumerate() {
        let missing = || Diagnostic::MissingInstance {
            key: key.to_string(),
            group: group.clone(),
            index: *index,
        };
        let group_key = FieldKey::scoped(key.scope().truncated(depth), group.clone());
        let position = match state.instances(&group_key) {
            Some(registry) => registry.position(*index),
            None => Some(*index),
        };
        let Some(position) = position else {
            diagnostics.push(missing());
            return None;
        };

        let Some(mut siblings) = lookup::find_siblings(items, &container, group) else {
            diagnostics.push(Diagnostic::MissingGroup {
                key: key.to_string(),
                group: group.clone(),
            });
            return None;
        };
        while siblings.len() <= position {
            let Some(parent) = lookup::children_mut(items, &siblings.parent) else {
                diagnostics.push(missing());
                return None;
            };
            let instance = blank_instance(&parent[siblings.positions[0]]);
            let after_last = siblings.positions[siblings.len() - 1] + 1;
            parent.insert(after_last, instance);
            siblings.positions.push(after_last);
        }
        let Some(path) = siblings.path(position) else {
            diagnostics.push(missing());
            return None;
        };
        container = path;
    }
    Some(container)
}

/// Copy of `template` with every answer stripped and every repeated child
/// collapsed to its first occurrence, matching the single seeded instance
/// of each nested group.
fn blank_instance(template: &QuestionnaireResponseItem) -> QuestionnaireResponseItem {
    let mut instance = template.clone();
    instance.clear_answers();
    let mut stack: Vec<&mut QuestionnaireResponseItem> = vec![&mut instance];
    while let Some(node) = stack.pop() {
        let mut seen = BTreeSet::new();
        node.item.retain(|child| seen.insert(child.link_id.clone()));
        stack.extend(node.item.iter_mut());
    }
    instance
}

/// Drops the response siblings of instances removed from the form, outer
/// groups first so inner positions resolve against the pruned tree.
fn prune_removed_instances(items: &mut Vec<QuestionnaireResponseItem>, state: &FormState) {
    let mut registries: Vec<_> = state
        .registries()
        .iter()
        .filter(|(_, registry)| !registry.removed().is_empty())
        .collect();
    registries.sort_by_key(|(group_key, _)| group_key.scope().depth());

    for (group_key, registry) in registries {
        let Some(container) = existing_instance(items, state, group_key.scope()) else {
            continue;
        };
        let Some(siblings) = lookup::find_siblings(items, &container, group_key.id()) else {
            continue;
        };
        let Some(parent) = lookup::children_mut(items, &siblings.parent) else {
            continue;
        };
        for removed in registry.removed().into_iter().rev() {
            if let Some(position) = siblings.positions.get(removed) {
                tracing::debug!(
                    target: "fhir_form",
                    group = %group_key,
                    index = removed,
                    "dropping removed instance from response"
                );
                parent.remove(*position);
            }
        }
    }
}

/// Path of an instance scope that already exists in the response. Unlike
/// [`resolve_scope`] nothing is created.
fn existing_instance(
    items: &[QuestionnaireResponseItem],
    state: &FormState,
    scope: &Scope,
) -> Option<ItemPath> {
    let mut container = ItemPath::root();
    for (depth, (group, index)) in scope.levels().iter().enumerate() {
        let group_key = FieldKey::scoped(scope.truncated(depth), group.clone());
        let position = match state.instances(&group_key) {
            Some(registry) => registry.position(*index)?,
            None => *index,
        };
        container = lookup::find_siblings(items, &container, group)?.path(position)?;
    }
    Some(container)
}
