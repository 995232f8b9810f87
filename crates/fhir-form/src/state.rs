use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::codec;
use crate::field::Field;
use crate::key::{FieldKey, Scope};
use crate::lookup::{self, ItemPath};
use crate::model::{QuestionnaireResponse, QuestionnaireResponseItem};

/// Instance bookkeeping for one repeating group inside one enclosing scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GroupInstances {
    live: Vec<usize>,
    next: usize,
}

impl GroupInstances {
    fn seeded(count: usize) -> Self {
        Self {
            live: (0..count).collect(),
            next: count,
        }
    }

    /// Live instance indices in creation order (always ascending).
    pub fn live(&self) -> &[usize] {
        &self.live
    }

    pub fn contains(&self, index: usize) -> bool {
        self.live.contains(&index)
    }

    /// Indices handed out and later removed.
    pub fn removed(&self) -> Vec<usize> {
        (0..self.next)
            .filter(|index| !self.live.contains(index))
            .collect()
    }

    /// Rank of a live instance among the live ones.
    pub fn position(&self, index: usize) -> Option<usize> {
        self.live.iter().position(|live| *live == index)
    }

    fn allocate(&mut self) -> usize {
        let index = self.next;
        self.next += 1;
        self.live.push(index);
        index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("field [{0}] is not a repeatable group")]
    NotRepeatable(String),
    #[error("no instances registered for group [{0}]")]
    UnknownGroup(String),
    #[error("group [{group}] has no live instance {index}")]
    UnknownInstance { group: String, index: usize },
}

/// Snapshot of every form value plus the live repeating-group instances.
///
/// Snapshots are never mutated in place: each edit returns a new one.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FormState {
    values: BTreeMap<FieldKey, Vec<String>>,
    instances: BTreeMap<FieldKey, GroupInstances>,
    /// Values each key was seeded with; disabled fields fall back to these.
    #[serde(skip)]
    seeds: BTreeMap<FieldKey, Vec<String>>,
}

impl FormState {
    /// Seeds every field from its template initial value, with one live
    /// instance per repeating group.
    pub fn initialize_all(fields: &[Field]) -> FormState {
        let mut state = FormState::default();
        state.seed(fields, &Scope::root());
        state
    }

    /// Like [`FormState::initialize_all`], but repeating groups get one
    /// instance per matching response node and decode their values from it.
    pub fn hydrate(fields: &[Field], response: &QuestionnaireResponse) -> FormState {
        let mut state = FormState::default();
        let items = &response.item;
        let mut stack: Vec<(&Field, Scope, Option<ItemPath>)> = fields
            .iter()
            .rev()
            .map(|field| (field, Scope::root(), Some(ItemPath::root())))
            .collect();

        while let Some((field, scope, container)) = stack.pop() {
            if field.is_repeating_group() {
                let siblings = container
                    .as_ref()
                    .and_then(|within| lookup::find_siblings(items, within, &field.id));
                let group_key = field.key_in(&scope);
                let count = siblings.as_ref().map_or(1, |set| set.len());
                state
                    .instances
                    .insert(group_key.clone(), GroupInstances::seeded(count));
                for index in (0..count).rev() {
                    let instance_scope = group_key.instance_scope(index);
                    let instance_path = siblings.as_ref().and_then(|set| set.path(index));
                    stack.extend(
                        field
                            .children
                            .iter()
                            .rev()
                            .map(|child| (child, instance_scope.clone(), instance_path.clone())),
                    );
                }
            } else if field.is_group() {
                let within = container.as_ref().map(|within| {
                    lookup::find_first(items, within, &field.id).unwrap_or_else(|| within.clone())
                });
                stack.extend(
                    field
                        .children
                        .iter()
                        .rev()
                        .map(|child| (child, scope.clone(), within.clone())),
                );
            } else {
                let values = match &container {
                    Some(within) => {
                        decoded_values(field, items, within).unwrap_or_else(|| {
                            if scope.is_root() {
                                vec![field.initial_value.clone()]
                            } else {
                                vec![field.option_default()]
                            }
                        })
                    }
                    None => vec![field.initial_value.clone()],
                };
                state.insert_seed(field.key_in(&scope), values);
            }
        }
        state
    }

    pub fn get(&self, key: &FieldKey) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    /// First value of a key, or the empty string.
    pub fn first(&self, key: &FieldKey) -> &str {
        self.get(key)
            .and_then(|values| values.first())
            .map_or("", String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<FieldKey, Vec<String>> {
        &self.values
    }

    pub fn instances(&self, group_key: &FieldKey) -> Option<&GroupInstances> {
        self.instances.get(group_key)
    }

    /// Every instance registry, keyed by the group's scoped key.
    pub fn registries(&self) -> &BTreeMap<FieldKey, GroupInstances> {
        &self.instances
    }

    pub fn set_values(&self, key: &FieldKey, values: Vec<String>) -> FormState {
        let mut next = self.clone();
        next.values.insert(key.clone(), values);
        next
    }

    /// Values `key` was seeded with when its instance was created.
    pub fn initial(&self, key: &FieldKey) -> Option<&[String]> {
        self.seeds.get(key).map(Vec::as_slice)
    }

    /// Resets every disabled field to its initial value. Passes repeat until
    /// one changes nothing, since a reset can disable later fields.
    pub fn massage_for_disabled(&self, fields: &[Field]) -> FormState {
        let mut next = self.clone();
        loop {
            let mut changed = false;
            self.walk(fields, |field, key| {
                if !field.is_disabled(&next, key) {
                    return;
                }
                let initial = next
                    .initial(key)
                    .map(<[String]>::to_vec)
                    .unwrap_or_else(|| vec![field.initial_value.clone()]);
                if next.get(key) != Some(initial.as_slice()) {
                    tracing::debug!(target: "fhir_form", field = %key, "resetting disabled field");
                    next.values.insert(key.clone(), initial);
                    changed = true;
                }
            });
            if !changed {
                return next;
            }
        }
    }

    /// Appends an instance of `group` inside `scope`, seeded from template
    /// values. Indices are never reused.
    pub fn add_group_instance(
        &self,
        group: &Field,
        scope: &Scope,
    ) -> Result<(FormState, usize), StateError> {
        if !group.is_repeating_group() {
            return Err(StateError::NotRepeatable(group.id.clone()));
        }
        let group_key = group.key_in(scope);
        let mut next = self.clone();
        let registry = next
            .instances
            .get_mut(&group_key)
            .ok_or_else(|| StateError::UnknownGroup(group_key.to_string()))?;
        let index = registry.allocate();
        next.seed(&group.children, &group_key.instance_scope(index));
        tracing::debug!(target: "fhir_form", group = %group_key, index, "added group instance");
        Ok((next, index))
    }

    /// Deletes exactly one instance (and everything nested in it). Other
    /// instances keep their indices.
    pub fn remove_group_instance(
        &self,
        group_key: &FieldKey,
        index: usize,
    ) -> Result<FormState, StateError> {
        let mut next = self.clone();
        let registry = next
            .instances
            .get_mut(group_key)
            .ok_or_else(|| StateError::UnknownGroup(group_key.to_string()))?;
        let position = registry
            .position(index)
            .ok_or_else(|| StateError::UnknownInstance {
                group: group_key.to_string(),
                index,
            })?;
        registry.live.remove(position);

        let removed = group_key.instance_scope(index);
        next.values.retain(|key, _| !key.scope().starts_with(&removed));
        next.seeds.retain(|key, _| !key.scope().starts_with(&removed));
        next.instances
            .retain(|key, _| !key.scope().starts_with(&removed));
        tracing::debug!(target: "fhir_form", group = %group_key, index, "removed group instance");
        Ok(next)
    }

    /// Calls `visit` with every non-group field and its key, across every
    /// live instance.
    pub fn walk<'a>(&self, fields: &'a [Field], mut visit: impl FnMut(&'a Field, &FieldKey)) {
        let mut stack: Vec<(&Field, Scope)> = fields
            .iter()
            .rev()
            .map(|field| (field, Scope::root()))
            .collect();
        while let Some((field, scope)) = stack.pop() {
            if field.is_repeating_group() {
                let group_key = field.key_in(&scope);
                let live = self
                    .instances
                    .get(&group_key)
                    .map(|registry| registry.live.clone())
                    .unwrap_or_default();
                for index in live.into_iter().rev() {
                    let instance_scope = group_key.instance_scope(index);
                    stack.extend(
                        field
                            .children
                            .iter()
                            .rev()
                            .map(|child| (child, instance_scope.clone())),
                    );
                }
            } else if field.is_group() {
                stack.extend(
                    field
                        .children
                        .iter()
                        .rev()
                        .map(|child| (child, scope.clone())),
                );
            } else {
                visit(field, &field.key_in(&scope));
            }
        }
    }

    fn seed(&mut self, fields: &[Field], scope: &Scope) {
        let mut stack: Vec<(&Field, Scope)> = fields
            .iter()
            .rev()
            .map(|field| (field, scope.clone()))
            .collect();
        while let Some((field, scope)) = stack.pop() {
            if field.is_repeating_group() {
                let group_key = field.key_in(&scope);
                self.instances
                    .insert(group_key.clone(), GroupInstances::seeded(1));
                let instance_scope = group_key.instance_scope(0);
                stack.extend(
                    field
                        .children
                        .iter()
                        .rev()
                        .map(|child| (child, instance_scope.clone())),
                );
            } else if field.is_group() {
                stack.extend(
                    field
                        .children
                        .iter()
                        .rev()
                        .map(|child| (child, scope.clone())),
                );
            } else {
                self.insert_seed(field.key_in(&scope), vec![field.initial_value.clone()]);
            }
        }
    }

    fn insert_seed(&mut self, key: FieldKey, values: Vec<String>) {
        self.seeds.insert(key.clone(), values.clone());
        self.values.insert(key, values);
    }
}

fn decoded_values(
    field: &Field,
    items: &[QuestionnaireResponseItem],
    within: &ItemPath,
) -> Option<Vec<String>> {
    let path = lookup::find_first(items, within, &field.id)?;
    let answers = lookup::node(items, &path)?.answer.as_ref()?;
    if answers.is_empty() {
        return None;
    }
    let encoding = field.encoding();
    Some(
        answers
            .iter()
            .map(|answer| codec::decode(&answer.value, encoding))
            .collect(),
    )
}
