use crate::field::Field;
use crate::key::FieldKey;
use crate::state::FormState;

pub type VisibilityMap = std::collections::BTreeMap<FieldKey, bool>;

/// Visibility of every field instance under the current snapshot. A field
/// is shown unless it carries the hidden extension or it is disabled and
/// its disabled display is not `protected`.
pub fn resolve_visibility(fields: &[Field], state: &FormState) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    state.walk(fields, |field, key| {
        map.insert(key.clone(), is_visible(field, state, key));
    });
    map
}

pub fn is_visible(field: &Field, state: &FormState, key: &FieldKey) -> bool {
    if field.hidden {
        return false;
    }
    !(field.hide_on_disabled && field.is_disabled(state, key))
}
