//! Identifier lookups over arbitrarily nested trees (response items, schema
//! items, fields). Walks use an explicit stack and hand back positions as
//! [`ItemPath`]s rather than references, so callers can re-borrow mutably.

use crate::field::Field;
use crate::key::FieldKey;
use crate::model::{QuestionnaireItem, QuestionnaireResponseItem};

/// A node of a tree addressed by link id.
pub trait TreeNode: Sized {
    fn node_id(&self) -> &str;
    fn node_children(&self) -> &[Self];
    fn node_children_mut(&mut self) -> &mut Vec<Self>;
}

impl TreeNode for QuestionnaireResponseItem {
    fn node_id(&self) -> &str {
        &self.link_id
    }

    fn node_children(&self) -> &[Self] {
        &self.item
    }

    fn node_children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.item
    }
}

impl TreeNode for QuestionnaireItem {
    fn node_id(&self) -> &str {
        &self.link_id
    }

    fn node_children(&self) -> &[Self] {
        &self.item
    }

    fn node_children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.item
    }
}

impl TreeNode for Field {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn node_children(&self) -> &[Self] {
        &self.children
    }

    fn node_children_mut(&mut self) -> &mut Vec<Self> {
        &mut self.children
    }
}

/// Child indices from the top-level list down to one node. The empty path
/// addresses the top-level list itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemPath(Vec<usize>);

impl ItemPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> ItemPath {
        let mut indices = self.0.clone();
        indices.push(index);
        ItemPath(indices)
    }
}

/// Nodes sharing one link id under a common parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingSet {
    pub parent: ItemPath,
    /// Positions in the parent's child list, ascending.
    pub positions: Vec<usize>,
}

impl SiblingSet {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Path of the `nth` sibling.
    pub fn path(&self, nth: usize) -> Option<ItemPath> {
        self.positions
            .get(nth)
            .map(|position| self.parent.child(*position))
    }
}

pub fn node<'a, T: TreeNode>(items: &'a [T], path: &ItemPath) -> Option<&'a T> {
    let (last, parents) = path.indices().split_last()?;
    children(items, &ItemPath(parents.to_vec()))?.get(*last)
}

pub fn node_mut<'a, T: TreeNode>(items: &'a mut Vec<T>, path: &ItemPath) -> Option<&'a mut T> {
    let (last, parents) = path.indices().split_last()?;
    children_mut(items, &ItemPath(parents.to_vec()))?.get_mut(*last)
}

/// Child list of the node at `path` (the top-level list for the root path).
pub fn children<'a, T: TreeNode>(items: &'a [T], path: &ItemPath) -> Option<&'a [T]> {
    let mut current = items;
    for index in path.indices() {
        current = current.get(*index)?.node_children();
    }
    Some(current)
}

pub fn children_mut<'a, T: TreeNode>(
    items: &'a mut Vec<T>,
    path: &ItemPath,
) -> Option<&'a mut Vec<T>> {
    let mut current = items;
    for index in path.indices() {
        current = current.get_mut(*index)?.node_children_mut();
    }
    Some(current)
}

/// First node with `id` below `within`, depth-first in document order.
pub fn find_first<T: TreeNode>(items: &[T], within: &ItemPath, id: &str) -> Option<ItemPath> {
    let start = children(items, within)?;
    let mut stack: Vec<(ItemPath, &T)> = start
        .iter()
        .enumerate()
        .rev()
        .map(|(index, child)| (within.child(index), child))
        .collect();

    while let Some((path, current)) = stack.pop() {
        if current.node_id() == id {
            return Some(path);
        }
        stack.extend(
            current
                .node_children()
                .iter()
                .enumerate()
                .rev()
                .map(|(index, child)| (path.child(index), child)),
        );
    }
    None
}

/// All siblings with `id` under the first parent below `within` that has
/// any. Each parent's own children are checked before descending further.
pub fn find_siblings<T: TreeNode>(items: &[T], within: &ItemPath, id: &str) -> Option<SiblingSet> {
    let mut stack = vec![within.clone()];

    while let Some(parent) = stack.pop() {
        let Some(list) = children(items, &parent) else {
            continue;
        };
        let positions: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, child)| child.node_id() == id)
            .map(|(position, _)| position)
            .collect();
        if !positions.is_empty() {
            return Some(SiblingSet { parent, positions });
        }
        stack.extend(
            list.iter()
                .enumerate()
                .rev()
                .filter(|(_, child)| !child.node_children().is_empty())
                .map(|(position, _)| parent.child(position)),
        );
    }
    None
}

/// First node with `id` anywhere in the tree.
pub fn find<'a, T: TreeNode>(items: &'a [T], id: &str) -> Option<&'a T> {
    find_first(items, &ItemPath::root(), id).and_then(|path| node(items, &path))
}

/// Field declared for `key`, following the key's group chain. Groups that
/// do not repeat are transparent, so each step searches depth-first.
pub fn field_for_key<'a>(fields: &'a [Field], key: &FieldKey) -> Option<&'a Field> {
    let mut scope_fields = fields;
    for (group, _) in key.scope().levels() {
        scope_fields = &find(scope_fields, group)?.children;
    }
    find(scope_fields, key.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, children: Vec<QuestionnaireResponseItem>) -> QuestionnaireResponseItem {
        QuestionnaireResponseItem::new(id).with_items(children)
    }

    fn sample() -> Vec<QuestionnaireResponseItem> {
        vec![
            item("a", vec![item("a1", vec![]), item("shared", vec![])]),
            item(
                "b",
                vec![
                    item("g", vec![item("leaf", vec![])]),
                    item("note", vec![]),
                    item("g", vec![item("leaf", vec![])]),
                ],
            ),
            item("shared", vec![]),
        ]
    }

    #[test]
    fn find_first_is_depth_first() {
        let items = sample();
        let path = find_first(&items, &ItemPath::root(), "shared").unwrap();
        assert_eq!(path.indices(), &[0, 1]);
        assert!(find_first(&items, &ItemPath::root(), "missing").is_none());
    }

    #[test]
    fn find_first_respects_container() {
        let items = sample();
        let within = ItemPath::root().child(1).child(2);
        let path = find_first(&items, &within, "leaf").unwrap();
        assert_eq!(path.indices(), &[1, 2, 0]);
    }

    #[test]
    fn siblings_are_collected_under_first_parent() {
        let items = sample();
        let siblings = find_siblings(&items, &ItemPath::root(), "g").unwrap();
        assert_eq!(siblings.parent.indices(), &[1]);
        assert_eq!(siblings.positions, vec![0, 2]);
        assert_eq!(siblings.path(1).unwrap().indices(), &[1, 2]);
    }

    #[test]
    fn mutable_access_follows_path() {
        let mut items = sample();
        let path = ItemPath::root().child(1).child(1);
        node_mut(&mut items, &path).unwrap().link_id = "renamed".into();
        assert_eq!(node(&items, &path).unwrap().link_id, "renamed");
        assert_eq!(children_mut(&mut items, &ItemPath::root()).unwrap().len(), 3);
    }
}
