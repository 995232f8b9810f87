use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Separator used by the text form of a scoped key.
pub const SCOPE_SEPARATOR: &str = "@@";

/// Chain of repeating-group instances a field lives in, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Scope(Vec<(String, usize)>);

impl Scope {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn levels(&self) -> &[(String, usize)] {
        &self.0
    }

    /// Scope of instance `index` of `group` nested in this scope.
    pub fn instance(&self, group: impl Into<String>, index: usize) -> Scope {
        let mut levels = self.0.clone();
        levels.push((group.into(), index));
        Scope(levels)
    }

    /// The first `depth` levels of this scope.
    pub fn truncated(&self, depth: usize) -> Scope {
        Scope(self.0[..depth.min(self.0.len())].to_vec())
    }

    pub fn starts_with(&self, prefix: &Scope) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// This scope and every enclosing instance scope, innermost first. The
    /// root scope is never yielded for a non-root scope.
    pub fn enclosing(&self) -> impl Iterator<Item = Scope> + '_ {
        let lowest = if self.is_root() { 0 } else { 1 };
        (lowest..=self.depth()).rev().map(|depth| self.truncated(depth))
    }
}

/// Identifier of one value slot in the form state: a schema link id
/// qualified by the group instances it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldKey {
    scope: Scope,
    id: String,
}

impl FieldKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            scope: Scope::root(),
            id: id.into(),
        }
    }

    pub fn scoped(scope: Scope, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_scoped(&self) -> bool {
        !self.scope.is_root()
    }

    /// Same scope, different link id: how sibling references resolve.
    pub fn sibling(&self, id: impl Into<String>) -> FieldKey {
        FieldKey::scoped(self.scope.clone(), id)
    }

    /// Scope of instance `index` when this key names a repeating group.
    pub fn instance_scope(&self, index: usize) -> Scope {
        self.scope.instance(self.id.clone(), index)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (group, index) in self.scope.levels() {
            write!(f, "{group}{SCOPE_SEPARATOR}{index}{SCOPE_SEPARATOR}")?;
        }
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("field key is empty")]
    Empty,
    #[error("field key '{0}' has an unbalanced scope chain")]
    Unbalanced(String),
    #[error("field key '{key}' has a non-numeric instance index '{index}'")]
    BadIndex { key: String, index: String },
}

impl FromStr for FieldKey {
    type Err = KeyParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let parts: Vec<&str> = text.split(SCOPE_SEPARATOR).collect();
        if parts.len() % 2 == 0 {
            return Err(KeyParseError::Unbalanced(text.to_string()));
        }

        let mut scope = Scope::root();
        for pair in parts[..parts.len() - 1].chunks(2) {
            let index = pair[1]
                .parse::<usize>()
                .map_err(|_| KeyParseError::BadIndex {
                    key: text.to_string(),
                    index: pair[1].to_string(),
                })?;
            scope = scope.instance(pair[0], index);
        }
        Ok(FieldKey::scoped(scope, parts[parts.len() - 1]))
    }
}

impl Serialize for FieldKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
