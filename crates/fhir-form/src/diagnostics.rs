use serde::Serialize;
use thiserror::Error;

/// Non-fatal finding raised while building or serializing a form. Each one
/// is resolved with a safe default by the code that raises it.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error(
        "enableWhen not supported for operator [{operator}] with type [{operand}] for question [{field}]"
    )]
    UnsupportedEnableWhen {
        field: String,
        question: String,
        operator: String,
        operand: String,
    },
    #[error("cannot convert answers for field [{key}] of type [{kind}]")]
    UnsupportedType { key: String, kind: String },
    #[error("choice field [{key}] has neither answer options nor a value set")]
    ChoiceWithoutOptions { key: String },
    #[error("dropping value '{value}' for field [{key}]: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("no response item found for field [{key}]")]
    MissingResponseItem { key: String },
    #[error("group [{group}] not found in response for field [{key}]")]
    MissingGroup { key: String, group: String },
    #[error("group [{group}] has no instance {index} for field [{key}]")]
    MissingInstance {
        key: String,
        group: String,
        index: usize,
    },
    #[error("no field declared for key [{key}]")]
    UnknownField { key: String },
}

/// Collects diagnostics and mirrors each one to the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(target: "fhir_form", "{diagnostic}");
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diagnostics_serialize_with_their_variant_name() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::UnsupportedType {
            key: "scan".into(),
            kind: "reference".into(),
        });

        assert_eq!(
            serde_json::to_value(&diagnostics).expect("serialize"),
            json!([{ "diagnostic": "unsupported_type", "key": "scan", "kind": "reference" }])
        );
    }
}
