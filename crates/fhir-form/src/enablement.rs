use serde::Serialize;

use crate::codec::{coding_to_form, decimal_to_form};
use crate::diagnostics::Diagnostic;
use crate::key::FieldKey;
use crate::model::{DisabledDisplay, EnableBehavior, EnableWhen, Operator, QuestionnaireItem};
use crate::state::FormState;

/// Ordering comparison applied to numeric answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Comparison {
    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Less => left < right,
            Comparison::Greater => left > right,
            Comparison::LessOrEqual => left <= right,
            Comparison::GreaterOrEqual => left >= right,
        }
    }
}

/// Numeric operand of an ordering comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Bound {
    Decimal(f64),
    /// Integer operands compare against the truncated answer value.
    Integer(i64),
}

impl Bound {
    fn admits(self, comparison: Comparison, answer: &str) -> bool {
        let Ok(parsed) = answer.trim().parse::<f64>() else {
            return false;
        };
        match self {
            Bound::Decimal(bound) => comparison.holds(parsed, bound),
            Bound::Integer(bound) => comparison.holds(parsed.trunc(), bound as f64),
        }
    }
}

/// Compiled form of one enableWhen condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Check {
    /// `true`: some answer is non-empty. `false`: every answer is non-empty.
    Exists { expected: bool },
    Equals { value: String },
    NotEquals { value: String },
    Compare { comparison: Comparison, bound: Bound },
    /// Operator/operand pair outside the supported matrix. Always holds.
    Unsupported { operator: String, operand: String },
}

/// One condition: a check against another question's current answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnableRule {
    pub question: String,
    pub check: Check,
}

impl EnableRule {
    /// Compiles an enableWhen entry. Unsupported combinations compile to
    /// [`Check::Unsupported`] and come back with a diagnostic.
    pub fn compile(field_id: &str, condition: &EnableWhen) -> (Self, Option<Diagnostic>) {
        let check = compile_check(condition);
        let diagnostic = match &check {
            Check::Unsupported { operator, operand } => Some(Diagnostic::UnsupportedEnableWhen {
                field: field_id.to_string(),
                question: condition.question.clone(),
                operator: operator.clone(),
                operand: operand.clone(),
            }),
            _ => None,
        };
        let rule = EnableRule {
            question: condition.question.clone(),
            check,
        };
        (rule, diagnostic)
    }

    /// Evaluates the rule for the field instance addressed by `key`.
    pub fn holds(&self, state: &FormState, key: &FieldKey) -> bool {
        let answers = resolve_answers(state, key, &self.question);
        match &self.check {
            Check::Exists { expected: true } => {
                answers.is_some_and(|values| values.iter().any(|value| !value.is_empty()))
            }
            Check::Exists { expected: false } => {
                answers.is_some_and(|values| values.iter().all(|value| !value.is_empty()))
            }
            Check::Equals { value } => {
                answers.is_some_and(|values| values.iter().any(|answer| answer == value))
            }
            Check::NotEquals { value } => {
                answers.is_some_and(|values| values.iter().any(|answer| answer != value))
            }
            Check::Compare { comparison, bound } => answers
                .is_some_and(|values| values.iter().any(|answer| bound.admits(*comparison, answer))),
            Check::Unsupported { .. } => true,
        }
    }
}

/// Looks the referenced question up in the evaluating field's own instance
/// first, then in each enclosing instance. Unscoped fields read bare ids.
fn resolve_answers<'a>(
    state: &'a FormState,
    key: &FieldKey,
    question: &str,
) -> Option<&'a [String]> {
    key.scope()
        .enclosing()
        .find_map(|scope| state.get(&FieldKey::scoped(scope, question)))
}

enum Operand {
    Boolean(bool),
    Decimal(f64),
    Integer(i64),
    Text(&'static str, String),
    Coding(String),
    Other(&'static str),
}

impl Operand {
    fn of(condition: &EnableWhen) -> Operand {
        if let Some(value) = condition.answer_boolean {
            Operand::Boolean(value)
        } else if let Some(value) = condition.answer_decimal {
            Operand::Decimal(value)
        } else if let Some(value) = condition.answer_integer {
            Operand::Integer(value)
        } else if let Some(value) = &condition.answer_date {
            Operand::Text("date", value.clone())
        } else if let Some(value) = &condition.answer_date_time {
            Operand::Text("dateTime", value.clone())
        } else if let Some(value) = &condition.answer_time {
            Operand::Text("time", value.clone())
        } else if let Some(value) = &condition.answer_string {
            Operand::Text("string", value.clone())
        } else if let Some(coding) = &condition.answer_coding {
            Operand::Coding(coding_to_form(coding))
        } else if condition.answer_quantity.is_some() {
            Operand::Other("Quantity")
        } else {
            Operand::Other("Reference")
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Operand::Boolean(_) => "boolean",
            Operand::Decimal(_) => "decimal",
            Operand::Integer(_) => "integer",
            Operand::Text(name, _) | Operand::Other(name) => *name,
            Operand::Coding(_) => "Coding",
        }
    }

    fn form_value(&self) -> Option<String> {
        match self {
            Operand::Boolean(value) => Some(value.to_string()),
            Operand::Decimal(value) => Some(decimal_to_form(*value)),
            Operand::Integer(value) => Some(value.to_string()),
            Operand::Text(_, value) | Operand::Coding(value) => Some(value.clone()),
            Operand::Other(_) => None,
        }
    }

    fn bound(&self) -> Option<Bound> {
        match self {
            Operand::Decimal(value) => Some(Bound::Decimal(*value)),
            Operand::Integer(value) => Some(Bound::Integer(*value)),
            _ => None,
        }
    }
}

fn compile_check(condition: &EnableWhen) -> Check {
    let operand = Operand::of(condition);
    let compiled = match condition.operator {
        Operator::Exists => condition
            .answer_boolean
            .map(|expected| Check::Exists { expected }),
        Operator::Equal => operand.form_value().map(|value| Check::Equals { value }),
        Operator::NotEqual => operand.form_value().map(|value| Check::NotEquals { value }),
        Operator::Less => operand.bound().map(|bound| Check::Compare {
            comparison: Comparison::Less,
            bound,
        }),
        Operator::Greater => operand.bound().map(|bound| Check::Compare {
            comparison: Comparison::Greater,
            bound,
        }),
        Operator::LessOrEqual => operand.bound().map(|bound| Check::Compare {
            comparison: Comparison::LessOrEqual,
            bound,
        }),
        Operator::GreaterOrEqual => operand.bound().map(|bound| Check::Compare {
            comparison: Comparison::GreaterOrEqual,
            bound,
        }),
    };
    compiled.unwrap_or_else(|| Check::Unsupported {
        operator: condition.operator.as_str().to_string(),
        operand: operand.type_name().to_string(),
    })
}

/// Everything that decides whether a field is enabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Enablement {
    pub rules: Vec<EnableRule>,
    pub behavior: EnableBehavior,
    /// `disabledDisplay: protected` keeps the field disabled whatever the rules say.
    pub protected: bool,
    /// Whole-form read-only mode.
    pub forced_disabled: bool,
}

impl Enablement {
    /// Compiles the enablement of a questionnaire item, returning any
    /// diagnostics raised by unsupported conditions.
    pub fn compile(item: &QuestionnaireItem, read_only_mode: bool) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let rules = item
            .enable_when
            .iter()
            .map(|condition| {
                let (rule, diagnostic) = EnableRule::compile(&item.link_id, condition);
                diagnostics.extend(diagnostic);
                rule
            })
            .collect();
        let enablement = Enablement {
            rules,
            behavior: item.enable_behavior.unwrap_or_default(),
            protected: item.disabled_display == Some(DisabledDisplay::Protected),
            forced_disabled: read_only_mode,
        };
        (enablement, diagnostics)
    }

    pub fn is_enabled(&self, state: &FormState, key: &FieldKey) -> bool {
        if self.forced_disabled || self.protected {
            return false;
        }
        if self.rules.is_empty() {
            return true;
        }
        match self.behavior {
            EnableBehavior::All => self.rules.iter().all(|rule| rule.holds(state, key)),
            EnableBehavior::Any => self.rules.iter().any(|rule| rule.holds(state, key)),
        }
    }
}
