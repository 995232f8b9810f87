#![allow(missing_docs)]

pub mod builder;
pub mod codec;
pub mod diagnostics;
pub mod enablement;
pub mod field;
pub mod key;
pub mod lookup;
pub mod model;
pub mod render;
pub mod serialize;
pub mod session;
pub mod state;
pub mod validate;
pub mod visibility;

pub use builder::{DEFAULT_TITLE, FieldTree, build};
pub use codec::{CodecError, Encoding, decode, encode, encode_all};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use enablement::{Bound, Check, Comparison, EnableRule, Enablement};
pub use field::{ChoiceSource, Field};
pub use key::{FieldKey, KeyParseError, SCOPE_SEPARATOR, Scope};
pub use lookup::{ItemPath, SiblingSet, TreeNode, field_for_key, find_first, find_siblings};
pub use model::{
    Answer, AnswerOption, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseAnswer, QuestionnaireResponseItem,
};
pub use render::{
    RenderActions, RenderField, RenderGroup, RenderPayload, RenderProgress, RenderStatus,
    build_render_payload, render_json_ui, render_text,
};
pub use serialize::{Serialized, serialize};
pub use session::{FormError, FormOptions, FormSession, SubmitHooks, SubmitOutcome};
pub use state::{FormState, GroupInstances, StateError};
pub use validate::{ValidationError, ValidationResult, validate};
pub use visibility::{VisibilityMap, resolve_visibility};
