pub mod datatype;
pub mod questionnaire;
pub mod response;

pub use datatype::{Attachment, Coding, Extension, Quantity};
pub use questionnaire::{
    AnswerOption, DisabledDisplay, EnableBehavior, EnableWhen, ItemType, Operator, Questionnaire,
    QuestionnaireItem,
};
pub use response::{
    Answer, QuestionnaireResponse, QuestionnaireResponseAnswer, QuestionnaireResponseItem,
};
