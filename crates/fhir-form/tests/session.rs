use serde_json::json;

use fhir_form::{
    Answer, FieldKey, FormError, FormOptions, FormSession, Questionnaire, QuestionnaireResponse,
    RenderStatus, StateError, SubmitHooks, SubmitOutcome, render_json_ui, render_text,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "questionnaire" => include_str!("../tests/fixtures/imaging_questionnaire.json"),
        "response" => include_str!("../tests/fixtures/imaging_response.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn session(options: FormOptions) -> FormSession {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("questionnaire")).expect("questionnaire");
    let response: QuestionnaireResponse =
        serde_json::from_str(fixture("response")).expect("response");
    FormSession::new(questionnaire, response, options)
}

fn key(text: &str) -> FieldKey {
    text.parse().expect("key")
}

#[derive(Default)]
struct Recorder {
    submitted: Vec<QuestionnaireResponse>,
    errors: Vec<FormError>,
}

impl SubmitHooks for Recorder {
    fn on_submit(&mut self, response: &QuestionnaireResponse) {
        self.submitted.push(response.clone());
    }

    fn on_error(&mut self, error: &FormError) {
        self.errors.push(error.clone());
    }
}

#[test]
fn submit_hands_the_updated_response_to_the_hook() {
    let mut session = session(FormOptions::default());
    session
        .update(&key("study-id-value"), vec!["study-42".into()])
        .expect("update");

    let mut hooks = Recorder::default();
    let outcome = session.submit(&mut hooks).expect("submit");

    assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    assert!(session.is_validated());
    assert_eq!(hooks.submitted.len(), 1);
    assert!(hooks.errors.is_empty());
    let imaging = &hooks.submitted[0].item[2];
    assert_eq!(
        imaging.item[1].answer_values(),
        Some(vec![Answer::String("study-42".into())])
    );
}

#[test]
fn missing_required_value_blocks_submission_without_on_error() {
    let mut session = session(FormOptions::default());
    session
        .update(&key("biopsy-date"), vec![String::new()])
        .expect("update");

    let mut hooks = Recorder::default();
    let outcome = session.submit(&mut hooks).expect("submit");

    match outcome {
        SubmitOutcome::Invalid(result) => {
            assert!(!result.valid);
            assert_eq!(result.missing_required, vec!["biopsy-date".to_string()]);
        }
        other => panic!("expected invalid outcome, got {other:?}"),
    }
    assert!(session.is_validated());
    assert!(hooks.submitted.is_empty());
    assert!(hooks.errors.is_empty());
}

#[test]
fn clearing_a_value_disables_and_resets_dependents() {
    let mut session = session(FormOptions::default());
    assert_eq!(
        session.state().first(&key("biopsy-bodySite")),
        "http://snomed.info/sct|41216001"
    );

    session
        .update(&key("biopsy-date"), vec![String::new()])
        .expect("update");
    let body_site = key("biopsy-bodySite");
    let field = session.field(&body_site).expect("field");
    assert!(field.is_disabled(session.state(), &body_site));

    assert_eq!(
        session.update(&body_site, vec!["x".into()]),
        Err(FormError::Disabled("biopsy-bodySite".into()))
    );
}

#[test]
fn mismatched_questionnaire_goes_to_on_error() {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("questionnaire")).expect("questionnaire");
    let mut response: QuestionnaireResponse =
        serde_json::from_str(fixture("response")).expect("response");
    response.questionnaire = Some("http://example.org/Questionnaire/other".into());
    let mut session = FormSession::new(questionnaire, response, FormOptions::default());

    let mut hooks = Recorder::default();
    let error = session.submit(&mut hooks).expect_err("mismatch");

    assert!(matches!(error, FormError::QuestionnaireMismatch { .. }));
    assert_eq!(hooks.errors, vec![error]);
    assert!(hooks.submitted.is_empty());
}

#[test]
fn versioned_and_local_references_bind() {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("questionnaire")).expect("questionnaire");
    for reference in [
        "http://hl7.eu/fhir/ig/flute/Questionnaire/Q-SV21|0.1.0",
        "#Q-SV21",
    ] {
        let mut response: QuestionnaireResponse =
            serde_json::from_str(fixture("response")).expect("response");
        response.questionnaire = Some(reference.into());
        let mut session = FormSession::new(questionnaire.clone(), response, FormOptions::default());
        let mut hooks = Recorder::default();
        assert!(session.submit(&mut hooks).is_ok(), "{reference} should bind");
    }
}

#[test]
fn read_only_sessions_refuse_edits() {
    let mut session = session(FormOptions {
        read_only: true,
        ..FormOptions::default()
    });

    assert_eq!(
        session.update(&key("study-id-value"), vec!["x".into()]),
        Err(FormError::ReadOnly)
    );
    assert_eq!(
        session.add_group_instance(&key("g-imaging-series")),
        Err(FormError::ReadOnly)
    );
    let payload = session.render();
    assert!(payload.fields.iter().all(|field| field.disabled));
    // Read-only forms show disabled fields instead of hiding them.
    assert!(
        payload
            .fields
            .iter()
            .filter(|field| field.key.id() != "internal-id")
            .all(|field| field.visible)
    );
}

#[test]
fn group_instances_round_trip_through_the_session() {
    let mut session = session(FormOptions::default());
    let series = key("g-imaging-series");

    let index = session.add_group_instance(&series).expect("add");
    assert_eq!(index, 2);
    session
        .update(
            &key("g-imaging-series@@2@@imagingstudy-series-uid"),
            vec!["200".into()],
        )
        .expect("update");
    session.remove_group_instance(&series, 0).expect("remove");
    assert_eq!(
        session.remove_group_instance(&series, 0),
        Err(FormError::State(StateError::UnknownInstance {
            group: "g-imaging-series".into(),
            index: 0,
        }))
    );

    let mut hooks = Recorder::default();
    session.submit(&mut hooks).expect("submit");
    let uids: Vec<Option<Vec<Answer>>> = hooks.submitted[0].item[2]
        .item
        .iter()
        .filter(|item| item.link_id == "g-imaging-series")
        .map(|series| series.item[0].answer_values())
        .collect();
    assert_eq!(
        uids,
        vec![
            Some(vec![Answer::String("124".into())]),
            Some(vec![Answer::String("200".into())]),
        ]
    );
}

#[test]
fn reset_restores_the_initial_snapshot() {
    let mut session = session(FormOptions::default());
    let initial = session.state().clone();
    session
        .update(&key("study-id-value"), vec!["edited".into()])
        .expect("update");
    session.add_group_instance(&key("g-imaging-series")).expect("add");
    let mut hooks = Recorder::default();
    session.submit(&mut hooks).expect("submit");

    session.reset();
    assert_eq!(session.state(), &initial);
    assert!(!session.is_validated());
}

#[test]
fn unknown_and_read_only_fields_are_rejected() {
    let questionnaire: Questionnaire = serde_json::from_value(json!({
        "item": [
            { "linkId": "fixed", "type": "string", "readOnly": true },
            { "linkId": "free", "type": "string" }
        ]
    }))
    .expect("deserialize");
    let mut session = FormSession::new(
        questionnaire,
        QuestionnaireResponse::default(),
        FormOptions::default(),
    );

    assert_eq!(
        session.update(&key("fixed"), vec!["x".into()]),
        Err(FormError::ReadOnlyField("fixed".into()))
    );
    assert_eq!(
        session.update(&key("nowhere"), vec!["x".into()]),
        Err(FormError::UnknownField("nowhere".into()))
    );
    session.update(&key("free"), vec!["x".into()]).expect("update");
    assert_eq!(session.state().first(&key("free")), "x");
}

#[test]
fn labels_prefer_options_then_translator_then_defaults() {
    let plain = session(FormOptions::default());
    assert_eq!(plain.submit_label(), "Validate");
    assert_eq!(plain.reset_label(), "Reset");

    let translated = session(FormOptions::default()).with_translator(|key| match key {
        "button.validate" => Some("Valider".to_string()),
        _ => None,
    });
    assert_eq!(translated.submit_label(), "Valider");
    assert_eq!(translated.reset_label(), "Reset");

    let configured: FormOptions =
        serde_json::from_value(json!({ "submit_label": "Send" })).expect("options");
    let configured = session(configured).with_translator(|_| Some("ignored".into()));
    assert_eq!(configured.submit_label(), "Send");
    assert_eq!(configured.reset_label(), "ignored");
}

#[test]
fn render_payload_reports_status_and_instances() {
    let mut session = session(FormOptions::default());
    let payload = session.render();
    assert_eq!(payload.status, RenderStatus::Complete);
    assert_eq!(payload.form_title, "Study variables");

    let ui = render_json_ui(&payload);
    assert_eq!(ui["status"], "complete");
    assert_eq!(ui["actions"]["submit"], "Validate");
    let groups = ui["groups"].as_array().expect("groups");
    assert_eq!(groups[0]["key"], "g-imaging-series");
    assert_eq!(groups[0]["instances"], json!([0, 1]));
    let fields = ui["fields"].as_array().expect("fields");
    let hidden = fields
        .iter()
        .find(|field| field["id"] == "internal-id")
        .expect("hidden field");
    assert_eq!(hidden["visible"], false);

    session
        .update(&key("biopsy-date"), vec![String::new()])
        .expect("update");
    let payload = session.render();
    assert_eq!(payload.status, RenderStatus::NeedInput);
    let text = render_text(&payload);
    assert!(text.contains("Form: Study variables"));
    assert!(text.contains("biopsy-date"));
    assert!(text.contains("[required]"));
    assert!(!text.contains("biopsy-bodySite"));
}
