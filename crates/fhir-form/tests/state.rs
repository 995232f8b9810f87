use serde_json::json;

use fhir_form::{
    Field, FieldKey, FormState, Questionnaire, QuestionnaireResponse, Scope, StateError, build,
    field_for_key,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "questionnaire" => include_str!("../tests/fixtures/imaging_questionnaire.json"),
        "response" => include_str!("../tests/fixtures/imaging_response.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn imaging() -> (Vec<Field>, QuestionnaireResponse) {
    let questionnaire: Questionnaire =
        serde_json::from_str(fixture("questionnaire")).expect("questionnaire");
    let response: QuestionnaireResponse =
        serde_json::from_str(fixture("response")).expect("response");
    let tree = build(&questionnaire, &response, false);
    (tree.fields, response)
}

fn key(text: &str) -> FieldKey {
    text.parse().expect("key")
}

fn values(state: &FormState, text: &str) -> Vec<String> {
    state.get(&key(text)).expect("entry").to_vec()
}

#[test]
fn initialize_all_seeds_one_instance_per_group() {
    let (fields, _) = imaging();
    let state = FormState::initialize_all(&fields);

    assert_eq!(values(&state, "biopsy-date"), vec!["2000-02-10T10:00"]);
    assert_eq!(
        values(&state, "g-imaging-series@@0@@imagingstudy-series-uid"),
        vec!["123"]
    );
    assert_eq!(
        values(
            &state,
            "g-imaging-series@@0@@g-imaging-instance@@0@@imagingstudy-instance-uid"
        ),
        vec!["456"]
    );
    assert!(state.get(&key("g-imaging-series@@1@@imagingstudy-series-uid")).is_none());
    assert_eq!(
        state.instances(&key("g-imaging-series")).expect("registry").live(),
        &[0]
    );
    // Groups hold no values of their own.
    assert!(state.get(&key("g-imag")).is_none());
}

#[test]
fn every_non_group_field_gets_an_entry() {
    let (fields, response) = imaging();
    let state = FormState::hydrate(&fields, &response);

    let mut visited = 0;
    state.walk(&fields, |_, key| {
        assert!(state.get(key).is_some(), "no entry for {key}");
        visited += 1;
    });
    assert_eq!(visited, state.values().len());
}

#[test]
fn hydrate_creates_an_instance_per_response_sibling() {
    let (fields, response) = imaging();
    let state = FormState::hydrate(&fields, &response);

    assert_eq!(
        state.instances(&key("g-imaging-series")).expect("registry").live(),
        &[0, 1]
    );
    assert_eq!(
        values(&state, "g-imaging-series@@1@@imagingstudy-series-uid"),
        vec!["124"]
    );
    assert_eq!(
        values(&state, "g-imaging-series@@1@@imagingstudy-series-modality"),
        vec![""]
    );
    let nested = FieldKey::scoped(Scope::root().instance("g-imaging-series", 0), "g-imaging-instance");
    assert_eq!(state.instances(&nested).expect("nested").live(), &[0, 1]);
    assert_eq!(
        values(
            &state,
            "g-imaging-series@@0@@g-imaging-instance@@1@@imagingstudy-instance-uid"
        ),
        vec!["789"]
    );
    assert_eq!(
        values(
            &state,
            "g-imaging-series@@1@@g-imaging-instance@@0@@imagingstudy-instance-uid"
        ),
        vec!["999"]
    );
}

#[test]
fn set_values_leaves_the_previous_snapshot_alone() {
    let (fields, response) = imaging();
    let before = FormState::hydrate(&fields, &response);
    let after = before.set_values(&key("study-id-value"), vec!["changed".into()]);

    assert_eq!(values(&after, "study-id-value"), vec!["changed"]);
    assert_eq!(
        values(&before, "study-id-value"),
        vec!["ad1d247b-6e0a0a02-98880beb-460a2261-d25594b2"]
    );
}

#[test]
fn massage_resets_disabled_fields() {
    let (fields, response) = imaging();
    let state = FormState::hydrate(&fields, &response)
        .set_values(&key("psa-comment"), vec!["typed before disabling".into()]);

    let massaged = state.massage_for_disabled(&fields);
    assert_eq!(values(&massaged, "psa-comment"), vec![""]);

    let enabled = state
        .set_values(&key("psa-elevated"), vec!["true".into()])
        .massage_for_disabled(&fields);
    assert_eq!(values(&enabled, "psa-comment"), vec!["typed before disabling"]);
}

#[test]
fn massage_covers_every_live_instance() {
    let (fields, response) = imaging();
    let state = FormState::hydrate(&fields, &response).set_values(
        &key("g-imaging-series@@1@@imagingstudy-series-description"),
        vec!["no modality yet".into()],
    );

    let massaged = state.massage_for_disabled(&fields);
    assert_eq!(
        values(&massaged, "g-imaging-series@@1@@imagingstudy-series-description"),
        vec![""]
    );
    assert_eq!(
        values(&massaged, "g-imaging-series@@0@@imagingstudy-series-description"),
        vec!["first series"]
    );
}

#[test]
fn massage_follows_resets_through_dependent_fields() {
    // `b` depends on `a`, which depends on `c`; `b` comes first in document order.
    let questionnaire: Questionnaire = serde_json::from_value(json!({
        "item": [
            {
                "linkId": "b",
                "type": "string",
                "enableWhen": [ { "question": "a", "operator": "exists", "answerBoolean": true } ]
            },
            { "linkId": "c", "type": "string" },
            {
                "linkId": "a",
                "type": "string",
                "enableWhen": [ { "question": "c", "operator": "=", "answerString": "yes" } ]
            }
        ]
    }))
    .expect("questionnaire");
    let fields = build(&questionnaire, &QuestionnaireResponse::default(), false).fields;
    let state = FormState::initialize_all(&fields)
        .set_values(&key("c"), vec!["yes".into()])
        .set_values(&key("a"), vec!["A".into()])
        .set_values(&key("b"), vec!["B".into()])
        .massage_for_disabled(&fields);
    assert_eq!(values(&state, "b"), vec!["B"]);

    let massaged = state
        .set_values(&key("c"), vec!["no".into()])
        .massage_for_disabled(&fields);
    assert_eq!(values(&massaged, "a"), vec![""]);
    assert_eq!(values(&massaged, "b"), vec![""]);
}

#[test]
fn added_instances_get_fresh_indices_and_template_values() {
    let (fields, response) = imaging();
    let series = field_for_key(&fields, &key("g-imaging-series")).expect("series");
    let state = FormState::hydrate(&fields, &response);

    let (state, index) = state
        .add_group_instance(series, &Scope::root())
        .expect("add");
    assert_eq!(index, 2);
    assert_eq!(
        values(&state, "g-imaging-series@@2@@imagingstudy-series-uid"),
        vec![series.children[0].initial_value.clone()]
    );
    let nested = key("g-imaging-series@@2@@g-imaging-instance");
    assert_eq!(state.instances(&nested).expect("nested registry").live(), &[0]);
}

#[test]
fn remove_then_add_never_resurrects_values() {
    let (fields, response) = imaging();
    let series = field_for_key(&fields, &key("g-imaging-series")).expect("series");
    let group = key("g-imaging-series");
    let state = FormState::hydrate(&fields, &response);

    let removed = state.remove_group_instance(&group, 1).expect("remove");
    assert!(removed.get(&key("g-imaging-series@@1@@imagingstudy-series-uid")).is_none());
    assert!(
        removed
            .get(&key(
                "g-imaging-series@@1@@g-imaging-instance@@0@@imagingstudy-instance-uid"
            ))
            .is_none()
    );
    assert!(removed.instances(&key("g-imaging-series@@1@@g-imaging-instance")).is_none());
    assert_eq!(
        values(&removed, "g-imaging-series@@0@@imagingstudy-series-uid"),
        vec!["123"]
    );

    let (added, index) = removed
        .add_group_instance(series, &Scope::root())
        .expect("add");
    assert_eq!(index, 2);
    assert!(added.get(&key("g-imaging-series@@1@@imagingstudy-series-uid")).is_none());
    assert_ne!(
        values(&added, "g-imaging-series@@2@@imagingstudy-series-uid"),
        vec!["124"]
    );
    let registry = added.instances(&group).expect("registry");
    assert_eq!(registry.live(), &[0, 2]);
    assert_eq!(registry.removed(), vec![1]);
    assert_eq!(registry.position(2), Some(1));
}

#[test]
fn instance_errors_are_reported() {
    let (fields, response) = imaging();
    let state = FormState::hydrate(&fields, &response);
    let group = key("g-imaging-series");

    assert_eq!(
        state.remove_group_instance(&group, 7),
        Err(StateError::UnknownInstance {
            group: "g-imaging-series".into(),
            index: 7,
        })
    );
    assert!(matches!(
        state.remove_group_instance(&key("g-proc"), 0),
        Err(StateError::UnknownGroup(_))
    ));
    let procedure = field_for_key(&fields, &key("g-proc")).expect("group");
    assert!(matches!(
        state.add_group_instance(procedure, &Scope::root()),
        Err(StateError::NotRepeatable(_))
    ));
}
