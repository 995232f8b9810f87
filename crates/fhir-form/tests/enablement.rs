use serde_json::{Value, json};

use fhir_form::{
    Check, Enablement, FieldKey, FormState, Scope,
    model::{EnableWhen, QuestionnaireItem},
};

fn item(value: Value) -> QuestionnaireItem {
    serde_json::from_value(value).expect("deserialize item")
}

fn enablement(value: Value) -> Enablement {
    let (enablement, diagnostics) = Enablement::compile(&item(value), false);
    assert!(diagnostics.is_empty(), "unexpected diagnostics {diagnostics:?}");
    enablement
}

fn state(entries: Vec<(&str, Vec<&str>)>) -> FormState {
    entries
        .into_iter()
        .fold(FormState::default(), |state, (key, values)| {
            state.set_values(
                &key.parse().expect("key"),
                values.iter().map(|value| value.to_string()).collect(),
            )
        })
}

fn depends_on(operator: &str, answer: Value) -> Value {
    let mut condition = json!({ "question": "source", "operator": operator });
    condition
        .as_object_mut()
        .expect("object")
        .extend(answer.as_object().expect("answer object").clone());
    json!({ "linkId": "target", "type": "string", "enableWhen": [condition] })
}

fn target() -> FieldKey {
    FieldKey::new("target")
}

#[test]
fn no_rules_means_enabled() {
    let enablement = enablement(json!({ "linkId": "target", "type": "string" }));
    assert!(enablement.is_enabled(&FormState::default(), &target()));
}

#[test]
fn exists_true_needs_some_non_empty_value() {
    let rule = enablement(depends_on("exists", json!({ "answerBoolean": true })));

    assert!(!rule.is_enabled(&FormState::default(), &target()));
    assert!(!rule.is_enabled(&state(vec![("source", vec![""])]), &target()));
    assert!(rule.is_enabled(&state(vec![("source", vec!["", "x"])]), &target()));
}

#[test]
fn exists_false_needs_every_value_non_empty() {
    let rule = enablement(depends_on("exists", json!({ "answerBoolean": false })));

    // Absent entries never satisfy either form of `exists`.
    assert!(!rule.is_enabled(&FormState::default(), &target()));
    assert!(!rule.is_enabled(&state(vec![("source", vec![""])]), &target()));
    assert!(!rule.is_enabled(&state(vec![("source", vec!["", "x"])]), &target()));
    assert!(rule.is_enabled(&state(vec![("source", vec!["x", "y"])]), &target()));
}

#[test]
fn equality_is_satisfied_by_any_value() {
    let equals = enablement(depends_on("=", json!({ "answerString": "yes" })));
    let differs = enablement(depends_on("!=", json!({ "answerString": "yes" })));
    let both = state(vec![("source", vec!["no", "yes"])]);

    assert!(equals.is_enabled(&both, &target()));
    assert!(differs.is_enabled(&both, &target()));
    assert!(!differs.is_enabled(&state(vec![("source", vec!["yes"])]), &target()));
    assert!(!differs.is_enabled(&FormState::default(), &target()));
}

#[test]
fn boolean_and_coding_operands_compare_form_values() {
    let flag = enablement(depends_on("=", json!({ "answerBoolean": true })));
    assert!(flag.is_enabled(&state(vec![("source", vec!["true"])]), &target()));
    assert!(!flag.is_enabled(&state(vec![("source", vec!["false"])]), &target()));

    let coding = enablement(depends_on(
        "=",
        json!({ "answerCoding": { "system": "http://snomed.info/sct", "code": "86273004" } }),
    ));
    assert!(coding.is_enabled(
        &state(vec![("source", vec!["http://snomed.info/sct|86273004"])]),
        &target()
    ));
    assert!(!coding.is_enabled(&state(vec![("source", vec!["86273004"])]), &target()));
}

#[test]
fn ordering_operators_compare_numbers() {
    let greater = enablement(depends_on(">", json!({ "answerDecimal": 4.5 })));
    assert!(greater.is_enabled(&state(vec![("source", vec!["4.6"])]), &target()));
    assert!(!greater.is_enabled(&state(vec![("source", vec!["4.5"])]), &target()));
    assert!(!greater.is_enabled(&state(vec![("source", vec!["abc"])]), &target()));

    let at_most = enablement(depends_on("<=", json!({ "answerInteger": 3 })));
    assert!(at_most.is_enabled(&state(vec![("source", vec!["3"])]), &target()));
    assert!(at_most.is_enabled(&state(vec![("source", vec!["9", "1"])]), &target()));
    assert!(!at_most.is_enabled(&state(vec![("source", vec!["4"])]), &target()));
}

#[test]
fn unsupported_pairs_fail_open_with_diagnostic() {
    let (enablement, diagnostics) = Enablement::compile(
        &item(depends_on("<", json!({ "answerString": "m" }))),
        false,
    );

    assert_eq!(diagnostics.len(), 1);
    assert!(
        diagnostics[0]
            .to_string()
            .contains("operator [<] with type [string] for question [target]")
    );
    assert!(matches!(enablement.rules[0].check, Check::Unsupported { .. }));
    assert!(enablement.is_enabled(&FormState::default(), &target()));
}

#[test]
fn behavior_all_and_any() {
    let conditions = json!([
        { "question": "a", "operator": "=", "answerString": "1" },
        { "question": "b", "operator": "=", "answerString": "1" }
    ]);
    let all = enablement(json!({
        "linkId": "target", "type": "string",
        "enableBehavior": "all", "enableWhen": conditions.clone()
    }));
    let any = enablement(json!({
        "linkId": "target", "type": "string", "enableWhen": conditions
    }));
    let half = state(vec![("a", vec!["1"]), ("b", vec!["2"])]);
    let full = state(vec![("a", vec!["1"]), ("b", vec!["1"])]);

    assert!(!all.is_enabled(&half, &target()));
    assert!(all.is_enabled(&full, &target()));
    assert!(any.is_enabled(&half, &target()));
}

#[test]
fn protected_and_read_only_override_rules() {
    let protected = enablement(json!({
        "linkId": "target", "type": "string", "disabledDisplay": "protected"
    }));
    assert!(!protected.is_enabled(&FormState::default(), &target()));

    let (read_only, _) =
        Enablement::compile(&item(json!({ "linkId": "target", "type": "string" })), true);
    assert!(!read_only.is_enabled(&FormState::default(), &target()));
}

#[test]
fn scoped_fields_resolve_inside_their_instance_first() {
    let rule = enablement(json!({
        "linkId": "series-description",
        "type": "string",
        "enableWhen": [
            { "question": "modality", "operator": "exists", "answerBoolean": true }
        ]
    }));
    let state = state(vec![
        ("series@@0@@modality", vec!["DCM|PA"]),
        ("series@@1@@modality", vec![""]),
    ]);
    let first = FieldKey::scoped(Scope::root().instance("series", 0), "series-description");
    let second = FieldKey::scoped(Scope::root().instance("series", 1), "series-description");

    assert!(rule.is_enabled(&state, &first));
    assert!(!rule.is_enabled(&state, &second));
}

#[test]
fn nested_instances_fall_back_to_enclosing_scope() {
    let rule = enablement(json!({
        "linkId": "instance-class",
        "type": "string",
        "enableWhen": [
            { "question": "modality", "operator": "=", "answerString": "MR" }
        ]
    }));
    let state = state(vec![("series@@2@@modality", vec!["MR"])]);
    let nested = FieldKey::scoped(
        Scope::root().instance("series", 2).instance("instance", 0),
        "instance-class",
    );
    let other_series = FieldKey::scoped(
        Scope::root().instance("series", 0).instance("instance", 0),
        "instance-class",
    );

    assert!(rule.is_enabled(&state, &nested));
    assert!(!rule.is_enabled(&state, &other_series));
}

#[test]
fn rules_compile_from_typed_conditions() {
    let mut condition = EnableWhen::new("source", fhir_form::model::Operator::Exists);
    condition.answer_boolean = Some(true);
    let (rule, diagnostic) = fhir_form::EnableRule::compile("target", &condition);

    assert!(diagnostic.is_none());
    assert_eq!(rule.question, "source");
    assert_eq!(rule.check, Check::Exists { expected: true });
}
