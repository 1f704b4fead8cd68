//! End-to-end REST verb tests against single-value and repeated fixtures.

use std::sync::Arc;

use arbor_core::{AccessLevel, EnumMap, Field, Object, RecordType};
use arbor_rest::{
    get_json, patch_json, post_json, put_json, rest_delete, search_paths, AccessControl,
    Permission, RestResult,
};
use http::StatusCode;
use indoc::indoc;
use pretty_assertions::assert_eq;

fn sub_message() -> Arc<RecordType> {
    RecordType::builder("SubMessage")
        .field(Field::string("substuff1", 32))
        .field(Field::signed("substuff2", 4))
        .field(Field::bool("substuff3"))
        .build()
        .unwrap()
}

fn colour_map() -> Arc<EnumMap> {
    EnumMap::new([("RED", 0, ""), ("GREEN", 1, ""), ("BLUE", 2, "")])
}

/// Scalar-field fixture, after the original's `AllOptionalTypes`.
fn single_types() -> Object {
    let ty = RecordType::builder("AllOptionalTypes")
        .field(Field::signed("int16_type", 2))
        .field(Field::bool("bool_type"))
        .field(Field::string("string_type", 16))
        .field(Field::signed("int8_type", 1).repeated(8))
        .field(Field::object("submsg_type", sub_message()))
        .field(Field::enumeration("colour_type", 1, colour_map()))
        .field(
            Field::signed("secret_type", 4)
                .read(AccessLevel::Admin)
                .write(AccessLevel::Admin),
        )
        .build()
        .unwrap();
    Object::new(&ty)
}

/// Repeated-field fixture, after the original's `AllRepeatedTypes`.
fn array_types() -> Object {
    let ty = RecordType::builder("AllRepeatedTypes")
        .field(Field::object("submsg_type", sub_message()).repeated(8))
        .field(Field::signed("int8_type", 1).repeated(8))
        .build()
        .unwrap();
    Object::new(&ty)
}

const ADMIN: AccessLevel = AccessLevel::Admin;
const PUBLIC: AccessLevel = AccessLevel::Public;

fn access(level: AccessLevel) -> AccessControl {
    AccessControl::new(level)
}

fn verify_get(obj: &Object, level: AccessLevel, path: &str, expected: &str) {
    let body = get_json(obj, path, &access(level))
        .unwrap_or_else(|err| panic!("GET {path} failed: {} {}", err.status(), err.detail()));
    assert_eq!(body, expected, "GET {path}");
}

fn verify_get_fails(obj: &Object, level: AccessLevel, path: &str, status: StatusCode) {
    let err = get_json(obj, path, &access(level)).expect_err("expected GET failure");
    assert_eq!(err.status(), status, "GET {path}: {}", err.detail());
}

fn verify_ok(result: &RestResult, context: &str) {
    assert!(result.is_ok(), "{context}: {} {}", result.status(), result.detail());
}

#[test]
fn patch_bad_path_returns_404() {
    let mut obj = single_types();
    let result = patch_json(&mut obj, "/does_not_exist", "{}", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::NOT_FOUND);
}

#[test]
fn patch_root_merges() {
    let mut obj = single_types();
    obj.set(1, 123i64).unwrap();
    obj.set(2, true).unwrap();
    obj.set_string(3, "Hello").unwrap();

    verify_get(&obj, ADMIN, "/", r#"{"int16_type":123,"bool_type":true,"string_type":"Hello"}"#);
    verify_ok(
        &patch_json(&mut obj, "/", r#"{"bool_type":false,"string_type":"World"}"#, &access(ADMIN)),
        "patch root",
    );
    verify_get(&obj, ADMIN, "/", r#"{"int16_type":123,"bool_type":false,"string_type":"World"}"#);

    verify_ok(&patch_json(&mut obj, "/", r#"{"int16_type":456}"#, &access(ADMIN)), "patch int");
    verify_get(&obj, ADMIN, "", r#"{"int16_type":456,"bool_type":false,"string_type":"World"}"#);
}

#[test]
fn patch_individual_field_with_and_without_quotes() {
    let mut obj = single_types();
    obj.set(1, 123i64).unwrap();
    obj.set(2, true).unwrap();
    obj.set_string(3, "Hello").unwrap();

    verify_ok(&patch_json(&mut obj, "/bool_type", "false", &access(ADMIN)), "patch bool");
    verify_ok(&patch_json(&mut obj, "/string_type/", r#""World""#, &access(ADMIN)), "quoted");
    verify_ok(&patch_json(&mut obj, "/string_type/", "World", &access(ADMIN)), "unquoted");
    verify_get(&obj, ADMIN, "/", r#"{"int16_type":123,"bool_type":false,"string_type":"World"}"#);
}

#[test]
fn nested_patch_updates_one_field() {
    // Spec scenario: PATCH /submsg_type {"substuff2": 55}
    let mut obj = single_types();
    verify_ok(
        &patch_json(
            &mut obj,
            "/",
            r#"{"submsg_type":{"substuff1":"Hello","substuff2":32,"substuff3":true}}"#,
            &access(ADMIN),
        ),
        "seed",
    );
    verify_get(
        &obj,
        ADMIN,
        "/",
        r#"{"submsg_type":{"substuff1":"Hello","substuff2":32,"substuff3":true}}"#,
    );

    verify_ok(
        &patch_json(&mut obj, "/submsg_type", r#"{"substuff2":55}"#, &access(ADMIN)),
        "nested patch",
    );
    verify_get(
        &obj,
        ADMIN,
        "/",
        r#"{"submsg_type":{"substuff1":"Hello","substuff2":55,"substuff3":true}}"#,
    );
}

#[test]
fn null_patch_scrubs_the_field() {
    // Spec scenario: PATCH /submsg_type/substuff2 null
    let mut obj = single_types();
    verify_ok(
        &patch_json(
            &mut obj,
            "/",
            r#"{"submsg_type":{"substuff1":"Hello","substuff2":32,"substuff3":true}}"#,
            &access(ADMIN),
        ),
        "seed",
    );

    verify_ok(
        &patch_json(&mut obj, "/submsg_type/substuff2", "null", &access(ADMIN)),
        "null patch",
    );
    verify_get(
        &obj,
        ADMIN,
        "/",
        r#"{"submsg_type":{"substuff1":"Hello","substuff3":true}}"#,
    );

    // One field to null, another to a new value, in one body.
    verify_ok(
        &patch_json(
            &mut obj,
            "/submsg_type/",
            r#"{"substuff1":"World","substuff3":null}"#,
            &access(ADMIN),
        ),
        "mixed patch",
    );
    verify_get(&obj, ADMIN, "/", r#"{"submsg_type":{"substuff1":"World"}}"#);
}

#[test]
fn put_replaces_whole_object() {
    // Spec scenario: PUT / replaces every field except the id.
    let mut obj = single_types();
    obj.set(1, 123i64).unwrap();
    obj.set(2, true).unwrap();
    obj.set_string(3, "Hello").unwrap();
    verify_get(&obj, ADMIN, "/", r#"{"int16_type":123,"bool_type":true,"string_type":"Hello"}"#);

    verify_ok(
        &put_json(&mut obj, "/", r#"{"bool_type":false,"string_type":"World"}"#, &access(ADMIN)),
        "put root",
    );
    verify_get(&obj, ADMIN, "/", r#"{"bool_type":false,"string_type":"World"}"#);
}

#[test]
fn put_is_idempotent() {
    let mut obj = single_types();
    obj.set(1, 9i64).unwrap();

    let body = r#"{"bool_type":true,"string_type":"same"}"#;
    verify_ok(&put_json(&mut obj, "/", body, &access(ADMIN)), "first put");
    let first = get_json(&obj, "/", &access(ADMIN)).unwrap();
    let snapshot = obj.clone();

    verify_ok(&put_json(&mut obj, "/", body, &access(ADMIN)), "second put");
    let second = get_json(&obj, "/", &access(ADMIN)).unwrap();
    assert_eq!(first, second);
    assert!(obj == snapshot, "state differs after repeated PUT");
}

#[test]
fn put_preserves_id() {
    let mut obj = single_types();
    obj.assign_id(77);
    verify_ok(
        &put_json(&mut obj, "/", r#"{"id":1234,"bool_type":true}"#, &access(ADMIN)),
        "put with id in body",
    );
    assert_eq!(obj.id(), 77);
    assert!(obj.has_id());
}

#[test]
fn delete_array_element_by_index() {
    // Spec scenario: [1,2,3,4], DELETE /int8_type/0 leaves [2,3,4].
    let mut obj = single_types();
    verify_ok(
        &patch_json(&mut obj, "/", r#"{"int8_type":[1,2,3,4]}"#, &access(ADMIN)),
        "seed",
    );

    let result = rest_delete(&mut obj, "/int8_type/0", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::OK);
    verify_get(&obj, ADMIN, "/int8_type", "[2,3,4]");
}

#[test]
fn delete_sub_object_by_id() {
    // Spec scenario: ids 10, 20, 30; DELETE /submsg_type/20 removes id 20,
    // DELETE /submsg_type/1 is 404.
    let mut obj = array_types();
    verify_ok(
        &patch_json(
            &mut obj,
            "/",
            r#"{"submsg_type":[{"id":10},{"id":20},{"id":30}]}"#,
            &access(ADMIN),
        ),
        "seed",
    );

    let result = rest_delete(&mut obj, "/submsg_type/20", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::OK);
    verify_get(&obj, ADMIN, "/submsg_type", r#"[{"id":10},{"id":30}]"#);

    let result = rest_delete(&mut obj, "/submsg_type/1", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::NOT_FOUND);
}

#[test]
fn keyed_search_resolves_matching_element() {
    // Spec scenario: GET /submsg_type/*substuff1=World!/substuff2
    let mut obj = array_types();
    let seed = indoc! {r#"
        {"submsg_type":[
            {"id":1,"substuff1":"Hello!","substuff2":7},
            {"id":2,"substuff1":"World!","substuff2":42}
        ]}
    "#};
    verify_ok(&patch_json(&mut obj, "/", seed, &access(ADMIN)), "seed");

    verify_get(&obj, ADMIN, "/submsg_type/*substuff1=World!/substuff2", "42");
    verify_get_fails(
        &obj,
        ADMIN,
        "/submsg_type/*substuff1=Nobody/substuff2",
        StatusCode::NOT_FOUND,
    );
}

#[test]
fn delete_nested_object_clears_parent_slot() {
    let mut obj = single_types();
    verify_ok(
        &patch_json(&mut obj, "/", r#"{"submsg_type":{"substuff2":1}}"#, &access(ADMIN)),
        "seed",
    );
    let result = rest_delete(&mut obj, "/submsg_type", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::OK);
    assert!(!obj.is_touched(5));
    assert!(obj.is_changed(5));
    verify_get(&obj, ADMIN, "/", "{}");
}

#[test]
fn delete_root_is_forbidden() {
    let mut obj = single_types();
    let result = rest_delete(&mut obj, "/", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::FORBIDDEN);
}

#[test]
fn delete_whole_array() {
    let mut obj = single_types();
    verify_ok(&patch_json(&mut obj, "/", r#"{"int8_type":[5,6]}"#, &access(ADMIN)), "seed");
    let result = rest_delete(&mut obj, "/int8_type", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::OK);
    assert!(!obj.is_touched(4));
    assert!(obj.is_changed(4));
}

#[test]
fn delete_untouched_field_is_404() {
    let mut obj = single_types();
    let result = rest_delete(&mut obj, "/bool_type", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::NOT_FOUND);
}

#[test]
fn get_untouched_field_is_404() {
    let obj = single_types();
    verify_get_fails(&obj, ADMIN, "/bool_type", StatusCode::NOT_FOUND);
}

#[test]
fn post_appends_scalar_element() {
    let mut obj = array_types();
    let result = post_json(&mut obj, "/int8_type", "5", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::CREATED);
    assert_eq!(result.created_id(), Some(0));

    let result = post_json(&mut obj, "/int8_type", "6", &access(ADMIN));
    assert_eq!(result.created_id(), Some(1));
    verify_get(&obj, ADMIN, "/int8_type", "[5,6]");
}

#[test]
fn post_creates_sub_object_with_auto_id() {
    let mut obj = array_types();
    let result = post_json(&mut obj, "/submsg_type", r#"{"substuff1":"new"}"#, &access(ADMIN));
    assert_eq!(result.status(), StatusCode::CREATED);
    let id = result.created_id().expect("created id");
    assert_ne!(id, 0);

    let body = get_json(&obj, &format!("/submsg_type/{id}"), &access(ADMIN)).unwrap();
    assert!(body.contains(r#""substuff1":"new""#), "{body}");
}

#[test]
fn post_bad_body_rolls_back() {
    let mut obj = array_types();
    verify_ok(
        &patch_json(&mut obj, "/", r#"{"submsg_type":[{"id":10}]}"#, &access(ADMIN)),
        "seed",
    );
    obj.clear_change_markers();

    let result = post_json(
        &mut obj,
        "/submsg_type",
        r#"{"substuff2":"not a number"}"#,
        &access(ADMIN),
    );
    assert_eq!(result.status(), StatusCode::BAD_REQUEST);
    assert_eq!(obj.object_elements(1).len(), 1);
    assert!(!obj.is_changed(1), "rollback must restore the changed bit");
}

#[test]
fn post_to_object_or_field_is_405() {
    let mut obj = single_types();
    let result = post_json(&mut obj, "/", "{}", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::METHOD_NOT_ALLOWED);

    let result = post_json(&mut obj, "/bool_type", "true", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test]
fn bad_body_returns_400_with_stream_message() {
    let mut obj = single_types();
    let result = patch_json(&mut obj, "/", r#"{"int16_type":40000}"#, &access(ADMIN));
    assert_eq!(result.status(), StatusCode::BAD_REQUEST);
    assert!(result.detail().contains("int16_type"), "{}", result.detail());

    let result = patch_json(&mut obj, "/", r#"{"int16_type""#, &access(ADMIN));
    assert_eq!(result.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn hidden_fields_are_absent_for_low_levels() {
    let mut obj = single_types();
    obj.set(1, 1i64).unwrap();
    obj.set(7, 99i64).unwrap();

    let body = get_json(&obj, "/", &access(PUBLIC)).unwrap();
    assert!(!body.contains("secret_type"), "{body}");
    let body = get_json(&obj, "/", &access(ADMIN)).unwrap();
    assert!(body.contains("secret_type"), "{body}");

    verify_get_fails(&obj, PUBLIC, "/secret_type", StatusCode::FORBIDDEN);
}

#[test]
fn protected_writes_are_silently_dropped_in_bodies() {
    let mut obj = single_types();
    obj.set(7, 1i64).unwrap();
    obj.clear_change_markers();

    verify_ok(
        &patch_json(
            &mut obj,
            "/",
            r#"{"secret_type":42,"int16_type":5}"#,
            &access(PUBLIC),
        ),
        "public patch",
    );
    assert_eq!(obj.i64_value(7), Some(1), "protected field must be unchanged");
    assert_eq!(obj.i64_value(1), Some(5));

    // A direct path to the protected field is an explicit 403.
    let result = patch_json(&mut obj, "/secret_type", "42", &access(PUBLIC));
    assert_eq!(result.status(), StatusCode::FORBIDDEN);
}

#[test]
fn patch_without_difference_leaves_change_bits_clear() {
    let mut obj = single_types();
    obj.set(1, 5i64).unwrap();
    obj.clear_change_markers();

    verify_ok(&patch_json(&mut obj, "/", r#"{"int16_type":5}"#, &access(ADMIN)), "same value");
    assert!(!obj.changes().any_changed());

    verify_ok(&patch_json(&mut obj, "/", r#"{"int16_type":6}"#, &access(ADMIN)), "new value");
    let changes = obj.changes();
    assert!(changes.changed(1));
    assert_eq!(changes.changed_fields().count(), 1);
}

#[test]
fn deep_patch_marks_ancestors_changed() {
    let mut obj = single_types();
    verify_ok(
        &patch_json(&mut obj, "/", r#"{"submsg_type":{"substuff2":1}}"#, &access(ADMIN)),
        "seed",
    );
    obj.clear_change_markers();

    verify_ok(
        &patch_json(&mut obj, "/submsg_type/substuff2", "2", &access(ADMIN)),
        "deep patch",
    );
    assert!(obj.is_changed(5), "root-level field must reflect the deep edit");
}

#[test]
fn deltas_only_read_emits_changed_fields_and_clears() {
    let mut obj = single_types();
    obj.set(1, 5i64).unwrap();
    obj.set(2, true).unwrap();
    obj.clear_change_markers();

    obj.set(1, 6i64).unwrap();
    obj.clear_field(2);

    let deltas = AccessControl::for_deltas(ADMIN);
    let body = get_json(&obj, "/", &deltas).unwrap();
    assert_eq!(body, r#"{"int16_type":6,"bool_type":null}"#);
}

#[test]
fn enum_patch_by_name_and_number() {
    let mut obj = single_types();
    verify_ok(&patch_json(&mut obj, "/colour_type", "GREEN", &access(ADMIN)), "by name");
    verify_get(&obj, ADMIN, "/colour_type", r#""GREEN""#);

    verify_ok(&patch_json(&mut obj, "/colour_type", "2", &access(ADMIN)), "by number");
    verify_get(&obj, ADMIN, "/colour_type", r#""BLUE""#);

    let result = patch_json(&mut obj, "/colour_type", "PINK", &access(ADMIN));
    assert_eq!(result.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn search_completes_labels_ids_and_enum_values() {
    let mut single = single_types();
    single.set(1, 1i64).unwrap();

    let fields = search_paths(&single, "/int", ADMIN, Permission::Read, 10);
    assert_eq!(fields, ["/int16_type", "/int8_type"]);

    let all = search_paths(&single, "/", ADMIN, Permission::Read, 100);
    assert!(all.contains(&"/submsg_type".to_owned()));
    assert!(all.contains(&"/secret_type".to_owned()));
    let public = search_paths(&single, "/", PUBLIC, Permission::Read, 100);
    assert!(!public.contains(&"/secret_type".to_owned()));

    let colours = search_paths(&single, "/colour_type/G", ADMIN, Permission::Write, 10);
    assert_eq!(colours, ["/colour_type/GREEN"]);

    let mut repeated = array_types();
    patch_json(
        &mut repeated,
        "/",
        r#"{"submsg_type":[{"id":10},{"id":12},{"id":20}]}"#,
        &access(ADMIN),
    );
    let ids = search_paths(&repeated, "/submsg_type/1", ADMIN, Permission::Read, 10);
    assert_eq!(ids, ["/submsg_type/10", "/submsg_type/12"]);

    let capped = search_paths(&repeated, "/submsg_type/", ADMIN, Permission::Read, 2);
    assert_eq!(capped.len(), 2);
}

#[test]
fn json_round_trip_through_rest() {
    let mut obj = single_types();
    verify_ok(
        &patch_json(
            &mut obj,
            "/",
            r#"{"int16_type":1,"string_type":"x","submsg_type":{"substuff1":"y"},"int8_type":[1,2]}"#,
            &access(ADMIN),
        ),
        "seed",
    );
    let body = get_json(&obj, "/", &access(ADMIN)).unwrap();

    let mut round = single_types();
    verify_ok(&put_json(&mut round, "/", &body, &access(ADMIN)), "round trip put");
    let round_body = get_json(&round, "/", &access(ADMIN)).unwrap();
    assert_eq!(round_body, body);

    // Both bodies are legal JSON with identical structure.
    let before: serde_json::Value = serde_json::from_str(&body).unwrap();
    let after: serde_json::Value = serde_json::from_str(&round_body).unwrap();
    assert_eq!(before, after);
}
