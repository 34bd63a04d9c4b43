//! Flagsmith reconcilers and the stats reader against a scripted API.

mod common;

use common::{FS, Method, MockHttp, flagsmith, results_page};
use serde_json::{Value, json};
use steady_core::clients::AuthScheme;
use steady_core::reconciler::feature::{FeatureReconciler, FeatureSpec};
use steady_core::reconciler::segment::{SegmentReconciler, SegmentSpec};
use steady_core::reconciler::segment_priority::{PriorityReorderSpec, SegmentPriorityReconciler};
use steady_core::reconciler::tag::{TagReconciler, TagSpec};
use steady_core::reconciler::user_group::{UserGroupReconciler, UserGroupSpec};
use steady_core::reports::{StatsReader, StatsSpec};
use steady_core::{ReconcileError, Reconciler};

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).unwrap()
}

/// Project `web` has id 4.
fn project(http: &MockHttp) {
    http.on(
        Method::Get,
        format!("{FS}/projects/"),
        200,
        json!([{"id": 3, "name": "legacy"}, {"id": 4, "name": "web"}]),
    );
}

fn tags() -> String {
    format!("{FS}/projects/4/tags/")
}

#[test]
fn test_tag_created_with_generated_color() {
    let http = MockHttp::new();
    project(&http);
    http.on(Method::Get, tags(), 200, results_page(vec![], None));
    http.on(Method::Post, tags(), 201, json!({"id": 12, "label": "beta"}));
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = TagReconciler::new(&client)
        .reconcile(&parse::<TagSpec>(json!({"state": "present", "project_name": "web", "label": "beta"})))
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.data["id"], 12);
    let body = http.body_of(Method::Post, &tags());
    assert_eq!(body["label"], "beta");
    let color = body["color"].as_str().unwrap();
    assert_eq!(color.len(), 7);
    assert!(color.starts_with('#'));
    assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    assert!(body.get("project_name").is_none());

    let headers = &http.calls()[0].headers;
    assert!(headers.contains(&("Authorization".to_string(), "Api-Key fs-token".to_string())));
}

#[test]
fn test_existing_tag_keeps_its_color() {
    let http = MockHttp::new();
    project(&http);
    http.on(
        Method::Get,
        tags(),
        200,
        results_page(vec![json!({"id": 12, "label": "beta", "color": "#123456", "project": 4})], None),
    );
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = TagReconciler::new(&client)
        .reconcile(&parse::<TagSpec>(json!({"state": "present", "project_name": "web", "label": "beta"})))
        .unwrap();

    assert!(!outcome.changed);
    assert!(http.calls_with(Method::Patch).is_empty());
}

#[test]
fn test_tag_deleted_by_item_url() {
    let http = MockHttp::new();
    project(&http);
    http.on(
        Method::Get,
        tags(),
        200,
        results_page(vec![json!({"id": 12, "label": "beta"})], None),
    );
    http.on(Method::Delete, format!("{}12/", tags()), 204, Value::Null);
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = TagReconciler::new(&client)
        .reconcile(&parse::<TagSpec>(json!({"state": "absent", "project_name": "web", "label": "beta"})))
        .unwrap();

    assert!(outcome.changed);
    assert!(http.exhausted());
}

#[test]
fn test_unknown_project_fails_before_any_write() {
    let http = MockHttp::new();
    project(&http);
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let err = TagReconciler::new(&client)
        .reconcile(&parse::<TagSpec>(json!({"state": "present", "project_name": "nope", "label": "beta"})))
        .unwrap_err();

    assert!(matches!(err, ReconcileError::NotFound { kind: "project", .. }));
    assert_eq!(http.calls().len(), 1);
}

#[test]
fn test_rejected_project_listing_is_an_upstream_error() {
    let http = MockHttp::new();
    http.on(
        Method::Get,
        format!("{FS}/projects/"),
        401,
        json!({"detail": "Invalid token."}),
    );
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let err = TagReconciler::new(&client)
        .reconcile(&parse::<TagSpec>(json!({"state": "present", "project_name": "web", "label": "beta"})))
        .unwrap_err();

    match err {
        ReconcileError::Upstream { status, body, .. } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid token."));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(http.calls().len(), 1);
}

#[test]
fn test_failing_organisation_listing_is_an_upstream_error() {
    let http = MockHttp::new();
    http.on(Method::Get, format!("{FS}/organisations/"), 500, Value::Null);
    let client = flagsmith(&http, AuthScheme::Token);

    let err = UserGroupReconciler::new(&client).reconcile(&group_spec()).unwrap_err();

    assert!(matches!(err, ReconcileError::Upstream { status: 500, .. }));
    assert!(http.calls_with(Method::Post).is_empty());
}

fn features_search() -> String {
    format!("{FS}/projects/4/features?search=darkmode")
}

fn two_tags(http: &MockHttp) {
    http.on(
        Method::Get,
        tags(),
        200,
        results_page(
            vec![json!({"id": 1, "label": "alpha"}), json!({"id": 2, "label": "beta"})],
            None,
        ),
    );
}

#[test]
fn test_feature_created_with_tag_ids() {
    let http = MockHttp::new();
    project(&http);
    http.on(Method::Get, features_search(), 200, results_page(vec![], None));
    two_tags(&http);
    http.on(
        Method::Post,
        format!("{FS}/projects/4/features/"),
        201,
        json!({"id": 30, "name": "darkmode"}),
    );
    let client = flagsmith(&http, AuthScheme::Token);

    let outcome = FeatureReconciler::new(&client)
        .reconcile(&parse::<FeatureSpec>(json!({
            "state": "present",
            "project_name": "web",
            "name": "darkmode",
            "type": "STANDARD",
            "tags": ["beta", "missing"]
        })))
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(
        http.body_of(Method::Post, &format!("{FS}/projects/4/features/")),
        json!({"name": "darkmode", "type": "STANDARD", "tags": [2]})
    );
}

#[test]
fn test_feature_tag_order_is_not_a_change() {
    let http = MockHttp::new();
    project(&http);
    http.on(
        Method::Get,
        features_search(),
        200,
        results_page(
            vec![json!({
                "id": 30,
                "name": "darkmode",
                "type": "STANDARD",
                "tags": [2, 1],
                "created_date": "2022-01-01T00:00:00Z"
            })],
            None,
        ),
    );
    two_tags(&http);
    let client = flagsmith(&http, AuthScheme::Token);

    let outcome = FeatureReconciler::new(&client)
        .reconcile(&parse::<FeatureSpec>(json!({
            "state": "present",
            "project_name": "web",
            "name": "darkmode",
            "type": "STANDARD",
            "tags": ["alpha", "beta"]
        })))
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.data["id"], 30);
    assert!(http.calls_with(Method::Patch).is_empty());
}

fn organisation(http: &MockHttp) {
    http.on(
        Method::Get,
        format!("{FS}/organisations/"),
        200,
        results_page(vec![json!({"id": 7, "name": "acme"})], None),
    );
}

fn group_spec() -> UserGroupSpec {
    parse(json!({
        "state": "present",
        "organisation_name": "acme",
        "name": "ops",
        "permissions": {"organisation": {"permissions": ["CREATE_PROJECT"]}}
    }))
}

#[test]
fn test_user_group_created_with_permissions() {
    let http = MockHttp::new();
    organisation(&http);
    let groups = format!("{FS}/organisations/7/groups/");
    let permissions = format!("{FS}/organisations/7/user-group-permissions/");
    http.on(Method::Get, &groups, 200, results_page(vec![], None));
    http.on(Method::Post, &groups, 201, json!({"id": 15, "name": "ops"}));
    http.on(Method::Get, format!("{permissions}?group=15"), 200, json!([]));
    http.on(Method::Post, &permissions, 201, json!({"id": 3}));
    let client = flagsmith(&http, AuthScheme::Token);

    let outcome = UserGroupReconciler::new(&client).reconcile(&group_spec()).unwrap();

    assert!(outcome.changed);
    assert_eq!(http.body_of(Method::Post, &groups), json!({"name": "ops"}));
    assert_eq!(
        http.body_of(Method::Post, &permissions),
        json!({"permissions": ["CREATE_PROJECT"], "group": 15})
    );
}

#[test]
fn test_permission_change_alone_reports_changed() {
    let http = MockHttp::new();
    organisation(&http);
    let groups = format!("{FS}/organisations/7/groups/");
    let permissions = format!("{FS}/organisations/7/user-group-permissions/");
    http.on(
        Method::Get,
        &groups,
        200,
        results_page(vec![json!({"id": 15, "name": "ops", "users": []})], None),
    );
    http.on(
        Method::Get,
        format!("{permissions}?group=15"),
        200,
        json!([{"id": 3, "group": 15, "permissions": ["MANAGE_USERS", "CREATE_PROJECT"]}]),
    );
    http.on(Method::Patch, format!("{permissions}3/"), 200, json!({}));
    let client = flagsmith(&http, AuthScheme::Token);

    let outcome = UserGroupReconciler::new(&client).reconcile(&group_spec()).unwrap();

    assert!(outcome.changed);
    assert!(http.calls_with(Method::Post).is_empty());
    assert_eq!(
        http.body_of(Method::Patch, &format!("{permissions}3/")),
        json!({"permissions": ["CREATE_PROJECT"], "group": 15})
    );
}

#[test]
fn test_unmanaged_segment_is_skipped_without_calls() {
    let http = MockHttp::new();
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = SegmentReconciler::new(&client)
        .reconcile(&parse::<SegmentSpec>(json!({
            "state": "present",
            "project_name": "web",
            "name": "None",
            "rules": []
        })))
        .unwrap();

    assert!(outcome.skipped);
    assert!(!outcome.changed);
    assert!(http.calls().is_empty());
}

fn remote_segment(http: &MockHttp) {
    http.on(
        Method::Get,
        format!("{FS}/projects/4/segments/?search=beta-users"),
        200,
        results_page(
            vec![json!({
                "id": 50,
                "name": "beta-users",
                "project": 4,
                "rules": [{
                    "id": 1,
                    "type": "ALL",
                    "rules": [],
                    "conditions": [{"id": 9, "operator": "EQUAL", "property": "plan", "value": "beta"}]
                }]
            })],
            None,
        ),
    );
}

#[test]
fn test_segment_rules_ignore_server_ids() {
    let http = MockHttp::new();
    project(&http);
    remote_segment(&http);
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = SegmentReconciler::new(&client)
        .reconcile(&parse::<SegmentSpec>(json!({
            "state": "present",
            "project_name": "web",
            "name": "Beta-Users",
            "rules": "[{'type': 'ALL', 'rules': [], 'conditions': [{'operator': 'EQUAL', 'property': 'plan', 'value': 'beta'}]}]"
        })))
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(http.calls().len(), 2);
}

#[test]
fn test_segment_rule_change_patches_rules() {
    let http = MockHttp::new();
    project(&http);
    remote_segment(&http);
    let item = format!("{FS}/projects/4/segments/50/");
    http.on(Method::Patch, &item, 200, json!({}));
    let client = flagsmith(&http, AuthScheme::ApiKey);
    let rules = json!([{
        "type": "ALL",
        "rules": [],
        "conditions": [{"operator": "EQUAL", "property": "plan", "value": "gold"}]
    }]);

    let outcome = SegmentReconciler::new(&client)
        .reconcile(&parse::<SegmentSpec>(json!({
            "state": "present",
            "project_name": "web",
            "name": "beta-users",
            "rules": rules.clone()
        })))
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(http.body_of(Method::Patch, &item), json!({"rules": rules}));
}

fn reorder_spec() -> PriorityReorderSpec {
    parse(json!({
        "project_name": "web",
        "environment_names": ["prod"],
        "pricing_plans": {
            "free": {"flagsmith_plan_name": "plan-free", "priority": 1},
            "pro": {"flagsmith_plan_name": "plan-pro", "priority": 0}
        }
    }))
}

fn plan_segments(http: &MockHttp) {
    project(http);
    http.on(
        Method::Get,
        format!("{FS}/projects/4/environments/?search=prod"),
        200,
        json!([{"id": 100, "name": "prod"}]),
    );
    http.on(
        Method::Get,
        format!("{FS}/projects/4/segments/?search=plan-free"),
        200,
        results_page(vec![json!({"id": 60, "name": "plan-free"})], None),
    );
    http.on(
        Method::Get,
        format!("{FS}/projects/4/segments/?search=plan-pro"),
        200,
        results_page(vec![json!({"id": 61, "name": "plan-pro"})], None),
    );
    http.on(
        Method::Get,
        format!("{FS}/projects/4/segments/60/associated-features/"),
        200,
        results_page(
            vec![
                json!({"id": 1, "environment": 100, "feature": 30}),
                json!({"id": 2, "environment": 999, "feature": 31}),
            ],
            None,
        ),
    );
    http.on(
        Method::Get,
        format!("{FS}/projects/4/segments/61/associated-features/"),
        200,
        results_page(vec![json!({"id": 3, "environment": 100, "feature": 30})], None),
    );
}

fn feature_segments() -> String {
    format!("{FS}/features/feature-segments/?environment=100&feature=30")
}

#[test]
fn test_plan_segments_move_behind_the_others() {
    let http = MockHttp::new();
    plan_segments(&http);
    http.on(
        Method::Get,
        feature_segments(),
        200,
        results_page(
            vec![
                json!({"id": 500, "segment": 60, "priority": 0}),
                json!({"id": 501, "segment": 70, "priority": 1}),
                json!({"id": 502, "segment": 61, "priority": 2}),
            ],
            None,
        ),
    );
    let update = format!("{FS}/features/feature-segments/update-priorities/");
    http.on(Method::Post, &update, 200, json!([]));
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = SegmentPriorityReconciler::new(&client)
        .reconcile(&reorder_spec())
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.data["reordered"], 1);
    assert_eq!(
        http.body_of(Method::Post, &update),
        json!([
            {"id": 501, "priority": 0},
            {"id": 502, "priority": 1},
            {"id": 500, "priority": 2}
        ])
    );
    assert_eq!(http.count(Method::Get, &feature_segments()), 1);
}

#[test]
fn test_ordered_overrides_are_left_alone() {
    let http = MockHttp::new();
    plan_segments(&http);
    http.on(
        Method::Get,
        feature_segments(),
        200,
        results_page(
            vec![
                json!({"id": 501, "segment": 70, "priority": 0}),
                json!({"id": 502, "segment": 61, "priority": 1}),
                json!({"id": 500, "segment": 60, "priority": 2}),
            ],
            None,
        ),
    );
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let outcome = SegmentPriorityReconciler::new(&client)
        .reconcile(&reorder_spec())
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.data["reordered"], 0);
    assert!(http.calls_with(Method::Post).is_empty());
}

#[test]
fn test_unknown_environment_fails() {
    let http = MockHttp::new();
    project(&http);
    http.on(
        Method::Get,
        format!("{FS}/projects/4/environments/?search=prod"),
        200,
        json!([{"id": 101, "name": "production"}]),
    );
    let client = flagsmith(&http, AuthScheme::ApiKey);

    let err = SegmentPriorityReconciler::new(&client)
        .reconcile(&reorder_spec())
        .unwrap_err();

    assert_eq!(err.to_string(), "environment not found: prod");
}

#[test]
fn test_stats_count_states_across_environments() {
    let http = MockHttp::new();
    project(&http);
    http.on(
        Method::Get,
        format!("{FS}/projects/4/features/"),
        200,
        results_page(
            vec![
                json!({"id": 30, "name": "darkmode", "default_enabled": false, "initial_value": null, "is_archived": false, "created_date": "2022-01-01T00:00:00Z"}),
                json!({"id": 31, "name": "beta", "default_enabled": true, "initial_value": "on", "is_archived": false, "created_date": "2022-02-01T00:00:00Z"}),
            ],
            None,
        ),
    );
    http.on(
        Method::Get,
        format!("{FS}/environments/?project=4"),
        200,
        results_page(vec![json!({"id": 100, "api_key": "envA"}), json!({"id": 101, "api_key": "envB"})], None),
    );
    http.on(
        Method::Get,
        format!("{FS}/environments/envA/featurestates/"),
        200,
        results_page(
            vec![json!({"feature": 30, "enabled": true}), json!({"feature": 31, "enabled": false})],
            None,
        ),
    );
    http.on(
        Method::Get,
        format!("{FS}/environments/envB/featurestates/"),
        200,
        results_page(
            vec![
                json!({"feature": 30, "enabled": true}),
                json!({"feature": 31, "enabled": true}),
                json!({"feature": 99, "enabled": true}),
            ],
            None,
        ),
    );
    let client = flagsmith(&http, AuthScheme::Token);

    let stats = StatsReader::new(&client)
        .collect(&parse::<StatsSpec>(json!({"project_name": "web"})))
        .unwrap();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].name, "darkmode");
    assert_eq!((stats[0].enabled, stats[0].disabled), (2, 0));
    assert_eq!((stats[1].enabled, stats[1].disabled), (1, 1));
    assert_eq!(stats[1].initial_value, "on");
    assert_eq!(stats[0].datetime, stats[1].datetime);
    assert!(http.exhausted());
}
