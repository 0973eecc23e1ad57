use apply_compose::model::{Property, StructuredType};
use apply_compose::{
    ApplyError, ApplyParser, ClauseParser, DefaultQuerySettings, DynamicQueryOption, Model, Path,
    QueryContext, QuerySettings, Queryable, ServiceScope,
};
use serde_json::json;
use std::sync::Arc;

fn model() -> Arc<Model> {
    let json = r#"{
        "types": [
            {"name": "NS.Sale", "kind": "entity", "properties": [
                {"name": "Amount", "type": "Edm.Decimal"},
                {"name": "Category", "type": "Edm.String"},
                {"name": "Customer", "type": "NS.Customer", "navigation": true}
            ]},
            {"name": "NS.Customer", "kind": "entity", "properties": [
                {"name": "Name", "type": "Edm.String"},
                {"name": "Sales", "type": "NS.Sale", "collection": true, "navigation": true}
            ]}
        ],
        "navigation_sources": [
            {"name": "Sales", "entity_type": "NS.Sale"},
            {"name": "Customers", "entity_type": "NS.Customer"}
        ]
    }"#;
    Arc::new(serde_json::from_str(json).unwrap())
}

fn restrictive() -> DefaultQuerySettings {
    DefaultQuerySettings {
        enable_filter: false,
        max_top: Some(1),
        ..DefaultQuerySettings::default()
    }
}

#[test]
fn target_name_is_resolved_at_construction() {
    let ctx = QueryContext::new(Some(Path::parse(model(), "Customers('c1')/Sales")));
    assert_eq!(ctx.target_name(), Some("Sales"));
    assert_eq!(ctx.path_context().structured_type.as_ref().map(|t| t.name.as_str()), Some("NS.Customer"));
}

#[test]
fn malformed_path_degrades_to_absent_target() {
    let ctx = QueryContext::new(Some(Path::parse(model(), "Customers('c1')/Orders")));
    assert!(ctx.target_name().is_none());
    assert!(ctx.path().is_some());
}

#[test]
fn default_settings_without_scope_are_fresh_and_stable() {
    let ctx = QueryContext::new(None);
    let a = ctx.default_settings().unwrap();
    assert_eq!(*a, DefaultQuerySettings::default());
    assert!(Arc::ptr_eq(&a, &ctx.default_settings().unwrap()));
}

#[test]
fn default_settings_come_from_scope_attached_first() {
    let scope = Arc::new(ServiceScope::new());
    scope.register(restrictive());
    let ctx = QueryContext::new(Some(Path::parse(model(), "Sales")));
    ctx.attach_service_scope(&scope);
    assert_eq!(*ctx.default_settings().unwrap(), restrictive());
}

#[test]
fn default_settings_fixed_before_scope_attach_stay_fixed() {
    let ctx = QueryContext::new(Some(Path::parse(model(), "Sales")));
    let before = ctx.default_settings().unwrap();

    let scope = Arc::new(ServiceScope::new());
    scope.register(restrictive());
    ctx.attach_service_scope(&scope);

    let after = ctx.default_settings().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(*after, DefaultQuerySettings::default());
}

#[test]
fn scope_without_settings_is_a_configuration_error() {
    let scope = Arc::new(ServiceScope::new());
    let ctx = Arc::new(QueryContext::new(None));
    ctx.attach_service_scope(&scope);
    assert!(matches!(
        ctx.default_settings(),
        Err(ApplyError::MissingRegistration { .. })
    ));

    let option = DynamicQueryOption::new("top(1)", ctx, Arc::new(ApplyParser::new())).unwrap();
    assert!(matches!(option.validate(), Err(ApplyError::MissingRegistration { .. })));
}

#[test]
fn scope_settings_drive_validation() {
    let scope = Arc::new(ServiceScope::new());
    scope.register(restrictive());
    let ctx = Arc::new(QueryContext::new(Some(Path::parse(model(), "Sales"))));
    ctx.attach_service_scope(&scope);

    let parser = Arc::new(ApplyParser::for_context(&ctx));
    let filter = DynamicQueryOption::new("filter(Amount gt 1)", ctx.clone(), parser.clone()).unwrap();
    assert!(matches!(filter.validate(), Err(ApplyError::Validation(_))));

    let top = DynamicQueryOption::new("top(2)", ctx.clone(), parser.clone()).unwrap();
    assert!(matches!(top.validate(), Err(ApplyError::Validation(_))));

    let ok = DynamicQueryOption::new("groupby((Customer/Name))/top(1)", ctx, parser).unwrap();
    assert!(ok.validate().is_ok());
}

#[test]
fn parser_bound_to_context_type_checks_properties() {
    let ctx = QueryContext::new(Some(Path::parse(model(), "Customers('c1')/Sales")));
    let parser = ApplyParser::for_context(&ctx);
    assert!(parser.parse_apply_clause("groupby((Customer/Name))").is_ok());
    assert!(matches!(
        parser.parse_apply_clause("groupby((Customer/Email))"),
        Err(ApplyError::ClauseSyntax { position: 9, .. })
    ));
}

#[test]
fn typed_model_built_in_code() {
    let model = Arc::new(
        Model::new()
            .with_type(StructuredType::entity("NS.Item", vec![Property::new("Kind", "Edm.String")]))
            .with_entity_set("Items", "NS.Item"),
    );
    let ctx = Arc::new(QueryContext::new(Some(Path::parse(model, "Items"))));
    assert_eq!(ctx.target_name(), Some("Items"));

    let option = DynamicQueryOption::new(
        "groupby((Kind), aggregate($count as N))",
        ctx.clone(),
        Arc::new(ApplyParser::for_context(&ctx)),
    )
    .unwrap();
    let rows = vec![json!({"Kind": "a"}), json!({"Kind": "b"}), json!({"Kind": "a"})];
    let out = option
        .apply_to(&Queryable::from_rows(rows), &QuerySettings::default())
        .unwrap()
        .execute()
        .unwrap();
    assert_eq!(out, vec![json!({"Kind": "a", "N": 2}), json!({"Kind": "b", "N": 1})]);
}
