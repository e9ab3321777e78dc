use std::sync::Arc;

use tessera_core::ResourceRegistry;
use tessera_data::{
    col, lit, DataError, Dialect, DuplicatePolicy, MappingKind, MappingRegistry,
    PersistenceContext, Projection, Projector, Query,
};
use tessera_test::{seeded_context, Customer, CustomerSummary, CustomerView, Item};

struct Prefix(String);

fn view_projection() -> Projection {
    Projection::new().keep("id").keep("name").keep("email")
}

fn summary_projection() -> Projection {
    Projection::new()
        .keep("id")
        .field("label", col("name").concat(" <").concat(col("email")).concat(">"))
}

fn projector(registry: MappingRegistry) -> Projector {
    let mut registry = registry;
    registry.freeze();
    Projector::new(Arc::new(registry)).unwrap()
}

fn two_hop_registry() -> MappingRegistry {
    let mut registry = MappingRegistry::new();
    registry
        .register_projection::<Customer, CustomerView>(view_projection())
        .unwrap()
        .register_projection::<CustomerView, CustomerSummary>(summary_projection())
        .unwrap();
    registry
}

fn customers(ctx: &dyn PersistenceContext) -> Query<'_, Customer> {
    ctx.set::<Customer>()
}

#[test]
fn test_projector_requires_frozen_registry() {
    let err = Projector::new(Arc::new(MappingRegistry::new())).unwrap_err();
    assert!(matches!(err, DataError::RegistryNotFrozen));
}

#[test]
fn test_identity_projection_keeps_every_field() {
    let ctx = seeded_context();
    let projector = projector(MappingRegistry::new());

    let projected = projector.project::<Customer, Customer>(customers(&ctx)).unwrap();
    assert!(!projected.is_deferred());
    assert_eq!(projected.fetch().unwrap(), customers(&ctx).fetch().unwrap());
}

#[test]
fn test_registered_projection_stays_deferred() {
    let ctx = seeded_context();
    let projector = projector(two_hop_registry());

    let views = projector
        .project::<Customer, CustomerView>(customers(&ctx))
        .unwrap();
    assert!(views.is_deferred());

    let narrowed = views.filter(CustomerView::NAME.eq("Bob"));
    let sql = narrowed.to_sql(Dialect::Sqlite).unwrap();
    assert!(sql.sql.contains("WHERE"), "{}", sql.sql);
    assert_eq!(
        narrowed.fetch().unwrap(),
        vec![CustomerView {
            id: 2,
            name: "Bob".into(),
            email: "bob@example.com".into(),
        }]
    );
}

#[test]
fn test_two_hop_composition_matches_chained_hops() {
    let ctx = seeded_context();
    let projector = projector(two_hop_registry());

    let composed = projector
        .project_via::<Customer, CustomerView, CustomerSummary>(customers(&ctx))
        .unwrap();
    assert!(composed.is_deferred());

    let first = projector
        .project::<Customer, CustomerView>(customers(&ctx))
        .unwrap();
    let chained = projector
        .project::<CustomerView, CustomerSummary>(first)
        .unwrap();

    let composed = composed.fetch().unwrap();
    assert_eq!(composed, chained.fetch().unwrap());
    assert_eq!(composed[0].label, "Alice <alice@example.com>");
}

#[test]
fn test_eager_hop_breaks_laziness() {
    let ctx = seeded_context();
    // the second hop is an identity
    let mut registry = MappingRegistry::new();
    registry
        .register_projection::<Customer, CustomerView>(view_projection())
        .unwrap();
    let projector = projector(registry);

    let views = projector
        .project_via::<Customer, CustomerView, CustomerView>(customers(&ctx))
        .unwrap();
    assert!(!views.is_deferred());
    assert_eq!(views.count().unwrap(), 5);
}

#[test]
fn test_fallback_copies_matching_fields() {
    let ctx = seeded_context();
    let projector = projector(MappingRegistry::new());

    let views = projector
        .project_and_collect::<Customer, CustomerView>(customers(&ctx).take(1))
        .unwrap();
    assert_eq!(
        views,
        vec![CustomerView {
            id: 1,
            name: "Alice".into(),
            email: "alice@example.com".into(),
        }]
    );
}

#[test]
fn test_fallback_copy_failure_is_reported() {
    let ctx = seeded_context();
    let projector = projector(MappingRegistry::new());

    // items carry no `email`
    let err = projector
        .project_and_collect::<Item, CustomerView>(Query::table(&ctx))
        .unwrap_err();
    match err {
        DataError::ElementCopyFailed {
            source,
            target,
            cause,
        } => {
            assert!(source.ends_with("Item"));
            assert!(target.ends_with("CustomerView"));
            assert!(
                matches!(cause.as_ref(), DataError::MissingField { field } if field == "email"),
                "unexpected cause: {cause}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_first_registered_mapping_wins() {
    let ctx = seeded_context();
    let mut registry = MappingRegistry::with_policy(DuplicatePolicy::Warn);
    registry
        .register_projection::<Customer, CustomerSummary>(
            Projection::new().keep("id").rename("name", "label"),
        )
        .unwrap()
        .register_projection::<Customer, CustomerSummary>(
            Projection::new().keep("id").rename("email", "label"),
        )
        .unwrap();
    assert_eq!(registry.len(), 2);
    let projector = projector(registry);

    let labels: Vec<String> = projector
        .project_and_collect::<Customer, CustomerSummary>(customers(&ctx))
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();
    assert_eq!(labels, ["Alice", "Bob", "Carol", "Dave", "Eve"]);
}

#[test]
fn test_contextual_mapping_uses_resource() {
    let ctx = seeded_context();
    let mut registry = MappingRegistry::new();
    registry
        .register_contextual::<Customer, CustomerSummary, Prefix, _>(
            "label-prefix",
            |query, prefix: &Prefix| {
                Ok(query.select(
                    Projection::new()
                        .keep("id")
                        .field("label", lit(prefix.0.clone()).concat(col("name"))),
                ))
            },
        )
        .unwrap();
    assert_eq!(
        registry.kind_of::<Customer, CustomerSummary>(),
        Some(MappingKind::ContextualQuery)
    );

    let mut resources = ResourceRegistry::new();
    resources.provide("label-prefix", Prefix("customer: ".into())).unwrap();
    let projector = projector(registry).with_resources(Arc::new(resources));

    let summaries = projector
        .project::<Customer, CustomerSummary>(customers(&ctx))
        .unwrap();
    assert!(summaries.is_deferred());
    assert_eq!(
        summaries.first().unwrap().unwrap(),
        CustomerSummary {
            id: 1,
            label: "customer: Alice".into(),
        }
    );
}

#[test]
fn test_contextual_mapping_without_resource_fails() {
    let ctx = seeded_context();
    let mut registry = MappingRegistry::new();
    registry
        .register_contextual::<Customer, CustomerSummary, Prefix, _>("missing", |query, _: &Prefix| {
            Ok(query.cast())
        })
        .unwrap();
    let projector = projector(registry);

    let err = projector
        .project::<Customer, CustomerSummary>(customers(&ctx))
        .unwrap_err();
    assert!(matches!(err, DataError::Resource { ref tag, .. } if tag == "missing"));
}

#[test]
fn test_contextual_mapping_with_wrong_resource_type_fails() {
    let ctx = seeded_context();
    let mut registry = MappingRegistry::new();
    registry
        .register_contextual::<Customer, CustomerSummary, Prefix, _>("prefix", |query, _: &Prefix| {
            Ok(query.cast())
        })
        .unwrap();
    let mut resources = ResourceRegistry::new();
    resources.provide("prefix", 42_u32).unwrap();
    let projector = projector(registry).with_resources(Arc::new(resources));

    let err = projector
        .project::<Customer, CustomerSummary>(customers(&ctx))
        .unwrap_err();
    assert!(matches!(err, DataError::Resource { .. }));
}

#[test]
fn test_copy_into_model_overwrites_shared_fields() {
    let projector = projector(MappingRegistry::new());
    let view = CustomerView {
        id: 1,
        name: "Alicia".into(),
        email: "alicia@example.com".into(),
    };
    let mut customer = tessera_test::customers().remove(0);
    projector.copy_into_model(&view, &mut customer).unwrap();
    assert_eq!(customer.name, "Alicia");
    assert_eq!(customer.tier, "gold");
}
