use std::sync::Arc;

use tessera_data::{
    col, DataError, Entity, GenericService, MappingRegistry, MemoryContext, Projection, Projector,
    Repository, SearchSpec,
};
use tessera_test::{
    seeded_context, Customer, CustomerArchive, CustomerSummary, CustomerView, Item,
};

fn projector() -> Projector {
    let mut registry = MappingRegistry::new();
    registry
        .register_projection::<Customer, CustomerView>(
            Projection::new().keep("id").keep("name").keep("email"),
        )
        .unwrap()
        .register_projection::<CustomerView, CustomerSummary>(
            Projection::new().keep("id").rename("name", "label"),
        )
        .unwrap();
    registry.freeze();
    Projector::new(Arc::new(registry)).unwrap()
}

fn service(ctx: &MemoryContext) -> GenericService<'_> {
    tessera_test::init_test_tracing();
    GenericService::new(Repository::new(ctx), projector())
}

#[test]
fn test_get_projects_entity() {
    let ctx = seeded_context();
    let service = service(&ctx);

    let view = service.get::<Customer, CustomerView>(2).unwrap().unwrap();
    assert_eq!(view.email, "bob@example.com");
    assert!(service.get::<Customer, CustomerView>(5).unwrap().is_none());

    let summary = service
        .get_via::<Customer, CustomerView, CustomerSummary>(3)
        .unwrap()
        .unwrap();
    assert_eq!(summary.label, "Carol");

    let by = service
        .get_by_via::<Customer, CustomerView, CustomerSummary>(Customer::TIER.eq("bronze"))
        .unwrap()
        .unwrap();
    assert_eq!(by.id, 4);
}

#[test]
fn test_lists() {
    let ctx = seeded_context();
    let service = service(&ctx);

    let gold = service
        .get_list::<Customer, CustomerView>(Some(Customer::TIER.eq("gold")))
        .unwrap();
    assert_eq!(gold.len(), 2);

    let summaries = service
        .get_list_via::<Customer, CustomerView, CustomerSummary>(None)
        .unwrap();
    assert_eq!(summaries.len(), 4);

    let ordered = service
        .get_list_with::<Customer, CustomerView>(None, |q| q.order_by(Customer::NAME.desc()))
        .unwrap();
    assert_eq!(ordered[0].name, "Dave");

    let lazy = service
        .query::<Customer, CustomerView>(Some(Customer::TIER.eq("gold")))
        .unwrap();
    assert!(lazy.is_deferred());
    assert_eq!(lazy.filter(col("name").eq("Carol")).count().unwrap(), 1);
}

#[test]
fn test_search_returns_page() {
    let ctx = seeded_context();
    let service = service(&ctx);
    let spec = SearchSpec::<Customer, CustomerView>::builder()
        .order_by(CustomerView::NAME.asc())
        .skip(1)
        .take(2)
        .build()
        .unwrap();

    let page = service.search::<_, CustomerSummary>(&spec).unwrap();
    let labels: Vec<_> = page.content.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, ["Bob", "Carol"]);
    assert_eq!(page.total_elements, 4);
    assert_eq!((page.skip, page.take), (1, 2));
}

#[test]
fn test_add_commits() {
    let ctx = seeded_context();
    let service = service(&ctx);

    let key = service
        .add::<Item, Item>(&Item {
            id: 0,
            name: "d".into(),
        })
        .unwrap();
    assert_eq!(key, 4);
    assert_eq!(ctx.stored_rows(&Item::TABLE).len(), 4);

    let keys = service
        .add_range::<Item, Item>(&[
            Item {
                id: 0,
                name: "e".into(),
            },
            Item {
                id: 0,
                name: "f".into(),
            },
        ])
        .unwrap();
    assert_eq!(keys, [5, 6]);
}

#[test]
fn test_update_copies_model_onto_entity() {
    let ctx = seeded_context();
    let service = service(&ctx);
    let view = CustomerView {
        id: 1,
        name: "Alicia".into(),
        email: "alicia@example.com".into(),
    };

    service.update::<Customer, CustomerView>(&view).unwrap();
    let stored = service.repository().get::<Customer>(1).unwrap().unwrap();
    assert_eq!(stored.name, "Alicia");
    assert_eq!(stored.tier, "gold");

    service
        .update_with::<Customer, CustomerView>(&view, |c| c.tier = "platinum".into())
        .unwrap();
    assert_eq!(
        service.repository().get::<Customer>(1).unwrap().unwrap().tier,
        "platinum"
    );

    let missing = CustomerView { id: 77, ..view };
    assert!(matches!(
        service.update::<Customer, CustomerView>(&missing),
        Err(DataError::NotFound(_))
    ));
}

#[test]
fn test_update_range_and_fields() {
    let ctx = seeded_context();
    let service = service(&ctx);

    let mut views = service.get_list::<Customer, CustomerView>(None).unwrap();
    for view in &mut views {
        view.name = view.name.to_uppercase();
    }
    service.update_range::<Customer, CustomerView>(&views).unwrap();
    assert_eq!(
        service.repository().get::<Customer>(2).unwrap().unwrap().name,
        "BOB"
    );

    service.update_field(2, Customer::TIER, "gold").unwrap();
    service
        .update_field_named::<Customer>(2, "email", "b@x")
        .unwrap();
    let bob = service.repository().get::<Customer>(2).unwrap().unwrap();
    assert_eq!((bob.tier.as_str(), bob.email.as_str()), ("gold", "b@x"));

    let updated = service
        .update_field_by(Customer::TIER.eq("gold"), Customer::TIER, "silver")
        .unwrap();
    assert_eq!(updated, 3);
}

#[test]
fn test_deletes() {
    let ctx = seeded_context();
    let service = service(&ctx);

    assert!(service.delete::<Item>(1).unwrap());
    assert!(service.delete_by::<Item>(Item::NAME.eq("b")).unwrap());
    assert!(!service.delete::<Item>(1).unwrap());
    assert_eq!(service.get_list::<Item, Item>(None).unwrap().len(), 1);

    let gold = service
        .repository()
        .get_list::<Customer>(Some(Customer::TIER.eq("gold")))
        .unwrap();
    assert_eq!(service.delete_range(&gold).unwrap(), 2);
    assert!(service.delete_entity(&gold[0]).is_ok());
    assert_eq!(
        service
            .delete_range_by::<Customer>(Customer::TIER.eq("silver"))
            .unwrap(),
        1
    );
    assert_eq!(service.get_list::<Customer, Customer>(None).unwrap().len(), 1);
}

#[test]
fn test_sync_with_reload_reads_the_store() {
    let ctx = seeded_context();
    let service = service(&ctx);

    // load Alice so the context holds a copy that is about to go stale
    let tracked = service.repository().find::<Customer>(1).unwrap().unwrap();
    assert_eq!(tracked.name, "Alice");
    service
        .repository()
        .execute_raw("UPDATE customers SET name = ? WHERE id = ?", &["Alicia".into(), 1_i64.into()])
        .unwrap();

    service.sync::<Customer, CustomerArchive>(1, false).unwrap();
    let stale = service.repository().find::<CustomerArchive>(1).unwrap().unwrap();
    assert_eq!(stale.name, "Alice");

    service.sync::<Customer, CustomerArchive>(1, true).unwrap();
    let fresh = service.repository().find::<CustomerArchive>(1).unwrap().unwrap();
    assert_eq!(fresh.name, "Alicia");

    // sync does not commit
    assert_eq!(
        service.repository().get::<CustomerArchive>(1).unwrap().unwrap().name,
        "Alice"
    );
}

#[test]
fn test_sync_and_save_variants_commit() {
    let ctx = seeded_context();
    let service = service(&ctx);
    service
        .repository()
        .execute_raw("UPDATE customers SET tier = 'vip'", &[])
        .unwrap();

    service
        .sync_and_save::<Customer, CustomerArchive>(1, true)
        .unwrap();
    assert_eq!(
        service.repository().get::<CustomerArchive>(1).unwrap().unwrap().tier,
        "vip"
    );

    service
        .sync_list_and_save::<Customer, CustomerArchive>(&[2, 3, 4], true)
        .unwrap();
    let tiers: Vec<_> = service
        .get_list::<CustomerArchive, CustomerArchive>(None)
        .unwrap()
        .into_iter()
        .map(|a| a.tier)
        .collect();
    assert_eq!(tiers, ["vip", "vip", "vip", "vip"]);

    let err = service
        .sync::<Customer, CustomerArchive>(5, true)
        .unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
}
