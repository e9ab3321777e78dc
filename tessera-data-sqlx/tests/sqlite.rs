use std::sync::Arc;

use tessera_core::TesseraConfig;
use tessera_data::{
    col, lit, DataError, GenericService, MappingRegistry, MemoryContext, PersistenceContext,
    Projection, Projector, Repository, SearchSpec,
};
use tessera_data_sqlx::SqliteContext;
use tessera_test::{customers, Customer, CustomerArchive, CustomerView, Item};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        tier TEXT NOT NULL,
        is_deleted BOOLEAN NOT NULL DEFAULT 0
    )",
];

fn context() -> SqliteContext {
    tessera_test::init_test_tracing();
    let ctx = SqliteContext::connect("sqlite::memory:").unwrap();
    for ddl in SCHEMA {
        ctx.execute_raw(ddl, &[]).unwrap();
    }
    ctx
}

fn seeded() -> SqliteContext {
    let ctx = context();
    let repo = Repository::new(&ctx);
    repo.add_range(&customers()).unwrap();
    for name in ["a", "b", "c"] {
        repo.add(&item(name)).unwrap();
    }
    repo.commit().unwrap();
    ctx
}

fn item(name: &str) -> Item {
    Item {
        id: 0,
        name: name.to_string(),
    }
}

fn projector() -> Projector {
    let mut registry = MappingRegistry::new();
    registry
        .register_projection::<Customer, CustomerView>(
            Projection::new().keep("id").keep("name").keep("email"),
        )
        .unwrap();
    registry.freeze();
    Projector::new(Arc::new(registry)).unwrap()
}

#[test]
fn test_keys_are_assigned_and_rows_round_trip() {
    let ctx = seeded();
    let repo = Repository::new(&ctx);

    assert_eq!(repo.add(&item("d")).unwrap(), 4);
    assert_eq!(repo.add(&item("e")).unwrap(), 5);
    assert_eq!(repo.commit().unwrap(), 2);

    let carol = repo.get::<Customer>(3).unwrap().unwrap();
    assert_eq!(carol.email, "carol@example.com");
    assert!(!carol.is_deleted);
    assert_eq!(repo.get_list::<Item>(None).unwrap().len(), 5);
}

#[test]
fn test_soft_deleted_rows_are_filtered_in_sql() {
    let ctx = seeded();
    let repo = Repository::new(&ctx);

    assert_eq!(repo.get_list::<Customer>(None).unwrap().len(), 4);
    assert!(repo.get::<Customer>(5).unwrap().is_none());
    assert!(repo.find::<Customer>(5).unwrap().is_some());
}

#[test]
fn test_updates_and_removals_are_flushed() {
    let ctx = seeded();
    let repo = Repository::new(&ctx);

    repo.update_field(2, Customer::TIER, "gold").unwrap();
    assert!(repo.remove::<Item>(1).unwrap());
    assert_eq!(repo.commit().unwrap(), 2);

    assert_eq!(repo.get::<Customer>(2).unwrap().unwrap().tier, "gold");
    assert!(repo.get::<Item>(1).unwrap().is_none());
    assert_eq!(
        ctx.query_raw("SELECT COUNT(*) AS n FROM items", &[])
            .unwrap()[0]
            .get::<i64>("n")
            .unwrap(),
        2
    );
}

#[test]
fn test_constraint_violation_is_a_validation_failure() {
    let ctx = seeded();
    let repo = Repository::new(&ctx);

    let mut clone = customers()[0].clone();
    clone.id = 0;
    repo.add(&clone).unwrap();
    repo.add(&item("d")).unwrap();

    let err = repo.commit().unwrap_err();
    let failures = err.validation_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].table, "customers");
    assert_eq!(failures[0].field.as_deref(), Some("email"));

    // the save is atomic and the changes stay pending
    assert_eq!(repo.get_list::<Item>(None).unwrap().len(), 3);
    assert!(matches!(
        repo.commit(),
        Err(DataError::PersistValidationFailed(_))
    ));
}

#[test]
fn test_transaction_rollback_undoes_saved_changes() {
    let ctx = seeded();
    let repo = Repository::new(&ctx);

    let result: Result<(), DataError> = repo.transaction(|_| {
        repo.add(&item("d"))?;
        repo.commit()?;
        Err(DataError::NotFound("boom".into()))
    });
    assert!(matches!(result, Err(DataError::TransactionFailed(_))));
    assert_eq!(repo.get_list::<Item>(None).unwrap().len(), 3);

    let key = repo
        .transaction(|_| {
            let key = repo.add(&item("d"))?;
            repo.commit()?;
            Ok(key)
        })
        .unwrap();
    assert!(repo.get::<Item>(key).unwrap().is_some());
}

#[test]
fn test_nested_transaction_is_rejected() {
    let ctx = context();
    let tx = ctx.begin_transaction().unwrap();
    assert!(matches!(
        ctx.begin_transaction().err(),
        Some(DataError::NestedTransaction)
    ));
    drop(tx);
    assert!(ctx.begin_transaction().is_ok());
}

#[test]
fn test_search_runs_in_the_database() {
    let ctx = seeded();
    let service = GenericService::new(Repository::new(&ctx), projector());
    let spec = SearchSpec::<Customer, CustomerView>::builder()
        .filter(CustomerView::NAME.ne("Alice"))
        .order_by(CustomerView::NAME.desc())
        .take(1)
        .build()
        .unwrap();

    let page = service.search::<_, CustomerView>(&spec).unwrap();
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.content[0].name, "Dave");
}

#[test]
fn test_order_then_project_matches_memory() {
    let sqlite = context();
    let repo = Repository::new(&sqlite);
    for name in ["c", "b", "a"] {
        repo.add(&item(name)).unwrap();
    }
    repo.commit().unwrap();
    let memory = MemoryContext::new().with_entities(&repo.query::<Item>().fetch().unwrap());

    let relabelled = |ctx: &dyn PersistenceContext| -> Vec<i64> {
        Repository::new(ctx)
            .query::<Item>()
            .order_by(Item::NAME.asc())
            .select::<Item>(
                Projection::new()
                    .keep("id")
                    .field("name", lit("n").concat(col("id"))),
            )
            .fetch()
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect()
    };
    assert_eq!(relabelled(&memory), vec![3, 2, 1]);
    assert_eq!(relabelled(&sqlite), vec![3, 2, 1]);
}

#[test]
fn test_sync_with_reload_sees_raw_updates() {
    let ctx = seeded();
    ctx.execute_raw(
        "CREATE TABLE customer_archive (id INTEGER PRIMARY KEY, name TEXT, email TEXT, tier TEXT)",
        &[],
    )
    .unwrap();
    ctx.execute_raw(
        "INSERT INTO customer_archive SELECT id, name, email, tier FROM customers",
        &[],
    )
    .unwrap();
    let service = GenericService::new(Repository::new(&ctx), projector());

    service.repository().find::<Customer>(1).unwrap();
    ctx.execute_raw(
        "UPDATE customers SET name = ? WHERE id = ?",
        &["Alicia".into(), 1_i64.into()],
    )
    .unwrap();

    service
        .sync_and_save::<Customer, CustomerArchive>(1, true)
        .unwrap();
    let archived = service
        .repository()
        .get::<CustomerArchive>(1)
        .unwrap()
        .unwrap();
    assert_eq!(archived.name, "Alicia");
}

#[test]
fn test_from_config_reads_url() {
    let config = TesseraConfig::from_yaml_str(
        "tessera:\n  sqlx:\n    url: \"sqlite::memory:\"\n",
        "test",
    )
    .unwrap();
    let ctx = SqliteContext::from_config(&config).unwrap();
    assert_eq!(ctx.execute_raw(SCHEMA[0], &[]).unwrap(), 0);

    assert!(SqliteContext::from_config(&TesseraConfig::empty()).is_err());
}
