use tessera_data::{
    CommitPolicy, Constraint, DataError, Entity, MemoryContext, Repository, Value,
};
use tessera_test::{customers, seeded_context, Customer, Item, RecordingContext};

fn new_item(name: &str) -> Item {
    Item {
        id: 0,
        name: name.to_string(),
    }
}

#[test]
fn test_failing_action_rolls_back_once() {
    tessera_test::init_test_tracing();
    let ctx = RecordingContext::new(seeded_context());
    let repo = Repository::new(&ctx);

    let result: Result<(), DataError> = repo.transaction(|_| {
        repo.add(&new_item("d"))?;
        repo.commit()?;
        Err(DataError::NotFound("boom".into()))
    });

    match result {
        Err(DataError::TransactionFailed(inner)) => {
            assert!(matches!(*inner, DataError::NotFound(_)));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    let counts = ctx.counts();
    assert_eq!(counts.rollbacks, 1);
    assert_eq!(counts.commits, 0);
    assert_eq!(repo.get_list::<Item>(None).unwrap().len(), 3);
}

#[test]
fn test_succeeding_action_commits_once() {
    let ctx = RecordingContext::new(seeded_context());
    let repo = Repository::new(&ctx);

    let key = repo
        .transaction(|_| {
            let key = repo.add(&new_item("d"))?;
            repo.commit()?;
            Ok(key)
        })
        .unwrap();

    let counts = ctx.counts();
    assert_eq!((counts.commits, counts.rollbacks), (1, 0));
    assert_eq!(key, 4);
    assert!(repo.get::<Item>(4).unwrap().is_some());
}

#[test]
fn test_action_may_finish_the_transaction_itself() {
    let ctx = RecordingContext::new(seeded_context());
    let repo = Repository::new(&ctx);

    repo.transaction(|tx| tx.rollback()).unwrap();

    let counts = ctx.counts();
    assert_eq!((counts.commits, counts.rollbacks), (0, 1));
}

#[test]
fn test_commit_failure_is_wrapped() {
    tessera_test::init_test_tracing();
    let ctx = RecordingContext::new(seeded_context()).failing_commits();
    let repo = Repository::new(&ctx);

    let err = repo.transaction(|_| Ok(())).unwrap_err();
    assert!(matches!(err, DataError::TransactionFailed(_)));
    assert_eq!(ctx.counts().rollbacks, 1);
}

#[test]
fn test_nested_transaction_is_wrapped() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let err = repo
        .transaction(|_| repo.transaction(|_| Ok(())))
        .unwrap_err();
    match err {
        DataError::TransactionFailed(outer) => match *outer {
            DataError::TransactionFailed(inner) => {
                assert!(matches!(*inner, DataError::NestedTransaction));
            }
            other => panic!("unexpected inner error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
}

fn unique_email_context() -> MemoryContext {
    seeded_context().with_constraint(&Customer::TABLE, Constraint::Unique("email"))
}

fn duplicate_alice() -> Customer {
    let mut alice = customers().remove(0);
    alice.id = 0;
    alice
}

#[test]
fn test_commit_surfaces_validation_failure_by_default() {
    let ctx = unique_email_context();
    let repo = Repository::new(&ctx);
    repo.add(&duplicate_alice()).unwrap();

    let err = repo.commit().unwrap_err();
    let failures = err.validation_failures().unwrap();
    assert_eq!(failures[0].table, "customers");
    assert!(repo.take_validation_failure().is_none());
}

#[test]
fn test_commit_can_suppress_validation_failure() {
    let ctx = unique_email_context();
    let repo = Repository::new(&ctx).with_commit_policy(CommitPolicy::Suppress);
    repo.add(&duplicate_alice()).unwrap();

    assert_eq!(repo.commit().unwrap(), 0);
    assert!(matches!(
        repo.take_validation_failure(),
        Some(DataError::PersistValidationFailed(_))
    ));
    assert!(repo.take_validation_failure().is_none());
    assert_eq!(repo.get_list::<Customer>(None).unwrap().len(), 4);
}

#[test]
fn test_listing_skips_soft_deleted_rows() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    assert_eq!(repo.get_list::<Customer>(None).unwrap().len(), 4);
    assert!(repo.get::<Customer>(5).unwrap().is_none());
    // lookup by key sees every row
    assert!(repo.find::<Customer>(5).unwrap().is_some());
}

#[test]
fn test_find_sees_pending_changes() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    repo.update_field(1, Customer::NAME, "Alicia").unwrap();
    assert_eq!(repo.find::<Customer>(1).unwrap().unwrap().name, "Alicia");
    assert_eq!(repo.get::<Customer>(1).unwrap().unwrap().name, "Alice");

    repo.commit().unwrap();
    assert_eq!(repo.get::<Customer>(1).unwrap().unwrap().name, "Alicia");
}

#[test]
fn test_lookups() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let bob = repo.get_by::<Customer>(Customer::TIER.eq("silver")).unwrap().unwrap();
    assert_eq!(bob.id, 2);

    let gold = repo
        .get_list::<Customer>(Some(Customer::TIER.eq("gold")))
        .unwrap();
    assert_eq!(gold.len(), 2);

    let picked = repo.get_list_by_ids::<Customer>(&[3, 1, 5]).unwrap();
    assert_eq!(picked.iter().map(|c| c.id).collect::<Vec<_>>(), [1, 3]);

    let by_name = repo
        .get_list_with::<Customer>(None, |q| q.order_by(Customer::NAME.desc()).take(2))
        .unwrap();
    assert_eq!(by_name[0].name, "Dave");
    assert_eq!(by_name.len(), 2);

    assert_eq!(
        repo.get_property(2, Customer::EMAIL).unwrap().as_deref(),
        Some("bob@example.com")
    );
    assert_eq!(
        repo.get_property_by(Customer::NAME.eq("Carol"), Customer::ID).unwrap(),
        Some(3)
    );
    assert_eq!(repo.get_property(99, Customer::EMAIL).unwrap(), None);

    assert!(repo.any::<Customer>(Some(Customer::TIER.eq("bronze"))).unwrap());
    assert!(!repo.any::<Customer>(Some(Customer::TIER.eq("platinum"))).unwrap());
}

#[test]
fn test_add_update_and_remove() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let keys = repo.add_range(&[new_item("d"), new_item("e")]).unwrap();
    assert_eq!(keys, [4, 5]);
    assert_eq!(repo.commit().unwrap(), 2);

    let mut item = repo.get::<Item>(4).unwrap().unwrap();
    item.name = "dd".into();
    assert_eq!(repo.add_or_update(&item).unwrap(), 4);
    repo.update_field_named::<Item>(5, "name", "ee").unwrap();
    repo.commit().unwrap();
    assert_eq!(repo.get::<Item>(4).unwrap().unwrap().name, "dd");
    assert_eq!(repo.get::<Item>(5).unwrap().unwrap().name, "ee");

    assert!(repo.remove::<Item>(4).unwrap());
    assert!(!repo.remove::<Item>(42).unwrap());
    assert!(repo.remove_by::<Item>(Item::NAME.eq("ee")).unwrap());
    repo.commit().unwrap();
    assert_eq!(repo.get_list::<Item>(None).unwrap().len(), 3);
}

#[test]
fn test_update_field_named_rejects_unknown_column() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);
    let err = repo
        .update_field_named::<Item>(1, "colour", "red")
        .unwrap_err();
    assert!(matches!(err, DataError::MissingField { .. }));
}

#[test]
fn test_update_field_by_predicate() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let updated = repo
        .update_field_by(Customer::TIER.eq("gold"), Customer::TIER, "platinum")
        .unwrap();
    assert_eq!(updated, 2);
    repo.commit().unwrap();
    assert_eq!(
        repo.get_list::<Customer>(Some(Customer::TIER.eq("platinum")))
            .unwrap()
            .len(),
        2
    );

    let err = repo
        .update_field_by(Customer::TIER.eq("gold"), Customer::TIER, "x")
        .unwrap_err();
    assert!(matches!(err, DataError::NotFound(_)));
}

#[test]
fn test_remove_ranges() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let gold = repo
        .get_list::<Customer>(Some(Customer::TIER.eq("gold")))
        .unwrap();
    assert_eq!(repo.remove_range(&gold).unwrap(), 2);
    assert_eq!(
        repo.remove_range_by::<Customer>(Customer::TIER.ne("gold")).unwrap(),
        2
    );
    repo.commit().unwrap();
    assert!(!repo.any::<Customer>(None).unwrap());
}

#[test]
fn test_reload_discards_pending_changes() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let mut alice = repo.find::<Customer>(1).unwrap().unwrap();
    alice.name = "changed".into();
    repo.update(&alice).unwrap();

    repo.reload(&mut alice).unwrap();
    assert_eq!(alice.name, "Alice");
    assert_eq!(repo.find::<Customer>(1).unwrap().unwrap().name, "Alice");
}

#[test]
fn test_raw_access() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);

    let affected = repo
        .execute_raw(
            "UPDATE items SET name = ? WHERE id = ?",
            &[Value::from("z"), Value::from(3_i64)],
        )
        .unwrap();
    assert_eq!(affected, 1);

    let rows: Vec<Item> = repo
        .raw_query("SELECT * FROM items WHERE name = ?", &["z".into()])
        .unwrap();
    assert_eq!(
        rows,
        vec![Item {
            id: 3,
            name: "z".into()
        }]
    );
}
