use std::sync::Arc;

use tessera_data::{
    DataError, Dialect, MappingRegistry, Pagination, Projection, Projector, Query, Repository,
    SearchEngine, SearchModel, SearchSpec,
};
use tessera_test::{seeded_context, Customer, CustomerView, Item};

fn engine() -> SearchEngine {
    let mut registry = MappingRegistry::new();
    registry
        .register_projection::<Customer, CustomerView>(
            Projection::new().keep("id").keep("name").keep("email"),
        )
        .unwrap();
    registry.freeze();
    SearchEngine::new(Projector::new(Arc::new(registry)).unwrap())
}

/// Gold customers, newest name first.
struct GoldCustomers {
    pagination: Pagination,
}

impl SearchModel for GoldCustomers {
    type Entity = Customer;
    type View = CustomerView;

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn filter<'c>(&self, query: Query<'c, CustomerView>) -> Query<'c, CustomerView> {
        query.filter(tessera_data::col("email").like("%example.com"))
    }

    fn order<'c>(&self, query: Query<'c, CustomerView>) -> Query<'c, CustomerView> {
        query.order_by(CustomerView::NAME.desc())
    }

    fn build_view<'c>(
        &self,
        projector: &Projector,
        query: Query<'c, Customer>,
    ) -> Result<Query<'c, CustomerView>, DataError> {
        projector.project(query.filter(Customer::TIER.eq("gold")))
    }
}

#[test]
fn test_skip_one_take_one() {
    let ctx = seeded_context();
    let spec = SearchSpec::<Item, Item>::builder()
        .order_by(Item::ID.asc())
        .skip(1)
        .take(1)
        .build()
        .unwrap();

    let result = engine().find(&spec, Query::table(&ctx)).unwrap();
    assert_eq!(result.count, 3);
    assert!(result.query.is_deferred());

    let page = result.fetch().unwrap();
    assert_eq!(
        page.content,
        vec![Item {
            id: 2,
            name: "b".into()
        }]
    );
    assert_eq!(page.total_elements, 3);
    assert_eq!(page.total_pages, 3);
}

#[test]
fn test_page_length_follows_skip_and_take() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);
    let engine = engine();
    let population = 4_i64;

    for skip in 0..6_i64 {
        for take in 1..6_i64 {
            let spec = SearchSpec::<Customer, CustomerView>::builder()
                .order_by(CustomerView::ID.asc())
                .skip(skip)
                .take(take)
                .build()
                .unwrap();
            let result = engine.find(&spec, repo.query::<Customer>()).unwrap();
            assert_eq!(result.count, population as u64);

            let expected = take.min(population - skip).max(0) as usize;
            let rows = result.query.fetch().unwrap();
            assert_eq!(rows.len(), expected, "skip={skip} take={take}");
        }
    }
}

#[test]
fn test_reverse_is_exact_reverse() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);
    let engine = engine();
    let fetch = |reverse: bool| {
        let spec = SearchSpec::<Customer, CustomerView>::builder()
            .order_by(CustomerView::NAME.asc())
            .reverse(reverse)
            .build()
            .unwrap();
        engine
            .find(&spec, repo.query::<Customer>())
            .unwrap()
            .query
            .fetch()
            .unwrap()
    };

    let ascending = fetch(false);
    let mut descending = fetch(true);
    descending.reverse();
    assert_eq!(ascending, descending);
    assert_eq!(ascending.len(), 4);
}

#[test]
fn test_count_ignores_pagination_but_honors_filter() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);
    let spec = SearchSpec::<Customer, CustomerView>::builder()
        .order_by(CustomerView::ID.asc())
        .filter(CustomerView::NAME.like("%a%"))
        .take(1)
        .build()
        .unwrap();

    let result = engine().find(&spec, repo.query::<Customer>()).unwrap();
    // Alice, Carol, Dave; Eve is soft-deleted
    assert_eq!(result.count, 3);
    assert_eq!(result.query.fetch().unwrap().len(), 1);
}

#[test]
fn test_custom_search_model() {
    let ctx = seeded_context();
    let repo = Repository::new(&ctx);
    let model = GoldCustomers {
        pagination: Pagination::new(0, 10).unwrap(),
    };

    let page = engine()
        .find(&model, repo.query::<Customer>())
        .unwrap()
        .fetch()
        .unwrap();
    let names: Vec<_> = page.content.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Carol", "Alice"]);
    assert_eq!(page.total_elements, 2);
}

#[test]
fn test_search_runs_as_one_statement() {
    let ctx = seeded_context();
    let spec = SearchSpec::<Item, Item>::builder()
        .order_by(Item::NAME.asc())
        .reverse(true)
        .skip(1)
        .take(1)
        .build()
        .unwrap();

    let result = engine().find(&spec, Query::table(&ctx)).unwrap();
    let stmt = result.query.to_sql(Dialect::Sqlite).unwrap();
    assert_eq!(
        stmt.sql,
        r#"SELECT "id", "name" FROM "items" ORDER BY "name" DESC LIMIT 1 OFFSET 1"#
    );
}

#[test]
fn test_invalid_specifications() {
    let missing_order = SearchSpec::<Item, Item>::builder().build();
    assert!(matches!(
        missing_order,
        Err(DataError::InvalidSearchSpecification(_))
    ));

    let negative_skip = SearchSpec::<Item, Item>::builder()
        .order_by(Item::ID.asc())
        .skip(-1)
        .build();
    assert!(matches!(
        negative_skip,
        Err(DataError::InvalidSearchSpecification(_))
    ));

    let zero_take = SearchSpec::<Item, Item>::builder()
        .order_by(Item::ID.asc())
        .take(0)
        .build();
    assert!(zero_take.is_err());
}
