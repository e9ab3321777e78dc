use tessera_data::{Identified, MemoryContext};
use tessera_macros::{Entity, Model};

/// Soft-deletable entity used across the data-layer tests.
#[derive(Debug, Clone, PartialEq, Model, Entity)]
#[entity(table = "customers", soft_delete = "is_deleted")]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub tier: String,
    pub is_deleted: bool,
}

/// A second entity sharing keys with [`Customer`].
#[derive(Debug, Clone, PartialEq, Model, Entity)]
#[entity(table = "customer_archive")]
pub struct CustomerArchive {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub tier: String,
}

/// Read model of a customer.
#[derive(Debug, Clone, PartialEq, Model)]
pub struct CustomerView {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl Identified for CustomerView {
    fn key(&self) -> i64 {
        self.id
    }
}

/// Second-hop read model.
#[derive(Debug, Clone, PartialEq, Model)]
pub struct CustomerSummary {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Model, Entity)]
#[entity(table = "items")]
pub struct Item {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Model, Entity)]
#[entity(table = "orders", key = "order_id")]
pub struct Order {
    #[model(rename = "order_id")]
    pub id: i64,
    pub customer_id: i64,
    pub total: i64,
}

fn customer(id: i64, name: &str, tier: &str) -> Customer {
    Customer {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        tier: tier.to_string(),
        is_deleted: false,
    }
}

/// Four live customers and one soft-deleted.
pub fn customers() -> Vec<Customer> {
    let mut gone = customer(5, "Eve", "gold");
    gone.is_deleted = true;
    vec![
        customer(1, "Alice", "gold"),
        customer(2, "Bob", "silver"),
        customer(3, "Carol", "gold"),
        customer(4, "Dave", "bronze"),
        gone,
    ]
}

/// `{1: "a", 2: "b", 3: "c"}`.
pub fn items() -> Vec<Item> {
    ["a", "b", "c"]
        .iter()
        .zip(1..)
        .map(|(name, id)| Item {
            id,
            name: name.to_string(),
        })
        .collect()
}

pub fn orders() -> Vec<Order> {
    vec![
        Order { id: 10, customer_id: 1, total: 120 },
        Order { id: 11, customer_id: 1, total: 80 },
        Order { id: 12, customer_id: 3, total: 300 },
    ]
}

/// A memory context holding [`customers`], [`items`] and [`orders`], with
/// archive rows mirroring the live customers.
pub fn seeded_context() -> MemoryContext {
    let archive: Vec<CustomerArchive> = customers()
        .iter()
        .filter(|c| !c.is_deleted)
        .map(|c| CustomerArchive {
            id: c.id,
            name: c.name.clone(),
            email: c.email.clone(),
            tier: c.tier.clone(),
        })
        .collect();
    MemoryContext::new()
        .with_entities(&customers())
        .with_entities(&items())
        .with_entities(&orders())
        .with_entities(&archive)
}
