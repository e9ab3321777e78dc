use std::sync::Arc;

use tessera_core::{ResourceRegistry, ResourceResolver};

struct Catalog {
    names: Vec<&'static str>,
}

#[test]
fn test_resolve_returns_shared_instance() {
    let catalog = Arc::new(Catalog {
        names: vec!["widget"],
    });
    let mut registry = ResourceRegistry::new();
    registry.provide_shared("catalog", catalog.clone()).unwrap();

    let resolved = registry.resolve("catalog").unwrap();
    let typed = resolved.downcast::<Catalog>().ok().unwrap();
    assert!(Arc::ptr_eq(&typed, &catalog));
    assert_eq!(typed.names, vec!["widget"]);
}

#[test]
fn test_unknown_tag() {
    let registry = ResourceRegistry::new();
    assert!(registry.resolve("missing").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_chained_provide() {
    let mut registry = ResourceRegistry::new();
    registry
        .provide("a", 1_i64)
        .unwrap()
        .provide("b", String::from("two"))
        .unwrap();
    assert_eq!(registry.len(), 2);
    assert!(registry.contains("b"));
    assert_eq!(registry.get::<String>("b").unwrap().as_str(), "two");
}
