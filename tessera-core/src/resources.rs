use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased resource handed to contextual mappings.
pub type SharedResource = Arc<dyn Any + Send + Sync>;

/// Looks up contextual resources by tag.
///
/// Contextual mappings declare the tag of the resource they need; the
/// resolver is consulted each time such a mapping is applied.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, tag: &str) -> Option<SharedResource>;
}

/// Errors raised while assembling a [`ResourceRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The same tag was provided twice.
    DuplicateTag { tag: String },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::DuplicateTag { tag } => {
                write!(f, "Resource tag `{tag}` is already provided")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

struct Entry {
    type_name: &'static str,
    value: SharedResource,
}

/// Tag-keyed container of shared resources.
///
/// ```
/// use tessera_core::ResourceRegistry;
///
/// let mut registry = ResourceRegistry::new();
/// registry.provide("tax-rate", 0.2_f64).unwrap();
/// assert_eq!(*registry.get::<f64>("tax-rate").unwrap(), 0.2);
/// ```
#[derive(Default)]
pub struct ResourceRegistry {
    entries: HashMap<String, Entry>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self
            .entries
            .iter()
            .map(|(tag, entry)| (tag.as_str(), entry.type_name))
            .collect();
        tags.sort();
        f.debug_struct("ResourceRegistry").field("entries", &tags).finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a resource under `tag`.
    pub fn provide<T: Send + Sync + 'static>(
        &mut self,
        tag: &str,
        value: T,
    ) -> Result<&mut Self, ResourceError> {
        self.provide_shared(tag, Arc::new(value))
    }

    /// Provide an already shared resource under `tag`.
    pub fn provide_shared<T: Send + Sync + 'static>(
        &mut self,
        tag: &str,
        value: Arc<T>,
    ) -> Result<&mut Self, ResourceError> {
        if self.entries.contains_key(tag) {
            return Err(ResourceError::DuplicateTag {
                tag: tag.to_string(),
            });
        }
        tracing::debug!(tag, resource = type_name::<T>(), "Resource provided");
        self.entries.insert(
            tag.to_string(),
            Entry {
                type_name: type_name::<T>(),
                value,
            },
        );
        Ok(self)
    }

    /// Typed lookup. Returns `None` if the tag is absent or holds another type.
    pub fn get<T: Send + Sync + 'static>(&self, tag: &str) -> Option<Arc<T>> {
        self.entries
            .get(tag)
            .and_then(|entry| entry.value.clone().downcast::<T>().ok())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResourceResolver for ResourceRegistry {
    fn resolve(&self, tag: &str) -> Option<SharedResource> {
        self.entries.get(tag).map(|entry| entry.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_get_rejects_wrong_type() {
        let mut registry = ResourceRegistry::new();
        registry.provide("limit", 10_i64).unwrap();
        assert!(registry.get::<String>("limit").is_none());
        assert_eq!(*registry.get::<i64>("limit").unwrap(), 10);
    }

    #[test]
    fn test_duplicate_tag() {
        let mut registry = ResourceRegistry::new();
        registry.provide("a", 1_i64).unwrap();
        let err = registry.provide("a", 2_i64).unwrap_err();
        assert_eq!(err, ResourceError::DuplicateTag { tag: "a".into() });
        assert_eq!(*registry.get::<i64>("a").unwrap(), 1);
    }
}
