use std::any::{type_name, Any, TypeId};
use std::fmt;

use tessera_core::ResourceResolver;

use crate::config::DataConfig;
use crate::error::DataError;
use crate::plan::Projection;
use crate::query::Query;

/// An ordered (source, target) pair of types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypePair {
    source: TypeId,
    target: TypeId,
    source_name: &'static str,
    target_name: &'static str,
}

impl TypePair {
    pub fn of<S: 'static, T: 'static>() -> Self {
        TypePair {
            source: TypeId::of::<S>(),
            target: TypeId::of::<T>(),
            source_name: type_name::<S>(),
            target_name: type_name::<T>(),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }

    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.target
    }

    pub(crate) fn ids(&self) -> (TypeId, TypeId) {
        (self.source, self.target)
    }
}

impl fmt::Display for TypePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_name, self.target_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// A per-element field projection, translatable to the store's query language.
    Projection,
    /// A query-to-query function that needs a contextual resource.
    ContextualQuery,
}

/// What to do when a pair is registered twice. The first mapping always wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Allow,
    #[default]
    Warn,
    Reject,
}

/// Type-erased contextual transform from a query of `S` to a query of `T`.
pub type ContextualFn<S, T> = dyn for<'c> Fn(Query<'c, S>, &(dyn Any + Send + Sync)) -> Result<Query<'c, T>, DataError>
    + Send
    + Sync;

// Passing the closure through a function bound makes it higher-ranked over 'c.
fn contextual<S, T, F>(f: F) -> Box<ContextualFn<S, T>>
where
    S: 'static,
    T: 'static,
    F: for<'c> Fn(Query<'c, S>, &(dyn Any + Send + Sync)) -> Result<Query<'c, T>, DataError>
        + Send
        + Sync
        + 'static,
{
    Box::new(f)
}

enum Transform {
    Projection(Projection),
    Contextual {
        tag: String,
        /// A `Box<ContextualFn<S, T>>` for the mapping's pair.
        apply: Box<dyn Any + Send + Sync>,
    },
}

struct Mapping {
    pair: TypePair,
    transform: Transform,
}

impl Mapping {
    fn kind(&self) -> MappingKind {
        match self.transform {
            Transform::Projection(_) => MappingKind::Projection,
            Transform::Contextual { .. } => MappingKind::ContextualQuery,
        }
    }
}

/// Append-only catalog of transformations between pairs of types.
///
/// Lookups return the first mapping registered for a pair. The registry is
/// filled at startup, then frozen before being shared with a
/// [`Projector`](crate::Projector).
///
/// ```ignore
/// let mut registry = MappingRegistry::new();
/// registry.register_projection::<Order, OrderSummary>(
///     Projection::new().keep("id").rename("customer", "name"),
/// )?;
/// registry.freeze();
/// ```
#[derive(Default)]
pub struct MappingRegistry {
    mappings: Vec<Mapping>,
    policy: DuplicatePolicy,
    frozen: bool,
}

impl fmt::Debug for MappingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRegistry")
            .field(
                "mappings",
                &self
                    .mappings
                    .iter()
                    .map(|m| (m.pair.to_string(), m.kind()))
                    .collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        MappingRegistry {
            policy,
            ..Self::default()
        }
    }

    /// An empty registry using the configured duplicate policy.
    pub fn from_config(config: &DataConfig) -> Self {
        Self::with_policy(config.duplicates)
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Register a projection from `S` to `T`.
    pub fn register_projection<S: 'static, T: 'static>(
        &mut self,
        projection: Projection,
    ) -> Result<&mut Self, DataError> {
        self.push(TypePair::of::<S, T>(), Transform::Projection(projection))
    }

    /// Register a transform that needs the resource provided under `tag`.
    ///
    /// The resource is resolved each time the mapping is applied and must
    /// be an `R`; the transform must return a query without running it.
    pub fn register_contextual<S, T, R, F>(
        &mut self,
        tag: &str,
        transform: F,
    ) -> Result<&mut Self, DataError>
    where
        S: 'static,
        T: 'static,
        R: Any + Send + Sync,
        F: for<'c> Fn(Query<'c, S>, &R) -> Result<Query<'c, T>, DataError>
            + Send
            + Sync
            + 'static,
    {
        let resource_tag = tag.to_string();
        let apply = contextual::<S, T, _>(move |query, resource| {
            let resource = resource.downcast_ref::<R>().ok_or_else(|| {
                DataError::resource(
                    &resource_tag,
                    format!("expected a `{}`", type_name::<R>()),
                )
            })?;
            transform(query, resource)
        });
        self.push(
            TypePair::of::<S, T>(),
            Transform::Contextual {
                tag: tag.to_string(),
                apply: Box::new(apply),
            },
        )
    }

    fn push(&mut self, pair: TypePair, transform: Transform) -> Result<&mut Self, DataError> {
        if self.frozen {
            return Err(DataError::RegistryFrozen);
        }
        if self.lookup(&pair).is_some() {
            match self.policy {
                DuplicatePolicy::Allow => {}
                DuplicatePolicy::Warn => {
                    tracing::warn!(pair = %pair, "Duplicate mapping registered; the first one stays in effect");
                }
                DuplicatePolicy::Reject => {
                    return Err(DataError::DuplicateMapping {
                        source: pair.source_name(),
                        target: pair.target_name(),
                    });
                }
            }
        }
        tracing::debug!(pair = %pair, "Mapping registered");
        self.mappings.push(Mapping { pair, transform });
        Ok(self)
    }

    fn lookup(&self, pair: &TypePair) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.pair == *pair)
    }

    pub fn exists<S: 'static, T: 'static>(&self) -> bool {
        self.lookup(&TypePair::of::<S, T>()).is_some()
    }

    /// Kind of the mapping in effect for the pair.
    pub fn kind_of<S: 'static, T: 'static>(&self) -> Option<MappingKind> {
        self.lookup(&TypePair::of::<S, T>()).map(Mapping::kind)
    }

    /// Apply the first mapping registered for `(S, T)` without running the query.
    pub fn apply<'c, S: 'static, T: 'static>(
        &self,
        query: Query<'c, S>,
        resources: &dyn ResourceResolver,
    ) -> Result<Query<'c, T>, DataError> {
        let pair = TypePair::of::<S, T>();
        let mapping = self.lookup(&pair).ok_or(DataError::MappingNotFound {
            source: pair.source_name(),
            target: pair.target_name(),
        })?;
        match &mapping.transform {
            Transform::Projection(projection) => Ok(query.select(projection.clone())),
            Transform::Contextual { tag, apply } => {
                let resource = resources.resolve(tag).ok_or_else(|| {
                    DataError::resource(tag, "no resource is provided under this tag")
                })?;
                let apply = apply.downcast_ref::<Box<ContextualFn<S, T>>>().ok_or_else(|| {
                    DataError::Unsupported(format!("mapping {pair} holds a transform of another pair"))
                })?;
                apply(query, &*resource)
            }
        }
    }

    /// Close the registry to further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A;
    struct B;

    #[test]
    fn test_first_registration_wins() {
        let mut registry = MappingRegistry::with_policy(DuplicatePolicy::Allow);
        registry
            .register_projection::<A, B>(Projection::new().keep("x"))
            .unwrap()
            .register_contextual::<A, B, u32, _>("r", |q, _: &u32| Ok(q.cast()))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.kind_of::<A, B>(), Some(MappingKind::Projection));
        assert_eq!(registry.kind_of::<B, A>(), None);
    }

    #[test]
    fn test_reject_policy() {
        let mut registry = MappingRegistry::with_policy(DuplicatePolicy::Reject);
        registry.register_projection::<A, B>(Projection::new()).unwrap();
        let err = registry
            .register_projection::<A, B>(Projection::new())
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateMapping { .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let mut registry = MappingRegistry::new();
        registry.freeze();
        assert!(matches!(
            registry.register_projection::<A, B>(Projection::new()),
            Err(DataError::RegistryFrozen)
        ));
        assert!(!registry.exists::<A, B>());
    }

    #[test]
    fn test_type_pair_identity() {
        assert!(TypePair::of::<A, A>().is_identity());
        assert!(!TypePair::of::<A, B>().is_identity());
        assert_ne!(TypePair::of::<A, B>(), TypePair::of::<B, A>());
    }
}
