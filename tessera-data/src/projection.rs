use std::any::TypeId;
use std::sync::Arc;

use tessera_core::{ResourceRegistry, ResourceResolver};

use crate::copier::{FieldCopier, ObjectCopier};
use crate::entity::Model;
use crate::error::DataError;
use crate::mapping::{MappingRegistry, TypePair};
use crate::query::Query;
use crate::record::Record;

/// Turns queries of one type into queries of another.
///
/// Resolution order for `S -> T`:
///
/// 1. `S == T`: the query is run and its rows reused as is.
/// 2. A mapping is registered: it is applied and the result stays lazy.
/// 3. Otherwise the query is run and each row copied with the object copier.
///
/// Cheap to clone; clones share the registry, resources and copier.
#[derive(Clone)]
pub struct Projector {
    registry: Arc<MappingRegistry>,
    resources: Arc<dyn ResourceResolver>,
    copier: Arc<dyn ObjectCopier>,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Projector {
    /// Build a projector over a frozen registry, with no contextual
    /// resources and the name-matching [`FieldCopier`].
    pub fn new(registry: Arc<MappingRegistry>) -> Result<Self, DataError> {
        if !registry.is_frozen() {
            return Err(DataError::RegistryNotFrozen);
        }
        Ok(Projector {
            registry,
            resources: Arc::new(ResourceRegistry::new()),
            copier: Arc::new(FieldCopier::new()),
        })
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceResolver>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_copier(mut self, copier: Arc<dyn ObjectCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    pub fn copier(&self) -> &dyn ObjectCopier {
        self.copier.as_ref()
    }

    pub fn project<'c, S: Model, T: Model>(
        &self,
        query: Query<'c, S>,
    ) -> Result<Query<'c, T>, DataError> {
        let pair = TypePair::of::<S, T>();
        if TypeId::of::<S>() == TypeId::of::<T>() {
            tracing::debug!(pair = %pair, "Identity projection");
            return Ok(query.materialize()?.cast());
        }
        if self.registry.exists::<S, T>() {
            tracing::debug!(pair = %pair, kind = ?self.registry.kind_of::<S, T>(), "Applying registered mapping");
            return self.registry.apply(query, self.resources.as_ref());
        }

        tracing::debug!(pair = %pair, "No mapping registered, copying elements");
        let ctx = query.context();
        let copied = query
            .fetch_records()?
            .iter()
            .map(|row| self.copy_record::<T>(&pair, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Query::from_records(ctx, copied))
    }

    pub fn project_and_collect<S: Model, M: Model>(
        &self,
        query: Query<'_, S>,
    ) -> Result<Vec<M>, DataError> {
        self.project::<S, M>(query)?.fetch()
    }

    /// `A -> B -> C`. Lazy only when both hops are registered mappings.
    pub fn project_via<'c, A: Model, B: Model, C: Model>(
        &self,
        query: Query<'c, A>,
    ) -> Result<Query<'c, C>, DataError> {
        let intermediate = self.project::<A, B>(query)?;
        self.project::<B, C>(intermediate)
    }

    /// Copy one value into a new `T` with the object copier.
    pub fn copy_model<S: Model, T: Model>(&self, source: &S) -> Result<T, DataError> {
        let pair = TypePair::of::<S, T>();
        let record = self.copy_record::<T>(&pair, &source.to_record())?;
        T::from_record(&record).map_err(|err| copy_failed(&pair, err))
    }

    /// Overwrite the fields `target` shares with `source`.
    pub fn copy_into_model<S: Model, T: Model>(
        &self,
        source: &S,
        target: &mut T,
    ) -> Result<(), DataError> {
        let pair = TypePair::of::<S, T>();
        let mut record = target.to_record();
        self.copier
            .copy_into(&pair, &source.to_record(), &mut record)
            .map_err(|err| copy_failed(&pair, err))?;
        *target = T::from_record(&record).map_err(|err| copy_failed(&pair, err))?;
        Ok(())
    }

    // Copy, then round-trip through `T` so shape errors surface here.
    fn copy_record<T: Model>(&self, pair: &TypePair, row: &Record) -> Result<Record, DataError> {
        let copied = self
            .copier
            .copy(pair, row)
            .map_err(|err| copy_failed(pair, err))?;
        let target = T::from_record(&copied).map_err(|err| copy_failed(pair, err))?;
        Ok(target.to_record())
    }
}

fn copy_failed(pair: &TypePair, err: DataError) -> DataError {
    match err {
        err @ DataError::ElementCopyFailed { .. } => err,
        other => DataError::ElementCopyFailed {
            source: pair.source_name(),
            target: pair.target_name(),
            cause: Box::new(other),
        },
    }
}
