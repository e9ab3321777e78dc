use crate::entity::{Entity, Field, Identified, Model};
use crate::error::DataError;
use crate::expr::Expr;
use crate::page::Page;
use crate::projection::Projector;
use crate::query::Query;
use crate::repository::Repository;
use crate::search::{SearchEngine, SearchModel};
use crate::value::Value;

/// CRUD expressed in terms of models, projected to and from entities.
///
/// Reads project entities into the requested model type; writes copy the
/// model onto the entity and commit. `sync*` copy one entity type onto
/// another sharing the same key.
#[derive(Debug)]
pub struct GenericService<'c> {
    repository: Repository<'c>,
    projector: Projector,
    engine: SearchEngine,
}

impl<'c> GenericService<'c> {
    pub fn new(repository: Repository<'c>, projector: Projector) -> Self {
        GenericService {
            engine: SearchEngine::new(projector.clone()),
            repository,
            projector,
        }
    }

    pub fn repository(&self) -> &Repository<'c> {
        &self.repository
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    // ── reads ───────────────────────────────────────────────────────────

    pub fn get<E: Entity, M: Model>(&self, key: i64) -> Result<Option<M>, DataError> {
        self.projector
            .project::<E, M>(self.repository.get_query_by_id::<E>(key))?
            .first()
    }

    /// `E -> V -> M`.
    pub fn get_via<E: Entity, V: Model, M: Model>(&self, key: i64) -> Result<Option<M>, DataError> {
        self.projector
            .project_via::<E, V, M>(self.repository.get_query_by_id::<E>(key))?
            .first()
    }

    pub fn get_by<E: Entity, M: Model>(&self, predicate: Expr) -> Result<Option<M>, DataError> {
        self.projector
            .project::<E, M>(self.repository.query::<E>().filter(predicate))?
            .first()
    }

    pub fn get_by_via<E: Entity, V: Model, M: Model>(
        &self,
        predicate: Expr,
    ) -> Result<Option<M>, DataError> {
        self.projector
            .project_via::<E, V, M>(self.repository.query::<E>().filter(predicate))?
            .first()
    }

    pub fn get_list<E: Entity, M: Model>(&self, filter: Option<Expr>) -> Result<Vec<M>, DataError> {
        self.query::<E, M>(filter)?.fetch()
    }

    pub fn get_list_via<E: Entity, V: Model, M: Model>(
        &self,
        filter: Option<Expr>,
    ) -> Result<Vec<M>, DataError> {
        self.projector
            .project_via::<E, V, M>(self.filtered::<E>(filter))?
            .fetch()
    }

    /// Load entities with `include` applied, then copy each into an `M`.
    pub fn get_list_with<E: Entity, M: Model>(
        &self,
        filter: Option<Expr>,
        include: impl FnOnce(Query<'c, E>) -> Query<'c, E>,
    ) -> Result<Vec<M>, DataError> {
        self.repository
            .get_list_with::<E>(filter, include)?
            .iter()
            .map(|entity| self.projector.copy_model::<E, M>(entity))
            .collect()
    }

    /// Run a search and materialize the page as `M`s.
    pub fn search<S: SearchModel, M: Model>(&self, model: &S) -> Result<Page<M>, DataError> {
        let result = self
            .engine
            .find(model, self.repository.query::<S::Entity>())?;
        let content = self
            .projector
            .project_and_collect::<S::View, M>(result.query)?;
        Ok(Page::new(content, &result.pagination, result.count))
    }

    /// The entities matching `filter`, projected lazily when a mapping allows.
    pub fn query<E: Entity, M: Model>(&self, filter: Option<Expr>) -> Result<Query<'c, M>, DataError> {
        self.projector.project::<E, M>(self.filtered::<E>(filter))
    }

    fn filtered<E: Entity>(&self, filter: Option<Expr>) -> Query<'c, E> {
        match filter {
            Some(predicate) => self.repository.query::<E>().filter(predicate),
            None => self.repository.query::<E>(),
        }
    }

    // ── writes ──────────────────────────────────────────────────────────

    /// Copy `model` into a new `E`, add and commit it. Returns the new key.
    pub fn add<E: Entity, M: Model>(&self, model: &M) -> Result<i64, DataError> {
        let entity: E = self.projector.copy_model(model)?;
        let key = self.repository.add(&entity)?;
        self.repository.commit()?;
        Ok(key)
    }

    pub fn add_range<E: Entity, M: Model>(&self, models: &[M]) -> Result<Vec<i64>, DataError> {
        let mut keys = Vec::with_capacity(models.len());
        for model in models {
            let entity: E = self.projector.copy_model(model)?;
            keys.push(self.repository.add(&entity)?);
        }
        self.repository.commit()?;
        Ok(keys)
    }

    /// Copy `model` onto the stored entity with the same key and commit.
    pub fn update<E: Entity, M: Model + Identified>(&self, model: &M) -> Result<(), DataError> {
        self.update_with::<E, M>(model, |_| {})
    }

    /// Like [`update`](Self::update), letting `modify` adjust the entity
    /// after the copy.
    pub fn update_with<E: Entity, M: Model + Identified>(
        &self,
        model: &M,
        modify: impl FnOnce(&mut E),
    ) -> Result<(), DataError> {
        self.stage_update::<E, M>(model, modify)?;
        self.repository.commit()?;
        Ok(())
    }

    pub fn update_range<E: Entity, M: Model + Identified>(
        &self,
        models: &[M],
    ) -> Result<(), DataError> {
        for model in models {
            self.stage_update::<E, M>(model, |_| {})?;
        }
        self.repository.commit()?;
        Ok(())
    }

    fn stage_update<E: Entity, M: Model + Identified>(
        &self,
        model: &M,
        modify: impl FnOnce(&mut E),
    ) -> Result<(), DataError> {
        let mut entity = self.require::<E>(model.key())?;
        self.projector.copy_into_model(model, &mut entity)?;
        modify(&mut entity);
        self.repository.update(&entity)
    }

    pub fn update_field<E: Entity, V: Into<Value>>(
        &self,
        key: i64,
        field: Field<E, V>,
        value: impl Into<V>,
    ) -> Result<(), DataError> {
        self.repository.update_field(key, field, value)?;
        self.repository.commit()?;
        Ok(())
    }

    pub fn update_field_named<E: Entity>(
        &self,
        key: i64,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), DataError> {
        self.repository.update_field_named::<E>(key, name, value)?;
        self.repository.commit()?;
        Ok(())
    }

    pub fn update_field_by<E: Entity, V: Into<Value> + Clone>(
        &self,
        predicate: Expr,
        field: Field<E, V>,
        value: impl Into<V>,
    ) -> Result<u64, DataError> {
        let updated = self.repository.update_field_by(predicate, field, value)?;
        self.repository.commit()?;
        Ok(updated)
    }

    pub fn delete<E: Entity>(&self, key: i64) -> Result<bool, DataError> {
        let removed = self.repository.remove::<E>(key)?;
        self.repository.commit()?;
        Ok(removed)
    }

    pub fn delete_by<E: Entity>(&self, predicate: Expr) -> Result<bool, DataError> {
        let removed = self.repository.remove_by::<E>(predicate)?;
        self.repository.commit()?;
        Ok(removed)
    }

    pub fn delete_entity<E: Entity>(&self, entity: &E) -> Result<bool, DataError> {
        let removed = self.repository.remove_entity(entity)?;
        self.repository.commit()?;
        Ok(removed)
    }

    pub fn delete_range<E: Entity>(&self, entities: &[E]) -> Result<u64, DataError> {
        let removed = self.repository.remove_range(entities)?;
        self.repository.commit()?;
        Ok(removed)
    }

    pub fn delete_range_by<E: Entity>(&self, predicate: Expr) -> Result<u64, DataError> {
        let removed = self.repository.remove_range_by::<E>(predicate)?;
        self.repository.commit()?;
        Ok(removed)
    }

    // ── synchronization ─────────────────────────────────────────────────

    /// Copy the `F` with `key` onto the `T` with the same key, without
    /// committing. With `reload`, `F` is re-read from the store first and
    /// its pending changes are discarded.
    pub fn sync<F: Entity, T: Entity>(&self, key: i64, reload: bool) -> Result<(), DataError> {
        let source = match reload {
            true => self.repository.reload_by_id::<F>(key)?,
            false => self.repository.find::<F>(key)?,
        };
        let source = source.ok_or_else(|| not_found::<F>(key))?;
        let mut target = self.require::<T>(key)?;
        self.projector.copy_into_model(&source, &mut target)?;
        tracing::debug!(
            key,
            from = F::TABLE.name,
            to = T::TABLE.name,
            reload,
            "Entity synchronized"
        );
        self.repository.update(&target)
    }

    pub fn sync_list<F: Entity, T: Entity>(&self, keys: &[i64], reload: bool) -> Result<(), DataError> {
        for key in keys {
            self.sync::<F, T>(*key, reload)?;
        }
        Ok(())
    }

    pub fn sync_and_save<F: Entity, T: Entity>(&self, key: i64, reload: bool) -> Result<(), DataError> {
        self.sync::<F, T>(key, reload)?;
        self.repository.commit()?;
        Ok(())
    }

    pub fn sync_list_and_save<F: Entity, T: Entity>(
        &self,
        keys: &[i64],
        reload: bool,
    ) -> Result<(), DataError> {
        self.sync_list::<F, T>(keys, reload)?;
        self.repository.commit()?;
        Ok(())
    }

    fn require<E: Entity>(&self, key: i64) -> Result<E, DataError> {
        self.repository
            .find::<E>(key)?
            .ok_or_else(|| not_found::<E>(key))
    }
}

fn not_found<E: Entity>(key: i64) -> DataError {
    DataError::NotFound(format!("{} with key {key}", E::TABLE.name))
}
