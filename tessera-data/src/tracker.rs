use indexmap::IndexMap;

use crate::entity::Table;
use crate::error::DataError;
use crate::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub table: Table,
    pub key: i64,
    pub state: EntryState,
    pub record: Record,
}

/// Identity map of rows seen or changed through a context.
///
/// Backends keep one and flush its pending entries in `save_changes`.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    entries: IndexMap<(&'static str, i64), Entry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &Table, key: i64) -> Option<&Entry> {
        self.entries.get(&(table.name, key))
    }

    /// Start tracking a row read from the store, unless it is already tracked.
    pub fn attach(&mut self, table: &Table, key: i64, record: Record) -> &Entry {
        self.entries.entry((table.name, key)).or_insert(Entry {
            table: *table,
            key,
            state: EntryState::Unchanged,
            record,
        })
    }

    pub fn add(&mut self, table: &Table, key: i64, record: Record) -> Result<(), DataError> {
        match self.entries.get(&(table.name, key)) {
            Some(entry) if entry.state != EntryState::Deleted => {
                Err(DataError::PersistValidationFailed(vec![
                    crate::error::ValidationFailure::new(
                        table.name,
                        Some(table.key),
                        format!("key {key} is already tracked"),
                    ),
                ]))
            }
            Some(_) => {
                // re-adding a deleted row replaces it
                self.set(table, key, EntryState::Modified, record);
                Ok(())
            }
            None => {
                self.set(table, key, EntryState::Added, record);
                Ok(())
            }
        }
    }

    /// Replace the tracked row. Rows added in this unit of work stay added.
    pub fn modify(&mut self, table: &Table, key: i64, record: Record) -> Result<(), DataError> {
        let state = match self.entries.get(&(table.name, key)).map(|e| e.state) {
            Some(EntryState::Deleted) => return Err(deleted(table, key)),
            Some(EntryState::Added) => EntryState::Added,
            _ => EntryState::Modified,
        };
        self.set(table, key, state, record);
        Ok(())
    }

    /// Merge `changes` into the tracked row, or into `base` when untracked.
    pub fn update_fields(
        &mut self,
        table: &Table,
        key: i64,
        base: Option<Record>,
        changes: &Record,
    ) -> Result<(), DataError> {
        let (state, mut record) = match self.entries.get(&(table.name, key)) {
            Some(entry) if entry.state == EntryState::Deleted => return Err(deleted(table, key)),
            Some(entry) if entry.state == EntryState::Added => {
                (EntryState::Added, entry.record.clone())
            }
            Some(entry) => (EntryState::Modified, entry.record.clone()),
            None => match base {
                Some(base) => (EntryState::Modified, base),
                None => {
                    return Err(DataError::NotFound(format!("{} with key {key}", table.name)));
                }
            },
        };
        record.merge(changes);
        self.set(table, key, state, record);
        Ok(())
    }

    pub fn delete(&mut self, table: &Table, key: i64, base: Option<Record>) {
        match self.entries.get(&(table.name, key)).map(|e| e.state) {
            Some(EntryState::Added) => {
                self.entries.shift_remove(&(table.name, key));
            }
            Some(_) => {
                if let Some(entry) = self.entries.get_mut(&(table.name, key)) {
                    entry.state = EntryState::Deleted;
                }
            }
            None => {
                if let Some(record) = base {
                    self.set(table, key, EntryState::Deleted, record);
                }
            }
        }
    }

    /// Stop tracking a row.
    pub fn detach(&mut self, table: &Table, key: i64) {
        self.entries.shift_remove(&(table.name, key));
    }

    /// Entries with unsaved changes, in the order they were first tracked.
    pub fn pending(&self) -> impl Iterator<Item = &Entry> {
        self.entries
            .values()
            .filter(|entry| entry.state != EntryState::Unchanged)
    }

    pub fn has_changes(&self) -> bool {
        self.pending().next().is_some()
    }

    /// Highest key tracked for a table, saved or not.
    pub fn max_key(&self, table: &Table) -> Option<i64> {
        self.entries
            .keys()
            .filter(|(name, _)| *name == table.name)
            .map(|(_, key)| *key)
            .max()
    }

    /// Mark every pending change as saved.
    pub fn accept_all(&mut self) {
        self.entries
            .retain(|_, entry| entry.state != EntryState::Deleted);
        for entry in self.entries.values_mut() {
            entry.state = EntryState::Unchanged;
        }
    }

    fn set(&mut self, table: &Table, key: i64, state: EntryState, record: Record) {
        self.entries.insert(
            (table.name, key),
            Entry {
                table: *table,
                key,
                state,
                record,
            },
        );
    }
}

fn deleted(table: &Table, key: i64) -> DataError {
    DataError::NotFound(format!("{} with key {key} is marked for deletion", table.name))
}
