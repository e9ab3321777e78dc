use std::any::TypeId;
use std::collections::HashMap;

use crate::error::DataError;
use crate::mapping::TypePair;
use crate::record::Record;

/// Copies field values between records of two types.
///
/// Used by the projector when no mapping is registered for a pair, and by
/// the service to synchronize two entities sharing a key.
pub trait ObjectCopier: Send + Sync {
    /// Build a target record from a source record.
    fn copy(&self, pair: &TypePair, source: &Record) -> Result<Record, DataError>;

    /// Overwrite the fields of `target` with the matching source fields.
    fn copy_into(&self, pair: &TypePair, source: &Record, target: &mut Record)
        -> Result<(), DataError>;
}

#[derive(Debug, Clone, Default)]
struct PairRules {
    renames: Vec<(String, String)>,
    ignored: Vec<String>,
}

impl PairRules {
    fn target_name<'a>(&'a self, source_name: &'a str) -> Option<&'a str> {
        if self.ignored.iter().any(|i| i == source_name) {
            return None;
        }
        Some(
            self.renames
                .iter()
                .find(|(from, _)| from == source_name)
                .map_or(source_name, |(_, to)| to.as_str()),
        )
    }
}

/// Name-matching copier: each source field lands in the target field of
/// the same name, unless renamed or ignored for the pair.
#[derive(Debug, Clone, Default)]
pub struct FieldCopier {
    rules: HashMap<(TypeId, TypeId), PairRules>,
}

impl FieldCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy source field `from` into target field `to` for `S -> T`.
    pub fn rename<S: 'static, T: 'static>(mut self, from: &str, to: &str) -> Self {
        self.rules_mut::<S, T>()
            .renames
            .push((from.to_string(), to.to_string()));
        self
    }

    /// Never copy source field `field` for `S -> T`.
    pub fn ignore<S: 'static, T: 'static>(mut self, field: &str) -> Self {
        self.rules_mut::<S, T>().ignored.push(field.to_string());
        self
    }

    fn rules_mut<S: 'static, T: 'static>(&mut self) -> &mut PairRules {
        self.rules
            .entry((TypeId::of::<S>(), TypeId::of::<T>()))
            .or_default()
    }

    fn rules(&self, pair: &TypePair) -> Option<&PairRules> {
        self.rules.get(&pair.ids())
    }
}

impl ObjectCopier for FieldCopier {
    fn copy(&self, pair: &TypePair, source: &Record) -> Result<Record, DataError> {
        let default = PairRules::default();
        let rules = self.rules(pair).unwrap_or(&default);
        let mut out = Record::new();
        for (name, value) in source.iter() {
            if let Some(target) = rules.target_name(name) {
                out.insert(target, value.clone());
            }
        }
        Ok(out)
    }

    fn copy_into(
        &self,
        pair: &TypePair,
        source: &Record,
        target: &mut Record,
    ) -> Result<(), DataError> {
        let default = PairRules::default();
        let rules = self.rules(pair).unwrap_or(&default);
        for (name, value) in source.iter() {
            match rules.target_name(name) {
                Some(field) if target.contains(field) => target.insert(field, value.clone()),
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Src;
    struct Dst;

    fn source() -> Record {
        Record::new()
            .with("id", 7_i64)
            .with("title", "Dune")
            .with("secret", "x")
    }

    #[test]
    fn test_copy_by_name() {
        let copier = FieldCopier::new();
        let out = copier.copy(&TypePair::of::<Src, Dst>(), &source()).unwrap();
        assert_eq!(out, source());
    }

    #[test]
    fn test_copy_with_rename_and_ignore() {
        let copier = FieldCopier::new()
            .rename::<Src, Dst>("title", "name")
            .ignore::<Src, Dst>("secret");
        let out = copier.copy(&TypePair::of::<Src, Dst>(), &source()).unwrap();
        assert_eq!(out, Record::new().with("id", 7_i64).with("name", "Dune"));

        // rules are per ordered pair
        let reverse = copier.copy(&TypePair::of::<Dst, Src>(), &source()).unwrap();
        assert!(reverse.contains("secret"));
    }

    #[test]
    fn test_copy_into_only_touches_target_fields() {
        let copier = FieldCopier::new();
        let mut target = Record::new().with("id", 7_i64).with("title", "old");
        copier
            .copy_into(&TypePair::of::<Src, Dst>(), &source(), &mut target)
            .unwrap();
        assert_eq!(target, Record::new().with("id", 7_i64).with("title", "Dune"));
    }
}
