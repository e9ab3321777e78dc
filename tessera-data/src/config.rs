use tessera_core::{ConfigError, ConfigValue, FromConfigValue, TesseraConfig};

use crate::mapping::DuplicatePolicy;
use crate::repository::CommitPolicy;
use crate::search::DEFAULT_TAKE;
use crate::sql::Dialect;

/// Data-layer settings, read from `tessera.data.*`.
///
/// ```yaml
/// tessera:
///   data:
///     commit:
///       policy: suppress
///     mappings:
///       duplicates: reject
///     search:
///       take: 50
///     sql:
///       dialect: postgres
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    pub commit_policy: CommitPolicy,
    pub duplicates: DuplicatePolicy,
    pub default_take: u64,
    pub dialect: Dialect,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            commit_policy: CommitPolicy::default(),
            duplicates: DuplicatePolicy::default(),
            default_take: DEFAULT_TAKE,
            dialect: Dialect::default(),
        }
    }
}

impl DataConfig {
    pub fn from_config(config: &TesseraConfig) -> Result<Self, ConfigError> {
        let default_take = config
            .get_opt::<u64>("tessera.data.search.take")?
            .unwrap_or(DEFAULT_TAKE);
        if default_take == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tessera.data.search.take".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(DataConfig {
            commit_policy: config
                .get_opt("tessera.data.commit.policy")?
                .unwrap_or_default(),
            duplicates: config
                .get_opt("tessera.data.mappings.duplicates")?
                .unwrap_or_default(),
            default_take,
            dialect: config.get_opt("tessera.data.sql.dialect")?.unwrap_or_default(),
        })
    }
}

fn choice<T: Copy>(
    value: &ConfigValue,
    key: &str,
    options: &[(&str, T)],
) -> Result<T, ConfigError> {
    let raw = String::from_config_value(value, key)?;
    options
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&raw))
        .map(|(_, choice)| *choice)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!(
                "unknown value `{raw}` (expected one of {})",
                options
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
}

impl FromConfigValue for CommitPolicy {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        choice(
            value,
            key,
            &[
                ("surface", CommitPolicy::Surface),
                ("suppress", CommitPolicy::Suppress),
            ],
        )
    }
}

impl FromConfigValue for DuplicatePolicy {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        choice(
            value,
            key,
            &[
                ("allow", DuplicatePolicy::Allow),
                ("warn", DuplicatePolicy::Warn),
                ("reject", DuplicatePolicy::Reject),
            ],
        )
    }
}

impl FromConfigValue for Dialect {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        choice(
            value,
            key,
            &[
                ("generic", Dialect::Generic),
                ("sqlite", Dialect::Sqlite),
                ("postgres", Dialect::Postgres),
                ("mysql", Dialect::MySql),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_absent() {
        let config = DataConfig::from_config(&TesseraConfig::empty()).unwrap();
        assert_eq!(config, DataConfig::default());
        assert_eq!(config.commit_policy, CommitPolicy::Surface);
        assert_eq!(config.duplicates, DuplicatePolicy::Warn);
    }

    #[test]
    fn test_reads_all_keys() {
        let yaml = r#"
tessera:
  data:
    commit:
      policy: Suppress
    mappings:
      duplicates: reject
    search:
      take: 50
    sql:
      dialect: postgres
"#;
        let config = DataConfig::from_config(&TesseraConfig::from_yaml_str(yaml, "test").unwrap())
            .unwrap();
        assert_eq!(config.commit_policy, CommitPolicy::Suppress);
        assert_eq!(config.duplicates, DuplicatePolicy::Reject);
        assert_eq!(config.default_take, 50);
        assert_eq!(config.dialect, Dialect::Postgres);

        let registry = crate::MappingRegistry::from_config(&config);
        assert_eq!(registry.policy(), DuplicatePolicy::Reject);
        let ctx = crate::MemoryContext::from_config(&config);
        assert_eq!(crate::PersistenceContext::dialect(&ctx), Dialect::Postgres);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let mut raw = TesseraConfig::empty();
        raw.set("tessera.data.commit.policy", ConfigValue::String("ignore".into()));
        let err = DataConfig::from_config(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_zero_take() {
        let mut raw = TesseraConfig::empty();
        raw.set("tessera.data.search.take", ConfigValue::Integer(0));
        assert!(DataConfig::from_config(&raw).is_err());
    }
}
