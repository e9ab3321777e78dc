use super::ConfigError;

/// Backend that turns a `${...}` reference into its secret value.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Resolves `${VAR}`, `${env:VAR}` and `${file:/path}` references.
///
/// A `:-` suffix supplies a fallback used when the variable is unset,
/// e.g. `${DATABASE_URL:-sqlite::memory:}`.
pub struct DefaultSecretResolver;

impl SecretResolver for DefaultSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if let Some(path) = reference.strip_prefix("file:") {
            let path = path.trim();
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::Load(format!("Secret file '{path}': {e}")));
        }
        let var = reference.strip_prefix("env:").unwrap_or(reference);
        let (name, fallback) = match var.split_once(":-") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (var.trim(), None),
        };
        match (std::env::var(name), fallback) {
            (Ok(value), _) => Ok(value),
            (Err(_), Some(fallback)) => Ok(fallback.to_string()),
            (Err(_), None) => Err(ConfigError::NotFound(name.to_string())),
        }
    }
}

/// Replace every `${...}` placeholder in `value` using `resolver`.
pub fn resolve_placeholders(
    value: &str,
    resolver: &dyn SecretResolver,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let len = rest[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("Unclosed placeholder in: {value}")))?;
        out.push_str(&rest[..start]);
        out.push_str(&resolver.resolve(&rest[start + 2..start + len])?);
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_value_untouched() {
        let result = resolve_placeholders("sqlite::memory:", &DefaultSecretResolver).unwrap();
        assert_eq!(result, "sqlite::memory:");
    }

    #[test]
    fn test_fallback_used_when_unset() {
        let result = resolve_placeholders(
            "${TESSERA_SECRETS_SURELY_UNSET:-sqlite::memory:}",
            &DefaultSecretResolver,
        )
        .unwrap();
        assert_eq!(result, "sqlite::memory:");
    }

    #[test]
    fn test_unset_without_fallback_is_not_found() {
        let err = resolve_placeholders("${TESSERA_SECRETS_SURELY_UNSET}", &DefaultSecretResolver)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(name) if name == "TESSERA_SECRETS_SURELY_UNSET"));
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert!(resolve_placeholders("${UNCLOSED", &DefaultSecretResolver).is_err());
    }

    #[test]
    fn test_file_reference_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db-url");
        std::fs::write(&path, "sqlite://orders.db\n").unwrap();

        let reference = format!("prefix-${{file:{}}}", path.display());
        let result = resolve_placeholders(&reference, &DefaultSecretResolver).unwrap();
        assert_eq!(result, "prefix-sqlite://orders.db");
    }
}
