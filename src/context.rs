use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::Config;
use crate::error::ConfigError;

/// The protected-recipient mapping loaded from `recipients.yml`.
///
/// Keys are canonical (lowercase) `local@domain` addresses. A `Some(sasl)`
/// value pins the expected SASL identity for commands addressed to that
/// recipient; `None` means SASL enforcement, if configured globally, still
/// applies but there is no specific identity to compare against (the
/// comparison then always fails, since an absent expectation can never be
/// satisfied by a present username).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipientRegistry {
    #[serde(flatten)]
    entries: HashMap<String, Option<String>>,
}

impl RecipientRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let parsed: RecipientRegistry =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let entries = parsed
            .entries
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v.map(|s| s.to_lowercase())))
            .collect();
        Ok(RecipientRegistry { entries })
    }

    /// Whether `address` (already lowercased) is in the registry.
    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// The expected SASL identity for `address`, if any is configured.
    pub fn expected_sasl(&self, address: &str) -> Option<&str> {
        self.entries.get(address)?.as_deref()
    }

    #[cfg(test)]
    pub fn from_map(entries: HashMap<String, Option<String>>) -> Self {
        RecipientRegistry { entries }
    }
}

/// The three reply-mail template bodies parsed from `messages.yml`.
///
/// Each template is plain text containing `%{placeholder}` tokens resolved
/// by straight substring replacement at render time (see `command.rs`); the
/// format is deliberately inert, it has no code-execution surface.
#[derive(Debug, Clone, Deserialize)]
pub struct Messages {
    pub info: String,
    pub allow_advisory: String,
    pub deny_advisory: String,
    #[serde(default)]
    pub footer: String,
}

impl Messages {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// The immutable bundle every connection handler shares a reference to.
///
/// Built once at startup from `config.yml`, `messages.yml` and
/// `recipients.yml`; never mutated afterwards. This replaces the "global
/// registries and templates initialized once" pattern with a single value
/// threaded explicitly through the parser, decision engine and command
/// executor, so none of them touch process-wide state.
pub struct RuntimeContext {
    pub config: Config,
    pub messages: Messages,
    pub recipients: RecipientRegistry,
}

impl RuntimeContext {
    pub fn load(config_dir: &Path) -> Result<Arc<Self>, ConfigError> {
        let config = Config::load(&config_dir.join("config.yml"))?;
        let messages = Messages::load(&config_dir.join("messages.yml"))?;
        let recipients = RecipientRegistry::load(&config_dir.join("recipients.yml"))?;
        Ok(Arc::new(RuntimeContext {
            config,
            messages,
            recipients,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookups_are_case_sensitive_on_the_stored_key() {
        let mut map = HashMap::new();
        map.insert("hitchhike@dent.tld".to_string(), Some("hitchhike".to_string()));
        let registry = RecipientRegistry::from_map(map);
        assert!(registry.contains("hitchhike@dent.tld"));
        assert!(!registry.contains("HITCHHIKE@dent.tld"));
        assert_eq!(registry.expected_sasl("hitchhike@dent.tld"), Some("hitchhike"));
    }

    #[test]
    fn registry_entry_without_sasl_identity() {
        let mut map = HashMap::new();
        map.insert("hitchhike@dent.tld".to_string(), None);
        let registry = RecipientRegistry::from_map(map);
        assert!(registry.contains("hitchhike@dent.tld"));
        assert_eq!(registry.expected_sasl("hitchhike@dent.tld"), None);
    }
}
