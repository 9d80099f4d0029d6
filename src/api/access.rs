//! Pre-provisioned access keys loaded from the config. These bypass the
//! database on the hot path and are attributed by alias in the metrics.

use std::collections::HashMap;

use anyhow::{Result, bail};

use crate::common::{KeysQueue, normalize_key};
use crate::config::AccessKeyEntry;
use crate::metrics::ALL_ALIASES;

pub struct StaticKeys {
    aliases_by_key: HashMap<String, String>,
}

impl StaticKeys {
    pub fn new(entries: &[AccessKeyEntry]) -> Result<Self> {
        let mut queue = KeysQueue::new();
        let mut aliases_by_key = HashMap::with_capacity(entries.len());
        let mut seen_aliases: Vec<String> = Vec::with_capacity(entries.len());

        for entry in entries {
            let key = normalize_key(&entry.key);
            if key.is_empty() {
                bail!("Static access key cannot be empty");
            }

            let alias = entry.alias.trim();
            if alias.is_empty() {
                bail!("Static access key '{}' has an empty alias", key);
            }
            if alias.eq_ignore_ascii_case(ALL_ALIASES) {
                bail!("Alias '{}' is reserved for the aggregate counter", alias);
            }

            let alias_lower = alias.to_lowercase();
            if seen_aliases.contains(&alias_lower) {
                bail!("Alias '{}' is used by more than one key", alias);
            }

            if !queue.add(&key) {
                bail!("Static access key '{}' appears more than once", key);
            }

            seen_aliases.push(alias_lower);
            aliases_by_key.insert(key, alias.to_string());
        }

        Ok(Self { aliases_by_key })
    }

    /// Looks up the alias for an already-normalized key.
    #[must_use]
    pub fn alias_for(&self, key: &str) -> Option<&str> {
        self.aliases_by_key.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases_by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases_by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, alias: &str) -> AccessKeyEntry {
        AccessKeyEntry {
            key: key.to_string(),
            alias: alias.to_string(),
        }
    }

    #[test]
    fn keys_are_normalized_on_load() {
        let keys = StaticKeys::new(&[entry("  ABCdef  ", "partner")]).unwrap();
        assert_eq!(keys.alias_for("abcdef"), Some("partner"));
        assert_eq!(keys.alias_for("other"), None);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn rejects_duplicate_keys_after_normalization() {
        let result = StaticKeys::new(&[entry("abc", "one"), entry(" ABC ", "two")]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_aliases_case_insensitively() {
        let result = StaticKeys::new(&[entry("abc", "Partner"), entry("def", "partner")]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_the_reserved_aggregate_alias() {
        assert!(StaticKeys::new(&[entry("abc", "ALL")]).is_err());
        assert!(StaticKeys::new(&[entry("abc", "all")]).is_err());
    }

    #[test]
    fn rejects_empty_keys_and_aliases() {
        assert!(StaticKeys::new(&[entry("  ", "partner")]).is_err());
        assert!(StaticKeys::new(&[entry("abc", "  ")]).is_err());
    }

    #[test]
    fn empty_table_is_fine() {
        let keys = StaticKeys::new(&[]).unwrap();
        assert!(keys.is_empty());
    }
}
