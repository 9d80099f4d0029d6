//! Small helpers shared across the crate.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use rand::Rng;

/// Number of random bytes in a generated key; hex-encoded this yields a
/// 32-character string.
const KEY_BYTES: usize = 16;

/// Characters stripped from both ends of a key before use.
pub const KEY_TRIM_CHARS: &[char] = &[' ', '\t', '\r', '\n'];

/// Generates a fresh random access key as 32 lowercase hex characters.
#[must_use]
pub fn generate_key() -> String {
    let bytes: [u8; KEY_BYTES] = rand::rng().random();
    hex::encode(bytes)
}

/// Normalizes a raw key: trims surrounding whitespace and lower-cases it.
#[must_use]
pub fn normalize_key(raw: &str) -> String {
    raw.trim_matches(KEY_TRIM_CHARS).to_lowercase()
}

/// Masks a key for log output, keeping only the first and last three
/// characters. Short keys are fully masked so nothing useful leaks.
#[must_use]
pub fn anonymize_key(key: &str) -> String {
    if key.len() <= 9 {
        return "*".repeat(key.len());
    }
    let stars = "*".repeat(key.len() - 6);
    format!("{}{}{}", &key[..3], stars, &key[key.len() - 3..])
}

/// An order-preserving, deduplicating collection of normalized keys.
#[derive(Debug, Default, Clone)]
pub struct KeysQueue {
    keys: Vec<String>,
}

impl KeysQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key after normalization; empty and already-present keys are
    /// ignored. Returns whether the key was actually inserted.
    pub fn add(&mut self, raw: &str) -> bool {
        let key = normalize_key(raw);
        if key.is_empty() || self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    #[must_use]
    pub fn contains(&self, raw: &str) -> bool {
        self.keys.contains(&normalize_key(raw))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.keys
    }
}

/// A shared per-name call counter that can be wiped in one go.
#[derive(Debug, Default)]
pub struct CallCounter {
    counts: RwLock<HashMap<String, u64>>,
}

impl CallCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter for `name` and returns its value after the bump.
    pub fn increment_returning_current(&self, name: &str) -> u64 {
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = counts.entry(name.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Drops every counter, starting a fresh accounting period.
    pub fn clear(&self) {
        self.counts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
