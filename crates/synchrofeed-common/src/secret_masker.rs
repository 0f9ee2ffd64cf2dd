// SecretMasker: a thread-safe store of secret values (AWS secret key, proxy
// passwords) that are scrubbed from every trace line.

use parking_lot::RwLock;
use std::sync::Arc;

/// Replacement text used when a secret is found.
const MASK: &str = "***";

/// Secrets shorter than this are not registered; masking them would shred
/// ordinary log text.
const MIN_SECRET_LENGTH: usize = 4;

/// Replaces registered secret values in arbitrary strings with `***`.
///
/// Cloning is cheap and every clone shares the same secret set.
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl SecretMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Blank, too-short and duplicate values are ignored.
    pub fn add_value(&self, secret: &str) {
        let trimmed = secret.trim();
        if trimmed.len() < MIN_SECRET_LENGTH {
            return;
        }

        let mut secrets = self.secrets.write();
        if secrets.iter().any(|s| s == trimmed) {
            return;
        }
        secrets.push(trimmed.to_string());
        // Longest first so a secret containing another is masked whole.
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
    }

    /// Return `input` with every registered secret replaced by `***`.
    pub fn mask_secrets(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        secrets.iter().fold(input.to_string(), |acc, secret| {
            if acc.contains(secret.as_str()) {
                acc.replace(secret.as_str(), MASK)
            } else {
                acc
            }
        })
    }

    /// Number of registered secrets.
    pub fn secret_count(&self) -> usize {
        self.secrets.read().len()
    }
}
