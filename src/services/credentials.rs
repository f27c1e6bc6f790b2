use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("All {0} API keys have been exhausted")]
    Exhausted(usize),
}

/// Ordered API keys consumed strictly forward.
///
/// The cursor points at the key in use. Advancing past the last key leaves the
/// rotator exhausted for the rest of the run; keys are never retried.
#[derive(Debug, Clone)]
pub struct CredentialRotator {
    keys: Vec<String>,
    cursor: usize,
}

impl CredentialRotator {
    pub fn new(keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys, cursor: 0 }
    }

    /// Parse whitespace-separated keys, the format used in the settings file.
    pub fn from_whitespace_list(raw: &str) -> Self {
        Self::new(raw.split_whitespace().map(str::to_string).collect())
    }

    pub fn current(&self) -> Result<&str, CredentialError> {
        self.keys
            .get(self.cursor)
            .map(String::as_str)
            .ok_or(CredentialError::Exhausted(self.keys.len()))
    }

    /// Move to the next key.
    pub fn advance(&mut self) -> Result<&str, CredentialError> {
        if self.cursor < self.keys.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.keys.len()
    }

    /// 1-based position of the active key, for log lines.
    pub fn position(&self) -> usize {
        self.cursor + 1
    }

    pub fn remaining(&self) -> usize {
        self.keys.len().saturating_sub(self.cursor)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
