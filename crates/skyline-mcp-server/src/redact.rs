//! Secret redaction for outgoing text.
//!
//! Every secret literal pulled from profile configs is registered here
//! before the first upstream request, and every response body, error
//! message, and log line passes through [`Redactor::redact`] before leaving
//! the process.

use parking_lot::RwLock;

const MASK: &str = "[REDACTED]";

/// Too-short strings make useless secrets and would mangle ordinary text.
const MIN_SECRET_LEN: usize = 4;

#[derive(Default)]
pub struct Redactor {
    secrets: RwLock<Vec<String>>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret literal. Duplicates and trivially short values are
    /// ignored.
    pub fn register(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return;
        }
        let mut secrets = self.secrets.write();
        if !secrets.contains(&secret) {
            secrets.push(secret);
            // Longest first so an overlapping shorter secret cannot split a
            // longer one into recognisable halves.
            secrets.sort_by(|a, b| b.len().cmp(&a.len()));
        }
    }

    pub fn register_all<I, S>(&self, secrets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for secret in secrets {
            self.register(secret);
        }
    }

    /// Replace every registered secret in the text with a mask.
    ///
    /// Idempotent: the mask contains no registered secret, so redacting an
    /// already-redacted string changes nothing.
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.secrets.read();
        let mut out = text.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), MASK);
            }
        }
        out
    }
}
