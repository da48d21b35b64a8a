//! Raw key handed to SQLCipher and to value encryption.

use std::fmt;

/// 256-bit database key. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseKey([u8; 32]);

impl DatabaseKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Raw-key form for SQLCipher: `x'<hex>'`.
    pub(crate) fn pragma_literal(&self) -> String {
        format!("\"x'{}'\"", hex::encode(self.0))
    }
}

impl fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DatabaseKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pragma_literal() {
        let key = DatabaseKey::from_bytes([0xab; 32]);
        let literal = key.pragma_literal();
        assert!(literal.starts_with("\"x'abab"));
        assert!(literal.ends_with("'\""));
        assert_eq!(literal.len(), 64 + 5);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = DatabaseKey::from_bytes([1; 32]);
        assert!(!format!("{key:?}").contains("01"));
    }
}
