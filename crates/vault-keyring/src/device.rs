//! Identity of the machine the key is bound to.

use sha2::{Digest, Sha256};

/// Stable identifier of the current device and user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Host name plus the login user.
    pub fn current() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown-user".to_string());
        Self::new(format!("{user}@{host}"))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// SHA-256 of the identifier, used as the HKDF salt.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.id.as_bytes()).into()
    }

    /// Short public tag stored next to the key so a copied entry is detected.
    pub fn tag(&self) -> String {
        hex::encode(&self.digest()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_stable_and_short() {
        let a = DeviceIdentity::new("alice@laptop");
        assert_eq!(a.tag(), DeviceIdentity::new("alice@laptop").tag());
        assert_eq!(a.tag().len(), 16);
        assert_ne!(a.tag(), DeviceIdentity::new("alice@desktop").tag());
    }

    #[test]
    fn test_current_is_not_empty() {
        assert!(DeviceIdentity::current().id().contains('@'));
    }
}
