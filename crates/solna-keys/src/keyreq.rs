#![forbid(unsafe_code)]

//! Key requirements — the predicate used to select among candidate keys.

use crate::key::{Key, KeyDataType, KeyUsage};
use crate::registry::KeyDataId;

/// Requirements a candidate key must satisfy during a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyReq {
    /// Required key-data descriptor, if any. Also names the binary reader
    /// used to interpret decrypted `<EncryptedKey>` plaintext.
    pub key_id: Option<KeyDataId>,
    /// Acceptable kinds of key material.
    pub key_type: KeyDataType,
    /// Required usage overlap.
    pub usage: KeyUsage,
    /// Minimum key size in bits (0 = no minimum).
    pub bits: u32,
}

impl KeyReq {
    pub fn new() -> Self {
        Self {
            key_id: None,
            key_type: KeyDataType::ANY,
            usage: KeyUsage::ANY,
            bits: 0,
        }
    }

    /// Clear back to the default requirement (matches any valid key).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Check a key against this requirement.
    pub fn match_key(&self, key: &Key) -> bool {
        if !key.usage.intersects(self.usage) {
            return false;
        }
        let value = match key.value() {
            Some(v) => v,
            None => return false,
        };
        if let Some(id) = self.key_id {
            if value.data_id() != id {
                return false;
            }
        }
        if !self.key_type.intersects(value.key_type()) {
            return false;
        }
        if self.bits > 0 && value.bits_size() > 0 && value.bits_size() < self.bits {
            return false;
        }
        true
    }
}

impl Default for KeyReq {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyData;
    use std::any::Any;

    #[derive(Debug, Clone)]
    struct SymKey(Vec<u8>);

    impl KeyData for SymKey {
        fn data_id(&self) -> KeyDataId {
            KeyDataId("test-sym")
        }
        fn key_type(&self) -> KeyDataType {
            KeyDataType::SYMMETRIC
        }
        fn bits_size(&self) -> u32 {
            (self.0.len() * 8) as u32
        }
        fn boxed_clone(&self) -> Box<dyn KeyData> {
            Box::new(self.clone())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn sym_key(len: usize) -> Key {
        Key::with_value(Box::new(SymKey(vec![0; len])), KeyUsage::DECRYPT)
    }

    #[test]
    fn test_default_req_matches_any_valid_key() {
        let req = KeyReq::new();
        assert!(req.match_key(&sym_key(16)));
        assert!(!req.match_key(&Key::new()));
    }

    #[test]
    fn test_key_id_must_match() {
        let mut req = KeyReq::new();
        req.key_id = Some(KeyDataId("test-sym"));
        assert!(req.match_key(&sym_key(16)));
        req.key_id = Some(KeyDataId("other"));
        assert!(!req.match_key(&sym_key(16)));
    }

    #[test]
    fn test_key_type_must_intersect() {
        let mut req = KeyReq::new();
        req.key_type = KeyDataType::PUBLIC;
        assert!(!req.match_key(&sym_key(16)));
        req.key_type = KeyDataType::SYMMETRIC | KeyDataType::PUBLIC;
        assert!(req.match_key(&sym_key(16)));
    }

    #[test]
    fn test_minimum_bits() {
        let mut req = KeyReq::new();
        req.bits = 256;
        assert!(!req.match_key(&sym_key(16)));
        assert!(req.match_key(&sym_key(32)));
    }

    #[test]
    fn test_usage_must_intersect() {
        let mut req = KeyReq::new();
        req.usage = KeyUsage::SIGN;
        let mut key = sym_key(16);
        key.usage = KeyUsage::DECRYPT;
        assert!(!req.match_key(&key));
        key.usage = KeyUsage::SIGN | KeyUsage::DECRYPT;
        assert!(req.match_key(&key));
    }
}
