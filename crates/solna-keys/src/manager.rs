#![forbid(unsafe_code)]

//! Keys manager with named key store.

use crate::key::Key;
use crate::keyreq::KeyReq;

/// Maps names to keys during KeyInfo processing. Shared by reference and
/// treated as read-only while a read or write is in flight.
pub struct KeysManager {
    keys: Vec<Key>,
}

impl KeysManager {
    /// Create an empty keys manager.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Add a key to the manager.
    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    /// Find a key by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Key> {
        self.keys.iter().find(|k| k.name() == Some(name))
    }

    /// Find a key by name that also satisfies the caller's requirement,
    /// returning an owned copy.
    pub fn find_key(&self, name: &str, key_req: &KeyReq) -> Option<Key> {
        self.keys
            .iter()
            .find(|k| k.name() == Some(name) && key_req.match_key(k))
            .cloned()
    }

    /// Iterator over all keys.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Default for KeysManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyData, KeyDataType, KeyUsage};
    use crate::registry::KeyDataId;
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

    fn named_key(name: &str, len: usize) -> Key {
        let mut key = Key::with_value(Box::new(SymKey(vec![0; len])), KeyUsage::ANY);
        key.set_name(name);
        key
    }

    #[test]
    fn test_find_by_name() {
        let mut mngr = KeysManager::new();
        mngr.add_key(named_key("alice", 16));
        mngr.add_key(named_key("bob", 32));
        assert_eq!(mngr.find_by_name("bob").unwrap().name(), Some("bob"));
        assert!(mngr.find_by_name("carol").is_none());
    }

    #[test]
    fn test_find_key_honors_requirement() {
        let mut mngr = KeysManager::new();
        mngr.add_key(named_key("alice", 16));

        let mut req = KeyReq::new();
        assert!(mngr.find_key("alice", &req).is_some());

        req.bits = 256;
        assert!(mngr.find_key("alice", &req).is_none());
    }
}
