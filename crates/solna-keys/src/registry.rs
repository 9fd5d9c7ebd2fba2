#![forbid(unsafe_code)]

//! Key-data descriptors and the registries that dispatch KeyInfo children
//! to their handlers.
//!
//! Each recognized child element is described by a [`KeyDataDescriptor`]:
//! element identity, usage bits, an optional href (the `Type` attribute
//! value on `<RetrievalMethod>`), and the handler object. Lookup is by
//! `(name, namespace, usage)` or `(href, usage)`; usage matching requires
//! a non-empty intersection.

use crate::key::Key;
use crate::keyinfo::KeyInfoContext;
use solna_core::{Error, Result};
use solna_xml::NodeEdit;
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

/// Stable identity of a key-data descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDataId(pub &'static str);

impl std::fmt::Display for KeyDataId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

bitflags::bitflags! {
    /// Where a key-data descriptor may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyDataUsage: u32 {
        const KEY_INFO_NODE_READ = 1 << 0;
        const KEY_INFO_NODE_WRITE = 1 << 1;
        const KEY_VALUE_NODE_READ = 1 << 2;
        const KEY_VALUE_NODE_WRITE = 1 << 3;
        const RETRIEVAL_METHOD_NODE_XML = 1 << 4;
        const RETRIEVAL_METHOD_NODE_BIN = 1 << 5;
    }
}

impl KeyDataUsage {
    pub const KEY_INFO_NODE: KeyDataUsage = KeyDataUsage::KEY_INFO_NODE_READ
        .union(KeyDataUsage::KEY_INFO_NODE_WRITE);
    pub const KEY_VALUE_NODE: KeyDataUsage = KeyDataUsage::KEY_VALUE_NODE_READ
        .union(KeyDataUsage::KEY_VALUE_NODE_WRITE);
    pub const RETRIEVAL_METHOD_NODE: KeyDataUsage = KeyDataUsage::RETRIEVAL_METHOD_NODE_XML
        .union(KeyDataUsage::RETRIEVAL_METHOD_NODE_BIN);
    pub const ANY: KeyDataUsage = KeyDataUsage::all();
}

/// Result of a handler's write pass over its template node.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The handler produced an edit for its node.
    Wrote(NodeEdit),
    /// The handler ran and deliberately left the template alone.
    Unchanged,
    /// The handler had no data to write.
    Skipped,
}

/// Handler for one kind of KeyInfo child element.
pub trait KeyDataHandler: Send + Sync {
    /// Read the element and populate the key.
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()>;

    /// Write the key into the element template.
    fn xml_write(
        &self,
        key: &Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome>;

    /// Serialize the key's value as the body of this data type's element.
    /// Used by the `<KeyValue>` writer.
    fn xml_write_content(&self, _key: &Key, _ctx: &mut KeyInfoContext) -> Result<String> {
        Err(Error::Internal(
            "key data has no XML content writer".to_string(),
        ))
    }

    /// Populate the key from raw binary material.
    fn bin_read(
        &self,
        _key: &mut Key,
        _data: &[u8],
        _ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        Err(Error::Internal("key data has no binary reader".to_string()))
    }

    /// Serialize the key's value to raw binary material.
    fn bin_write(&self, _key: &Key, _ctx: &mut KeyInfoContext) -> Result<Zeroizing<Vec<u8>>> {
        Err(Error::Internal("key data has no binary writer".to_string()))
    }
}

/// Immutable description of one recognized KeyInfo child element.
#[derive(Clone)]
pub struct KeyDataDescriptor {
    pub id: KeyDataId,
    pub usage: KeyDataUsage,
    pub href: Option<&'static str>,
    pub node_name: &'static str,
    pub node_ns: &'static str,
    pub handler: Arc<dyn KeyDataHandler>,
}

impl std::fmt::Debug for KeyDataDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDataDescriptor")
            .field("id", &self.id)
            .field("usage", &self.usage)
            .field("node_name", &self.node_name)
            .field("node_ns", &self.node_ns)
            .finish()
    }
}

/// Ordered collection of key-data descriptors.
#[derive(Debug, Clone, Default)]
pub struct KeyDataList {
    items: Vec<KeyDataDescriptor>,
}

impl KeyDataList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, descriptor: KeyDataDescriptor) {
        self.items.push(descriptor);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyDataDescriptor> {
        self.items.iter()
    }

    pub fn contains(&self, id: KeyDataId) -> bool {
        self.items.iter().any(|d| d.id == id)
    }

    pub fn find_by_id(&self, id: KeyDataId) -> Option<&KeyDataDescriptor> {
        self.items.iter().find(|d| d.id == id)
    }

    /// Look up by element identity and usage.
    pub fn find_by_node(
        &self,
        name: &str,
        ns: &str,
        usage: KeyDataUsage,
    ) -> Option<&KeyDataDescriptor> {
        self.items.iter().find(|d| {
            d.node_name == name && d.node_ns == ns && d.usage.intersects(usage)
        })
    }

    /// Look up by href identifier and usage.
    pub fn find_by_href(&self, href: &str, usage: KeyDataUsage) -> Option<&KeyDataDescriptor> {
        self.items
            .iter()
            .find(|d| d.href == Some(href) && d.usage.intersects(usage))
    }
}

static GLOBAL_KEY_DATA: OnceLock<KeyDataList> = OnceLock::new();

/// The global registry of built-in key-data descriptors.
///
/// Contains the structural KeyInfo children only; per-algorithm key data
/// plugs in through a context's `enabled_key_data` list.
pub fn global_key_data() -> &'static KeyDataList {
    GLOBAL_KEY_DATA.get_or_init(|| {
        let mut list = KeyDataList::new();
        list.add(crate::keyinfo::key_name_descriptor());
        list.add(crate::keyinfo::key_value_descriptor());
        list.add(crate::keyinfo::retrieval_method_descriptor());
        list.add(crate::keyinfo::key_info_reference_descriptor());
        list.add(crate::keyinfo::encrypted_key_descriptor());
        list.add(crate::keyinfo::derived_key_descriptor());
        list.add(crate::keyinfo::agreement_method_descriptor());
        list
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solna_core::ns;

    #[test]
    fn test_global_registry_has_builtin_descriptors() {
        let list = global_key_data();
        assert_eq!(list.len(), 7);
        assert!(list.contains(KeyDataId("key-name")));
        assert!(list.contains(KeyDataId("enc-key")));
    }

    #[test]
    fn test_find_by_node_checks_namespace_and_usage() {
        let list = global_key_data();
        let found = list.find_by_node(
            ns::node::KEY_NAME,
            ns::DSIG,
            KeyDataUsage::KEY_INFO_NODE_READ,
        );
        assert!(found.is_some());

        // wrong namespace
        assert!(list
            .find_by_node(ns::node::KEY_NAME, ns::ENC, KeyDataUsage::KEY_INFO_NODE_READ)
            .is_none());

        // usage with no overlap
        assert!(list
            .find_by_node(
                ns::node::KEY_NAME,
                ns::DSIG,
                KeyDataUsage::RETRIEVAL_METHOD_NODE_BIN
            )
            .is_none());
    }

    #[test]
    fn test_find_by_href() {
        let list = global_key_data();
        let found = list.find_by_href(ns::href::ENCRYPTED_KEY, KeyDataUsage::RETRIEVAL_METHOD_NODE);
        assert_eq!(found.unwrap().id, KeyDataId("enc-key"));
        assert!(list
            .find_by_href("urn:nope", KeyDataUsage::RETRIEVAL_METHOD_NODE)
            .is_none());
    }
}
