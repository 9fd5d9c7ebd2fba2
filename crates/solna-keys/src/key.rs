#![forbid(unsafe_code)]

//! Key aggregate and the key-data value trait.

use crate::registry::KeyDataId;
use std::any::Any;

bitflags::bitflags! {
    /// Intended usage of a key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyUsage: u32 {
        const SIGN = 1 << 0;
        const VERIFY = 1 << 1;
        const ENCRYPT = 1 << 2;
        const DECRYPT = 1 << 3;
        const KEY_EXCHANGE = 1 << 4;
    }
}

impl KeyUsage {
    pub const ANY: KeyUsage = KeyUsage::all();
}

bitflags::bitflags! {
    /// Kind of key material a value carries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyDataType: u32 {
        const PUBLIC = 1 << 0;
        const PRIVATE = 1 << 1;
        const SYMMETRIC = 1 << 2;
    }
}

impl KeyDataType {
    pub const ANY: KeyDataType = KeyDataType::all();
}

/// Concrete key material held by a [`Key`].
///
/// Implementations are supplied by per-algorithm plugins; the engine only
/// queries identity, kind and size, and clones values when keys are
/// copied.
pub trait KeyData: Any + std::fmt::Debug + Send + Sync {
    /// Identity of the key-data descriptor this value belongs to.
    fn data_id(&self) -> KeyDataId;

    /// Kind of material (public / private / symmetric).
    fn key_type(&self) -> KeyDataType;

    /// Key size in bits, or 0 when not meaningful.
    fn bits_size(&self) -> u32;

    fn boxed_clone(&self) -> Box<dyn KeyData>;

    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn KeyData> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// A named key with a primary value and optional auxiliary items
/// (certificates, alternate names).
#[derive(Debug, Clone)]
pub struct Key {
    name: Option<String>,
    value: Option<Box<dyn KeyData>>,
    pub usage: KeyUsage,
    aux_data: Vec<Box<dyn KeyData>>,
}

impl Key {
    /// Create an empty key.
    pub fn new() -> Self {
        Self {
            name: None,
            value: None,
            usage: KeyUsage::ANY,
            aux_data: Vec::new(),
        }
    }

    /// Create a key with a value and usage.
    pub fn with_value(value: Box<dyn KeyData>, usage: KeyUsage) -> Self {
        Self {
            name: None,
            value: Some(value),
            usage,
            aux_data: Vec::new(),
        }
    }

    /// A key is valid once it has a value.
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn value(&self) -> Option<&dyn KeyData> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, value: Box<dyn KeyData>) {
        self.value = Some(value);
    }

    /// Downcast the value to a concrete key-data type.
    pub fn value_as<T: KeyData>(&self) -> Option<&T> {
        self.value().and_then(|v| v.as_any().downcast_ref::<T>())
    }

    /// Erase all information in the key.
    pub fn empty(&mut self) {
        self.name = None;
        self.value = None;
        self.usage = KeyUsage::ANY;
        self.aux_data.clear();
    }

    /// Replace this key's contents with a copy of another key's.
    pub fn copy_from(&mut self, other: &Key) {
        self.name = other.name.clone();
        self.value = other.value.clone();
        self.usage = other.usage;
        self.aux_data = other.aux_data.clone();
    }

    /// Attach an auxiliary key-data item.
    pub fn add_aux_data(&mut self, data: Box<dyn KeyData>) {
        self.aux_data.push(data);
    }

    pub fn aux_data(&self) -> &[Box<dyn KeyData>] {
        &self.aux_data
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::new()
    }
}
