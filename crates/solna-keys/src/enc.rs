#![forbid(unsafe_code)]

//! Encrypted-key context.
//!
//! `<EncryptedKey>`, `<DerivedKey>` and `<AgreementMethod>` delegate the
//! actual cryptography to an external encryption subsystem reached through
//! the [`EncryptionProcessor`] trait. The [`EncryptedContext`] owns that
//! processor together with two inner KeyInfo contexts (one per direction)
//! whose user preferences are copied from the outer context by value, so
//! the composition stays acyclic.

use crate::key::Key;
use crate::keyinfo::{KeyInfoContext, KeyInfoMode};
use crate::manager::KeysManager;
use crate::registry::KeyDataId;
use solna_core::Result;
use std::sync::Arc;
use zeroize::Zeroizing;

/// What the encryption context is processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptedContextMode {
    EncryptedData,
    EncryptedKey,
}

/// External encryption subsystem interface.
///
/// The engine hands each `<EncryptedKey>`, `<DerivedKey>` and
/// `<AgreementMethod>` element to the processor whole; the element names
/// and attributes of those bodies (`EncryptionMethod`, `CipherData`,
/// `CipherValue`, `KeyDerivationMethod`, `OriginatorKeyInfo`,
/// `RecipientKeyInfo`, the `Recipient` attribute, and so on) are
/// published in [`solna_core::ns::node`] and [`solna_core::ns::attr`]
/// for implementations to parse against.
///
/// The `key_info_ctx` argument is the inner context the processor should
/// use when it needs to resolve its own `<KeyInfo>` children (an
/// `<EncryptedKey>` carries one naming the key-encryption key).
pub trait EncryptionProcessor: Send {
    /// Clear per-run state between uses.
    fn reset(&mut self) {}

    /// Decrypt the `<EncryptedKey>` element to plaintext key material.
    fn decrypt_to_buffer(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        key_info_ctx: &mut KeyInfoContext,
    ) -> Result<Zeroizing<Vec<u8>>>;

    /// Derive a key as described by a `<DerivedKey>` element.
    fn derive_key(
        &mut self,
        desired: Option<KeyDataId>,
        node: roxmltree::Node<'_, '_>,
        key_info_ctx: &mut KeyInfoContext,
    ) -> Result<Key>;

    /// Perform the key agreement described by an `<AgreementMethod>`
    /// element.
    fn agreement_generate(
        &mut self,
        desired: Option<KeyDataId>,
        node: roxmltree::Node<'_, '_>,
        key_info_ctx: &mut KeyInfoContext,
    ) -> Result<Key>;

    /// Fill an `<AgreementMethod>` template; returns the replacement XML
    /// for the node.
    fn agreement_xml_write(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        key_info_ctx: &mut KeyInfoContext,
    ) -> Result<String>;

    /// Encrypt raw key material into an `<EncryptedKey>` template;
    /// returns the replacement XML for the node.
    fn binary_encrypt(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        plaintext: &[u8],
        key_info_ctx: &mut KeyInfoContext,
    ) -> Result<String>;
}

/// Factory installed on a [`KeyInfoContext`] so the encrypted-key context
/// can be created lazily, bound to the keys manager. Without one, the
/// encrypted-key handlers report the feature as disabled.
pub type EncProcessorFactory =
    Arc<dyn Fn(Option<Arc<KeysManager>>) -> Result<Box<dyn EncryptionProcessor>> + Send + Sync>;

/// Context for processing `<EncryptedKey>` and its xmlenc 1.1 siblings.
pub struct EncryptedContext {
    pub mode: EncryptedContextMode,
    pub key_info_read_ctx: KeyInfoContext,
    pub key_info_write_ctx: KeyInfoContext,
    processor: Box<dyn EncryptionProcessor>,
}

impl EncryptedContext {
    pub fn new(
        keys_manager: Option<Arc<KeysManager>>,
        processor: Box<dyn EncryptionProcessor>,
    ) -> Self {
        let mut read_ctx = KeyInfoContext::new(keys_manager.clone());
        read_ctx.mode = KeyInfoMode::Read;
        let mut write_ctx = KeyInfoContext::new(keys_manager);
        write_ctx.mode = KeyInfoMode::Write;
        Self {
            mode: EncryptedContextMode::EncryptedKey,
            key_info_read_ctx: read_ctx,
            key_info_write_ctx: write_ctx,
            processor,
        }
    }

    /// Clear per-run state between uses.
    pub fn reset(&mut self) {
        self.processor.reset();
        self.key_info_read_ctx.reset();
        self.key_info_write_ctx.reset();
    }

    /// Copy user preferences from another encrypted-key context.
    pub fn copy_user_pref(&mut self, src: &EncryptedContext) {
        self.mode = src.mode;
        self.key_info_read_ctx.copy_user_pref(&src.key_info_read_ctx);
        self.key_info_write_ctx
            .copy_user_pref(&src.key_info_write_ctx);
    }

    pub fn decrypt_to_buffer(
        &mut self,
        node: roxmltree::Node<'_, '_>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.processor
            .decrypt_to_buffer(node, &mut self.key_info_read_ctx)
    }

    pub fn derive_key(
        &mut self,
        desired: Option<KeyDataId>,
        node: roxmltree::Node<'_, '_>,
    ) -> Result<Key> {
        self.processor
            .derive_key(desired, node, &mut self.key_info_read_ctx)
    }

    pub fn agreement_generate(
        &mut self,
        desired: Option<KeyDataId>,
        node: roxmltree::Node<'_, '_>,
    ) -> Result<Key> {
        self.processor
            .agreement_generate(desired, node, &mut self.key_info_read_ctx)
    }

    pub fn agreement_xml_write(&mut self, node: roxmltree::Node<'_, '_>) -> Result<String> {
        self.processor
            .agreement_xml_write(node, &mut self.key_info_write_ctx)
    }

    pub fn binary_encrypt(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        plaintext: &[u8],
    ) -> Result<String> {
        self.processor
            .binary_encrypt(node, plaintext, &mut self.key_info_write_ctx)
    }
}
