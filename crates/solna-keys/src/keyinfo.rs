#![forbid(unsafe_code)]

//! `<ds:KeyInfo>` processing — the dispatch and recursion engine.
//!
//! A `KeyInfo` element aggregates hints for obtaining the key needed to
//! validate a signature or decrypt data. The drivers here walk its element
//! children in document order and delegate each child to the key-data
//! descriptor registered for it; the built-in handlers cover the
//! structural children (`KeyName`, `KeyValue`, `RetrievalMethod`,
//! `KeyInfoReference`, `EncryptedKey`, `DerivedKey`, `AgreementMethod`).
//! Everything else, such as concrete key-value algorithms and X.509
//! bodies, plugs in through the same registry interface.

use crate::enc::{EncProcessorFactory, EncryptedContext};
use crate::key::{Key, KeyDataType};
use crate::keyreq::KeyReq;
use crate::manager::KeysManager;
use crate::registry::{
    global_key_data, KeyDataDescriptor, KeyDataHandler, KeyDataId, KeyDataList, KeyDataUsage,
    WriteOutcome,
};
use solna_core::{ns, Error, Result};
use solna_transforms::{TransformCtx, TransformUsage};
use solna_xml::node::{
    check_node_name, content_and_trim, describe, element_children, first_element_child,
    is_empty_node, next_element_sibling, node_ns,
};
use solna_xml::{apply_edits, parse_document, recovered_text, replace_node, set_element_content,
    set_element_text};
use std::any::Any;
use std::sync::Arc;
use std::time::SystemTime;

/// Operation direction of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInfoMode {
    Read,
    Write,
}

/// The surrounding cryptographic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    None,
    Sign,
    Verify,
    Encrypt,
    Decrypt,
}

bitflags::bitflags! {
    /// Strictness knobs for KeyInfo processing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyInfoFlags: u32 {
        /// Keep reading even after a matching key is available.
        const DONT_STOP_ON_KEY_FOUND = 1 << 0;
        /// Unknown top-level KeyInfo child is fatal.
        const STOP_ON_UNKNOWN_CHILD = 1 << 1;
        /// Unknown KeyValue child (and unknown XML retrieval result) is
        /// fatal.
        const KEYVALUE_STOP_ON_UNKNOWN_CHILD = 1 << 2;
        /// Unresolved `Type` on RetrievalMethod is fatal.
        const RETRMETHOD_STOP_ON_UNKNOWN_HREF = 1 << 3;
        /// The retrieval result's root element must match the advertised
        /// `Type`.
        const RETRMETHOD_STOP_ON_MISMATCH_HREF = 1 << 4;
        /// Swallow EncryptedKey/DerivedKey/AgreementMethod failures so
        /// sibling candidates intended for other recipients can be tried.
        const ENCKEY_DONT_STOP_ON_FAILED_DECRYPTION = 1 << 5;
    }
}

/// Processing context for one `<KeyInfo>` read or write.
///
/// Not safe for concurrent use; callers serialize. Reset between uses to
/// clear per-run state while keeping user preferences.
pub struct KeyInfoContext {
    pub mode: KeyInfoMode,
    pub operation: Operation,
    pub keys_manager: Option<Arc<KeysManager>>,
    pub flags: KeyInfoFlags,
    /// Reserved bitfield, carried and copied for parity with `flags`.
    pub flags2: u32,
    /// When non-empty, dispatch is restricted to this list; otherwise the
    /// global registry is used.
    pub enabled_key_data: KeyDataList,
    pub key_req: KeyReq,
    /// Formatting hint for base64 output.
    pub base64_line_size: usize,

    pub retrieval_method_ctx: TransformCtx,
    pub cur_retrieval_method_level: u32,
    pub max_retrieval_method_level: u32,

    pub key_info_reference_ctx: TransformCtx,
    pub cur_key_info_reference_level: u32,
    pub max_key_info_reference_level: u32,

    pub enc_ctx: Option<Box<EncryptedContext>>,
    pub cur_encrypted_key_level: u32,
    pub max_encrypted_key_level: u32,
    pub enc_processor_factory: Option<EncProcessorFactory>,

    pub certs_verification_time: Option<SystemTime>,
    pub certs_verification_depth: u32,

    pub user_data: Option<Arc<dyn Any + Send + Sync>>,

    tried_key_names: Vec<String>,
}

impl KeyInfoContext {
    pub fn new(keys_manager: Option<Arc<KeysManager>>) -> Self {
        Self {
            mode: KeyInfoMode::Read,
            operation: Operation::None,
            keys_manager,
            flags: KeyInfoFlags::empty(),
            flags2: 0,
            enabled_key_data: KeyDataList::new(),
            key_req: KeyReq::new(),
            base64_line_size: 64,
            retrieval_method_ctx: TransformCtx::new(),
            cur_retrieval_method_level: 0,
            max_retrieval_method_level: 1,
            key_info_reference_ctx: TransformCtx::new(),
            cur_key_info_reference_level: 0,
            max_key_info_reference_level: 1,
            enc_ctx: None,
            cur_encrypted_key_level: 0,
            max_encrypted_key_level: 1,
            enc_processor_factory: None,
            certs_verification_time: None,
            certs_verification_depth: 9,
            user_data: None,
            tried_key_names: Vec::new(),
        }
    }

    /// Clear per-run state. User settings are not changed.
    pub fn reset(&mut self) {
        self.operation = Operation::None;
        self.retrieval_method_ctx.reset();
        self.cur_retrieval_method_level = 0;
        self.key_info_reference_ctx.reset();
        self.cur_key_info_reference_level = 0;
        self.cur_encrypted_key_level = 0;
        if let Some(enc) = self.enc_ctx.as_mut() {
            enc.reset();
        }
        self.key_req.reset();
        self.tried_key_names.clear();
    }

    /// Copy user preferences from another context. Per-run state (mode,
    /// operation, level counters, key requirement, tried names) is not
    /// copied; `enabled_key_data` is deep-copied and sub-context
    /// preferences are copied recursively.
    pub fn copy_user_pref(&mut self, src: &KeyInfoContext) {
        self.user_data = src.user_data.clone();
        self.flags = src.flags;
        self.flags2 = src.flags2;
        self.keys_manager = src.keys_manager.clone();
        self.base64_line_size = src.base64_line_size;
        self.enabled_key_data = src.enabled_key_data.clone();

        self.max_retrieval_method_level = src.max_retrieval_method_level;
        self.retrieval_method_ctx
            .copy_user_pref(&src.retrieval_method_ctx);

        self.max_key_info_reference_level = src.max_key_info_reference_level;
        self.key_info_reference_ctx
            .copy_user_pref(&src.key_info_reference_ctx);

        if let (Some(dst), Some(src_enc)) = (self.enc_ctx.as_mut(), src.enc_ctx.as_ref()) {
            dst.copy_user_pref(src_enc);
        }
        self.max_encrypted_key_level = src.max_encrypted_key_level;
        self.enc_processor_factory = src.enc_processor_factory.clone();

        self.certs_verification_time = src.certs_verification_time;
        self.certs_verification_depth = src.certs_verification_depth;
    }

    /// `<KeyName>` values that were looked up in the keys manager without
    /// success during this run.
    pub fn tried_key_names(&self) -> &[String] {
        &self.tried_key_names
    }

    /// Resolve a descriptor by element identity, preferring the enabled
    /// list when one is set.
    pub fn find_by_node(
        &self,
        name: &str,
        ns_uri: &str,
        usage: KeyDataUsage,
    ) -> Option<KeyDataDescriptor> {
        let list = if self.enabled_key_data.is_empty() {
            global_key_data()
        } else {
            &self.enabled_key_data
        };
        list.find_by_node(name, ns_uri, usage).cloned()
    }

    /// Resolve a descriptor by href identifier.
    pub fn find_by_href(&self, href: &str, usage: KeyDataUsage) -> Option<KeyDataDescriptor> {
        let list = if self.enabled_key_data.is_empty() {
            global_key_data()
        } else {
            &self.enabled_key_data
        };
        list.find_by_href(href, usage).cloned()
    }

    /// Resolve a descriptor by identity.
    pub fn find_by_id(&self, id: KeyDataId) -> Option<KeyDataDescriptor> {
        let list = if self.enabled_key_data.is_empty() {
            global_key_data()
        } else {
            &self.enabled_key_data
        };
        list.find_by_id(id).cloned()
    }

    /// Make sure the encrypted-key context exists and is fresh: reset it
    /// if present, otherwise create one bound to the keys manager.
    fn prepare_enc_ctx(&mut self) -> Result<()> {
        match self.enc_ctx.as_mut() {
            Some(enc) => {
                enc.reset();
                Ok(())
            }
            None => {
                self.enc_ctx = Some(self.create_enc_ctx()?);
                Ok(())
            }
        }
    }

    fn create_enc_ctx(&self) -> Result<Box<EncryptedContext>> {
        let factory = self
            .enc_processor_factory
            .clone()
            .ok_or_else(|| Error::Disabled("xml encryption".to_string()))?;
        let processor = factory(self.keys_manager.clone())?;
        let mut enc = Box::new(EncryptedContext::new(self.keys_manager.clone(), processor));
        enc.key_info_read_ctx.copy_user_pref(self);
        enc.key_info_write_ctx.copy_user_pref(self);
        enc.key_info_read_ctx.operation = self.operation;
        enc.key_info_write_ctx.operation = self.operation;
        Ok(enc)
    }

    /// Run a closure with the encrypted-key context taken out of the
    /// context, so user preferences can be copied from the outer context
    /// into its inner contexts. The encrypted-key context is restored on
    /// every exit path.
    fn with_enc_ctx<T>(
        &mut self,
        f: impl FnOnce(&mut EncryptedContext, &mut KeyInfoContext) -> Result<T>,
    ) -> Result<T> {
        let mut enc = self
            .enc_ctx
            .take()
            .ok_or_else(|| Error::Internal("encrypted-key context is not initialized".into()))?;
        let result = f(&mut *enc, self);
        self.enc_ctx = Some(enc);
        result
    }
}

// ── Top-level drivers ────────────────────────────────────────────────

/// True when the read loop may stop: a matching key is available and the
/// caller did not ask for an exhaustive walk.
fn key_lookup_done(key: &Key, ctx: &KeyInfoContext) -> bool {
    !ctx.flags.contains(KeyInfoFlags::DONT_STOP_ON_KEY_FOUND)
        && key.is_valid()
        && ctx.key_req.match_key(key)
}

/// Parse a `<KeyInfo>` element and populate `key` from its children.
///
/// Children are processed in document order; each is dispatched to its
/// registered descriptor. Unknown children are ignored (lax validation)
/// unless [`KeyInfoFlags::STOP_ON_UNKNOWN_CHILD`] is set.
pub fn read_key_info(
    key_info_node: roxmltree::Node<'_, '_>,
    key: &mut Key,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    if ctx.mode != KeyInfoMode::Read {
        return Err(Error::Internal(
            "KeyInfo context is not in read mode".to_string(),
        ));
    }

    for cur in element_children(key_info_node) {
        if key_lookup_done(key, ctx) {
            return Ok(());
        }
        match ctx.find_by_node(
            cur.tag_name().name(),
            node_ns(&cur),
            KeyDataUsage::KEY_INFO_NODE_READ,
        ) {
            Some(descriptor) => descriptor.handler.xml_read(key, cur, ctx)?,
            None if ctx.flags.contains(KeyInfoFlags::STOP_ON_UNKNOWN_CHILD) => {
                return Err(Error::UnexpectedNode(describe(cur)));
            }
            None => {}
        }
    }
    Ok(())
}

/// Write `key` into a `<KeyInfo>` template and return the updated
/// document text.
///
/// Each template child is dispatched to its registered descriptor; the
/// handlers produce text edits which are spliced into the document.
pub fn write_key_info(
    key_info_node: roxmltree::Node<'_, '_>,
    key: &Key,
    ctx: &mut KeyInfoContext,
) -> Result<String> {
    if ctx.mode != KeyInfoMode::Write {
        return Err(Error::Internal(
            "KeyInfo context is not in write mode".to_string(),
        ));
    }

    let doc = key_info_node.document();
    let mut edits = Vec::new();
    for cur in element_children(key_info_node) {
        match ctx.find_by_node(
            cur.tag_name().name(),
            node_ns(&cur),
            KeyDataUsage::KEY_INFO_NODE_WRITE,
        ) {
            Some(descriptor) => {
                if let WriteOutcome::Wrote(edit) = descriptor.handler.xml_write(key, cur, ctx)? {
                    edits.push(edit);
                }
            }
            None if ctx.flags.contains(KeyInfoFlags::STOP_ON_UNKNOWN_CHILD) => {
                return Err(Error::UnexpectedNode(describe(cur)));
            }
            None => {}
        }
    }
    Ok(apply_edits(doc.input_text(), edits))
}

// ── <dsig:KeyName> ───────────────────────────────────────────────────

struct KeyNameHandler;

impl KeyDataHandler for KeyNameHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        let new_name = content_and_trim(node);
        if new_name.is_empty() {
            return Err(Error::InvalidContent("KeyName is empty".to_string()));
        }

        if key.value().is_none() && ctx.keys_manager.is_some() {
            let manager = ctx.keys_manager.clone().unwrap();
            match manager.find_key(&new_name, &ctx.key_req) {
                Some(found) => {
                    // erase any current information in the key and take
                    // over what the manager has for this name
                    key.empty();
                    key.copy_from(&found);
                    key.set_name(new_name);
                }
                None => ctx.tried_key_names.push(new_name),
            }
        } else {
            // a key name that is already set must match
            match key.name() {
                Some(old) if old != new_name => {
                    return Err(Error::InvalidKeyData(
                        "key name is already specified".to_string(),
                    ));
                }
                Some(_) => {}
                None => key.set_name(new_name),
            }
        }
        Ok(())
    }

    fn xml_write(
        &self,
        key: &Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);

        let name = match key.name() {
            Some(n) => n,
            None => return Ok(WriteOutcome::Skipped),
        };
        if !is_empty_node(node) {
            return Ok(WriteOutcome::Unchanged);
        }
        Ok(WriteOutcome::Wrote(set_element_text(
            node.document(),
            node,
            name,
        )))
    }
}

pub fn key_name_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("key-name"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: None,
        node_name: ns::node::KEY_NAME,
        node_ns: ns::DSIG,
        handler: Arc::new(KeyNameHandler),
    }
}

// ── <dsig:KeyValue> ──────────────────────────────────────────────────

struct KeyValueHandler;

impl KeyDataHandler for KeyValueHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        let cur = match first_element_child(node) {
            Some(c) => c,
            // an empty KeyValue is allowed
            None => return Ok(()),
        };

        match ctx.find_by_node(
            cur.tag_name().name(),
            node_ns(&cur),
            KeyDataUsage::KEY_VALUE_NODE_READ,
        ) {
            Some(descriptor) => descriptor.handler.xml_read(key, cur, ctx)?,
            None if ctx
                .flags
                .contains(KeyInfoFlags::KEYVALUE_STOP_ON_UNKNOWN_CHILD) =>
            {
                return Err(Error::UnexpectedNode(describe(cur)));
            }
            None => {}
        }

        // KeyValue holds exactly one child element
        if let Some(extra) = next_element_sibling(cur) {
            return Err(Error::UnexpectedNode(describe(extra)));
        }
        Ok(())
    }

    fn xml_write(
        &self,
        key: &Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);

        let value = match key.value() {
            Some(v) => v,
            None => return Ok(WriteOutcome::Skipped),
        };
        let descriptor = match ctx.find_by_id(value.data_id()) {
            Some(d) if d.usage.contains(KeyDataUsage::KEY_VALUE_NODE_WRITE) => d,
            _ => return Ok(WriteOutcome::Skipped),
        };
        if !ctx.enabled_key_data.is_empty() && !ctx.enabled_key_data.contains(value.data_id()) {
            return Ok(WriteOutcome::Skipped);
        }
        if !ctx.key_req.match_key(key) {
            return Ok(WriteOutcome::Skipped);
        }

        let content = descriptor.handler.xml_write_content(key, ctx)?;
        let child_xml = if descriptor.node_ns.is_empty() {
            format!("<{0}>{1}</{0}>", descriptor.node_name, content)
        } else {
            format!(
                r#"<{0} xmlns="{2}">{1}</{0}>"#,
                descriptor.node_name, content, descriptor.node_ns
            )
        };
        Ok(WriteOutcome::Wrote(set_element_content(
            node.document(),
            node,
            &child_xml,
        )))
    }
}

pub fn key_value_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("key-value"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: None,
        node_name: ns::node::KEY_VALUE,
        node_ns: ns::DSIG,
        handler: Arc::new(KeyValueHandler),
    }
}

// ── <dsig:RetrievalMethod> ───────────────────────────────────────────

struct RetrievalMethodHandler;

impl KeyDataHandler for RetrievalMethodHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        if ctx.cur_retrieval_method_level >= ctx.max_retrieval_method_level {
            return Err(Error::MaxLevel(format!(
                "RetrievalMethod: cur={}, max={}",
                ctx.cur_retrieval_method_level, ctx.max_retrieval_method_level
            )));
        }
        ctx.cur_retrieval_method_level += 1;
        let result = read_retrieval_method(key, node, ctx);
        ctx.cur_retrieval_method_level -= 1;
        result
    }

    fn xml_write(
        &self,
        _key: &Key,
        _node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);
        Ok(WriteOutcome::Unchanged)
    }
}

fn read_retrieval_method(
    key: &mut Key,
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    // resolve the advertised Type, when present
    let mut type_descriptor = None;
    if let Some(retrieval_type) = node.attribute(ns::attr::TYPE) {
        type_descriptor = ctx.find_by_href(retrieval_type, KeyDataUsage::RETRIEVAL_METHOD_NODE);
        if type_descriptor.is_none() {
            if ctx
                .flags
                .contains(KeyInfoFlags::RETRMETHOD_STOP_ON_UNKNOWN_HREF)
            {
                return Err(Error::InvalidAttribute(format!(
                    "retrieval type is unknown: {retrieval_type}"
                )));
            }
            // nothing we know how to interpret
            return Ok(());
        }
    }

    ctx.retrieval_method_ctx.reset();
    ctx.retrieval_method_ctx.set_uri(node.attribute(ns::attr::URI))?;

    // the only permitted child is an optional Transforms list
    let mut cur = first_element_child(node);
    if let Some(child) = cur {
        if check_node_name(child, ns::node::TRANSFORMS, ns::DSIG) {
            ctx.retrieval_method_ctx
                .parse_transforms(child, TransformUsage::DSigTransform)?;
            cur = next_element_sibling(child);
        }
    }
    if let Some(child) = cur {
        return Err(Error::UnexpectedNode(describe(child)));
    }

    let result = ctx.retrieval_method_ctx.execute(node.document())?;
    if result.is_empty() {
        return Err(Error::Transform(
            "RetrievalMethod produced no data".to_string(),
        ));
    }

    match &type_descriptor {
        Some(descriptor)
            if !descriptor
                .usage
                .contains(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML) =>
        {
            descriptor.handler.bin_read(key, &result, ctx)
        }
        _ => read_retrieval_xml_result(type_descriptor, key, &result, ctx),
    }
}

/// Parse a retrieval result as XML and dispatch its root element as key
/// data. Leniently parsed: fetched content is often slightly damaged.
fn read_retrieval_xml_result(
    type_descriptor: Option<KeyDataDescriptor>,
    key: &mut Key,
    buffer: &[u8],
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    let text = recovered_text(buffer);
    let doc = parse_document(&text)?;
    let root = doc.root_element();

    let descriptor = match ctx.find_by_node(
        root.tag_name().name(),
        node_ns(&root),
        KeyDataUsage::RETRIEVAL_METHOD_NODE_XML,
    ) {
        Some(d) => d,
        None => {
            if ctx
                .flags
                .contains(KeyInfoFlags::KEYVALUE_STOP_ON_UNKNOWN_CHILD)
            {
                return Err(Error::UnexpectedNode(describe(root)));
            }
            return Ok(());
        }
    };

    if let Some(expected) = &type_descriptor {
        if expected.id != descriptor.id
            && ctx
                .flags
                .contains(KeyInfoFlags::RETRMETHOD_STOP_ON_MISMATCH_HREF)
        {
            return Err(Error::TypeMismatch(format!(
                "expected {}, retrieved {}",
                expected.id, descriptor.id
            )));
        }
    }

    descriptor.handler.xml_read(key, root, ctx)
}

pub fn retrieval_method_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("retrieval-method"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: None,
        node_name: ns::node::RETRIEVAL_METHOD,
        node_ns: ns::DSIG,
        handler: Arc::new(RetrievalMethodHandler),
    }
}

// ── <dsig11:KeyInfoReference> ────────────────────────────────────────

struct KeyInfoReferenceHandler;

impl KeyDataHandler for KeyInfoReferenceHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        if ctx.cur_key_info_reference_level >= ctx.max_key_info_reference_level {
            return Err(Error::MaxLevel(format!(
                "KeyInfoReference: cur={}, max={}",
                ctx.cur_key_info_reference_level, ctx.max_key_info_reference_level
            )));
        }
        ctx.cur_key_info_reference_level += 1;
        let result = read_key_info_reference(key, node, ctx);
        ctx.cur_key_info_reference_level -= 1;
        result
    }

    fn xml_write(
        &self,
        _key: &Key,
        _node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);
        Ok(WriteOutcome::Unchanged)
    }
}

fn read_key_info_reference(
    key: &mut Key,
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    let uri = node.attribute(ns::attr::URI).ok_or_else(|| {
        Error::InvalidAttribute("URI on KeyInfoReference is required".to_string())
    })?;

    ctx.key_info_reference_ctx.reset();
    ctx.key_info_reference_ctx.set_uri(Some(uri))?;

    // no children are permitted
    if let Some(child) = first_element_child(node) {
        return Err(Error::UnexpectedNode(describe(child)));
    }

    let result = ctx.key_info_reference_ctx.execute(node.document())?;
    if result.is_empty() {
        return Err(Error::Transform(
            "KeyInfoReference produced no data".to_string(),
        ));
    }

    // the result of dereferencing a KeyInfoReference MUST be a KeyInfo
    // element, or an XML document with a KeyInfo element as the root
    let text = recovered_text(&result);
    let doc = parse_document(&text)?;
    let root = doc.root_element();
    if !check_node_name(root, ns::node::KEY_INFO, ns::DSIG) {
        return Err(Error::InvalidNode(format!(
            "expected KeyInfo, found {}",
            describe(root)
        )));
    }

    read_key_info(root, key, ctx)
}

pub fn key_info_reference_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("key-info-reference"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: None,
        node_name: ns::node::KEY_INFO_REFERENCE,
        node_ns: ns::DSIG11,
        handler: Arc::new(KeyInfoReferenceHandler),
    }
}

// ── <enc:EncryptedKey> ───────────────────────────────────────────────

/// Apply the sibling-fallthrough policy to a failed decryption, derivation
/// or agreement: swallow when the caller asked to try other candidates,
/// propagate otherwise.
fn decryption_failure(ctx: &KeyInfoContext, err: Error) -> Result<()> {
    if ctx
        .flags
        .contains(KeyInfoFlags::ENCKEY_DONT_STOP_ON_FAILED_DECRYPTION)
    {
        Ok(())
    } else {
        Err(err)
    }
}

struct EncryptedKeyHandler;

impl KeyDataHandler for EncryptedKeyHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        if ctx.cur_encrypted_key_level >= ctx.max_encrypted_key_level {
            return Err(Error::MaxLevel(format!(
                "EncryptedKey: cur={}, max={}",
                ctx.cur_encrypted_key_level, ctx.max_encrypted_key_level
            )));
        }
        ctx.cur_encrypted_key_level += 1;
        let result = read_encrypted_key(key, node, ctx);
        ctx.cur_encrypted_key_level -= 1;
        result
    }

    fn xml_write(
        &self,
        key: &Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);

        let value_id = match key.value() {
            Some(v) => v.data_id(),
            None => return Ok(WriteOutcome::Skipped),
        };

        // dump the key to a binary buffer through a scratch context, so
        // the serialization cannot disturb this context's pipeline state
        let descriptor = ctx
            .find_by_id(value_id)
            .ok_or_else(|| Error::KeyNotFound(format!("key data {value_id}")))?;
        let mut scratch = KeyInfoContext::new(None);
        scratch.copy_user_pref(ctx);
        scratch.mode = KeyInfoMode::Write;
        scratch.key_req.key_type = KeyDataType::ANY;
        let key_buf = descriptor.handler.bin_write(key, &mut scratch)?;
        drop(scratch);

        ctx.prepare_enc_ctx()?;
        let node_xml = ctx.with_enc_ctx(|enc, outer| {
            enc.key_info_read_ctx.copy_user_pref(outer);
            enc.key_info_write_ctx.copy_user_pref(outer);
            enc.binary_encrypt(node, &key_buf)
        })?;
        Ok(WriteOutcome::Wrote(replace_node(node, node_xml)))
    }
}

fn read_encrypted_key(
    key: &mut Key,
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    ctx.prepare_enc_ctx()?;
    let decrypted = ctx.with_enc_ctx(|enc, outer| {
        enc.key_info_read_ctx.copy_user_pref(outer);
        enc.key_info_write_ctx.copy_user_pref(outer);
        enc.decrypt_to_buffer(node)
    });

    // multiple EncryptedKey elements may target different recipients
    let plaintext = match decrypted {
        Ok(buf) if !buf.is_empty() => buf,
        Ok(_) => {
            return decryption_failure(
                ctx,
                Error::InvalidContent("decrypted EncryptedKey is empty".to_string()),
            );
        }
        Err(err) => return decryption_failure(ctx, err),
    };

    let key_id = ctx.key_req.key_id.ok_or_else(|| {
        Error::Internal("key requirement does not name a key data id".to_string())
    })?;
    let descriptor = ctx
        .find_by_id(key_id)
        .ok_or_else(|| Error::KeyNotFound(format!("key data {key_id}")))?;
    descriptor.handler.bin_read(key, &plaintext, ctx)
}

pub fn encrypted_key_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("enc-key"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: Some(ns::href::ENCRYPTED_KEY),
        node_name: ns::node::ENCRYPTED_KEY,
        node_ns: ns::ENC,
        handler: Arc::new(EncryptedKeyHandler),
    }
}

// ── <enc11:DerivedKey> ───────────────────────────────────────────────

struct DerivedKeyHandler;

impl KeyDataHandler for DerivedKeyHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        // shares the encrypted-key level with <enc:EncryptedKey>
        if ctx.cur_encrypted_key_level >= ctx.max_encrypted_key_level {
            return Err(Error::MaxLevel(format!(
                "DerivedKey: cur={}, max={}",
                ctx.cur_encrypted_key_level, ctx.max_encrypted_key_level
            )));
        }
        ctx.cur_encrypted_key_level += 1;
        let result = read_derived_key(key, node, ctx);
        ctx.cur_encrypted_key_level -= 1;
        result
    }

    fn xml_write(
        &self,
        _key: &Key,
        _node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);
        // the template already carries the derivation parameters
        Ok(WriteOutcome::Unchanged)
    }
}

fn read_derived_key(
    key: &mut Key,
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    ctx.prepare_enc_ctx()?;
    let desired = ctx.key_req.key_id;
    let generated = ctx.with_enc_ctx(|enc, outer| {
        enc.key_info_read_ctx.copy_user_pref(outer);
        enc.key_info_write_ctx.copy_user_pref(outer);
        enc.derive_key(desired, node)
    });

    let generated = match generated {
        Ok(k) => k,
        Err(err) => return decryption_failure(ctx, err),
    };

    // TODO: cache generated keys so a later ds:KeyName in the same
    // KeyInfo can reference them by name
    if !ctx.key_req.match_key(&generated) {
        // not a key we are allowed to use; try other candidates
        return Ok(());
    }
    key.copy_from(&generated);
    Ok(())
}

pub fn derived_key_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("derived-key"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: Some(ns::href::DERIVED_KEY),
        node_name: ns::node::DERIVED_KEY,
        node_ns: ns::ENC11,
        handler: Arc::new(DerivedKeyHandler),
    }
}

// ── <enc:AgreementMethod> ────────────────────────────────────────────

struct AgreementMethodHandler;

impl KeyDataHandler for AgreementMethodHandler {
    fn xml_read(
        &self,
        key: &mut Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<()> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Read);

        if ctx.cur_encrypted_key_level >= ctx.max_encrypted_key_level {
            return Err(Error::MaxLevel(format!(
                "AgreementMethod: cur={}, max={}",
                ctx.cur_encrypted_key_level, ctx.max_encrypted_key_level
            )));
        }
        ctx.cur_encrypted_key_level += 1;
        let result = read_agreement_method(key, node, ctx);
        ctx.cur_encrypted_key_level -= 1;
        result
    }

    fn xml_write(
        &self,
        _key: &Key,
        node: roxmltree::Node<'_, '_>,
        ctx: &mut KeyInfoContext,
    ) -> Result<WriteOutcome> {
        debug_assert_eq!(ctx.mode, KeyInfoMode::Write);

        // unlike DerivedKey, the template must be filled with the
        // originator's agreement parameters
        if ctx.cur_encrypted_key_level >= ctx.max_encrypted_key_level {
            return Err(Error::MaxLevel(format!(
                "AgreementMethod: cur={}, max={}",
                ctx.cur_encrypted_key_level, ctx.max_encrypted_key_level
            )));
        }
        ctx.cur_encrypted_key_level += 1;
        let result = write_agreement_method(node, ctx);
        ctx.cur_encrypted_key_level -= 1;
        result
    }
}

fn read_agreement_method(
    key: &mut Key,
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<()> {
    ctx.prepare_enc_ctx()?;
    let desired = ctx.key_req.key_id;
    let generated = ctx.with_enc_ctx(|enc, outer| {
        enc.key_info_read_ctx.copy_user_pref(outer);
        enc.key_info_write_ctx.copy_user_pref(outer);
        enc.agreement_generate(desired, node)
    });

    let generated = match generated {
        Ok(k) => k,
        Err(err) => return decryption_failure(ctx, err),
    };

    if !ctx.key_req.match_key(&generated) {
        // not a key we are allowed to use; try other candidates
        return Ok(());
    }
    key.copy_from(&generated);
    Ok(())
}

fn write_agreement_method(
    node: roxmltree::Node<'_, '_>,
    ctx: &mut KeyInfoContext,
) -> Result<WriteOutcome> {
    ctx.prepare_enc_ctx()?;
    let node_xml = ctx.with_enc_ctx(|enc, outer| {
        enc.key_info_read_ctx.copy_user_pref(outer);
        enc.key_info_write_ctx.copy_user_pref(outer);
        enc.agreement_xml_write(node)
    })?;
    Ok(WriteOutcome::Wrote(replace_node(node, node_xml)))
}

pub fn agreement_method_descriptor() -> KeyDataDescriptor {
    KeyDataDescriptor {
        id: KeyDataId("agreement-method"),
        usage: KeyDataUsage::KEY_INFO_NODE.union(KeyDataUsage::RETRIEVAL_METHOD_NODE_XML),
        href: Some(ns::href::AGREEMENT_METHOD),
        node_name: ns::node::AGREEMENT_METHOD,
        node_ns: ns::ENC,
        handler: Arc::new(AgreementMethodHandler),
    }
}
