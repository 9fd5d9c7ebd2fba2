#![forbid(unsafe_code)]

//! XML namespace, element, attribute and href constants used across the
//! library.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Digital Signature 1.1 namespace
pub const DSIG11: &str = "http://www.w3.org/2009/xmldsig11#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XML Encryption 1.1 namespace
pub const ENC11: &str = "http://www.w3.org/2009/xmlenc11#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

// ── Element names ────────────────────────────────────────────────────

/// Element names used by the KeyInfo engine.
///
/// The engine itself only dispatches on the KeyInfo children and the
/// `Transforms` list. The bodies of `EncryptedKey`, `DerivedKey` and
/// `AgreementMethod` are handed whole to the installed encryption
/// processor; the constants below the transform group name the children
/// of those bodies so processor implementations parse them against the
/// same vocabulary.
pub mod node {
    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const KEY_VALUE: &str = "KeyValue";
    pub const RETRIEVAL_METHOD: &str = "RetrievalMethod";
    pub const KEY_INFO_REFERENCE: &str = "KeyInfoReference";

    // Transform elements
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";

    // EncryptedKey and its body, parsed by the encryption processor
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const CARRIED_KEY_NAME: &str = "CarriedKeyName";

    // DerivedKey and its body, parsed by the encryption processor
    pub const DERIVED_KEY: &str = "DerivedKey";
    pub const KEY_DERIVATION_METHOD: &str = "KeyDerivationMethod";
    pub const DERIVED_KEY_NAME: &str = "DerivedKeyName";
    pub const MASTER_KEY_NAME: &str = "MasterKeyName";

    // AgreementMethod and its body, parsed by the encryption processor
    pub const AGREEMENT_METHOD: &str = "AgreementMethod";
    pub const ORIGINATOR_KEY_INFO: &str = "OriginatorKeyInfo";
    pub const RECIPIENT_KEY_INFO: &str = "RecipientKeyInfo";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    /// On `<EncryptedKey>`; read by encryption processors, not the engine.
    pub const RECIPIENT: &str = "Recipient";
}

// ── Key data href identifiers ────────────────────────────────────────
//
// Values of the `Type` attribute on `<RetrievalMethod>` for the key data
// descriptors built into the engine.

pub mod href {
    pub const ENCRYPTED_KEY: &str = "http://www.w3.org/2001/04/xmlenc#EncryptedKey";
    pub const AGREEMENT_METHOD: &str = "http://www.w3.org/2001/04/xmlenc#AgreementMethod";
    pub const DERIVED_KEY: &str = "http://www.w3.org/2009/xmlenc11#DerivedKey";
}
