#![forbid(unsafe_code)]

//! Key management and `<ds:KeyInfo>` processing for the Solna XML
//! Security engine.
//!
//! The heart of the crate is [`keyinfo`]: a registry-driven dispatch and
//! recursion engine over the children of a `KeyInfo` element. Keys, key
//! requirements and the keys manager live alongside it; concrete
//! per-algorithm key data plugs in through [`registry`].

pub mod enc;
pub mod key;
pub mod keyinfo;
pub mod keyreq;
pub mod manager;
pub mod registry;

pub use enc::{EncProcessorFactory, EncryptedContext, EncryptedContextMode, EncryptionProcessor};
pub use key::{Key, KeyData, KeyDataType, KeyUsage};
pub use keyinfo::{read_key_info, write_key_info, KeyInfoContext, KeyInfoFlags, KeyInfoMode, Operation};
pub use keyreq::KeyReq;
pub use manager::KeysManager;
pub use registry::{
    global_key_data, KeyDataDescriptor, KeyDataHandler, KeyDataId, KeyDataList, KeyDataUsage,
    WriteOutcome,
};
