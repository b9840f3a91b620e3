//! Token codec and access-scope matching.

pub mod glob;
pub mod key;
pub mod scope;

pub use glob::Glob;
pub use key::{Key, KeyId, DIGEST_SIZE, HINT_LEN, KEY_ID_SIZE, KEY_PAYLOAD_SIZE, KEY_SIZE};
pub use scope::{AccessScope, ANY_HOST, ANY_PATH};
