//! token-guard library.
//!
//! Forward-authentication credential validator: binary bearer tokens with
//! a public/private split, glob-scoped access control, a read-through
//! credential cache, and batched usage statistics.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod metrics;
pub mod shutdown;
pub mod stats;
pub mod storage;
pub mod token;
pub mod validator;

// Re-exports for convenience
pub use config::Config;
pub use credential::{Credential, Header, NewCredential};
pub use error::ValidationError;
pub use token::{Key, KeyId};
pub use validator::{Identity, Validator};
