//! Host/path access scope with constant-time secret verification.

use sha3::{Digest, Sha3_384};
use subtle::ConstantTimeEq;

use super::glob::Glob;
use crate::error::PatternError;

/// Separator for host patterns.
pub const HOST_SEPARATOR: char = '.';

/// Separator for path patterns.
pub const PATH_SEPARATOR: char = '/';

/// Default host pattern: any host.
pub const ANY_HOST: &str = "**";

/// Default path pattern: any path under root.
pub const ANY_PATH: &str = "/**";

/// Compiled host and path patterns for one credential.
#[derive(Debug, Clone)]
pub struct AccessScope {
    host: Glob,
    path: Glob,
}

impl AccessScope {
    /// Compile host and path patterns. Empty patterns normalize to the
    /// match-any defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::InvalidPattern`] on malformed glob syntax;
    /// callers surface this as a configuration error at credential
    /// creation/update time.
    pub fn compile(host: &str, path: &str) -> Result<Self, PatternError> {
        let host_pattern = if host.is_empty() { ANY_HOST } else { host };
        let path_pattern = if path.is_empty() { ANY_PATH } else { path };
        Ok(Self {
            host: Glob::compile(host_pattern, HOST_SEPARATOR)?,
            path: Glob::compile(path_pattern, PATH_SEPARATOR)?,
        })
    }

    /// Verify a request against this scope: host glob, path glob, then
    /// the SHA3-384 digest of `payload` against `expected_hash`.
    ///
    /// Host/path checks short-circuit since they carry no secret
    /// material; the digest comparison is constant-time.
    #[must_use]
    pub fn verify(&self, host: &str, path: &str, payload: &[u8], expected_hash: &[u8]) -> bool {
        if !self.host.matches(host) {
            return false;
        }
        if !self.path.matches(path) {
            return false;
        }

        let digest = Sha3_384::digest(payload);
        // Digest length is fixed; a mismatch means a corrupt record, not
        // secret-dependent data.
        if digest.len() != expected_hash.len() {
            return false;
        }
        digest.as_slice().ct_eq(expected_hash).into()
    }
}
