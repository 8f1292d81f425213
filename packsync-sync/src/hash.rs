//! SHA-256 content verification for local files.
//!
//! Read errors are always surfaced to the caller. Deciding what an
//! unreadable file means is the caller's policy, not this module's.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest as _, Sha256};

use packsync_core::Digest;

use crate::error::{hash_io_err, HashError};

const READ_CHUNK: usize = 8 * 1024;

/// Stateless SHA-256 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashVerifier;

impl HashVerifier {
    /// Lowercase hex SHA-256 of the file contents.
    pub fn digest_of(&self, path: &Path) -> Result<Digest, HashError> {
        let file = File::open(path).map_err(|e| hash_io_err(path, e))?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf).map_err(|e| hash_io_err(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Digest::from(hex::encode(hasher.finalize())))
    }

    /// `true` when the file's digest equals `expected` (case-insensitive).
    pub fn matches(&self, path: &Path, expected: &Digest) -> Result<bool, HashError> {
        Ok(&self.digest_of(path)? == expected)
    }

    /// Hash the file once and compare it against `expected`.
    pub fn verify(&self, path: &Path, expected: &Digest) -> Verification {
        match self.digest_of(path) {
            Ok(actual) if &actual == expected => Verification::Valid,
            Ok(actual) => Verification::Mismatch(actual),
            Err(err) => Verification::Unreadable(err),
        }
    }
}

/// Result of [`HashVerifier::verify`].
#[derive(Debug)]
pub enum Verification {
    Valid,
    /// Carries the digest that was actually read.
    Mismatch(Digest),
    Unreadable(HashError),
}

impl Verification {
    /// `true` when the file must be fetched again: its digest differs from
    /// the expected one or it cannot be read at all.
    pub fn needs_refetch(&self) -> bool {
        !matches!(self, Verification::Valid)
    }
}

/// SHA-256 of an in-memory buffer, as a [`Digest`].
pub fn digest_bytes(bytes: &[u8]) -> Digest {
    Digest::from(hex::encode(Sha256::digest(bytes)))
}
