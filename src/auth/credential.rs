//! Password credential primitive.
//!
//! An unsalted SHA-256 hex digest: deterministic, so equal passwords produce
//! equal credentials. This matches the contract the mobile client was built
//! against. It is NOT resistant to offline attack — swapping in a salted,
//! slow hash would require a credential migration, which is why the digest
//! lives behind these two functions and nowhere else.

use sha2::{Digest, Sha256};

/// Digest a password into its stored credential form: lowercase hex,
/// fixed 64 characters.
pub fn hash(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}

/// Check a password against a stored credential.
pub fn verify(password: &str, credential: &str) -> bool {
    hash(password) == credential
}
