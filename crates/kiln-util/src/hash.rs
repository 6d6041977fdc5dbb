//! SHA-256 fingerprints of produced files.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of a single blob.
pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// One digest over a sequence of named blobs.
///
/// Names and contents are length-prefixed, so moving bytes between a name and
/// its content, or between neighbouring files, changes the digest. Order is
/// significant.
pub fn digest_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    for (name, data) in files {
        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
    }
    format!("{:x}", hasher.finalize())
}
