//! SHA256 hashing of binaries on disk
//!
//! Integrity checks compare byte-exact lowercase hex digests; there is no
//! partial matching.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Compute the SHA256 digest of a file as lowercase hex
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Whether a file's digest equals the expected hex digest (case-insensitive
/// on the expected side, since manifests are hand-edited)
pub fn file_matches(path: &Path, expected: &str) -> io::Result<bool> {
    let computed = file_sha256(path)?;
    Ok(computed == expected.to_lowercase())
}
