use sha2::{Digest, Sha256};

/// `sha256:<lowercase hex>` digest of in-memory bytes.
pub(crate) fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}
