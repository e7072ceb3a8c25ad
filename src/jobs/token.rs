//! Download token issuance
//!
//! Tokens are 24 bytes from the OS CSPRNG, hex encoded. They are not
//! checked for uniqueness against the registry.

use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token (192 bits)
pub const TOKEN_BYTES: usize = 24;

/// Length of an encoded token
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

/// Issue a fresh opaque token
pub fn issue() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compare a presented token against the issued one without early exit
pub fn tokens_match(presented: &str, issued: &str) -> bool {
    let (a, b) = (presented.as_bytes(), issued.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
