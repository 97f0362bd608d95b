//! Magic-link and session authentication.

pub mod session;
pub mod token;

use rand::Rng;

/// 32 bytes of CSPRNG output, hex-encoded. Used for both magic-link tokens
/// and session tokens; collision probability is negligible at 256 bits.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
