//! Secret generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Size of generated passwords and API keys
pub const SECRET_BYTES: usize = 24;

/// Size of generated encryption keys
pub const KEY_BYTES: usize = 32;

/// `bytes` of OS randomness, base64url-encoded without padding
pub fn generate_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths_match_encoding() {
        assert_eq!(generate_secret(SECRET_BYTES).len(), 32);
        assert_eq!(generate_secret(KEY_BYTES).len(), 43);
    }

    #[test]
    fn test_alphabet_is_url_safe() {
        let secret = generate_secret(KEY_BYTES);
        assert!(
            secret
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_secrets_are_not_reused() {
        assert_ne!(generate_secret(SECRET_BYTES), generate_secret(SECRET_BYTES));
    }
}
