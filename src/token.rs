use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compares two strings in constant time with respect to their contents.
///
/// Lengths are compared first; leaking the length of the expected digest is
/// harmless since signatures are fixed-size hex strings.
pub fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// MD5 hex digest of a raw request body, as carried in the `body_md5`
/// auth parameter.
pub fn body_md5(body: &[u8]) -> String {
    format!("{:x}", md5::compute(body))
}

/// Signs and verifies strings with HMAC-SHA256 under an app secret.
pub struct Token {
    pub key: String,
    secret: String,
}

impl Token {
    pub fn new(key: String, secret: String) -> Self {
        Token { key, secret }
    }

    /// Returns the hex-encoded HMAC-SHA256 of `input` under the secret.
    pub fn sign(&self, input: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(input.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` (hex) against the computed digest of `input`.
    pub fn verify(&self, input: &str, signature: &str) -> bool {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(input.as_bytes());

        match hex::decode(signature) {
            Ok(signature_bytes) => mac.verify_slice(&signature_bytes).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_produces_verifiable_hex() {
        let token = Token::new("key".to_string(), "secret".to_string());
        let signature = token.sign("GET\n/apps/1/channels\nauth_key=key");

        assert!(hex::decode(&signature).is_ok());
        assert!(token.verify("GET\n/apps/1/channels\nauth_key=key", &signature));
    }

    #[test]
    fn verify_rejects_tampered_input() {
        let token = Token::new("key".to_string(), "secret".to_string());
        let signature = token.sign("original");

        assert!(!token.verify("tampered", &signature));
        assert!(!token.verify("original", "not-hex"));
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let ours = Token::new("key".to_string(), "secret-a".to_string());
        let theirs = Token::new("key".to_string(), "secret-b".to_string());
        let signature = ours.sign("payload");

        assert!(!theirs.verify("payload", &signature));
    }

    #[test]
    fn secure_compare_basic() {
        assert!(secure_compare("abc", "abc"));
        assert!(!secure_compare("abc", "abd"));
        assert!(!secure_compare("abc", "abcd"));
    }

    #[test]
    fn body_md5_matches_known_digest() {
        assert_eq!(body_md5(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
