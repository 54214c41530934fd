use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// A freshly generated password-reset token. The plaintext goes into the
/// emailed link and is never persisted; only the hash and expiry are stored.
pub struct ResetToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

pub fn generate(ttl: Duration) -> ResetToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    ResetToken {
        hash: hash_token(&plaintext),
        plaintext,
        expires_at: OffsetDateTime::now_utc() + ttl,
    }
}

/// One-way digest of a reset token, matching what is stored on the user row.
pub fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// A stored token is usable only while its expiry is strictly in the future.
pub fn is_usable(expires_at: &OffsetDateTime) -> bool {
    *expires_at > OffsetDateTime::now_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_high_entropy_hex() {
        let t = generate(Duration::minutes(30));
        // 32 random bytes, hex-encoded.
        assert_eq!(t.plaintext.len(), 64);
        assert!(t.plaintext.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(t.plaintext, t.hash);
    }

    #[test]
    fn successive_tokens_differ() {
        let a = generate(Duration::minutes(30));
        let b = generate(Duration::minutes(30));
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn hash_is_deterministic_over_plaintext() {
        let t = generate(Duration::minutes(30));
        assert_eq!(hash_token(&t.plaintext), t.hash);
        assert_ne!(hash_token("something-else"), t.hash);
    }

    #[test]
    fn expiry_window_matches_ttl() {
        let t = generate(Duration::minutes(30));
        let now = OffsetDateTime::now_utc();
        assert!(t.expires_at > now + Duration::minutes(29));
        assert!(t.expires_at <= now + Duration::minutes(31));
    }

    #[test]
    fn usable_before_expiry_not_after() {
        let future = OffsetDateTime::now_utc() + Duration::minutes(29);
        let past = OffsetDateTime::now_utc() - Duration::minutes(1);
        assert!(is_usable(&future));
        assert!(!is_usable(&past));
    }
}
