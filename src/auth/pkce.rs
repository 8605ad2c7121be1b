//! PKCE challenge/verifier material for the authorization-code flow.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of generated code verifiers (RFC 7636 allows 43-128).
const VERIFIER_LENGTH: usize = 64;

/// Length of generated state values.
const STATE_LENGTH: usize = 32;

/// RFC 3986 unreserved characters, the verifier alphabet.
const UNRESERVED: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// PKCE material held server-side while a login is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    /// Opaque state value echoed back by the provider; checked for equality
    /// before any token exchange.
    pub state: String,
    /// The code verifier matched against the challenge sent in the redirect.
    pub code_verifier: String,
}

impl PendingLogin {
    /// Generates fresh state and verifier material for a new login attempt.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            state: random_from(UNRESERVED, STATE_LENGTH),
            code_verifier: random_from(UNRESERVED, VERIFIER_LENGTH),
        }
    }

    /// The S256 code challenge derived from this verifier.
    #[must_use]
    pub fn code_challenge(&self) -> String {
        challenge_s256(&self.code_verifier)
    }
}

/// Computes the S256 code challenge: `BASE64URL(SHA256(verifier))`, unpadded.
#[must_use]
pub fn challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_from(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Generates an opaque session identifier.
#[must_use]
pub fn random_session_id() -> String {
    random_from(UNRESERVED, 32)
}
