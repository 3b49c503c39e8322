// Token generation, validation, and masking
//
// Token shape: "lt_" prefix plus 256 bits of randomness, URL-safe base64
// without padding (46 characters total).

use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use subtle::ConstantTimeEq;

pub const TOKEN_PREFIX: &str = "lt_";

const TOKEN_RANDOM_BYTES: usize = 32;

static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Regex matching token-shaped substrings, used for log scrubbing.
fn token_pattern() -> &'static Regex {
    TOKEN_PATTERN.get_or_init(|| {
        Regex::new(r"lt_[A-Za-z0-9_-]{20,}").expect("token pattern is a valid regex")
    })
}

/// Generate a new 256-bit auth token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// Constant-time token comparison (prevents timing side-channels).
pub fn validate_token(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Mask a token for deliberate display (prefix only).
pub fn mask_token(token: &str) -> String {
    if token.len() < 10 {
        return "****".to_string();
    }
    match token.get(..7) {
        Some(prefix) => format!("{prefix}****"),
        None => "****".to_string(),
    }
}

/// Replace every token-shaped substring in `text` with a mask.
pub fn scrub_secrets(text: &str) -> String {
    token_pattern()
        .replace_all(text, "lt_****MASKED****")
        .into_owned()
}
