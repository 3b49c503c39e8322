// Authentication gate
//
// Every inbound request except the allow-list and CORS preflight must carry
// a bearer token equal to the single per-installation secret. Failures are
// rate-limited per client identity, and token-shaped substrings are masked
// in all log output.

pub mod gate;
pub mod middleware;
pub mod rate_limit;
pub mod scrub;
pub mod secret_store;
pub mod token;

pub use gate::AuthGate;
pub use middleware::{require_auth, AuthState};
pub use rate_limit::RateLimiter;
pub use scrub::ScrubMakeWriter;
pub use secret_store::{detect_secret_store, FileStore, KeyringStore, SecretStore, SERVICE_NAME};
pub use token::{generate_token, mask_token, scrub_secrets, validate_token, TOKEN_PREFIX};
