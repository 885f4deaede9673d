mod fingerprint;
mod verifier;

pub use fingerprint::Fingerprint;
pub use verifier::{ContentVerifier, Stale, StaleReason, Verification, VerifyTarget};
