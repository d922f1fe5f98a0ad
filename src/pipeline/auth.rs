//! Shared-secret gate for collector invocations.

use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Check an `Authorization` header value against the configured secret.
///
/// An unset secret is a deployment error, not an authorization failure.
pub fn authorize(header: Option<&str>, secret: Option<&str>) -> Result<()> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::config("CRON_SECRET is not set"))?;

    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    // Compare digests so the comparison time does not depend on the secret.
    let expected = Sha256::digest(secret.as_bytes());
    let actual = Sha256::digest(token.as_bytes());
    let diff = expected
        .iter()
        .zip(actual.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    if diff == 0 {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}
