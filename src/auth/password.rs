use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::config::AuthConfig;

/// Builds the hasher from the configured work factor. Defaults are strong
/// enough for offline brute-force resistance; tests dial them down.
pub fn hasher(cfg: &AuthConfig) -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(
        cfg.argon2_memory_kib,
        cfg.argon2_iterations,
        cfg.argon2_parallelism,
        None,
    )
    .map_err(|e| {
        error!(error = %e, "argon2 params error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(argon2: &Argon2<'_>, plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// The comparison runs inside argon2 itself, which recomputes the digest
/// with the parameters carried in the hash string.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> AuthConfig {
        AuthConfig {
            session_secret: "s".into(),
            reset_secret: "r".into(),
            otp_ttl_minutes: 5,
            reset_ttl_minutes: 15,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        }
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let argon2 = hasher(&test_cfg()).expect("hasher should build");
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(&argon2, password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let argon2 = hasher(&test_cfg()).expect("hasher should build");
        let password = "correct-horse-battery-staple";
        let hash = hash_password(&argon2, password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn hashes_are_salted() {
        let argon2 = hasher(&test_cfg()).expect("hasher should build");
        let a = hash_password(&argon2, "same-password").unwrap();
        let b = hash_password(&argon2, "same-password").unwrap();
        assert_ne!(a, b);
    }
}
