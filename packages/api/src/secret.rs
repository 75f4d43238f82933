//! Per-job callback secrets
//!
//! A job's worker authenticates its single outcome report with a random
//! secret. Only the Argon2id PHC string is persisted; the plaintext travels
//! to the worker sealed inside the drop event.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::services::ServiceError;

pub const SECRET_LEN: usize = 30;

/// 64 MiB
const MEMORY_KIB: u32 = 64 * 1024;
const ITERATIONS: u32 = 3;
const PARALLELISM: u32 = 4;
const KEY_LEN: usize = 32;

/// Fresh secret of [`SECRET_LEN`] random alphanumerics.
pub fn generate_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LEN)
        .map(char::from)
        .collect()
}

#[derive(Clone)]
pub struct SecretHasher {
    params: Params,
}

impl SecretHasher {
    /// Production cost: 64 MiB, 3 passes, 4 lanes, 32 byte output.
    pub fn new() -> Result<Self, ServiceError> {
        Self::with_cost(MEMORY_KIB, ITERATIONS, PARALLELISM)
    }

    /// Custom cost; tests use cheap parameters.
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, ServiceError> {
        let params = Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
            .map_err(|e| ServiceError::internal(format!("argon2 params: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// PHC string with a fresh 16 byte salt.
    pub fn hash(&self, secret: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServiceError::internal(format!("argon2 hash: {}", e)))
    }

    /// Recompute with the stored salt and parameters and compare in constant
    /// time. Any malformed hash counts as a mismatch.
    pub fn verify(&self, secret: &str, phc: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(phc) else {
            return false;
        };
        // Parameters come from the PHC string, not from `self`.
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// [`SecretHasher::hash`] on the blocking pool.
    pub async fn hash_blocking(&self, secret: String) -> Result<String, ServiceError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| ServiceError::internal(format!("hash task: {}", e)))?
    }

    /// [`SecretHasher::verify`] on the blocking pool.
    pub async fn verify_blocking(&self, secret: String, phc: String) -> bool {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &phc))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn cheap() -> SecretHasher {
        SecretHasher::with_cost(256, 1, 1).unwrap()
    }

    #[test]
    fn secrets_are_thirty_alphanumerics() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), SECRET_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn production_hash_uses_the_documented_parameters() {
        let phc = SecretHasher::new().unwrap().hash("s").unwrap();
        assert!(phc.starts_with("$argon2id$v=19$m=65536,t=3,p=4$"), "{phc}");
        let parsed = PasswordHash::new(&phc).unwrap();
        assert_eq!(parsed.salt.unwrap().as_str().len(), 22); // 16 bytes, unpadded base64
        assert_eq!(parsed.hash.unwrap().len(), 32);
    }

    #[test]
    fn verify_accepts_only_the_original_secret() {
        let hasher = cheap();
        let secret = generate_secret();
        let phc = hasher.hash(&secret).unwrap();
        assert!(hasher.verify(&secret, &phc));
        assert!(!hasher.verify("wrong", &phc));
        assert!(!hasher.verify(&secret, "not a phc string"));
    }

    #[test]
    fn same_secret_hashes_differently() {
        let hasher = cheap();
        assert_ne!(hasher.hash("abc").unwrap(), hasher.hash("abc").unwrap());
    }

    #[test]
    fn verification_time_does_not_depend_on_the_mismatch_position() {
        let hasher = cheap();
        let secret = "A".repeat(SECRET_LEN);
        let phc = hasher.hash(&secret).unwrap();
        let early = format!("B{}", "A".repeat(SECRET_LEN - 1));
        let late = format!("{}B", "A".repeat(SECRET_LEN - 1));

        let mut early_total = Duration::ZERO;
        let mut late_total = Duration::ZERO;
        for i in 0..1000 {
            // Interleave so drift in machine load hits both sides alike.
            let (first, second) = if i % 2 == 0 { (&early, &late) } else { (&late, &early) };
            let started = Instant::now();
            assert!(!hasher.verify(first, &phc));
            let a = started.elapsed();
            let started = Instant::now();
            assert!(!hasher.verify(second, &phc));
            let b = started.elapsed();
            if i % 2 == 0 {
                early_total += a;
                late_total += b;
            } else {
                late_total += a;
                early_total += b;
            }
        }

        let early_mean = early_total.as_secs_f64() / 1000.0;
        let late_mean = late_total.as_secs_f64() / 1000.0;
        let ratio = (early_mean - late_mean).abs() / early_mean.max(late_mean);
        assert!(ratio < 0.25, "early {early_mean}s late {late_mean}s");
    }

    #[tokio::test]
    async fn blocking_variants_agree() {
        let hasher = cheap();
        let phc = hasher.hash_blocking("secret".into()).await.unwrap();
        assert!(hasher.verify_blocking("secret".into(), phc.clone()).await);
        assert!(!hasher.verify_blocking("other".into(), phc).await);
    }
}
