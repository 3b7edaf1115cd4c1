use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use ib_core::traits::PinHasher;
use tracing::warn;

/// Argon2id with fixed cost parameters, so every stored hash is comparable
/// in cost. Hashing runs on the blocking pool.
#[derive(Clone)]
pub struct Argon2PinHasher {
    params: Params,
}

impl Argon2PinHasher {
    pub fn new() -> anyhow::Result<Self> {
        let params = Params::new(19_456, 2, 1, None).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Self { params })
    }

    fn context(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

#[async_trait]
impl PinHasher for Argon2PinHasher {
    async fn hash_pin(&self, pin: &str) -> anyhow::Result<String> {
        let context = self.context();
        let pin = pin.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            context
                .hash_password(pin.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| anyhow::anyhow!("could not hash pin: {e}"))
        })
        .await?
    }

    /// Verifies a PIN against a stored hash. A malformed hash fails closed.
    async fn verify_pin(&self, pin: &str, hash: &str) -> bool {
        let context = self.context();
        let pin = pin.to_owned();
        let hash = hash.to_owned();

        let verified = tokio::task::spawn_blocking(move || {
            let parsed = match PasswordHash::new(&hash) {
                Ok(parsed) => parsed,
                Err(_) => {
                    warn!("stored pin hash is malformed");
                    return false;
                }
            };
            context.verify_password(pin.as_bytes(), &parsed).is_ok()
        })
        .await;

        verified.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_verify_and_differ_per_call() {
        let hasher = Argon2PinHasher::new().unwrap();

        let first = hasher.hash_pin("aB3dE5gH7jK9").await.unwrap();
        let second = hasher.hash_pin("aB3dE5gH7jK9").await.unwrap();

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(hasher.verify_pin("aB3dE5gH7jK9", &first).await);
        assert!(!hasher.verify_pin("aB3dE5gH7jK0", &first).await);
    }

    #[tokio::test]
    async fn garbage_hash_never_verifies() {
        let hasher = Argon2PinHasher::new().unwrap();
        assert!(!hasher.verify_pin("pin", "not-a-phc-string").await);
        assert!(!hasher.verify_pin("pin", "").await);
    }
}
