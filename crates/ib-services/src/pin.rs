//! PIN Authority.
//!
//! Every post gets a random 12-character admin PIN at creation. Only its hash
//! is stored; the plaintext leaves the process once, in the owner's email.

use std::sync::Arc;

use ib_core::{AppError, PinHasher, Post, PostId, PostRepo, Result};
use rand::distr::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, warn};

pub const PIN_LENGTH: usize = 12;

/// A freshly issued PIN. The plaintext is redacted from `Debug` output.
#[derive(Debug)]
pub struct IssuedPin {
    pub plaintext: SecretString,
    pub hash: String,
}

pub fn generate_pin() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PIN_LENGTH)
        .map(char::from)
        .collect()
}

pub struct PinAuthority {
    posts: Arc<dyn PostRepo>,
    hasher: Arc<dyn PinHasher>,
}

impl PinAuthority {
    pub fn new(posts: Arc<dyn PostRepo>, hasher: Arc<dyn PinHasher>) -> Self {
        Self { posts, hasher }
    }

    pub async fn issue(&self) -> Result<IssuedPin> {
        let plaintext = generate_pin();
        let hash = self.hasher.hash_pin(&plaintext).await.map_err(|e| {
            error!(error = %e, "could not hash post pin");
            AppError::internal("Could not create post")
        })?;

        Ok(IssuedPin {
            plaintext: SecretString::from(plaintext),
            hash,
        })
    }

    /// Resolves the post a PIN-gated operation targets.
    ///
    /// `NotFound` wins over `Unauthorized`: an absent or deleted post is
    /// reported as absent whatever PIN was supplied.
    #[tracing::instrument(skip(self, pin), fields(post_id = id))]
    pub async fn authorize(&self, id: PostId, pin: &str) -> Result<Post> {
        if pin.is_empty() {
            return Err(AppError::invalid("Please provide a post id and it's admin pin"));
        }

        let post = match self.posts.find_post(id).await {
            Ok(Some(post)) if post.is_published() => post,
            Ok(_) => {
                debug!("pin check against a missing post");
                return Err(AppError::post_not_found(id));
            }
            Err(e) => {
                error!(error = %e, "could not load post for pin verification");
                return Err(AppError::internal("Could not run post pin verification"));
            }
        };

        if self.hasher.verify_pin(pin, &post.pin_hash).await {
            Ok(post)
        } else {
            warn!("post pin mismatch");
            Err(AppError::unauthorized("Please check pin and post"))
        }
    }

    /// Boolean form of [`Self::authorize`]: fails closed and never errors.
    pub async fn verify_pin(&self, id: PostId, pin: &str) -> bool {
        self.authorize(id, pin).await.is_ok()
    }
}

impl IssuedPin {
    pub fn expose(&self) -> &str {
        self.plaintext.expose_secret()
    }
}
