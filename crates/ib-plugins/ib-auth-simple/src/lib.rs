//! # ib-auth-simple
//!
//! Argon2 hashing for post admin PINs and HS256 bearer token verification.

mod jwt;
mod pin_hash;

pub use jwt::{Claims, JwtTokenVerifier};
pub use pin_hash::Argon2PinHasher;
